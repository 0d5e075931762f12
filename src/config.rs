//! Runtime configuration
//!
//! Defaults are tuned for a single-process deployment; every value can be
//! overridden through `CHAT_HUB_*` environment variables.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default per-session outbound mailbox size
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Default hub request queue size
pub const DEFAULT_HUB_QUEUE_CAPACITY: usize = 256;

/// Idle time after which a keepalive ping is written
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(54);

/// Silence after which a peer is considered dead
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Number of notifications kept for replay to late joiners
pub const NOTIFICATION_HISTORY_CAPACITY: usize = 50;

/// Hub and transport settings
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for the WebSocket server
    pub bind_addr: String,
    /// Bounded size of every session mailbox
    pub mailbox_capacity: usize,
    /// Bounded size of the hub request queue
    pub hub_queue_capacity: usize,
    /// Outbound idle interval before a ping probe
    pub ping_interval: Duration,
    /// Maximum time without any inbound frame
    pub pong_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            hub_queue_capacity: DEFAULT_HUB_QUEUE_CAPACITY,
            ping_interval: DEFAULT_PING_INTERVAL,
            pong_timeout: DEFAULT_PONG_TIMEOUT,
        }
    }
}

impl Config {
    /// Build a config from `CHAT_HUB_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (unset keys keep defaults)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("CHAT_HUB_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(value) = lookup("CHAT_HUB_MAILBOX") {
            config.mailbox_capacity = parse_positive("CHAT_HUB_MAILBOX", value)?;
        }
        if let Some(value) = lookup("CHAT_HUB_QUEUE") {
            config.hub_queue_capacity = parse_positive("CHAT_HUB_QUEUE", value)?;
        }
        if let Some(value) = lookup("CHAT_HUB_PING_SECS") {
            config.ping_interval =
                Duration::from_secs(parse_positive("CHAT_HUB_PING_SECS", value)? as u64);
        }
        if let Some(value) = lookup("CHAT_HUB_PONG_SECS") {
            config.pong_timeout =
                Duration::from_secs(parse_positive("CHAT_HUB_PONG_SECS", value)? as u64);
        }

        Ok(config)
    }
}

fn parse_positive(var: &'static str, value: String) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            value,
            reason: "must be greater than zero",
        }),
        Ok(n) => Ok(n),
        Err(_) => Err(ConfigError::Invalid {
            var,
            value,
            reason: "not a number",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_ADDR);
        assert_eq!(config.mailbox_capacity, 256);
        assert_eq!(config.ping_interval, Duration::from_secs(54));
        assert_eq!(config.pong_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("CHAT_HUB_ADDR", "0.0.0.0:9000"),
            ("CHAT_HUB_MAILBOX", "8"),
            ("CHAT_HUB_PING_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.mailbox_capacity, 8);
        assert_eq!(config.ping_interval, Duration::from_secs(5));
        assert_eq!(config.hub_queue_capacity, DEFAULT_HUB_QUEUE_CAPACITY);
    }

    #[test]
    fn test_rejects_zero_and_garbage() {
        let err = Config::from_lookup(lookup_from(&[("CHAT_HUB_MAILBOX", "0")])).unwrap_err();
        assert!(err.to_string().contains("CHAT_HUB_MAILBOX"));

        let err = Config::from_lookup(lookup_from(&[("CHAT_HUB_PONG_SECS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("not a number"));
    }
}
