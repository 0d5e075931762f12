//! Basic type definitions for the chat hub
//!
//! Provides:
//! - `SessionId`: UUID-based unique session identifier
//! - `now_rfc3339`: wire timestamp helper

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Unique session identifier (newtype pattern)
///
/// Usernames are not unique, so two sessions named "alice" in the same
/// room are told apart by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Render a UTC instant the way it appears in the `time` field of events
pub fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time as an RFC 3339 string
pub fn now_rfc3339() -> String {
    format_time(Utc::now())
}
