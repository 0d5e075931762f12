//! Error types for the chat hub
//!
//! Defines connection-level errors, mailbox delivery errors and
//! configuration errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Every variant is fatal to the connection it occurs on and to nothing else.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Hub request queue is closed (hub loop has stopped)
    #[error("Channel send error")]
    ChannelSend,

    /// A join parameter was missing or empty at upgrade time
    #[error("Missing join parameter: {0}")]
    MissingJoinParam(&'static str),

    /// Upgrade request for a path the server does not serve
    #[error("Unknown path: {0}")]
    UnknownPath(String),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Non-blocking mailbox delivery errors
///
/// Never reported back to whoever produced the message: the hub
/// resolves both cases by evicting the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MailboxError {
    /// The mailbox is at capacity (slow reader)
    #[error("Mailbox full")]
    Full,
    /// The receiving end has been closed (outbound duty gone)
    #[error("Mailbox closed")]
    Closed,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable held a value that could not be used
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}
