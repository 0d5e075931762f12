//! Multi-room WebSocket Chat Hub Library
//!
//! A WebSocket chat hub built with tokio-tungstenite using the Actor
//! pattern for membership state.
//!
//! # Features
//! - Rooms created on first join and deleted when the last member leaves
//! - Join/leave announcements and member lists
//! - Chat fan-out to every member of a room
//! - In-band commands: `/users`, `/rooms`, `/stats`
//! - Admin notifications targeted at `all`, `room:<name>` or `user:<name>`,
//!   with the last 50 replayed to joiners
//! - Keepalive pings and dead-peer detection
//! - Slow readers are disconnected instead of stalling everyone else
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Hub` is the central actor and the only writer of room membership
//! - Each session has an inbound task (socket → hub) and an outbound task
//!   (bounded mailbox → socket)
//! - The hub never blocks on a session: full mailboxes get the session evicted
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use chat_hub::{serve, Config, Hub};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Arc::new(Config::default());
//!     let listener = TcpListener::bind(&config.bind_addr).await.unwrap();
//!     let (hub, handle) = Hub::from_config(&config);
//!
//!     tokio::spawn(hub.run());
//!     serve(listener, handle, config).await;
//! }
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod handler;
pub mod hub;
pub mod message;
pub mod room;
pub mod router;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use config::Config;
pub use error::{AppError, ConfigError, MailboxError};
pub use handler::{handle_connection, serve};
pub use hub::{Hub, HubCommand, HubHandle};
pub use message::{Event, EventKind, Notification, NotificationKind, StatsReport};
pub use room::{Room, RoomDirectory};
pub use router::{resolve_targets, NotificationHistory, Target};
pub use session::{Mailbox, Session};
pub use types::SessionId;
