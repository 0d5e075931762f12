//! Message protocol definitions
//!
//! JSON wire shapes shared by sessions, the hub and the admin channel.
//! Chat traffic uses one flat `Event` shape in both directions, tagged by
//! its `type` field.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{format_time, now_rfc3339};

/// Username stamped on hub-originated events
pub const SYSTEM_USER: &str = "SYSTEM";

/// Username stamped on live admin notifications
pub const ADMIN_USER: &str = "ADMIN";

/// Event type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A session entered the room
    Join,
    /// A session left the room
    Leave,
    /// Ordinary chat text
    Chat,
    /// Hub or admin notice
    System,
    /// Room membership listing
    UserList,
    /// Aggregate statistics reply
    Stats,
    /// In-band command issued by a session (`text` holds e.g. `/users`)
    Command,
}

/// A chat event as it travels over the wire
///
/// Inbound frames only need `type`; the remaining fields are overwritten
/// by the session and hub before anyone else sees the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub time: String,
}

impl Event {
    /// Build an event stamped with the current time
    pub fn new(
        kind: EventKind,
        room: impl Into<String>,
        username: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            room: room.into(),
            username: username.into(),
            text: text.into(),
            time: now_rfc3339(),
        }
    }

    pub fn join(room: &str, username: &str) -> Self {
        Self::new(EventKind::Join, room, username, format!("{} joined", username))
    }

    pub fn leave(room: &str, username: &str) -> Self {
        Self::new(EventKind::Leave, room, username, format!("{} left", username))
    }

    /// Membership listing in join order
    pub fn user_list(room: &str, usernames: &[String]) -> Self {
        let mut text = format!("Users in '{}' ({}):\n", room, usernames.len());
        for name in usernames {
            text.push_str("- ");
            text.push_str(name);
            text.push('\n');
        }
        Self::new(EventKind::UserList, room, SYSTEM_USER, text)
    }

    pub fn system(room: &str, text: impl Into<String>) -> Self {
        Self::new(EventKind::System, room, SYSTEM_USER, text)
    }

    /// Live delivery of an admin notification
    pub fn notification(room: &str, notification: &Notification) -> Self {
        Self {
            kind: EventKind::System,
            room: room.to_string(),
            username: ADMIN_USER.to_string(),
            text: format!("{}: {}", notification.title, notification.message),
            time: format_time(notification.timestamp),
        }
    }

    /// Join-time replay of a retained notification
    pub fn notification_replay(room: &str, notification: &Notification) -> Self {
        Self {
            kind: EventKind::System,
            room: room.to_string(),
            username: SYSTEM_USER.to_string(),
            text: format!("[NOTIF] {}: {}", notification.title, notification.message),
            time: format_time(notification.timestamp),
        }
    }

    pub fn stats(room: &str, report: &StatsReport) -> Result<Self, serde_json::Error> {
        let text = serde_json::to_string_pretty(report)?;
        Ok(Self::new(EventKind::Stats, room, SYSTEM_USER, text))
    }
}

/// Notification severity/category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[default]
    Info,
    Warning,
    Error,
    Success,
}

fn default_target() -> String {
    "all".to_string()
}

/// Administrative notification
///
/// `target` is one of `all`, `room:<name>` or `user:<name>`; see
/// [`crate::router::Target`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_target")]
    pub target: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            kind: NotificationKind::Info,
            title: title.into(),
            message: message.into(),
            timestamp: Utc::now(),
            target: target.into(),
        }
    }

    /// Assign a server-side id if the submitter left it empty
    pub fn ensure_id(&mut self) -> &str {
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        &self.id
    }
}

/// Aggregate statistics over the room directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub total_users: usize,
    pub total_rooms: usize,
    pub room_details: BTreeMap<String, usize>,
}

/// Reply to an accepted admin notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyAck {
    pub status: String,
    pub id: String,
}

impl NotifyAck {
    pub fn sent(id: impl Into<String>) -> Self {
        Self {
            status: "sent".to_string(),
            id: id.into(),
        }
    }
}

/// Reply to a rejected admin frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminError {
    pub error: String,
}
