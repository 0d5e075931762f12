//! Notification routing
//!
//! Resolves a notification's target expression to the rooms (and,
//! for user targets, the username filter) that must receive it, and keeps
//! the bounded notification history replayed to late joiners.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::NOTIFICATION_HISTORY_CAPACITY;
use crate::message::Notification;
use crate::room::{Room, RoomDirectory};

/// Parsed target expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every session in every room
    All,
    /// Sessions in one named room
    Room(String),
    /// Sessions with this exact username, in any room
    User(String),
}

impl Target {
    /// Classify by prefix; anything that is not `room:` or `user:` means all
    pub fn parse(expr: &str) -> Self {
        if let Some(room) = expr.strip_prefix("room:") {
            Target::Room(room.to_string())
        } else if let Some(user) = expr.strip_prefix("user:") {
            Target::User(user.to_string())
        } else {
            Target::All
        }
    }

    /// Whether a session with this username in this room is addressed
    pub fn matches(&self, room: &str, username: &str) -> bool {
        match self {
            Target::All => true,
            Target::Room(name) => name == room,
            Target::User(name) => name == username,
        }
    }
}

/// One room to deliver into, optionally narrowed to a username
#[derive(Debug, Clone)]
pub struct Recipient {
    pub room: Arc<Room>,
    pub username: Option<String>,
}

/// Resolve a target against the current directory
///
/// `All` yields every room, `Room` yields the named room if it exists and
/// `User` yields every room narrowed to that username (the room scan
/// happens at delivery time).
pub fn resolve_targets(target: &Target, directory: &RoomDirectory) -> Vec<Recipient> {
    match target {
        Target::All => directory
            .rooms()
            .into_iter()
            .map(|room| Recipient {
                room,
                username: None,
            })
            .collect(),
        Target::Room(name) => directory
            .get(name)
            .map(|room| Recipient {
                room,
                username: None,
            })
            .into_iter()
            .collect(),
        Target::User(username) => directory
            .rooms()
            .into_iter()
            .map(|room| Recipient {
                room,
                username: Some(username.clone()),
            })
            .collect(),
    }
}

/// Bounded ring of past notifications, oldest first
#[derive(Debug, Clone)]
pub struct NotificationHistory {
    entries: VecDeque<Notification>,
    capacity: usize,
}

impl Default for NotificationHistory {
    fn default() -> Self {
        Self::with_capacity(NOTIFICATION_HISTORY_CAPACITY)
    }
}

impl NotificationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest entry when full
    pub fn push(&mut self, notification: Notification) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(notification);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter()
    }

    /// Entries addressed to a session joining `room` as `username`
    pub fn matching<'a>(
        &'a self,
        room: &'a str,
        username: &'a str,
    ) -> impl Iterator<Item = &'a Notification> + 'a {
        self.entries
            .iter()
            .filter(move |n| Target::parse(&n.target).matches(room, username))
    }
}
