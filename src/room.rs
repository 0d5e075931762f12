//! Room and room directory
//!
//! A `Room` is a named partition of sessions. The `RoomDirectory` maps
//! room names to rooms and is shared between the hub (the only writer)
//! and readers such as the command interpreter and the stats endpoint.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::MailboxError;
use crate::message::{Event, StatsReport};
use crate::session::Session;
use crate::types::SessionId;

/// Sessions that could not take a delivery
pub type Undelivered = Vec<(SessionId, MailboxError)>;

/// Named set of sessions, kept in join order
///
/// Membership changes only go through the hub; outside the crate a room is
/// read-only:
///
/// ```compile_fail
/// use chat_hub::{Room, Session};
///
/// let (session, _mailbox) = Session::new("alice", "lobby", 1);
/// Room::new("lobby").add(session);
/// ```
#[derive(Debug)]
pub struct Room {
    /// Room name (directory key)
    pub name: String,
    members: RwLock<Vec<Session>>,
}

impl Room {
    /// Create an empty room
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Session>> {
        self.members.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Session>> {
        self.members.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a session, returning the new size
    pub(crate) fn add(&self, session: Session) -> usize {
        let mut members = self.write();
        members.push(session);
        members.len()
    }

    /// Remove a session by id
    ///
    /// Returns the removed session and the remaining size, or None if the
    /// session was not a member.
    pub(crate) fn remove(&self, id: SessionId) -> Option<(Session, usize)> {
        let mut members = self.write();
        let index = members.iter().position(|s| s.id == id)?;
        let session = members.remove(index);
        Some((session, members.len()))
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.read().iter().any(|s| s.id == id)
    }

    /// Member usernames in join order
    pub fn usernames(&self) -> Vec<String> {
        self.read().iter().map(|s| s.username.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Deliver an event to every member without blocking
    pub fn deliver(&self, event: &Event) -> Undelivered {
        self.deliver_matching(event, |_| true).1
    }

    /// Deliver to members accepted by `filter`, returning how many took it
    pub fn deliver_matching<F>(&self, event: &Event, filter: F) -> (usize, Undelivered)
    where
        F: Fn(&Session) -> bool,
    {
        let members = self.read();
        let mut delivered = 0;
        let mut failed = Vec::new();
        for session in members.iter().filter(|s| filter(s)) {
            match session.deliver(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => failed.push((session.id, e)),
            }
        }
        (delivered, failed)
    }
}

/// Room name → room map
///
/// Cloning shares the same directory. Mutation happens only through the
/// crate-private methods used by the hub loop; a room is present exactly
/// while it has members.
#[derive(Debug, Clone, Default)]
pub struct RoomDirectory {
    rooms: Arc<RwLock<HashMap<String, Arc<Room>>>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Room>>> {
        self.rooms.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Room>>> {
        self.rooms.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put a session into the room named by its `room` field, creating
    /// the room if needed
    pub(crate) fn join(&self, session: Session) -> Arc<Room> {
        let mut rooms = self.write();
        let room = rooms
            .entry(session.room.clone())
            .or_insert_with(|| Arc::new(Room::new(session.room.clone())))
            .clone();
        room.add(session);
        room
    }

    /// Take a session out of `room_name`, deleting the room when it
    /// becomes empty
    ///
    /// Returns the removed session and the remaining member count.
    pub(crate) fn leave(&self, room_name: &str, id: SessionId) -> Option<(Session, usize)> {
        let mut rooms = self.write();
        let room = rooms.get(room_name)?;
        let (session, remaining) = room.remove(id)?;
        if remaining == 0 {
            rooms.remove(room_name);
        }
        Some((session, remaining))
    }

    pub fn get(&self, name: &str) -> Option<Arc<Room>> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// All rooms, sorted by name
    pub fn rooms(&self) -> Vec<Arc<Room>> {
        let mut rooms: Vec<Arc<Room>> = self.read().values().cloned().collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        rooms
    }

    /// Room names, sorted
    pub fn room_names(&self) -> Vec<String> {
        self.rooms().iter().map(|r| r.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Session totals and per-room counts
    pub fn stats(&self) -> StatsReport {
        let room_details: std::collections::BTreeMap<String, usize> = self
            .read()
            .iter()
            .map(|(name, room)| (name.clone(), room.len()))
            .collect();
        StatsReport {
            total_users: room_details.values().sum(),
            total_rooms: room_details.len(),
            room_details,
        }
    }
}
