//! Hub actor implementation
//!
//! The central coordinator owning the room directory and notification
//! history. Registration, unregistration, broadcast and notification
//! requests arrive over one mpsc queue and are processed one at a time,
//! so every member of a room observes events in the same order.

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::message::{Event, Notification, StatsReport};
use crate::room::{Room, RoomDirectory, Undelivered};
use crate::router::{resolve_targets, NotificationHistory, Target};
use crate::session::Session;
use crate::types::{now_rfc3339, SessionId};

/// Requests submitted to the hub loop
#[derive(Debug)]
pub enum HubCommand {
    /// Newly joined session
    Register(Session),
    /// Session going away (idempotent)
    Unregister { id: SessionId, room: String },
    /// Event for every member of `event.room`
    Broadcast(Event),
    /// Administrative notification
    Notify(Notification),
}

/// The hub actor
///
/// Owns all membership mutation. Performs no I/O: deliveries are
/// non-blocking pushes into session mailboxes, and sessions that cannot
/// take a push are evicted at the end of the current step.
pub struct Hub {
    /// Room name → room, shared read-only with handles
    directory: RoomDirectory,
    /// Last notifications, replayed to joiners
    history: NotificationHistory,
    /// Sessions to evict once the current step's deliveries are done
    evictions: VecDeque<(String, SessionId)>,
    /// Command receiver channel
    receiver: mpsc::Receiver<HubCommand>,
}

/// Cloneable submission side of the hub
#[derive(Debug, Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
    directory: RoomDirectory,
}

impl Hub {
    /// Create a hub and its handle with a bounded request queue
    pub fn new(queue_capacity: usize) -> (Self, HubHandle) {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let directory = RoomDirectory::new();
        let hub = Self {
            directory: directory.clone(),
            history: NotificationHistory::new(),
            evictions: VecDeque::new(),
            receiver,
        };
        (hub, HubHandle { sender, directory })
    }

    pub fn from_config(config: &Config) -> (Self, HubHandle) {
        Self::new(config.hub_queue_capacity)
    }

    /// Run the hub event loop
    ///
    /// Continuously receives and processes commands until all handles are dropped.
    pub async fn run(mut self) {
        info!("Hub started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Hub shutting down");
    }

    pub fn directory(&self) -> &RoomDirectory {
        &self.directory
    }

    pub fn history(&self) -> &NotificationHistory {
        &self.history
    }

    /// Process a single command, including any evictions it causes
    fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register(session) => self.register(session),
            HubCommand::Unregister { id, room } => {
                self.unregister(&room, id);
            }
            HubCommand::Broadcast(event) => self.broadcast(event),
            HubCommand::Notify(notification) => self.dispatch_notification(notification),
        }
        self.process_evictions();
    }

    /// Handle a new session joining its room
    fn register(&mut self, session: Session) {
        let id = session.id;
        let username = session.username.clone();
        let room = self.directory.join(session);
        info!("Session {} ({}) joined room '{}'", id, username, room.name);

        self.deliver_to_room(&room, &Event::join(&room.name, &username));

        let replay: Vec<Event> = self
            .history
            .matching(&room.name, &username)
            .map(|n| Event::notification_replay(&room.name, n))
            .collect();
        for event in replay {
            let (_, failed) = room.deliver_matching(&event, |s| s.id == id);
            if !failed.is_empty() {
                self.queue_evictions(&room.name, failed);
                break;
            }
        }

        self.send_user_list(&room);
        debug!(
            "Total sessions: {}, Total rooms: {}",
            self.directory.stats().total_users,
            self.directory.len()
        );
    }

    /// Handle a session leaving
    ///
    /// Returns false if the session was already gone.
    fn unregister(&mut self, room_name: &str, id: SessionId) -> bool {
        let Some((session, remaining)) = self.directory.leave(room_name, id) else {
            debug!("Session {} already unregistered", id);
            return false;
        };
        info!("Session {} ({}) left room '{}'", id, session.username, room_name);

        // Dropping the session closes its mailbox
        let username = session.username.clone();
        drop(session);

        if remaining == 0 {
            debug!("Room '{}' deleted (empty)", room_name);
            return true;
        }

        if let Some(room) = self.directory.get(room_name) {
            self.deliver_to_room(&room, &Event::leave(room_name, &username));
            self.send_user_list(&room);
        }
        true
    }

    /// Deliver an event to every member of `event.room`
    fn broadcast(&mut self, mut event: Event) {
        event.time = now_rfc3339();
        let Some(room) = self.directory.get(&event.room) else {
            debug!("Broadcast to missing room '{}' dropped", event.room);
            return;
        };
        debug!(
            "Broadcast {:?} from {} to room '{}' ({} members)",
            event.kind,
            event.username,
            room.name,
            room.len()
        );
        self.deliver_to_room(&room, &event);
    }

    /// Record a notification and deliver it to its live audience
    fn dispatch_notification(&mut self, mut notification: Notification) {
        notification.ensure_id();
        self.history.push(notification.clone());

        let target = Target::parse(&notification.target);
        let mut delivered = 0;
        for recipient in resolve_targets(&target, &self.directory) {
            let event = Event::notification(&recipient.room.name, &notification);
            let (count, failed) = match &recipient.username {
                Some(username) => recipient
                    .room
                    .deliver_matching(&event, |s| &s.username == username),
                None => recipient.room.deliver_matching(&event, |_| true),
            };
            delivered += count;
            self.queue_evictions(&recipient.room.name, failed);
        }

        info!(
            "Notification {} ({:?}) for '{}' delivered to {} sessions",
            notification.id, notification.kind, notification.target, delivered
        );
    }

    fn send_user_list(&mut self, room: &Room) {
        let event = Event::user_list(&room.name, &room.usernames());
        self.deliver_to_room(room, &event);
    }

    fn deliver_to_room(&mut self, room: &Room, event: &Event) {
        let failed = room.deliver(event);
        self.queue_evictions(&room.name, failed);
    }

    fn queue_evictions(&mut self, room_name: &str, failed: Undelivered) {
        for (id, reason) in failed {
            let entry = (room_name.to_string(), id);
            if !self.evictions.contains(&entry) {
                warn!("Evicting session {} from '{}': {}", id, room_name, reason);
                self.evictions.push_back(entry);
            }
        }
    }

    /// Unregister evicted sessions; their leave announcements may evict more
    fn process_evictions(&mut self) {
        while let Some((room, id)) = self.evictions.pop_front() {
            self.unregister(&room, id);
        }
    }
}

impl HubHandle {
    async fn submit(&self, cmd: HubCommand) -> Result<(), AppError> {
        self.sender.send(cmd).await.map_err(|_| AppError::ChannelSend)
    }

    /// Hand a joined session to the hub
    pub async fn register(&self, session: Session) -> Result<(), AppError> {
        self.submit(HubCommand::Register(session)).await
    }

    pub async fn unregister(&self, id: SessionId, room: impl Into<String>) -> Result<(), AppError> {
        self.submit(HubCommand::Unregister {
            id,
            room: room.into(),
        })
        .await
    }

    pub async fn broadcast(&self, event: Event) -> Result<(), AppError> {
        self.submit(HubCommand::Broadcast(event)).await
    }

    /// Submit a notification, returning its (possibly server-assigned) id
    pub async fn notify(&self, mut notification: Notification) -> Result<String, AppError> {
        let id = notification.ensure_id().to_string();
        self.submit(HubCommand::Notify(notification)).await?;
        Ok(id)
    }

    /// Read-only view of the room directory
    pub fn directory(&self) -> &RoomDirectory {
        &self.directory
    }

    pub fn stats(&self) -> StatsReport {
        self.directory.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::EventKind;
    use crate::session::Mailbox;

    fn hub() -> Hub {
        Hub::new(16).0
    }

    fn join(hub: &mut Hub, username: &str, room: &str, capacity: usize) -> (SessionId, Mailbox) {
        let (session, mailbox) = Session::new(username, room, capacity);
        let id = session.id;
        hub.handle_command(HubCommand::Register(session));
        (id, mailbox)
    }

    fn drain(mailbox: &mut Mailbox) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = mailbox.try_recv() {
            events.push(event);
        }
        events
    }

    fn chat(room: &str, username: &str, text: &str) -> HubCommand {
        HubCommand::Broadcast(Event::new(EventKind::Chat, room, username, text))
    }

    #[test]
    fn test_register_announces_and_lists() {
        let mut hub = hub();
        let (_, mut a_rx) = join(&mut hub, "A", "lobby", 16);

        let events = drain(&mut a_rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Join);
        assert_eq!(events[0].text, "A joined");
        assert_eq!(events[1].kind, EventKind::UserList);
        assert_eq!(events[1].text, "Users in 'lobby' (1):\n- A\n");

        let (_, _b_rx) = join(&mut hub, "B", "lobby", 16);
        let events = drain(&mut a_rx);
        assert_eq!(events[0].kind, EventKind::Join);
        assert_eq!(events[0].username, "B");
        assert_eq!(events[1].text, "Users in 'lobby' (2):\n- A\n- B\n");
    }

    #[test]
    fn test_lobby_scenario() {
        let mut hub = hub();
        let (a, mut a_rx) = join(&mut hub, "A", "lobby", 16);
        let (b, mut b_rx) = join(&mut hub, "B", "lobby", 16);
        drain(&mut a_rx);
        drain(&mut b_rx);

        hub.handle_command(chat("lobby", "A", "hi"));
        for rx in [&mut a_rx, &mut b_rx] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].kind, EventKind::Chat);
            assert_eq!(events[0].room, "lobby");
            assert_eq!(events[0].username, "A");
            assert_eq!(events[0].text, "hi");
        }

        hub.handle_command(HubCommand::Unregister {
            id: b,
            room: "lobby".into(),
        });
        let events = drain(&mut a_rx);
        assert_eq!(events[0].kind, EventKind::Leave);
        assert_eq!(events[0].username, "B");
        assert_eq!(events[1].kind, EventKind::UserList);
        assert_eq!(events[1].text, "Users in 'lobby' (1):\n- A\n");
        assert!(hub.directory().contains("lobby"));

        // B's mailbox is closed once the hub drops the session
        assert!(matches!(
            b_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        hub.handle_command(HubCommand::Unregister {
            id: a,
            room: "lobby".into(),
        });
        assert!(!hub.directory().contains("lobby"));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut hub = hub();
        let (a, _a_rx) = join(&mut hub, "A", "lobby", 16);
        let (_, mut b_rx) = join(&mut hub, "B", "lobby", 16);
        drain(&mut b_rx);

        assert!(hub.unregister("lobby", a));
        assert!(!hub.unregister("lobby", a));
        // Only one leave + user_list pair reached B
        assert_eq!(drain(&mut b_rx).len(), 2);
    }

    #[test]
    fn test_room_exists_iff_members() {
        let mut hub = hub();
        let mut ids = Vec::new();
        for (user, room) in [("a", "r1"), ("b", "r1"), ("c", "r2")] {
            let (id, rx) = join(&mut hub, user, room, 16);
            ids.push((id, room, rx));
        }
        assert_eq!(hub.directory().room_names(), vec!["r1", "r2"]);

        for (id, room, _) in &ids {
            hub.handle_command(HubCommand::Unregister {
                id: *id,
                room: room.to_string(),
            });
            for name in hub.directory().room_names() {
                assert!(!hub.directory().get(&name).unwrap().is_empty());
            }
        }
        assert!(hub.directory().is_empty());
    }

    #[test]
    fn test_broadcast_stays_in_room() {
        let mut hub = hub();
        let (_, mut a_rx) = join(&mut hub, "A", "r1", 16);
        let (_, mut b_rx) = join(&mut hub, "B", "r2", 16);
        drain(&mut a_rx);
        drain(&mut b_rx);

        hub.handle_command(chat("r1", "A", "only r1"));
        assert_eq!(drain(&mut a_rx).len(), 1);
        assert!(drain(&mut b_rx).is_empty());

        // Missing room is a no-op
        hub.handle_command(chat("nowhere", "A", "void"));
        assert!(drain(&mut a_rx).is_empty());
    }

    #[test]
    fn test_slow_session_is_evicted() {
        let mut hub = hub();
        let (_, mut a_rx) = join(&mut hub, "A", "lobby", 16);
        let (_, mut b_rx) = join(&mut hub, "B", "lobby", 3);
        drain(&mut a_rx);

        // B's mailbox holds join + user_list, one more fits, the next overflows
        hub.handle_command(chat("lobby", "A", "one"));
        hub.handle_command(chat("lobby", "A", "two"));

        let events = drain(&mut a_rx);
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Chat,
                EventKind::Chat,
                EventKind::Leave,
                EventKind::UserList
            ]
        );
        assert_eq!(events[2].username, "B");
        assert_eq!(hub.directory().get("lobby").unwrap().usernames(), vec!["A"]);

        // B keeps what was queued, then sees the mailbox closed
        assert_eq!(drain(&mut b_rx).len(), 3);
        assert!(matches!(
            b_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_capacity_one_mailbox_is_disconnected() {
        let mut hub = hub();
        let (_, mut a_rx) = join(&mut hub, "A", "lobby", 16);
        drain(&mut a_rx);

        // join fills the single slot, the user_list overflows it
        let (_, mut slow_rx) = join(&mut hub, "slow", "lobby", 1);

        assert_eq!(hub.directory().get("lobby").unwrap().len(), 1);
        assert_eq!(slow_rx.try_recv().unwrap().kind, EventKind::Join);
        assert!(matches!(
            slow_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        let kinds: Vec<EventKind> = drain(&mut a_rx).iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::Leave));
    }

    #[test]
    fn test_notification_to_all() {
        let mut hub = hub();
        let (_, mut r1) = join(&mut hub, "a", "r1", 16);
        let (_, mut r2a) = join(&mut hub, "b", "r2", 16);
        let (_, mut r2b) = join(&mut hub, "c", "r2", 16);
        for rx in [&mut r1, &mut r2a, &mut r2b] {
            drain(rx);
        }

        hub.handle_command(HubCommand::Notify(Notification::new(
            "Maintenance",
            "5 min",
            "all",
        )));

        for (rx, room) in [(&mut r1, "r1"), (&mut r2a, "r2"), (&mut r2b, "r2")] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].kind, EventKind::System);
            assert_eq!(events[0].room, room);
            assert!(events[0].text.contains("Maintenance"));
            assert!(events[0].text.contains("5 min"));
        }
        assert_eq!(hub.history().len(), 1);
        assert!(!hub.history().iter().next().unwrap().id.is_empty());
    }

    #[test]
    fn test_notification_to_room_and_user() {
        let mut hub = hub();
        let (_, mut x1) = join(&mut hub, "U", "x", 16);
        let (_, mut x2) = join(&mut hub, "V", "x", 16);
        let (_, mut y1) = join(&mut hub, "U", "y", 16);
        for rx in [&mut x1, &mut x2, &mut y1] {
            drain(rx);
        }

        hub.handle_command(HubCommand::Notify(Notification::new("t", "room", "room:x")));
        assert_eq!(drain(&mut x1).len(), 1);
        assert_eq!(drain(&mut x2).len(), 1);
        assert!(drain(&mut y1).is_empty());

        hub.handle_command(HubCommand::Notify(Notification::new("t", "user", "user:U")));
        assert_eq!(drain(&mut x1).len(), 1);
        assert!(drain(&mut x2).is_empty());
        assert_eq!(drain(&mut y1)[0].room, "y");

        // Nobody matches; still recorded
        hub.handle_command(HubCommand::Notify(Notification::new("t", "ghost", "user:nobody")));
        assert_eq!(hub.history().len(), 3);
    }

    #[test]
    fn test_history_replayed_to_joiner_only() {
        let mut hub = hub();
        hub.handle_command(HubCommand::Notify(Notification::new("Welcome", "hello", "all")));
        hub.handle_command(HubCommand::Notify(Notification::new("Other", "x", "room:other")));
        hub.handle_command(HubCommand::Notify(Notification::new("Lobby", "y", "room:lobby")));

        let (_, mut a_rx) = join(&mut hub, "A", "lobby", 16);
        let events = drain(&mut a_rx);
        let texts: Vec<&str> = events.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts[0], "A joined");
        assert_eq!(texts[1], "[NOTIF] Welcome: hello");
        assert_eq!(texts[2], "[NOTIF] Lobby: y");
        assert_eq!(events[3].kind, EventKind::UserList);
        assert_eq!(events.len(), 4);

        let (_, _b_rx) = join(&mut hub, "B", "lobby", 16);
        let texts: Vec<String> = drain(&mut a_rx).into_iter().map(|e| e.text).collect();
        assert!(texts.iter().all(|t| !t.starts_with("[NOTIF]")));
    }

    #[tokio::test]
    async fn test_handle_drives_loop() {
        let (hub, handle) = Hub::new(16);
        let task = tokio::spawn(hub.run());

        let (session, mut mailbox) = Session::new("A", "lobby", 16);
        handle.register(session).await.unwrap();
        assert_eq!(mailbox.recv().await.unwrap().kind, EventKind::Join);

        let id = handle
            .notify(Notification::new("t", "m", "room:lobby"))
            .await
            .unwrap();
        assert!(!id.is_empty());

        drop(handle);
        task.await.unwrap();
    }
}
