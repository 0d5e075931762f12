//! Client session
//!
//! A `Session` is the hub's view of one joined participant: identity,
//! assigned room and the sending half of its outbound mailbox. The two
//! per-connection duties (inbound decode loop, outbound mailbox drain)
//! live here as well and are spawned by the connection handler.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, warn};

use crate::command;
use crate::error::MailboxError;
use crate::hub::HubHandle;
use crate::message::{Event, EventKind};
use crate::types::{now_rfc3339, SessionId};

/// Receiving half of a session mailbox, drained by the outbound duty
pub type Mailbox = mpsc::Receiver<Event>;

/// Joined participant
///
/// The hub holds the only strong sender to the mailbox, so dropping the
/// `Session` (on unregister) closes the mailbox and ends the outbound duty.
#[derive(Debug)]
pub struct Session {
    /// Unique identifier for this session
    pub id: SessionId,
    /// Display name, not unique
    pub username: String,
    /// Room this session belongs to
    pub room: String,
    /// Hub → session message channel
    sender: mpsc::Sender<Event>,
}

impl Session {
    /// Create a session together with its bounded mailbox
    pub fn new(
        username: impl Into<String>,
        room: impl Into<String>,
        mailbox_capacity: usize,
    ) -> (Self, Mailbox) {
        let (sender, receiver) = mpsc::channel(mailbox_capacity);
        let session = Self {
            id: SessionId::new(),
            username: username.into(),
            room: room.into(),
            sender,
        };
        (session, receiver)
    }

    /// Queue an event without waiting
    pub fn deliver(&self, event: Event) -> Result<(), MailboxError> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MailboxError::Full,
            mpsc::error::TrySendError::Closed(_) => MailboxError::Closed,
        })
    }

    /// Handle for direct replies that does not keep the mailbox open
    pub fn reply_handle(&self) -> ReplyHandle {
        ReplyHandle {
            sender: self.sender.downgrade(),
        }
    }
}

/// Weak access to a session's own mailbox, used for command replies
#[derive(Debug, Clone)]
pub struct ReplyHandle {
    sender: mpsc::WeakSender<Event>,
}

impl ReplyHandle {
    pub fn deliver(&self, event: Event) -> Result<(), MailboxError> {
        let sender = self.sender.upgrade().ok_or(MailboxError::Closed)?;
        sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MailboxError::Full,
            mpsc::error::TrySendError::Closed(_) => MailboxError::Closed,
        })
    }
}

/// Identity the inbound duty stamps onto everything it forwards
#[derive(Debug, Clone)]
pub struct InboundContext {
    pub id: SessionId,
    pub username: String,
    pub room: String,
    pub reply: ReplyHandle,
}

impl InboundContext {
    pub fn for_session(session: &Session) -> Self {
        Self {
            id: session.id,
            username: session.username.clone(),
            room: session.room.clone(),
            reply: session.reply_handle(),
        }
    }
}

/// Inbound duty: transport → hub
///
/// Runs until the peer closes, the transport fails, a frame fails to
/// decode, or the hub/mailbox is gone. Every received frame refreshes
/// `liveness`.
pub async fn run_inbound<S>(
    mut stream: S,
    ctx: InboundContext,
    hub: HubHandle,
    liveness: watch::Sender<Instant>,
) where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Transport error for {}: {}", ctx.id, e);
                break;
            }
        };
        liveness.send_replace(Instant::now());

        let decoded = match frame {
            Message::Text(text) => serde_json::from_str::<Event>(&text),
            Message::Binary(data) => serde_json::from_slice::<Event>(&data),
            Message::Close(_) => {
                debug!("Session {} sent close frame", ctx.id);
                break;
            }
            // Pong is answered automatically by tungstenite; both only count as liveness
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        };

        let mut event = match decoded {
            Ok(event) => event,
            Err(e) => {
                warn!("Malformed event from {} ({}): {}", ctx.username, ctx.id, e);
                break;
            }
        };

        if event.kind == EventKind::Command {
            let reply = command::interpret(&event.text, &ctx.room, hub.directory());
            if let Err(e) = ctx.reply.deliver(reply) {
                debug!("Command reply to {} not delivered: {}", ctx.id, e);
                break;
            }
            continue;
        }

        event.username = ctx.username.clone();
        event.room = ctx.room.clone();
        event.time = now_rfc3339();

        if hub.broadcast(event).await.is_err() {
            debug!("Hub closed, ending inbound duty for {}", ctx.id);
            break;
        }
    }
    debug!("Inbound duty ended for {}", ctx.id);
}

/// Outbound duty: mailbox → transport
///
/// Writes a ping every `ping_interval` regardless of chat traffic, so a
/// peer that only listens still has something to answer. Gives up once
/// nothing has been received for `pong_timeout`.
pub async fn run_outbound<K>(
    mut sink: K,
    mut mailbox: Mailbox,
    liveness: watch::Receiver<Instant>,
    ping_interval: Duration,
    pong_timeout: Duration,
) where
    K: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let mut keepalive = interval_at(Instant::now() + ping_interval, ping_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let dead_deadline = *liveness.borrow() + pong_timeout;

        tokio::select! {
            event = mailbox.recv() => {
                let Some(event) = event else {
                    debug!("Mailbox closed, ending outbound duty");
                    break;
                };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            debug!("WebSocket send failed, ending outbound duty");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to serialize event: {}", e);
                    }
                }
            }
            _ = keepalive.tick() => {
                if sink.send(Message::Ping(b"ping".to_vec().into())).await.is_err() {
                    debug!("Keepalive ping failed, ending outbound duty");
                    break;
                }
            }
            _ = sleep_until(dead_deadline) => {
                if liveness.borrow().elapsed() >= pong_timeout {
                    warn!("No liveness response within {:?}, dropping connection", pong_timeout);
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
}
