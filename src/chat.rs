//! The shared chat room: message log, presence registry, and broadcast.
//!
//! This is the only state touched by more than one session task, so it all
//! lives behind a single mutex. Compound operations (join, post, leave)
//! append to the log and fan out events under one lock acquisition, which
//! guarantees every session observes joins, leaves, and messages in the
//! same order.
//!
//! Fan-out is queue-based: the room never renders and never writes to a
//! transport. Each session registers an `mpsc` sender; the room enqueues
//! [`PeerEvent`]s and only the owning session task drains its queue and
//! touches its own output.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Cap on retained messages; the oldest entry drops first.
pub const MESSAGE_CAP: usize = 500;

/// Default bound on concurrently registered sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 64;

/// Capacity of each session's inbound event queue. Redraw events coalesce
/// naturally (a dropped one is covered by the next), so a small bound is
/// fine.
const PEER_EVENT_CAPACITY: usize = 64;

/// Cross-session events, drained by the owning session task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    /// Repaint your screen; the shared log changed.
    Redraw,
    /// Ring the bell; someone else said or did something.
    Notify,
}

/// Who produced a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    User(String),
    System,
}

/// One immutable entry in the shared log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub origin: Origin,
    pub text: String,
}

impl Message {
    fn user(name: &str, text: String) -> Self {
        Self {
            origin: Origin::User(name.to_string()),
            text,
        }
    }

    fn system(text: String) -> Self {
        Self {
            origin: Origin::System,
            text,
        }
    }

    /// The log line as shown in every message area.
    pub fn render(&self) -> String {
        match &self.origin {
            Origin::User(name) => format!("{}: {}", name, self.text),
            Origin::System => self.text.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("username already taken: {0}")]
    NameTaken(String),
    #[error("chat is full ({0} sessions)")]
    AtCapacity(usize),
}

struct RoomInner {
    log: VecDeque<Message>,
    peers: HashMap<String, mpsc::Sender<PeerEvent>>,
    max_sessions: Option<usize>,
}

impl RoomInner {
    fn append(&mut self, message: Message) {
        if self.log.len() == MESSAGE_CAP {
            self.log.pop_front();
        }
        self.log.push_back(message);
    }

    fn broadcast_redraw(&self) {
        for (name, tx) in &self.peers {
            if tx.try_send(PeerEvent::Redraw).is_err() {
                tracing::debug!(session = %name, "redraw queue full or closed");
            }
        }
    }

    fn broadcast_notify(&self, excluding: &str) {
        for (name, tx) in &self.peers {
            if name == excluding {
                continue;
            }
            if tx.try_send(PeerEvent::Notify).is_err() {
                tracing::debug!(session = %name, "notify queue full or closed");
            }
        }
    }
}

/// Handle to the shared room; cheap to clone, one per session task.
#[derive(Clone)]
pub struct ChatRoom {
    inner: Arc<Mutex<RoomInner>>,
}

impl ChatRoom {
    pub fn new() -> Self {
        Self::with_max_sessions(Some(DEFAULT_MAX_SESSIONS))
    }

    pub fn with_max_sessions(max_sessions: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RoomInner {
                log: VecDeque::with_capacity(MESSAGE_CAP),
                peers: HashMap::new(),
                max_sessions,
            })),
        }
    }

    /// Create the event queue for a joining session. The receiver goes to
    /// the session task, the sender to [`ChatRoom::join`].
    pub fn event_queue() -> (mpsc::Sender<PeerEvent>, mpsc::Receiver<PeerEvent>) {
        mpsc::channel(PEER_EVENT_CAPACITY)
    }

    /// **Advisory** availability check at authentication time.
    ///
    /// Lets the server reject an obviously taken name before the shell
    /// opens. The authoritative check is [`ChatRoom::join`], which runs
    /// under the lock; losing the race between the two costs one error
    /// frame, nothing more.
    pub fn available(&self, username: &str) -> Result<(), ChatError> {
        let inner = self.inner.lock();
        if inner.peers.contains_key(username) {
            return Err(ChatError::NameTaken(username.to_string()));
        }
        if let Some(max) = inner.max_sessions {
            if inner.peers.len() >= max {
                return Err(ChatError::AtCapacity(max));
            }
        }
        Ok(())
    }

    /// Register a session, announce it, and wake everyone.
    ///
    /// Registration, the join notice, and the fan-out happen under one
    /// lock acquisition: either the session is fully present (in the
    /// registry AND announced) or not at all.
    pub fn join(&self, username: &str, events: mpsc::Sender<PeerEvent>) -> Result<(), ChatError> {
        let mut inner = self.inner.lock();
        if let Some(max) = inner.max_sessions {
            if inner.peers.len() >= max {
                return Err(ChatError::AtCapacity(max));
            }
        }
        if inner.peers.contains_key(username) {
            return Err(ChatError::NameTaken(username.to_string()));
        }
        inner.peers.insert(username.to_string(), events);
        inner.append(Message::system(format!("+ {username} joined")));
        inner.broadcast_redraw();
        inner.broadcast_notify(username);
        tracing::info!(session = %username, online = inner.peers.len(), "joined");
        Ok(())
    }

    /// Unregister a session and announce its departure.
    ///
    /// Idempotent: a name that is not registered (never joined, or already
    /// left) does nothing — no spurious leave notice for ghost
    /// connections.
    pub fn leave(&self, username: &str) {
        let mut inner = self.inner.lock();
        if inner.peers.remove(username).is_none() {
            return;
        }
        inner.append(Message::system(format!("+ {username} left")));
        inner.broadcast_redraw();
        inner.broadcast_notify(username);
        tracing::info!(session = %username, online = inner.peers.len(), "left");
    }

    /// Append a user message and wake everyone else.
    pub fn post(&self, username: &str, text: String) {
        let mut inner = self.inner.lock();
        inner.append(Message::user(username, text));
        inner.broadcast_redraw();
        inner.broadcast_notify(username);
    }

    /// Enqueue a redraw to every registered session.
    pub fn broadcast_redraw(&self) {
        self.inner.lock().broadcast_redraw();
    }

    /// Enqueue a notify to every registered session except `excluding`.
    pub fn broadcast_notify(&self, excluding: &str) {
        self.inner.lock().broadcast_notify(excluding);
    }

    /// The newest `n` log lines, oldest first.
    pub fn recent(&self, n: usize) -> Vec<String> {
        let inner = self.inner.lock();
        let skip = inner.log.len().saturating_sub(n);
        inner.log.iter().skip(skip).map(Message::render).collect()
    }

    /// Number of currently registered sessions.
    pub fn online(&self) -> usize {
        self.inner.lock().peers.len()
    }
}

impl Default for ChatRoom {
    fn default() -> Self {
        Self::new()
    }
}
