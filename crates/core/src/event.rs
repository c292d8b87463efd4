//! Domain event system: how the engine talks to the rendering collaborator.
//!
//! The delivery controller publishes events when a character's indicator,
//! history or unread flag changes. Renderers subscribe and redraw; nothing in
//! the engine waits on a subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::message::Role;

/// Severity of a global notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A character started or stopped awaiting a reply
    TypingChanged {
        character_id: String,
        typing: bool,
    },

    /// A message was appended to a character's history
    MessageAppended {
        character_id: String,
        index: usize,
        role: Role,
        timestamp: DateTime<Utc>,
    },

    /// History changed in place (edit, delete, reroll truncation); redraw the window
    HistoryChanged { character_id: String },

    /// A reply for the character on screen, split into units to reveal in order
    ReplyReady {
        character_id: String,
        message_index: usize,
        units: Vec<String>,
        pace_ms: u64,
    },

    /// A reply arrived for a character the user is not viewing
    UnreadMarked { character_id: String },

    /// A failed send, shown inline in that character's log
    InlineError {
        character_id: String,
        anchor_index: usize,
        text: String,
    },

    /// Something the user must see regardless of which character is open
    Notice { level: NoticeLevel, message: String },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
