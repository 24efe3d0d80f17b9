use std::collections::BTreeMap;

use crate::{ItemStatus, Status, StreamPhase, Subject};

pub type ItemId = String;
pub type MessageId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counts {
    pub total: Option<u32>,
    pub completed: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Item {
    pub id: ItemId,
    pub status: ItemStatus,
    pub progress: f64,
    pub error: Option<String>,
}

impl Item {
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Field-level patch for one item. Absent fields are left untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemPatch {
    pub status: Option<ItemStatus>,
    pub progress: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub complete: bool,
    pub error: Option<String>,
}

/// Full entity state as returned by a poll.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntitySnapshot {
    pub status: Status,
    pub progress: Option<f64>,
    pub counts: Option<Counts>,
    pub items: Vec<Item>,
    pub version: Option<u64>,
    pub message: Option<String>,
}

/// Last reconciled state of one subject. Only the reconciler mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntity {
    pub subject: Subject,
    pub status: Status,
    /// Aggregate progress as a fraction in `[0, 1]`.
    pub progress: f64,
    pub counts: Counts,
    pub items: BTreeMap<ItemId, Item>,
    pub step: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub duration_seconds: Option<f64>,
    pub transcript: Vec<ChatMessage>,
    pub stream_phase: StreamPhase,
    /// Highest server version accepted so far.
    pub version: Option<u64>,
    /// Local change counter, bumped on every applied mutation.
    pub revision: u64,
}

impl CachedEntity {
    pub fn new(subject: Subject) -> Self {
        Self {
            subject,
            status: Status::Pending,
            progress: 0.0,
            counts: Counts::default(),
            items: BTreeMap::new(),
            step: None,
            message: None,
            error: None,
            duration_seconds: None,
            transcript: Vec::new(),
            stream_phase: StreamPhase::Idle,
            version: None,
            revision: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn text(&self) -> String {
        self.transcript
            .iter()
            .filter(|message| message.role == Role::Assistant)
            .map(|message| message.text.as_str())
            .collect()
    }

    pub(crate) fn next_message_id(&self) -> MessageId {
        self.transcript.last().map_or(1, |message| message.id + 1)
    }
}
