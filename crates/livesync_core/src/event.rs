use crate::{Counts, ItemId, ItemPatch, Status, SubjectId};

/// Identifies one opened event stream. Issued by the core, echoed by the engine.
pub type StreamTicket = u64;

/// Where an inbound event was delivered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Push,
    Stream(StreamTicket),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub subject: SubjectId,
    /// Server-side version, when the backend provides one.
    pub version: Option<u64>,
    pub kind: EventKind,
}

impl InboundEvent {
    pub fn new(subject: impl Into<SubjectId>, kind: EventKind) -> Self {
        Self {
            subject: subject.into(),
            version: None,
            kind,
        }
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Push channel acknowledged the subscription.
    Subscribed,
    /// Whole-entity progress patch. `percentage` is in `0..=100`.
    Progress {
        percentage: f64,
        status: Option<Status>,
        counts: Option<Counts>,
    },
    ItemUpdated {
        item_id: ItemId,
        patch: ItemPatch,
    },
    ItemFailed {
        item_id: ItemId,
        error: String,
    },
    Completed {
        counts: Option<Counts>,
        duration_seconds: Option<f64>,
    },
    Failed {
        counts: Option<Counts>,
        error: Option<String>,
    },
    /// Non-terminal step report from a verification stream.
    Step {
        step: String,
        message: Option<String>,
        progress: Option<f64>,
    },
    StreamChunk {
        text: String,
    },
    StreamDone,
    StreamError {
        message: String,
    },
    /// Clears the entity and restarts it at `Pending`.
    Reset,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Subscribed => "subscribed",
            EventKind::Progress { .. } => "progress",
            EventKind::ItemUpdated { .. } => "item-updated",
            EventKind::ItemFailed { .. } => "item-failed",
            EventKind::Completed { .. } => "completed",
            EventKind::Failed { .. } => "failed",
            EventKind::Step { .. } => "step",
            EventKind::StreamChunk { .. } => "stream-chunk",
            EventKind::StreamDone => "stream-done",
            EventKind::StreamError { .. } => "stream-error",
            EventKind::Reset => "reset",
        }
    }

    /// Events that end a one-shot stream.
    pub fn ends_stream(&self) -> bool {
        matches!(
            self,
            EventKind::StreamDone
                | EventKind::StreamError { .. }
                | EventKind::Completed { .. }
                | EventKind::Failed { .. }
        )
    }
}
