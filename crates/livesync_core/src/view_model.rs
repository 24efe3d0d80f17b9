use crate::{
    ChatMessage, ConnectionState, Counts, Item, Status, StreamPhase, Subject, SubjectId,
    Subscription, UpdateSource,
};

/// Read-only projection handed to the rendering layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncViewModel {
    pub session_id: String,
    pub connection: ConnectionState,
    pub subjects: Vec<SubjectView>,
    pub nudge: Option<SubjectId>,
    pub surface_open: bool,
}

impl SyncViewModel {
    pub fn connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    pub fn subject(&self, id: &str) -> Option<&SubjectView> {
        self.subjects.iter().find(|view| view.subject.id.as_str() == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectView {
    pub subject: Subject,
    pub status: Status,
    pub progress: f64,
    pub counts: Counts,
    pub items: Vec<Item>,
    pub step: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub duration_seconds: Option<f64>,
    pub transcript: Vec<ChatMessage>,
    pub stream_phase: StreamPhase,
    pub source: UpdateSource,
    pub subscription: Subscription,
    /// Push never acknowledged after repeated attempts; updates come from polling only.
    pub degraded: bool,
    pub terminal: bool,
    /// Text is still queued for paced display.
    pub pacing: bool,
    pub revision: u64,
}
