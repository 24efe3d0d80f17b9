use crate::{
    ConnectionState, EntitySnapshot, InboundEvent, SessionSnapshot, Source, StreamTicket, Subject,
    SubjectId,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// A view started observing a subject.
    Mount(Subject),
    /// The view went away; everything owned by the subject is torn down.
    Unmount(SubjectId),
    /// The shared push connection changed state.
    ConnectionChanged(ConnectionState),
    /// An event from the push channel or an open stream.
    Inbound { source: Source, event: InboundEvent },
    /// The bounded wait for a subscription acknowledgment ran out.
    AckTimedOut(SubjectId),
    /// A poll returned the current remote state.
    PollResponse {
        subject: SubjectId,
        snapshot: EntitySnapshot,
    },
    PollFailed { subject: SubjectId, error: String },
    /// Drain beat of a subject's pacing buffer.
    PacingTick(SubjectId),
    /// A stream task ended, with or without a terminal event.
    StreamClosed {
        subject: SubjectId,
        ticket: StreamTicket,
        error: Option<String>,
    },
    /// User sent a chat message.
    SendChat { subject: SubjectId, text: String },
    /// User stopped the reply being streamed.
    CancelReply(SubjectId),
    /// The interactive chat surface was opened or closed.
    SurfaceToggled(bool),
    UserActivity,
    IdleExpired,
    /// Persisted session loaded at startup.
    SessionRestored(SessionSnapshot),
    /// User asked for a fresh session; `next_id` is the new identifier.
    ResetSession { next_id: String },
    Tick,
    NoOp,
}
