use crate::{SessionSnapshot, StreamTicket, Subject, SubjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKind {
    /// Repeating fetch of the subject's snapshot.
    Poll,
    /// One-shot bound on the wait for a subscription acknowledgment.
    AckWait,
    /// Repeating drain beat of a pacing buffer.
    Pacing,
    /// One-shot idle period before a nudge.
    Idle,
}

/// A named, cancellable scheduled task. Starting a timer that already runs replaces it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timer {
    pub kind: TimerKind,
    pub subject: Option<Subject>,
}

impl Timer {
    pub fn poll(subject: &Subject) -> Self {
        Self::for_subject(TimerKind::Poll, subject)
    }

    pub fn ack_wait(subject: &Subject) -> Self {
        Self::for_subject(TimerKind::AckWait, subject)
    }

    pub fn pacing(subject: &Subject) -> Self {
        Self::for_subject(TimerKind::Pacing, subject)
    }

    pub fn idle() -> Self {
        Self {
            kind: TimerKind::Idle,
            subject: None,
        }
    }

    fn for_subject(kind: TimerKind, subject: &Subject) -> Self {
        Self {
            kind,
            subject: Some(subject.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Subscribe(SubjectId),
    Unsubscribe(SubjectId),
    OpenStream {
        subject: Subject,
        ticket: StreamTicket,
        prompt: Option<String>,
    },
    CloseStream {
        subject: SubjectId,
        ticket: StreamTicket,
    },
    StartTimer(Timer),
    CancelTimer(Timer),
    PersistSession(SessionSnapshot),
    DiscardSession {
        session_id: String,
    },
    /// One-time passive hint that a subject of interest is waiting.
    Nudge {
        subject: SubjectId,
    },
}
