//! Session identity, persisted conversation and the idle nudge.
use crate::{ChatMessage, Effect, Subject, SubjectId, Timer};

/// Everything that survives a reload, keyed by `session_id`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub transcript: Vec<ChatMessage>,
    pub subjects: Vec<Subject>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Swaps in a fresh identifier and returns the discarded one.
    pub(crate) fn rotate(&mut self, next: impl Into<String>) -> String {
        std::mem::replace(&mut self.id, next.into())
    }
}

/// One-shot idle nudge per idle period.
///
/// The timer is armed while a subject of interest exists and the interactive
/// surface is closed. Expiry nudges once; a new period starts only on user
/// activity or when the surface is opened.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdleTracker {
    surface_open: bool,
    armed: bool,
    nudged: bool,
}

impl IdleTracker {
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn has_nudged(&self) -> bool {
        self.nudged
    }

    pub fn surface_open(&self) -> bool {
        self.surface_open
    }

    pub fn set_surface_open(&mut self, open: bool, focus: Option<&SubjectId>) -> Vec<Effect> {
        self.surface_open = open;
        if open {
            self.nudged = false;
        }
        self.evaluate(focus)
    }

    /// User interaction restarts the idle period.
    pub fn activity(&mut self, focus: Option<&SubjectId>) -> Vec<Effect> {
        self.nudged = false;
        let mut effects = Vec::new();
        if self.armed {
            self.armed = false;
            effects.push(Effect::CancelTimer(Timer::idle()));
        }
        effects.extend(self.evaluate(focus));
        effects
    }

    pub fn evaluate(&mut self, focus: Option<&SubjectId>) -> Vec<Effect> {
        let wanted = focus.is_some() && !self.surface_open && !self.nudged;
        match (wanted, self.armed) {
            (true, false) => {
                self.armed = true;
                vec![Effect::StartTimer(Timer::idle())]
            }
            (false, true) => {
                self.armed = false;
                vec![Effect::CancelTimer(Timer::idle())]
            }
            _ => Vec::new(),
        }
    }

    pub fn expired(&mut self, focus: Option<&SubjectId>) -> Vec<Effect> {
        if !self.armed {
            return Vec::new();
        }
        self.armed = false;
        match focus {
            Some(subject) if !self.surface_open => {
                self.nudged = true;
                vec![Effect::Nudge {
                    subject: subject.clone(),
                }]
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn reset(&mut self) -> Vec<Effect> {
        let was_armed = self.armed;
        self.armed = false;
        self.nudged = false;
        if was_armed {
            vec![Effect::CancelTimer(Timer::idle())]
        } else {
            Vec::new()
        }
    }
}
