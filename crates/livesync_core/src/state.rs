use std::collections::BTreeMap;

use livesync_logging::{sync_debug, sync_info, sync_warn};

use crate::pacing::DEFAULT_CHUNK_CHARS;
use crate::view_model::{SubjectView, SyncViewModel};
use crate::{
    Arbiter, Cache, ChatMessage, ConnectionState, Effect, EntitySnapshot, EventKind, IdleTracker,
    InboundEvent, Outcome, PacingBuffer, Session, SessionSnapshot, Source, StreamTicket, Subject,
    SubjectId, SubjectKind, Timer, DEFAULT_DEGRADED_AFTER,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Characters released per pacing beat.
    pub pacing_chunk_chars: usize,
    /// Acknowledgment timeouts before a subject is shown as degraded.
    pub degraded_after: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            pacing_chunk_chars: DEFAULT_CHUNK_CHARS,
            degraded_after: DEFAULT_DEGRADED_AFTER,
        }
    }
}

/// Everything the sync layer knows. Owned by exactly one event loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    settings: SyncSettings,
    cache: Cache,
    arbiter: Arbiter,
    pacers: BTreeMap<SubjectId, PacingBuffer>,
    session: Session,
    idle: IdleTracker,
    /// Non-chat subjects in mount order; the last one is the focus.
    interest: Vec<Subject>,
    /// Restored transcript waiting for its chat subject to be mounted.
    restored_transcript: Option<Vec<ChatMessage>>,
    nudge: Option<SubjectId>,
    dirty: bool,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new(SyncSettings::default(), "")
    }
}

impl SyncState {
    pub fn new(settings: SyncSettings, session_id: impl Into<String>) -> Self {
        Self {
            settings,
            cache: Cache::new(),
            arbiter: Arbiter::new(settings.degraded_after),
            pacers: BTreeMap::new(),
            session: Session::new(session_id),
            idle: IdleTracker::default(),
            interest: Vec::new(),
            restored_transcript: None,
            nudge: None,
            dirty: false,
        }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    pub fn idle(&self) -> &IdleTracker {
        &self.idle
    }

    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    pub fn pacer(&self, id: &SubjectId) -> Option<&PacingBuffer> {
        self.pacers.get(id)
    }

    /// Returns whether anything visible changed since the last call.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let transcript = self
            .chat_subject()
            .and_then(|id| self.cache.get(&id))
            .map(|entity| entity.transcript.clone())
            .unwrap_or_default();
        SessionSnapshot {
            session_id: self.session.id().to_string(),
            transcript,
            subjects: self.interest.clone(),
        }
    }

    pub fn view(&self) -> SyncViewModel {
        let subjects = self
            .arbiter
            .subjects()
            .filter_map(|subject| {
                let entity = self.cache.get(&subject.id)?;
                let slot = self.arbiter.slot(&subject.id)?;
                Some(SubjectView {
                    subject: subject.clone(),
                    status: entity.status,
                    progress: entity.progress,
                    counts: entity.counts,
                    items: entity.items.values().cloned().collect(),
                    step: entity.step.clone(),
                    message: entity.message.clone(),
                    error: entity.error.clone(),
                    duration_seconds: entity.duration_seconds,
                    transcript: entity.transcript.clone(),
                    stream_phase: entity.stream_phase,
                    source: self.arbiter.source(&subject.id, &self.cache),
                    subscription: slot.subscription,
                    degraded: self.arbiter.is_degraded(&subject.id),
                    terminal: entity.is_terminal(),
                    pacing: self
                        .pacers
                        .get(&subject.id)
                        .is_some_and(|pacer| !pacer.is_empty()),
                    revision: entity.revision,
                })
            })
            .collect();
        SyncViewModel {
            session_id: self.session.id().to_string(),
            connection: self.arbiter.connection(),
            subjects,
            nudge: self.nudge.clone(),
            surface_open: self.idle.surface_open(),
        }
    }

    fn focus(&self) -> Option<SubjectId> {
        self.interest.last().map(|subject| subject.id.clone())
    }

    fn chat_subject(&self) -> Option<SubjectId> {
        self.arbiter
            .subjects()
            .find(|subject| subject.kind == SubjectKind::Chat)
            .map(|subject| subject.id.clone())
    }

    fn is_chat(&self, id: &SubjectId) -> bool {
        self.arbiter
            .slot(id)
            .is_some_and(|slot| slot.subject.kind == SubjectKind::Chat)
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mount(&mut self, subject: Subject) -> Vec<Effect> {
        if self.arbiter.is_mounted(&subject.id) {
            return Vec::new();
        }
        sync_info!("Mounting {}", subject);
        self.cache.insert(subject.clone());
        let mut effects = self
            .arbiter
            .mount(subject.clone(), &self.cache)
            .unwrap_or_default();

        if subject.kind == SubjectKind::Chat {
            if let Some(transcript) = self.restored_transcript.take() {
                self.cache.restore_transcript(&subject.id, transcript);
            }
        } else {
            self.interest.push(subject);
            let focus = self.focus();
            effects.extend(self.idle.evaluate(focus.as_ref()));
        }
        self.mark_dirty();
        effects
    }

    pub(crate) fn unmount(&mut self, id: &SubjectId) -> Vec<Effect> {
        if !self.arbiter.is_mounted(id) {
            return Vec::new();
        }
        sync_info!("Unmounting {}", id);
        let mut effects = self.arbiter.unmount(id);
        if let Some(mut pacer) = self.pacers.remove(id) {
            pacer.cancel();
        }
        self.cache.evict(id);
        self.interest.retain(|subject| &subject.id != id);
        if self.nudge.as_ref() == Some(id) {
            self.nudge = None;
        }
        let focus = self.focus();
        effects.extend(self.idle.evaluate(focus.as_ref()));
        self.mark_dirty();
        effects
    }

    pub(crate) fn connection_changed(&mut self, state: ConnectionState) -> Vec<Effect> {
        if state == self.arbiter.connection() {
            return Vec::new();
        }
        self.mark_dirty();
        self.arbiter.connection_changed(state, &self.cache)
    }

    pub(crate) fn inbound(&mut self, source: Source, event: InboundEvent) -> Vec<Effect> {
        let id = event.subject.clone();
        if !self.arbiter.is_mounted(&id) {
            sync_debug!("Discarding {} for unknown subject {}", event.kind.name(), id);
            return Vec::new();
        }
        if matches!(event.kind, EventKind::Subscribed) {
            if source != Source::Push {
                return Vec::new();
            }
            self.mark_dirty();
            return self.arbiter.acknowledge(&id, &self.cache);
        }
        if !self.arbiter.accepts(&id, source) {
            sync_debug!(
                "Discarding untrusted {} for {} from {:?}",
                event.kind.name(),
                id,
                source
            );
            return Vec::new();
        }

        if self.is_chat(&id) {
            return self.chat_event(source, event);
        }

        let ends_stream = event.kind.ends_stream();
        let is_reset = matches!(event.kind, EventKind::Reset);
        if self.cache.apply(&event) == Outcome::Applied {
            self.mark_dirty();
        }
        let mut effects = Vec::new();
        if is_reset {
            effects.extend(self.stop_pacing(&id));
        }
        match source {
            Source::Stream(ticket) if ends_stream => {
                effects.extend(self.arbiter.stream_closed(&id, ticket, &self.cache));
            }
            _ => effects.extend(self.arbiter.settle(&id, &self.cache)),
        }
        effects
    }

    fn chat_event(&mut self, source: Source, event: InboundEvent) -> Vec<Effect> {
        let id = event.subject.clone();
        let mut effects = Vec::new();
        match &event.kind {
            EventKind::StreamChunk { text } => {
                let Some(message) = self.cache.open_message(&id) else {
                    sync_debug!("Chunk for {} without an open message", id);
                    return effects;
                };
                let chunk_chars = self.settings.pacing_chunk_chars;
                let pacer = self
                    .pacers
                    .entry(id.clone())
                    .or_insert_with(|| PacingBuffer::new(chunk_chars));
                if pacer.push(message, text) {
                    if let Some(slot) = self.arbiter.slot(&id) {
                        effects.push(Effect::StartTimer(Timer::pacing(&slot.subject)));
                    }
                }
                self.mark_dirty();
            }
            EventKind::StreamDone | EventKind::StreamError { .. } => {
                if self.cache.apply(&event) == Outcome::Applied {
                    self.mark_dirty();
                }
                if let Source::Stream(ticket) = source {
                    effects.extend(self.arbiter.stream_closed(&id, ticket, &self.cache));
                }
                match self.pacers.get_mut(&id) {
                    Some(pacer) => pacer.seal(),
                    None => effects.extend(self.finish_reply(&id)),
                }
                if self.pacers.get(&id).is_some_and(PacingBuffer::is_finished) {
                    self.pacers.remove(&id);
                    effects.extend(self.finish_reply(&id));
                }
            }
            _ => {
                if self.cache.apply(&event) == Outcome::Applied {
                    self.mark_dirty();
                }
            }
        }
        effects
    }

    pub(crate) fn pacing_tick(&mut self, id: &SubjectId) -> Vec<Effect> {
        let Some(pacer) = self.pacers.get_mut(id) else {
            return Vec::new();
        };
        let drained = pacer.tick();
        let draining = pacer.is_draining();
        let finished = pacer.is_finished();
        for piece in drained {
            if self.cache.append_text(id, piece.message, &piece.text) == Outcome::Applied {
                self.mark_dirty();
            }
        }

        let mut effects = Vec::new();
        if !draining {
            if let Some(slot) = self.arbiter.slot(id) {
                effects.push(Effect::CancelTimer(Timer::pacing(&slot.subject)));
            }
        }
        if finished {
            self.pacers.remove(id);
            effects.extend(self.finish_reply(id));
        }
        effects
    }

    fn finish_reply(&mut self, id: &SubjectId) -> Vec<Effect> {
        let Some(message) = self.cache.open_message(id) else {
            return Vec::new();
        };
        if self.cache.finish_message(id, message) == Outcome::Applied {
            self.mark_dirty();
        }
        vec![Effect::PersistSession(self.snapshot())]
    }

    /// Cancels the pacing buffer without releasing what it still holds.
    fn stop_pacing(&mut self, id: &SubjectId) -> Vec<Effect> {
        let Some(mut pacer) = self.pacers.remove(id) else {
            return Vec::new();
        };
        let discarded = pacer.cancel();
        if discarded > 0 {
            sync_debug!("Discarded {} paced characters for {}", discarded, id);
        }
        self.mark_dirty();
        self.arbiter
            .slot(id)
            .map(|slot| vec![Effect::CancelTimer(Timer::pacing(&slot.subject))])
            .unwrap_or_default()
    }

    pub(crate) fn ack_timed_out(&mut self, id: &SubjectId) -> Vec<Effect> {
        let effects = self.arbiter.ack_timed_out(id, &self.cache);
        if !effects.is_empty() {
            self.mark_dirty();
        }
        effects
    }

    pub(crate) fn poll_response(
        &mut self,
        id: &SubjectId,
        snapshot: &EntitySnapshot,
    ) -> Vec<Effect> {
        if !self.arbiter.is_mounted(id) {
            sync_debug!("Discarding poll response for unknown subject {}", id);
            return Vec::new();
        }
        if self.cache.apply_snapshot(id, snapshot) == Outcome::Applied {
            self.mark_dirty();
        }
        self.arbiter.settle(id, &self.cache)
    }

    pub(crate) fn poll_failed(&mut self, id: &SubjectId, error: &str) -> Vec<Effect> {
        sync_warn!("Poll for {} failed: {}", id, error);
        Vec::new()
    }

    pub(crate) fn stream_closed(
        &mut self,
        id: &SubjectId,
        ticket: StreamTicket,
        error: Option<String>,
    ) -> Vec<Effect> {
        let current = self.arbiter.slot(id).and_then(|slot| slot.stream);
        if current != Some(ticket) {
            return Vec::new();
        }
        if let Some(error) = &error {
            sync_warn!("Stream for {} closed: {}", id, error);
        }
        if self.is_chat(id) {
            // A close without a terminal event still finishes the reply.
            let kind = match error {
                Some(message) => EventKind::StreamError { message },
                None => EventKind::StreamDone,
            };
            return self.chat_event(Source::Stream(ticket), InboundEvent::new(id.clone(), kind));
        }
        self.mark_dirty();
        self.arbiter.stream_closed(id, ticket, &self.cache)
    }

    pub(crate) fn send_chat(&mut self, id: &SubjectId, text: String) -> Vec<Effect> {
        if !self.is_chat(id) || text.trim().is_empty() {
            return Vec::new();
        }
        let mut effects = self.stop_pacing(id);
        self.cache.begin_exchange(id, &text);
        effects.extend(self.arbiter.open_stream(id, Some(text)));
        let focus = self.focus();
        effects.extend(self.idle.activity(focus.as_ref()));
        effects.push(Effect::PersistSession(self.snapshot()));
        self.mark_dirty();
        effects
    }

    pub(crate) fn cancel_reply(&mut self, id: &SubjectId) -> Vec<Effect> {
        let mut effects = self.stop_pacing(id);
        effects.extend(self.arbiter.close_stream(id));
        if self.cache.open_message(id).is_some() {
            effects.extend(self.finish_reply(id));
        }
        effects
    }

    pub(crate) fn surface_toggled(&mut self, open: bool) -> Vec<Effect> {
        if open {
            self.nudge = None;
        }
        self.mark_dirty();
        let focus = self.focus();
        self.idle.set_surface_open(open, focus.as_ref())
    }

    pub(crate) fn user_activity(&mut self) -> Vec<Effect> {
        let focus = self.focus();
        self.idle.activity(focus.as_ref())
    }

    pub(crate) fn idle_expired(&mut self) -> Vec<Effect> {
        let focus = self.focus();
        let effects = self.idle.expired(focus.as_ref());
        if let Some(Effect::Nudge { subject }) = effects.first() {
            self.nudge = Some(subject.clone());
            self.mark_dirty();
        }
        effects
    }

    pub(crate) fn session_restored(&mut self, snapshot: SessionSnapshot) -> Vec<Effect> {
        sync_info!("Restoring session {}", snapshot.session_id);
        self.session = Session::new(snapshot.session_id);
        let mut effects = Vec::new();
        match self.chat_subject() {
            Some(chat) => {
                self.cache.restore_transcript(&chat, snapshot.transcript);
            }
            None if !snapshot.transcript.is_empty() => {
                self.restored_transcript = Some(snapshot.transcript);
            }
            None => {}
        }
        for subject in snapshot.subjects {
            effects.extend(self.mount(subject));
        }
        self.mark_dirty();
        effects
    }

    pub(crate) fn reset_session(&mut self, next_id: String) -> Vec<Effect> {
        let previous = self.session.rotate(next_id);
        sync_info!("Reset session {} -> {}", previous, self.session.id());
        let mut effects = Vec::new();
        let chats: Vec<SubjectId> = self
            .arbiter
            .subjects()
            .filter(|subject| subject.kind == SubjectKind::Chat)
            .map(|subject| subject.id.clone())
            .collect();
        for chat in &chats {
            effects.extend(self.stop_pacing(chat));
            effects.extend(self.arbiter.close_stream(chat));
        }
        self.cache.clear_conversations();
        self.restored_transcript = None;
        self.nudge = None;
        effects.extend(self.idle.reset());
        let focus = self.focus();
        effects.extend(self.idle.evaluate(focus.as_ref()));
        effects.push(Effect::DiscardSession {
            session_id: previous,
        });
        effects.push(Effect::PersistSession(self.snapshot()));
        self.mark_dirty();
        effects
    }
}
