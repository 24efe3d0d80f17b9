//! Cache reconciler: the single choke point for mutating cached entities.
//!
//! Every inbound event, poll snapshot and paced text fragment is merged here, so
//! status monotonicity, terminal finality and idempotence hold no matter which
//! source delivered the update.
use std::collections::BTreeMap;

use livesync_logging::{sync_debug, sync_warn};

use crate::{
    CachedEntity, ChatMessage, EntitySnapshot, EventKind, InboundEvent, Item, ItemPatch,
    ItemStatus, MessageId, Role, Status, StreamPhase, Subject, SubjectId,
    SubjectKind,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Applied,
    Unchanged,
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    UnknownSubject,
    Terminal,
    Regression { from: Status, to: Status },
    ItemRegression { from: ItemStatus, to: ItemStatus },
    StaleVersion { current: u64, offered: u64 },
    Untrusted,
}

impl Outcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cache {
    entities: BTreeMap<SubjectId, CachedEntity>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the entity for a newly mounted subject. Returns false if it exists.
    pub fn insert(&mut self, subject: Subject) -> bool {
        if self.entities.contains_key(&subject.id) {
            return false;
        }
        self.entities
            .insert(subject.id.clone(), CachedEntity::new(subject));
        true
    }

    pub fn evict(&mut self, id: &SubjectId) -> Option<CachedEntity> {
        self.entities.remove(id)
    }

    pub fn get(&self, id: &SubjectId) -> Option<&CachedEntity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &SubjectId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn is_terminal(&self, id: &SubjectId) -> bool {
        self.entities.get(id).is_some_and(CachedEntity::is_terminal)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CachedEntity> {
        self.entities.values()
    }

    /// Merges one inbound event into the cache.
    pub fn apply(&mut self, event: &InboundEvent) -> Outcome {
        let Some(entity) = self.entities.get_mut(&event.subject) else {
            return report(
                &event.subject,
                event.kind.name(),
                Outcome::Dropped(DropReason::UnknownSubject),
            );
        };

        let outcome = if matches!(event.kind, EventKind::Reset) {
            reset(entity, event.version)
        } else if entity.is_terminal() {
            Outcome::Dropped(DropReason::Terminal)
        } else if let Some(dropped) = check_version(entity, event.version) {
            dropped
        } else {
            let outcome = merge_event(entity, &event.kind);
            if outcome.is_applied() {
                if let Some(version) = event.version {
                    entity.version = Some(version);
                }
            }
            outcome
        };

        if outcome.is_applied() {
            entity.revision += 1;
        }
        report(&event.subject, event.kind.name(), outcome)
    }

    /// Merges a full poll snapshot. Items absent from the snapshot are kept.
    pub fn apply_snapshot(&mut self, id: &SubjectId, snapshot: &EntitySnapshot) -> Outcome {
        let Some(entity) = self.entities.get_mut(id) else {
            return report(id, "snapshot", Outcome::Dropped(DropReason::UnknownSubject));
        };
        if entity.is_terminal() {
            return report(id, "snapshot", Outcome::Dropped(DropReason::Terminal));
        }
        if let Some(dropped) = check_version(entity, snapshot.version) {
            return report(id, "snapshot", dropped);
        }
        if snapshot.status != entity.status && !entity.status.can_advance_to(snapshot.status) {
            return report(
                id,
                "snapshot",
                Outcome::Dropped(DropReason::Regression {
                    from: entity.status,
                    to: snapshot.status,
                }),
            );
        }

        let mut changed = set_status(entity, snapshot.status);
        if let Some(progress) = snapshot.progress {
            changed |= raise_progress(entity, progress);
        }
        if let Some(counts) = snapshot.counts {
            changed |= replace(&mut entity.counts, counts);
        }
        if snapshot.message.is_some() {
            changed |= replace(&mut entity.message, snapshot.message.clone());
        }
        for item in &snapshot.items {
            let patch = ItemPatch {
                status: Some(item.status),
                progress: Some(item.progress),
                error: item.error.clone(),
            };
            // A stale item inside a fresh snapshot only loses that item's patch.
            if let Outcome::Applied = merge_item(entity, &item.id, &patch) {
                changed = true;
            }
        }
        if snapshot.status.is_terminal() {
            changed |= raise_progress(entity, 1.0);
        }

        let outcome = if changed {
            if let Some(version) = snapshot.version {
                entity.version = Some(version);
            }
            entity.revision += 1;
            Outcome::Applied
        } else {
            Outcome::Unchanged
        };
        report(id, "snapshot", outcome)
    }

    /// Starts a chat exchange: records the user message and opens an empty
    /// assistant message that paced text is appended to.
    pub fn begin_exchange(&mut self, id: &SubjectId, prompt: &str) -> Option<MessageId> {
        let entity = self.entities.get_mut(id)?;
        for message in entity.transcript.iter_mut().filter(|m| !m.complete) {
            message.complete = true;
        }
        let user_id = entity.next_message_id();
        entity.transcript.push(ChatMessage {
            id: user_id,
            role: Role::User,
            text: prompt.to_string(),
            complete: true,
            error: None,
        });
        let assistant_id = user_id + 1;
        entity.transcript.push(ChatMessage {
            id: assistant_id,
            role: Role::Assistant,
            text: String::new(),
            complete: false,
            error: None,
        });
        entity.stream_phase = StreamPhase::Streaming;
        entity.revision += 1;
        Some(assistant_id)
    }

    /// The assistant message currently receiving text, if any.
    pub fn open_message(&self, id: &SubjectId) -> Option<MessageId> {
        let entity = self.entities.get(id)?;
        entity
            .transcript
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.complete)
            .map(|m| m.id)
    }

    /// Appends drained text to one specific message record.
    pub fn append_text(&mut self, id: &SubjectId, message: MessageId, text: &str) -> Outcome {
        let Some(entity) = self.entities.get_mut(id) else {
            return Outcome::Dropped(DropReason::UnknownSubject);
        };
        let Some(record) = entity.transcript.iter_mut().find(|m| m.id == message) else {
            return Outcome::Dropped(DropReason::UnknownSubject);
        };
        if record.complete {
            return Outcome::Dropped(DropReason::Terminal);
        }
        if text.is_empty() {
            return Outcome::Unchanged;
        }
        record.text.push_str(text);
        entity.revision += 1;
        Outcome::Applied
    }

    pub fn finish_message(&mut self, id: &SubjectId, message: MessageId) -> Outcome {
        let Some(entity) = self.entities.get_mut(id) else {
            return Outcome::Dropped(DropReason::UnknownSubject);
        };
        match entity.transcript.iter_mut().find(|m| m.id == message) {
            Some(record) if !record.complete => {
                record.complete = true;
                entity.revision += 1;
                Outcome::Applied
            }
            Some(_) => Outcome::Unchanged,
            None => Outcome::Dropped(DropReason::UnknownSubject),
        }
    }

    /// Replaces the transcript with persisted history.
    pub fn restore_transcript(&mut self, id: &SubjectId, transcript: Vec<ChatMessage>) -> Outcome {
        let Some(entity) = self.entities.get_mut(id) else {
            return Outcome::Dropped(DropReason::UnknownSubject);
        };
        entity.transcript = transcript
            .into_iter()
            .map(|mut message| {
                message.complete = true;
                message
            })
            .collect();
        entity.stream_phase = StreamPhase::Idle;
        entity.revision += 1;
        Outcome::Applied
    }

    /// Clears every chat transcript, used when the session is discarded.
    pub fn clear_conversations(&mut self) {
        for entity in self.entities.values_mut() {
            if entity.subject.kind == SubjectKind::Chat {
                let revision = entity.revision + 1;
                *entity = CachedEntity::new(entity.subject.clone());
                entity.revision = revision;
            }
        }
    }
}

fn report(subject: &SubjectId, event: &str, outcome: Outcome) -> Outcome {
    match outcome {
        Outcome::Dropped(
            reason @ (DropReason::Regression { .. } | DropReason::ItemRegression { .. }),
        ) => {
            sync_warn!("Dropped {} for {}: backward transition {:?}", event, subject, reason);
        }
        Outcome::Dropped(reason) => {
            sync_debug!("Dropped {} for {}: {:?}", event, subject, reason);
        }
        Outcome::Unchanged | Outcome::Applied => {}
    }
    outcome
}

fn check_version(entity: &CachedEntity, offered: Option<u64>) -> Option<Outcome> {
    match (entity.version, offered) {
        (Some(current), Some(offered)) if offered == current => Some(Outcome::Unchanged),
        (Some(current), Some(offered)) if offered < current => {
            Some(Outcome::Dropped(DropReason::StaleVersion { current, offered }))
        }
        _ => None,
    }
}

fn reset(entity: &mut CachedEntity, version: Option<u64>) -> Outcome {
    let mut fresh = CachedEntity::new(entity.subject.clone());
    fresh.revision = entity.revision;
    fresh.version = version;
    *entity = fresh;
    Outcome::Applied
}

fn merge_event(entity: &mut CachedEntity, kind: &EventKind) -> Outcome {
    match kind {
        EventKind::Subscribed => Outcome::Unchanged,
        EventKind::Progress {
            percentage,
            status,
            counts,
        } => {
            if let Some(dropped) = guard_status(entity, *status) {
                return dropped;
            }
            let mut changed = status.is_some_and(|s| set_status(entity, s));
            changed |= raise_progress(entity, percentage / 100.0);
            if let Some(counts) = counts {
                changed |= replace(&mut entity.counts, *counts);
            }
            changed_outcome(changed)
        }
        EventKind::ItemUpdated { item_id, patch } => merge_item(entity, item_id, patch),
        EventKind::ItemFailed { item_id, error } => merge_item(
            entity,
            item_id,
            &ItemPatch {
                status: Some(ItemStatus::Failed),
                progress: None,
                error: Some(error.clone()),
            },
        ),
        EventKind::Completed {
            counts,
            duration_seconds,
        } => {
            let target = match counts {
                Some(c) if c.completed == 0 && c.failed == 0 => Status::NoResults,
                _ => Status::Completed,
            };
            if let Some(dropped) = guard_status(entity, Some(target)) {
                return dropped;
            }
            set_status(entity, target);
            raise_progress(entity, 1.0);
            if let Some(counts) = counts {
                entity.counts = *counts;
            }
            entity.duration_seconds = *duration_seconds;
            entity.stream_phase = StreamPhase::Done;
            Outcome::Applied
        }
        EventKind::Failed { counts, error } => {
            if let Some(dropped) = guard_status(entity, Some(Status::Failed)) {
                return dropped;
            }
            set_status(entity, Status::Failed);
            if let Some(counts) = counts {
                entity.counts = *counts;
            }
            if error.is_some() {
                entity.error = error.clone();
            }
            entity.stream_phase = StreamPhase::Errored;
            Outcome::Applied
        }
        EventKind::Step {
            step,
            message,
            progress,
        } => {
            let mut changed = false;
            if matches!(entity.status, Status::Pending | Status::Uploading) {
                changed |= set_status(entity, Status::Processing);
            }
            changed |= replace(&mut entity.step, Some(step.clone()));
            if message.is_some() {
                changed |= replace(&mut entity.message, message.clone());
            }
            if let Some(progress) = progress {
                changed |= raise_progress(entity, progress / 100.0);
            }
            changed |= replace(&mut entity.stream_phase, StreamPhase::Streaming);
            changed_outcome(changed)
        }
        EventKind::StreamChunk { text } => {
            let Some(record) = entity
                .transcript
                .iter_mut()
                .rev()
                .find(|m| m.role == Role::Assistant && !m.complete)
            else {
                return Outcome::Dropped(DropReason::Untrusted);
            };
            if text.is_empty() {
                return Outcome::Unchanged;
            }
            record.text.push_str(text);
            entity.stream_phase = StreamPhase::Streaming;
            Outcome::Applied
        }
        EventKind::StreamDone => {
            changed_outcome(replace(&mut entity.stream_phase, StreamPhase::Done))
        }
        EventKind::StreamError { message } => {
            let mut changed = replace(&mut entity.stream_phase, StreamPhase::Errored);
            if let Some(record) = entity
                .transcript
                .iter_mut()
                .rev()
                .find(|m| m.role == Role::Assistant && !m.complete)
            {
                changed |= replace(&mut record.error, Some(message.clone()));
            }
            changed_outcome(changed)
        }
        // Handled in `Cache::apply` before the terminal guard.
        EventKind::Reset => Outcome::Unchanged,
    }
}

fn merge_item(entity: &mut CachedEntity, item_id: &str, patch: &ItemPatch) -> Outcome {
    let exists = entity.items.contains_key(item_id);
    if let Some(current) = entity.items.get(item_id) {
        match patch.status {
            Some(next) if current.status != next && !current.status.can_advance_to(next) => {
                return Outcome::Dropped(DropReason::ItemRegression {
                    from: current.status,
                    to: next,
                });
            }
            // Settled items only accept a restatement of their own status.
            None if current.status.is_terminal() => return Outcome::Unchanged,
            _ => {}
        }
    }

    let item = entity
        .items
        .entry(item_id.to_string())
        .or_insert_with(|| Item::new(item_id));
    let mut changed = !exists;
    if let Some(status) = patch.status {
        changed |= replace(&mut item.status, status);
        if status == ItemStatus::Completed && item.progress < 1.0 {
            item.progress = 1.0;
            changed = true;
        }
    }
    if let Some(progress) = patch.progress {
        let progress = progress.clamp(0.0, 1.0);
        if progress > item.progress {
            item.progress = progress;
            changed = true;
        }
    }
    if patch.error.is_some() {
        changed |= replace(&mut item.error, patch.error.clone());
    }
    changed_outcome(changed)
}

fn guard_status(entity: &CachedEntity, proposed: Option<Status>) -> Option<Outcome> {
    let proposed = proposed?;
    if proposed != entity.status && !entity.status.can_advance_to(proposed) {
        return Some(Outcome::Dropped(DropReason::Regression {
            from: entity.status,
            to: proposed,
        }));
    }
    None
}

fn set_status(entity: &mut CachedEntity, status: Status) -> bool {
    replace(&mut entity.status, status)
}

fn raise_progress(entity: &mut CachedEntity, fraction: f64) -> bool {
    let fraction = fraction.clamp(0.0, 1.0);
    if fraction > entity.progress {
        entity.progress = fraction;
        true
    } else {
        false
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

fn changed_outcome(changed: bool) -> Outcome {
    if changed {
        Outcome::Applied
    } else {
        Outcome::Unchanged
    }
}
