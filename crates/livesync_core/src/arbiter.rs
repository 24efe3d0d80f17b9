//! Channel arbiter: decides per subject whether a live source is authoritative
//! or whether the poll fallback must run.
use std::collections::BTreeMap;

use livesync_logging::{sync_debug, sync_info, sync_warn};

use crate::{Cache, Effect, Source, StreamTicket, Subject, SubjectId, SubjectKind, Timer};

pub const DEFAULT_DEGRADED_AFTER: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Subscription {
    #[default]
    Unsubscribed,
    Pending,
    Subscribed,
}

/// The source currently feeding a subject's entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    Push,
    Stream,
    Polling,
    /// Terminal entity: nothing is listening any more.
    Settled,
    /// Nothing open and nothing to poll (a chat between exchanges).
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSlot {
    pub subject: Subject,
    pub subscription: Subscription,
    pub polling: bool,
    pub stream: Option<StreamTicket>,
    /// Consecutive acknowledgment timeouts.
    pub ack_failures: u32,
}

impl ChannelSlot {
    fn new(subject: Subject) -> Self {
        Self {
            subject,
            subscription: Subscription::Unsubscribed,
            polling: false,
            stream: None,
            ack_failures: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arbiter {
    connection: ConnectionState,
    slots: BTreeMap<SubjectId, ChannelSlot>,
    next_ticket: StreamTicket,
    degraded_after: u32,
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::new(DEFAULT_DEGRADED_AFTER)
    }
}

impl Arbiter {
    pub fn new(degraded_after: u32) -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            slots: BTreeMap::new(),
            next_ticket: 0,
            degraded_after: degraded_after.max(1),
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn slot(&self, id: &SubjectId) -> Option<&ChannelSlot> {
        self.slots.get(id)
    }

    pub fn subjects(&self) -> impl Iterator<Item = &Subject> {
        self.slots.values().map(|slot| &slot.subject)
    }

    pub fn is_mounted(&self, id: &SubjectId) -> bool {
        self.slots.contains_key(id)
    }

    pub fn is_degraded(&self, id: &SubjectId) -> bool {
        self.slots
            .get(id)
            .is_some_and(|slot| slot.ack_failures >= self.degraded_after)
    }

    /// Registers a subject. Returns `None` when it is already mounted.
    pub fn mount(&mut self, subject: Subject, cache: &Cache) -> Option<Vec<Effect>> {
        if self.slots.contains_key(&subject.id) {
            return None;
        }
        let id = subject.id.clone();
        let kind = subject.kind;
        self.slots.insert(id.clone(), ChannelSlot::new(subject));

        let mut effects = Vec::new();
        if kind == SubjectKind::Verification {
            effects.extend(self.open_stream(&id, None));
        }
        effects.extend(self.settle(&id, cache));
        Some(effects)
    }

    /// Stops every timer, subscription and stream of a subject and forgets it.
    pub fn unmount(&mut self, id: &SubjectId) -> Vec<Effect> {
        let Some(slot) = self.slots.remove(id) else {
            return Vec::new();
        };
        let mut effects = vec![
            Effect::CancelTimer(Timer::poll(&slot.subject)),
            Effect::CancelTimer(Timer::ack_wait(&slot.subject)),
            Effect::CancelTimer(Timer::pacing(&slot.subject)),
        ];
        if slot.subscription != Subscription::Unsubscribed {
            effects.push(Effect::Unsubscribe(id.clone()));
        }
        if let Some(ticket) = slot.stream {
            effects.push(Effect::CloseStream {
                subject: id.clone(),
                ticket,
            });
        }
        effects
    }

    /// Whether an event from `source` may be merged for `id`.
    pub fn accepts(&self, id: &SubjectId, source: Source) -> bool {
        let Some(slot) = self.slots.get(id) else {
            return false;
        };
        match source {
            Source::Push => slot.subscription == Subscription::Subscribed,
            Source::Stream(ticket) => slot.stream == Some(ticket),
        }
    }

    pub fn connection_changed(&mut self, state: ConnectionState, cache: &Cache) -> Vec<Effect> {
        if state == self.connection {
            return Vec::new();
        }
        sync_info!("Push channel {:?} -> {:?}", self.connection, state);
        let was_connected = self.connection == ConnectionState::Connected;
        self.connection = state;

        let mut effects = Vec::new();
        if was_connected {
            // The server forgets subscriptions with the connection.
            for slot in self.slots.values_mut() {
                if slot.subscription != Subscription::Unsubscribed {
                    slot.subscription = Subscription::Unsubscribed;
                    effects.push(Effect::CancelTimer(Timer::ack_wait(&slot.subject)));
                }
            }
        }
        effects.extend(self.settle_all(cache));
        effects
    }

    pub fn acknowledge(&mut self, id: &SubjectId, cache: &Cache) -> Vec<Effect> {
        let connected = self.connection == ConnectionState::Connected;
        let Some(slot) = self.slots.get_mut(id) else {
            return Vec::new();
        };
        if !connected || slot.subscription == Subscription::Subscribed {
            return Vec::new();
        }
        if slot.subscription == Subscription::Unsubscribed {
            sync_debug!("Late subscription acknowledgment for {}", id);
        }
        slot.subscription = Subscription::Subscribed;
        slot.ack_failures = 0;
        let mut effects = vec![Effect::CancelTimer(Timer::ack_wait(&slot.subject))];
        effects.extend(self.settle(id, cache));
        effects
    }

    /// The bounded wait for an acknowledgment expired; retry and keep polling.
    pub fn ack_timed_out(&mut self, id: &SubjectId, cache: &Cache) -> Vec<Effect> {
        let Some(slot) = self.slots.get_mut(id) else {
            return Vec::new();
        };
        if slot.subscription != Subscription::Pending {
            return Vec::new();
        }
        slot.subscription = Subscription::Unsubscribed;
        slot.ack_failures = slot.ack_failures.saturating_add(1);
        if slot.ack_failures == self.degraded_after {
            sync_warn!(
                "No subscription acknowledgment for {} after {} attempts; staying on polling",
                id,
                slot.ack_failures
            );
        }
        self.settle(id, cache)
    }

    /// Opens a fresh stream for a subject, replacing any open one.
    pub fn open_stream(&mut self, id: &SubjectId, prompt: Option<String>) -> Vec<Effect> {
        let Some(slot) = self.slots.get_mut(id) else {
            return Vec::new();
        };
        let mut effects = Vec::new();
        if let Some(previous) = slot.stream.take() {
            effects.push(Effect::CloseStream {
                subject: id.clone(),
                ticket: previous,
            });
        }
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        slot.stream = Some(ticket);
        effects.push(Effect::OpenStream {
            subject: slot.subject.clone(),
            ticket,
            prompt,
        });
        effects
    }

    /// Explicitly closes the subject's stream, if one is open.
    pub fn close_stream(&mut self, id: &SubjectId) -> Vec<Effect> {
        let Some(ticket) = self.slots.get_mut(id).and_then(|slot| slot.stream.take()) else {
            return Vec::new();
        };
        vec![Effect::CloseStream {
            subject: id.clone(),
            ticket,
        }]
    }

    /// The engine reports that a stream ended on its own.
    pub fn stream_closed(
        &mut self,
        id: &SubjectId,
        ticket: StreamTicket,
        cache: &Cache,
    ) -> Vec<Effect> {
        let Some(slot) = self.slots.get_mut(id) else {
            return Vec::new();
        };
        if slot.stream != Some(ticket) {
            return Vec::new();
        }
        slot.stream = None;
        self.settle(id, cache)
    }

    pub fn source(&self, id: &SubjectId, cache: &Cache) -> UpdateSource {
        let Some(slot) = self.slots.get(id) else {
            return UpdateSource::Idle;
        };
        if cache.is_terminal(id) {
            UpdateSource::Settled
        } else if self.push_is_live(slot) {
            UpdateSource::Push
        } else if slot.stream.is_some() {
            UpdateSource::Stream
        } else if slot.polling {
            UpdateSource::Polling
        } else {
            UpdateSource::Idle
        }
    }

    pub fn settle_all(&mut self, cache: &Cache) -> Vec<Effect> {
        let ids: Vec<SubjectId> = self.slots.keys().cloned().collect();
        ids.iter().flat_map(|id| self.settle(id, cache)).collect()
    }

    /// Brings one subject's sources in line with its entity and the connection.
    pub fn settle(&mut self, id: &SubjectId, cache: &Cache) -> Vec<Effect> {
        let connected = self.connection == ConnectionState::Connected;
        let Some(slot) = self.slots.get_mut(id) else {
            return Vec::new();
        };
        let mut effects = Vec::new();

        if cache.is_terminal(id) {
            if slot.polling {
                slot.polling = false;
                effects.push(Effect::CancelTimer(Timer::poll(&slot.subject)));
            }
            if slot.subscription != Subscription::Unsubscribed {
                slot.subscription = Subscription::Unsubscribed;
                effects.push(Effect::CancelTimer(Timer::ack_wait(&slot.subject)));
                effects.push(Effect::Unsubscribe(id.clone()));
            }
            if let Some(ticket) = slot.stream.take() {
                effects.push(Effect::CloseStream {
                    subject: id.clone(),
                    ticket,
                });
            }
            return effects;
        }

        let kind = slot.subject.kind;
        if kind.uses_push() && connected && slot.subscription == Subscription::Unsubscribed {
            slot.subscription = Subscription::Pending;
            effects.push(Effect::Subscribe(id.clone()));
            effects.push(Effect::StartTimer(Timer::ack_wait(&slot.subject)));
        }

        let live = if kind.uses_push() {
            connected && slot.subscription == Subscription::Subscribed
        } else {
            slot.stream.is_some()
        };
        let want_poll = kind.is_pollable() && !live;
        if want_poll != slot.polling {
            slot.polling = want_poll;
            let timer = Timer::poll(&slot.subject);
            effects.push(if want_poll {
                Effect::StartTimer(timer)
            } else {
                Effect::CancelTimer(timer)
            });
        }
        effects
    }

    fn push_is_live(&self, slot: &ChannelSlot) -> bool {
        slot.subject.kind.uses_push()
            && self.connection == ConnectionState::Connected
            && slot.subscription == Subscription::Subscribed
    }
}
