use std::collections::HashMap;

use livesync_core::{Effect, Msg, StreamTicket, Subject, SubjectId, Timer, TimerKind};
use livesync_logging::{sync_debug, sync_error, sync_info, sync_warn};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::engine::Collaborators;
use crate::stream::run_stream;
use crate::{EngineConfig, MsgSender, SessionStore, StreamRequest, TimerSet};

/// Executes the effects returned by `update`. Every IO task it starts
/// reports back through `msg_tx` only.
pub(crate) struct EffectRunner {
    config: EngineConfig,
    collaborators: Collaborators,
    store: SessionStore,
    msg_tx: MsgSender,
    timers: TimerSet,
    streams: HashMap<SubjectId, (StreamTicket, CancellationToken)>,
    shutdown: CancellationToken,
}

impl EffectRunner {
    pub(crate) fn new(
        config: EngineConfig,
        collaborators: Collaborators,
        store: SessionStore,
        msg_tx: MsgSender,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            collaborators,
            store,
            msg_tx,
            timers: TimerSet::new(),
            streams: HashMap::new(),
            shutdown,
        }
    }

    pub(crate) fn execute(&mut self, effect: Effect, session_id: &str) {
        match effect {
            Effect::Subscribe(id) => match &self.collaborators.push {
                Some(push) => push.subscribe(&id),
                None => sync_debug!("No push channel; cannot subscribe {}", id),
            },
            Effect::Unsubscribe(id) => {
                if let Some(push) = &self.collaborators.push {
                    push.unsubscribe(&id);
                }
            }
            Effect::OpenStream {
                subject,
                ticket,
                prompt,
            } => self.open_stream(
                StreamRequest {
                    subject,
                    session_id: session_id.to_string(),
                    prompt,
                },
                ticket,
            ),
            Effect::CloseStream { subject, ticket } => self.close_stream(&subject, ticket),
            Effect::StartTimer(timer) => self.start_timer(timer),
            Effect::CancelTimer(timer) => {
                self.timers.cancel(&timer);
            }
            Effect::PersistSession(snapshot) => {
                if let Err(err) = self.store.save(&snapshot) {
                    sync_error!("Failed to persist session {}: {}", snapshot.session_id, err);
                }
            }
            Effect::DiscardSession { session_id } => {
                if let Err(err) = self.store.discard(&session_id) {
                    sync_error!("Failed to discard session {}: {}", session_id, err);
                }
            }
            Effect::Nudge { subject } => sync_info!("{} is still waiting for attention", subject),
        }
    }

    fn open_stream(&mut self, request: StreamRequest, ticket: StreamTicket) {
        let id = request.subject.id.clone();
        if let Some((_, previous)) = self.streams.remove(&id) {
            previous.cancel();
        }
        let cancel = self.shutdown.child_token();
        self.streams.insert(id, (ticket, cancel.clone()));

        let opener = self.collaborators.streams.clone();
        let msg_tx = self.msg_tx.clone();
        tokio::spawn(async move {
            run_stream(opener.as_ref(), request, ticket, msg_tx, cancel).await;
        });
    }

    fn close_stream(&mut self, id: &SubjectId, ticket: StreamTicket) {
        if self
            .streams
            .get(id)
            .is_some_and(|(current, _)| *current == ticket)
        {
            if let Some((_, cancel)) = self.streams.remove(id) {
                cancel.cancel();
            }
        }
    }

    fn start_timer(&mut self, timer: Timer) {
        let msg_tx = self.msg_tx.clone();
        if timer.kind == TimerKind::Idle {
            let timeout = self.config.idle_timeout();
            self.timers.start(timer, async move {
                tokio::time::sleep(timeout).await;
                let _ = msg_tx.send(Msg::IdleExpired);
            });
            return;
        }

        let Some(subject) = timer.subject.clone() else {
            sync_warn!("{:?} timer without a subject", timer.kind);
            return;
        };
        let kind = timer.kind;
        match kind {
            TimerKind::Poll => {
                let task = poll_loop(self, subject, msg_tx);
                self.timers.start(timer, task);
            }
            TimerKind::AckWait => {
                let timeout = self.config.ack_timeout();
                self.timers.start(timer, async move {
                    tokio::time::sleep(timeout).await;
                    let _ = msg_tx.send(Msg::AckTimedOut(subject.id));
                });
            }
            TimerKind::Pacing => {
                let period = self.config.pacing_tick();
                self.timers.start(timer, async move {
                    let mut ticker = tokio::time::interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        if msg_tx.send(Msg::PacingTick(subject.id.clone())).is_err() {
                            break;
                        }
                    }
                });
            }
            TimerKind::Idle => {}
        }
    }

    pub(crate) fn shutdown(&mut self) {
        self.timers.cancel_all();
        for (_, (_, cancel)) in self.streams.drain() {
            cancel.cancel();
        }
    }
}

/// Fetches right away, then once per poll interval. Fetches never overlap.
fn poll_loop(
    runner: &EffectRunner,
    subject: Subject,
    msg_tx: MsgSender,
) -> impl std::future::Future<Output = ()> + Send + 'static {
    let source = runner.collaborators.snapshots.clone();
    let period = runner.config.poll_interval();
    async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let msg = match source.fetch(&subject).await {
                Ok(snapshot) => Msg::PollResponse {
                    subject: subject.id.clone(),
                    snapshot,
                },
                Err(err) => Msg::PollFailed {
                    subject: subject.id.clone(),
                    error: err.to_string(),
                },
            };
            if msg_tx.send(msg).is_err() {
                break;
            }
        }
    }
}
