use std::sync::Arc;

use livesync_core::{update, Msg, Subject, SubjectId, SyncState, SyncViewModel};
use livesync_logging::{sync_info, sync_warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::effects::EffectRunner;
use crate::{
    ChannelError, EngineConfig, HttpSnapshotSource, HttpStreamOpener, MsgSender, PushChannel,
    SessionStore, SnapshotSource, StreamOpener, WsPushChannel,
};

/// The remote services the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// `None` runs the engine poll-only.
    pub push: Option<Arc<dyn PushChannel>>,
    pub streams: Arc<dyn StreamOpener>,
    pub snapshots: Arc<dyn SnapshotSource>,
}

impl Collaborators {
    /// HTTP polls and streams, plus a WebSocket push channel when configured.
    pub fn http(config: &EngineConfig) -> Result<Self, ChannelError> {
        let push = config.push_url.as_ref().map(|url| {
            Arc::new(WsPushChannel::new(url.clone(), config.reconnect_backoff()))
                as Arc<dyn PushChannel>
        });
        Ok(Self {
            push,
            streams: Arc::new(HttpStreamOpener::new(
                &config.api_base,
                config.request_timeout(),
            )?),
            snapshots: Arc::new(HttpSnapshotSource::new(
                &config.api_base,
                config.request_timeout(),
            )?),
        })
    }
}

/// Fresh random session identifier.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Owns the engine task. The task is the only owner of [`SyncState`]; callers
/// talk to it through messages and read the published view.
pub struct EngineHandle {
    msg_tx: MsgSender,
    view_rx: watch::Receiver<SyncViewModel>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// Starts an engine wired to the HTTP and WebSocket collaborators.
    pub fn start(config: EngineConfig) -> Result<Self, ChannelError> {
        let collaborators = Collaborators::http(&config)?;
        Ok(Self::with_collaborators(config, collaborators))
    }

    /// Must be called from within a tokio runtime.
    pub fn with_collaborators(config: EngineConfig, collaborators: Collaborators) -> Self {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let store = SessionStore::new(config.state_dir.clone());

        let restored = store.load_current().unwrap_or_else(|err| {
            sync_warn!("Ignoring unreadable session state: {}", err);
            None
        });
        let session_id = restored
            .as_ref()
            .map(|snapshot| snapshot.session_id.clone())
            .unwrap_or_else(new_session_id);
        sync_info!("Engine starting with session {}", session_id);

        let state = SyncState::new(config.sync_settings(), session_id);
        let (view_tx, view_rx) = watch::channel(state.view());
        if let Some(snapshot) = restored {
            let _ = msg_tx.send(Msg::SessionRestored(snapshot));
        }
        if let Some(push) = &collaborators.push {
            push.start(msg_tx.clone(), shutdown.child_token());
        }

        let runner = EffectRunner::new(
            config,
            collaborators,
            store,
            msg_tx.clone(),
            shutdown.clone(),
        );
        let task = tokio::spawn(run_loop(state, msg_rx, view_tx, runner, shutdown.clone()));

        Self {
            msg_tx,
            view_rx,
            shutdown,
            task,
        }
    }

    /// Returns false once the engine has stopped.
    pub fn send(&self, msg: Msg) -> bool {
        self.msg_tx.send(msg).is_ok()
    }

    pub fn mount(&self, subject: Subject) -> bool {
        self.send(Msg::Mount(subject))
    }

    pub fn unmount(&self, id: impl Into<SubjectId>) -> bool {
        self.send(Msg::Unmount(id.into()))
    }

    pub fn send_chat(&self, subject: impl Into<SubjectId>, text: impl Into<String>) -> bool {
        self.send(Msg::SendChat {
            subject: subject.into(),
            text: text.into(),
        })
    }

    pub fn cancel_reply(&self, subject: impl Into<SubjectId>) -> bool {
        self.send(Msg::CancelReply(subject.into()))
    }

    pub fn set_surface_open(&self, open: bool) -> bool {
        self.send(Msg::SurfaceToggled(open))
    }

    pub fn user_activity(&self) -> bool {
        self.send(Msg::UserActivity)
    }

    /// Discards the current session and switches to a new one. Returns the new id.
    pub fn reset_session(&self) -> String {
        let next_id = new_session_id();
        self.send(Msg::ResetSession {
            next_id: next_id.clone(),
        });
        next_id
    }

    pub fn view(&self) -> SyncViewModel {
        self.view_rx.borrow().clone()
    }

    /// Receiver that changes whenever something visible changed.
    pub fn watch_view(&self) -> watch::Receiver<SyncViewModel> {
        self.view_rx.clone()
    }

    /// Stops every timer, stream and the push connection, then waits for the loop.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.task.await;
    }
}

async fn run_loop(
    mut state: SyncState,
    mut msg_rx: mpsc::UnboundedReceiver<Msg>,
    view_tx: watch::Sender<SyncViewModel>,
    mut runner: EffectRunner,
    shutdown: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = msg_rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        let (next, effects) = update(state, msg);
        state = next;
        for effect in effects {
            runner.execute(effect, state.session_id());
        }
        if state.consume_dirty() {
            view_tx.send_replace(state.view());
        }
    }
    runner.shutdown();
    sync_info!("Engine loop stopped");
}
