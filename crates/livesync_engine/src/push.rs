//! Shared push channel over a WebSocket.
use std::sync::Mutex;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use livesync_core::{ConnectionState, Msg, Source, SubjectId};
use livesync_logging::{sync_debug, sync_info, sync_warn};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::{decode_push_frame, ControlFrame};

pub type MsgSender = mpsc::UnboundedSender<Msg>;

/// One connection shared by every subject that uses push.
///
/// Connection state changes and decoded events are delivered as messages;
/// subscribe and unsubscribe are fire-and-forget.
pub trait PushChannel: Send + Sync {
    fn start(&self, events: MsgSender, shutdown: CancellationToken);
    fn subscribe(&self, subject: &SubjectId);
    fn unsubscribe(&self, subject: &SubjectId);
}

pub struct WsPushChannel {
    url: String,
    backoff: Duration,
    control_tx: mpsc::UnboundedSender<ControlFrame>,
    control_rx: Mutex<Option<mpsc::UnboundedReceiver<ControlFrame>>>,
}

impl WsPushChannel {
    pub fn new(url: impl Into<String>, backoff: Duration) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        Self {
            url: url.into(),
            backoff,
            control_tx,
            control_rx: Mutex::new(Some(control_rx)),
        }
    }

    fn send(&self, frame: ControlFrame) {
        if self.control_tx.send(frame).is_err() {
            sync_debug!("Push channel stopped; dropping control frame");
        }
    }
}

impl PushChannel for WsPushChannel {
    fn start(&self, events: MsgSender, shutdown: CancellationToken) {
        let control_rx = self.control_rx.lock().ok().and_then(|mut slot| slot.take());
        let Some(control_rx) = control_rx else {
            sync_warn!("Push channel {} already started", self.url);
            return;
        };
        tokio::spawn(run_connection(
            self.url.clone(),
            self.backoff,
            control_rx,
            events,
            shutdown,
        ));
    }

    fn subscribe(&self, subject: &SubjectId) {
        self.send(ControlFrame::Subscribe {
            subject_id: subject.to_string(),
        });
    }

    fn unsubscribe(&self, subject: &SubjectId) {
        self.send(ControlFrame::Unsubscribe {
            subject_id: subject.to_string(),
        });
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the socket; `wss://` URLs go through rustls with the webpki roots.
async fn connect(url: &str) -> Result<Socket, tungstenite::Error> {
    // Fails harmlessly when a provider is already installed.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let (socket, _) = connect_async(url).await?;
    Ok(socket)
}

/// Connects, pumps frames both ways, and reconnects after a fixed backoff.
async fn run_connection(
    url: String,
    backoff: Duration,
    mut control_rx: mpsc::UnboundedReceiver<ControlFrame>,
    events: MsgSender,
    shutdown: CancellationToken,
) {
    let report = |state| events.send(Msg::ConnectionChanged(state)).is_ok();

    while !shutdown.is_cancelled() {
        if !report(ConnectionState::Connecting) {
            return;
        }
        let connected = tokio::select! {
            _ = shutdown.cancelled() => return,
            connected = connect(&url) => connected,
        };
        match connected {
            Ok(socket) => {
                // Frames queued while offline belong to the old connection.
                while control_rx.try_recv().is_ok() {}
                sync_info!("Push channel connected to {}", url);
                if !report(ConnectionState::Connected) {
                    return;
                }

                let (mut sink, mut stream) = socket.split();
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            let _ = sink.close().await;
                            let _ = report(ConnectionState::Disconnected);
                            return;
                        }
                        frame = control_rx.recv() => {
                            let Some(frame) = frame else {
                                let _ = sink.close().await;
                                return;
                            };
                            match frame.to_json() {
                                Ok(json) => {
                                    if let Err(err) = sink.send(Message::text(json)).await {
                                        sync_warn!("Push send failed: {}", err);
                                        break;
                                    }
                                }
                                Err(err) => sync_warn!("Cannot encode control frame: {}", err),
                            }
                        }
                        message = stream.next() => match message {
                            Some(Ok(Message::Text(text))) => match decode_push_frame(text.as_str()) {
                                Ok(Some(event)) => {
                                    if events.send(Msg::Inbound { source: Source::Push, event }).is_err() {
                                        return;
                                    }
                                }
                                Ok(None) => {}
                                Err(err) => sync_debug!("Dropping push frame: {}", err),
                            },
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(err)) => {
                                sync_warn!("Push channel error: {}", err);
                                break;
                            }
                        },
                    }
                }
                sync_info!("Push channel to {} lost", url);
            }
            Err(err) => sync_warn!("Push connect to {} failed: {}", url, err),
        }

        if !report(ConnectionState::Disconnected) {
            return;
        }
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}
