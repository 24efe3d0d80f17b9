use std::pin::Pin;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use livesync_core::{EventKind, InboundEvent, Msg, Source, StreamTicket, Subject, SubjectKind};
use livesync_logging::{sync_debug, sync_warn};
use reqwest::header::ACCEPT;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{decode_stream_event, parse_sse_stream, ChannelError, MsgSender};

pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventKind, ChannelError>> + Send>>;

/// What to open: a verification's event feed or one chat reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub subject: Subject,
    pub session_id: String,
    pub prompt: Option<String>,
}

#[async_trait::async_trait]
pub trait StreamOpener: Send + Sync {
    async fn open(&self, request: &StreamRequest) -> Result<EventStream, ChannelError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

/// Opens SSE streams against the HTTP API.
#[derive(Debug, Clone)]
pub struct HttpStreamOpener {
    api_base: Url,
    client: reqwest::Client,
}

impl HttpStreamOpener {
    pub fn new(api_base: &str, connect_timeout: Duration) -> Result<Self, ChannelError> {
        // No overall timeout: a stream stays open for as long as the server keeps sending.
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            api_base: Url::parse(api_base)?,
            client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ChannelError> {
        endpoint(&self.api_base, segments)
    }
}

#[async_trait::async_trait]
impl StreamOpener for HttpStreamOpener {
    async fn open(&self, request: &StreamRequest) -> Result<EventStream, ChannelError> {
        let id = request.subject.id.as_str();
        let builder = match request.subject.kind {
            SubjectKind::Verification => self
                .client
                .get(self.endpoint(&["verifications", id, "events"])?),
            SubjectKind::Chat => {
                let message = request.prompt.as_deref().unwrap_or_default();
                self.client
                    .post(self.endpoint(&["chat", &request.session_id, "messages"])?)
                    .json(&ChatRequest { message })
            }
            SubjectKind::Batch => {
                return Err(ChannelError::Unsupported(
                    request.subject.kind.as_str().to_string(),
                ))
            }
        };

        let response = builder.header(ACCEPT, "text/event-stream").send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::HttpStatus(status.as_u16()));
        }

        let kind = request.subject.kind;
        let events = parse_sse_stream(response.bytes_stream()).filter_map(move |result| {
            let decoded = result.and_then(|event| decode_stream_event(kind, &event));
            async move {
                match decoded {
                    Ok(Some(kind)) => Some(Ok(kind)),
                    Ok(None) => None,
                    Err(err) => Some(Err(err)),
                }
            }
        });
        Ok(Box::pin(events))
    }
}

/// Appends escaped path segments to `base`.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ChannelError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ChannelError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Pumps one stream into the message loop until it ends or `cancel` fires.
///
/// Always finishes with `StreamClosed` unless cancelled; the core ignores it
/// when the ticket is no longer current.
pub(crate) async fn run_stream(
    opener: &dyn StreamOpener,
    request: StreamRequest,
    ticket: StreamTicket,
    msg_tx: MsgSender,
    cancel: CancellationToken,
) {
    let subject = request.subject.id.clone();
    let closed = |error: Option<String>| Msg::StreamClosed {
        subject: subject.clone(),
        ticket,
        error,
    };

    let opened = tokio::select! {
        _ = cancel.cancelled() => return,
        opened = opener.open(&request) => opened,
    };
    let mut events = match opened {
        Ok(events) => events,
        Err(err) => {
            sync_warn!("Opening stream for {} failed: {}", request.subject, err);
            let _ = msg_tx.send(closed(Some(err.to_string())));
            return;
        }
    };
    sync_debug!("Stream {} open for {}", ticket, request.subject);

    let error = loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                sync_debug!("Stream {} for {} cancelled", ticket, request.subject);
                return;
            }
            next = events.next() => next,
        };
        match next {
            Some(Ok(kind)) => {
                let ends = kind.ends_stream();
                let event = InboundEvent::new(subject.clone(), kind);
                if msg_tx
                    .send(Msg::Inbound {
                        source: Source::Stream(ticket),
                        event,
                    })
                    .is_err()
                {
                    return;
                }
                if ends {
                    break None;
                }
            }
            Some(Err(err)) => break Some(err.to_string()),
            None => break None,
        }
    };
    let _ = msg_tx.send(closed(error));
}
