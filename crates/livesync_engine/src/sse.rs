use std::pin::Pin;

use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};

use crate::ChannelError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<SseEvent, ChannelError>> + Send>>;

/// Frames a byte stream into server-sent events.
pub fn parse_sse_stream<S, E>(byte_stream: S) -> SseStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + 'static,
{
    let event_stream = byte_stream
        .map(|result| result.map_err(|e| std::io::Error::other(e.to_string())))
        .eventsource()
        .map(|result| {
            result
                .map(|event| SseEvent {
                    event_type: event_name(event.event),
                    data: event.data,
                    id: (!event.id.is_empty()).then_some(event.id),
                })
                .map_err(|e| ChannelError::Stream(e.to_string()))
        });

    Box::pin(event_stream)
}

/// Unnamed events surface as `None`, whichever default the parser fills in.
fn event_name(value: String) -> Option<String> {
    if value.is_empty() || value == "message" {
        None
    } else {
        Some(value)
    }
}
