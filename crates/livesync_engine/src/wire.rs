//! JSON payloads of the push channel, event streams and poll endpoints.
use livesync_core::{
    Counts, EntitySnapshot, EventKind, InboundEvent, Item, ItemPatch, ItemStatus, Status,
    SubjectKind,
};
use livesync_logging::sync_debug;
use serde::{Deserialize, Serialize};

use crate::{ChannelError, SseEvent};

/// Control frame sent on the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    Subscribe {
        #[serde(rename = "subjectId")]
        subject_id: String,
    },
    Unsubscribe {
        #[serde(rename = "subjectId")]
        subject_id: String,
    },
}

impl ControlFrame {
    pub fn to_json(&self) -> Result<String, ChannelError> {
        serde_json::to_string(self).map_err(|err| ChannelError::Decode(err.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
struct WireCounts {
    total: Option<u32>,
    completed: u32,
    failed: u32,
}

impl From<WireCounts> for Counts {
    fn from(wire: WireCounts) -> Self {
        Counts {
            total: wire.total,
            completed: wire.completed,
            failed: wire.failed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PushFrame {
    event: String,
    #[serde(default)]
    data: Option<PushData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PushData {
    subject_id: Option<String>,
    version: Option<u64>,
    percentage: Option<f64>,
    status: Option<String>,
    counts: Option<WireCounts>,
    item_id: Option<String>,
    progress: Option<f64>,
    error: Option<String>,
    duration_seconds: Option<f64>,
}

/// Decodes one push channel text frame.
///
/// Returns `Ok(None)` for event names this layer does not consume.
pub fn decode_push_frame(text: &str) -> Result<Option<InboundEvent>, ChannelError> {
    let frame: PushFrame =
        serde_json::from_str(text).map_err(|err| ChannelError::Decode(err.to_string()))?;
    let data = frame.data.unwrap_or_default();
    let Some(subject_id) = data.subject_id.clone() else {
        return Err(ChannelError::Decode(format!(
            "{} event without subjectId",
            frame.event
        )));
    };

    let kind = match frame.event.as_str() {
        "subscribed" => EventKind::Subscribed,
        "progress" => EventKind::Progress {
            percentage: data.percentage.unwrap_or(0.0),
            status: data.status.as_deref().map(parse_status).transpose()?,
            counts: data.counts.map(Counts::from),
        },
        "item:updated" => EventKind::ItemUpdated {
            item_id: require_item(&frame.event, &data)?,
            patch: ItemPatch {
                status: data.status.as_deref().map(parse_item_status).transpose()?,
                progress: data.progress,
                error: data.error.clone(),
            },
        },
        "item:completed" => EventKind::ItemUpdated {
            item_id: require_item(&frame.event, &data)?,
            patch: ItemPatch {
                status: Some(ItemStatus::Completed),
                progress: Some(1.0),
                error: None,
            },
        },
        "item:failed" => EventKind::ItemFailed {
            item_id: require_item(&frame.event, &data)?,
            error: data.error.clone().unwrap_or_else(|| "item failed".to_string()),
        },
        "completed" => EventKind::Completed {
            counts: data.counts.map(Counts::from),
            duration_seconds: data.duration_seconds,
        },
        "failed" => EventKind::Failed {
            counts: data.counts.map(Counts::from),
            error: data.error.clone(),
        },
        "reset" => EventKind::Reset,
        other => {
            sync_debug!("Ignoring push event {} for {}", other, subject_id);
            return Ok(None);
        }
    };

    let event = InboundEvent::new(subject_id, kind);
    Ok(Some(match data.version {
        Some(version) => event.with_version(version),
        None => event,
    }))
}

fn require_item(event: &str, data: &PushData) -> Result<String, ChannelError> {
    data.item_id
        .clone()
        .ok_or_else(|| ChannelError::Decode(format!("{event} event without itemId")))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TextData {
    text: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StepData {
    step: Option<String>,
    status: Option<String>,
    message: Option<String>,
    progress: Option<f64>,
    text: Option<String>,
}

/// Decodes one server-sent event for a subject of `kind`.
///
/// `Ok(None)` marks keep-alives and events without meaning for the subject.
pub fn decode_stream_event(
    kind: SubjectKind,
    event: &SseEvent,
) -> Result<Option<EventKind>, ChannelError> {
    match event.event_type.as_deref() {
        Some("chunk") => {
            let data: TextData = parse_json(&event.data)?;
            Ok(data.text.map(|text| EventKind::StreamChunk { text }))
        }
        Some("done") => Ok(Some(EventKind::StreamDone)),
        Some("error") => {
            // Error payloads are JSON most of the time, plain text otherwise.
            let message = serde_json::from_str::<TextData>(&event.data)
                .ok()
                .and_then(|data| data.message)
                .unwrap_or_else(|| event.data.trim().to_string());
            Ok(Some(EventKind::StreamError { message }))
        }
        Some("ping" | "heartbeat") => Ok(None),
        _ if event.data.trim().is_empty() => Ok(None),
        _ => decode_step(kind, parse_json(&event.data)?),
    }
}

fn decode_step(kind: SubjectKind, data: StepData) -> Result<Option<EventKind>, ChannelError> {
    if kind == SubjectKind::Chat {
        if let Some(text) = data.text {
            return Ok(Some(EventKind::StreamChunk { text }));
        }
    }
    let status = data.status.as_deref().map(str::to_ascii_lowercase);
    let decoded = match (status.as_deref(), kind) {
        (Some("completed" | "complete" | "done"), SubjectKind::Chat) => EventKind::StreamDone,
        (Some("completed" | "complete" | "done"), _) => EventKind::Completed {
            counts: None,
            duration_seconds: None,
        },
        (Some("error" | "failed"), SubjectKind::Chat) => EventKind::StreamError {
            message: data.message.unwrap_or_else(|| "stream failed".to_string()),
        },
        (Some("error" | "failed"), _) => EventKind::Failed {
            counts: None,
            error: data.message,
        },
        (status, _) => {
            let Some(step) = data.step.or_else(|| status.map(str::to_string)) else {
                return Ok(None);
            };
            EventKind::Step {
                step,
                message: data.message,
                progress: data.progress,
            }
        }
    };
    Ok(Some(decoded))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSnapshot {
    status: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    percentage: Option<f64>,
    #[serde(default)]
    counts: Option<WireCounts>,
    #[serde(default)]
    items: Vec<WireItem>,
    #[serde(default)]
    version: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireItem {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

/// Decodes a poll response body. `progress` is a fraction, `percentage` is `0..=100`.
pub fn decode_snapshot(body: &str) -> Result<EntitySnapshot, ChannelError> {
    let wire: WireSnapshot = parse_json(body)?;
    let items = wire
        .items
        .into_iter()
        .map(|item| {
            Ok(Item {
                status: item
                    .status
                    .as_deref()
                    .map(parse_item_status)
                    .transpose()?
                    .unwrap_or_default(),
                progress: item.progress.unwrap_or(0.0),
                error: item.error,
                id: item.id,
            })
        })
        .collect::<Result<Vec<_>, ChannelError>>()?;

    Ok(EntitySnapshot {
        status: parse_status(&wire.status)?,
        progress: wire
            .progress
            .or(wire.percentage.map(|percentage| percentage / 100.0)),
        counts: wire.counts.map(Counts::from),
        items,
        version: wire.version,
        message: wire.message,
    })
}

fn parse_json<'a, T: Deserialize<'a>>(text: &'a str) -> Result<T, ChannelError> {
    serde_json::from_str(text).map_err(|err| ChannelError::Decode(err.to_string()))
}

fn parse_status(raw: &str) -> Result<Status, ChannelError> {
    let status = match raw.to_ascii_lowercase().replace('_', "-").as_str() {
        "pending" | "queued" => Status::Pending,
        "uploading" => Status::Uploading,
        "processing" | "running" | "in-progress" => Status::Processing,
        "completed" | "complete" => Status::Completed,
        "failed" | "error" => Status::Failed,
        "partial-failure" => Status::PartialFailure,
        "no-results" => Status::NoResults,
        _ => return Err(ChannelError::Decode(format!("unknown status {raw:?}"))),
    };
    Ok(status)
}

fn parse_item_status(raw: &str) -> Result<ItemStatus, ChannelError> {
    let status = match raw.to_ascii_lowercase().as_str() {
        "pending" | "queued" => ItemStatus::Pending,
        "processing" | "running" => ItemStatus::Processing,
        "completed" | "complete" => ItemStatus::Completed,
        "failed" | "error" => ItemStatus::Failed,
        _ => return Err(ChannelError::Decode(format!("unknown item status {raw:?}"))),
    };
    Ok(status)
}
