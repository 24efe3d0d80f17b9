//! Livesync engine: transports, timers, persistence and effect execution.
mod config;
mod effects;
mod engine;
mod error;
mod persist;
mod poll;
mod push;
mod session_store;
mod sse;
mod stream;
mod timers;
mod wire;

pub use config::{ConfigError, EngineConfig};
pub use engine::{new_session_id, Collaborators, EngineHandle};
pub use error::ChannelError;
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use poll::{HttpSnapshotSource, SnapshotSource};
pub use push::{MsgSender, PushChannel, WsPushChannel};
pub use session_store::SessionStore;
pub use sse::{parse_sse_stream, SseEvent, SseStream};
pub use stream::{EventStream, HttpStreamOpener, StreamOpener, StreamRequest};
pub use timers::TimerSet;
pub use wire::{decode_push_frame, decode_snapshot, decode_stream_event, ControlFrame};
