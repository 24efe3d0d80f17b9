//! Livesync core: pure reconciliation state machine and view-model helpers.
mod arbiter;
mod effect;
mod entity;
mod event;
mod msg;
mod pacing;
mod reconcile;
mod session;
mod state;
mod status;
mod subject;
mod update;
mod view_model;

pub use arbiter::{
    Arbiter, ChannelSlot, ConnectionState, Subscription, UpdateSource, DEFAULT_DEGRADED_AFTER,
};
pub use effect::{Effect, Timer, TimerKind};
pub use entity::{
    CachedEntity, ChatMessage, Counts, EntitySnapshot, Item, ItemId, ItemPatch, MessageId, Role,
};
pub use event::{EventKind, InboundEvent, Source, StreamTicket};
pub use msg::Msg;
pub use pacing::{Drained, PacingBuffer, DEFAULT_CHUNK_CHARS};
pub use reconcile::{Cache, DropReason, Outcome};
pub use session::{IdleTracker, Session, SessionSnapshot};
pub use state::{SyncSettings, SyncState};
pub use status::{ItemStatus, Status, StreamPhase};
pub use subject::{Subject, SubjectId, SubjectKind};
pub use update::update;
pub use view_model::{SubjectView, SyncViewModel};
