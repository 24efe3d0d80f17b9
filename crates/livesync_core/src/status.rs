use std::fmt;

/// Lifecycle of a remote job as seen by the cache.
///
/// Transitions only move forward: `Pending -> Uploading -> Processing`, then one of
/// the post-processing outcomes. `PartialFailure` is the only outcome that may
/// still move on; the others are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    #[default]
    Pending,
    Uploading,
    Processing,
    PartialFailure,
    Completed,
    Failed,
    NoResults,
}

impl Status {
    fn rank(self) -> u8 {
        match self {
            Status::Pending => 0,
            Status::Uploading => 1,
            Status::Processing => 2,
            Status::PartialFailure | Status::Completed | Status::Failed | Status::NoResults => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::NoResults)
    }

    /// Whether the graph admits `self -> next`. Staying put is not a transition.
    pub fn can_advance_to(self, next: Status) -> bool {
        if self == next || self.is_terminal() {
            return false;
        }
        if self == Status::PartialFailure {
            return next.is_terminal();
        }
        next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Uploading => "uploading",
            Status::Processing => "processing",
            Status::PartialFailure => "partial-failure",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::NoResults => "no-results",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-item lifecycle inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ItemStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    fn rank(self) -> u8 {
        match self {
            ItemStatus::Pending => 0,
            ItemStatus::Processing => 1,
            ItemStatus::Completed | ItemStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }

    pub fn can_advance_to(self, next: ItemStatus) -> bool {
        self != next && !self.is_terminal() && next.rank() > self.rank()
    }
}

/// Phase of the current exchange on a text stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    #[default]
    Idle,
    Streaming,
    Done,
    Errored,
}
