use std::fmt;

/// Opaque identifier of a batch, verification or chat session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SubjectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubjectKind {
    Batch,
    Verification,
    Chat,
}

impl SubjectKind {
    /// Kinds whose live updates arrive over the shared push channel.
    pub fn uses_push(self) -> bool {
        matches!(self, SubjectKind::Batch)
    }

    /// Kinds that open a one-shot event stream.
    pub fn uses_stream(self) -> bool {
        matches!(self, SubjectKind::Verification | SubjectKind::Chat)
    }

    /// Kinds with a remote entity that can be fetched on a timer.
    pub fn is_pollable(self) -> bool {
        matches!(self, SubjectKind::Batch | SubjectKind::Verification)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubjectKind::Batch => "batch",
            SubjectKind::Verification => "verification",
            SubjectKind::Chat => "chat",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Subject {
    pub id: SubjectId,
    pub kind: SubjectKind,
}

impl Subject {
    pub fn new(id: impl Into<SubjectId>, kind: SubjectKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn batch(id: impl Into<SubjectId>) -> Self {
        Self::new(id, SubjectKind::Batch)
    }

    pub fn verification(id: impl Into<SubjectId>) -> Self {
        Self::new(id, SubjectKind::Verification)
    }

    pub fn chat(id: impl Into<SubjectId>) -> Self {
        Self::new(id, SubjectKind::Chat)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
