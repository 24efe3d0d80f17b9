use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use livesync_core::{ChatMessage, Role, SessionSnapshot, Subject, SubjectKind};
use livesync_logging::{sync_debug, sync_info};
use serde::{Deserialize, Serialize};

use crate::{AtomicFileWriter, PersistError};

const CURRENT_FILENAME: &str = "current";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum PersistedRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedMessage {
    id: u64,
    role: PersistedRole,
    text: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum PersistedKind {
    Batch,
    Verification,
    Chat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedSubject {
    id: String,
    kind: PersistedKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedSession {
    session_id: String,
    #[serde(default)]
    transcript: Vec<PersistedMessage>,
    #[serde(default)]
    subjects: Vec<PersistedSubject>,
}

/// RON files under the state directory: one per session plus a `current` pointer.
#[derive(Debug, Clone)]
pub struct SessionStore {
    writer: AtomicFileWriter,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            writer: AtomicFileWriter::new(dir.into()),
        }
    }

    pub fn dir(&self) -> &Path {
        self.writer.dir()
    }

    pub fn session_path(&self, session_id: &str) -> Result<PathBuf, PersistError> {
        Ok(self.dir().join(session_filename(session_id)?))
    }

    /// Identifier the `current` pointer names, if any.
    pub fn current_id(&self) -> Result<Option<String>, PersistError> {
        let path = self.dir().join(CURRENT_FILENAME);
        match fs::read_to_string(&path) {
            Ok(text) => {
                let id = text.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Loads the session the `current` pointer names. A dangling pointer yields `None`.
    pub fn load_current(&self) -> Result<Option<SessionSnapshot>, PersistError> {
        match self.current_id()? {
            Some(id) => self.load(&id),
            None => Ok(None),
        }
    }

    pub fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>, PersistError> {
        let path = self.session_path(session_id)?;
        let content = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                sync_debug!("No persisted session at {:?}", path);
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let persisted: PersistedSession =
            ron::from_str(&content).map_err(|err| PersistError::Parse {
                path: path.clone(),
                message: err.to_string(),
            })?;
        sync_info!("Loaded session {} from {:?}", persisted.session_id, path);
        Ok(Some(persisted.into()))
    }

    /// Writes the session file, then points `current` at it.
    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<PathBuf, PersistError> {
        let filename = session_filename(&snapshot.session_id)?;
        let persisted = PersistedSession::from(snapshot);
        let content = ron::ser::to_string_pretty(&persisted, ron::ser::PrettyConfig::new())
            .map_err(|err| PersistError::Serialize(err.to_string()))?;
        let path = self.writer.write(&filename, &content)?;
        self.writer.write(CURRENT_FILENAME, &snapshot.session_id)?;
        Ok(path)
    }

    /// Deletes a session file. The `current` pointer is cleared when it names it.
    pub fn discard(&self, session_id: &str) -> Result<(), PersistError> {
        let path = self.session_path(session_id)?;
        match fs::remove_file(&path) {
            Ok(()) => sync_info!("Discarded session {}", session_id),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        if self.current_id()?.as_deref() == Some(session_id) {
            match fs::remove_file(self.dir().join(CURRENT_FILENAME)) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

fn session_filename(session_id: &str) -> Result<String, PersistError> {
    let valid = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(PersistError::InvalidSessionId(session_id.to_string()));
    }
    Ok(format!("session-{session_id}.ron"))
}

impl From<&SessionSnapshot> for PersistedSession {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            session_id: snapshot.session_id.clone(),
            transcript: snapshot
                .transcript
                .iter()
                .map(|message| PersistedMessage {
                    id: message.id,
                    role: match message.role {
                        Role::User => PersistedRole::User,
                        Role::Assistant => PersistedRole::Assistant,
                    },
                    text: message.text.clone(),
                    error: message.error.clone(),
                })
                .collect(),
            subjects: snapshot
                .subjects
                .iter()
                .map(|subject| PersistedSubject {
                    id: subject.id.to_string(),
                    kind: match subject.kind {
                        SubjectKind::Batch => PersistedKind::Batch,
                        SubjectKind::Verification => PersistedKind::Verification,
                        SubjectKind::Chat => PersistedKind::Chat,
                    },
                })
                .collect(),
        }
    }
}

impl From<PersistedSession> for SessionSnapshot {
    fn from(persisted: PersistedSession) -> Self {
        Self {
            session_id: persisted.session_id,
            transcript: persisted
                .transcript
                .into_iter()
                .map(|message| ChatMessage {
                    id: message.id,
                    role: match message.role {
                        PersistedRole::User => Role::User,
                        PersistedRole::Assistant => Role::Assistant,
                    },
                    text: message.text,
                    complete: true,
                    error: message.error,
                })
                .collect(),
            subjects: persisted
                .subjects
                .into_iter()
                .map(|subject| {
                    let kind = match subject.kind {
                        PersistedKind::Batch => SubjectKind::Batch,
                        PersistedKind::Verification => SubjectKind::Verification,
                        PersistedKind::Chat => SubjectKind::Chat,
                    };
                    Subject::new(subject.id, kind)
                })
                .collect(),
        }
    }
}
