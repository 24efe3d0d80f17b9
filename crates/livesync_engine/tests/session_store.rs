use std::fs;

use livesync_core::{ChatMessage, Role, SessionSnapshot, Subject};
use livesync_engine::{PersistError, SessionStore};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn snapshot(id: &str) -> SessionSnapshot {
    SessionSnapshot {
        session_id: id.to_string(),
        transcript: vec![
            ChatMessage {
                id: 1,
                role: Role::User,
                text: "How is B1 doing?".to_string(),
                complete: true,
                error: None,
            },
            ChatMessage {
                id: 2,
                role: Role::Assistant,
                text: "Nine of ten documents are done.".to_string(),
                complete: true,
                error: None,
            },
        ],
        subjects: vec![Subject::batch("B1"), Subject::verification("V1")],
    }
}

#[test]
fn saved_session_becomes_current() {
    let temp = TempDir::new().unwrap();
    let store = SessionStore::new(temp.path().join("state"));
    assert_eq!(store.load_current().unwrap(), None);

    let path = store.save(&snapshot("a1")).expect("save ok");
    assert!(path.ends_with("session-a1.ron"));
    assert_eq!(store.current_id().unwrap().as_deref(), Some("a1"));
    assert_eq!(store.load_current().unwrap(), Some(snapshot("a1")));
}

#[test]
fn loaded_messages_are_complete() {
    let temp = TempDir::new().unwrap();
    let store = SessionStore::new(temp.path());
    let mut interrupted = snapshot("a1");
    interrupted.transcript[1].complete = false;
    store.save(&interrupted).unwrap();

    let loaded = store.load("a1").unwrap().unwrap();
    assert!(loaded.transcript.iter().all(|message| message.complete));
}

#[test]
fn discard_then_save_switches_sessions() {
    let temp = TempDir::new().unwrap();
    let store = SessionStore::new(temp.path());
    store.save(&snapshot("a1")).unwrap();

    store.discard("a1").unwrap();
    assert!(!temp.path().join("session-a1.ron").exists());
    assert_eq!(store.current_id().unwrap(), None);

    let fresh = SessionSnapshot {
        session_id: "b2".to_string(),
        ..SessionSnapshot::default()
    };
    store.save(&fresh).unwrap();
    assert_eq!(store.load_current().unwrap(), Some(fresh));
    store.discard("never-saved").unwrap();
}

#[test]
fn unsafe_ids_and_corrupt_files_are_errors() {
    let temp = TempDir::new().unwrap();
    let store = SessionStore::new(temp.path());
    assert!(matches!(
        store.load("../escape"),
        Err(PersistError::InvalidSessionId(_))
    ));

    fs::write(temp.path().join("session-bad.ron"), "(session_id: ").unwrap();
    assert!(matches!(
        store.load("bad"),
        Err(PersistError::Parse { .. })
    ));
}
