use std::sync::Once;

use livesync_core::{
    update, ChatMessage, Effect, EventKind, InboundEvent, Msg, Role, SessionSnapshot, Source,
    StreamPhase, Subject, SubjectId, SyncSettings, SyncState, Timer, TimerKind,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(livesync_logging::initialize_for_tests);
}

fn chat_state() -> SyncState {
    init_logging();
    let (state, effects) = update(
        SyncState::new(SyncSettings::default(), "s1"),
        Msg::Mount(Subject::chat("s1")),
    );
    assert!(effects.is_empty(), "chat subjects neither poll nor stream on mount");
    state
}

fn chunk(ticket: u64, text: &str) -> Msg {
    Msg::Inbound {
        source: Source::Stream(ticket),
        event: InboundEvent::new(
            "s1",
            EventKind::StreamChunk {
                text: text.to_string(),
            },
        ),
    }
}

fn done(ticket: u64) -> Msg {
    Msg::Inbound {
        source: Source::Stream(ticket),
        event: InboundEvent::new("s1", EventKind::StreamDone),
    }
}

fn tick(state: SyncState) -> (SyncState, Vec<Effect>) {
    update(state, Msg::PacingTick(SubjectId::new("s1")))
}

fn assistant_text(state: &SyncState) -> String {
    let view = state.view();
    view.subject("s1")
        .unwrap()
        .transcript
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .last()
        .map(|m| m.text.clone())
        .unwrap_or_default()
}

fn send(state: SyncState, text: &str) -> (SyncState, Vec<Effect>) {
    update(
        state,
        Msg::SendChat {
            subject: SubjectId::new("s1"),
            text: text.to_string(),
        },
    )
}

#[test]
fn reply_is_paced_then_finished_and_persisted() {
    let chat = Subject::chat("s1");
    let (state, effects) = send(chat_state(), "hi");
    assert!(effects.contains(&Effect::OpenStream {
        subject: chat.clone(),
        ticket: 1,
        prompt: Some("hi".to_string()),
    }));
    assert!(effects.iter().any(|e| matches!(e, Effect::PersistSession(_))));

    let (state, effects) = update(state, chunk(1, "hello"));
    assert_eq!(effects, vec![Effect::StartTimer(Timer::pacing(&chat))]);
    assert_eq!(assistant_text(&state), "");

    let (state, _) = tick(state);
    assert_eq!(assistant_text(&state), "hel");

    let (state, effects) = update(state, done(1));
    assert!(effects.is_empty(), "buffer still holds text");
    assert_eq!(
        state.view().subject("s1").unwrap().stream_phase,
        StreamPhase::Done
    );

    let (state, effects) = tick(state);
    assert_eq!(assistant_text(&state), "hello");
    assert_eq!(effects[0], Effect::CancelTimer(Timer::pacing(&chat)));
    let Effect::PersistSession(snapshot) = &effects[1] else {
        panic!("expected persisted session, got {effects:?}");
    };
    assert_eq!(snapshot.session_id, "s1");
    assert_eq!(snapshot.transcript.len(), 2);
    assert!(snapshot.transcript.iter().all(|m| m.complete));
    assert!(state.pacer(&SubjectId::new("s1")).is_none());
}

fn closed(ticket: u64, error: Option<&str>) -> Msg {
    Msg::StreamClosed {
        subject: SubjectId::new("s1"),
        ticket,
        error: error.map(str::to_string),
    }
}

#[test]
fn stream_closing_without_done_still_finishes_reply() {
    let (state, _) = send(chat_state(), "hi");
    let (state, _) = update(state, chunk(1, "abc"));
    let (state, _) = tick(state);
    assert_eq!(assistant_text(&state), "abc");

    let (state, effects) = update(state, closed(1, None));
    let [Effect::PersistSession(snapshot)] = effects.as_slice() else {
        panic!("expected persisted session, got {effects:?}");
    };
    assert!(snapshot.transcript.iter().all(|m| m.complete));

    let view = state.view();
    let subject = view.subject("s1").unwrap();
    assert_eq!(subject.stream_phase, StreamPhase::Done);
    assert!(subject.transcript.last().unwrap().complete);
    assert!(state.pacer(&SubjectId::new("s1")).is_none());
}

#[test]
fn stream_closing_mid_drain_releases_buffered_text_first() {
    let (state, _) = send(chat_state(), "hi");
    let (state, _) = update(state, chunk(1, "hello"));

    let (state, effects) = update(state, closed(1, None));
    assert!(effects.is_empty(), "buffer still holds text");

    let (state, _) = tick(state);
    assert_eq!(assistant_text(&state), "hel");
    let (state, effects) = tick(state);
    assert_eq!(assistant_text(&state), "hello");
    assert!(effects.iter().any(|e| matches!(e, Effect::PersistSession(_))));
    assert!(state.pacer(&SubjectId::new("s1")).is_none());

    // A second close for the same ticket is stale.
    let (_, effects) = update(state, closed(1, None));
    assert!(effects.is_empty());
}

#[test]
fn uneven_burst_renders_at_constant_rate_and_cancel_halts() {
    let (mut state, _) = send(chat_state(), "go");
    let (next, _) = update(state, chunk(1, &"a".repeat(100)));
    state = next;

    let mut previous = 0;
    for i in 0..20 {
        let (next, _) = update(state, chunk(1, &i.to_string()[..1]));
        let (next, _) = tick(next);
        state = next;
        let len = assistant_text(&state).chars().count();
        assert_eq!(len - previous, 3);
        previous = len;
    }

    let (state, effects) = update(state, Msg::CancelReply(SubjectId::new("s1")));
    assert!(effects.contains(&Effect::CancelTimer(Timer::pacing(&Subject::chat("s1")))));
    assert!(effects.contains(&Effect::CloseStream {
        subject: SubjectId::new("s1"),
        ticket: 1,
    }));

    let frozen = assistant_text(&state);
    let (state, effects) = tick(state);
    assert!(effects.is_empty());
    assert_eq!(assistant_text(&state), frozen);
    assert_eq!(frozen.chars().count(), 60);

    // Chunks still in flight on the cancelled stream are ignored.
    let (state, _) = update(state, chunk(1, "late"));
    assert_eq!(assistant_text(&state), frozen);
}

#[test]
fn new_message_starts_a_fresh_record() {
    let (state, _) = send(chat_state(), "first");
    let (state, _) = update(state, chunk(1, "abcdef"));
    let (state, _) = tick(state);

    let (state, effects) = send(state, "second");
    assert!(effects.contains(&Effect::CloseStream {
        subject: SubjectId::new("s1"),
        ticket: 1,
    }));
    let (state, _) = update(state, chunk(1, "stale"));
    let (state, _) = update(state, chunk(2, "xyz"));
    let (state, _) = tick(state);

    let view = state.view();
    let transcript = &view.subject("s1").unwrap().transcript;
    let texts: Vec<(Role, &str)> = transcript.iter().map(|m| (m.role, m.text.as_str())).collect();
    assert_eq!(
        texts,
        vec![
            (Role::User, "first"),
            (Role::Assistant, "abc"),
            (Role::User, "second"),
            (Role::Assistant, "xyz"),
        ]
    );
}

#[test]
fn reset_session_discards_conversation_and_in_flight_reply() {
    let (state, _) = send(chat_state(), "hi");
    let (state, _) = update(state, chunk(1, "abcdef"));
    let (state, _) = tick(state);

    let (state, effects) = update(
        state,
        Msg::ResetSession {
            next_id: "s2".to_string(),
        },
    );

    assert!(effects.contains(&Effect::CancelTimer(Timer::pacing(&Subject::chat("s1")))));
    assert!(effects.contains(&Effect::CloseStream {
        subject: SubjectId::new("s1"),
        ticket: 1,
    }));
    assert!(effects.contains(&Effect::DiscardSession {
        session_id: "s1".to_string(),
    }));
    assert!(effects.contains(&Effect::PersistSession(SessionSnapshot {
        session_id: "s2".to_string(),
        transcript: Vec::new(),
        subjects: Vec::new(),
    })));

    let (state, _) = tick(state);
    let (state, _) = update(state, chunk(1, "late"));
    let view = state.view();
    assert_eq!(view.session_id, "s2");
    assert!(view.subject("s1").unwrap().transcript.is_empty());
}

#[test]
fn restored_session_rebuilds_transcript_and_subjects() {
    init_logging();
    let transcript = vec![
        ChatMessage {
            id: 1,
            role: Role::User,
            text: "status?".to_string(),
            complete: true,
            error: None,
        },
        ChatMessage {
            id: 2,
            role: Role::Assistant,
            text: "Batch B1 is processing.".to_string(),
            complete: false,
            error: None,
        },
    ];
    let (state, effects) = update(
        SyncState::new(SyncSettings::default(), "fresh"),
        Msg::SessionRestored(SessionSnapshot {
            session_id: "old".to_string(),
            transcript,
            subjects: vec![Subject::batch("B1")],
        }),
    );
    assert!(effects.contains(&Effect::StartTimer(Timer::poll(&Subject::batch("B1")))));

    let (state, _) = update(state, Msg::Mount(Subject::chat("old")));
    let view = state.view();
    assert_eq!(view.session_id, "old");
    let chat = view.subject("old").unwrap();
    assert_eq!(chat.transcript.len(), 2);
    assert!(chat.transcript.iter().all(|m| m.complete));
    assert!(view.subject("B1").is_some());
}

#[test]
fn idle_nudge_fires_once_per_period() {
    init_logging();
    let (state, effects) = update(
        SyncState::new(SyncSettings::default(), "s1"),
        Msg::Mount(Subject::batch("B1")),
    );
    assert!(effects.contains(&Effect::StartTimer(Timer::idle())));

    let (state, effects) = update(state, Msg::IdleExpired);
    assert_eq!(
        effects,
        vec![Effect::Nudge {
            subject: SubjectId::new("B1"),
        }]
    );
    assert_eq!(state.view().nudge, Some(SubjectId::new("B1")));

    let (state, effects) = update(state, Msg::IdleExpired);
    assert!(effects.is_empty(), "no repeat within the same period");

    let (state, effects) = update(state, Msg::UserActivity);
    assert_eq!(effects, vec![Effect::StartTimer(Timer::idle())]);

    let (state, effects) = update(state, Msg::SurfaceToggled(true));
    assert_eq!(effects, vec![Effect::CancelTimer(Timer::idle())]);
    assert_eq!(state.view().nudge, None);

    let (_state, effects) = update(state, Msg::IdleExpired);
    assert!(effects.is_empty(), "stale expiry after the surface opened");
}

#[test]
fn idle_timer_needs_a_subject_of_interest() {
    let state = chat_state();
    let (state, effects) = update(state, Msg::UserActivity);
    assert!(effects
        .iter()
        .all(|e| !matches!(e, Effect::StartTimer(t) if t.kind == TimerKind::Idle)));
    assert!(!state.idle().is_armed());
}
