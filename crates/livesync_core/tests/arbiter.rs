use std::sync::Once;

use livesync_core::{
    update, ConnectionState, Effect, EntitySnapshot, EventKind, InboundEvent, Msg, Source, Status,
    Subject, SubjectId, Subscription, SyncSettings, SyncState, Timer, TimerKind, UpdateSource,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(livesync_logging::initialize_for_tests);
}

fn mounted_batch() -> SyncState {
    init_logging();
    let (state, _) = update(
        SyncState::new(SyncSettings::default(), "session-1"),
        Msg::Mount(Subject::batch("B1")),
    );
    state
}

fn step(state: SyncState, msg: Msg) -> (SyncState, Vec<Effect>) {
    update(state, msg)
}

fn push(event: InboundEvent) -> Msg {
    Msg::Inbound {
        source: Source::Push,
        event,
    }
}

fn polling(state: &SyncState) -> bool {
    state.arbiter().slot(&SubjectId::new("B1")).unwrap().polling
}

#[test]
fn mount_while_disconnected_starts_polling() {
    init_logging();
    let state = SyncState::new(SyncSettings::default(), "session-1");
    let (state, effects) = step(state, Msg::Mount(Subject::batch("B1")));

    assert!(effects.contains(&Effect::StartTimer(Timer::poll(&Subject::batch("B1")))));
    assert!(!effects.iter().any(|e| matches!(e, Effect::Subscribe(_))));
    assert_eq!(
        state.view().subject("B1").unwrap().source,
        UpdateSource::Polling
    );
}

#[test]
fn mount_is_idempotent() {
    let state = mounted_batch();
    let (state, effects) = step(state, Msg::Mount(Subject::batch("B1")));
    assert!(effects.is_empty());
    assert_eq!(state.view().subjects.len(), 1);
}

#[test]
fn acknowledged_subscription_suppresses_polling() {
    let state = mounted_batch();
    let batch = Subject::batch("B1");

    let (state, effects) = step(state, Msg::ConnectionChanged(ConnectionState::Connected));
    assert_eq!(
        effects,
        vec![
            Effect::Subscribe(SubjectId::new("B1")),
            Effect::StartTimer(Timer::ack_wait(&batch)),
        ]
    );
    assert!(polling(&state), "still polling until acknowledged");

    let (state, effects) = step(state, push(InboundEvent::new("B1", EventKind::Subscribed)));
    assert_eq!(
        effects,
        vec![
            Effect::CancelTimer(Timer::ack_wait(&batch)),
            Effect::CancelTimer(Timer::poll(&batch)),
        ]
    );
    let view = state.view();
    let subject = view.subject("B1").unwrap();
    assert_eq!(subject.subscription, Subscription::Subscribed);
    assert_eq!(subject.source, UpdateSource::Push);
    assert!(view.connected());
}

#[test]
fn resubscription_is_not_sent_twice() {
    let state = mounted_batch();
    let (state, _) = step(state, Msg::ConnectionChanged(ConnectionState::Connected));
    let (_state, effects) = step(state, Msg::ConnectionChanged(ConnectionState::Connected));
    assert!(effects.is_empty());
}

#[test]
fn unacknowledged_subject_keeps_polling_and_becomes_degraded() {
    let state = mounted_batch();
    let batch = Subject::batch("B1");
    let (mut state, _) = step(state, Msg::ConnectionChanged(ConnectionState::Connected));

    for attempt in 1..=10 {
        let (next, effects) = step(state, Msg::AckTimedOut(SubjectId::new("B1")));
        state = next;
        assert_eq!(
            effects,
            vec![
                Effect::Subscribe(SubjectId::new("B1")),
                Effect::StartTimer(Timer::ack_wait(&batch)),
            ],
            "attempt {attempt} retries the subscription"
        );
        assert!(polling(&state), "attempt {attempt} keeps polling");
        assert_eq!(state.view().subject("B1").unwrap().degraded, attempt >= 3);
    }

    // A late acknowledgment still upgrades the subject.
    let (state, _) = step(state, push(InboundEvent::new("B1", EventKind::Subscribed)));
    let view = state.view();
    assert!(!view.subject("B1").unwrap().degraded);
    assert!(!polling(&state));
}

#[test]
fn push_data_is_untrusted_before_acknowledgment() {
    let state = mounted_batch();
    let (state, _) = step(state, Msg::ConnectionChanged(ConnectionState::Connected));

    let (state, effects) = step(
        state,
        push(InboundEvent::new(
            "B1",
            EventKind::Progress {
                percentage: 50.0,
                status: Some(Status::Processing),
                counts: None,
            },
        )),
    );

    assert!(effects.is_empty());
    assert_eq!(state.view().subject("B1").unwrap().status, Status::Pending);
}

#[test]
fn disconnect_falls_back_to_polling() {
    let state = mounted_batch();
    let batch = Subject::batch("B1");
    let (state, _) = step(state, Msg::ConnectionChanged(ConnectionState::Connected));
    let (state, _) = step(state, push(InboundEvent::new("B1", EventKind::Subscribed)));
    assert!(!polling(&state));

    let (state, effects) = step(state, Msg::ConnectionChanged(ConnectionState::Disconnected));

    assert_eq!(
        effects,
        vec![
            Effect::CancelTimer(Timer::ack_wait(&batch)),
            Effect::StartTimer(Timer::poll(&batch)),
        ]
    );
    assert!(polling(&state));
    assert_eq!(
        state.view().subject("B1").unwrap().subscription,
        Subscription::Unsubscribed
    );
}

#[test]
fn terminal_poll_response_stops_every_source() {
    let state = mounted_batch();
    let batch = Subject::batch("B1");
    let (state, _) = step(state, Msg::ConnectionChanged(ConnectionState::Connected));

    let (state, effects) = step(
        state,
        Msg::PollResponse {
            subject: SubjectId::new("B1"),
            snapshot: EntitySnapshot {
                status: Status::Completed,
                ..EntitySnapshot::default()
            },
        },
    );

    assert_eq!(
        effects,
        vec![
            Effect::CancelTimer(Timer::poll(&batch)),
            Effect::CancelTimer(Timer::ack_wait(&batch)),
            Effect::Unsubscribe(SubjectId::new("B1")),
        ]
    );
    let view = state.view();
    assert_eq!(view.subject("B1").unwrap().source, UpdateSource::Settled);

    // Reconnecting does not resubscribe a terminal subject.
    let (state, _) = step(state, Msg::ConnectionChanged(ConnectionState::Disconnected));
    let (_state, effects) = step(state, Msg::ConnectionChanged(ConnectionState::Connected));
    assert!(effects.is_empty());
}

#[test]
fn unmount_tears_down_everything() {
    let state = mounted_batch();
    let batch = Subject::batch("B1");
    let (state, _) = step(state, Msg::ConnectionChanged(ConnectionState::Connected));

    let (state, effects) = step(state, Msg::Unmount(SubjectId::new("B1")));

    assert!(effects.contains(&Effect::CancelTimer(Timer::poll(&batch))));
    assert!(effects.contains(&Effect::CancelTimer(Timer::ack_wait(&batch))));
    assert!(effects.contains(&Effect::Unsubscribe(SubjectId::new("B1"))));
    assert!(state.view().subjects.is_empty());

    // Late poll data for the unmounted subject is discarded.
    let (state, effects) = step(
        state,
        Msg::PollResponse {
            subject: SubjectId::new("B1"),
            snapshot: EntitySnapshot::default(),
        },
    );
    assert!(effects.is_empty());
    assert!(state.cache().get(&SubjectId::new("B1")).is_none());
}

#[test]
fn verification_stream_falls_back_to_polling_when_it_drops() {
    init_logging();
    let verification = Subject::verification("V1");
    let (state, effects) = step(
        SyncState::new(SyncSettings::default(), "session-1"),
        Msg::Mount(verification.clone()),
    );
    assert!(effects.contains(&Effect::OpenStream {
        subject: verification.clone(),
        ticket: 1,
        prompt: None,
    }));
    assert!(!effects
        .iter()
        .any(|e| matches!(e, Effect::StartTimer(t) if t.kind == TimerKind::Poll)));

    let (state, _) = step(
        state,
        Msg::Inbound {
            source: Source::Stream(1),
            event: InboundEvent::new(
                "V1",
                EventKind::Step {
                    step: "manifest".to_string(),
                    message: Some("reading manifest".to_string()),
                    progress: Some(50.0),
                },
            ),
        },
    );
    let view = state.view();
    let subject = view.subject("V1").unwrap();
    assert_eq!(subject.status, Status::Processing);
    assert_eq!(subject.step.as_deref(), Some("manifest"));
    assert_eq!(subject.source, UpdateSource::Stream);

    let (state, effects) = step(
        state,
        Msg::StreamClosed {
            subject: SubjectId::new("V1"),
            ticket: 1,
            error: Some("connection reset".to_string()),
        },
    );
    assert_eq!(effects, vec![Effect::StartTimer(Timer::poll(&verification))]);
    assert_eq!(
        state.view().subject("V1").unwrap().source,
        UpdateSource::Polling
    );
}

#[test]
fn terminal_stream_event_settles_verification() {
    init_logging();
    let (state, _) = step(
        SyncState::new(SyncSettings::default(), "session-1"),
        Msg::Mount(Subject::verification("V1")),
    );

    let (state, effects) = step(
        state,
        Msg::Inbound {
            source: Source::Stream(1),
            event: InboundEvent::new(
                "V1",
                EventKind::Completed {
                    counts: None,
                    duration_seconds: None,
                },
            ),
        },
    );

    assert!(effects.is_empty());
    let view = state.view();
    let subject = view.subject("V1").unwrap();
    assert_eq!(subject.status, Status::Completed);
    assert_eq!(subject.source, UpdateSource::Settled);

    // The stream task reporting its own close afterwards changes nothing.
    let (_state, effects) = step(
        state,
        Msg::StreamClosed {
            subject: SubjectId::new("V1"),
            ticket: 1,
            error: None,
        },
    );
    assert!(effects.is_empty());
}
