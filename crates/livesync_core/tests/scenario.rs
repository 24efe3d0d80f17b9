use livesync_core::{
    update, ConnectionState, Counts, Effect, EntitySnapshot, EventKind, InboundEvent, ItemStatus,
    Msg, Source, Status, Subject, SubjectId, SyncSettings, SyncState, Timer, UpdateSource,
};
use pretty_assertions::assert_eq;

fn push(event: InboundEvent) -> Msg {
    Msg::Inbound {
        source: Source::Push,
        event,
    }
}

fn drive(state: SyncState, msgs: Vec<Msg>) -> (SyncState, Vec<Effect>) {
    msgs.into_iter()
        .fold((state, Vec::new()), |(state, mut all), msg| {
            let (state, effects) = update(state, msg);
            all.extend(effects);
            (state, all)
        })
}

#[test]
fn noop_and_tick_leave_state_untouched() {
    let state = SyncState::new(SyncSettings::default(), "s1");
    let (after, effects) = update(state.clone(), Msg::NoOp);
    assert!(effects.is_empty());
    assert_eq!(after, state);
    let (mut after, effects) = update(after, Msg::Tick);
    assert!(effects.is_empty());
    assert!(!after.consume_dirty());
}

#[test]
fn batch_lifecycle_over_push() {
    let batch = Subject::batch("B1");
    let id = SubjectId::new("B1");
    let (state, _) = update(
        SyncState::new(SyncSettings::default(), "s1"),
        Msg::Mount(batch.clone()),
    );
    assert_eq!(state.view().subject("B1").unwrap().status, Status::Pending);
    assert_eq!(
        state.arbiter().source(&id, state.cache()),
        UpdateSource::Polling
    );

    let (state, effects) = update(state, Msg::ConnectionChanged(ConnectionState::Connected));
    assert_eq!(
        effects,
        vec![
            Effect::Subscribe(id.clone()),
            Effect::StartTimer(Timer::ack_wait(&batch)),
        ]
    );

    let (state, effects) = update(state, push(InboundEvent::new("B1", EventKind::Subscribed)));
    assert_eq!(
        effects,
        vec![
            Effect::CancelTimer(Timer::ack_wait(&batch)),
            Effect::CancelTimer(Timer::poll(&batch)),
        ]
    );

    let (state, _) = drive(
        state,
        vec![
            push(InboundEvent::new(
                "B1",
                EventKind::Progress {
                    percentage: 40.0,
                    status: Some(Status::Processing),
                    counts: None,
                },
            )),
            push(InboundEvent::new(
                "B1",
                EventKind::ItemFailed {
                    item_id: "I1".to_string(),
                    error: "unreadable".to_string(),
                },
            )),
        ],
    );
    let view = state.view();
    let b1 = view.subject("B1").unwrap();
    assert_eq!(b1.status, Status::Processing);
    assert_eq!(b1.progress, 0.4);
    assert_eq!(b1.items.len(), 1);
    assert_eq!(b1.items[0].status, ItemStatus::Failed);
    assert_eq!(b1.source, UpdateSource::Push);

    let counts = Counts {
        total: Some(10),
        completed: 9,
        failed: 1,
    };
    let (state, effects) = update(
        state,
        push(InboundEvent::new(
            "B1",
            EventKind::Completed {
                counts: Some(counts),
                duration_seconds: Some(12.5),
            },
        )),
    );
    assert_eq!(
        effects,
        vec![
            Effect::CancelTimer(Timer::ack_wait(&batch)),
            Effect::Unsubscribe(id.clone()),
        ]
    );

    let (state, effects) = drive(
        state,
        vec![
            push(InboundEvent::new(
                "B1",
                EventKind::Progress {
                    percentage: 50.0,
                    status: Some(Status::Processing),
                    counts: None,
                },
            )),
            Msg::PollResponse {
                subject: id.clone(),
                snapshot: EntitySnapshot {
                    status: Status::Processing,
                    progress: Some(0.5),
                    ..EntitySnapshot::default()
                },
            },
        ],
    );
    assert!(effects.is_empty());
    let view = state.view();
    let b1 = view.subject("B1").unwrap();
    assert_eq!(b1.status, Status::Completed);
    assert_eq!(b1.progress, 1.0);
    assert_eq!(b1.counts, counts);
    assert_eq!(b1.duration_seconds, Some(12.5));
    assert!(b1.terminal);
    assert_eq!(b1.source, UpdateSource::Settled);
}

#[test]
fn verification_stream_reports_steps_until_done() {
    let verification = Subject::verification("V1");
    let (state, effects) = update(
        SyncState::new(SyncSettings::default(), "s1"),
        Msg::Mount(verification.clone()),
    );
    assert_eq!(
        effects[0],
        Effect::OpenStream {
            subject: verification.clone(),
            ticket: 1,
            prompt: None,
        }
    );
    assert!(!effects.contains(&Effect::StartTimer(Timer::poll(&verification))));

    let stream = |kind| Msg::Inbound {
        source: Source::Stream(1),
        event: InboundEvent::new("V1", kind),
    };
    let (state, _) = update(
        state,
        stream(EventKind::Step {
            step: "analyzing".to_string(),
            message: Some("checking claims".to_string()),
            progress: Some(30.0),
        }),
    );
    let view = state.view();
    let v1 = view.subject("V1").unwrap();
    assert_eq!(v1.status, Status::Processing);
    assert_eq!(v1.step.as_deref(), Some("analyzing"));
    assert_eq!(v1.source, UpdateSource::Stream);

    let (state, effects) = update(
        state,
        stream(EventKind::Completed {
            counts: None,
            duration_seconds: None,
        }),
    );
    assert!(effects.is_empty(), "terminal stream needs no fallback");
    let view = state.view();
    let v1 = view.subject("V1").unwrap();
    assert_eq!(v1.status, Status::Completed);
    assert_eq!(v1.progress, 1.0);
    assert_eq!(v1.source, UpdateSource::Settled);
}

#[test]
fn dirty_flag_tracks_visible_changes() {
    let (mut state, _) = update(
        SyncState::new(SyncSettings::default(), "s1"),
        Msg::Mount(Subject::batch("B1")),
    );
    assert!(state.consume_dirty());
    assert!(!state.consume_dirty());

    let (mut state, _) = update(
        state,
        Msg::PollResponse {
            subject: SubjectId::new("B1"),
            snapshot: EntitySnapshot {
                status: Status::Uploading,
                progress: Some(0.1),
                ..EntitySnapshot::default()
            },
        },
    );
    assert!(state.consume_dirty());
}
