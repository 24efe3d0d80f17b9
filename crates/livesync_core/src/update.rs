use crate::{Effect, Msg, SyncState};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: SyncState, msg: Msg) -> (SyncState, Vec<Effect>) {
    let effects = match msg {
        Msg::Mount(subject) => state.mount(subject),
        Msg::Unmount(id) => state.unmount(&id),
        Msg::ConnectionChanged(connection) => state.connection_changed(connection),
        Msg::Inbound { source, event } => state.inbound(source, event),
        Msg::AckTimedOut(id) => state.ack_timed_out(&id),
        Msg::PollResponse { subject, snapshot } => state.poll_response(&subject, &snapshot),
        Msg::PollFailed { subject, error } => state.poll_failed(&subject, &error),
        Msg::PacingTick(id) => state.pacing_tick(&id),
        Msg::StreamClosed {
            subject,
            ticket,
            error,
        } => state.stream_closed(&subject, ticket, error),
        Msg::SendChat { subject, text } => state.send_chat(&subject, text),
        Msg::CancelReply(id) => state.cancel_reply(&id),
        Msg::SurfaceToggled(open) => state.surface_toggled(open),
        Msg::UserActivity => state.user_activity(),
        Msg::IdleExpired => state.idle_expired(),
        Msg::SessionRestored(snapshot) => state.session_restored(snapshot),
        Msg::ResetSession { next_id } => state.reset_session(next_id),
        Msg::Tick | Msg::NoOp => Vec::new(),
    };

    (state, effects)
}
