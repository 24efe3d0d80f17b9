//! Plain-text rendering of the sync view for the terminal.
use livesync_core::{Role, SubjectView, UpdateSource};

pub fn subject_line(view: &SubjectView) -> String {
    let mut line = format!(
        "{:<24} {:<16} {:>3}%",
        view.subject.to_string(),
        view.status.as_str(),
        (view.progress * 100.0).round() as u32
    );
    if let Some(total) = view.counts.total {
        line.push_str(&format!(
            "  {}/{} done, {} failed",
            view.counts.completed, total, view.counts.failed
        ));
    }
    if let Some(step) = &view.step {
        line.push_str(&format!("  [{step}]"));
    }
    line.push_str(&format!("  via {}", source_label(view)));
    if let Some(seconds) = view.duration_seconds {
        line.push_str(&format!("  in {seconds:.1}s"));
    }
    line
}

/// One line per failed item, for inline errors under the subject.
pub fn item_errors(view: &SubjectView) -> Vec<String> {
    view.items
        .iter()
        .filter_map(|item| {
            item.error
                .as_ref()
                .map(|error| format!("    {} failed: {}", item.id, error))
        })
        .collect()
}

fn source_label(view: &SubjectView) -> &'static str {
    match view.source {
        UpdateSource::Push => "push",
        UpdateSource::Stream => "stream",
        UpdateSource::Polling if view.degraded => "polling (push unavailable)",
        UpdateSource::Polling => "polling",
        UpdateSource::Settled => "settled",
        UpdateSource::Idle => "idle",
    }
}

/// Assistant text not yet printed, given how many characters were printed before.
pub fn reply_delta(view: &SubjectView, printed: usize) -> Option<String> {
    let reply = view
        .transcript
        .iter()
        .rev()
        .find(|message| message.role == Role::Assistant)?;
    let delta: String = reply.text.chars().skip(printed).collect();
    (!delta.is_empty()).then_some(delta)
}

/// The last assistant message has finished, successfully or not.
pub fn reply_finished(view: &SubjectView) -> bool {
    view.transcript
        .last()
        .is_some_and(|message| message.role == Role::Assistant && message.complete)
}
