use std::collections::HashMap;
use std::io::Write;

use anyhow::{bail, Context, Result};
use livesync_core::{Role, Subject, SubjectId, SyncViewModel};
use livesync_engine::{EngineConfig, EngineHandle};
use livesync_logging::{sync_info, sync_warn};

use super::cli::{Cli, Command};
use super::render;

pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Command::Watch {
            batches,
            verifications,
        } => {
            let subjects: Vec<Subject> = batches
                .into_iter()
                .map(Subject::batch)
                .chain(verifications.into_iter().map(Subject::verification))
                .collect();
            watch(config, subjects).await
        }
        Command::Chat { message, subject } => chat(config, SubjectId::new(subject), message).await,
        Command::ResetSession => reset_session(config).await,
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = EngineConfig::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = &cli.state_dir {
        config.state_dir = dir.clone();
    }
    if let Some(api_base) = &cli.api_base {
        config.api_base = api_base.clone();
    }
    if let Some(push_url) = &cli.push_url {
        config.push_url = Some(push_url.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn watch(config: EngineConfig, subjects: Vec<Subject>) -> Result<()> {
    if subjects.is_empty() {
        bail!("nothing to watch; pass --batch or --verification");
    }
    let handle = EngineHandle::start(config).context("starting engine")?;
    for subject in &subjects {
        handle.mount(subject.clone());
    }

    let mut views = handle.watch_view();
    let mut printed: HashMap<SubjectId, u64> = HashMap::new();
    let mut nudged = false;
    loop {
        let view = views.borrow_and_update().clone();
        print_changes(&view, &mut printed);
        match &view.nudge {
            Some(subject) if !nudged => {
                println!("{subject} is still in progress; results will show up here");
                nudged = true;
            }
            Some(_) => {}
            None => nudged = false,
        }
        if all_settled(&view, &subjects) {
            break;
        }

        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    sync_warn!("Engine stopped while watching");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                sync_info!("Interrupted");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn print_changes(view: &SyncViewModel, printed: &mut HashMap<SubjectId, u64>) {
    for subject in &view.subjects {
        if printed.get(&subject.subject.id) == Some(&subject.revision) {
            continue;
        }
        printed.insert(subject.subject.id.clone(), subject.revision);
        println!("{}", render::subject_line(subject));
        if subject.terminal {
            for line in render::item_errors(subject) {
                println!("{line}");
            }
            if let Some(error) = &subject.error {
                println!("    {error}");
            }
        }
    }
}

fn all_settled(view: &SyncViewModel, subjects: &[Subject]) -> bool {
    subjects.iter().all(|subject| {
        view.subject(subject.id.as_str())
            .is_some_and(|mounted| mounted.terminal)
    })
}

async fn chat(config: EngineConfig, id: SubjectId, message: String) -> Result<()> {
    let handle = EngineHandle::start(config).context("starting engine")?;
    handle.mount(Subject::chat(id.clone()));
    handle.set_surface_open(true);

    let mut views = handle.watch_view();
    // Earlier messages may come back with a restored session.
    let baseline = {
        let view = views
            .wait_for(|view| view.subject(id.as_str()).is_some())
            .await
            .context("engine stopped before the chat opened")?;
        view.subject(id.as_str())
            .map_or(0, |chat| chat.transcript.len())
    };
    handle.send_chat(id.clone(), message);

    let mut printed = 0;
    let mut stdout = std::io::stdout();
    loop {
        let view = views.borrow_and_update().clone();
        if let Some(chat) = view.subject(id.as_str()) {
            if chat.transcript.len() >= baseline + 2 {
                if let Some(delta) = render::reply_delta(chat, printed) {
                    printed += delta.chars().count();
                    print!("{delta}");
                    stdout.flush()?;
                }
                if render::reply_finished(chat) {
                    println!();
                    if let Some(error) = chat
                        .transcript
                        .iter()
                        .rev()
                        .find(|message| message.role == Role::Assistant)
                        .and_then(|message| message.error.as_ref())
                    {
                        eprintln!("reply ended early: {error}");
                    }
                    break;
                }
            }
        }

        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                sync_info!("Cancelling reply");
                handle.cancel_reply(id.clone());
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

async fn reset_session(config: EngineConfig) -> Result<()> {
    let handle = EngineHandle::start(config).context("starting engine")?;
    let mut views = handle.watch_view();
    let next = handle.reset_session();
    views
        .wait_for(|view| view.session_id == next)
        .await
        .context("engine stopped before the reset finished")?;
    println!("{next}");
    handle.shutdown().await;
    Ok(())
}
