use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;

use super::logging::LogDestination;

#[derive(Debug, Parser)]
#[command(name = "livesync", version, about = "Follow long-running jobs and chat replies live")]
pub struct Cli {
    /// RON config file; built-in defaults when omitted.
    #[arg(long, env = "LIVESYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overrides `state_dir` from the config.
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Overrides `api_base` from the config.
    #[arg(long, env = "LIVESYNC_API")]
    pub api_base: Option<String>,

    /// Overrides `push_url` from the config.
    #[arg(long, env = "LIVESYNC_PUSH")]
    pub push_url: Option<String>,

    #[arg(long, value_enum, default_value_t = LogTarget::File)]
    pub log: LogTarget,

    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    File,
    Terminal,
    Both,
}

impl From<LogTarget> for LogDestination {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::File => LogDestination::File,
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::Both => LogDestination::Both,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow batches and verifications until every one of them settles.
    Watch {
        #[arg(long = "batch", value_name = "ID")]
        batches: Vec<String>,
        #[arg(long = "verification", value_name = "ID")]
        verifications: Vec<String>,
    },
    /// Send one message and print the reply as it streams in.
    Chat {
        message: String,
        #[arg(long, default_value = "assistant")]
        subject: String,
    },
    /// Discard the current session and start a new one.
    ResetSession,
}
