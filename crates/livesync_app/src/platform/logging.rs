//! Logger setup for the `livesync` binary.
//!
//! File output goes to `./livesync.log` in the current working directory, so
//! the terminal stays free for the live view.

use std::fs::File;
use std::path::PathBuf;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

const LOG_FILENAME: &str = "./livesync.log";

/// Destination for log output.
pub enum LogDestination {
    File,
    /// Standard error, interleaved with the live view.
    Terminal,
    Both,
}

pub fn initialize(destination: LogDestination, level: LevelFilter) {
    let config = build_config();

    let loggers: Vec<Box<dyn SharedLogger>> = match destination {
        LogDestination::File => match create_file_logger(level, config) {
            Some(file_logger) => vec![file_logger],
            None => return,
        },
        LogDestination::Terminal => vec![term_logger(level, config)],
        LogDestination::Both => {
            let mut loggers = vec![term_logger(level, config.clone())];
            if let Some(file_logger) = create_file_logger(level, config) {
                loggers.push(file_logger);
            }
            loggers
        }
    };

    let _ = CombinedLogger::init(loggers);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

fn term_logger(level: LevelFilter, config: Config) -> Box<dyn SharedLogger> {
    TermLogger::new(level, config, TerminalMode::Stderr, ColorChoice::Auto)
}

fn create_file_logger(level: LevelFilter, config: Config) -> Option<Box<dyn SharedLogger>> {
    let log_path = PathBuf::from(LOG_FILENAME);
    match File::create(&log_path) {
        Ok(file) => {
            let logger: Box<dyn SharedLogger> = WriteLogger::new(level, config, file);
            Some(logger)
        }
        Err(err) => {
            eprintln!("Warning: Could not create log file at {:?}: {}", log_path, err);
            None
        }
    }
}
