use clap::{Parser, ValueEnum};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Watches a grocery site for delivery slots and optionally checks out.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Service to watch ("Whole Foods" or "Amazon Fresh")
    #[arg(short, long, default_value = "Whole Foods")]
    pub service: String,

    /// Path to the configuration file
    #[arg(long, default_value = "conf.toml")]
    pub conf: PathBuf,

    /// Ignore the stored session and wait for a manual login
    #[arg(short, long)]
    pub force_login: bool,

    /// Attempt to check out automatically when slots are found
    #[arg(short, long)]
    pub checkout: bool,

    /// Click through out-of-stock alerts instead of waiting for the operator
    #[arg(long)]
    pub ignore_oos: bool,

    /// Save the cart contents to a TOML file before polling
    #[arg(long)]
    pub save_cart: bool,

    /// Directory for page dumps and cart records
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Show the browser window even when a stored session exists
    #[arg(long)]
    pub disable_headless: bool,

    /// Logging level
    #[arg(short, long, value_enum, default_value_t = LogLevel::Info)]
    pub level: LogLevel,

    /// Shorthand for `--level debug`
    #[arg(short, long)]
    pub debug: bool,

    /// Remove the browser profile and stored session, then exit
    #[arg(long)]
    pub clean: bool,
}

impl Args {
    pub fn log_level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::Debug
        } else {
            self.level.clone().into()
        }
    }
}
