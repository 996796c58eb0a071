//! CLI argument definitions for the `cadence` operator binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Cadence: inspect and drive a queue-runner session from the terminal.
#[derive(Parser, Debug)]
#[command(name = "cadence", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory holding the session state database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Session whose persisted state is used.
    #[arg(short = 's', long = "session")]
    pub session: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the persisted runner status of the session.
    Status,
    /// Delete everything the session has persisted.
    Reset,
    /// Fetch the next action once and print it without executing.
    Poll,
    /// Fetch conversations (or one conversation's messages) through the
    /// rate limiter and print the resolved views.
    Sync {
        /// Conversation key; lists the inbox when absent.
        #[arg(long)]
        conversation: Option<String>,
        /// Entity key of the logged-in account's profile.
        #[arg(long = "self-key")]
        self_key: Option<String>,
    },
    /// Resolve a saved normalized response file offline.
    Resolve {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = ResolveKind::Conversations)]
        kind: ResolveKind,
        #[arg(long = "self-key")]
        self_key: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveKind {
    Conversations,
    Messages,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > CADENCE_CONFIG env var > ~/.cadence/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("CADENCE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the session id.
    ///
    /// Priority: --session flag > CADENCE_SESSION env var > "default".
    pub fn resolve_session(&self) -> String {
        if let Some(ref s) = self.session {
            return s.clone();
        }
        std::env::var("CADENCE_SESSION").unwrap_or_else(|_| "default".to_string())
    }

    /// Resolve the data directory, expanding a leading `~`.
    ///
    /// Priority: --data-dir flag > config file value.
    pub fn resolve_data_dir(&self, config_data_dir: &str) -> PathBuf {
        match self.data_dir {
            Some(ref p) => p.clone(),
            None => expand_home(config_data_dir),
        }
    }

    /// Resolve the log filter.
    ///
    /// Priority: --log-level flag > RUST_LOG > config file value.
    pub fn resolve_log_filter(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        std::env::var("RUST_LOG").unwrap_or_else(|_| config_level.to_string())
    }
}

fn home_dir() -> Option<String> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE").ok();
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME").ok();
    home
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")), home_dir()) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => PathBuf::from(home).join(".cadence").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}
