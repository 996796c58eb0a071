//! Cadence operator binary.
//!
//! The runner itself is embedded by the host that owns the browsing
//! context. This binary works on the same session state and services from
//! the outside:
//! 1. Load configuration from TOML
//! 2. Open the session store (SQLite)
//! 3. Run one operator command: status, reset, poll, sync or resolve

mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;

use cadence_api::{
    resolver_for, ConversationSync, HttpPlatformClient, HttpQueueClient, QueueClient,
    RateLimiter, ThrottledPlatform,
};
use cadence_core::config::CadenceConfig;
use cadence_graph::NormalizedResponse;
use cadence_runner::RunnerStatus;
use cadence_storage::{Database, SqliteStateStore};

use cli::{CliArgs, Command, ResolveKind};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

fn load_config(path: &Path) -> AppResult<CadenceConfig> {
    if path.exists() {
        Ok(CadenceConfig::load(path)?)
    } else {
        Ok(CadenceConfig::default())
    }
}

fn open_store(args: &CliArgs, config: &CadenceConfig) -> AppResult<SqliteStateStore> {
    let data_dir = args.resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join("cadence.db");
    let db = Database::new(&db_path)?;
    tracing::debug!(path = %db_path.display(), "SQLite database opened");
    Ok(SqliteStateStore::new(Arc::new(db), args.resolve_session()))
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let config = load_config(&config_file)?;

    // Tracing goes to stderr so command output stays pipeable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(
                args.resolve_log_filter(&config.general.log_level),
            )
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::debug!(path = %config_file.display(), "Configuration resolved");

    match &args.command {
        Command::Status => {
            let store = open_store(&args, &config)?;
            print_json(&RunnerStatus::load(&store)?)?;
        }
        Command::Reset => {
            let store = open_store(&args, &config)?;
            let removed = store.clear_session()?;
            tracing::info!(session = store.session_id(), removed, "Session state cleared");
            println!("Cleared {} entries for session {}", removed, store.session_id());
        }
        Command::Poll => {
            let queue = HttpQueueClient::from_config(&config.queue)?;
            let next = queue.next_action().await?;
            print_json(&next)?;
        }
        Command::Sync {
            conversation,
            self_key,
        } => {
            let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
            let platform = ThrottledPlatform::from_config(
                HttpPlatformClient::from_config(&config.platform)?,
                limiter,
                &config.rate_limit,
            );
            let sync = ConversationSync::new(
                platform,
                resolver_for(&config.platform, self_key.clone()),
                &config.platform,
            );
            match conversation {
                Some(id) => print_json(&sync.messages(id).await?)?,
                None => print_json(&sync.conversations().await?)?,
            }
        }
        Command::Resolve {
            file,
            kind,
            self_key,
        } => {
            let raw = std::fs::read_to_string(file)?;
            let response = NormalizedResponse::from_value(serde_json::from_str(&raw)?)?;
            let resolver = resolver_for(&config.platform, self_key.clone());
            match kind {
                ResolveKind::Conversations => print_json(&resolver.conversations(&response))?,
                ResolveKind::Messages => print_json(&resolver.messages(&response))?,
            }
        }
    }

    Ok(())
}
