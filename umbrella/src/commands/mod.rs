//! Command registry
//!
//! Every command is listed here at compile time and dispatched by [`run`].

/// Server settings commands
pub mod server;
/// User registration commands
pub mod user;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::level_filters::LevelFilter;
use umbrella_storage::{ItemStore, TableAccessor};

use crate::config::BotConfig;

pub use server::ServerCommand;
pub use user::UserCommand;

/// Umbrella storage administration
#[derive(Debug, Parser)]
#[command(name = "umbrella", version)]
pub struct Cli {
    /// Log at debug level instead of info
    #[arg(long, global = true, env = "UMBRELLA_DEBUG")]
    pub debug: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Default log level, used when `RUST_LOG` is not set
    #[must_use]
    pub const fn log_level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        }
    }
}

/// Top level commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create every table, existing tables are left untouched
    CreateTables,
    /// Per-server settings
    #[command(subcommand)]
    Server(ServerCommand),
    /// Per-user registrations
    #[command(subcommand)]
    User(UserCommand),
}

/// Runs a command and returns its result as JSON
///
/// # Errors
///
/// Returns an error if the storage operation fails
pub async fn run<S>(
    command: Command,
    accessor: &TableAccessor<S>,
    config: &BotConfig,
) -> anyhow::Result<Value>
where
    S: ItemStore + ?Sized,
{
    match command {
        Command::CreateTables => {
            let outcomes = accessor.create_all_tables().await?;
            Ok(outcomes
                .into_iter()
                .map(|(table, outcome)| json!({ "table": table, "outcome": outcome.to_string() }))
                .collect())
        }
        Command::Server(command) => server::run(command, accessor, config).await,
        Command::User(command) => user::run(command, accessor, config).await,
    }
}
