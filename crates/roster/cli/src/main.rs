//! rosterctl - operator command line for member penalties
//!
//! Runs penalty actions, member registration and deletion, and action log
//! queries against the configured storage backend. Every mutating command
//! acts as a member (`--as`) whose own record supplies the role flags the
//! permission gate checks.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use roster_service::PenaltyService;
use roster_storage::memory::InMemoryRosterStorage;
use roster_storage::RosterStorage;
use roster_types::ActionType;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod error;
mod output;

use commands::{log, member, replay, Context};
use config::{RosterConfig, StorageConfig};
use error::CliResult;
use output::OutputFormat;

/// rosterctl CLI
#[derive(Parser)]
#[command(name = "rosterctl")]
#[command(about = "Member penalty administration", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ROSTER_CONFIG")]
    config: Option<String>,

    /// Member id to act as
    #[arg(long = "as", env = "ROSTER_ACTOR", global = true)]
    actor: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    output: OutputFormat,

    /// Log level (overrides the configured one)
    #[arg(long, env = "ROSTER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "ROSTER_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Apply a penalty action to a member
    Apply {
        /// Target member id
        target: String,

        /// notification, warning, ban, reactivate, clearWarnings, clearNotifications or clearAll
        action: ActionType,

        /// Reason recorded in the action log (optional for clears)
        #[arg(short, long, default_value = "")]
        justification: String,
    },

    /// Manage member records
    Member {
        #[command(subcommand)]
        command: member::MemberCommands,
    },

    /// Inspect the action log
    Log {
        #[command(subcommand)]
        command: log::LogCommands,
    },

    /// Run a JSON script of members and actions
    Replay { script: PathBuf },

    /// Show effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = RosterConfig::load(cli.config.as_deref()).context("loading configuration")?;

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if let Commands::Config = cli.command {
        return output::print_json(&config).map_err(Into::into);
    }

    let storage = open_storage(&config.storage).await?;
    let ctx = Context {
        service: PenaltyService::with_storage(storage).with_config(config.service.clone()),
        actor: cli.actor,
        format: cli.output,
    };

    match cli.command {
        Commands::Apply {
            target,
            action,
            justification,
        } => commands::action::execute(&ctx, target, action, justification).await?,
        Commands::Member { command } => member::execute(&ctx, command).await?,
        Commands::Log { command } => log::execute(&ctx, command).await?,
        Commands::Replay { script } => replay::execute(&ctx, &script).await?,
        Commands::Config => {}
    }
    Ok(())
}

async fn open_storage(config: &StorageConfig) -> CliResult<Arc<dyn RosterStorage>> {
    match config {
        StorageConfig::Memory => {
            warn!("using in-memory storage, records are discarded on exit");
            Ok(Arc::new(InMemoryRosterStorage::new()))
        }
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            debug!(max_connections, connect_timeout_secs, "connecting to postgres");
            let storage = roster_storage::postgres::PostgresRosterStorage::connect_with_options(
                url,
                *max_connections,
                *connect_timeout_secs,
            )
            .await?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => {
            debug!("postgres storage requested without the postgres feature");
            Err(error::CliError::BackendDisabled("postgres"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn apply_parses_action_names() {
        let cli = Cli::try_parse_from([
            "rosterctl",
            "--as",
            "admin-1",
            "apply",
            "m-1",
            "clearWarnings",
        ])
        .unwrap();
        assert_eq!(cli.actor.as_deref(), Some("admin-1"));
        match cli.command {
            Commands::Apply {
                target,
                action,
                justification,
            } => {
                assert_eq!(target, "m-1");
                assert_eq!(action, ActionType::ClearWarnings);
                assert!(justification.is_empty());
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(Cli::try_parse_from(["rosterctl", "apply", "m-1", "suspend"]).is_err());
    }

    #[tokio::test]
    async fn memory_storage_opens() {
        assert!(open_storage(&StorageConfig::Memory).await.is_ok());
    }
}
