//! Action log queries

use super::Context;
use crate::error::CliResult;
use crate::output::{print_json, print_success, OutputFormat};
use clap::Subcommand;
use roster_storage::QueryWindow;
use roster_types::MemberId;

/// Action log subcommands
#[derive(Subcommand)]
pub enum LogCommands {
    /// Show a member's action history, newest first
    History {
        member_id: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Recompute and check the whole hash chain
    Verify,
}

pub async fn execute(ctx: &Context, command: LogCommands) -> CliResult<()> {
    match command {
        LogCommands::History {
            member_id,
            limit,
            offset,
        } => {
            let entries = ctx
                .service
                .history(&MemberId::new(member_id), QueryWindow { limit, offset })
                .await?;
            match ctx.format {
                OutputFormat::Json => print_json(&entries)?,
                OutputFormat::Text => {
                    for entry in entries {
                        let origin = if entry.is_automatic { "auto" } else { "manual" };
                        println!(
                            "#{:<5} {} {:<18} {:<6} by {}: {}",
                            entry.sequence,
                            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            entry.action_type.to_string(),
                            origin,
                            entry.acting_principal_id,
                            entry.justification
                        );
                    }
                }
            }
            Ok(())
        }

        LogCommands::Verify => {
            let report = ctx.service.verify_audit_chain().await?;
            match ctx.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text => print_success(&format!(
                    "Action log intact: {} entries, head {}",
                    report.entries,
                    report.head.as_deref().unwrap_or("-")
                )),
            }
            Ok(())
        }
    }
}
