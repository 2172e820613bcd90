//! Member records

use super::Context;
use crate::error::CliResult;
use crate::output::{print_json, print_success, OutputFormat};
use clap::Subcommand;
use roster_storage::QueryWindow;
use roster_types::{MemberId, MemberRegistration, MemberRole};
use serde::Serialize;

/// Member subcommands
#[derive(Subcommand)]
pub enum MemberCommands {
    /// Register a new active member
    Register {
        /// Member id from the identity provider (generated if omitted)
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        /// Role, e.g. Presidente, Diretor, Analista
        #[arg(long)]
        role: Option<MemberRole>,

        #[arg(long)]
        sector: Option<String>,

        #[arg(long)]
        admin: bool,

        #[arg(long)]
        power_user: bool,
    },

    /// Show a member and their standing
    Show { member_id: String },

    /// List members by name
    List {
        #[arg(long, default_value_t = 0)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Show a member's notices, newest first
    Notices {
        member_id: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Archive and remove a member (admin only)
    Delete {
        member_id: String,

        #[arg(short, long)]
        justification: String,
    },
}

pub async fn execute(ctx: &Context, command: MemberCommands) -> CliResult<()> {
    match command {
        MemberCommands::Register {
            id,
            name,
            email,
            role,
            sector,
            admin,
            power_user,
        } => {
            let member = ctx
                .service
                .register_member(MemberRegistration {
                    member_id: id.map(MemberId::new),
                    name,
                    email,
                    role,
                    sector,
                    is_admin: admin,
                    is_power_user: power_user,
                })
                .await?;
            match ctx.format {
                OutputFormat::Json => print_json(&member)?,
                OutputFormat::Text => {
                    print_success(&format!("Registered {} ({})", member.name, member.member_id))
                }
            }
            Ok(())
        }

        MemberCommands::Show { member_id } => {
            let member_id = MemberId::new(member_id);
            let member = ctx.service.member(&member_id).await?;
            let standing = ctx.service.standing(&member_id).await?;

            match ctx.format {
                OutputFormat::Json => {
                    #[derive(Serialize)]
                    struct View<'a> {
                        member: &'a roster_types::Member,
                        standing: &'a roster_service::Standing,
                    }
                    print_json(&View {
                        member: &member,
                        standing: &standing,
                    })?;
                }
                OutputFormat::Text => {
                    println!("Member: {} ({})", member.name, member.member_id);
                    println!("Status: {}", member.penalty.status);
                    if let Some(reason) = &member.penalty.ban_reason {
                        println!("Ban reason: {}", reason);
                    }
                    println!(
                        "Warnings: {} ({} until ban)",
                        standing.warning_count, standing.warnings_until_ban
                    );
                    println!(
                        "Notifications: {} ({} until next warning)",
                        standing.notification_count, standing.notifications_until_next_warning
                    );
                }
            }
            Ok(())
        }

        MemberCommands::List { limit, offset } => {
            let members = ctx.service.members(QueryWindow { limit, offset }).await?;
            match ctx.format {
                OutputFormat::Json => print_json(&members)?,
                OutputFormat::Text => {
                    for member in members {
                        println!(
                            "{:<24} {:<32} {:<8} W{} N{}",
                            member.member_id.to_string(),
                            member.name,
                            member.penalty.status.to_string(),
                            member.penalty.warning_count,
                            member.penalty.notification_count
                        );
                    }
                }
            }
            Ok(())
        }

        MemberCommands::Notices { member_id, limit } => {
            let notices = ctx
                .service
                .notices(&MemberId::new(member_id), QueryWindow::first(limit))
                .await?;
            match ctx.format {
                OutputFormat::Json => print_json(&notices)?,
                OutputFormat::Text => {
                    for notice in notices {
                        println!("[{}] {}: {}", notice.created_at, notice.title, notice.message);
                    }
                }
            }
            Ok(())
        }

        MemberCommands::Delete {
            member_id,
            justification,
        } => {
            let principal = ctx.principal().await?;
            let archive = ctx
                .service
                .delete_member(&principal, &MemberId::new(member_id), &justification)
                .await?;
            match ctx.format {
                OutputFormat::Json => print_json(&archive)?,
                OutputFormat::Text => print_success(&format!(
                    "Archived and removed {}",
                    archive.member.member_id
                )),
            }
            Ok(())
        }
    }
}
