//! Scripted replays
//!
//! A replay script seeds members and then runs a list of steps in order,
//! each as the named acting member. Failed steps are reported and the run
//! continues, so one script can exercise denials and conflicts alongside
//! successful actions.
//!
//! ```json
//! {
//!   "members": [{ "member_id": "admin-1", "name": "Ana", "email": "ana@example.org", "is_admin": true }],
//!   "steps": [
//!     { "op": "action", "actor": "admin-1", "target": "m-1", "action": "notification", "justification": "late report" },
//!     { "op": "delete", "actor": "admin-1", "target": "m-1", "justification": "left the organisation" }
//!   ]
//! }
//! ```

use super::{action::print_result, resolve_principal, Context};
use crate::error::CliResult;
use crate::output::{print_json, print_success, print_warning, OutputFormat};
use roster_service::{ActionResult, PenaltyService};
use roster_storage::QueryWindow;
use roster_types::{ActionType, Member, MemberId, MemberRegistration};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub members: Vec<MemberRegistration>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Action {
        actor: MemberId,
        target: MemberId,
        action: ActionType,
        #[serde(default)]
        justification: String,
    },
    Delete {
        actor: MemberId,
        target: MemberId,
        justification: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub outcomes: Vec<StepOutcome>,
    pub members: Vec<Member>,
    pub log_entries: u64,
}

pub async fn execute(ctx: &Context, path: &Path) -> CliResult<()> {
    let script: Script = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let report = run(&ctx.service, script).await?;

    match ctx.format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            for outcome in &report.outcomes {
                match (&outcome.result, &outcome.error) {
                    (Some(result), _) => print_result(result),
                    (None, Some(error)) => {
                        print_warning(&format!("step {} failed: {}", outcome.step, error))
                    }
                    (None, None) => print_success(&format!("step {} done", outcome.step)),
                }
            }
            print_success(&format!(
                "{} members, {} log entries, chain intact",
                report.members.len(),
                report.log_entries
            ));
        }
    }
    Ok(())
}

/// Seed the members, run every step, then verify the action log.
pub async fn run(service: &PenaltyService, script: Script) -> CliResult<ReplayReport> {
    for registration in script.members {
        service.register_member(registration).await?;
    }

    let mut outcomes = Vec::with_capacity(script.steps.len());
    for (index, step) in script.steps.into_iter().enumerate() {
        let step_number = index + 1;
        let outcome = match step {
            Step::Action {
                actor,
                target,
                action,
                justification,
            } => {
                let principal = resolve_principal(service, &actor).await?;
                match service
                    .perform_action(&principal, &target, action, &justification)
                    .await
                {
                    Ok(result) => StepOutcome {
                        step: step_number,
                        result: Some(result),
                        error: None,
                        retryable: false,
                    },
                    Err(err) => StepOutcome {
                        step: step_number,
                        result: None,
                        retryable: err.is_retryable(),
                        error: Some(err.to_string()),
                    },
                }
            }
            Step::Delete {
                actor,
                target,
                justification,
            } => {
                let principal = resolve_principal(service, &actor).await?;
                let outcome = service
                    .delete_member(&principal, &target, &justification)
                    .await;
                StepOutcome {
                    step: step_number,
                    result: None,
                    retryable: outcome.as_ref().map_or_else(|err| err.is_retryable(), |_| false),
                    error: outcome.err().map(|err| err.to_string()),
                }
            }
        };
        info!(step = step_number, ok = outcome.error.is_none(), "replay step finished");
        outcomes.push(outcome);
    }

    let members = service.members(QueryWindow::all()).await?;
    let chain = service.verify_audit_chain().await?;

    Ok(ReplayReport {
        outcomes,
        members,
        log_entries: chain.entries,
    })
}
