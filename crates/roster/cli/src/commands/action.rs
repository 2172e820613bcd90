//! Penalty actions

use super::Context;
use crate::error::CliResult;
use crate::output::{print_json, print_success, print_warning, OutputFormat};
use roster_service::ActionResult;
use roster_types::{ActionType, MemberId};

/// Apply one penalty action as the acting member
pub async fn execute(
    ctx: &Context,
    target: String,
    action: ActionType,
    justification: String,
) -> CliResult<()> {
    let principal = ctx.principal().await?;
    let result = ctx
        .service
        .perform_action(&principal, &MemberId::new(target), action, &justification)
        .await?;

    match ctx.format {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Text => {
            print_result(&result);
            Ok(())
        }
    }
}

pub fn print_result(result: &ActionResult) {
    print_success(&format!(
        "{} applied to {} ({} after {} attempt(s))",
        result.action, result.member_id, result.final_status, result.attempts
    ));
    println!("  Warnings: {}", result.warning_count);
    println!("  Notifications: {}", result.notification_count);
    for derived in &result.triggered_automatic_actions {
        print_warning(&format!("{}: {}", derived.action, derived.reason));
    }
}
