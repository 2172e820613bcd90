//! Command implementations

pub mod action;
pub mod log;
pub mod member;
pub mod replay;

use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;
use roster_service::{ActionError, PenaltyService};
use roster_types::{MemberId, Principal};

/// Shared state for one command run
pub struct Context {
    pub service: PenaltyService,
    pub actor: Option<String>,
    pub format: OutputFormat,
}

impl Context {
    /// The acting principal, derived from the `--as` member's own record.
    pub async fn principal(&self) -> CliResult<Principal> {
        let actor = self.actor.as_deref().ok_or(CliError::MissingActor)?;
        resolve_principal(&self.service, &MemberId::new(actor)).await
    }
}

pub async fn resolve_principal(
    service: &PenaltyService,
    member_id: &MemberId,
) -> CliResult<Principal> {
    match service.member(member_id).await {
        Ok(member) => Ok(Principal::from_member(&member)),
        Err(ActionError::NotFound(id)) => Err(CliError::UnknownActor(id.to_string())),
        Err(err) => Err(err.into()),
    }
}
