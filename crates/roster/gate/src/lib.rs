//! Roster Gate - permission checks for penalty actions.
//!
//! The gate answers one question before anything is read or written: may
//! this principal apply this action to this member? Principals arrive
//! already authenticated; the gate never looks anything up.
//!
//! | Action | Allowed for | Self-target |
//! |---|---|---|
//! | notification, warning, ban, reactivate | admin or power user | denied |
//! | clearWarnings, clearNotifications, clearAll | admin or Presidente | allowed |
//! | delete member | admin | denied |

#![deny(unsafe_code)]

use roster_types::{ActionType, MemberId, Principal};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Anything the gate can be asked about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatedAction {
    Penalty(ActionType),
    DeleteMember,
}

impl From<ActionType> for GatedAction {
    fn from(value: ActionType) -> Self {
        GatedAction::Penalty(value)
    }
}

impl std::fmt::Display for GatedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatedAction::Penalty(action) => write!(f, "{action}"),
            GatedAction::DeleteMember => f.write_str("delete"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenialReason {
    /// The principal targeted their own member record.
    SelfAction,
    /// The principal's role flags do not cover the action.
    InsufficientPermission,
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenialReason::SelfAction => f.write_str("cannot apply this action to yourself"),
            DenialReason::InsufficientPermission => {
                f.write_str("insufficient permission for this action")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateDecision {
    Allow,
    Deny(DenialReason),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }
}

/// Authorization provider consulted by the orchestrator.
pub trait AuthorizationProvider: Send + Sync {
    fn authorize(
        &self,
        principal: &Principal,
        target: &MemberId,
        action: GatedAction,
    ) -> GateDecision;
}

/// The role-flag based gate used in production.
#[derive(Clone, Copy, Debug, Default)]
pub struct RolePermissionGate;

impl RolePermissionGate {
    pub fn new() -> Self {
        Self
    }
}

impl AuthorizationProvider for RolePermissionGate {
    fn authorize(
        &self,
        principal: &Principal,
        target: &MemberId,
        action: GatedAction,
    ) -> GateDecision {
        let decision = evaluate(principal, target, action);
        debug!(
            principal = %principal.member_id,
            target = %target,
            action = %action,
            allowed = decision.is_allowed(),
            "gate evaluated"
        );
        decision
    }
}

fn evaluate(principal: &Principal, target: &MemberId, action: GatedAction) -> GateDecision {
    let is_self = &principal.member_id == target;

    match action {
        GatedAction::Penalty(kind) if kind.is_penalty() || kind == ActionType::Reactivate => {
            // Self-targeting is refused before roles are considered.
            if is_self {
                return GateDecision::Deny(DenialReason::SelfAction);
            }
            allow_if(principal.is_admin || principal.is_power_user)
        }
        GatedAction::Penalty(_) => allow_if(principal.is_admin || principal.is_president()),
        GatedAction::DeleteMember => {
            if is_self {
                return GateDecision::Deny(DenialReason::SelfAction);
            }
            allow_if(principal.is_admin)
        }
    }
}

fn allow_if(condition: bool) -> GateDecision {
    if condition {
        GateDecision::Allow
    } else {
        GateDecision::Deny(DenialReason::InsufficientPermission)
    }
}
