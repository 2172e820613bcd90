use roster_gate::DenialReason;
use roster_ledger::LedgerError;
use roster_policy::PolicyError;
use roster_types::{ActionType, LoggedAction, MemberId, MemberStatus};
use thiserror::Error;

/// Why a justification was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JustificationError {
    #[error("justification must be at least {min} characters, got {len}")]
    TooShort { min: usize, len: usize },

    #[error("justification must be at most {max} characters, got {len}")]
    TooLong { max: usize, len: usize },
}

/// Caller-facing failures of every service operation.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Permission denied: {0}")]
    Permission(DenialReason),

    #[error("Member not found: {0}")]
    NotFound(MemberId),

    #[error("Member already exists: {0}")]
    AlreadyExists(MemberId),

    #[error("Invalid justification: {0}")]
    Validation(#[from] JustificationError),

    #[error("Cannot apply {action} while member is {status}")]
    InvalidTransition {
        action: ActionType,
        status: MemberStatus,
    },

    #[error("Gave up after {attempts} conflicting attempts, refresh and retry")]
    RetryExhausted { attempts: u32 },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Counters were written but not every audit record or notice was.
    #[error(
        "{action} on {member_id} may have partially applied: \
         {logged_entries} of {expected_entries} log entries written ({detail})"
    )]
    PartialFailure {
        member_id: MemberId,
        action: LoggedAction,
        logged_entries: usize,
        expected_entries: usize,
        detail: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// Whether a caller may reasonably try the same request again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::Unavailable(_)
                | ActionError::PartialFailure { .. }
                | ActionError::RetryExhausted { .. }
        )
    }

    /// Translate a ledger failure for an operation on `member_id`.
    pub(crate) fn from_ledger(err: LedgerError, member_id: &MemberId) -> Self {
        match err {
            LedgerError::NotFound(_) => ActionError::NotFound(member_id.clone()),
            LedgerError::AlreadyExists(_) => ActionError::AlreadyExists(member_id.clone()),
            LedgerError::Unavailable(msg) => ActionError::Unavailable(msg),
            LedgerError::Conflict(msg) | LedgerError::Backend(msg) => ActionError::Internal(msg),
            err @ LedgerError::ChainBroken { .. } => ActionError::Internal(err.to_string()),
        }
    }
}

impl ActionError {
    /// Translate a ledger failure not tied to one member.
    pub(crate) fn from_backend(err: LedgerError) -> Self {
        match err {
            LedgerError::Unavailable(msg) => ActionError::Unavailable(msg),
            other => ActionError::Internal(other.to_string()),
        }
    }
}

impl From<PolicyError> for ActionError {
    fn from(value: PolicyError) -> Self {
        match value {
            PolicyError::InvalidTransition { action, status } => {
                ActionError::InvalidTransition { action, status }
            }
            err @ PolicyError::CounterOverflow(_) => ActionError::Internal(err.to_string()),
        }
    }
}
