//! Roster Service - the penalty action orchestrator.
//!
//! Every mutation of a member's penalty state goes through
//! [`PenaltyService::perform_action`]:
//!
//! 1. the permission gate is consulted; denials touch nothing
//! 2. the justification is trimmed and bound-checked
//! 3. the member is read with its version, the escalation policy runs, and
//!    the result is written conditionally on that version; a conflicting
//!    write re-reads and re-applies, up to [`ServiceConfig::max_attempts`]
//! 4. one log entry is appended for the request and one per automatic
//!    follow-up, in the order they were raised
//!
//! Failures after the conditional write succeeded are reported as
//! [`ActionError::PartialFailure`], never swallowed.

#![deny(unsafe_code)]

mod config;
mod error;
pub mod justification;
mod service;
#[cfg(test)]
mod testing;

pub use config::ServiceConfig;
pub use error::{ActionError, JustificationError};
pub use roster_policy::{DerivedEvent, Standing};
pub use service::{ActionResult, PenaltyService};
