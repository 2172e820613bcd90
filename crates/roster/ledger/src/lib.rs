//! Roster Ledger - accountability facades over roster storage.
//!
//! - [`AuditLog`] appends and verifies the immutable action log.
//! - [`CounterStore`] reads and conditionally writes a member's penalty state.
//! - [`NoticeBoard`] delivers inbox notices to notified members.
//!
//! All three share one `RosterStorage` backend so the orchestrator and any
//! read surface see the same records.

#![deny(unsafe_code)]

mod audit;
mod counters;
mod error;
mod notices;

pub use audit::{AuditLog, ChainReport};
pub use counters::{CounterSnapshot, CounterStore};
pub use error::LedgerError;
pub use notices::NoticeBoard;
