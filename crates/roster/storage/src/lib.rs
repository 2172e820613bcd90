//! Roster storage abstractions.
//!
//! The penalty engine talks to its document store through three contracts:
//! - member records with optimistic versioning (read, conditional write, archive)
//! - an append-only, hash-linked action log
//! - member notice inboxes
//!
//! The in-memory adapter is the reference implementation used by tests and
//! local runs. The PostgreSQL adapter (feature `postgres`) is the durable one.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod model;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use model::{chain_hash, log_timestamp, ActionLogAppend, VersionedMember};
pub use traits::{ActionLogStore, MemberStore, NoticeStore, QueryWindow, RosterStorage};
