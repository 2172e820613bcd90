use crate::LedgerError;
use chrono::{DateTime, Utc};
use roster_storage::RosterStorage;
use roster_types::{MemberId, MemberPatch, PenaltyState, RecordVersion};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A member's penalty state as read, with the version to write against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub member_id: MemberId,
    pub state: PenaltyState,
    pub version: RecordVersion,
}

/// Penalty counter access for one storage backend.
///
/// Reads hand out a version token; writes only land if the stored version
/// still matches it.
#[derive(Clone)]
pub struct CounterStore {
    storage: Arc<dyn RosterStorage>,
}

impl CounterStore {
    pub fn new(storage: Arc<dyn RosterStorage>) -> Self {
        Self { storage }
    }

    /// Fails with `NotFound` if the member does not exist.
    pub async fn get_counters(&self, member_id: &MemberId) -> Result<CounterSnapshot, LedgerError> {
        let record = self
            .storage
            .read_member(member_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("member {} not found", member_id)))?;

        Ok(CounterSnapshot {
            member_id: record.member.member_id,
            state: record.member.penalty,
            version: record.version,
        })
    }

    /// Partial update of counters, status and ban fields.
    ///
    /// Fails with `NotFound` if the member is gone and with `Conflict` if it
    /// changed since `expected_version` was read.
    pub async fn set_counters(
        &self,
        member_id: &MemberId,
        patches: &[MemberPatch],
        expected_version: RecordVersion,
        updated_at: DateTime<Utc>,
    ) -> Result<RecordVersion, LedgerError> {
        Ok(self
            .storage
            .write_member(member_id, patches, expected_version, updated_at)
            .await?)
    }
}
