use crate::{StorageError, StorageResult};
use chrono::{DateTime, SubsecRound, Utc};
use roster_types::{LoggedAction, Member, MemberId, RecordVersion};
use serde::{Deserialize, Serialize};

/// A member record together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedMember {
    pub member: Member,
    pub version: RecordVersion,
}

/// Action log append payload. Ids, sequencing and hashes are assigned by storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogAppend {
    pub timestamp: DateTime<Utc>,
    pub target_member_id: MemberId,
    pub action_type: LoggedAction,
    pub justification: String,
    pub is_automatic: bool,
    pub acting_principal_id: MemberId,
}

/// Log timestamps are kept at microsecond precision, the finest a
/// PostgreSQL `TIMESTAMPTZ` column holds.
pub fn log_timestamp(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

/// Hash of one action log entry, linked to its predecessor.
pub fn chain_hash(
    entry: &ActionLogAppend,
    previous_hash: Option<&str>,
    sequence: u64,
) -> StorageResult<String> {
    let serializable = serde_json::json!({
        "previous_hash": previous_hash,
        "sequence": sequence,
        "timestamp": log_timestamp(entry.timestamp),
        "target_member_id": entry.target_member_id.0,
        "action_type": entry.action_type,
        "justification": entry.justification,
        "is_automatic": entry.is_automatic,
        "acting_principal_id": entry.acting_principal_id.0,
    });
    let serialized = serde_json::to_vec(&serializable)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(blake3::hash(&serialized).to_hex().to_string())
}
