//! In-memory reference implementation of the roster storage traits.
//!
//! Deterministic and test-friendly. Versions, sequencing and hash linking
//! behave exactly like the durable adapter so retry logic can be exercised
//! without a database.

use crate::model::{chain_hash, log_timestamp, ActionLogAppend, VersionedMember};
use crate::traits::{ActionLogStore, MemberStore, NoticeStore, QueryWindow};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roster_types::{
    ActionLogEntry, ActionLogEntryId, ArchivedMember, Member, MemberId, MemberNotice, MemberPatch,
    RecordVersion,
};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory roster storage adapter.
#[derive(Default)]
pub struct InMemoryRosterStorage {
    members: RwLock<HashMap<MemberId, VersionedMember>>,
    archived: RwLock<HashMap<MemberId, ArchivedMember>>,
    actions: RwLock<Vec<ActionLogEntry>>,
    notices: RwLock<Vec<MemberNotice>>,
}

impl InMemoryRosterStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemberStore for InMemoryRosterStorage {
    async fn create_member(&self, member: Member) -> StorageResult<VersionedMember> {
        let mut guard = self
            .members
            .write()
            .map_err(|_| StorageError::Backend("members lock poisoned".to_string()))?;

        if guard.contains_key(&member.member_id) {
            return Err(StorageError::AlreadyExists(format!(
                "member {} already exists",
                member.member_id
            )));
        }

        let record = VersionedMember {
            member,
            version: RecordVersion::INITIAL,
        };
        guard.insert(record.member.member_id.clone(), record.clone());
        Ok(record)
    }

    async fn read_member(&self, member_id: &MemberId) -> StorageResult<Option<VersionedMember>> {
        let guard = self
            .members
            .read()
            .map_err(|_| StorageError::Backend("members lock poisoned".to_string()))?;
        Ok(guard.get(member_id).cloned())
    }

    async fn write_member(
        &self,
        member_id: &MemberId,
        patches: &[MemberPatch],
        expected_version: RecordVersion,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<RecordVersion> {
        let mut guard = self
            .members
            .write()
            .map_err(|_| StorageError::Backend("members lock poisoned".to_string()))?;
        let record = guard
            .get_mut(member_id)
            .ok_or_else(|| StorageError::NotFound(format!("member {} not found", member_id)))?;

        if record.version != expected_version {
            return Err(StorageError::Conflict {
                record: format!("member {}", member_id),
                expected: expected_version,
                found: record.version,
            });
        }

        record.member.apply_patches(patches, updated_at);
        record.version = record.version.next();
        Ok(record.version)
    }

    async fn archive_member(
        &self,
        archive: ArchivedMember,
        expected_version: RecordVersion,
    ) -> StorageResult<()> {
        let member_id = archive.member.member_id.clone();
        let mut members = self
            .members
            .write()
            .map_err(|_| StorageError::Backend("members lock poisoned".to_string()))?;
        let current = members
            .get(&member_id)
            .ok_or_else(|| StorageError::NotFound(format!("member {} not found", member_id)))?;

        if current.version != expected_version {
            return Err(StorageError::Conflict {
                record: format!("member {}", member_id),
                expected: expected_version,
                found: current.version,
            });
        }

        let mut archived = self
            .archived
            .write()
            .map_err(|_| StorageError::Backend("archive lock poisoned".to_string()))?;
        archived.insert(member_id.clone(), archive);
        members.remove(&member_id);
        Ok(())
    }

    async fn get_archived(&self, member_id: &MemberId) -> StorageResult<Option<ArchivedMember>> {
        let guard = self
            .archived
            .read()
            .map_err(|_| StorageError::Backend("archive lock poisoned".to_string()))?;
        Ok(guard.get(member_id).cloned())
    }

    async fn list_members(&self, window: QueryWindow) -> StorageResult<Vec<VersionedMember>> {
        let guard = self
            .members
            .read()
            .map_err(|_| StorageError::Backend("members lock poisoned".to_string()))?;
        let mut values = guard.values().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| {
            a.member
                .name
                .cmp(&b.member.name)
                .then_with(|| a.member.member_id.cmp(&b.member.member_id))
        });
        Ok(apply_window(values, window))
    }
}

#[async_trait]
impl ActionLogStore for InMemoryRosterStorage {
    async fn append_action(&self, entry: ActionLogAppend) -> StorageResult<ActionLogEntry> {
        let mut guard = self
            .actions
            .write()
            .map_err(|_| StorageError::Backend("action log lock poisoned".to_string()))?;

        let previous_hash = guard.last().map(|e| e.hash.clone());
        let sequence = guard.len() as u64 + 1;
        let timestamp = log_timestamp(entry.timestamp);
        let hash = chain_hash(&entry, previous_hash.as_deref(), sequence)?;

        let record = ActionLogEntry {
            entry_id: ActionLogEntryId::generate(),
            sequence,
            target_member_id: entry.target_member_id,
            action_type: entry.action_type,
            justification: entry.justification,
            is_automatic: entry.is_automatic,
            acting_principal_id: entry.acting_principal_id,
            timestamp,
            previous_hash,
            hash,
        };

        guard.push(record.clone());
        Ok(record)
    }

    async fn list_actions(&self, window: QueryWindow) -> StorageResult<Vec<ActionLogEntry>> {
        let guard = self
            .actions
            .read()
            .map_err(|_| StorageError::Backend("action log lock poisoned".to_string()))?;
        let mut values = guard.clone();
        values.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(apply_window(values, window))
    }

    async fn list_actions_for_member(
        &self,
        member_id: &MemberId,
        window: QueryWindow,
    ) -> StorageResult<Vec<ActionLogEntry>> {
        let guard = self
            .actions
            .read()
            .map_err(|_| StorageError::Backend("action log lock poisoned".to_string()))?;
        let mut values = guard
            .iter()
            .filter(|entry| &entry.target_member_id == member_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(apply_window(values, window))
    }

    async fn latest_action_hash(&self) -> StorageResult<Option<String>> {
        let guard = self
            .actions
            .read()
            .map_err(|_| StorageError::Backend("action log lock poisoned".to_string()))?;
        Ok(guard.last().map(|e| e.hash.clone()))
    }
}

#[async_trait]
impl NoticeStore for InMemoryRosterStorage {
    async fn append_notice(&self, notice: MemberNotice) -> StorageResult<()> {
        let mut guard = self
            .notices
            .write()
            .map_err(|_| StorageError::Backend("notice lock poisoned".to_string()))?;
        guard.push(notice);
        Ok(())
    }

    async fn list_notices(
        &self,
        member_id: &MemberId,
        window: QueryWindow,
    ) -> StorageResult<Vec<MemberNotice>> {
        let guard = self
            .notices
            .read()
            .map_err(|_| StorageError::Backend("notice lock poisoned".to_string()))?;
        // Reverse insertion order gives newest-first even with equal timestamps.
        let values = guard
            .iter()
            .rev()
            .filter(|notice| &notice.member_id == member_id)
            .cloned()
            .collect::<Vec<_>>();
        Ok(apply_window(values, window))
    }
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}
