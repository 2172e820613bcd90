//! Storage double that injects the failures the orchestrator must survive.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roster_storage::memory::InMemoryRosterStorage;
use roster_storage::{
    ActionLogAppend, ActionLogStore, MemberStore, NoticeStore, QueryWindow, StorageError,
    StorageResult, VersionedMember,
};
use roster_types::{
    ActionLogEntry, ArchivedMember, Member, MemberId, MemberNotice, MemberPatch, RecordVersion,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct ScriptedStorage {
    inner: InMemoryRosterStorage,
    race_next_write: AtomicBool,
    forced_conflicts: AtomicU32,
    append_budget: Mutex<Option<usize>>,
    reads_down: AtomicBool,
    notices_down: AtomicBool,
}

impl ScriptedStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Before the next member write, land a competing notification first.
    pub fn race_next_write(&self) {
        self.race_next_write.store(true, Ordering::SeqCst);
    }

    /// Refuse the next `count` member writes with a version conflict.
    pub fn conflict_next_writes(&self, count: u32) {
        self.forced_conflicts.store(count, Ordering::SeqCst);
    }

    /// Accept `count` more log appends, then report the log unreachable.
    pub fn fail_appends_after(&self, count: usize) {
        *self.append_budget.lock().unwrap() = Some(count);
    }

    pub fn fail_reads(&self) {
        self.reads_down.store(true, Ordering::SeqCst);
    }

    pub fn fail_notices(&self) {
        self.notices_down.store(true, Ordering::SeqCst);
    }

    async fn competing_notification(&self, member_id: &MemberId) -> StorageResult<()> {
        let record = self
            .inner
            .read_member(member_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(member_id.to_string()))?;
        let count = record.member.penalty.notification_count + 1;
        self.inner
            .write_member(
                member_id,
                &[MemberPatch::NotificationCount(count)],
                record.version,
                Utc::now(),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MemberStore for ScriptedStorage {
    async fn create_member(&self, member: Member) -> StorageResult<VersionedMember> {
        self.inner.create_member(member).await
    }

    async fn read_member(&self, member_id: &MemberId) -> StorageResult<Option<VersionedMember>> {
        if self.reads_down.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("read timed out".to_string()));
        }
        self.inner.read_member(member_id).await
    }

    async fn write_member(
        &self,
        member_id: &MemberId,
        patches: &[MemberPatch],
        expected_version: RecordVersion,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<RecordVersion> {
        if self.race_next_write.swap(false, Ordering::SeqCst) {
            self.competing_notification(member_id).await?;
        }
        let forced = self
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if forced {
            return Err(StorageError::Conflict {
                record: member_id.to_string(),
                expected: expected_version,
                found: expected_version.next(),
            });
        }
        self.inner
            .write_member(member_id, patches, expected_version, updated_at)
            .await
    }

    async fn archive_member(
        &self,
        archive: ArchivedMember,
        expected_version: RecordVersion,
    ) -> StorageResult<()> {
        self.inner.archive_member(archive, expected_version).await
    }

    async fn get_archived(&self, member_id: &MemberId) -> StorageResult<Option<ArchivedMember>> {
        self.inner.get_archived(member_id).await
    }

    async fn list_members(&self, window: QueryWindow) -> StorageResult<Vec<VersionedMember>> {
        self.inner.list_members(window).await
    }
}

#[async_trait]
impl ActionLogStore for ScriptedStorage {
    async fn append_action(&self, entry: ActionLogAppend) -> StorageResult<ActionLogEntry> {
        {
            let mut budget = self.append_budget.lock().unwrap();
            match budget.as_mut() {
                Some(0) => return Err(StorageError::Unavailable("log store offline".to_string())),
                Some(left) => *left -= 1,
                None => {}
            }
        }
        self.inner.append_action(entry).await
    }

    async fn list_actions(&self, window: QueryWindow) -> StorageResult<Vec<ActionLogEntry>> {
        self.inner.list_actions(window).await
    }

    async fn list_actions_for_member(
        &self,
        member_id: &MemberId,
        window: QueryWindow,
    ) -> StorageResult<Vec<ActionLogEntry>> {
        self.inner.list_actions_for_member(member_id, window).await
    }

    async fn latest_action_hash(&self) -> StorageResult<Option<String>> {
        self.inner.latest_action_hash().await
    }
}

#[async_trait]
impl NoticeStore for ScriptedStorage {
    async fn append_notice(&self, notice: MemberNotice) -> StorageResult<()> {
        if self.notices_down.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("notice store offline".to_string()));
        }
        self.inner.append_notice(notice).await
    }

    async fn list_notices(
        &self,
        member_id: &MemberId,
        window: QueryWindow,
    ) -> StorageResult<Vec<MemberNotice>> {
        self.inner.list_notices(member_id, window).await
    }
}
