use crate::model::{ActionLogAppend, VersionedMember};
use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roster_types::{
    ActionLogEntry, ArchivedMember, Member, MemberId, MemberNotice, MemberPatch, RecordVersion,
};

/// Generic query window for paged reads. A zero limit means "no limit".
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn first(limit: usize) -> Self {
        Self { limit, offset: 0 }
    }
}

/// Storage interface for member documents.
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Insert a new member at [`RecordVersion::INITIAL`].
    async fn create_member(&self, member: Member) -> StorageResult<VersionedMember>;

    /// Read one member and the version it is stored at.
    async fn read_member(&self, member_id: &MemberId) -> StorageResult<Option<VersionedMember>>;

    /// Apply `patches` only if the stored version still equals `expected_version`.
    ///
    /// Returns the new version. Fails with `Conflict` when another writer got
    /// there first and with `NotFound` when the member is gone.
    async fn write_member(
        &self,
        member_id: &MemberId,
        patches: &[MemberPatch],
        expected_version: RecordVersion,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<RecordVersion>;

    /// Store the archive snapshot and remove the live record, conditionally on version.
    async fn archive_member(
        &self,
        archive: ArchivedMember,
        expected_version: RecordVersion,
    ) -> StorageResult<()>;

    async fn get_archived(&self, member_id: &MemberId) -> StorageResult<Option<ArchivedMember>>;

    /// List live members ordered by name.
    async fn list_members(&self, window: QueryWindow) -> StorageResult<Vec<VersionedMember>>;
}

/// Storage interface for the append-only action log.
#[async_trait]
pub trait ActionLogStore: Send + Sync {
    /// Append an entry and return the canonical, hash-linked stored record.
    async fn append_action(&self, entry: ActionLogAppend) -> StorageResult<ActionLogEntry>;

    /// Read entries newest-first.
    async fn list_actions(&self, window: QueryWindow) -> StorageResult<Vec<ActionLogEntry>>;

    /// Read one member's entries newest-first.
    async fn list_actions_for_member(
        &self,
        member_id: &MemberId,
        window: QueryWindow,
    ) -> StorageResult<Vec<ActionLogEntry>>;

    /// Get the latest hash anchor.
    async fn latest_action_hash(&self) -> StorageResult<Option<String>>;
}

/// Storage interface for member notice inboxes.
#[async_trait]
pub trait NoticeStore: Send + Sync {
    async fn append_notice(&self, notice: MemberNotice) -> StorageResult<()>;

    /// Read one member's notices newest-first.
    async fn list_notices(
        &self,
        member_id: &MemberId,
        window: QueryWindow,
    ) -> StorageResult<Vec<MemberNotice>>;
}

/// Unified storage bundle consumed by the penalty engine.
pub trait RosterStorage: MemberStore + ActionLogStore + NoticeStore + Send + Sync {}

impl<T> RosterStorage for T where T: MemberStore + ActionLogStore + NoticeStore + Send + Sync {}
