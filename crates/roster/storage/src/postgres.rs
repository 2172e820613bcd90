//! PostgreSQL adapter for roster storage.
//!
//! Members are stored as JSONB documents next to an integer version column;
//! conditional writes compare that column in the `WHERE` clause, so two
//! writers racing on the same member see exactly one winner.

use crate::model::{chain_hash, log_timestamp, ActionLogAppend, VersionedMember};
use crate::traits::{ActionLogStore, MemberStore, NoticeStore, QueryWindow};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roster_types::{
    ActionLogEntry, ActionLogEntryId, ArchivedMember, LoggedAction, Member, MemberId,
    MemberNotice, MemberPatch, NoticePriority, RecordVersion,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Acquire, Row};

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresRosterStorage {
    pool: PgPool,
}

impl PostgresRosterStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Unavailable(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS roster_members (
                member_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                document JSONB NOT NULL,
                version BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS roster_archived_members (
                member_id TEXT PRIMARY KEY,
                archive JSONB NOT NULL,
                archived_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS roster_action_log (
                entry_id TEXT PRIMARY KEY,
                sequence BIGINT NOT NULL UNIQUE,
                timestamp TIMESTAMPTZ NOT NULL,
                target_member_id TEXT NOT NULL,
                action_type TEXT NOT NULL,
                justification TEXT NOT NULL,
                is_automatic BOOLEAN NOT NULL,
                acting_principal_id TEXT NOT NULL,
                previous_hash TEXT,
                hash TEXT NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS roster_action_log_target_idx
                ON roster_action_log (target_member_id, sequence DESC)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS roster_notices (
                notice_id TEXT PRIMARY KEY,
                member_id TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                priority TEXT NOT NULL,
                is_new BOOLEAN NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                inserted BIGSERIAL
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    async fn current_version(&self, member_id: &MemberId) -> StorageResult<Option<RecordVersion>> {
        let row = sqlx::query("SELECT version FROM roster_members WHERE member_id = $1")
            .bind(member_id.0.clone())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(|row| {
            row.try_get::<i64, _>("version")
                .map_err(|e| StorageError::Backend(e.to_string()))
                .and_then(from_i64_version)
        })
        .transpose()
    }

    async fn conflict_or_missing(
        &self,
        member_id: &MemberId,
        expected: RecordVersion,
    ) -> StorageError {
        match self.current_version(member_id).await {
            Ok(Some(found)) => StorageError::Conflict {
                record: format!("member {}", member_id),
                expected,
                found,
            },
            Ok(None) => StorageError::NotFound(format!("member {} not found", member_id)),
            Err(err) => err,
        }
    }
}

#[async_trait]
impl MemberStore for PostgresRosterStorage {
    async fn create_member(&self, member: Member) -> StorageResult<VersionedMember> {
        let document =
            serde_json::to_value(&member).map_err(|e| StorageError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO roster_members (member_id, name, document, version, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(member.member_id.0.clone())
        .bind(member.name.clone())
        .bind(document)
        .bind(to_i64_version(RecordVersion::INITIAL)?)
        .bind(member.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(VersionedMember {
            member,
            version: RecordVersion::INITIAL,
        })
    }

    async fn read_member(&self, member_id: &MemberId) -> StorageResult<Option<VersionedMember>> {
        let row = sqlx::query(
            "SELECT document, version FROM roster_members WHERE member_id = $1",
        )
        .bind(member_id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(member_row_to_record).transpose()
    }

    async fn write_member(
        &self,
        member_id: &MemberId,
        patches: &[MemberPatch],
        expected_version: RecordVersion,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<RecordVersion> {
        let Some(mut current) = self.read_member(member_id).await? else {
            return Err(StorageError::NotFound(format!(
                "member {} not found",
                member_id
            )));
        };
        if current.version != expected_version {
            return Err(StorageError::Conflict {
                record: format!("member {}", member_id),
                expected: expected_version,
                found: current.version,
            });
        }

        current.member.apply_patches(patches, updated_at);
        let next = expected_version.next();
        let document = serde_json::to_value(&current.member)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE roster_members
               SET document = $1,
                   version = $2,
                   updated_at = $3
             WHERE member_id = $4
               AND version = $5
            "#,
        )
        .bind(document)
        .bind(to_i64_version(next)?)
        .bind(updated_at)
        .bind(member_id.0.clone())
        .bind(to_i64_version(expected_version)?)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(self.conflict_or_missing(member_id, expected_version).await);
        }
        Ok(next)
    }

    async fn archive_member(
        &self,
        archive: ArchivedMember,
        expected_version: RecordVersion,
    ) -> StorageResult<()> {
        let member_id = archive.member.member_id.clone();
        let archive_json = serde_json::to_value(&archive)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let conn = tx.acquire().await.map_err(map_sqlx_error)?;

        let deleted = sqlx::query("DELETE FROM roster_members WHERE member_id = $1 AND version = $2")
            .bind(member_id.0.clone())
            .bind(to_i64_version(expected_version)?)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        if deleted.rows_affected() == 0 {
            drop(tx);
            return Err(self.conflict_or_missing(&member_id, expected_version).await);
        }

        sqlx::query(
            r#"
            INSERT INTO roster_archived_members (member_id, archive, archived_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (member_id) DO UPDATE
               SET archive = EXCLUDED.archive,
                   archived_at = EXCLUDED.archived_at
            "#,
        )
        .bind(member_id.0.clone())
        .bind(archive_json)
        .bind(archive.archived_at)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_archived(&self, member_id: &MemberId) -> StorageResult<Option<ArchivedMember>> {
        let row = sqlx::query("SELECT archive FROM roster_archived_members WHERE member_id = $1")
            .bind(member_id.0.clone())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(|row| {
            let value: serde_json::Value = row
                .try_get("archive")
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            serde_json::from_value(value).map_err(|e| StorageError::Serialization(e.to_string()))
        })
        .transpose()
    }

    async fn list_members(&self, window: QueryWindow) -> StorageResult<Vec<VersionedMember>> {
        let rows = sqlx::query(
            r#"
            SELECT document, version
              FROM roster_members
             ORDER BY name ASC, member_id ASC
             LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit_param(window)?)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(member_row_to_record).collect()
    }
}

#[async_trait]
impl ActionLogStore for PostgresRosterStorage {
    async fn append_action(&self, entry: ActionLogAppend) -> StorageResult<ActionLogEntry> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let conn = tx.acquire().await.map_err(map_sqlx_error)?;
        sqlx::query("LOCK TABLE roster_action_log IN EXCLUSIVE MODE")
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        let last = sqlx::query(
            "SELECT sequence, hash FROM roster_action_log ORDER BY sequence DESC LIMIT 1",
        )
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        let (sequence, previous_hash) = if let Some(row) = last {
            let seq: i64 = row
                .try_get("sequence")
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let prev: String = row
                .try_get("hash")
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            (seq + 1, Some(prev))
        } else {
            (1_i64, None)
        };

        let sequence_u64 = u64::try_from(sequence)
            .map_err(|_| StorageError::Backend(format!("negative sequence {sequence}")))?;
        let timestamp = log_timestamp(entry.timestamp);
        let hash = chain_hash(&entry, previous_hash.as_deref(), sequence_u64)?;
        let entry_id = ActionLogEntryId::generate();

        sqlx::query(
            r#"
            INSERT INTO roster_action_log
                (entry_id, sequence, timestamp, target_member_id, action_type, justification,
                 is_automatic, acting_principal_id, previous_hash, hash)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry_id.0.clone())
        .bind(sequence)
        .bind(timestamp)
        .bind(entry.target_member_id.0.clone())
        .bind(entry.action_type.to_string())
        .bind(entry.justification.clone())
        .bind(entry.is_automatic)
        .bind(entry.acting_principal_id.0.clone())
        .bind(previous_hash.clone())
        .bind(hash.clone())
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(ActionLogEntry {
            entry_id,
            sequence: sequence_u64,
            target_member_id: entry.target_member_id,
            action_type: entry.action_type,
            justification: entry.justification,
            is_automatic: entry.is_automatic,
            acting_principal_id: entry.acting_principal_id,
            timestamp,
            previous_hash,
            hash,
        })
    }

    async fn list_actions(&self, window: QueryWindow) -> StorageResult<Vec<ActionLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, sequence, timestamp, target_member_id, action_type, justification,
                   is_automatic, acting_principal_id, previous_hash, hash
              FROM roster_action_log
             ORDER BY sequence DESC
             LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit_param(window)?)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(action_row_to_entry).collect()
    }

    async fn list_actions_for_member(
        &self,
        member_id: &MemberId,
        window: QueryWindow,
    ) -> StorageResult<Vec<ActionLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, sequence, timestamp, target_member_id, action_type, justification,
                   is_automatic, acting_principal_id, previous_hash, hash
              FROM roster_action_log
             WHERE target_member_id = $1
             ORDER BY sequence DESC
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(member_id.0.clone())
        .bind(limit_param(window)?)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(action_row_to_entry).collect()
    }

    async fn latest_action_hash(&self) -> StorageResult<Option<String>> {
        let row = sqlx::query("SELECT hash FROM roster_action_log ORDER BY sequence DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(|row| {
            row.try_get::<String, _>("hash")
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .transpose()
    }
}

#[async_trait]
impl NoticeStore for PostgresRosterStorage {
    async fn append_notice(&self, notice: MemberNotice) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO roster_notices
                (notice_id, member_id, title, message, priority, is_new, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(notice.notice_id)
        .bind(notice.member_id.0)
        .bind(notice.title)
        .bind(notice.message)
        .bind(priority_label(notice.priority)?)
        .bind(notice.is_new)
        .bind(notice.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_notices(
        &self,
        member_id: &MemberId,
        window: QueryWindow,
    ) -> StorageResult<Vec<MemberNotice>> {
        let rows = sqlx::query(
            r#"
            SELECT notice_id, member_id, title, message, priority, is_new, created_at
              FROM roster_notices
             WHERE member_id = $1
             ORDER BY inserted DESC
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(member_id.0.clone())
        .bind(limit_param(window)?)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                let priority: String = row
                    .try_get("priority")
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                Ok(MemberNotice {
                    notice_id: get(&row, "notice_id")?,
                    member_id: MemberId(get(&row, "member_id")?),
                    title: get(&row, "title")?,
                    message: get(&row, "message")?,
                    priority: parse_priority(&priority)?,
                    is_new: row
                        .try_get("is_new")
                        .map_err(|e| StorageError::Backend(e.to_string()))?,
                    created_at: row
                        .try_get("created_at")
                        .map_err(|e| StorageError::Backend(e.to_string()))?,
                })
            })
            .collect()
    }
}

fn member_row_to_record(row: PgRow) -> StorageResult<VersionedMember> {
    let document: serde_json::Value = row
        .try_get("document")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let version: i64 = row
        .try_get("version")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(VersionedMember {
        member: serde_json::from_value(document)
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        version: from_i64_version(version)?,
    })
}

fn action_row_to_entry(row: PgRow) -> StorageResult<ActionLogEntry> {
    let sequence: i64 = row
        .try_get("sequence")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let action_type: String = get(&row, "action_type")?;
    Ok(ActionLogEntry {
        entry_id: ActionLogEntryId(get(&row, "entry_id")?),
        sequence: u64::try_from(sequence)
            .map_err(|_| StorageError::Backend(format!("negative sequence {sequence}")))?,
        target_member_id: MemberId(get(&row, "target_member_id")?),
        action_type: parse_logged_action(&action_type)?,
        justification: get(&row, "justification")?,
        is_automatic: row
            .try_get("is_automatic")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        acting_principal_id: MemberId(get(&row, "acting_principal_id")?),
        timestamp: row
            .try_get("timestamp")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        previous_hash: row
            .try_get("previous_hash")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        hash: get(&row, "hash")?,
    })
}

fn get(row: &PgRow, column: &str) -> StorageResult<String> {
    row.try_get(column)
        .map_err(|e| StorageError::Backend(e.to_string()))
}

fn parse_logged_action(raw: &str) -> StorageResult<LoggedAction> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).map_err(|_| {
        StorageError::Serialization(format!("unknown action type `{raw}`"))
    })
}

fn priority_label(priority: NoticePriority) -> StorageResult<String> {
    match serde_json::to_value(priority) {
        Ok(serde_json::Value::String(label)) => Ok(label),
        _ => Err(StorageError::Serialization(format!(
            "notice priority {priority:?} has no label"
        ))),
    }
}

fn parse_priority(raw: &str) -> StorageResult<NoticePriority> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).map_err(|_| {
        StorageError::Serialization(format!("unknown notice priority `{raw}`"))
    })
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            StorageError::AlreadyExists(db_err.message().to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StorageError::Unavailable(err.to_string())
        }
        _ => StorageError::Backend(err.to_string()),
    }
}

/// `LIMIT NULL` means no limit in PostgreSQL.
fn limit_param(window: QueryWindow) -> StorageResult<Option<i64>> {
    if window.limit == 0 {
        Ok(None)
    } else {
        to_i64(window.limit).map(Some)
    }
}

fn to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput("window value too large".to_string()))
}

fn to_i64_version(version: RecordVersion) -> StorageResult<i64> {
    i64::try_from(version.0)
        .map_err(|_| StorageError::InvalidInput(format!("version {version} out of range")))
}

fn from_i64_version(raw: i64) -> StorageResult<RecordVersion> {
    u64::try_from(raw)
        .map(RecordVersion)
        .map_err(|_| StorageError::Backend(format!("negative version {raw}")))
}
