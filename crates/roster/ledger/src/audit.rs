use crate::LedgerError;
use roster_storage::memory::InMemoryRosterStorage;
use roster_storage::{chain_hash, ActionLogAppend, QueryWindow, RosterStorage};
use roster_types::{ActionLogEntry, MemberId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// The action log facade.
///
/// Entries are append-only; nothing here updates or deletes one.
pub struct AuditLog {
    storage: Arc<dyn RosterStorage>,
}

/// Outcome of a successful chain verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub entries: u64,
    pub head: Option<String>,
}

impl AuditLog {
    /// Create a log backed by in-memory storage.
    pub fn new() -> Self {
        Self {
            storage: Arc::new(InMemoryRosterStorage::new()),
        }
    }

    pub fn with_storage(storage: Arc<dyn RosterStorage>) -> Self {
        Self { storage }
    }

    /// Append one entry and return it as stored.
    pub async fn record(&self, entry: ActionLogAppend) -> Result<ActionLogEntry, LedgerError> {
        let stored = self.storage.append_action(entry).await?;
        debug!(
            sequence = stored.sequence,
            target = %stored.target_member_id,
            action = %stored.action_type,
            automatic = stored.is_automatic,
            "action logged"
        );
        Ok(stored)
    }

    /// One member's entries, newest-first.
    pub async fn history(
        &self,
        member_id: &MemberId,
        window: QueryWindow,
    ) -> Result<Vec<ActionLogEntry>, LedgerError> {
        Ok(self
            .storage
            .list_actions_for_member(member_id, window)
            .await?)
    }

    /// All entries, newest-first.
    pub async fn recent(&self, window: QueryWindow) -> Result<Vec<ActionLogEntry>, LedgerError> {
        Ok(self.storage.list_actions(window).await?)
    }

    /// Recompute every hash from the first entry and check the links.
    pub async fn verify_chain(&self) -> Result<ChainReport, LedgerError> {
        let mut entries = self.storage.list_actions(QueryWindow::all()).await?;
        entries.sort_by_key(|entry| entry.sequence);

        let mut previous: Option<String> = None;
        for (index, entry) in entries.iter().enumerate() {
            let expected_sequence = index as u64 + 1;
            if entry.sequence != expected_sequence {
                return Err(LedgerError::ChainBroken {
                    sequence: entry.sequence,
                    detail: format!("expected sequence {expected_sequence}"),
                });
            }
            if entry.previous_hash != previous {
                return Err(LedgerError::ChainBroken {
                    sequence: entry.sequence,
                    detail: "previous hash does not match predecessor".to_string(),
                });
            }
            let recomputed = chain_hash(
                &ActionLogAppend {
                    timestamp: entry.timestamp,
                    target_member_id: entry.target_member_id.clone(),
                    action_type: entry.action_type,
                    justification: entry.justification.clone(),
                    is_automatic: entry.is_automatic,
                    acting_principal_id: entry.acting_principal_id.clone(),
                },
                previous.as_deref(),
                entry.sequence,
            )?;
            if recomputed != entry.hash {
                return Err(LedgerError::ChainBroken {
                    sequence: entry.sequence,
                    detail: "content hash mismatch".to_string(),
                });
            }
            previous = Some(entry.hash.clone());
        }

        Ok(ChainReport {
            entries: entries.len() as u64,
            head: previous,
        })
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}
