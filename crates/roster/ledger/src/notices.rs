use crate::LedgerError;
use chrono::{DateTime, Utc};
use roster_storage::{QueryWindow, RosterStorage};
use roster_types::{MemberId, MemberNotice, NoticePriority};
use std::sync::Arc;

pub const NOTIFICATION_TITLE: &str = "Notificação do sistema";

/// Delivers inbox notices to members.
#[derive(Clone)]
pub struct NoticeBoard {
    storage: Arc<dyn RosterStorage>,
}

impl NoticeBoard {
    pub fn new(storage: Arc<dyn RosterStorage>) -> Self {
        Self { storage }
    }

    /// Deliver a notification notice carrying `message`.
    pub async fn deliver(
        &self,
        member_id: &MemberId,
        message: &str,
        created_at: DateTime<Utc>,
    ) -> Result<MemberNotice, LedgerError> {
        let notice = MemberNotice {
            notice_id: format!("notice-{}", uuid::Uuid::new_v4()),
            member_id: member_id.clone(),
            title: NOTIFICATION_TITLE.to_string(),
            message: message.to_string(),
            priority: NoticePriority::Medium,
            is_new: true,
            created_at,
        };
        self.storage.append_notice(notice.clone()).await?;
        Ok(notice)
    }

    pub async fn inbox(
        &self,
        member_id: &MemberId,
        window: QueryWindow,
    ) -> Result<Vec<MemberNotice>, LedgerError> {
        Ok(self.storage.list_notices(member_id, window).await?)
    }
}
