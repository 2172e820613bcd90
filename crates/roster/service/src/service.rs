use crate::{justification, ActionError, ServiceConfig};
use chrono::{DateTime, Utc};
use roster_gate::{AuthorizationProvider, GateDecision, GatedAction, RolePermissionGate};
use roster_ledger::{AuditLog, ChainReport, CounterStore, NoticeBoard};
use roster_policy::{DerivedEvent, Escalation, PenaltyEvent, Standing};
use roster_storage::memory::InMemoryRosterStorage;
use roster_storage::{ActionLogAppend, MemberStore, QueryWindow, RosterStorage, StorageError};
use roster_types::{
    ActionLogEntry, ActionType, ArchivedMember, LoggedAction, Member, MemberId, MemberNotice,
    MemberRegistration, MemberStatus, Principal, RecordVersion,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a successful penalty action did.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub member_id: MemberId,
    pub action: ActionType,
    pub final_status: MemberStatus,
    pub warning_count: u32,
    pub notification_count: u32,
    /// Automatic follow-ups, in the order they fired.
    pub triggered_automatic_actions: Vec<DerivedEvent>,
    /// The request's entry first, then one per automatic follow-up.
    pub log_entries: Vec<ActionLogEntry>,
    pub version: RecordVersion,
    pub attempts: u32,
}

/// A conditional write that landed.
struct Committed {
    escalation: Escalation,
    version: RecordVersion,
    attempts: u32,
    at: DateTime<Utc>,
}

/// The penalty action orchestrator.
pub struct PenaltyService {
    storage: Arc<dyn RosterStorage>,
    gate: Arc<dyn AuthorizationProvider>,
    counters: CounterStore,
    audit: AuditLog,
    notices: NoticeBoard,
    config: ServiceConfig,
}

impl PenaltyService {
    /// Create a service over fresh in-memory storage.
    pub fn new() -> Self {
        Self::with_storage(Arc::new(InMemoryRosterStorage::new()))
    }

    /// Create with an explicit storage backend and the role-flag gate.
    pub fn with_storage(storage: Arc<dyn RosterStorage>) -> Self {
        Self::with_components(
            storage,
            Arc::new(RolePermissionGate::new()),
            ServiceConfig::default(),
        )
    }

    pub fn with_components(
        storage: Arc<dyn RosterStorage>,
        gate: Arc<dyn AuthorizationProvider>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            counters: CounterStore::new(storage.clone()),
            audit: AuditLog::with_storage(storage.clone()),
            notices: NoticeBoard::new(storage.clone()),
            storage,
            gate,
            config,
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // ============ Penalty actions ============

    /// Apply one penalty action requested by `principal` to `target`.
    pub async fn perform_action(
        &self,
        principal: &Principal,
        target: &MemberId,
        action: ActionType,
        justification: &str,
    ) -> Result<ActionResult, ActionError> {
        // Denials are reported as such whatever the justification says.
        self.authorize(principal, target, GatedAction::Penalty(action))?;
        let justification = justification::for_action(action, justification)?;

        let event = PenaltyEvent::new(action, justification.clone());
        let committed = self.commit_with_retry(target, &event).await?;
        let escalation = &committed.escalation;

        for derived in &escalation.derived {
            info!(
                member_id = %target,
                automatic = %derived.action,
                reason = %derived.reason,
                "automatic escalation triggered"
            );
        }

        let mut appends = Vec::with_capacity(1 + escalation.derived.len());
        appends.push(ActionLogAppend {
            timestamp: committed.at,
            target_member_id: target.clone(),
            action_type: action.into(),
            justification: justification.clone(),
            is_automatic: false,
            acting_principal_id: principal.member_id.clone(),
        });
        appends.extend(escalation.derived.iter().map(|derived| ActionLogAppend {
            timestamp: committed.at,
            target_member_id: target.clone(),
            action_type: derived.action.logged_as(),
            justification: derived.reason.clone(),
            is_automatic: true,
            acting_principal_id: principal.member_id.clone(),
        }));
        let log_entries = self.record_all(target, action.into(), appends).await?;

        if action == ActionType::Notification {
            if let Err(err) = self
                .notices
                .deliver(target, &justification, committed.at)
                .await
            {
                error!(member_id = %target, error = %err, "notice not delivered after notification");
                return Err(ActionError::PartialFailure {
                    member_id: target.clone(),
                    action: LoggedAction::Notification,
                    logged_entries: log_entries.len(),
                    expected_entries: log_entries.len(),
                    detail: format!("notice not delivered: {err}"),
                });
            }
        }

        let next = &escalation.next;
        info!(
            member_id = %target,
            principal = %principal.member_id,
            action = %action,
            status = %next.status,
            warnings = next.warning_count,
            notifications = next.notification_count,
            attempts = committed.attempts,
            "penalty action applied"
        );

        Ok(ActionResult {
            member_id: target.clone(),
            action,
            final_status: next.status,
            warning_count: next.warning_count,
            notification_count: next.notification_count,
            triggered_automatic_actions: escalation.derived.clone(),
            log_entries,
            version: committed.version,
            attempts: committed.attempts,
        })
    }

    // ============ Member lifecycle ============

    /// Create a member in `Active` with both counters at zero.
    pub async fn register_member(
        &self,
        registration: MemberRegistration,
    ) -> Result<Member, ActionError> {
        let member = Member::register(registration, Utc::now());
        let member_id = member.member_id.clone();
        let stored = self
            .storage
            .create_member(member)
            .await
            .map_err(|err| storage_error(err, &member_id))?;
        info!(member_id = %member_id, "member registered");
        Ok(stored.member)
    }

    /// Archive and remove a member record. Admin only.
    pub async fn delete_member(
        &self,
        principal: &Principal,
        target: &MemberId,
        justification: &str,
    ) -> Result<ArchivedMember, ActionError> {
        self.authorize(principal, target, GatedAction::DeleteMember)?;
        let reason = justification::validate(justification)?;

        let max_attempts = self.config.attempts();
        let mut archived = None;
        for attempt in 1..=max_attempts {
            let record = self
                .storage
                .read_member(target)
                .await
                .map_err(|err| storage_error(err, target))?
                .ok_or_else(|| ActionError::NotFound(target.clone()))?;
            let archive = ArchivedMember {
                member: record.member,
                archived_by: principal.member_id.clone(),
                reason: reason.clone(),
                archived_at: Utc::now(),
            };
            match self
                .storage
                .archive_member(archive.clone(), record.version)
                .await
            {
                Ok(()) => {
                    archived = Some(archive);
                    break;
                }
                Err(err) if err.is_conflict() => {
                    warn!(member_id = %target, attempt, max_attempts, "member changed during delete, re-reading");
                }
                Err(err) => return Err(storage_error(err, target)),
            }
        }
        let archive = archived.ok_or(ActionError::RetryExhausted {
            attempts: max_attempts,
        })?;

        self.record_all(
            target,
            LoggedAction::Delete,
            vec![ActionLogAppend {
                timestamp: archive.archived_at,
                target_member_id: target.clone(),
                action_type: LoggedAction::Delete,
                justification: reason,
                is_automatic: false,
                acting_principal_id: principal.member_id.clone(),
            }],
        )
        .await?;

        info!(member_id = %target, principal = %principal.member_id, "member archived and removed");
        Ok(archive)
    }

    // ============ Queries ============

    pub async fn member(&self, member_id: &MemberId) -> Result<Member, ActionError> {
        self.storage
            .read_member(member_id)
            .await
            .map_err(|err| storage_error(err, member_id))?
            .map(|record| record.member)
            .ok_or_else(|| ActionError::NotFound(member_id.clone()))
    }

    /// Live members ordered by name.
    pub async fn members(&self, window: QueryWindow) -> Result<Vec<Member>, ActionError> {
        let records = self
            .storage
            .list_members(window)
            .await
            .map_err(|err| ActionError::from_backend(err.into()))?;
        Ok(records.into_iter().map(|record| record.member).collect())
    }

    pub async fn archived_member(
        &self,
        member_id: &MemberId,
    ) -> Result<Option<ArchivedMember>, ActionError> {
        self.storage
            .get_archived(member_id)
            .await
            .map_err(|err| storage_error(err, member_id))
    }

    /// Progress toward the member's next automatic warning and ban.
    pub async fn standing(&self, member_id: &MemberId) -> Result<Standing, ActionError> {
        let snapshot = self
            .counters
            .get_counters(member_id)
            .await
            .map_err(|err| ActionError::from_ledger(err, member_id))?;
        Ok(roster_policy::standing(&snapshot.state))
    }

    /// Action log entries about one member, newest-first.
    pub async fn history(
        &self,
        member_id: &MemberId,
        window: QueryWindow,
    ) -> Result<Vec<ActionLogEntry>, ActionError> {
        self.audit
            .history(member_id, window)
            .await
            .map_err(|err| ActionError::from_ledger(err, member_id))
    }

    pub async fn notices(
        &self,
        member_id: &MemberId,
        window: QueryWindow,
    ) -> Result<Vec<MemberNotice>, ActionError> {
        self.notices
            .inbox(member_id, window)
            .await
            .map_err(|err| ActionError::from_ledger(err, member_id))
    }

    pub async fn verify_audit_chain(&self) -> Result<ChainReport, ActionError> {
        self.audit
            .verify_chain()
            .await
            .map_err(ActionError::from_backend)
    }

    // ============ Internals ============

    fn authorize(
        &self,
        principal: &Principal,
        target: &MemberId,
        action: GatedAction,
    ) -> Result<(), ActionError> {
        match self.gate.authorize(principal, target, action) {
            GateDecision::Allow => Ok(()),
            GateDecision::Deny(reason) => {
                warn!(
                    principal = %principal.member_id,
                    target = %target,
                    action = %action,
                    reason = %reason,
                    "action denied"
                );
                Err(ActionError::Permission(reason))
            }
        }
    }

    /// Read, apply and conditionally write until the write lands.
    async fn commit_with_retry(
        &self,
        target: &MemberId,
        event: &PenaltyEvent,
    ) -> Result<Committed, ActionError> {
        let max_attempts = self.config.attempts();
        for attempt in 1..=max_attempts {
            let snapshot = self
                .counters
                .get_counters(target)
                .await
                .map_err(|err| ActionError::from_ledger(err, target))?;
            let escalation = roster_policy::apply(&snapshot.state, event)?;
            let at = Utc::now();

            match self
                .counters
                .set_counters(target, &escalation.patches(at), snapshot.version, at)
                .await
            {
                Ok(version) => {
                    debug!(member_id = %target, attempt, version = %version, "member updated");
                    return Ok(Committed {
                        escalation,
                        version,
                        attempts: attempt,
                        at,
                    });
                }
                Err(err) if err.is_conflict() => {
                    warn!(
                        member_id = %target,
                        attempt,
                        max_attempts,
                        "concurrent update, re-reading member"
                    );
                }
                Err(err) => return Err(ActionError::from_ledger(err, target)),
            }
        }

        warn!(member_id = %target, max_attempts, "giving up after repeated conflicts");
        Err(ActionError::RetryExhausted {
            attempts: max_attempts,
        })
    }

    /// Append entries in order, stopping at the first failure.
    async fn record_all(
        &self,
        target: &MemberId,
        action: LoggedAction,
        appends: Vec<ActionLogAppend>,
    ) -> Result<Vec<ActionLogEntry>, ActionError> {
        let expected_entries = appends.len();
        let mut entries = Vec::with_capacity(expected_entries);
        for append in appends {
            match self.audit.record(append).await {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    error!(
                        member_id = %target,
                        action = %action,
                        logged = entries.len(),
                        expected = expected_entries,
                        error = %err,
                        "action log incomplete after member was written"
                    );
                    return Err(ActionError::PartialFailure {
                        member_id: target.clone(),
                        action,
                        logged_entries: entries.len(),
                        expected_entries,
                        detail: err.to_string(),
                    });
                }
            }
        }
        Ok(entries)
    }
}

impl Default for PenaltyService {
    fn default() -> Self {
        Self::new()
    }
}

fn storage_error(err: StorageError, member_id: &MemberId) -> ActionError {
    ActionError::from_ledger(err.into(), member_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedStorage;
    use proptest::prelude::*;
    use roster_gate::DenialReason;
    use roster_types::AutomaticAction;

    fn admin() -> Principal {
        Principal::admin(MemberId::new("admin-1"))
    }

    async fn register(service: &PenaltyService, id: &str) -> MemberId {
        service
            .register_member(MemberRegistration {
                member_id: Some(MemberId::new(id)),
                name: format!("Member {id}"),
                email: format!("{id}@example.org"),
                ..Default::default()
            })
            .await
            .unwrap()
            .member_id
    }

    async fn service_over(storage: Arc<ScriptedStorage>) -> (PenaltyService, MemberId) {
        let service = PenaltyService::with_storage(storage);
        let member_id = register(&service, "m-1").await;
        (service, member_id)
    }

    #[tokio::test]
    async fn third_notification_raises_warning() {
        let service = PenaltyService::new();
        let member_id = register(&service, "m-1").await;

        for _ in 0..2 {
            let result = service
                .perform_action(&admin(), &member_id, ActionType::Notification, "late report")
                .await
                .unwrap();
            assert!(result.triggered_automatic_actions.is_empty());
            assert_eq!(result.log_entries.len(), 1);
        }

        let result = service
            .perform_action(&admin(), &member_id, ActionType::Notification, "late report")
            .await
            .unwrap();
        assert_eq!(result.notification_count, 3);
        assert_eq!(result.warning_count, 1);
        assert_eq!(result.final_status, MemberStatus::Active);
        assert_eq!(
            result
                .triggered_automatic_actions
                .iter()
                .map(|event| event.action)
                .collect::<Vec<_>>(),
            vec![AutomaticAction::AutoWarning]
        );
        assert_eq!(result.log_entries[1].action_type, LoggedAction::Warning);
        assert!(result.log_entries[1].is_automatic);
        assert_eq!(result.log_entries[1].acting_principal_id, admin().member_id);

        let notices = service
            .notices(&member_id, QueryWindow::all())
            .await
            .unwrap();
        assert_eq!(notices.len(), 3);
        assert_eq!(notices[0].message, "late report");
    }

    #[tokio::test]
    async fn interleaved_write_is_retried() {
        let storage = Arc::new(ScriptedStorage::new());
        let (service, member_id) = service_over(storage.clone()).await;
        storage.race_next_write();

        let result = service
            .perform_action(&admin(), &member_id, ActionType::Notification, "missed meeting")
            .await
            .unwrap();

        assert_eq!(result.attempts, 2);
        // The competing writer's notification and ours both landed.
        assert_eq!(result.notification_count, 2);
        assert_eq!(
            service.history(&member_id, QueryWindow::all()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn persistent_conflicts_exhaust_retries() {
        let storage = Arc::new(ScriptedStorage::new());
        let (service, member_id) = service_over(storage.clone()).await;
        storage.conflict_next_writes(10);

        let err = service
            .perform_action(&admin(), &member_id, ActionType::Warning, "no show")
            .await
            .unwrap_err();

        assert!(matches!(err, ActionError::RetryExhausted { attempts: 3 }));
        assert!(err.is_retryable());
        let member = service.member(&member_id).await.unwrap();
        assert_eq!(member.penalty.warning_count, 0);
        assert!(service
            .history(&member_id, QueryWindow::all())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn single_attempt_config_does_not_retry() {
        let storage = Arc::new(ScriptedStorage::new());
        let (service, member_id) = service_over(storage.clone()).await;
        let service = service.with_config(ServiceConfig { max_attempts: 1 });
        storage.race_next_write();

        let err = service
            .perform_action(&admin(), &member_id, ActionType::Notification, "missed meeting")
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::RetryExhausted { attempts: 1 }));
    }

    #[tokio::test]
    async fn failed_cascade_log_is_partial_failure() {
        let storage = Arc::new(ScriptedStorage::new());
        let (service, member_id) = service_over(storage.clone()).await;
        for _ in 0..2 {
            service
                .perform_action(&admin(), &member_id, ActionType::Warning, "no show")
                .await
                .unwrap();
        }
        // The third warning's own entry lands, the automatic ban's does not.
        storage.fail_appends_after(1);

        let err = service
            .perform_action(&admin(), &member_id, ActionType::Warning, "no show")
            .await
            .unwrap_err();

        match &err {
            ActionError::PartialFailure {
                logged_entries,
                expected_entries,
                action,
                ..
            } => {
                assert_eq!(*logged_entries, 1);
                assert_eq!(*expected_entries, 2);
                assert_eq!(*action, LoggedAction::Warning);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.is_retryable());

        let member = service.member(&member_id).await.unwrap();
        assert_eq!(member.penalty.status, MemberStatus::Banned);
        assert_eq!(member.penalty.warning_count, 3);
    }

    #[tokio::test]
    async fn failed_notice_is_partial_failure() {
        let storage = Arc::new(ScriptedStorage::new());
        let (service, member_id) = service_over(storage.clone()).await;
        storage.fail_notices();

        let err = service
            .perform_action(&admin(), &member_id, ActionType::Notification, "late report")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ActionError::PartialFailure {
                logged_entries: 1,
                expected_entries: 1,
                ..
            }
        ));
        assert_eq!(
            service.member(&member_id).await.unwrap().penalty.notification_count,
            1
        );
    }

    #[tokio::test]
    async fn unreachable_storage_is_unavailable() {
        let storage = Arc::new(ScriptedStorage::new());
        let (service, member_id) = service_over(storage.clone()).await;
        storage.fail_reads();

        let err = service
            .perform_action(&admin(), &member_id, ActionType::Ban, "harassment")
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Unavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn denial_leaves_no_trace() {
        let service = PenaltyService::new();
        let member_id = register(&service, "m-1").await;
        let member = Principal::new(MemberId::new("m-2"));

        let err = service
            .perform_action(&member, &member_id, ActionType::Ban, "")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ActionError::Permission(DenialReason::InsufficientPermission)
        ));
        assert!(service
            .history(&member_id, QueryWindow::all())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            service.member(&member_id).await.unwrap().penalty.status,
            MemberStatus::Active
        );
    }

    #[tokio::test]
    async fn short_justification_is_rejected_before_writing() {
        let service = PenaltyService::new();
        let member_id = register(&service, "m-1").await;

        let err = service
            .perform_action(&admin(), &member_id, ActionType::Warning, " a ")
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
        assert_eq!(
            service.member(&member_id).await.unwrap().penalty.warning_count,
            0
        );
    }

    #[tokio::test]
    async fn banned_member_cannot_be_notified() {
        let service = PenaltyService::new();
        let member_id = register(&service, "m-1").await;
        service
            .perform_action(&admin(), &member_id, ActionType::Ban, "harassment")
            .await
            .unwrap();

        let err = service
            .perform_action(&admin(), &member_id, ActionType::Notification, "late report")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ActionError::InvalidTransition {
                action: ActionType::Notification,
                status: MemberStatus::Banned
            }
        ));

        let member = service.member(&member_id).await.unwrap();
        assert_eq!(member.penalty.ban_reason.as_deref(), Some("harassment"));
        assert!(member.banned_at.is_some());
    }

    #[tokio::test]
    async fn blank_clear_logs_a_description() {
        let service = PenaltyService::new();
        let member_id = register(&service, "m-1").await;
        let president = Principal::new(MemberId::new("p-1"))
            .with_role(roster_types::MemberRole::President);

        let result = service
            .perform_action(&president, &member_id, ActionType::ClearWarnings, "")
            .await
            .unwrap();
        assert_eq!(
            result.log_entries[0].justification,
            "manual reset of warnings"
        );
    }

    #[tokio::test]
    async fn delete_archives_before_removing() {
        let service = PenaltyService::new();
        let member_id = register(&service, "m-1").await;

        let archive = service
            .delete_member(&admin(), &member_id, "left the organisation")
            .await
            .unwrap();

        assert_eq!(archive.archived_by, admin().member_id);
        assert!(matches!(
            service.member(&member_id).await,
            Err(ActionError::NotFound(_))
        ));
        assert_eq!(
            service.archived_member(&member_id).await.unwrap(),
            Some(archive)
        );
        let history = service
            .history(&member_id, QueryWindow::all())
            .await
            .unwrap();
        assert_eq!(history[0].action_type, LoggedAction::Delete);
    }

    #[tokio::test]
    async fn delete_is_admin_only_and_never_self() {
        let service = PenaltyService::new();
        let member_id = register(&service, "m-1").await;

        let err = service
            .delete_member(
                &Principal::power_user(MemberId::new("pu-1")),
                &member_id,
                "left the organisation",
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ActionError::Permission(DenialReason::InsufficientPermission)
        ));

        let err = service
            .delete_member(&Principal::admin(member_id.clone()), &member_id, "bye")
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Permission(DenialReason::SelfAction)));

        let err = service
            .delete_member(&admin(), &MemberId::new("ghost"), "left the organisation")
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::NotFound(_)));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let service = PenaltyService::new();
        register(&service, "m-1").await;
        let err = service
            .register_member(MemberRegistration {
                member_id: Some(MemberId::new("m-1")),
                name: "Again".to_string(),
                email: "again@example.org".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::AlreadyExists(_)));
    }

    fn action_strategy() -> impl Strategy<Value = Vec<ActionType>> {
        proptest::collection::vec(proptest::sample::select(ActionType::ALL.to_vec()), 1..25)
    }

    proptest! {
        #[test]
        fn every_success_logs_request_plus_follow_ups(actions in action_strategy()) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");

            rt.block_on(async move {
                let service = PenaltyService::new();
                let member_id = register(&service, "m-1").await;
                let mut expected_entries = 0;

                for action in actions {
                    let before = service.history(&member_id, QueryWindow::all()).await.unwrap().len();
                    match service
                        .perform_action(&admin(), &member_id, action, "recorded in minutes")
                        .await
                    {
                        Ok(result) => {
                            let added = 1 + result.triggered_automatic_actions.len();
                            assert_eq!(result.log_entries.len(), added);
                            assert!(!result.log_entries[0].is_automatic);
                            assert!(result.log_entries[1..].iter().all(|entry| entry.is_automatic));
                            expected_entries += added;
                        }
                        Err(err) => {
                            assert!(matches!(err, ActionError::InvalidTransition { .. }));
                            let after = service.history(&member_id, QueryWindow::all()).await.unwrap().len();
                            assert_eq!(before, after);
                        }
                    }
                }

                let history = service.history(&member_id, QueryWindow::all()).await.unwrap();
                assert_eq!(history.len(), expected_entries);
                service.verify_audit_chain().await.unwrap();
            });
        }
    }
}
