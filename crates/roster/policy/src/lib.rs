//! Roster Policy - the penalty escalation state machine.
//!
//! Given a member's current [`PenaltyState`] and a requested action, the
//! policy computes the next state and the automatic follow-up actions the
//! thresholds raise. It is pure: no storage, no clock, no I/O beyond
//! `tracing` events. Timestamps and every side effect come from the caller.
//!
//! Thresholds are fixed:
//! - every [`NOTIFICATIONS_PER_WARNING`]th cumulative notification raises one
//!   automatic warning
//! - reaching [`WARNINGS_BEFORE_BAN`] warnings raises one automatic ban
//!
//! A single request cascades at most notification -> warning -> ban.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use roster_types::{ActionType, AutomaticAction, MemberPatch, MemberStatus, PenaltyState};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Cumulative notifications that raise one automatic warning.
pub const NOTIFICATIONS_PER_WARNING: u32 = 3;

/// Warnings that raise an automatic ban.
pub const WARNINGS_BEFORE_BAN: u32 = 3;

pub const AUTO_WARNING_REASON: &str = "accumulated 3 notifications";
pub const AUTO_BAN_REASON: &str = "accumulated 3 warnings";

/// A requested action with the human justification that accompanies it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyEvent {
    pub action: ActionType,
    pub justification: String,
}

impl PenaltyEvent {
    pub fn new(action: ActionType, justification: impl Into<String>) -> Self {
        Self {
            action,
            justification: justification.into(),
        }
    }
}

/// An automatic action raised by a threshold, in the order it was raised.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedEvent {
    pub action: AutomaticAction,
    pub reason: String,
}

/// Result of applying one event: before, after, and what cascaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub previous: PenaltyState,
    pub next: PenaltyState,
    pub derived: Vec<DerivedEvent>,
}

impl Escalation {
    pub fn entered_ban(&self) -> bool {
        !self.previous.status.is_banned() && self.next.status.is_banned()
    }

    pub fn left_ban(&self) -> bool {
        self.previous.status.is_banned() && !self.next.status.is_banned()
    }

    /// Field updates that take a stored member from `previous` to `next`.
    ///
    /// Counter and status fields are always written in full so the update is
    /// self-contained; ban timestamps are only touched on a ban boundary.
    pub fn patches(&self, now: DateTime<Utc>) -> Vec<MemberPatch> {
        let mut patches = vec![
            MemberPatch::Status(self.next.status),
            MemberPatch::WarningCount(self.next.warning_count),
            MemberPatch::NotificationCount(self.next.notification_count),
            MemberPatch::BanReason(self.next.ban_reason.clone()),
        ];
        if self.entered_ban() {
            patches.push(MemberPatch::BannedAt(Some(now)));
        }
        if self.left_ban() {
            patches.push(MemberPatch::BannedAt(None));
            patches.push(MemberPatch::LastReactivatedAt(Some(now)));
        }
        patches
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("invalid transition: {action} is not allowed while member is {status}")]
    InvalidTransition {
        action: ActionType,
        status: MemberStatus,
    },

    #[error("{0} counter overflow")]
    CounterOverflow(&'static str),
}

/// Apply `event` to `current` and return the resulting escalation.
pub fn apply(current: &PenaltyState, event: &PenaltyEvent) -> Result<Escalation, PolicyError> {
    let mut next = current.clone();
    let mut derived = Vec::new();

    match event.action {
        ActionType::Notification => {
            reject_if_banned(current, event.action)?;
            next.notification_count = next
                .notification_count
                .checked_add(1)
                .ok_or(PolicyError::CounterOverflow("notification"))?;
            if next.notification_count % NOTIFICATIONS_PER_WARNING == 0 {
                debug!(
                    notifications = next.notification_count,
                    "notification threshold reached"
                );
                derived.push(DerivedEvent {
                    action: AutomaticAction::AutoWarning,
                    reason: AUTO_WARNING_REASON.to_string(),
                });
                register_warning(&mut next, &mut derived)?;
            }
        }
        ActionType::Warning => {
            reject_if_banned(current, event.action)?;
            register_warning(&mut next, &mut derived)?;
        }
        ActionType::Ban => {
            reject_if_banned(current, event.action)?;
            ban(&mut next, event.justification.clone());
        }
        ActionType::Reactivate => {
            if !current.status.is_banned() {
                return Err(PolicyError::InvalidTransition {
                    action: event.action,
                    status: current.status,
                });
            }
            next = PenaltyState::fresh();
        }
        ActionType::ClearWarnings => next.warning_count = 0,
        ActionType::ClearNotifications => next.notification_count = 0,
        ActionType::ClearAll => {
            next.warning_count = 0;
            next.notification_count = 0;
        }
    }

    Ok(Escalation {
        previous: current.clone(),
        next,
        derived,
    })
}

fn reject_if_banned(current: &PenaltyState, action: ActionType) -> Result<(), PolicyError> {
    if current.status.is_banned() {
        return Err(PolicyError::InvalidTransition {
            action,
            status: current.status,
        });
    }
    Ok(())
}

fn register_warning(
    next: &mut PenaltyState,
    derived: &mut Vec<DerivedEvent>,
) -> Result<(), PolicyError> {
    next.warning_count = next
        .warning_count
        .checked_add(1)
        .ok_or(PolicyError::CounterOverflow("warning"))?;
    if next.warning_count >= WARNINGS_BEFORE_BAN && !next.status.is_banned() {
        debug!(warnings = next.warning_count, "warning threshold reached");
        derived.push(DerivedEvent {
            action: AutomaticAction::AutoBan,
            reason: AUTO_BAN_REASON.to_string(),
        });
        ban(next, AUTO_BAN_REASON.to_string());
    }
    Ok(())
}

fn ban(next: &mut PenaltyState, reason: String) {
    next.status = MemberStatus::Banned;
    next.ban_reason = Some(reason);
}

/// How close a member is to the next automatic action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub status: MemberStatus,
    pub warning_count: u32,
    pub notification_count: u32,
    /// Notifications still needed before the next automatic warning (1..=3).
    pub notifications_until_next_warning: u32,
    /// Warnings still needed before the automatic ban (0 once reached).
    pub warnings_until_ban: u32,
    /// Fraction of the way to the next automatic warning, in `[0, 1)`.
    pub notification_progress: f32,
    /// Fraction of the way to the automatic ban, in `[0, 1]`.
    pub warning_progress: f32,
}

pub fn standing(state: &PenaltyState) -> Standing {
    let toward_warning = state.notification_count % NOTIFICATIONS_PER_WARNING;
    let capped_warnings = state.warning_count.min(WARNINGS_BEFORE_BAN);
    Standing {
        status: state.status,
        warning_count: state.warning_count,
        notification_count: state.notification_count,
        notifications_until_next_warning: NOTIFICATIONS_PER_WARNING - toward_warning,
        warnings_until_ban: WARNINGS_BEFORE_BAN - capped_warnings,
        notification_progress: toward_warning as f32 / NOTIFICATIONS_PER_WARNING as f32,
        warning_progress: capped_warnings as f32 / WARNINGS_BEFORE_BAN as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state(status: MemberStatus, warnings: u32, notifications: u32) -> PenaltyState {
        PenaltyState {
            status,
            warning_count: warnings,
            notification_count: notifications,
            ban_reason: if status.is_banned() {
                Some("earlier ban".to_string())
            } else {
                None
            },
        }
    }

    fn event(action: ActionType) -> PenaltyEvent {
        PenaltyEvent::new(action, "missed three meetings")
    }

    #[test]
    fn third_notification_raises_one_warning() {
        let result = apply(
            &state(MemberStatus::Active, 0, 2),
            &event(ActionType::Notification),
        )
        .unwrap();
        assert_eq!(result.next.notification_count, 3);
        assert_eq!(result.next.warning_count, 1);
        assert_eq!(result.next.status, MemberStatus::Active);
        assert_eq!(
            result.derived,
            vec![DerivedEvent {
                action: AutomaticAction::AutoWarning,
                reason: AUTO_WARNING_REASON.to_string(),
            }]
        );
    }

    #[test]
    fn notification_counter_is_cumulative() {
        let after_fourth = apply(
            &state(MemberStatus::Active, 1, 3),
            &event(ActionType::Notification),
        )
        .unwrap();
        assert_eq!(after_fourth.next.notification_count, 4);
        assert!(after_fourth.derived.is_empty());

        let after_sixth = apply(
            &state(MemberStatus::Active, 1, 5),
            &event(ActionType::Notification),
        )
        .unwrap();
        assert_eq!(after_sixth.next.warning_count, 2);
        assert_eq!(after_sixth.derived.len(), 1);
    }

    #[test]
    fn third_warning_bans_with_synthetic_reason() {
        let result = apply(&state(MemberStatus::Active, 2, 0), &event(ActionType::Warning)).unwrap();
        assert_eq!(result.next.warning_count, 3);
        assert_eq!(result.next.status, MemberStatus::Banned);
        assert_eq!(result.next.ban_reason.as_deref(), Some(AUTO_BAN_REASON));
        assert_eq!(result.derived.len(), 1);
        assert_eq!(result.derived[0].action, AutomaticAction::AutoBan);
        assert!(result.entered_ban());
    }

    #[test]
    fn notification_can_cascade_all_the_way_to_ban() {
        let result = apply(
            &state(MemberStatus::Active, 2, 8),
            &event(ActionType::Notification),
        )
        .unwrap();
        let kinds = result.derived.iter().map(|d| d.action).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![AutomaticAction::AutoWarning, AutomaticAction::AutoBan]
        );
        assert_eq!(result.next.status, MemberStatus::Banned);
        assert_eq!(result.next.notification_count, 9);
    }

    #[test]
    fn manual_ban_keeps_counters_and_uses_justification() {
        let result = apply(&state(MemberStatus::Active, 1, 2), &event(ActionType::Ban)).unwrap();
        assert_eq!(result.next.status, MemberStatus::Banned);
        assert_eq!(
            result.next.ban_reason.as_deref(),
            Some("missed three meetings")
        );
        assert_eq!(result.next.warning_count, 1);
        assert_eq!(result.next.notification_count, 2);
        assert!(result.derived.is_empty());
    }

    #[test]
    fn banned_members_reject_new_penalties() {
        for action in [ActionType::Notification, ActionType::Warning, ActionType::Ban] {
            let result = apply(&state(MemberStatus::Banned, 3, 1), &event(action));
            assert_eq!(
                result,
                Err(PolicyError::InvalidTransition {
                    action,
                    status: MemberStatus::Banned,
                })
            );
        }
    }

    #[test]
    fn reactivate_requires_a_ban() {
        let result = apply(&state(MemberStatus::Active, 1, 1), &event(ActionType::Reactivate));
        assert!(matches!(
            result,
            Err(PolicyError::InvalidTransition {
                action: ActionType::Reactivate,
                status: MemberStatus::Active,
            })
        ));
    }

    #[test]
    fn reactivate_resets_everything() {
        let result = apply(&state(MemberStatus::Banned, 3, 7), &event(ActionType::Reactivate)).unwrap();
        assert_eq!(result.next, PenaltyState::fresh());
        assert!(result.left_ban());
    }

    #[test]
    fn clears_leave_status_alone() {
        let banned = state(MemberStatus::Banned, 3, 4);
        let cleared = apply(&banned, &event(ActionType::ClearWarnings)).unwrap();
        assert_eq!(cleared.next.warning_count, 0);
        assert_eq!(cleared.next.notification_count, 4);
        assert_eq!(cleared.next.status, MemberStatus::Banned);

        let cleared = apply(&banned, &event(ActionType::ClearNotifications)).unwrap();
        assert_eq!(cleared.next.warning_count, 3);
        assert_eq!(cleared.next.notification_count, 0);

        let cleared = apply(&banned, &event(ActionType::ClearAll)).unwrap();
        assert_eq!(cleared.next.warning_count, 0);
        assert_eq!(cleared.next.notification_count, 0);
        assert_eq!(cleared.next.ban_reason.as_deref(), Some("earlier ban"));
    }

    #[test]
    fn inactive_members_can_still_be_penalised() {
        let result = apply(&state(MemberStatus::Inactive, 2, 0), &event(ActionType::Warning)).unwrap();
        assert_eq!(result.next.status, MemberStatus::Banned);
    }

    #[test]
    fn overflow_is_reported() {
        let result = apply(
            &state(MemberStatus::Active, 0, u32::MAX),
            &event(ActionType::Notification),
        );
        assert_eq!(result, Err(PolicyError::CounterOverflow("notification")));
    }

    #[test]
    fn patches_stamp_ban_boundaries() {
        let now = Utc::now();
        let banned = apply(&state(MemberStatus::Active, 2, 0), &event(ActionType::Warning)).unwrap();
        let patches = banned.patches(now);
        assert!(patches.contains(&MemberPatch::BannedAt(Some(now))));
        assert!(patches.contains(&MemberPatch::Status(MemberStatus::Banned)));

        let reactivated =
            apply(&state(MemberStatus::Banned, 3, 0), &event(ActionType::Reactivate)).unwrap();
        let patches = reactivated.patches(now);
        assert!(patches.contains(&MemberPatch::BannedAt(None)));
        assert!(patches.contains(&MemberPatch::LastReactivatedAt(Some(now))));
        assert!(patches.contains(&MemberPatch::BanReason(None)));

        let plain = apply(&state(MemberStatus::Active, 0, 0), &event(ActionType::Notification)).unwrap();
        assert_eq!(plain.patches(now).len(), 4);
    }

    #[test]
    fn standing_reports_distance_to_thresholds() {
        let standing = standing(&state(MemberStatus::Active, 1, 4));
        assert_eq!(standing.notifications_until_next_warning, 2);
        assert_eq!(standing.warnings_until_ban, 2);
        assert!((standing.notification_progress - 1.0 / 3.0).abs() < f32::EPSILON);

        let fresh = super::standing(&PenaltyState::fresh());
        assert_eq!(fresh.notifications_until_next_warning, 3);
        assert_eq!(fresh.warning_progress, 0.0);

        let over = super::standing(&state(MemberStatus::Banned, 5, 0));
        assert_eq!(over.warnings_until_ban, 0);
        assert_eq!(over.warning_progress, 1.0);
    }

    fn action_strategy() -> impl Strategy<Value = ActionType> {
        prop::sample::select(ActionType::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn property_ban_holds_until_reactivation(actions in proptest::collection::vec(action_strategy(), 0..40)) {
            let mut current = PenaltyState::fresh();
            let mut ban_reached = false;
            for action in actions {
                match apply(&current, &PenaltyEvent::new(action, "property run")) {
                    Ok(result) => {
                        if result.next.warning_count >= WARNINGS_BEFORE_BAN
                            && matches!(action, ActionType::Warning | ActionType::Notification)
                        {
                            prop_assert_eq!(result.next.status, MemberStatus::Banned);
                        }
                        if result.next.status.is_banned() {
                            ban_reached = true;
                        }
                        if ban_reached && action != ActionType::Reactivate {
                            prop_assert_eq!(result.next.status, MemberStatus::Banned);
                        }
                        if action == ActionType::Reactivate {
                            ban_reached = false;
                        }
                        current = result.next;
                    }
                    Err(PolicyError::InvalidTransition { .. }) => {}
                    Err(other) => prop_assert!(false, "unexpected error {other}"),
                }
            }
        }

        #[test]
        fn property_auto_warning_exactly_on_multiples_of_three(
            notifications in 0u32..10_000,
            warnings in 0u32..2,
        ) {
            let current = state(MemberStatus::Active, warnings, notifications);
            let result = apply(&current, &event(ActionType::Notification)).unwrap();
            let raised = result
                .derived
                .iter()
                .filter(|d| d.action == AutomaticAction::AutoWarning)
                .count();
            let expected = usize::from((notifications + 1) % NOTIFICATIONS_PER_WARNING == 0);
            prop_assert_eq!(raised, expected);
            prop_assert_eq!(result.next.warning_count, warnings + expected as u32);
        }

        #[test]
        fn property_reactivation_always_resets(warnings in 0u32..100, notifications in 0u32..100) {
            let result = apply(
                &state(MemberStatus::Banned, warnings, notifications),
                &event(ActionType::Reactivate),
            ).unwrap();
            prop_assert_eq!(result.next.warning_count, 0);
            prop_assert_eq!(result.next.notification_count, 0);
            prop_assert!(result.next.ban_reason.is_none());
            prop_assert_eq!(result.next.status, MemberStatus::Active);
        }

        #[test]
        fn property_clear_all_is_idempotent(status in prop::sample::select(vec![
            MemberStatus::Active,
            MemberStatus::Inactive,
            MemberStatus::Banned,
        ])) {
            let current = state(status, 0, 0);
            let result = apply(&current, &event(ActionType::ClearAll)).unwrap();
            prop_assert_eq!(&result.next, &current);
            prop_assert!(result.derived.is_empty());
        }
    }
}
