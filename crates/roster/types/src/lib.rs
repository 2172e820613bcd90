//! Roster Types - the shared vocabulary of the penalty engine.
//!
//! Members, their penalty counters, the actions that mutate them and the
//! audit records those actions leave behind. Every crate in the workspace
//! speaks in these types; none of them carry behaviour beyond small helpers.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(pub String);
impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionLogEntryId(pub String);
impl ActionLogEntryId {
    pub fn generate() -> Self {
        Self(format!("action-{}", uuid::Uuid::new_v4()))
    }
}
impl std::fmt::Display for ActionLogEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optimistic concurrency token carried by every member read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordVersion(pub u64);
impl RecordVersion {
    pub const INITIAL: RecordVersion = RecordVersion(1);

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}
impl std::fmt::Display for RecordVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Access status of a member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberStatus {
    #[serde(rename = "Ativo")]
    Active,
    #[serde(rename = "Inativo")]
    Inactive,
    #[serde(rename = "Banido")]
    Banned,
}
impl MemberStatus {
    pub fn is_banned(&self) -> bool {
        matches!(self, MemberStatus::Banned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Active => "Ativo",
            MemberStatus::Inactive => "Inativo",
            MemberStatus::Banned => "Banido",
        }
    }
}
impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Organisational role. Serialized with the labels the member directory uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberRole {
    #[serde(rename = "Administrador")]
    Administrator,
    #[serde(rename = "Presidente")]
    President,
    #[serde(rename = "Diretor", alias = "Diretora")]
    Director,
    #[serde(rename = "Head")]
    Head,
    #[serde(rename = "Consultor")]
    Consultant,
    #[serde(rename = "Analista")]
    Analyst,
    #[serde(rename = "Trainee")]
    Trainee,
    #[serde(rename = "Colaborador")]
    Collaborator,
    #[serde(rename = "Membro")]
    Member,
}
impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Administrator => "Administrador",
            MemberRole::President => "Presidente",
            MemberRole::Director => "Diretor",
            MemberRole::Head => "Head",
            MemberRole::Consultant => "Consultor",
            MemberRole::Analyst => "Analista",
            MemberRole::Trainee => "Trainee",
            MemberRole::Collaborator => "Colaborador",
            MemberRole::Member => "Membro",
        }
    }
}
impl std::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
impl std::str::FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "administrador" | "administrator" | "admin" => Ok(MemberRole::Administrator),
            "presidente" | "president" => Ok(MemberRole::President),
            "diretor" | "diretora" | "director" => Ok(MemberRole::Director),
            "head" => Ok(MemberRole::Head),
            "consultor" | "consultant" => Ok(MemberRole::Consultant),
            "analista" | "analyst" => Ok(MemberRole::Analyst),
            "trainee" => Ok(MemberRole::Trainee),
            "colaborador" | "collaborator" => Ok(MemberRole::Collaborator),
            "membro" | "member" => Ok(MemberRole::Member),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

/// The slice of a member the escalation policy reads and writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyState {
    pub status: MemberStatus,
    pub warning_count: u32,
    pub notification_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ban_reason: Option<String>,
}
impl PenaltyState {
    /// State of a freshly registered member.
    pub fn fresh() -> Self {
        Self {
            status: MemberStatus::Active,
            warning_count: 0,
            notification_count: 0,
            ban_reason: None,
        }
    }
}
impl Default for PenaltyState {
    fn default() -> Self {
        Self::fresh()
    }
}

/// A tracked member of the organisation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: MemberId,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<MemberRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_power_user: bool,
    #[serde(flatten)]
    pub penalty: PenaltyState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reactivated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
impl Member {
    /// Build a member as registration creates it: active, no penalties.
    pub fn register(registration: MemberRegistration, now: DateTime<Utc>) -> Self {
        Self {
            member_id: registration.member_id.unwrap_or_else(MemberId::generate),
            name: registration.name,
            email: registration.email,
            role: registration.role,
            sector: registration.sector,
            is_admin: registration.is_admin,
            is_power_user: registration.is_power_user,
            penalty: PenaltyState::fresh(),
            banned_at: None,
            last_reactivated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a list of field updates in order.
    pub fn apply_patches(&mut self, patches: &[MemberPatch], now: DateTime<Utc>) {
        for patch in patches {
            match patch {
                MemberPatch::Status(status) => self.penalty.status = *status,
                MemberPatch::WarningCount(count) => self.penalty.warning_count = *count,
                MemberPatch::NotificationCount(count) => self.penalty.notification_count = *count,
                MemberPatch::BanReason(reason) => self.penalty.ban_reason = reason.clone(),
                MemberPatch::BannedAt(at) => self.banned_at = *at,
                MemberPatch::LastReactivatedAt(at) => self.last_reactivated_at = *at,
            }
        }
        self.updated_at = now;
    }
}

/// Input for creating a member record.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemberRegistration {
    /// Identity-provider uid. Generated when absent.
    #[serde(default)]
    pub member_id: Option<MemberId>,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<MemberRole>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_power_user: bool,
}

/// A single named field update on a member record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum MemberPatch {
    Status(MemberStatus),
    WarningCount(u32),
    NotificationCount(u32),
    BanReason(Option<String>),
    BannedAt(Option<DateTime<Utc>>),
    LastReactivatedAt(Option<DateTime<Utc>>),
}

/// Actions a caller can request against a member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Notification,
    Warning,
    Ban,
    Reactivate,
    ClearWarnings,
    ClearNotifications,
    ClearAll,
}
impl ActionType {
    pub const ALL: [ActionType; 7] = [
        ActionType::Notification,
        ActionType::Warning,
        ActionType::Ban,
        ActionType::Reactivate,
        ActionType::ClearWarnings,
        ActionType::ClearNotifications,
        ActionType::ClearAll,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Notification => "notification",
            ActionType::Warning => "warning",
            ActionType::Ban => "ban",
            ActionType::Reactivate => "reactivate",
            ActionType::ClearWarnings => "clearWarnings",
            ActionType::ClearNotifications => "clearNotifications",
            ActionType::ClearAll => "clearAll",
        }
    }

    /// Penalty-issuing actions: notification, warning, ban.
    pub fn is_penalty(&self) -> bool {
        matches!(
            self,
            ActionType::Notification | ActionType::Warning | ActionType::Ban
        )
    }

    pub fn is_clear(&self) -> bool {
        matches!(
            self,
            ActionType::ClearWarnings | ActionType::ClearNotifications | ActionType::ClearAll
        )
    }

    /// Whether a human-entered justification is mandatory.
    pub fn requires_justification(&self) -> bool {
        !self.is_clear()
    }
}
impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .iter()
            .copied()
            .find(|action| action.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown action `{s}`"))
    }
}

/// System-generated follow-up actions raised by the escalation thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AutomaticAction {
    AutoWarning,
    AutoBan,
}
impl AutomaticAction {
    /// The action type recorded in the audit log for this automatic action.
    pub fn logged_as(&self) -> LoggedAction {
        match self {
            AutomaticAction::AutoWarning => LoggedAction::Warning,
            AutomaticAction::AutoBan => LoggedAction::Ban,
        }
    }
}
impl std::fmt::Display for AutomaticAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AutomaticAction::AutoWarning => f.write_str("autoWarning"),
            AutomaticAction::AutoBan => f.write_str("autoBan"),
        }
    }
}

/// Action kinds as they appear in the audit log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoggedAction {
    Notification,
    Warning,
    Ban,
    Reactivate,
    ClearWarnings,
    ClearNotifications,
    ClearAll,
    Delete,
}
impl From<ActionType> for LoggedAction {
    fn from(value: ActionType) -> Self {
        match value {
            ActionType::Notification => LoggedAction::Notification,
            ActionType::Warning => LoggedAction::Warning,
            ActionType::Ban => LoggedAction::Ban,
            ActionType::Reactivate => LoggedAction::Reactivate,
            ActionType::ClearWarnings => LoggedAction::ClearWarnings,
            ActionType::ClearNotifications => LoggedAction::ClearNotifications,
            ActionType::ClearAll => LoggedAction::ClearAll,
        }
    }
}
impl std::fmt::Display for LoggedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoggedAction::Delete => f.write_str("delete"),
            LoggedAction::Notification => f.write_str("notification"),
            LoggedAction::Warning => f.write_str("warning"),
            LoggedAction::Ban => f.write_str("ban"),
            LoggedAction::Reactivate => f.write_str("reactivate"),
            LoggedAction::ClearWarnings => f.write_str("clearWarnings"),
            LoggedAction::ClearNotifications => f.write_str("clearNotifications"),
            LoggedAction::ClearAll => f.write_str("clearAll"),
        }
    }
}

/// The already-authenticated caller of an operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub member_id: MemberId,
    #[serde(default)]
    pub role: Option<MemberRole>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_power_user: bool,
}
impl Principal {
    pub fn new(member_id: MemberId) -> Self {
        Self {
            member_id,
            role: None,
            is_admin: false,
            is_power_user: false,
        }
    }

    pub fn admin(member_id: MemberId) -> Self {
        Self {
            is_admin: true,
            ..Self::new(member_id)
        }
    }

    pub fn power_user(member_id: MemberId) -> Self {
        Self {
            is_power_user: true,
            ..Self::new(member_id)
        }
    }

    pub fn with_role(mut self, role: MemberRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Derive the principal from the caller's own member record.
    pub fn from_member(member: &Member) -> Self {
        Self {
            member_id: member.member_id.clone(),
            role: member.role,
            is_admin: member.is_admin,
            is_power_user: member.is_power_user,
        }
    }

    pub fn is_president(&self) -> bool {
        self.role == Some(MemberRole::President)
    }
}

/// Immutable audit record of one discrete action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub entry_id: ActionLogEntryId,
    pub sequence: u64,
    pub target_member_id: MemberId,
    pub action_type: LoggedAction,
    pub justification: String,
    pub is_automatic: bool,
    pub acting_principal_id: MemberId,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    pub hash: String,
}

/// Severity shown next to a member notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticePriority {
    #[serde(rename = "Baixa")]
    Low,
    #[serde(rename = "Média")]
    Medium,
    #[serde(rename = "Alta")]
    High,
}

/// An inbox entry delivered to a member when they are notified.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberNotice {
    pub notice_id: String,
    pub member_id: MemberId,
    pub title: String,
    pub message: String,
    pub priority: NoticePriority,
    pub is_new: bool,
    pub created_at: DateTime<Utc>,
}

/// Snapshot kept when a member record is deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchivedMember {
    pub member: Member,
    pub archived_by: MemberId,
    pub reason: String,
    pub archived_at: DateTime<Utc>,
}
