use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{AuditEntryId, OrganizationId, UserId};

/// Sensitive state transitions worth a trail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "invitation.create")]
    InvitationCreate,
    #[serde(rename = "invitation.resend")]
    InvitationResend,
    #[serde(rename = "invitation.accept")]
    InvitationAccept,
    #[serde(rename = "membership.update")]
    MembershipUpdate,
    #[serde(rename = "membership.remove")]
    MembershipRemove,
    #[serde(rename = "owner.approve")]
    OwnerApprove,
    #[serde(rename = "owner.reject")]
    OwnerReject,
    #[serde(rename = "organization.create")]
    OrganizationCreate,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::InvitationCreate => "invitation.create",
            AuditAction::InvitationResend => "invitation.resend",
            AuditAction::InvitationAccept => "invitation.accept",
            AuditAction::MembershipUpdate => "membership.update",
            AuditAction::MembershipRemove => "membership.remove",
            AuditAction::OwnerApprove => "owner.approve",
            AuditAction::OwnerReject => "owner.reject",
            AuditAction::OrganizationCreate => "organization.create",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invitation.create" => Ok(AuditAction::InvitationCreate),
            "invitation.resend" => Ok(AuditAction::InvitationResend),
            "invitation.accept" => Ok(AuditAction::InvitationAccept),
            "membership.update" => Ok(AuditAction::MembershipUpdate),
            "membership.remove" => Ok(AuditAction::MembershipRemove),
            "owner.approve" => Ok(AuditAction::OwnerApprove),
            "owner.reject" => Ok(AuditAction::OwnerReject),
            "organization.create" => Ok(AuditAction::OrganizationCreate),
            _ => Err(format!("unknown audit action: {s}")),
        }
    }
}

/// Append-only audit record. Never updated or deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub actor_id: UserId,
    pub action: AuditAction,
    /// e.g. `"invitation"`, `"membership"`, `"organization"`.
    pub resource_type: String,
    pub resource_id: Option<String>,
    /// Organization the action happened in, when there is one.
    pub organization_id: Option<OrganizationId>,
    /// Free-form payload (old/new values, token fingerprints). Never raw secrets.
    pub details: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn builder(actor_id: UserId, action: AuditAction) -> AuditEntryBuilder {
        AuditEntryBuilder::new(actor_id, action)
    }
}

pub struct AuditEntryBuilder {
    actor_id: UserId,
    action: AuditAction,
    resource_type: String,
    resource_id: Option<String>,
    organization_id: Option<OrganizationId>,
    details: serde_json::Value,
}

impl AuditEntryBuilder {
    pub fn new(actor_id: UserId, action: AuditAction) -> Self {
        Self {
            actor_id,
            action,
            resource_type: String::new(),
            resource_id: None,
            organization_id: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: impl ToString) -> Self {
        self.resource_type = resource_type.into();
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self
    }

    pub fn organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn build(self, recorded_at: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            id: AuditEntryId::new(),
            actor_id: self.actor_id,
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            organization_id: self.organization_id,
            details: self.details,
            recorded_at,
        }
    }
}

/// Filter for reading the trail. Results are newest first.
#[derive(Clone, Debug, Default)]
pub struct AuditFilter {
    pub organization_id: Option<OrganizationId>,
    pub actor_id: Option<UserId>,
    pub action: Option<AuditAction>,
    pub limit: Option<u32>,
}

impl AuditFilter {
    pub const DEFAULT_LIMIT: u32 = 100;
    pub const MAX_LIMIT: u32 = 500;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn actor(mut self, actor_id: UserId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Requested limit, clamped to `1..=MAX_LIMIT`.
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.organization_id
            .is_none_or(|org| entry.organization_id == Some(org))
            && self.actor_id.is_none_or(|actor| entry.actor_id == actor)
            && self.action.is_none_or(|action| entry.action == action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_strings_parse_back() {
        for action in [
            AuditAction::InvitationCreate,
            AuditAction::InvitationResend,
            AuditAction::InvitationAccept,
            AuditAction::MembershipUpdate,
            AuditAction::MembershipRemove,
            AuditAction::OwnerApprove,
            AuditAction::OwnerReject,
            AuditAction::OrganizationCreate,
        ] {
            assert_eq!(action.to_string().parse::<AuditAction>(), Ok(action));
            assert_eq!(
                serde_json::to_value(action).unwrap(),
                serde_json::Value::String(action.to_string())
            );
        }
        assert!("invitation.delete".parse::<AuditAction>().is_err());
    }

    #[test]
    fn builder_fills_every_field() {
        let actor = UserId::new();
        let org = OrganizationId::new();
        let now = Utc::now();
        let entry = AuditEntry::builder(actor, AuditAction::InvitationResend)
            .resource("invitation", "inv-1")
            .organization(org)
            .details(serde_json::json!({"old_token": "abc", "new_token": "def"}))
            .build(now);

        assert_eq!(entry.actor_id, actor);
        assert_eq!(entry.resource_type, "invitation");
        assert_eq!(entry.resource_id.as_deref(), Some("inv-1"));
        assert_eq!(entry.organization_id, Some(org));
        assert_eq!(entry.details["new_token"], "def");
        assert_eq!(entry.recorded_at, now);
    }

    #[test]
    fn filter_matches_on_every_set_field() {
        let actor = UserId::new();
        let org = OrganizationId::new();
        let entry = AuditEntry::builder(actor, AuditAction::MembershipRemove)
            .resource_type("membership")
            .organization(org)
            .build(Utc::now());

        assert!(AuditFilter::new().matches(&entry));
        assert!(AuditFilter::new().organization(org).actor(actor).matches(&entry));
        assert!(!AuditFilter::new().organization(OrganizationId::new()).matches(&entry));
        assert!(!AuditFilter::new().action(AuditAction::OwnerApprove).matches(&entry));
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(AuditFilter::new().effective_limit(), AuditFilter::DEFAULT_LIMIT);
        assert_eq!(AuditFilter::new().limit(0).effective_limit(), 1);
        assert_eq!(AuditFilter::new().limit(10_000).effective_limit(), AuditFilter::MAX_LIMIT);
    }
}
