use core::str::FromStr;

use serde::{Deserialize, Serialize};

use atelier_core::DomainError;

/// Role a member holds inside one organization.
///
/// No hierarchy beyond "manager-equivalent or not".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipRole {
    Manager,
    Worker,
}

impl MembershipRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipRole::Manager => "MANAGER",
            MembershipRole::Worker => "WORKER",
        }
    }

    /// Manager-equivalent roles are allowed everything inside their organization.
    pub fn is_manager(&self) -> bool {
        matches!(self, MembershipRole::Manager)
    }
}

impl core::fmt::Display for MembershipRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MANAGER" => Ok(MembershipRole::Manager),
            "WORKER" => Ok(MembershipRole::Worker),
            other => Err(DomainError::validation(format!("unknown membership role '{other}'"))),
        }
    }
}
