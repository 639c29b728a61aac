/// Actors and the user records they act upon
use crate::access::hierarchy::{HierarchyLevel, NodeRef};
use crate::access::role::RoleLevel;
use crate::error::{AccessError, AccessResult};
use serde::{Deserialize, Serialize};

/// Account status values stored on the user row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    /// Awaiting activation approval
    Pending,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Pending => "pending",
        }
    }

    pub fn from_str(s: &str) -> AccessResult<Self> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "suspended" => Ok(AccountStatus::Suspended),
            "pending" => Ok(AccountStatus::Pending),
            _ => Err(AccessError::Validation(format!("invalid account status: {}", s))),
        }
    }
}

/// A user row as seen by the access core.
///
/// The hierarchy ids are denormalized: every user carries the full path
/// down to the deepest level they belong to, regardless of their own role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub role_level: RoleLevel,
    pub province_id: Option<i64>,
    pub diocese_id: Option<i64>,
    pub archdeaconry_id: Option<i64>,
    pub deanery_id: Option<i64>,
    pub parish_id: Option<i64>,
    pub account_status: AccountStatus,
    pub force_logout: bool,
}

impl UserRecord {
    /// The user's node id at the given level
    pub fn hierarchy_id(&self, level: HierarchyLevel) -> Option<i64> {
        match level {
            HierarchyLevel::Province => self.province_id,
            HierarchyLevel::Diocese => self.diocese_id,
            HierarchyLevel::Archdeaconry => self.archdeaconry_id,
            HierarchyLevel::Deanery => self.deanery_id,
            HierarchyLevel::Parish => self.parish_id,
        }
    }
}

/// The signed-in principal for one request.
///
/// Built once from the authenticated session and passed explicitly to every
/// access-core call. Holds at most one anchor, the node matching its role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: i64,
    pub role_level: RoleLevel,
    pub anchor_id: Option<i64>,
    /// Originating address, recorded on audit entries
    pub ip: Option<String>,
}

impl Actor {
    /// Build an actor; the anchor is discarded for roles that have no anchor level
    pub fn new(user_id: i64, role_level: RoleLevel, anchor_id: Option<i64>) -> Self {
        let anchor_id = role_level.anchor_level().and(anchor_id);
        Self {
            user_id,
            role_level,
            anchor_id,
            ip: None,
        }
    }

    /// Derive the actor from the user's own row
    pub fn from_user(user: &UserRecord) -> Self {
        let anchor_id = user
            .role_level
            .anchor_level()
            .and_then(|level| user.hierarchy_id(level));
        Self::new(user.id, user.role_level, anchor_id)
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.ip = ip;
        self
    }

    /// The node defining this actor's jurisdiction, if the role is anchored and the anchor is set
    pub fn anchor(&self) -> Option<NodeRef> {
        let level = self.role_level.anchor_level()?;
        let id = self.anchor_id?;
        Some(NodeRef { level, id })
    }

    pub fn is_super_admin(&self) -> bool {
        self.role_level == RoleLevel::SuperAdmin
    }
}
