/// Role levels
use crate::access::hierarchy::HierarchyLevel;
use crate::error::{AccessError, AccessResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role levels, lowest privilege first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleLevel {
    /// Manages no one
    Member,
    ParishAdmin,
    DeaneryAdmin,
    ArchdeaconryAdmin,
    DioceseAdmin,
    /// Global scope, but cannot grant the two top tiers
    NationalAdmin,
    /// Global scope, the only role that may grant national_admin or super_admin
    SuperAdmin,
}

impl RoleLevel {
    pub const ALL: [RoleLevel; 7] = [
        RoleLevel::Member,
        RoleLevel::ParishAdmin,
        RoleLevel::DeaneryAdmin,
        RoleLevel::ArchdeaconryAdmin,
        RoleLevel::DioceseAdmin,
        RoleLevel::NationalAdmin,
        RoleLevel::SuperAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleLevel::Member => "member",
            RoleLevel::ParishAdmin => "parish_admin",
            RoleLevel::DeaneryAdmin => "deanery_admin",
            RoleLevel::ArchdeaconryAdmin => "archdeaconry_admin",
            RoleLevel::DioceseAdmin => "diocese_admin",
            RoleLevel::NationalAdmin => "national_admin",
            RoleLevel::SuperAdmin => "super_admin",
        }
    }

    pub fn from_str(s: &str) -> AccessResult<Self> {
        let normalized = s.trim().to_lowercase();
        RoleLevel::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| AccessError::Validation(format!("invalid role: {}", s)))
    }

    /// Hierarchy level this role is anchored at, if any
    pub fn anchor_level(&self) -> Option<HierarchyLevel> {
        match self {
            RoleLevel::ParishAdmin => Some(HierarchyLevel::Parish),
            RoleLevel::DeaneryAdmin => Some(HierarchyLevel::Deanery),
            RoleLevel::ArchdeaconryAdmin => Some(HierarchyLevel::Archdeaconry),
            RoleLevel::DioceseAdmin => Some(HierarchyLevel::Diocese),
            RoleLevel::Member | RoleLevel::NationalAdmin | RoleLevel::SuperAdmin => None,
        }
    }

    /// Roles whose scope spans the whole organization
    pub fn is_global(&self) -> bool {
        matches!(self, RoleLevel::SuperAdmin | RoleLevel::NationalAdmin)
    }

    /// The two tiers only a super_admin may grant
    pub fn is_top_tier(&self) -> bool {
        matches!(self, RoleLevel::SuperAdmin | RoleLevel::NationalAdmin)
    }

    pub fn outranks(&self, other: RoleLevel) -> bool {
        *self > other
    }
}

impl fmt::Display for RoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
