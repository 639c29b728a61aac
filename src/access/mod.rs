/// Hierarchical access control
///
/// Scope resolution, permission evaluation and role assignment over the
/// province / diocese / archdeaconry / deanery / parish tree.

pub mod actor;
pub mod assignment;
pub mod audit;
pub mod hierarchy;
pub mod permission;
pub mod role;
pub mod scope;

pub use actor::{AccountStatus, Actor, UserRecord};
pub use assignment::{BulkAction, BulkItemResult, BulkOutcome, RoleAssignment, RoleAssignmentService};
pub use audit::{AuditEntry, AuditLog, NewAuditEntry};
pub use hierarchy::{HierarchyCatalog, HierarchyLevel, HierarchyNode, NodeRef};
pub use permission::{Decision, DenyReason, Operation, PermissionEvaluator};
pub use role::RoleLevel;
pub use scope::{ScopeResolver, ScopeSet, UserScope};
