/// Permission evaluation
///
/// Every operation on another user's record goes through [`PermissionEvaluator::evaluate`].
/// Rules run in a fixed order and the first one that matches decides:
///
/// 1. self-action on role assignment, deletion or impersonation
/// 2. super_admin targets are immutable (strict: no exception for other super_admins or self)
/// 3. only a super_admin grants national_admin or super_admin
/// 4. no escalation past the actor's own role, on the grant or on the target's current role
/// 5. the target must be inside the actor's scope
use crate::access::actor::{Actor, UserRecord};
use crate::access::role::RoleLevel;
use crate::access::scope::ScopeResolver;
use crate::db::users::UserStore;
use crate::error::{AccessError, AccessResult};
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operations gated by the evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    View,
    Edit,
    Delete,
    AssignRole(RoleLevel),
    Impersonate,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::View => "view",
            Operation::Edit => "edit",
            Operation::Delete => "delete",
            Operation::AssignRole(_) => "assign_role",
            Operation::Impersonate => "impersonate",
        }
    }

    fn is_mutating(&self) -> bool {
        !matches!(self, Operation::View)
    }
}

/// Why an operation was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    SelfModification,
    ProtectedSuperAdmin,
    TopTierGrant,
    Escalation,
    OutOfScope,
    ImpersonationNotPermitted,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::SelfModification => "self-modification",
            DenyReason::ProtectedSuperAdmin => "target is a super_admin",
            DenyReason::TopTierGrant => "only a super_admin may grant this role",
            DenyReason::Escalation => "role above actor's own",
            DenyReason::OutOfScope => "out of scope",
            DenyReason::ImpersonationNotPermitted => "impersonation not permitted",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> AccessResult<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(AccessError::PermissionDenied(reason)),
        }
    }
}

#[derive(Clone)]
pub struct PermissionEvaluator {
    users: UserStore,
}

impl PermissionEvaluator {
    pub fn new(users: UserStore) -> Self {
        Self { users }
    }

    /// Decide one operation against an already-loaded target
    pub fn evaluate(actor: &Actor, operation: Operation, target: &UserRecord) -> Decision {
        let decision = Self::decide(actor, operation, target);
        metrics::record_decision(operation.as_str(), &decision);
        decision
    }

    fn decide(actor: &Actor, operation: Operation, target: &UserRecord) -> Decision {
        let is_self = actor.user_id == target.id;

        // Everyone may read their own record, members included; listing
        // still goes through the (possibly empty) scope.
        if operation == Operation::View && is_self {
            return Decision::Allow;
        }

        // Rule 1
        if is_self
            && matches!(
                operation,
                Operation::AssignRole(_) | Operation::Delete | Operation::Impersonate
            )
        {
            return Decision::Deny(DenyReason::SelfModification);
        }

        // Rule 2
        if target.role_level == RoleLevel::SuperAdmin {
            return Decision::Deny(DenyReason::ProtectedSuperAdmin);
        }

        if operation == Operation::Impersonate {
            return if actor.is_super_admin() {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::ImpersonationNotPermitted)
            };
        }

        if !actor.is_super_admin() {
            // Rule 3
            if let Operation::AssignRole(requested) = operation {
                if requested.is_top_tier() {
                    return Decision::Deny(DenyReason::TopTierGrant);
                }
                if requested.outranks(actor.role_level) {
                    return Decision::Deny(DenyReason::Escalation);
                }
            }

            // Rule 4
            if operation.is_mutating() && target.role_level.outranks(actor.role_level) {
                return Decision::Deny(DenyReason::Escalation);
            }
        }

        // Rule 5
        if !ScopeResolver::user_scope(actor).contains(target) {
            return Decision::Deny(DenyReason::OutOfScope);
        }

        Decision::Allow
    }

    /// Load a target and decide
    pub async fn check(
        &self,
        actor: &Actor,
        operation: Operation,
        target_id: i64,
    ) -> AccessResult<(UserRecord, Decision)> {
        let target = self.users.get_user(target_id).await?;
        let decision = Self::evaluate(actor, operation, &target);
        Ok((target, decision))
    }

    pub async fn can_view(&self, actor: &Actor, target_id: i64) -> AccessResult<bool> {
        let (_, decision) = self.check(actor, Operation::View, target_id).await?;
        Ok(decision.is_allowed())
    }

    pub async fn can_edit(&self, actor: &Actor, target_id: i64) -> AccessResult<bool> {
        let (_, decision) = self.check(actor, Operation::Edit, target_id).await?;
        Ok(decision.is_allowed())
    }

    pub async fn can_delete(&self, actor: &Actor, target_id: i64) -> AccessResult<bool> {
        let (_, decision) = self.check(actor, Operation::Delete, target_id).await?;
        Ok(decision.is_allowed())
    }

    pub async fn can_assign_role(
        &self,
        actor: &Actor,
        target_id: i64,
        requested: RoleLevel,
    ) -> AccessResult<bool> {
        let (_, decision) = self
            .check(actor, Operation::AssignRole(requested), target_id)
            .await?;
        Ok(decision.is_allowed())
    }

    pub async fn can_impersonate(&self, actor: &Actor, target_id: i64) -> AccessResult<bool> {
        let (_, decision) = self.check(actor, Operation::Impersonate, target_id).await?;
        Ok(decision.is_allowed())
    }
}
