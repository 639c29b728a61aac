/// Role assignment and bulk account actions
///
/// Callers must have verified the request's CSRF token before calling
/// any mutating method here.
use crate::access::actor::{AccountStatus, Actor, UserRecord};
use crate::access::audit::{self, actions, AuditLog, NewAuditEntry};
use crate::access::permission::{Decision, DenyReason, Operation, PermissionEvaluator};
use crate::access::role::RoleLevel;
use crate::db::users::{self, UserStore};
use crate::error::{AccessError, AccessResult};
use crate::metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

/// A committed role transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub actor_id: i64,
    pub target_id: i64,
    pub previous_role: RoleLevel,
    pub new_role: RoleLevel,
    pub timestamp: DateTime<Utc>,
}

/// Action applied to every id of a bulk request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "role", rename_all = "snake_case")]
pub enum BulkAction {
    Activate,
    Suspend,
    Delete,
    /// Raw role string; validated once per item so an invalid role fails each item
    AssignRole(String),
}

impl BulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkAction::Activate => "activate",
            BulkAction::Suspend => "suspend",
            BulkAction::Delete => "delete",
            BulkAction::AssignRole(_) => "assign_role",
        }
    }
}

/// Outcome for one id of a bulk request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub user_id: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub processed_count: usize,
    pub failed_count: usize,
    pub items: Vec<BulkItemResult>,
}

/// Old and new values of a committed item
type Change = (String, String);

#[derive(Clone)]
pub struct RoleAssignmentService {
    db: SqlitePool,
    users: UserStore,
    audit: AuditLog,
    bulk_max_targets: usize,
}

impl RoleAssignmentService {
    pub fn new(db: SqlitePool, bulk_max_targets: usize) -> Self {
        Self {
            users: UserStore::new(db.clone()),
            audit: AuditLog::new(db.clone()),
            db,
            bulk_max_targets,
        }
    }

    /// Change one user's role.
    ///
    /// An unknown role or target returns before anything is written. A
    /// denial writes a `ROLE_CHANGE_DENIED` entry before returning. A
    /// granted change commits the new role, the force-logout flag and the
    /// audit entry in one transaction. Re-assigning the current role is
    /// still committed and logged. An allowed grant of an anchored role to a
    /// user without the matching hierarchy id fails with `Validation`.
    pub async fn assign_role(
        &self,
        actor: &Actor,
        target_id: i64,
        requested: &str,
    ) -> AccessResult<RoleAssignment> {
        let requested = RoleLevel::from_str(requested)?;
        let target = self.users.get_user(target_id).await?;

        let decision = PermissionEvaluator::evaluate(actor, Operation::AssignRole(requested), &target);
        if let Decision::Deny(reason) = decision {
            warn!(
                actor = actor.user_id,
                target = target.id,
                requested = %requested,
                %reason,
                "role change denied"
            );
            self.record_denial(actor, actions::ROLE_CHANGE, &target, requested.as_str())
                .await?;
            metrics::ROLE_CHANGES_TOTAL.with_label_values(&["denied"]).inc();
            return Err(AccessError::PermissionDenied(reason));
        }

        // Anchor path is checked only after an Allow
        if let Some(level) = requested.anchor_level() {
            if target.hierarchy_id(level).is_none() {
                return Err(AccessError::Validation(format!(
                    "user {} has no {} to anchor a {}",
                    target.id, level, requested
                )));
            }
        }

        let previous = target.role_level;
        let mut tx = self.db.begin().await?;
        users::update_role(&mut tx, target.id, previous, requested).await?;
        audit::append(
            &mut *tx,
            &NewAuditEntry {
                actor_id: actor.user_id,
                action: actions::ROLE_CHANGE.to_string(),
                target_id: Some(target.id),
                old_value: Some(previous.as_str().to_string()),
                new_value: Some(requested.as_str().to_string()),
                ip: actor.ip.clone(),
            },
        )
        .await?;
        tx.commit().await?;
        metrics::record_audit_entry(actions::ROLE_CHANGE);

        info!(
            actor = actor.user_id,
            target = target.id,
            from = %previous,
            to = %requested,
            "role changed"
        );
        metrics::ROLE_CHANGES_TOTAL.with_label_values(&["committed"]).inc();

        Ok(RoleAssignment {
            actor_id: actor.user_id,
            target_id: target.id,
            previous_role: previous,
            new_role: requested,
            timestamp: Utc::now(),
        })
    }

    /// Apply one action to many users.
    ///
    /// Every id is checked and committed on its own; a failure on one id
    /// never stops the rest. Only an oversized batch is rejected as a whole.
    pub async fn bulk_assign(
        &self,
        actor: &Actor,
        target_ids: &[i64],
        action: BulkAction,
    ) -> AccessResult<BulkOutcome> {
        if target_ids.len() > self.bulk_max_targets {
            return Err(AccessError::Validation(format!(
                "bulk request of {} users exceeds the limit of {}",
                target_ids.len(),
                self.bulk_max_targets
            )));
        }

        let mut items = Vec::with_capacity(target_ids.len());

        for &target_id in target_ids {
            let item = match self.apply_one(actor, target_id, &action).await {
                Ok((old_value, new_value)) => BulkItemResult {
                    user_id: target_id,
                    success: true,
                    reason: None,
                    old_value: Some(old_value),
                    new_value: Some(new_value),
                },
                Err(e) => {
                    if matches!(e, AccessError::Store(_)) {
                        error!(
                            actor = actor.user_id,
                            target = target_id,
                            action = action.as_str(),
                            "bulk item failed: {}",
                            e
                        );
                    }
                    BulkItemResult {
                        user_id: target_id,
                        success: false,
                        reason: Some(e.reason()),
                        old_value: None,
                        new_value: None,
                    }
                }
            };

            let result = if item.success { "success" } else { "failure" };
            metrics::BULK_ITEMS_TOTAL
                .with_label_values(&[action.as_str(), result])
                .inc();
            items.push(item);
        }

        let processed_count = items.iter().filter(|i| i.success).count();
        let failed_count = items.len() - processed_count;

        let summary = NewAuditEntry {
            actor_id: actor.user_id,
            action: format!("{}{}", actions::BULK_PREFIX, action.as_str().to_uppercase()),
            target_id: None,
            old_value: None,
            new_value: Some(
                serde_json::json!({
                    "requested": target_ids.len(),
                    "processed": processed_count,
                    "failed": failed_count,
                })
                .to_string(),
            ),
            ip: actor.ip.clone(),
        };
        if let Err(e) = self.audit.record(&summary).await {
            error!(actor = actor.user_id, "failed to record bulk summary: {}", e);
        }

        info!(
            actor = actor.user_id,
            action = action.as_str(),
            processed_count,
            failed_count,
            "bulk action finished"
        );

        Ok(BulkOutcome {
            processed_count,
            failed_count,
            items,
        })
    }

    /// Validate impersonation of a user and return the actor to act as
    pub async fn impersonate(&self, actor: &Actor, target_id: i64) -> AccessResult<Actor> {
        let target = self.users.get_user(target_id).await?;

        let decision = PermissionEvaluator::evaluate(actor, Operation::Impersonate, &target);
        if let Decision::Deny(reason) = decision {
            warn!(actor = actor.user_id, target = target.id, %reason, "impersonation denied");
            self.record_denial(actor, actions::IMPERSONATE, &target, target.role_level.as_str())
                .await?;
            return Err(AccessError::PermissionDenied(reason));
        }

        self.audit
            .record(&NewAuditEntry {
                actor_id: actor.user_id,
                action: actions::IMPERSONATE.to_string(),
                target_id: Some(target.id),
                old_value: Some(actor.user_id.to_string()),
                new_value: Some(target.id.to_string()),
                ip: actor.ip.clone(),
            })
            .await?;

        info!(actor = actor.user_id, target = target.id, "impersonation started");

        Ok(Actor::from_user(&target).with_ip(actor.ip.clone()))
    }

    async fn apply_one(
        &self,
        actor: &Actor,
        target_id: i64,
        action: &BulkAction,
    ) -> AccessResult<Change> {
        match action {
            BulkAction::AssignRole(role) => {
                let assignment = self.assign_role(actor, target_id, role).await?;
                Ok((
                    assignment.previous_role.as_str().to_string(),
                    assignment.new_role.as_str().to_string(),
                ))
            }
            BulkAction::Activate => {
                self.change_status(actor, target_id, AccountStatus::Active, actions::ACCOUNT_ACTIVATE)
                    .await
            }
            BulkAction::Suspend => {
                self.change_status(actor, target_id, AccountStatus::Suspended, actions::ACCOUNT_SUSPEND)
                    .await
            }
            BulkAction::Delete => self.delete(actor, target_id).await,
        }
    }

    async fn change_status(
        &self,
        actor: &Actor,
        target_id: i64,
        status: AccountStatus,
        action: &str,
    ) -> AccessResult<Change> {
        let target = self.users.get_user(target_id).await?;
        self.authorize_account_action(actor, Operation::Edit, &target, action, status.as_str())
            .await?;

        let old_value = target.account_status.as_str().to_string();
        let new_value = status.as_str().to_string();

        let mut tx = self.db.begin().await?;
        users::update_status(&mut tx, target.id, status, status == AccountStatus::Suspended)
            .await?;
        audit::append(
            &mut *tx,
            &NewAuditEntry {
                actor_id: actor.user_id,
                action: action.to_string(),
                target_id: Some(target.id),
                old_value: Some(old_value.clone()),
                new_value: Some(new_value.clone()),
                ip: actor.ip.clone(),
            },
        )
        .await?;
        tx.commit().await?;
        metrics::record_audit_entry(action);

        Ok((old_value, new_value))
    }

    async fn delete(&self, actor: &Actor, target_id: i64) -> AccessResult<Change> {
        let target = self.users.get_user(target_id).await?;
        self.authorize_account_action(
            actor,
            Operation::Delete,
            &target,
            actions::ACCOUNT_DELETE,
            "deleted",
        )
        .await?;

        let old_value = target.account_status.as_str().to_string();

        let mut tx = self.db.begin().await?;
        users::delete_user(&mut tx, target.id).await?;
        audit::append(
            &mut *tx,
            &NewAuditEntry {
                actor_id: actor.user_id,
                action: actions::ACCOUNT_DELETE.to_string(),
                target_id: Some(target.id),
                old_value: Some(old_value.clone()),
                new_value: Some("deleted".to_string()),
                ip: actor.ip.clone(),
            },
        )
        .await?;
        tx.commit().await?;
        metrics::record_audit_entry(actions::ACCOUNT_DELETE);

        Ok((old_value, "deleted".to_string()))
    }

    /// Gate an account action; acting on oneself is refused for every bulk action
    async fn authorize_account_action(
        &self,
        actor: &Actor,
        operation: Operation,
        target: &UserRecord,
        action: &str,
        requested: &str,
    ) -> AccessResult<()> {
        let decision = if actor.user_id == target.id {
            Decision::Deny(DenyReason::SelfModification)
        } else {
            PermissionEvaluator::evaluate(actor, operation, target)
        };

        if let Decision::Deny(reason) = decision {
            warn!(actor = actor.user_id, target = target.id, action, %reason, "account action denied");
            self.record_denial(actor, action, target, requested).await?;
            return Err(AccessError::PermissionDenied(reason));
        }

        Ok(())
    }

    async fn record_denial(
        &self,
        actor: &Actor,
        action: &str,
        target: &UserRecord,
        requested: &str,
    ) -> AccessResult<()> {
        let old_value = match action {
            actions::ROLE_CHANGE | actions::IMPERSONATE => target.role_level.as_str(),
            _ => target.account_status.as_str(),
        };

        self.audit
            .record(&NewAuditEntry {
                actor_id: actor.user_id,
                action: actions::denied(action),
                target_id: Some(target.id),
                old_value: Some(old_value.to_string()),
                new_value: Some(requested.to_string()),
                ip: actor.ip.clone(),
            })
            .await?;

        Ok(())
    }
}
