/// Scope resolution
///
/// An anchored admin's jurisdiction is every user whose denormalized id at the
/// admin's level equals the admin's anchor. Because each user row carries the
/// full hierarchy path, a single equality check covers users placed anywhere
/// below the anchor; no recursive descent is needed.
use crate::access::actor::{Actor, UserRecord};
use crate::access::hierarchy::{HierarchyCatalog, HierarchyLevel};
use crate::db::users::UserStore;
use crate::error::AccessResult;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Filter describing which users an actor may list or manage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserScope {
    /// Every user; never materialized
    All,
    /// Users whose id at `level` equals `anchor`
    Field { level: HierarchyLevel, anchor: i64 },
    /// No one
    Nothing,
}

impl UserScope {
    /// Membership test for a single record, using the same rule as the SQL filter
    pub fn contains(&self, user: &UserRecord) -> bool {
        match self {
            UserScope::All => true,
            UserScope::Field { level, anchor } => user.hierarchy_id(*level) == Some(*anchor),
            UserScope::Nothing => false,
        }
    }
}

/// A possibly unbounded set of ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeSet {
    All,
    Only(HashSet<i64>),
}

impl ScopeSet {
    pub fn contains(&self, id: i64) -> bool {
        match self {
            ScopeSet::All => true,
            ScopeSet::Only(ids) => ids.contains(&id),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ScopeSet::Only(ids) if ids.is_empty())
    }
}

#[derive(Clone)]
pub struct ScopeResolver {
    users: UserStore,
    catalog: HierarchyCatalog,
}

impl ScopeResolver {
    pub fn new(users: UserStore, catalog: HierarchyCatalog) -> Self {
        Self { users, catalog }
    }

    /// The filter for an actor's user scope.
    ///
    /// An anchored role with no anchor set resolves to `Nothing` rather than
    /// an error.
    pub fn user_scope(actor: &Actor) -> UserScope {
        if actor.role_level.is_global() {
            return UserScope::All;
        }

        match actor.anchor() {
            Some(anchor) => UserScope::Field {
                level: anchor.level,
                anchor: anchor.id,
            },
            None => UserScope::Nothing,
        }
    }

    /// Ids of users the actor may list or manage
    pub async fn accessible_user_ids(&self, actor: &Actor) -> AccessResult<ScopeSet> {
        match Self::user_scope(actor) {
            UserScope::All => Ok(ScopeSet::All),
            scope => Ok(ScopeSet::Only(self.users.list_ids(&scope).await?)),
        }
    }

    /// Ids of hierarchy nodes at `level` within the actor's jurisdiction.
    ///
    /// Levels above the anchor are outside it: a deanery admin does not
    /// manage the diocese containing their deanery.
    pub async fn accessible_node_ids(
        &self,
        actor: &Actor,
        level: HierarchyLevel,
    ) -> AccessResult<ScopeSet> {
        if actor.role_level.is_global() {
            return Ok(ScopeSet::All);
        }

        let Some(anchor) = actor.anchor() else {
            return Ok(ScopeSet::Only(HashSet::new()));
        };

        if level < anchor.level {
            return Ok(ScopeSet::Only(HashSet::new()));
        }

        let ids = self
            .catalog
            .resolve_descendant_ids(anchor.id, anchor.level, level)
            .await?;
        Ok(ScopeSet::Only(ids))
    }

    /// Whether a single node lies within the actor's jurisdiction
    pub async fn can_access_node(
        &self,
        actor: &Actor,
        level: HierarchyLevel,
        node_id: i64,
    ) -> AccessResult<bool> {
        if actor.role_level.is_global() {
            self.catalog.get_node(level, node_id).await?;
            return Ok(true);
        }

        let Some(anchor) = actor.anchor() else {
            return Ok(false);
        };

        if level == anchor.level {
            self.catalog.get_node(level, node_id).await?;
            return Ok(node_id == anchor.id);
        }

        if !level.is_below(anchor.level) {
            return Ok(false);
        }

        let ancestors = self.catalog.resolve_ancestors(node_id, level).await?;
        Ok(ancestors.contains(&anchor))
    }
}
