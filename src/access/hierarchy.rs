/// Organizational hierarchy catalog
///
/// Read-only lookups over the five-tier tree
/// (province -> diocese -> archdeaconry -> deanery -> parish).
/// Each level lives in its own table with a parent-id column pointing
/// one level up; provinces have no parent.
use crate::error::{AccessError, AccessResult};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashSet;
use std::fmt;

/// Hierarchy levels, top first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyLevel {
    Province,
    Diocese,
    Archdeaconry,
    Deanery,
    Parish,
}

impl HierarchyLevel {
    pub const ALL: [HierarchyLevel; 5] = [
        HierarchyLevel::Province,
        HierarchyLevel::Diocese,
        HierarchyLevel::Archdeaconry,
        HierarchyLevel::Deanery,
        HierarchyLevel::Parish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HierarchyLevel::Province => "province",
            HierarchyLevel::Diocese => "diocese",
            HierarchyLevel::Archdeaconry => "archdeaconry",
            HierarchyLevel::Deanery => "deanery",
            HierarchyLevel::Parish => "parish",
        }
    }

    pub fn from_str(s: &str) -> AccessResult<Self> {
        let normalized = s.trim().to_lowercase();
        HierarchyLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .ok_or_else(|| AccessError::Validation(format!("invalid hierarchy level: {}", s)))
    }

    /// Table holding nodes of this level
    pub fn table(&self) -> &'static str {
        match self {
            HierarchyLevel::Province => "provinces",
            HierarchyLevel::Diocese => "dioceses",
            HierarchyLevel::Archdeaconry => "archdeaconries",
            HierarchyLevel::Deanery => "deaneries",
            HierarchyLevel::Parish => "parishes",
        }
    }

    /// Column on `users` (and on child tables) referencing this level
    pub fn id_column(&self) -> &'static str {
        match self {
            HierarchyLevel::Province => "province_id",
            HierarchyLevel::Diocese => "diocese_id",
            HierarchyLevel::Archdeaconry => "archdeaconry_id",
            HierarchyLevel::Deanery => "deanery_id",
            HierarchyLevel::Parish => "parish_id",
        }
    }

    pub fn parent(&self) -> Option<HierarchyLevel> {
        match self {
            HierarchyLevel::Province => None,
            HierarchyLevel::Diocese => Some(HierarchyLevel::Province),
            HierarchyLevel::Archdeaconry => Some(HierarchyLevel::Diocese),
            HierarchyLevel::Deanery => Some(HierarchyLevel::Archdeaconry),
            HierarchyLevel::Parish => Some(HierarchyLevel::Deanery),
        }
    }

    pub fn child(&self) -> Option<HierarchyLevel> {
        match self {
            HierarchyLevel::Province => Some(HierarchyLevel::Diocese),
            HierarchyLevel::Diocese => Some(HierarchyLevel::Archdeaconry),
            HierarchyLevel::Archdeaconry => Some(HierarchyLevel::Deanery),
            HierarchyLevel::Deanery => Some(HierarchyLevel::Parish),
            HierarchyLevel::Parish => None,
        }
    }

    /// Whether `self` sits strictly below `other` in the tree
    pub fn is_below(&self, other: HierarchyLevel) -> bool {
        *self > other
    }
}

impl fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in the organizational tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub id: i64,
    pub level: HierarchyLevel,
    pub name: String,
    pub parent_id: Option<i64>,
}

/// Reference to a node by level and id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub level: HierarchyLevel,
    pub id: i64,
}

/// Read-only hierarchy catalog
#[derive(Clone)]
pub struct HierarchyCatalog {
    db: SqlitePool,
}

impl HierarchyCatalog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Load a single node, failing with NotFound when the id does not exist at `level`
    pub async fn get_node(&self, level: HierarchyLevel, id: i64) -> AccessResult<HierarchyNode> {
        let parent_expr = match level.parent() {
            Some(parent) => parent.id_column(),
            None => "NULL",
        };
        let sql = format!(
            "SELECT id, name, {} AS parent_id FROM {} WHERE id = ?",
            parent_expr,
            level.table()
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AccessError::NotFound(format!("{} {} not found", level, id)))?;

        Ok(HierarchyNode {
            id: row.get("id"),
            level,
            name: row.get("name"),
            parent_id: row.try_get::<Option<i64>, _>("parent_id")?,
        })
    }

    /// Ancestors of a node, nearest first, ending at the province
    pub async fn resolve_ancestors(
        &self,
        node_id: i64,
        level: HierarchyLevel,
    ) -> AccessResult<Vec<NodeRef>> {
        let mut node = self.get_node(level, node_id).await?;
        let mut ancestors = Vec::new();

        // Levels strictly decrease on every step, so the walk is bounded by the tree depth.
        while let Some(parent_level) = node.level.parent() {
            let parent_id = node.parent_id.ok_or_else(|| {
                AccessError::Internal(format!(
                    "{} {} has no parent {}",
                    node.level, node.id, parent_level
                ))
            })?;

            node = self.get_node(parent_level, parent_id).await.map_err(|e| match e {
                AccessError::NotFound(_) => AccessError::Internal(format!(
                    "{} {} references missing {} {}",
                    node.level, node.id, parent_level, parent_id
                )),
                other => other,
            })?;

            ancestors.push(NodeRef {
                level: parent_level,
                id: parent_id,
            });
        }

        Ok(ancestors)
    }

    /// Ids of all nodes at `target_level` under the given node.
    ///
    /// Asking for the node's own level yields just the node itself; asking
    /// for a level above it is a validation error.
    pub async fn resolve_descendant_ids(
        &self,
        node_id: i64,
        level: HierarchyLevel,
        target_level: HierarchyLevel,
    ) -> AccessResult<HashSet<i64>> {
        if target_level < level {
            return Err(AccessError::Validation(format!(
                "{} is above {}",
                target_level, level
            )));
        }

        self.get_node(level, node_id).await?;

        let mut frontier: HashSet<i64> = HashSet::from([node_id]);
        let mut current = level;

        while current != target_level {
            let Some(child) = current.child() else {
                break;
            };
            if frontier.is_empty() {
                break;
            }

            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "SELECT id FROM {} WHERE {} IN (",
                child.table(),
                current.id_column()
            ));
            let mut separated = builder.separated(", ");
            for id in &frontier {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            let rows = builder.build().fetch_all(&self.db).await?;
            frontier = rows.iter().map(|row| row.get::<i64, _>("id")).collect();
            current = child;
        }

        Ok(frontier)
    }
}
