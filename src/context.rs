/// Application context and dependency injection
use crate::{
    access::{AuditLog, HierarchyCatalog, PermissionEvaluator, RoleAssignmentService, ScopeResolver},
    config::ServerConfig,
    db::{self, sessions::SessionStore, users::UserStore},
    error::AccessResult,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub users: UserStore,
    pub sessions: SessionStore,
    pub catalog: HierarchyCatalog,
    pub scope: ScopeResolver,
    pub evaluator: PermissionEvaluator,
    pub assignments: RoleAssignmentService,
    pub audit: AuditLog,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AccessResult<Self> {
        config.validate()?;

        let options = db::DatabaseOptions {
            max_connections: config.storage.max_connections,
            ..Default::default()
        };
        let pool = db::create_pool(&config.storage.database, options).await?;

        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        Ok(Self::with_pool(config, pool))
    }

    /// Wire services over an existing, migrated pool
    pub fn with_pool(config: ServerConfig, pool: SqlitePool) -> Self {
        let users = UserStore::new(pool.clone());
        let catalog = HierarchyCatalog::new(pool.clone());
        let bulk_max_targets = config.access.bulk_max_targets;

        Self {
            config: Arc::new(config),
            sessions: SessionStore::new(pool.clone()),
            scope: ScopeResolver::new(users.clone(), catalog.clone()),
            evaluator: PermissionEvaluator::new(users.clone()),
            assignments: RoleAssignmentService::new(pool.clone(), bulk_max_targets),
            audit: AuditLog::new(pool.clone()),
            users,
            catalog,
            db: pool,
        }
    }

    /// Listen address
    pub fn bind_address(&self) -> String {
        format!(
            "{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
