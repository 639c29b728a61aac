/// API routes and handlers
pub mod hierarchy;
pub mod users;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(users::routes())
        .merge(hierarchy::routes())
}
