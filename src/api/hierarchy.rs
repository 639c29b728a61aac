/// Hierarchy navigation endpoints, limited to the caller's jurisdiction
use crate::{
    access::{Actor, DenyReason, HierarchyLevel, HierarchyNode, NodeRef},
    auth::ActorContext,
    context::AppContext,
    error::{AccessError, AccessResult},
};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

/// Build hierarchy routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/hierarchy/:level/:id/ancestors", get(ancestors))
        .route(
            "/api/hierarchy/:level/:id/descendants/:target_level",
            get(descendants),
        )
}

#[derive(Debug, Serialize)]
struct AncestorsResponse {
    success: bool,
    node: HierarchyNode,
    ancestors: Vec<NodeRef>,
}

#[derive(Debug, Serialize)]
struct DescendantsResponse {
    success: bool,
    node: HierarchyNode,
    level: HierarchyLevel,
    ids: Vec<i64>,
}

/// Resolve the node and refuse it unless it lies within the actor's jurisdiction
async fn accessible_node(
    ctx: &AppContext,
    actor: &Actor,
    level: HierarchyLevel,
    id: i64,
) -> AccessResult<HierarchyNode> {
    let node = ctx.catalog.get_node(level, id).await?;

    if !ctx.scope.can_access_node(actor, level, id).await? {
        return Err(AccessError::PermissionDenied(DenyReason::OutOfScope));
    }

    Ok(node)
}

async fn ancestors(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    Path((level, id)): Path<(String, i64)>,
) -> AccessResult<Json<AncestorsResponse>> {
    let level = HierarchyLevel::from_str(&level)?;
    let node = accessible_node(&ctx, &auth.actor, level, id).await?;
    let ancestors = ctx.catalog.resolve_ancestors(id, level).await?;

    Ok(Json(AncestorsResponse {
        success: true,
        node,
        ancestors,
    }))
}

async fn descendants(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    Path((level, id, target_level)): Path<(String, i64, String)>,
) -> AccessResult<Json<DescendantsResponse>> {
    let level = HierarchyLevel::from_str(&level)?;
    let target_level = HierarchyLevel::from_str(&target_level)?;
    let node = accessible_node(&ctx, &auth.actor, level, id).await?;

    let mut ids: Vec<i64> = ctx
        .catalog
        .resolve_descendant_ids(id, level, target_level)
        .await?
        .into_iter()
        .collect();
    ids.sort_unstable();

    Ok(Json(DescendantsResponse {
        success: true,
        node,
        level: target_level,
        ids,
    }))
}
