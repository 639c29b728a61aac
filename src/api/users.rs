/// User administration endpoints
///
/// Every handler resolves the caller through [`ActorContext`]; mutating
/// routes additionally require the session's CSRF token.
use crate::{
    access::{
        BulkAction, BulkOutcome, Operation, RoleAssignment, ScopeResolver, UserRecord,
    },
    auth::ActorContext,
    context::AppContext,
    error::{AccessError, AccessResult},
};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

/// Build user routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/users", get(list_users))
        .route("/api/users/bulk", post(bulk_action))
        .route("/api/users/:id", get(get_user))
        .route("/api/users/:id/role", post(assign_role))
        .route("/api/users/:id/impersonate", post(impersonate))
}

#[derive(Debug, Deserialize)]
struct ListUsersQuery {
    limit: Option<i64>,
    cursor: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ListUsersResponse {
    success: bool,
    users: Vec<UserRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<i64>,
}

/// List users inside the caller's scope
async fn list_users(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    Query(query): Query<ListUsersQuery>,
) -> AccessResult<Json<ListUsersResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let scope = ScopeResolver::user_scope(&auth.actor);

    let users = ctx.users.list_users(&scope, limit, query.cursor).await?;
    let cursor = if users.len() as i64 == limit {
        users.last().map(|u| u.id)
    } else {
        None
    };

    Ok(Json(ListUsersResponse {
        success: true,
        users,
        cursor,
    }))
}

#[derive(Debug, Serialize)]
struct UserResponse {
    success: bool,
    user: UserRecord,
}

async fn get_user(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    Path(id): Path<i64>,
) -> AccessResult<Json<UserResponse>> {
    let (user, decision) = ctx.evaluator.check(&auth.actor, Operation::View, id).await?;
    decision.into_result()?;

    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

#[derive(Debug, Deserialize)]
struct AssignRoleRequest {
    role: String,
}

#[derive(Debug, Serialize)]
struct AssignRoleResponse {
    success: bool,
    assignment: RoleAssignment,
}

async fn assign_role(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<AssignRoleRequest>,
) -> AccessResult<Json<AssignRoleResponse>> {
    auth.verify_csrf(&headers)?;

    let assignment = ctx.assignments.assign_role(&auth.actor, id, &req.role).await?;

    Ok(Json(AssignRoleResponse {
        success: true,
        assignment,
    }))
}

#[derive(Debug, Deserialize)]
struct BulkRequest {
    user_ids: Vec<i64>,
    action: String,
    role: Option<String>,
}

impl BulkRequest {
    fn action(&self) -> AccessResult<BulkAction> {
        match self.action.as_str() {
            "activate" => Ok(BulkAction::Activate),
            "suspend" => Ok(BulkAction::Suspend),
            "delete" => Ok(BulkAction::Delete),
            "assign_role" => self
                .role
                .clone()
                .map(BulkAction::AssignRole)
                .ok_or_else(|| AccessError::Validation("assign_role requires a role".to_string())),
            other => Err(AccessError::Validation(format!("unknown bulk action: {}", other))),
        }
    }
}

#[derive(Debug, Serialize)]
struct BulkResponse {
    success: bool,
    #[serde(flatten)]
    outcome: BulkOutcome,
}

async fn bulk_action(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    headers: HeaderMap,
    Json(req): Json<BulkRequest>,
) -> AccessResult<Json<BulkResponse>> {
    auth.verify_csrf(&headers)?;

    let action = req.action()?;
    let outcome = ctx
        .assignments
        .bulk_assign(&auth.actor, &req.user_ids, action)
        .await?;

    Ok(Json(BulkResponse {
        success: outcome.failed_count == 0,
        outcome,
    }))
}

#[derive(Debug, Serialize)]
struct ImpersonateResponse {
    success: bool,
    user_id: i64,
    token: String,
    csrf_token: String,
}

/// Start a session acting as another user
async fn impersonate(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> AccessResult<Json<ImpersonateResponse>> {
    auth.verify_csrf(&headers)?;

    let acting_as = ctx.assignments.impersonate(&auth.actor, id).await?;
    let session = ctx.sessions.create_session(acting_as.user_id).await?;

    Ok(Json(ImpersonateResponse {
        success: true,
        user_id: acting_as.user_id,
        token: session.token,
        csrf_token: session.csrf_token,
    }))
}

#[cfg(test)]
mod tests {
    use crate::access::{fixtures, RoleLevel};
    use crate::api::test_support::{context, get, json_body, login, post};
    use crate::server::build_router;
    use axum::{body::Body, http::Request, http::StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_list_is_scoped_to_deanery() {
        let ctx = context().await;
        let admin = fixtures::insert_user(&ctx.users, "Dean Kamau", RoleLevel::DeaneryAdmin, 11).await;
        let inside = fixtures::insert_user(&ctx.users, "Wanjiku", RoleLevel::Member, 12).await;
        let outside = fixtures::insert_user(&ctx.users, "Baraka", RoleLevel::Member, 13).await;
        let session = login(&ctx, admin).await;

        let response = build_router(ctx)
            .oneshot(get("/api/users", &session))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let ids: Vec<i64> = body["users"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["id"].as_i64().unwrap())
            .collect();
        assert!(ids.contains(&admin));
        assert!(ids.contains(&inside));
        assert!(!ids.contains(&outside));
    }

    #[tokio::test]
    async fn test_requests_without_session_are_rejected() {
        let ctx = context().await;
        let response = build_router(ctx)
            .oneshot(Request::builder().uri("/api/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_get_user_outside_scope_is_forbidden() {
        let ctx = context().await;
        let admin = fixtures::insert_user(&ctx.users, "Dean Kamau", RoleLevel::DeaneryAdmin, 11).await;
        let outside = fixtures::insert_user(&ctx.users, "Baraka", RoleLevel::Member, 13).await;
        let session = login(&ctx, admin).await;
        let app = build_router(ctx);

        let response = app
            .clone()
            .oneshot(get(&format!("/api/users/{}", outside), &session))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(get(&format!("/api/users/{}", admin), &session))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["user"]["id"], admin);
    }

    #[tokio::test]
    async fn test_assign_role_requires_csrf() {
        let ctx = context().await;
        let admin = fixtures::insert_user(&ctx.users, "Dean Kamau", RoleLevel::DeaneryAdmin, 11).await;
        let target = fixtures::insert_user(&ctx.users, "Wanjiku", RoleLevel::Member, 12).await;
        let session = login(&ctx, admin).await;

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/users/{}/role", target))
            .header("authorization", format!("Bearer {}", session.token))
            .header("content-type", "application/json")
            .body(Body::from(json!({ "role": "parish_admin" }).to_string()))
            .unwrap();

        let response = build_router(ctx.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ctx.users.get_user(target).await.unwrap().role_level,
            RoleLevel::Member
        );
    }

    #[tokio::test]
    async fn test_assign_role_forces_target_to_reauthenticate() {
        let ctx = context().await;
        let admin = fixtures::insert_user(&ctx.users, "Dean Kamau", RoleLevel::DeaneryAdmin, 11).await;
        let target = fixtures::insert_user(&ctx.users, "Wanjiku", RoleLevel::Member, 12).await;
        let admin_session = login(&ctx, admin).await;
        let target_session = login(&ctx, target).await;
        let app = build_router(ctx.clone());

        let response = app
            .clone()
            .oneshot(post(
                &format!("/api/users/{}/role", target),
                &admin_session,
                json!({ "role": "parish_admin" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["assignment"]["previous_role"], "member");
        assert_eq!(body["assignment"]["new_role"], "parish_admin");

        // The target's existing session is refused once and then gone
        let response = app
            .clone()
            .oneshot(get("/api/users", &target_session))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(ctx
            .sessions
            .get_session(&target_session.token)
            .await
            .unwrap()
            .is_none());
        assert!(!ctx.users.get_user(target).await.unwrap().force_logout);

        // A fresh login works with the new role
        let fresh = login(&ctx, target).await;
        let response = app.oneshot(get("/api/users", &fresh)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_self_promotion_is_forbidden() {
        let ctx = context().await;
        let admin = fixtures::insert_user(&ctx.users, "Rev Achieng", RoleLevel::ParishAdmin, 11).await;
        let session = login(&ctx, admin).await;

        let response = build_router(ctx.clone())
            .oneshot(post(
                &format!("/api/users/{}/role", admin),
                &session,
                json!({ "role": "diocese_admin" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("self-modification"));

        let entries = ctx.audit.list_for_target(admin).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "ROLE_CHANGE_DENIED");
    }

    #[tokio::test]
    async fn test_bulk_reports_per_item_results() {
        let ctx = context().await;
        let admin = fixtures::insert_user(&ctx.users, "Dean Kamau", RoleLevel::DeaneryAdmin, 11).await;
        let a = fixtures::insert_user(&ctx.users, "Wanjiku", RoleLevel::Member, 12).await;
        let outside = fixtures::insert_user(&ctx.users, "Baraka", RoleLevel::Member, 13).await;
        let session = login(&ctx, admin).await;

        let response = build_router(ctx.clone())
            .oneshot(post(
                "/api/users/bulk",
                &session,
                json!({ "user_ids": [a, outside, admin], "action": "suspend" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["processed_count"], 1);
        assert_eq!(body["failed_count"], 2);
        assert_eq!(body["items"][1]["reason"], "no permission: out of scope");
    }

    #[tokio::test]
    async fn test_bulk_rejects_unknown_action() {
        let ctx = context().await;
        let admin = fixtures::insert_user(&ctx.users, "Dean Kamau", RoleLevel::DeaneryAdmin, 11).await;
        let session = login(&ctx, admin).await;

        let response = build_router(ctx)
            .oneshot(post(
                "/api/users/bulk",
                &session,
                json!({ "user_ids": [1], "action": "promote" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_impersonation_issues_target_session() {
        let ctx = context().await;
        let root = fixtures::insert_user(&ctx.users, "Root", RoleLevel::SuperAdmin, 11).await;
        let target = fixtures::insert_user(&ctx.users, "Wanjiku", RoleLevel::Member, 12).await;
        let dean = fixtures::insert_user(&ctx.users, "Dean Kamau", RoleLevel::DeaneryAdmin, 11).await;
        let root_session = login(&ctx, root).await;
        let dean_session = login(&ctx, dean).await;
        let app = build_router(ctx.clone());

        let response = app
            .clone()
            .oneshot(post(
                &format!("/api/users/{}/impersonate", target),
                &dean_session,
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(post(
                &format!("/api/users/{}/impersonate", target),
                &root_session,
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["user_id"], target);
        let token = body["token"].as_str().unwrap();
        let session = ctx.sessions.get_session(token).await.unwrap().unwrap();
        assert_eq!(session.user_id, target);
    }
}
