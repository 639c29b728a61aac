/// Request authentication extractors
use crate::{access::Actor, context::AppContext, db::sessions::Session, error::AccessError};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use tracing::{debug, info};

pub const CSRF_HEADER: &str = "x-csrf-token";

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

/// Client address as reported by the fronting proxy
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// The authenticated actor for this request
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub actor: Actor,
    pub session: Session,
}

impl ActorContext {
    /// Compare the submitted CSRF token with the session's; required before any mutation
    pub fn verify_csrf(&self, headers: &HeaderMap) -> Result<(), AccessError> {
        let submitted = headers.get(CSRF_HEADER).and_then(|h| h.to_str().ok());

        match submitted {
            Some(token) if token == self.session.csrf_token => Ok(()),
            _ => Err(AccessError::Authentication(
                "Missing or invalid CSRF token".to_string(),
            )),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for ActorContext {
    type Rejection = AccessError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AccessError::Authentication("Missing authorization header".to_string()))?;

        let session = state
            .sessions
            .get_session(&token)
            .await?
            .ok_or_else(|| AccessError::Authentication("Unknown session".to_string()))?;

        let user = state
            .users
            .find_user(session.user_id)
            .await?
            .ok_or_else(|| AccessError::Authentication("Session user no longer exists".to_string()))?;

        // A role or status change since login invalidates every open session
        if user.force_logout {
            let revoked = state.sessions.revoke_user_sessions(user.id).await?;
            state.users.clear_force_logout(user.id).await?;
            info!(user = user.id, revoked, "forced re-authentication");
            return Err(AccessError::Authentication(
                "Re-authentication required".to_string(),
            ));
        }

        if user.account_status != crate::access::AccountStatus::Active {
            return Err(AccessError::Authentication(format!(
                "Account is {}",
                user.account_status.as_str()
            )));
        }

        debug!(user = user.id, role = %user.role_level, "authenticated actor");

        let actor = Actor::from_user(&user).with_ip(client_ip(&parts.headers));
        Ok(ActorContext { actor, session })
    }
}
