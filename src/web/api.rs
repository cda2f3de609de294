use crate::{
    security::{access::task_access, AuthError, DecisionReason},
    web::{
        extract::{AuthUser, MaybeAuthUser},
        failure::ApiFailure,
        routes::AppState,
    },
};
use axum::{
    extract::{Path, State},
    http::Uri,
    response::Json,
};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub username: Option<String>,
    pub roles: Vec<String>,
    pub issued_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicInfo {
    pub message: &'static str,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAccessResponse {
    pub task_id: i64,
    pub allowed: bool,
    pub reason: DecisionReason,
}

// [business] GET /api/auth/me - echo the authenticated session
pub async fn me_handler(AuthUser(claims): AuthUser) -> Json<SessionInfo> {
    Json(SessionInfo {
        roles: claims.role_names(),
        id: claims.subject,
        username: claims.username,
        issued_at: claims.issued_at,
        expires_at: claims.expires_at,
    })
}

// [business] GET /api/test/public - reachable with or without a session
pub async fn public_handler(MaybeAuthUser(claims): MaybeAuthUser) -> Json<PublicInfo> {
    Json(PublicInfo {
        message: "Public content.",
        authenticated: claims.is_some(),
        username: claims.map(|c| c.display_name().to_string()),
    })
}

// [business] GET /api/tasks/:task_id/access - may the caller act on this task?
pub async fn task_access_handler(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(task_id): Path<i64>,
    uri: Uri,
) -> Result<Json<TaskAccessResponse>, ApiFailure> {
    let decision = task_access(&claims, state.tasks.as_ref(), task_id).await;

    if !decision.allowed {
        warn!(
            "Authorization failure: principal={} path={} reason={:?}",
            claims.display_name(),
            uri.path(),
            decision.reason
        );
        return Err(ApiFailure::from_error(
            &AuthError::AccessDenied,
            uri.path(),
            state.config.verbose_auth_errors,
        ));
    }

    Ok(Json(TaskAccessResponse {
        task_id,
        allowed: decision.allowed,
        reason: decision.reason,
    }))
}
