use crate::{
    db::{NewUser, Provenance, Role},
    oauth::Identity,
    security::{
        password::{hash_password, verify_password},
        AuthError,
    },
    web::{failure::ApiFailure, routes::AppState},
};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{StatusCode, Uri},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{error, info, warn};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "must not be blank"))]
    pub username: String,
    #[validate(length(min = 1, message = "must not be blank"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(length(min = 3, max = 20, message = "size must be between 3 and 20"))]
    pub username: String,
    #[validate(
        email(message = "must be a well-formed email address"),
        length(max = 50, message = "size must be at most 50")
    )]
    pub email: String,
    #[validate(length(min = 6, max = 40, message = "size must be between 6 and 40"))]
    pub password: String,
    #[serde(default)]
    pub role: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct JwtResponse {
    pub token: String,
    #[serde(rename = "type")]
    pub token_type: &'static str,
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// [business] Client IP for authentication audit lines; "unknown" when served without ConnectInfo
pub fn source_address(connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
    connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

// [business] Parse and validate a JSON body; malformed JSON and field errors are both 400
fn validated<T: Validate>(body: Result<Json<T>, JsonRejection>, path: &str) -> Result<T, ApiFailure> {
    let Json(request) = body.map_err(|rejection| {
        ApiFailure::new(StatusCode::BAD_REQUEST, "InvalidRequest", rejection.body_text(), path)
    })?;
    request
        .validate()
        .map_err(|errors| ApiFailure::validation(path, &errors))?;
    Ok(request)
}

// [business] POST /auth/login - username/password exchange for a session token
pub async fn login_handler(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    uri: Uri,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<JwtResponse>, ApiFailure> {
    let path = uri.path();
    let request = validated(body, path)?;
    let source = source_address(connect_info.as_ref());
    let verbose = state.config.verbose_auth_errors;

    match authenticate(&state, &request).await {
        Ok(response) => {
            info!(
                "Login success: type={} username={} source={}",
                Provenance::Local,
                response.username,
                source
            );
            Ok(Json(response))
        }
        Err(e) => {
            if e.is_authentication_failure() {
                warn!("Login failure: username={} source={}", request.username, source);
            }
            Err(ApiFailure::from_error(&e, path, verbose))
        }
    }
}

async fn authenticate(state: &AppState, request: &LoginRequest) -> Result<JwtResponse, AuthError> {
    let record = state
        .users
        .find_local_by_username(&request.username)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    // [security] Unknown user, missing hash and wrong password are indistinguishable to the client
    let stored_hash = record
        .password_hash
        .as_deref()
        .ok_or(AuthError::InvalidCredentials)?;
    match verify_password(&request.password, stored_hash) {
        Ok(true) => {}
        Ok(false) => return Err(AuthError::InvalidCredentials),
        Err(e) => {
            error!("Stored password hash for user {} is unusable: {}", record.id, e);
            return Err(AuthError::InvalidCredentials);
        }
    }

    let principal = Identity::Local(record).into_principal(state.users.as_ref()).await?;
    let token = state.tokens.issue(&principal)?;

    Ok(JwtResponse {
        token,
        token_type: "Bearer",
        id: principal.id,
        roles: principal.role_names(),
        username: principal.username,
        email: principal.email,
    })
}

// [business] POST /auth/register - create a local account
pub async fn register_handler(
    State(state): State<AppState>,
    uri: Uri,
    body: Result<Json<SignUpRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiFailure> {
    let path = uri.path();
    let request = validated(body, path)?;

    register(&state, request)
        .await
        .map(|username| {
            info!("User registered: {}", username);
            Json(MessageResponse {
                message: "User registered successfully!".to_string(),
            })
        })
        .map_err(|e| ApiFailure::from_error(&e, path, state.config.verbose_auth_errors))
}

async fn register(state: &AppState, request: SignUpRequest) -> Result<String, AuthError> {
    if state.users.username_exists(&request.username).await? {
        return Err(AuthError::DuplicateUsername);
    }
    if state.users.email_exists(&request.email).await? {
        return Err(AuthError::DuplicateEmail);
    }

    let password_hash = hash_password(&request.password).map_err(|e| {
        error!("Password hashing failed: {}", e);
        AuthError::Internal("password hashing failed".to_string())
    })?;

    // [business] The store re-checks uniqueness, so a concurrent duplicate still fails cleanly
    let record = state
        .users
        .create_local(NewUser {
            username: request.username,
            email: Some(request.email),
            password_hash: Some(password_hash),
            roles: Role::resolve_requested(request.role.as_deref()),
            provenance: Provenance::Local,
            provider_id: None,
        })
        .await?;

    Ok(record.username)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_address_from_connect_info() {
        let addr: SocketAddr = "203.0.113.7:51234".parse().unwrap();
        assert_eq!(source_address(Some(&ConnectInfo(addr))), "203.0.113.7");
        assert_eq!(source_address(None), "unknown");
    }
}
