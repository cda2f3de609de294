// [security] Request-scoped authentication: the decoded session is a handler parameter,
// never ambient state

use crate::security::{AuthError, DecodedClaims, TokenCodec};
use crate::web::{failure::ApiFailure, routes::AppState};

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::debug;

// [security] Protected routes: a valid bearer token is required
#[derive(Debug, Clone)]
pub struct AuthUser(pub DecodedClaims);

// [security] Public routes: no token is fine, but a presented token must still be valid
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<DecodedClaims>);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(TokenCodec::extract_from_header)
}

fn reject(state: &AppState, parts: &Parts, err: &AuthError) -> ApiFailure {
    ApiFailure::from_error(err, parts.uri.path(), state.config.verbose_auth_errors)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiFailure;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| reject(state, parts, &AuthError::MissingToken))?;

        let claims = state
            .tokens
            .validate(token)
            .map_err(|e| reject(state, parts, &e))?;

        debug!(subject = %claims.subject, "Bearer token accepted");
        Ok(AuthUser(claims))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = ApiFailure;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer_token(parts) {
            None => Ok(MaybeAuthUser(None)),
            Some(token) => state
                .tokens
                .validate(token)
                .map(|claims| MaybeAuthUser(Some(claims)))
                .map_err(|e| reject(state, parts, &e)),
        }
    }
}
