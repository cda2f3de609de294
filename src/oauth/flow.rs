// [business] Delegated login: redirect to provider, handle its callback, hand a session
// token to an authorized front-end URI

use crate::db::UserStore;
use crate::oauth::identity::{from_attributes, Identity};
use crate::oauth::provider::ProviderRegistry;
use crate::security::{AuthError, LoginStateStore, RedirectAllowList, TokenCodec};
use crate::web::{failure::ApiFailure, routes::AppState, source_address};

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{
        header::{AUTHORIZATION, LOCATION},
        HeaderValue, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_cookies::Cookies;
use tracing::{debug, info, warn};
use url::Url;

// [business] Generic failure marker - provider error text never reaches the browser
pub const LOGIN_FAILED_ERROR: &str = "login_failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Initiated,
    AwaitingProviderCallback,
    Completed,
    Failed,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::Initiated => "initiated",
            FlowState::AwaitingProviderCallback => "awaiting_provider_callback",
            FlowState::Completed => "completed",
            FlowState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthorizationParams {
    pub redirect_uri: Option<String>,
}

// [business] What the provider sends back: a grant code and our nonce, or an error
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

// [business] Terminal result of a callback - always a redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOutcome {
    pub state: FlowState,
    pub location: String,
    pub token: Option<String>,
}

pub struct DelegatedLoginOrchestrator {
    tokens: Arc<TokenCodec>,
    login_state: LoginStateStore,
    redirects: RedirectAllowList,
    users: Arc<dyn UserStore>,
    providers: ProviderRegistry,
    default_redirect_uri: String,
    failure_uri: String,
    public_base_url: String,
}

impl fmt::Debug for DelegatedLoginOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedLoginOrchestrator")
            .field("providers", &self.providers)
            .field("redirects", &self.redirects.len())
            .field("default_redirect_uri", &self.default_redirect_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct FlowUris {
    pub default_redirect_uri: String,
    pub failure_uri: String,
    pub public_base_url: String,
}

impl DelegatedLoginOrchestrator {
    pub fn new(
        tokens: Arc<TokenCodec>,
        login_state: LoginStateStore,
        redirects: RedirectAllowList,
        users: Arc<dyn UserStore>,
        providers: ProviderRegistry,
        uris: FlowUris,
    ) -> Self {
        Self {
            tokens,
            login_state,
            redirects,
            users,
            providers,
            default_redirect_uri: uris.default_redirect_uri,
            failure_uri: uris.failure_uri,
            public_base_url: uris.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn callback_uri(&self, registration_id: &str) -> String {
        format!("{}/oauth2/callback/{}", self.public_base_url, registration_id)
    }

    // [business] Initiated -> AwaitingProviderCallback: store the state cookie, return the
    // provider's authorization URL
    pub fn begin(
        &self,
        cookies: &Cookies,
        registration_id: &str,
        redirect_uri: Option<&str>,
    ) -> Result<String, AuthError> {
        let provider = self
            .providers
            .get(registration_id)
            .ok_or_else(|| AuthError::UnknownProvider(registration_id.to_string()))?;

        debug!(provider = registration_id, state = %FlowState::Initiated, "Delegated login requested");

        let state = self.login_state.begin(cookies, registration_id, redirect_uri)?;
        let location = provider.authorization_url(&state.nonce, &self.callback_uri(registration_id));

        debug!(
            provider = registration_id,
            state = %FlowState::AwaitingProviderCallback,
            "Redirecting to identity provider"
        );
        Ok(location)
    }

    // [security] The state cookie is cleared exactly once here, whatever the outcome
    pub async fn complete(
        &self,
        cookies: &Cookies,
        registration_id: &str,
        params: CallbackParams,
        source: &str,
    ) -> FlowOutcome {
        let result = self.finish(cookies, registration_id, params, source).await;
        self.login_state.clear(cookies);

        match result {
            Ok((location, token)) => FlowOutcome {
                state: FlowState::Completed,
                location,
                token: Some(token),
            },
            Err(e) => {
                warn!(
                    provider = registration_id,
                    error = e.tag(),
                    source,
                    "Delegated login failed: {}",
                    e
                );
                FlowOutcome {
                    state: FlowState::Failed,
                    location: self.failure_location(),
                    token: None,
                }
            }
        }
    }

    async fn finish(
        &self,
        cookies: &Cookies,
        registration_id: &str,
        params: CallbackParams,
        source: &str,
    ) -> Result<(String, String), AuthError> {
        if params.error.is_some() {
            return Err(AuthError::ProviderDenied);
        }

        // [security] The cookie must exist, belong to this provider, and match the echoed nonce
        let state = self
            .login_state
            .read(cookies)
            .ok_or(AuthError::InvalidLoginState)?;
        if state.provider != registration_id || params.state.as_deref() != Some(state.nonce.as_str()) {
            return Err(AuthError::InvalidLoginState);
        }

        let code = params
            .code
            .filter(|code| !code.is_empty())
            .ok_or(AuthError::ProviderDenied)?;

        // [security] Resolve and approve the destination before any token exists
        let target = state
            .redirect_uri
            .unwrap_or_else(|| self.default_redirect_uri.clone());
        if !self.redirects.is_authorized(&target) {
            return Err(AuthError::UnauthorizedRedirectUri);
        }

        let provider = self
            .providers
            .get(registration_id)
            .ok_or_else(|| AuthError::UnknownProvider(registration_id.to_string()))?;
        let attributes = provider
            .fetch_identity(&code, &self.callback_uri(registration_id))
            .await?;

        let identity = from_attributes(provider.provenance(), &attributes)?;
        let principal = Identity::Delegated(identity)
            .into_principal(self.users.as_ref())
            .await?;

        let token = self.tokens.issue(&principal)?;
        let location = append_query(&target, "token", &token)?;

        info!(
            provider = registration_id,
            username = %principal.username,
            source,
            state = %FlowState::Completed,
            "Delegated login succeeded"
        );
        Ok((location, token))
    }

    fn failure_location(&self) -> String {
        append_query(&self.failure_uri, "error", LOGIN_FAILED_ERROR)
            .unwrap_or_else(|_| format!("{}?error={}", self.failure_uri, LOGIN_FAILED_ERROR))
    }
}

// [rust] Append one query pair, keeping whatever query the target already carries
fn append_query(target: &str, key: &str, value: &str) -> Result<String, AuthError> {
    let mut url = Url::parse(target)
        .map_err(|e| AuthError::Internal(format!("redirect target is not a URL: {}", e)))?;
    url.query_pairs_mut().append_pair(key, value);
    Ok(url.to_string())
}

fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

// [business] GET /oauth2/authorization/:provider - start a delegated login
pub async fn authorization_handler(
    State(state): State<AppState>,
    Path(registration_id): Path<String>,
    Query(params): Query<AuthorizationParams>,
    cookies: Cookies,
    uri: Uri,
) -> Response {
    match state
        .login
        .begin(&cookies, &registration_id, params.redirect_uri.as_deref())
    {
        Ok(location) => found(&location),
        Err(e) => ApiFailure::from_error(&e, uri.path(), state.config.verbose_auth_errors)
            .into_response(),
    }
}

// [business] GET /oauth2/callback/:provider - provider redirects the browser back here
pub async fn callback_handler(
    State(state): State<AppState>,
    Path(registration_id): Path<String>,
    Query(params): Query<CallbackParams>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    cookies: Cookies,
) -> Response {
    let source = source_address(connect_info.as_ref());
    let outcome = state
        .login
        .complete(&cookies, &registration_id, params, &source)
        .await;

    let mut response = found(&outcome.location);
    if let Some(token) = outcome.token {
        // [business] Non-browser clients can read the token without parsing the Location
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
            response.headers_mut().insert(AUTHORIZATION, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_appended_to_existing_query() {
        let location = append_query("https://app.example.com/done?tab=tasks", "token", "abc.def.ghi").unwrap();
        assert_eq!(location, "https://app.example.com/done?tab=tasks&token=abc.def.ghi");
    }

    #[test]
    fn test_token_is_appended_without_query() {
        let location = append_query("https://app.example.com/done", "token", "abc").unwrap();
        assert_eq!(location, "https://app.example.com/done?token=abc");
    }

    #[test]
    fn test_unparseable_target_is_an_error() {
        assert!(append_query("/relative", "token", "abc").is_err());
    }
}
