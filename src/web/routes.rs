// [library] Axum web framework routing components
use axum::{
    routing::{get, post},
    Router,
};

// [library] Cookie management middleware - backs the signed login-state cookie
use tower_cookies::CookieManagerLayer;

use crate::{
    config::Config,
    db::{TaskOwnership, UserStore},
    oauth::{self, DelegatedLoginOrchestrator, FlowUris, ProviderRegistry},
    security::{LoginStateStore, RedirectAllowList, TokenCodec},
    web::{login_handler, me_handler, public_handler, register_handler, task_access_handler},
};

use anyhow::Context;
use std::sync::Arc;
use tracing::warn;

// [business] Everything handlers share, built once at startup and read-only afterwards
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: Arc<TokenCodec>,
    pub login: Arc<DelegatedLoginOrchestrator>,
    pub users: Arc<dyn UserStore>,
    pub tasks: Arc<dyn TaskOwnership>,
}

impl AppState {
    // [security] Misconfigured secrets or redirect entries fail here, before the server binds
    pub fn new(
        config: Config,
        users: Arc<dyn UserStore>,
        tasks: Arc<dyn TaskOwnership>,
        providers: ProviderRegistry,
    ) -> anyhow::Result<Self> {
        let tokens = Arc::new(
            TokenCodec::new(config.jwt_secret(), config.jwt_expiration_secs)
                .context("Invalid JWT configuration")?,
        );

        let redirects =
            RedirectAllowList::new(config.authorized_redirect_uris.as_slice(), config.redirect_path_match)?;
        if !redirects.is_authorized(&config.default_redirect_uri) {
            warn!(
                "DEFAULT_REDIRECT_URI {} is not in AUTHORIZED_REDIRECT_URIS - delegated logins without an explicit redirect will fail",
                config.default_redirect_uri
            );
        }
        url::Url::parse(&config.login_failure_uri).context("LOGIN_FAILURE_URI must be an absolute URI")?;

        let login_state = LoginStateStore::new(
            config.cookie_secret(),
            config.login_state_max_age_secs,
            config.cookie_secure,
        )
        .context("Invalid login state configuration")?;

        let login = Arc::new(DelegatedLoginOrchestrator::new(
            tokens.clone(),
            login_state,
            redirects,
            users.clone(),
            providers,
            FlowUris {
                default_redirect_uri: config.default_redirect_uri.clone(),
                failure_uri: config.login_failure_uri.clone(),
                public_base_url: config.public_base_url.clone(),
            },
        ));

        Ok(Self {
            config: Arc::new(config),
            tokens,
            login,
            users,
            tasks,
        })
    }
}

pub fn create_app_router(state: AppState) -> Router {
    Router::new()
        // [business] Local credentials
        .route("/auth/login", post(login_handler))
        .route("/auth/register", post(register_handler))
        // [business] Delegated login through external identity providers
        .route(
            "/oauth2/authorization/:provider",
            get(oauth::authorization_handler),
        )
        .route("/oauth2/callback/:provider", get(oauth::callback_handler))
        // [business] Resource endpoints guarded by the session token
        .route("/api/auth/me", get(me_handler))
        .route("/api/test/public", get(public_handler))
        .route("/api/tasks/:task_id/access", get(task_access_handler))
        .route("/health", get(health_check))
        .with_state(state)
        // [security] Required by the login-state cookie
        .layer(CookieManagerLayer::new())
}

// [business] Health check endpoint for load balancer probes
async fn health_check() -> &'static str {
    "OK"
}
