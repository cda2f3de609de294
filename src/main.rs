// [library] `Result<T>` is a type alias for `Result<T, anyhow::Error>`
use anyhow::Result;

// [library] HTTP utilities from axum web framework
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};

use std::{net::SocketAddr, sync::Arc};

use tracker_auth::{
    config::Config,
    db::{create_pool, MemoryStore, PgStore, TaskOwnership, UserStore},
    oauth::ProviderRegistry,
    web::{create_app_router, AppState},
};

// [library] Tower ecosystem - CORS and request tracing middleware
use tower_http::{cors::CorsLayer, trace::TraceLayer};

// [library] Structured logging with environment-based filtering
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tracker_auth=info,tower_http=debug")),
        )
        .finish();

    // [library] Logging failure at startup is fatal
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting tracker-auth - authentication and delegated authorization");

    // [business] Fail fast on missing secrets or malformed settings
    let config = Config::from_env()?;
    let bind_address = config.bind_address();

    // [business] PostgreSQL when configured, otherwise a volatile in-process store
    let (users, tasks) = match config.database_url() {
        Some(url) => {
            info!("Connecting to database...");
            let db = create_pool(url).await?;
            info!("Database connection established and migrations applied");
            let store = Arc::new(PgStore::new(db));
            (store.clone() as Arc<dyn UserStore>, store as Arc<dyn TaskOwnership>)
        }
        None => {
            warn!("DATABASE_URL not set - using in-memory store, data is lost on restart");
            let store = Arc::new(MemoryStore::new());
            (store.clone() as Arc<dyn UserStore>, store as Arc<dyn TaskOwnership>)
        }
    };

    let providers = ProviderRegistry::from_config(&config);
    if providers.is_empty() {
        warn!("No identity provider configured - delegated login is disabled");
    } else {
        info!("Identity providers enabled: {:?}", providers.registration_ids());
    }

    // [security] CORS needs concrete origins when credentials are allowed
    let allowed_origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let state = AppState::new(config, users, tasks, providers)?;

    let app = create_app_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
                .expose_headers([AUTHORIZATION])
                .allow_credentials(true),
        )
        .layer(TraceLayer::new_for_http());

    info!("Server starting on {}", bind_address);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;

    // [business] Peer addresses feed the login audit log
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
