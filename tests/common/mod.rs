#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header::SET_COOKIE, HeaderMap, Request, StatusCode},
    Router,
};
use serde_json::{Map, Value};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tower::ServiceExt;
use tracker_auth::{
    config::Config,
    db::{MemoryStore, Provenance},
    oauth::{IdentityProvider, ProviderRegistry},
    security::AuthError,
    web::{create_app_router, AppState},
};

pub const JWT_SECRET: &str =
    "test-jwt-secret-0123456789abcdef0123456789abcdef0123456789abcdef0123456789";
pub const COOKIE_SECRET: &str = "test-cookie-secret";
pub const STUB_AUTHORIZE_URL: &str = "https://provider.test/authorize";

// Identity provider double: fixed attributes, counts exchanges
pub struct StubProvider {
    pub attributes: Option<Map<String, Value>>,
    pub calls: AtomicUsize,
}

impl StubProvider {
    pub fn returning(attributes: Value) -> Arc<Self> {
        Arc::new(Self {
            attributes: attributes.as_object().cloned(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            attributes: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    fn provenance(&self) -> Provenance {
        Provenance::Github
    }

    fn authorization_url(&self, state: &str, callback_uri: &str) -> String {
        format!(
            "{}?response_type=code&state={}&redirect_uri={}",
            STUB_AUTHORIZE_URL,
            urlencoding::encode(state),
            urlencoding::encode(callback_uri)
        )
    }

    async fn fetch_identity(
        &self,
        _code: &str,
        _callback_uri: &str,
    ) -> Result<Map<String, Value>, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.attributes
            .clone()
            .ok_or_else(|| AuthError::ProviderExchange("stubbed failure".to_string()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

pub fn test_config() -> Config {
    let mut config = Config::with_secrets(JWT_SECRET, COOKIE_SECRET);
    config.authorized_redirect_uris = vec![
        "http://localhost:3000".to_string(),
        "https://app.example.com/".to_string(),
    ];
    config
}

pub fn test_app_with(config: Config, provider: Option<Arc<StubProvider>>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let mut providers = ProviderRegistry::new();
    if let Some(provider) = provider {
        providers.insert("github", provider);
    }

    let state = AppState::new(config, store.clone(), store.clone(), providers)
        .expect("Failed to build application state");

    TestApp {
        router: create_app_router(state.clone()),
        state,
        store,
    }
}

pub fn test_app() -> TestApp {
    test_app_with(test_config(), None)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("Request failed");

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_with_bearer(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
