// [business] External identity providers - authorization-code grant against GitHub and Google

use crate::config::Config;
use crate::db::Provenance;
use crate::security::AuthError;

// [library] async-trait - lets the orchestrator hold providers as Arc<dyn IdentityProvider>
use async_trait::async_trait;

// [library] HTTP client for the token and user-info calls
use reqwest::Client;

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const USER_AGENT: &str = "tracker-auth";

// [business] One configured provider: builds the consent URL, then turns a grant code into
// the user's raw attribute document
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn provenance(&self) -> Provenance;

    // [security] `state` is the per-flow CSRF nonce, echoed back on the callback
    fn authorization_url(&self, state: &str, callback_uri: &str) -> String;

    async fn fetch_identity(
        &self,
        code: &str,
        callback_uri: &str,
    ) -> Result<Map<String, Value>, AuthError>;
}

#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub authorization: String,
    pub token: String,
    pub user_info: String,
    pub scopes: Vec<String>,
}

impl ProviderEndpoints {
    pub fn github() -> Self {
        Self {
            authorization: "https://github.com/login/oauth/authorize".to_string(),
            token: "https://github.com/login/oauth/access_token".to_string(),
            user_info: "https://api.github.com/user".to_string(),
            scopes: vec!["read:user".to_string(), "user:email".to_string()],
        }
    }

    pub fn google() -> Self {
        Self {
            authorization: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token: "https://oauth2.googleapis.com/token".to_string(),
            user_info: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

// [business] Standard OAuth2 client shared by every provider we support
pub struct OAuth2Provider {
    provenance: Provenance,
    client_id: String,
    client_secret: Secret<String>,
    endpoints: ProviderEndpoints,
    http_client: Client,
}

impl OAuth2Provider {
    pub fn new(
        provenance: Provenance,
        client_id: String,
        client_secret: Secret<String>,
        endpoints: ProviderEndpoints,
    ) -> Self {
        Self {
            provenance,
            client_id,
            client_secret,
            endpoints,
            http_client: Client::new(),
        }
    }

    pub fn github(client_id: String, client_secret: Secret<String>) -> Self {
        Self::new(Provenance::Github, client_id, client_secret, ProviderEndpoints::github())
    }

    pub fn google(client_id: String, client_secret: Secret<String>) -> Self {
        Self::new(Provenance::Google, client_id, client_secret, ProviderEndpoints::google())
    }

    async fn exchange_code(&self, code: &str, callback_uri: &str) -> Result<String, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret().as_str()),
            ("code", code),
            ("redirect_uri", callback_uri),
        ];

        let response = self
            .http_client
            .post(&self.endpoints.token)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::ProviderExchange(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(provider = self.provenance.as_str(), %status, "Token endpoint rejected the grant");
            return Err(AuthError::ProviderExchange(format!(
                "token endpoint returned {}",
                status
            )));
        }

        // [business] GitHub answers 200 with an error document for bad codes - no access_token
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::ProviderExchange(format!("unexpected token response: {}", e)))?;

        Ok(token.access_token)
    }
}

#[async_trait]
impl IdentityProvider for OAuth2Provider {
    fn provenance(&self) -> Provenance {
        self.provenance
    }

    fn authorization_url(&self, state: &str, callback_uri: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.endpoints.authorization,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(callback_uri),
            urlencoding::encode(&self.endpoints.scopes.join(" ")),
            urlencoding::encode(state),
        )
    }

    async fn fetch_identity(
        &self,
        code: &str,
        callback_uri: &str,
    ) -> Result<Map<String, Value>, AuthError> {
        let access_token = self.exchange_code(code, callback_uri).await?;

        let response = self
            .http_client
            .get(&self.endpoints.user_info)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::ProviderExchange(format!("user-info request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(provider = self.provenance.as_str(), %status, "User-info endpoint failed");
            return Err(AuthError::ProviderExchange(format!(
                "user-info endpoint returned {}",
                status
            )));
        }

        let attributes: Map<String, Value> = response
            .json()
            .await
            .map_err(|e| AuthError::ProviderExchange(format!("unexpected user-info response: {}", e)))?;

        debug!(
            provider = self.provenance.as_str(),
            attributes = attributes.len(),
            "User attributes fetched"
        );
        Ok(attributes)
    }
}

// [business] Registration id ("github", "google") -> configured provider
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // [business] Providers with complete credentials, keyed by their callback path segment
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        if let Some(github) = &config.github {
            registry.insert(
                "github",
                Arc::new(OAuth2Provider::github(
                    github.client_id.clone(),
                    github.client_secret.clone(),
                )),
            );
        }
        if let Some(google) = &config.google {
            registry.insert(
                "google",
                Arc::new(OAuth2Provider::google(
                    google.client_id.clone(),
                    google.client_secret.clone(),
                )),
            );
        }
        registry
    }

    pub fn insert(&mut self, registration_id: impl Into<String>, provider: Arc<dyn IdentityProvider>) {
        self.providers.insert(registration_id.into(), provider);
    }

    pub fn get(&self, registration_id: &str) -> Option<Arc<dyn IdentityProvider>> {
        self.providers.get(registration_id).cloned()
    }

    pub fn registration_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.registration_ids())
            .finish()
    }
}
