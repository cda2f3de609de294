// [library] Secrecy crate - Secret<T> keeps key material out of Debug output and logs
use secrecy::{ExposeSecret, Secret};

use crate::security::PathMatch;

// [rust] IpAddr is an enum that can be either IPv4 or IPv6
use std::net::{IpAddr, Ipv4Addr};

const DEFAULT_FRONTEND_URI: &str = "http://localhost:3000";
const DEFAULT_FAILURE_URI: &str = "http://localhost:3000/login";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_JWT_EXPIRATION_SECS: i64 = 86_400;

// [business] Client credentials registered with an external identity provider
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    // [business] Network binding - where the server listens for connections
    pub app_host: IpAddr,
    pub app_port: u16,

    // [security] Session token signing secret (HS512 needs at least 64 bytes) and lifetime
    pub jwt_secret: Secret<String>,
    pub jwt_expiration_secs: i64,

    // [security] Key material for the signed login-state cookie
    pub cookie_secret: Secret<String>,
    pub login_state_max_age_secs: i64,
    pub cookie_secure: bool, // [security] Set on HTTPS deployments

    // [security] Post-login redirect allow-list and how entry paths are matched
    pub authorized_redirect_uris: Vec<String>,
    pub redirect_path_match: PathMatch,

    // [business] Front-end landing pages for delegated login outcomes
    pub default_redirect_uri: String,
    pub login_failure_uri: String,

    // [business] Externally visible base URL - provider callbacks are built from it
    pub public_base_url: String,

    // [business] A provider is enabled only when both its id and secret are set
    pub github: Option<ProviderCredentials>,
    pub google: Option<ProviderCredentials>,

    // [security] CORS allowed origins for credentialed requests
    pub allowed_origins: Vec<String>,

    // [security] Adds debugMessage/exception to failure bodies - development only
    pub verbose_auth_errors: bool,

    // [business] PostgreSQL connection string; absent means in-memory storage
    pub database_url: Option<Secret<String>>,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn provider_credentials(prefix: &str) -> Option<ProviderCredentials> {
    let client_id = std::env::var(format!("{}_CLIENT_ID", prefix)).ok()?;
    let client_secret = std::env::var(format!("{}_CLIENT_SECRET", prefix)).ok()?;
    if client_id.trim().is_empty() || client_secret.trim().is_empty() {
        return None;
    }
    Some(ProviderCredentials {
        client_id,
        client_secret: Secret::new(client_secret),
    })
}

impl Config {
    // [business] Defaults for everything except the two secrets
    pub fn with_secrets(jwt_secret: impl Into<String>, cookie_secret: impl Into<String>) -> Self {
        Config {
            app_host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            app_port: 8080,
            jwt_secret: Secret::new(jwt_secret.into()),
            jwt_expiration_secs: DEFAULT_JWT_EXPIRATION_SECS,
            cookie_secret: Secret::new(cookie_secret.into()),
            login_state_max_age_secs: crate::security::DEFAULT_MAX_AGE_SECS,
            cookie_secure: false,
            authorized_redirect_uris: vec![DEFAULT_FRONTEND_URI.to_string()],
            redirect_path_match: PathMatch::default(),
            default_redirect_uri: DEFAULT_FRONTEND_URI.to_string(),
            login_failure_uri: DEFAULT_FAILURE_URI.to_string(),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            github: None,
            google: None,
            allowed_origins: vec![DEFAULT_FRONTEND_URI.to_string()],
            verbose_auth_errors: false,
            database_url: None,
        }
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        // [library] Load .env file if present - missing file is not an error
        dotenvy::dotenv().ok();

        // [security] Both secrets are REQUIRED - no defaults
        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?;
        let cookie_secret = std::env::var("COOKIE_SECRET")
            .map_err(|_| anyhow::anyhow!("COOKIE_SECRET must be set"))?;

        let defaults = Config::with_secrets(jwt_secret, cookie_secret);

        let config = Config {
            app_host: std::env::var("APP_HOST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.app_host),

            app_port: std::env::var("APP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.app_port),

            jwt_expiration_secs: std::env::var("JWT_EXPIRATION_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs: &i64| *secs > 0)
                .unwrap_or(defaults.jwt_expiration_secs),

            login_state_max_age_secs: std::env::var("LOGIN_STATE_MAX_AGE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs: &i64| *secs > 0)
                .unwrap_or(defaults.login_state_max_age_secs),

            cookie_secure: env_flag("COOKIE_SECURE"),

            authorized_redirect_uris: comma_list(&env_or(
                "AUTHORIZED_REDIRECT_URIS",
                DEFAULT_FRONTEND_URI,
            )),

            // [security] A typo in the match mode must stop startup, not weaken the check
            redirect_path_match: match std::env::var("REDIRECT_PATH_MATCH") {
                Ok(mode) => mode.parse()?,
                Err(_) => defaults.redirect_path_match,
            },

            default_redirect_uri: env_or("DEFAULT_REDIRECT_URI", DEFAULT_FRONTEND_URI),
            login_failure_uri: env_or("LOGIN_FAILURE_URI", DEFAULT_FAILURE_URI),
            public_base_url: env_or("PUBLIC_BASE_URL", DEFAULT_PUBLIC_BASE_URL),

            github: provider_credentials("GITHUB"),
            google: provider_credentials("GOOGLE"),

            allowed_origins: comma_list(&env_or("ALLOWED_ORIGINS", DEFAULT_FRONTEND_URI)),

            verbose_auth_errors: env_flag("VERBOSE_AUTH_ERRORS"),

            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(Secret::new),

            ..defaults
        };

        tracing::info!(
            "Config loaded - Host: {}:{}, Redirect URIs: {}, GitHub: {}, Google: {}, Database: {}",
            config.app_host,
            config.app_port,
            config.authorized_redirect_uris.len(),
            config.github.is_some(),
            config.google.is_some(),
            if config.database_url.is_some() { "postgres" } else { "in-memory" }
        );

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.app_host, self.app_port)
    }

    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.expose_secret().as_bytes()
    }

    pub fn cookie_secret(&self) -> &[u8] {
        self.cookie_secret.expose_secret().as_bytes()
    }

    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_ref().map(|url| url.expose_secret().as_str())
    }
}
