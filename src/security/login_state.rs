// [business] Temporary state of one delegated login, carried by the browser between
// "redirect to provider" and "provider callback". Nothing is kept server-side, so any
// instance can finish a flow another instance started.

use crate::security::{error::AuthError, jwt::generate_random_token};

// [library] Base64url keeps the JSON payload cookie-safe
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

// [library] JSON serialization of the state payload
use serde::{Deserialize, Serialize};

// [library] SHA-512 stretches the configured secret into a 64-byte cookie signing key
use sha2::{Digest, Sha512};

use time::OffsetDateTime;

// [library] Cookie jar middleware - signed cookies carry an HMAC of their value
use tower_cookies::{
    cookie::{time::Duration as CookieDuration, SameSite},
    Cookie, Cookies, Key,
};

use tracing::debug;

pub const LOGIN_STATE_COOKIE: &str = "oauth2_login_state";

// [security] Upper bound on the redirect target kept in the cookie
// Keeps the signed, encoded cookie under the 4 KiB browsers accept
pub const MAX_REDIRECT_URI_BYTES: usize = 2048;

// [business] Default lifetime, sized for a provider round-trip
pub const DEFAULT_MAX_AGE_SECS: i64 = 180;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginState {
    pub provider: String,             // [business] Registration id the flow was started for
    pub nonce: String,                // [security] Echoed back by the provider as `state`
    pub redirect_uri: Option<String>, // [business] Desired post-login destination, if any
    pub expires_at: i64,              // [security] Server-side bound in addition to Max-Age
}

pub struct LoginStateStore {
    key: Key,
    max_age_secs: i64,
    secure: bool,
}

impl std::fmt::Debug for LoginStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginStateStore")
            .field("max_age_secs", &self.max_age_secs)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl LoginStateStore {
    pub fn new(secret: &[u8], max_age_secs: i64, secure: bool) -> Result<Self, AuthError> {
        let max_age_secs = max_age_secs.max(1);
        if OffsetDateTime::now_utc()
            .unix_timestamp()
            .checked_add(max_age_secs)
            .is_none()
        {
            return Err(AuthError::Internal(format!(
                "login state max age of {} seconds is out of range",
                max_age_secs
            )));
        }

        let digest = Sha512::digest(secret);
        Ok(Self {
            key: Key::from(digest.as_slice()),
            max_age_secs,
            secure,
        })
    }

    // [business] Start a flow: build the state and hand it to the client as a signed cookie
    pub fn begin(
        &self,
        cookies: &Cookies,
        provider: &str,
        redirect_uri: Option<&str>,
    ) -> Result<LoginState, AuthError> {
        let state = self.new_state(provider, redirect_uri, OffsetDateTime::now_utc())?;
        let cookie = self.state_cookie(encode_state(&state)?);
        cookies.signed(&self.key).add(cookie);

        debug!(
            provider,
            has_redirect = state.redirect_uri.is_some(),
            "Login state cookie issued"
        );
        Ok(state)
    }

    pub fn new_state(
        &self,
        provider: &str,
        redirect_uri: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<LoginState, AuthError> {
        if let Some(uri) = redirect_uri {
            if uri.trim().is_empty() {
                return Err(AuthError::InvalidRedirectUri);
            }
            if uri.len() > MAX_REDIRECT_URI_BYTES {
                return Err(AuthError::LoginStateTooLarge {
                    max: MAX_REDIRECT_URI_BYTES,
                });
            }
        }

        let expires_at = now
            .unix_timestamp()
            .checked_add(self.max_age_secs)
            .ok_or_else(|| AuthError::Internal("login state expiry out of range".to_string()))?;

        Ok(LoginState {
            provider: provider.to_string(),
            nonce: generate_random_token(),
            redirect_uri: redirect_uri.map(str::to_string),
            expires_at,
        })
    }

    // [security] Missing, tampered, undecodable and expired cookies all read as absent
    pub fn read(&self, cookies: &Cookies) -> Option<LoginState> {
        let cookie = cookies.signed(&self.key).get(LOGIN_STATE_COOKIE)?;
        decode_state(cookie.value(), OffsetDateTime::now_utc())
    }

    // [business] None means "no explicit redirect requested" - callers fall back to the default
    pub fn read_redirect_uri(&self, cookies: &Cookies) -> Option<String> {
        self.read(cookies).and_then(|state| state.redirect_uri)
    }

    // [security] Always emit the clearing directive, even when the request carried no cookie
    pub fn clear(&self, cookies: &Cookies) {
        cookies.add(self.removal_cookie());
    }

    fn state_cookie(&self, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::new(LOGIN_STATE_COOKIE, value);
        cookie.set_http_only(true);
        cookie.set_path("/");
        cookie.set_same_site(SameSite::Lax);
        cookie.set_secure(self.secure);
        cookie.set_max_age(CookieDuration::seconds(self.max_age_secs));
        cookie
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::new(LOGIN_STATE_COOKIE, "");
        cookie.set_http_only(true);
        cookie.set_path("/");
        cookie.set_same_site(SameSite::Lax);
        cookie.set_secure(self.secure);
        cookie.set_max_age(CookieDuration::ZERO);
        cookie
    }
}

fn encode_state(state: &LoginState) -> Result<String, AuthError> {
    let json = serde_json::to_vec(state)
        .map_err(|e| AuthError::Internal(format!("login state serialization failed: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_state(value: &str, now: OffsetDateTime) -> Option<LoginState> {
    let bytes = URL_SAFE_NO_PAD.decode(value).ok()?;
    let state: LoginState = serde_json::from_slice(&bytes).ok()?;
    if state.expires_at <= now.unix_timestamp() {
        debug!("Login state cookie has expired");
        return None;
    }
    Some(state)
}
