// [business] Uniform JSON body for every rejected request
// Clients always get {timestamp, status, error, message, details, path}; diagnostics are
// opt-in through VERBOSE_AUTH_ERRORS

use crate::security::AuthError;

use axum::{
    http::{
        header::{CACHE_CONTROL, PRAGMA, X_CONTENT_TYPE_OPTIONS},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{error, warn};
use validator::ValidationErrors;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFailure {
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub details: Value,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

// [business] Validation -> 400, authentication -> 401, authorization -> 403,
// unknown provider -> 404, everything infrastructural -> 500
pub fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::DuplicateUsername
        | AuthError::DuplicateEmail
        | AuthError::InvalidRedirectUri
        | AuthError::LoginStateTooLarge { .. } => StatusCode::BAD_REQUEST,

        e if e.is_authentication_failure() => StatusCode::UNAUTHORIZED,

        AuthError::AccessDenied
        | AuthError::UnauthorizedRedirectUri
        | AuthError::InvalidLoginState
        | AuthError::UnsupportedPrincipalType(_)
        | AuthError::ProviderDenied => StatusCode::FORBIDDEN,

        AuthError::UnknownProvider(_) => StatusCode::NOT_FOUND,

        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiFailure {
    pub fn new(status: StatusCode, error: impl Into<String>, message: impl Into<String>, path: &str) -> Self {
        Self {
            timestamp: now_rfc3339(),
            status: status.as_u16(),
            error: error.into(),
            message: message.into(),
            details: Value::Null,
            path: path.to_string(),
            debug_message: None,
            exception: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<Value>) -> Self {
        self.details = details.into();
        self
    }

    // [security] Translate a domain failure; internal error text only appears when verbose
    pub fn from_error(err: &AuthError, path: &str, verbose: bool) -> Self {
        let status = status_for(err);
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(path, "Request failed: {}", err);
            "Internal server error".to_string()
        } else {
            if status == StatusCode::UNAUTHORIZED {
                warn!(path, error = err.tag(), "Authentication failure");
            }
            err.to_string()
        };

        let mut failure = Self::new(status, err.tag(), message, path).with_details(err.details());
        if verbose {
            failure.debug_message = Some(err.to_string());
            failure.exception = Some(format!("AuthError::{}", err.tag()));
        }
        failure
    }

    // [business] Field-level request validation failures, one list of messages per field
    pub fn validation(path: &str, errors: &ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages = errs
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect::<Vec<_>>();
                (field.to_string(), Value::from(messages))
            })
            .collect::<serde_json::Map<_, _>>();

        Self::new(StatusCode::BAD_REQUEST, "ValidationFailed", "Validation failed", path)
            .with_details(Value::Object(fields))
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (status, Json(self)).into_response();

        // [security] Failure bodies must never be cached or content-sniffed
        let headers = response.headers_mut();
        headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        response
    }
}
