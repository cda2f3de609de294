// [library] Structured error types with automatic Display and Error trait derivation
use thiserror::Error;

// [security] Every failure the auth core can produce
// Display text is safe to show to clients, internal detail only travels in Store/Internal
#[derive(Debug, Error)]
pub enum AuthError {
    // [business] Validation-shaped failures
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Error: Username is already taken!")]
    DuplicateUsername,
    #[error("Error: Email is already in use!")]
    DuplicateEmail,
    #[error("Invalid redirect URI")]
    InvalidRedirectUri,
    #[error("Login state exceeds {max} bytes")]
    LoginStateTooLarge { max: usize },

    // [security] Authentication-shaped failures
    #[error("Full authentication is required to access this resource")]
    MissingToken,
    #[error("Token has expired")]
    ExpiredToken,
    #[error("Invalid token")]
    MalformedToken,
    #[error("Unsupported token")]
    UnsupportedToken,
    #[error("Invalid token signature")]
    InvalidSignature,
    #[error("Invalid token issuer or audience")]
    InvalidIssuerOrAudience,

    // [security] Authorization-shaped and delegated-login failures
    #[error("Access is denied")]
    AccessDenied,
    #[error("Redirect URI is not authorized")]
    UnauthorizedRedirectUri,
    #[error("Login state is missing or does not match")]
    InvalidLoginState,
    #[error("Unsupported principal type: {0}")]
    UnsupportedPrincipalType(String),
    #[error("Identity provider denied the login")]
    ProviderDenied,
    #[error("Identity provider exchange failed: {0}")]
    ProviderExchange(String),
    #[error("Unknown identity provider: {0}")]
    UnknownProvider(String),

    // [business] Configuration and infrastructure failures
    #[error("Error: Role is not found: {0}")]
    RoleNotFound(String),
    #[error("Store error: {0}")]
    Store(anyhow::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    // [business] Short machine-checkable tag rendered in the `error` field of failure bodies
    pub fn tag(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "InvalidCredentials",
            AuthError::DuplicateUsername => "DuplicateUsername",
            AuthError::DuplicateEmail => "DuplicateEmail",
            AuthError::InvalidRedirectUri => "InvalidRedirectUri",
            AuthError::LoginStateTooLarge { .. } => "LoginStateTooLarge",
            AuthError::MissingToken => "MissingToken",
            AuthError::ExpiredToken => "ExpiredToken",
            AuthError::MalformedToken => "MalformedToken",
            AuthError::UnsupportedToken => "UnsupportedToken",
            AuthError::InvalidSignature => "InvalidSignature",
            AuthError::InvalidIssuerOrAudience => "InvalidIssuerOrAudience",
            AuthError::AccessDenied => "AccessDenied",
            AuthError::UnauthorizedRedirectUri => "UnauthorizedRedirectURI",
            AuthError::InvalidLoginState => "InvalidLoginState",
            AuthError::UnsupportedPrincipalType(_) => "UnsupportedPrincipalType",
            AuthError::ProviderDenied => "ProviderDenied",
            AuthError::ProviderExchange(_) => "ProviderExchange",
            AuthError::UnknownProvider(_) => "UnknownProvider",
            AuthError::RoleNotFound(_) => "RoleNotFound",
            AuthError::Store(_) => "InternalError",
            AuthError::Internal(_) => "InternalError",
        }
    }

    // [security] Longer human-readable explanation - never includes internal error text
    pub fn details(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "The username or password you provided is incorrect.",
            AuthError::MissingToken => "No bearer token was provided with the request.",
            AuthError::ExpiredToken => "The provided JWT token has expired. Please log in again.",
            AuthError::MalformedToken => "The provided JWT token is malformed.",
            AuthError::UnsupportedToken => "The provided JWT token is unsupported.",
            AuthError::InvalidSignature => "The provided JWT token has an invalid signature.",
            AuthError::InvalidIssuerOrAudience => {
                "The provided JWT token was not issued for this service."
            }
            AuthError::AccessDenied => "You do not have permission to perform this operation.",
            AuthError::DuplicateUsername => "Choose a different username.",
            AuthError::DuplicateEmail => "An account with this email already exists.",
            AuthError::InvalidRedirectUri => "The redirect URI must be a non-empty absolute URI.",
            AuthError::LoginStateTooLarge { .. } => "The requested redirect URI is too long.",
            AuthError::UnknownProvider(_) => "The requested identity provider is not configured.",
            _ => "The request could not be completed.",
        }
    }

    // [business] Authentication-shaped failures are the ones rendered with 401
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials
                | AuthError::MissingToken
                | AuthError::ExpiredToken
                | AuthError::MalformedToken
                | AuthError::UnsupportedToken
                | AuthError::InvalidSignature
                | AuthError::InvalidIssuerOrAudience
        )
    }
}

// [rust] Collaborators report failures through anyhow - recover our own variants when they
// were raised deeper in the stack, wrap everything else as a store failure
impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<AuthError>() {
            Ok(auth_error) => auth_error,
            Err(other) => AuthError::Store(other),
        }
    }
}
