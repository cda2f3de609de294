// [business] Principal and role model carried inside session tokens
use crate::db::models::{Principal, Role};

// [security] Error taxonomy for token validation outcomes
use crate::security::error::AuthError;

// [library] JOSE kit - JSON Web Signature and JWT implementation for Rust
use josekit::{
    jws::{
        alg::hmac::{HmacJwsSigner, HmacJwsVerifier}, // [security] Keyed-hash signer/verifier pair
        JwsHeader,
        JwsVerifier, // [security] Trait providing raw signature verification
        HS512,       // [security] HMAC with SHA-512 over the shared secret
    },
    jwt::{self, JwtPayload}, // [security] JWT creation utilities
};

// [library] JSON serialization for JWT claims
use serde::{Deserialize, Serialize};
use serde_json::Value;

// [rust] Ordered set keeps decoded roles comparable with Principal roles
use std::collections::BTreeSet;
use std::fmt;

// [library] Time handling for token expiration and timestamps
use time::{Duration, OffsetDateTime};

// [library] UUID generation for unique token identifiers (jti claim)
use uuid::Uuid;

// [library] Base64url decoding of the three compact JWS segments
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

// [security] Fixed issuer and audience - tokens minted elsewhere never validate here
pub const TOKEN_ISSUER: &str = "project-tracker-api";
pub const TOKEN_AUDIENCE: &str = "project-tracker-client";

// [security] Case-sensitive prefix of the Authorization header value
pub const TOKEN_PREFIX: &str = "Bearer ";

// [security] HS512 needs a key at least as long as its 512-bit output
pub const MIN_SECRET_BYTES: usize = 64;

const SIGNING_ALGORITHM: &str = "HS512";

// [business] Claim set carried by every session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub iss: String,        // [security] Issuer - always TOKEN_ISSUER for our tokens
    pub sub: String,        // [business] Subject - principal identifier
    pub aud: String,        // [security] Audience - always TOKEN_AUDIENCE for our tokens
    pub iat: i64,           // [security] Issued at - Unix timestamp
    pub exp: i64,           // [security] Expiration - issued at + configured lifetime
    pub jti: String,        // [security] Unique token identifier for log correlation
    pub roles: Vec<String>, // [business] Role wire names copied from the principal at mint time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>, // [business] Username, display only
}

// [business] Outcome of a successful validation - what the rest of the request sees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedClaims {
    pub subject: String,
    pub username: Option<String>,
    pub roles: BTreeSet<Role>,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl DecodedClaims {
    // [business] Subject as the numeric principal identifier used for ownership checks
    pub fn principal_id(&self) -> Option<i64> {
        self.subject.parse().ok()
    }

    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.subject)
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|role| role.as_str().to_string()).collect()
    }
}

// [security] Issues and validates session tokens with a shared symmetric secret
// Stateless: the secret is read-only after construction, so one instance serves all requests
pub struct TokenCodec {
    signer: HmacJwsSigner,
    verifier: HmacJwsVerifier,
    lifetime: Duration,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // [security] Never print key material
        f.debug_struct("TokenCodec")
            .field("algorithm", &SIGNING_ALGORITHM)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8], lifetime_secs: i64) -> Result<Self, AuthError> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(AuthError::Internal(format!(
                "token secret must be at least {} bytes",
                MIN_SECRET_BYTES
            )));
        }
        if lifetime_secs <= 0 {
            return Err(AuthError::Internal(
                "token lifetime must be positive".to_string(),
            ));
        }
        let lifetime = Duration::seconds(lifetime_secs);
        // [security] Expiry must stay representable for tokens minted from now on
        if OffsetDateTime::now_utc().checked_add(lifetime).is_none() {
            return Err(AuthError::Internal(format!(
                "token lifetime of {} seconds is out of range",
                lifetime_secs
            )));
        }

        let signer = HS512
            .signer_from_bytes(secret)
            .map_err(|e| AuthError::Internal(format!("invalid signing key: {}", e)))?;
        let verifier = HS512
            .verifier_from_bytes(secret)
            .map_err(|e| AuthError::Internal(format!("invalid verification key: {}", e)))?;

        Ok(Self {
            signer,
            verifier,
            lifetime,
        })
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    // [business] Mint a session token for the principal, valid from now for the configured lifetime
    pub fn issue(&self, principal: &Principal) -> Result<String, AuthError> {
        self.issue_at(principal, OffsetDateTime::now_utc())
    }

    pub fn issue_at(&self, principal: &Principal, now: OffsetDateTime) -> Result<String, AuthError> {
        let expires_at = now
            .checked_add(self.lifetime)
            .ok_or_else(|| AuthError::Internal("token expiry out of range".to_string()))?;

        let claims = SessionClaims {
            iss: TOKEN_ISSUER.to_string(),
            sub: principal.id.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            iat: now.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
            roles: principal.role_names(),
            name: Some(principal.username.clone()),
        };

        self.sign(&claims)
    }

    // [security] Sign the claim set as a compact JWS
    fn sign(&self, claims: &SessionClaims) -> Result<String, AuthError> {
        let mut header = JwsHeader::new();
        header.set_token_type("JWT");

        // [library] Transfer all claims from the serialized struct into the JWT payload
        let payload_json = serde_json::to_value(claims)
            .map_err(|e| AuthError::Internal(format!("claims serialization failed: {}", e)))?;
        let mut payload = JwtPayload::new();
        if let Value::Object(map) = payload_json {
            for (key, value) in map {
                payload
                    .set_claim(&key, Some(value))
                    .map_err(|e| AuthError::Internal(format!("invalid claim {}: {}", key, e)))?;
            }
        }

        jwt::encode_with_signer(&payload, &header, &self.signer)
            .map_err(|e| AuthError::Internal(format!("token signing failed: {}", e)))
    }

    // [security] Validate a token against the current time
    pub fn validate(&self, token: &str) -> Result<DecodedClaims, AuthError> {
        self.validate_at(token, OffsetDateTime::now_utc())
    }

    // [security] Structure, signature, issuer, audience, expiry - in that order, first failure wins
    // A token that does not split into exactly three segments is malformed, so a stray '.'
    // inside the signature reads as MalformedToken rather than InvalidSignature
    pub fn validate_at(&self, token: &str, now: OffsetDateTime) -> Result<DecodedClaims, AuthError> {
        let mut segments = token.split('.');
        let (header_b64, payload_b64, signature_b64) =
            match (segments.next(), segments.next(), segments.next(), segments.next()) {
                (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() => (h, p, s),
                _ => return Err(AuthError::MalformedToken),
            };

        // [security] Header must decode and name exactly our algorithm ("none" included in the rejects)
        let header = decode_json_segment(header_b64)?;
        let algorithm = header
            .get("alg")
            .and_then(Value::as_str)
            .ok_or(AuthError::MalformedToken)?;
        if algorithm != SIGNING_ALGORITHM {
            return Err(AuthError::UnsupportedToken);
        }

        let claims: SessionClaims = serde_json::from_value(decode_json_segment(payload_b64)?)
            .map_err(|_| AuthError::MalformedToken)?;

        // [security] Verify the keyed hash over "header.payload"
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AuthError::InvalidSignature)?;
        let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];
        self.verifier
            .verify(signing_input.as_bytes(), &signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        if claims.iss != TOKEN_ISSUER || claims.aud != TOKEN_AUDIENCE {
            return Err(AuthError::InvalidIssuerOrAudience);
        }

        // [security] No leeway: a token is valid strictly before its expiry
        if now.unix_timestamp() >= claims.exp {
            return Err(AuthError::ExpiredToken);
        }

        Ok(DecodedClaims {
            subject: claims.sub,
            username: claims.name,
            // [business] Role claims baked in at mint time stay authoritative until expiry
            roles: claims
                .roles
                .iter()
                .filter_map(|name| Role::from_claim(name))
                .collect(),
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }

    // [security] Pull the token out of an Authorization header value
    // Absence is not an error - public routes stay reachable without credentials
    pub fn extract_from_header(header_value: &str) -> Option<&str> {
        header_value
            .strip_prefix(TOKEN_PREFIX)
            .filter(|token| !token.is_empty())
    }
}

// [library] Decode one base64url segment into a JSON object
fn decode_json_segment(segment: &str) -> Result<Value, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::MalformedToken)?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|_| AuthError::MalformedToken)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(AuthError::MalformedToken)
    }
}

// [security] Generate cryptographically secure random token
// Used for the CSRF nonce carried through the delegated login round-trip
pub fn generate_random_token() -> String {
    use rand::Rng; // [library] Random number generation trait

    // [security] 32 bytes (256 bits) of randomness from the thread-local CSPRNG
    let random_bytes: [u8; 32] = rand::thread_rng().gen();

    // [library] Encode as base64url without padding for URL safety
    URL_SAFE_NO_PAD.encode(random_bytes)
}

// [rust] Unit tests for token issuance and validation
#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Provenance;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET, 3600).expect("Failed to build codec")
    }

    fn developer() -> Principal {
        Principal::new(
            42,
            "dev42",
            Some("dev42@example.com".to_string()),
            BTreeSet::from([Role::Developer]),
            Provenance::Local,
        )
    }

    fn encode_segment(value: &Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    #[test]
    fn test_round_trip_preserves_subject_and_roles() {
        let codec = codec();
        let principal = Principal::new(
            7,
            "lead",
            None,
            BTreeSet::from([Role::Admin, Role::Manager]),
            Provenance::Local,
        );

        let token = codec.issue(&principal).expect("Failed to issue token");
        let claims = codec.validate(&token).expect("Token should validate");

        assert_eq!(claims.subject, "7");
        assert_eq!(claims.principal_id(), Some(7));
        assert_eq!(claims.roles, principal.roles);
        assert_eq!(claims.username.as_deref(), Some("lead"));
        assert_eq!(claims.expires_at - claims.issued_at, 3600);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let codec = codec();
        let minted_at = OffsetDateTime::now_utc() - Duration::hours(2);
        let token = codec.issue_at(&developer(), minted_at).unwrap();

        assert!(matches!(codec.validate(&token), Err(AuthError::ExpiredToken)));

        // [security] Boundary: exactly at expiry is already invalid
        let at_expiry = minted_at + Duration::seconds(3600);
        assert!(matches!(
            codec.validate_at(&token, at_expiry),
            Err(AuthError::ExpiredToken)
        ));
        assert!(codec
            .validate_at(&token, at_expiry - Duration::seconds(1))
            .is_ok());
    }

    #[test]
    fn test_tampered_signature_is_rejected() {
        let codec = codec();
        let token = codec.issue(&developer()).unwrap();
        let signature_start = token.rfind('.').unwrap() + 1;

        // [security] Flip one character in the middle of the signature segment
        let mut bytes = token.clone().into_bytes();
        let index = signature_start + 10;
        bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert!(matches!(
            codec.validate(&tampered),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let codec = codec();
        let token = codec.issue(&developer()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        // [security] Privilege escalation attempt: swap in an admin role claim
        let mut payload = decode_json_segment(parts[1]).unwrap();
        payload["roles"] = serde_json::json!(["ROLE_ADMIN"]);
        let forged = format!("{}.{}.{}", parts[0], encode_segment(&payload), parts[2]);

        assert!(matches!(
            codec.validate(&forged),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_foreign_issuer_or_audience_is_rejected() {
        let codec = codec();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let base = SessionClaims {
            iss: TOKEN_ISSUER.to_string(),
            sub: "42".to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            iat: now,
            exp: now + 600,
            jti: Uuid::new_v4().to_string(),
            roles: vec!["ROLE_DEVELOPER".to_string()],
            name: None,
        };

        let foreign_issuer = SessionClaims {
            iss: "someone-else".to_string(),
            ..base.clone()
        };
        let token = codec.sign(&foreign_issuer).unwrap();
        assert!(matches!(
            codec.validate(&token),
            Err(AuthError::InvalidIssuerOrAudience)
        ));

        let foreign_audience = SessionClaims {
            aud: "another-client".to_string(),
            ..base.clone()
        };
        let token = codec.sign(&foreign_audience).unwrap();
        assert!(matches!(
            codec.validate(&token),
            Err(AuthError::InvalidIssuerOrAudience)
        ));

        // [security] Issuer check happens before expiry
        let expired_foreign = SessionClaims {
            iss: "someone-else".to_string(),
            exp: now - 600,
            ..base
        };
        let token = codec.sign(&expired_foreign).unwrap();
        assert!(matches!(
            codec.validate(&token),
            Err(AuthError::InvalidIssuerOrAudience)
        ));
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let other = TokenCodec::new(&[b'x'; 64], 3600).unwrap();
        let token = other.issue(&developer()).unwrap();

        assert!(matches!(
            codec().validate(&token),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_malformed_tokens_are_rejected() {
        let codec = codec();
        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.###.$$$", ".payload.sig"] {
            assert!(
                matches!(codec.validate(token), Err(AuthError::MalformedToken)),
                "token {:?} should be malformed",
                token
            );
        }
    }

    #[test]
    fn test_unsigned_and_foreign_algorithms_are_unsupported() {
        let codec = codec();
        let payload = encode_segment(&serde_json::json!({"sub": "1"}));

        for alg in ["none", "HS256", "RS256"] {
            let header = encode_segment(&serde_json::json!({"alg": alg, "typ": "JWT"}));
            let token = format!("{}.{}.", header, payload);
            assert!(
                matches!(codec.validate(&token), Err(AuthError::UnsupportedToken)),
                "alg {} should be unsupported",
                alg
            );
        }
    }

    #[test]
    fn test_extract_from_header() {
        assert_eq!(TokenCodec::extract_from_header("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(TokenCodec::extract_from_header("bearer abc.def.ghi"), None);
        assert_eq!(TokenCodec::extract_from_header("Basic dXNlcjpwYXNz"), None);
        assert_eq!(TokenCodec::extract_from_header("Bearer "), None);
        assert_eq!(TokenCodec::extract_from_header(""), None);
    }

    #[test]
    fn test_dot_inside_signature_is_malformed() {
        let codec = codec();
        let token = codec.issue(&developer()).unwrap();
        let signature_start = token.rfind('.').unwrap() + 1;

        let mut bytes = token.into_bytes();
        bytes[signature_start + 10] = b'.';
        let tampered = String::from_utf8(bytes).unwrap();

        assert!(matches!(
            codec.validate(&tampered),
            Err(AuthError::MalformedToken)
        ));
    }

    #[test]
    fn test_short_secret_is_rejected() {
        assert!(TokenCodec::new(b"too-short", 3600).is_err());
        assert!(TokenCodec::new(SECRET, 0).is_err());
    }

    #[test]
    fn test_unrepresentable_lifetime_is_rejected() {
        assert!(matches!(
            TokenCodec::new(SECRET, i64::MAX),
            Err(AuthError::Internal(_))
        ));
    }

    #[test]
    fn test_expiry_overflow_is_an_error() {
        let codec = TokenCodec::new(SECRET, 86_400).unwrap();
        let end_of_time = time::PrimitiveDateTime::MAX.assume_utc();

        assert!(matches!(
            codec.issue_at(&developer(), end_of_time),
            Err(AuthError::Internal(_))
        ));
    }

    #[test]
    fn test_generate_random_token() {
        let token1 = generate_random_token();
        let token2 = generate_random_token();

        assert_ne!(token1, token2);
        // [library] Base64 encoding of 32 bytes is 43 characters without padding
        assert_eq!(token1.len(), 43);
    }
}
