// [library] Serde - JSON serialization for API responses and token claims
use serde::{Deserialize, Serialize};

// [rust] Ordered set keeps role lists deterministic in tokens and responses
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// [business] Closed role enumeration - every principal holds a subset of these
// Wire form carries the ROLE_ prefix used in token claims and login responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ROLE_ADMIN")]
    Admin,
    #[serde(rename = "ROLE_MANAGER")]
    Manager,
    #[serde(rename = "ROLE_DEVELOPER")]
    Developer,
}

impl Role {
    // [business] Role assigned when nothing (or nothing recognizable) was requested
    pub const BASE: Role = Role::Developer;

    pub const ALL: [Role; 3] = [Role::Admin, Role::Manager, Role::Developer];

    // [business] Wire name stored in the role table and in token claims
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ROLE_ADMIN",
            Role::Manager => "ROLE_MANAGER",
            Role::Developer => "ROLE_DEVELOPER",
        }
    }

    // [security] Exact match on the wire name - used when decoding our own tokens
    pub fn from_claim(value: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.as_str() == value)
    }

    // [business] Lenient match for user input: "admin", "Admin", "ROLE_ADMIN" all resolve
    pub fn from_request(value: &str) -> Option<Role> {
        let normalized = value.trim().to_ascii_uppercase();
        let bare = normalized.strip_prefix("ROLE_").unwrap_or(&normalized);
        match bare {
            "ADMIN" => Some(Role::Admin),
            "MANAGER" => Some(Role::Manager),
            "DEVELOPER" => Some(Role::Developer),
            _ => None,
        }
    }

    // [business] Map requested role strings onto the enumeration
    // Each unrecognized entry falls back to the base role, an absent or empty list yields only the base role
    pub fn resolve_requested(requested: Option<&[String]>) -> BTreeSet<Role> {
        let roles: BTreeSet<Role> = requested
            .unwrap_or_default()
            .iter()
            .map(|value| Role::from_request(value).unwrap_or(Role::BASE))
            .collect();
        with_default_role(roles)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// [business] Invariant shared by every creation path: no principal is ever role-less
pub fn with_default_role(mut roles: BTreeSet<Role>) -> BTreeSet<Role> {
    if roles.is_empty() {
        roles.insert(Role::BASE);
    }
    roles
}

// [business] Where an identity came from - stored credentials or a delegated provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    Local,
    Github,
    Google,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Local => "LOCAL",
            Provenance::Github => "GITHUB",
            Provenance::Google => "GOOGLE",
        }
    }

    pub fn is_delegated(&self) -> bool {
        !matches!(self, Provenance::Local)
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOCAL" => Ok(Provenance::Local),
            "GITHUB" => Ok(Provenance::Github),
            "GOOGLE" => Ok(Provenance::Google),
            other => Err(anyhow::anyhow!("unknown provenance '{}'", other)),
        }
    }
}

// [business] Stored user record as returned by the principal store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,               // [business] Stable identifier - becomes the token subject
    pub username: String,      // [business] Login name (local) or provider display name
    pub email: Option<String>, // [business] Some providers never disclose an email
    pub password_hash: Option<String>, // [security] Argon2id PHC string, None for delegated users
    pub roles: BTreeSet<Role>,
    pub provenance: Provenance,
    pub provider_id: Option<String>, // [business] Provider-side identifier for delegated users
}

// [business] Input for creating a user record
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub roles: BTreeSet<Role>,
    pub provenance: Provenance,
    pub provider_id: Option<String>,
}

// [business] Normalized attributes of an externally authenticated user
// Produced once per callback from the provider's raw user-info document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegatedIdentity {
    pub provenance: Provenance,
    pub provider_id: String,
    pub display_name: String,
    pub email: Option<String>,
}

impl DelegatedIdentity {
    // [business] First-time delegated users are provisioned with the base role only
    pub fn to_new_user(&self) -> NewUser {
        NewUser {
            username: self.display_name.clone(),
            email: self.email.clone(),
            password_hash: None,
            roles: BTreeSet::from([Role::BASE]),
            provenance: self.provenance,
            provider_id: Some(self.provider_id.clone()),
        }
    }
}

// [business] Canonical authenticated identity - downstream code never inspects provenance
// except for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub roles: BTreeSet<Role>,
    pub provenance: Provenance,
}

impl Principal {
    pub fn new(
        id: i64,
        username: impl Into<String>,
        email: Option<String>,
        roles: BTreeSet<Role>,
        provenance: Provenance,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            email,
            roles: with_default_role(roles),
            provenance,
        }
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|role| role.as_str().to_string()).collect()
    }
}

impl From<UserRecord> for Principal {
    fn from(record: UserRecord) -> Self {
        Principal::new(
            record.id,
            record.username,
            record.email,
            record.roles,
            record.provenance,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_requested_roles_yields_base_role() {
        let roles = Role::resolve_requested(None);
        assert_eq!(roles, BTreeSet::from([Role::Developer]));

        let roles = Role::resolve_requested(Some(&[]));
        assert_eq!(roles, BTreeSet::from([Role::Developer]));
    }

    #[test]
    fn test_admin_request_yields_only_admin() {
        let roles = Role::resolve_requested(Some(&["admin".to_string()]));
        assert_eq!(roles, BTreeSet::from([Role::Admin]));
    }

    #[test]
    fn test_role_request_is_case_insensitive() {
        for value in ["manager", "MANAGER", "Manager", "role_manager", "ROLE_MANAGER"] {
            assert_eq!(Role::from_request(value), Some(Role::Manager), "{}", value);
        }
    }

    #[test]
    fn test_unrecognized_role_falls_back_to_base() {
        let requested = vec!["admin".to_string(), "superuser".to_string()];
        let roles = Role::resolve_requested(Some(&requested));
        assert_eq!(roles, BTreeSet::from([Role::Admin, Role::Developer]));
    }

    #[test]
    fn test_claim_names_are_exact() {
        assert_eq!(Role::from_claim("ROLE_ADMIN"), Some(Role::Admin));
        assert_eq!(Role::from_claim("admin"), None);
        assert_eq!(Role::from_claim("ROLE_USER"), None);
    }

    #[test]
    fn test_principal_without_roles_gets_default() {
        let principal = Principal::new(7, "octocat", None, BTreeSet::new(), Provenance::Github);
        assert_eq!(principal.roles, BTreeSet::from([Role::Developer]));
        assert_eq!(principal.role_names(), vec!["ROLE_DEVELOPER".to_string()]);
    }
}
