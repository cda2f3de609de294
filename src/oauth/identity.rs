// [business] Identity normalization - every authenticated party becomes one Principal shape

use crate::db::{DelegatedIdentity, Principal, Provenance, UserRecord, UserStore};
use crate::security::AuthError;

use serde_json::{Map, Value};

// [business] Tagged identity: the only place that distinguishes where a login came from
#[derive(Debug, Clone)]
pub enum Identity {
    Local(UserRecord),
    Delegated(DelegatedIdentity),
}

impl Identity {
    // [business] Resolve to the stored principal, provisioning first-time delegated users
    pub async fn into_principal(self, users: &dyn UserStore) -> Result<Principal, AuthError> {
        match self {
            Identity::Local(record) => Ok(record.into()),
            Identity::Delegated(identity) => {
                let record = users.find_or_create_delegated(&identity).await?;
                Ok(record.into())
            }
        }
    }
}

// [business] Normalize a provider's user-info document
// Identifier: `id` (GitHub, number or string) else `sub` (OIDC)
// Display name: first non-empty of `name`, `login`, `email`
pub fn from_attributes(
    provenance: Provenance,
    attributes: &Map<String, Value>,
) -> Result<DelegatedIdentity, AuthError> {
    let provider_id = ["id", "sub"]
        .iter()
        .find_map(|key| identifier(attributes.get(*key)))
        .ok_or_else(|| {
            AuthError::UnsupportedPrincipalType(format!(
                "{} attributes carry no identifier",
                provenance
            ))
        })?;

    let email = non_empty(attributes, "email");
    let display_name = ["name", "login", "email"]
        .iter()
        .find_map(|key| non_empty(attributes, key))
        .ok_or_else(|| {
            AuthError::UnsupportedPrincipalType(format!(
                "{} attributes carry no usable name",
                provenance
            ))
        })?;

    Ok(DelegatedIdentity {
        provenance,
        provider_id,
        display_name,
        email,
    })
}

fn identifier(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(attributes: &Map<String, Value>, key: &str) -> Option<String> {
    attributes
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, Role};
    use serde_json::json;
    use std::collections::BTreeSet;

    fn attrs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("attributes must be an object"),
        }
    }

    #[test]
    fn test_github_attributes() {
        let identity = from_attributes(
            Provenance::Github,
            &attrs(json!({"id": 583231, "login": "octocat", "name": null, "email": null})),
        )
        .unwrap();

        assert_eq!(identity.provider_id, "583231");
        assert_eq!(identity.display_name, "octocat");
        assert_eq!(identity.email, None);
    }

    #[test]
    fn test_name_takes_priority_over_login_and_email() {
        let identity = from_attributes(
            Provenance::Github,
            &attrs(json!({"id": "42", "login": "octocat", "name": "The Octocat", "email": "o@example.com"})),
        )
        .unwrap();

        assert_eq!(identity.display_name, "The Octocat");
        assert_eq!(identity.email.as_deref(), Some("o@example.com"));
    }

    #[test]
    fn test_oidc_subject_and_email_fallback() {
        let identity = from_attributes(
            Provenance::Google,
            &attrs(json!({"sub": "1029", "name": "  ", "email": "carol@example.com"})),
        )
        .unwrap();

        assert_eq!(identity.provider_id, "1029");
        assert_eq!(identity.display_name, "carol@example.com");
    }

    #[test]
    fn test_unusable_attributes_are_unsupported() {
        let no_id = from_attributes(Provenance::Google, &attrs(json!({"name": "carol"})));
        assert!(matches!(no_id, Err(AuthError::UnsupportedPrincipalType(_))));

        let no_name = from_attributes(Provenance::Github, &attrs(json!({"id": 1, "login": ""})));
        assert!(matches!(no_name, Err(AuthError::UnsupportedPrincipalType(_))));
    }

    #[tokio::test]
    async fn test_delegated_identity_resolves_with_default_role() {
        let store = MemoryStore::new();
        let identity = Identity::Delegated(DelegatedIdentity {
            provenance: Provenance::Github,
            provider_id: "583231".to_string(),
            display_name: "octocat".to_string(),
            email: None,
        });

        let principal = identity.into_principal(&store).await.unwrap();
        assert_eq!(principal.username, "octocat");
        assert_eq!(principal.provenance, Provenance::Github);
        assert_eq!(principal.roles, BTreeSet::from([Role::Developer]));
    }
}
