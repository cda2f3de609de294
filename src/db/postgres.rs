use super::{Database, DelegatedIdentity, NewUser, Role, TaskOwnership, UserRecord, UserStore};
use crate::security::AuthError;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{query, query_as, query_scalar, FromRow, Postgres, Transaction};
use std::collections::BTreeSet;

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: Option<String>,
    password_hash: Option<String>,
    provenance: String,
    provider_id: Option<String>,
    roles: Vec<String>,
}

impl UserRow {
    fn into_record(self) -> Result<UserRecord> {
        let roles = self
            .roles
            .iter()
            .filter_map(|name| Role::from_claim(name))
            .collect::<BTreeSet<_>>();

        Ok(UserRecord {
            id: self.id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            roles,
            provenance: self.provenance.parse()?,
            provider_id: self.provider_id,
        })
    }
}

const SELECT_USER: &str = r#"
    SELECT u.id, u.username, u.email, u.password_hash, u.provenance, u.provider_id,
           COALESCE(ARRAY_AGG(r.name) FILTER (WHERE r.name IS NOT NULL), '{}') AS roles
    FROM users u
    LEFT JOIN user_roles ur ON ur.user_id = u.id
    LEFT JOIN roles r ON r.id = ur.role_id
"#;

// [business] PostgreSQL-backed principal and task store
#[derive(Debug, Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn find_delegated(&self, identity: &DelegatedIdentity) -> Result<Option<UserRecord>> {
        let sql = format!(
            "{} WHERE u.provenance = $1 AND u.provider_id = $2 GROUP BY u.id",
            SELECT_USER
        );
        let row = query_as::<_, UserRow>(&sql)
            .bind(identity.provenance.as_str())
            .bind(&identity.provider_id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(UserRow::into_record).transpose()
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserRecord> {
        let mut tx = self.db.begin().await?;

        let id: i64 = query_scalar(
            r#"INSERT INTO users (username, email, password_hash, provenance, provider_id)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id"#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.provenance.as_str())
        .bind(&user.provider_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert user")?;

        for role in &user.roles {
            attach_role(&mut tx, id, *role).await?;
        }

        tx.commit().await?;

        Ok(UserRecord {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            roles: user.roles,
            provenance: user.provenance,
            provider_id: user.provider_id,
        })
    }
}

// [business] Role rows are seeded by migration - a missing one is a configuration error
async fn attach_role(tx: &mut Transaction<'_, Postgres>, user_id: i64, role: Role) -> Result<()> {
    let role_id: Option<i64> = query_scalar("SELECT id FROM roles WHERE name = $1")
        .bind(role.as_str())
        .fetch_optional(&mut **tx)
        .await?;

    let role_id = role_id.ok_or_else(|| AuthError::RoleNotFound(role.as_str().to_string()))?;

    query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
        .bind(user_id)
        .bind(role_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

// [business] Unique constraints on users, by the conflict each one signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conflict {
    Username,
    Email,
    ProviderIdentity,
}

impl Conflict {
    fn from_constraint(constraint: &str) -> Option<Self> {
        match constraint {
            "users_local_username_key" => Some(Conflict::Username),
            "users_local_email_key" => Some(Conflict::Email),
            "users_provider_identity_key" => Some(Conflict::ProviderIdentity),
            _ => None,
        }
    }

    fn into_auth_error(self) -> Option<AuthError> {
        match self {
            Conflict::Username => Some(AuthError::DuplicateUsername),
            Conflict::Email => Some(AuthError::DuplicateEmail),
            Conflict::ProviderIdentity => None,
        }
    }
}

// [rust] Map a unique-constraint violation onto the conflict it represents
fn conflict(err: &anyhow::Error) -> Option<Conflict> {
    let db_err = err.downcast_ref::<sqlx::Error>()?.as_database_error()?;
    if !db_err.is_unique_violation() {
        return None;
    }
    db_err.constraint().and_then(Conflict::from_constraint)
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_local_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let sql = format!(
            "{} WHERE u.provenance = 'LOCAL' AND u.username = $1 GROUP BY u.id",
            SELECT_USER
        );
        let row = query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(UserRow::into_record).transpose()
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        let exists: bool = query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE provenance = 'LOCAL' AND username = $1)",
        )
        .bind(username)
        .fetch_one(self.db.as_ref())
        .await?;

        Ok(exists)
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        let exists: bool = query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE provenance = 'LOCAL' AND email = $1)",
        )
        .bind(email)
        .fetch_one(self.db.as_ref())
        .await?;

        Ok(exists)
    }

    async fn create_local(&self, user: NewUser) -> Result<UserRecord> {
        match self.insert_user(user).await {
            Ok(record) => Ok(record),
            Err(err) => match conflict(&err).and_then(Conflict::into_auth_error) {
                Some(domain) => Err(domain.into()),
                None => Err(err),
            },
        }
    }

    async fn find_or_create_delegated(&self, identity: &DelegatedIdentity) -> Result<UserRecord> {
        if let Some(record) = self.find_delegated(identity).await? {
            return Ok(record);
        }

        tracing::debug!(
            provenance = identity.provenance.as_str(),
            "Provisioning first-time delegated user"
        );
        match self.insert_user(identity.to_new_user()).await {
            Ok(record) => Ok(record),
            // [business] A concurrent first login inserted the same provider user - reuse its row
            Err(err) if conflict(&err) == Some(Conflict::ProviderIdentity) => {
                tracing::debug!(
                    provenance = identity.provenance.as_str(),
                    "Delegated user provisioned concurrently, reloading"
                );
                self.find_delegated(identity)
                    .await?
                    .ok_or_else(|| anyhow!("delegated user vanished after a provider identity conflict"))
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl TaskOwnership for PgStore {
    async fn task_assignee(&self, task_id: i64) -> Result<Option<i64>> {
        let assignee: Option<Option<i64>> =
            query_scalar("SELECT developer_id FROM tasks WHERE id = $1")
                .bind(task_id)
                .fetch_optional(self.db.as_ref())
                .await?;

        Ok(assignee.flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Provenance;

    #[test]
    fn test_row_maps_known_roles_only() {
        let row = UserRow {
            id: 3,
            username: "carol".to_string(),
            email: Some("carol@example.com".to_string()),
            password_hash: None,
            provenance: "GOOGLE".to_string(),
            provider_id: Some("1029".to_string()),
            roles: vec!["ROLE_MANAGER".to_string(), "ROLE_AUDITOR".to_string()],
        };

        let record = row.into_record().unwrap();
        assert_eq!(record.provenance, Provenance::Google);
        assert_eq!(record.roles, BTreeSet::from([Role::Manager]));
    }

    #[test]
    fn test_unknown_provenance_is_an_error() {
        let row = UserRow {
            id: 4,
            username: "dave".to_string(),
            email: None,
            password_hash: None,
            provenance: "LDAP".to_string(),
            provider_id: None,
            roles: vec![],
        };

        assert!(row.into_record().is_err());
    }

    #[test]
    fn test_constraint_names_map_to_conflicts() {
        assert_eq!(
            Conflict::from_constraint("users_local_username_key"),
            Some(Conflict::Username)
        );
        assert_eq!(
            Conflict::from_constraint("users_local_email_key"),
            Some(Conflict::Email)
        );
        assert_eq!(
            Conflict::from_constraint("users_provider_identity_key"),
            Some(Conflict::ProviderIdentity)
        );
        assert_eq!(Conflict::from_constraint("user_roles_pkey"), None);
    }

    #[test]
    fn test_provider_identity_conflict_is_not_a_registration_error() {
        assert!(matches!(
            Conflict::Username.into_auth_error(),
            Some(AuthError::DuplicateUsername)
        ));
        assert!(matches!(
            Conflict::Email.into_auth_error(),
            Some(AuthError::DuplicateEmail)
        ));
        // [business] Resolved by reloading the existing row, never surfaced to the caller
        assert!(Conflict::ProviderIdentity.into_auth_error().is_none());
    }

    #[test]
    fn test_non_database_errors_are_not_conflicts() {
        assert_eq!(conflict(&anyhow!("connection reset")), None);
        assert_eq!(conflict(&anyhow::Error::new(sqlx::Error::RowNotFound)), None);
    }
}
