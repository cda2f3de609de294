use super::{DelegatedIdentity, NewUser, Provenance, TaskOwnership, UserRecord, UserStore};
use crate::security::AuthError;

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    users: Vec<UserRecord>,
    tasks: HashMap<i64, Option<i64>>,
    next_id: i64,
}

// [business] Volatile store - everything is lost on restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // [business] Seed or reassign a task; None leaves it unassigned
    pub async fn assign_task(&self, task_id: i64, developer_id: Option<i64>) {
        self.inner.write().await.tasks.insert(task_id, developer_id);
    }
}

impl Inner {
    fn insert(&mut self, user: NewUser) -> UserRecord {
        self.next_id += 1;
        let record = UserRecord {
            id: self.next_id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            roles: user.roles,
            provenance: user.provenance,
            provider_id: user.provider_id,
        };
        self.users.push(record.clone());
        record
    }

    fn local(&self) -> impl Iterator<Item = &UserRecord> {
        self.users
            .iter()
            .filter(|user| user.provenance == Provenance::Local)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_local_by_username(&self, username: &str) -> anyhow::Result<Option<UserRecord>> {
        let inner = self.inner.read().await;
        let found = inner.local().find(|user| user.username == username).cloned();
        Ok(found)
    }

    async fn username_exists(&self, username: &str) -> anyhow::Result<bool> {
        let inner = self.inner.read().await;
        let exists = inner.local().any(|user| user.username == username);
        Ok(exists)
    }

    async fn email_exists(&self, email: &str) -> anyhow::Result<bool> {
        let inner = self.inner.read().await;
        let exists = inner
            .local()
            .any(|user| user.email.as_deref() == Some(email));
        Ok(exists)
    }

    async fn create_local(&self, user: NewUser) -> anyhow::Result<UserRecord> {
        // [rust] Check and insert under one write guard so concurrent registrations can't both win
        let mut inner = self.inner.write().await;
        if inner.local().any(|existing| existing.username == user.username) {
            return Err(AuthError::DuplicateUsername.into());
        }
        if let Some(email) = user.email.as_deref() {
            if inner.local().any(|existing| existing.email.as_deref() == Some(email)) {
                return Err(AuthError::DuplicateEmail.into());
            }
        }
        Ok(inner.insert(user))
    }

    async fn find_or_create_delegated(
        &self,
        identity: &DelegatedIdentity,
    ) -> anyhow::Result<UserRecord> {
        let mut inner = self.inner.write().await;
        let existing = inner.users.iter().find(|user| {
            user.provenance == identity.provenance
                && user.provider_id.as_deref() == Some(identity.provider_id.as_str())
        });
        if let Some(user) = existing {
            return Ok(user.clone());
        }

        debug!(
            provenance = identity.provenance.as_str(),
            "Provisioning first-time delegated user"
        );
        Ok(inner.insert(identity.to_new_user()))
    }
}

#[async_trait]
impl TaskOwnership for MemoryStore {
    async fn task_assignee(&self, task_id: i64) -> anyhow::Result<Option<i64>> {
        Ok(self.inner.read().await.tasks.get(&task_id).copied().flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Role;
    use std::collections::BTreeSet;

    fn local_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: Some(email.to_string()),
            password_hash: Some("$argon2id$stub".to_string()),
            roles: BTreeSet::from([Role::Developer]),
            provenance: Provenance::Local,
            provider_id: None,
        }
    }

    fn github_identity(provider_id: &str) -> DelegatedIdentity {
        DelegatedIdentity {
            provenance: Provenance::Github,
            provider_id: provider_id.to_string(),
            display_name: "octocat".to_string(),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_local_user() {
        let store = MemoryStore::new();
        let created = store.create_local(local_user("alice", "alice@example.com")).await.unwrap();
        assert_eq!(created.id, 1);

        let found = store.find_local_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found, created);
        assert!(store.username_exists("alice").await.unwrap());
        assert!(store.email_exists("alice@example.com").await.unwrap());
        assert!(store.find_local_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookups_on_empty_store() {
        let store = MemoryStore::new();
        assert!(store.find_local_by_username("alice").await.unwrap().is_none());
        assert!(!store.username_exists("alice").await.unwrap());
        assert!(!store.email_exists("alice@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicates_are_rejected() {
        let store = MemoryStore::new();
        store.create_local(local_user("alice", "alice@example.com")).await.unwrap();

        let err = store
            .create_local(local_user("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(AuthError::from(err), AuthError::DuplicateUsername));

        let err = store
            .create_local(local_user("alice2", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(AuthError::from(err), AuthError::DuplicateEmail));
    }

    #[tokio::test]
    async fn test_delegated_user_is_provisioned_once() {
        let store = MemoryStore::new();
        let first = store.find_or_create_delegated(&github_identity("583231")).await.unwrap();
        let second = store.find_or_create_delegated(&github_identity("583231")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.roles, BTreeSet::from([Role::Developer]));
        assert_eq!(first.password_hash, None);

        // [business] Delegated users never satisfy local lookups
        assert!(store.find_local_by_username("octocat").await.unwrap().is_none());

        let other = store.find_or_create_delegated(&github_identity("1")).await.unwrap();
        assert_ne!(other.id, first.id);
    }
}
