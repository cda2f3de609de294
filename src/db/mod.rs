// [rust] Module declarations - organize persistence functionality
pub mod memory; // In-process store used when no database is configured, and in tests
pub mod models; // Roles, provenance, stored users and the canonical principal
pub mod postgres; // PostgreSQL-backed store

// [rust] Facade - external code imports from db:: instead of db::models::
pub use memory::MemoryStore;
pub use models::*;
pub use postgres::PgStore;

// [library] async-trait - object-safe async methods, so stores can sit behind Arc<dyn ...>
use async_trait::async_trait;

// [library] SQLx - async PostgreSQL connection pool
use sqlx::{PgPool, Pool, Postgres};
use std::sync::Arc;

// [rust] Shared pool handle, cloned into every store that needs it
pub type Database = Arc<Pool<Postgres>>;

// [business] Establish the pool and bring the schema up to date
pub async fn create_pool(database_url: &str) -> Result<Database, sqlx::Error> {
    let pool = PgPool::connect(database_url).await?;

    // [business] Embedded migrations run on every startup
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(Arc::new(pool))
}

// [business] Principal store consulted by local login, registration and delegated login
// Infrastructure failures travel as anyhow::Error; domain conflicts are AuthError values
// wrapped in it, so callers can recover them with AuthError::from
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_local_by_username(&self, username: &str) -> anyhow::Result<Option<UserRecord>>;

    async fn username_exists(&self, username: &str) -> anyhow::Result<bool>;

    async fn email_exists(&self, email: &str) -> anyhow::Result<bool>;

    async fn create_local(&self, user: NewUser) -> anyhow::Result<UserRecord>;

    // [business] Look up by (provenance, provider id), provisioning on first sight
    async fn find_or_create_delegated(
        &self,
        identity: &DelegatedIdentity,
    ) -> anyhow::Result<UserRecord>;
}

// [business] Resolves the principal a task is assigned to
// Ok(None): no such task, or the task is unassigned
#[async_trait]
pub trait TaskOwnership: Send + Sync {
    async fn task_assignee(&self, task_id: i64) -> anyhow::Result<Option<i64>>;
}
