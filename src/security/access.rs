// [business] Role and ownership checks guarding protected operations
// Decisions are values: callers decide how a denial is rendered

use crate::db::{Principal, Role, TaskOwnership};
use crate::security::jwt::DecodedClaims;

use serde::Serialize;
use std::collections::BTreeSet;
use std::future::Future;
use tracing::{debug, warn};

// [business] Roles that act on any task regardless of assignment
pub const TASK_MANAGERS: [Role; 2] = [Role::Admin, Role::Manager];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionReason {
    RoleGranted,
    OwnerGranted,
    MissingRole,
    NotOwner,
    ResourceNotFound,
    LookupFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl AccessDecision {
    fn allow(reason: DecisionReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    fn deny(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

// [rust] Anything carrying an identifier and a role set can be checked
pub trait AccessSubject {
    fn subject_id(&self) -> Option<i64>;
    fn roles(&self) -> &BTreeSet<Role>;
}

impl AccessSubject for DecodedClaims {
    fn subject_id(&self) -> Option<i64> {
        self.principal_id()
    }

    fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }
}

impl AccessSubject for Principal {
    fn subject_id(&self) -> Option<i64> {
        Some(self.id)
    }

    fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }
}

// [security] Allowed iff the subject holds at least one of the required roles
pub fn authorize_role<S: AccessSubject + ?Sized>(subject: &S, required: &[Role]) -> AccessDecision {
    if required.iter().any(|role| subject.roles().contains(role)) {
        AccessDecision::allow(DecisionReason::RoleGranted)
    } else {
        AccessDecision::deny(DecisionReason::MissingRole)
    }
}

// [security] Role check first - the owner lookup only runs when no role grants access
// `lookup_owner` resolves the resource's owner id: Ok(None) covers both a missing resource
// and an unassigned one
pub async fn authorize_resource_owner_or_role<S, F, Fut>(
    subject: &S,
    required: &[Role],
    lookup_owner: F,
) -> AccessDecision
where
    S: AccessSubject + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<Option<i64>>>,
{
    let by_role = authorize_role(subject, required);
    if by_role.allowed {
        return by_role;
    }

    let owner = match lookup_owner().await {
        Ok(Some(owner)) => owner,
        Ok(None) => return AccessDecision::deny(DecisionReason::ResourceNotFound),
        Err(e) => {
            warn!("Owner lookup failed, denying access: {:#}", e);
            return AccessDecision::deny(DecisionReason::LookupFailed);
        }
    };

    match subject.subject_id() {
        Some(id) if id == owner => AccessDecision::allow(DecisionReason::OwnerGranted),
        _ => AccessDecision::deny(DecisionReason::NotOwner),
    }
}

// [business] Admins and managers act on any task, developers only on tasks assigned to them
pub async fn task_access<S: AccessSubject + ?Sized>(
    subject: &S,
    tasks: &dyn TaskOwnership,
    task_id: i64,
) -> AccessDecision {
    let decision =
        authorize_resource_owner_or_role(subject, &TASK_MANAGERS, || tasks.task_assignee(task_id))
            .await;
    debug!(task_id, allowed = decision.allowed, reason = ?decision.reason, "Task access evaluated");
    decision
}
