//! Trait seams for external systems this engine deliberately does not own
//! (spec §1 Non-goals, §6 "Collaborator contracts"): auth/session minting,
//! billing/subscription tiers. Production wires a real implementation at
//! startup; tests and `serve --dev` use the in-memory stubs below.
//!
//! Grounded on the pack's pattern of abstracting an external provider
//! behind a trait object rather than depending on its SDK directly (the
//! same shape as an LLM-provider factory elsewhere in the corpus).

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use db::DbPool;

/// A verified caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub subscription_id: Uuid,
}

/// Resolves a bearer token into a `Session`. Real auth/session minting is
/// out of scope here (spec §1); this is the seam the `api` crate's auth
/// middleware calls.
#[async_trait]
pub trait VerifySession: Send + Sync {
    async fn verify(&self, token: &str) -> Option<Session>;
}

/// A workflow's current subscription tier, used by the dispatcher for quota
/// admission (spec §4.7). Stripe/billing integration is out of scope (spec
/// §1); only the lookup seam lives here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier {
    pub max_concurrent_executions: u32,
    pub max_executions_per_period: u64,
}

#[async_trait]
pub trait GetActiveTier: Send + Sync {
    async fn tier_for(&self, subscription_id: Uuid) -> Tier;
}

/// Whether a subscription may admit one more execution right now. Composes
/// `GetActiveTier` with a usage lookup; kept as its own trait so the
/// dispatcher's admission check doesn't need to know how quota accounting
/// is implemented.
#[async_trait]
pub trait SubscriptionGate: Send + Sync {
    async fn admit(&self, subscription_id: Uuid) -> Result<(), QuotaExceeded>;
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("subscription {subscription_id} has exceeded its execution quota")]
pub struct QuotaExceeded {
    pub subscription_id: Uuid,
}

/// The resource counted against `Tier::max_executions_per_period` (spec
/// §4.7 step 2).
const EXECUTIONS_RESOURCE: &str = "executions";

/// Production `SubscriptionGate`: reads the caller's tier from the injected
/// [`GetActiveTier`], then compares the current period's usage counter
/// (`db::repository::usage`) against `max_executions_per_period`. Does not
/// itself increment the counter — that happens only once the execution row
/// actually exists (spec §4.7 step 5), via [`record_execution_started`].
pub struct UsageSubscriptionGate {
    pool: DbPool,
    tiers: std::sync::Arc<dyn GetActiveTier>,
}

impl UsageSubscriptionGate {
    pub fn new(pool: DbPool, tiers: std::sync::Arc<dyn GetActiveTier>) -> Self {
        Self { pool, tiers }
    }
}

#[async_trait]
impl SubscriptionGate for UsageSubscriptionGate {
    async fn admit(&self, subscription_id: Uuid) -> Result<(), QuotaExceeded> {
        let tier = self.tiers.tier_for(subscription_id).await;
        let used = db::repository::usage::get_usage(&self.pool, subscription_id, EXECUTIONS_RESOURCE, &current_period())
            .await
            .unwrap_or(0);

        if used as u64 >= tier.max_executions_per_period {
            return Err(QuotaExceeded { subscription_id });
        }
        Ok(())
    }
}

/// Record that one execution was admitted for `subscription_id` (spec §4.7
/// step 5). Called by the dispatcher after the execution row is created,
/// never by `admit` itself, so a caller who checks quota but then fails to
/// create the row (e.g. unknown workflow) never burns a unit of quota.
pub async fn record_execution_started(pool: &DbPool, subscription_id: Uuid) -> Result<(), db::DbError> {
    db::repository::usage::increment_usage(pool, subscription_id, EXECUTIONS_RESOURCE, &current_period(), 1).await?;
    Ok(())
}

/// Calendar-month period key (`"YYYY-MM"`) used to bucket the usage counter.
fn current_period() -> String {
    Utc::now().format("%Y-%m").to_string()
}

/// A [`GetActiveTier`] that returns the same fixed tier for every
/// subscription — used in tests and single-tenant/dev deployments that
/// don't integrate real billing.
pub struct FixedTier(pub Tier);

#[async_trait]
impl GetActiveTier for FixedTier {
    async fn tier_for(&self, _subscription_id: Uuid) -> Tier {
        self.0
    }
}

/// Deterministic in-memory stub: every token of the form `"user:<uuid>"`
/// verifies to a session for that user with a fixed subscription id.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, token: impl Into<String>, session: Session) {
        self.sessions.write().unwrap().insert(token.into(), session);
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VerifySession for InMemorySessionStore {
    async fn verify(&self, token: &str) -> Option<Session> {
        self.sessions.read().unwrap().get(token).cloned()
    }
}

/// A gate that always admits — used in tests and single-tenant/dev
/// deployments that don't enforce quotas.
pub struct AlwaysAdmit;

#[async_trait]
impl SubscriptionGate for AlwaysAdmit {
    async fn admit(&self, _subscription_id: Uuid) -> Result<(), QuotaExceeded> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_session_store_round_trips() {
        let store = InMemorySessionStore::new();
        let session = Session {
            user_id: Uuid::new_v4(),
            subscription_id: Uuid::new_v4(),
        };
        store.insert("token-1", session.clone());

        assert_eq!(store.verify("token-1").await, Some(session));
        assert_eq!(store.verify("missing").await, None);
    }

    #[tokio::test]
    async fn always_admit_never_rejects() {
        assert!(AlwaysAdmit.admit(Uuid::new_v4()).await.is_ok());
    }
}
