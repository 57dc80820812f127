use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Spend-tracking period for a budget scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BudgetPeriod {
    Daily,
    Monthly,
    Total,
}

impl BudgetPeriod {
    pub const ALL: [BudgetPeriod; 3] = [Self::Daily, Self::Monthly, Self::Total];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Monthly => "MONTHLY",
            Self::Total => "TOTAL",
        }
    }
}

/// A spend quota for one (scope type, scope id, period) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub scope_type: String,
    pub scope_id: String,
    pub period: BudgetPeriod,
    pub limit_usd: f64,
    /// Never decreases within a period; only `record_usage` mutates it.
    pub spent_usd: f64,
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    pub fn id(&self) -> String {
        budget_key(&self.scope_type, &self.scope_id, self.period)
    }

    pub fn remaining(&self) -> f64 {
        self.limit_usd - self.spent_usd
    }
}

fn budget_key(scope_type: &str, scope_id: &str, period: BudgetPeriod) -> String {
    format!("{}:{}:{}", scope_type, scope_id, period.as_str())
}

/// Result of a non-mutating budget check.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetCheck {
    pub allowed: bool,
    pub remaining: f64,
    pub budget_id: String,
}

/// Backing store for budgets. Period rollover is the store's concern; the
/// service only reads, caches, and atomically increments.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    /// Fetch the budget for a scope, creating a default one if none exists.
    async fn fetch(
        &self,
        scope_type: &str,
        scope_id: &str,
        period: BudgetPeriod,
    ) -> warden_core::Result<Budget>;

    /// Atomically add to the spent total for every period of a scope.
    async fn add_spent(
        &self,
        scope_type: &str,
        scope_id: &str,
        amount_usd: f64,
    ) -> warden_core::Result<()>;
}

/// In-memory store: budgets appear lazily with a configurable default limit.
pub struct MemoryBudgetStore {
    default_limit_usd: f64,
    budgets: Mutex<HashMap<String, Budget>>,
}

impl MemoryBudgetStore {
    pub fn new(default_limit_usd: f64) -> Self {
        Self {
            default_limit_usd,
            budgets: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-register a budget with a custom limit.
    pub fn set_limit(&self, scope_type: &str, scope_id: &str, period: BudgetPeriod, limit: f64) {
        let key = budget_key(scope_type, scope_id, period);
        let mut budgets = self.budgets.lock();
        let entry = budgets.entry(key).or_insert_with(|| Budget {
            scope_type: scope_type.to_string(),
            scope_id: scope_id.to_string(),
            period,
            limit_usd: limit,
            spent_usd: 0.0,
            updated_at: Utc::now(),
        });
        entry.limit_usd = limit;
    }
}

#[async_trait]
impl BudgetStore for MemoryBudgetStore {
    async fn fetch(
        &self,
        scope_type: &str,
        scope_id: &str,
        period: BudgetPeriod,
    ) -> warden_core::Result<Budget> {
        let key = budget_key(scope_type, scope_id, period);
        let mut budgets = self.budgets.lock();
        let budget = budgets.entry(key).or_insert_with(|| Budget {
            scope_type: scope_type.to_string(),
            scope_id: scope_id.to_string(),
            period,
            limit_usd: self.default_limit_usd,
            spent_usd: 0.0,
            updated_at: Utc::now(),
        });
        Ok(budget.clone())
    }

    async fn add_spent(
        &self,
        scope_type: &str,
        scope_id: &str,
        amount_usd: f64,
    ) -> warden_core::Result<()> {
        let mut budgets = self.budgets.lock();
        for period in BudgetPeriod::ALL {
            let key = budget_key(scope_type, scope_id, period);
            let entry = budgets.entry(key).or_insert_with(|| Budget {
                scope_type: scope_type.to_string(),
                scope_id: scope_id.to_string(),
                period,
                limit_usd: self.default_limit_usd,
                spent_usd: 0.0,
                updated_at: Utc::now(),
            });
            entry.spent_usd += amount_usd;
            entry.updated_at = Utc::now();
        }
        Ok(())
    }
}

struct CacheEntry {
    budget: Budget,
    fetched_at: Instant,
}

/// Tracks spend quotas per (scope type, scope id, period) with a short read
/// cache in front of the backing store.
pub struct BudgetService {
    store: Arc<dyn BudgetStore>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    cache_ttl: Duration,
    /// Bumped on every `record_usage` so an in-flight fetch that started
    /// before the spend cannot insert its stale snapshot afterwards.
    generation: AtomicU64,
}

impl BudgetService {
    pub fn new(store: Arc<dyn BudgetStore>, cache_ttl: Duration) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
            cache_ttl,
            generation: AtomicU64::new(0),
        }
    }

    /// In-memory service with the given default per-scope limit.
    pub fn in_memory(default_limit_usd: f64, cache_ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryBudgetStore::new(default_limit_usd)), cache_ttl)
    }

    /// Get the budget for a scope, served from cache when fresh.
    pub async fn get_budget(
        &self,
        scope_type: &str,
        scope_id: &str,
        period: BudgetPeriod,
    ) -> warden_core::Result<Budget> {
        let key = budget_key(scope_type, scope_id, period);
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.get(&key) {
                if entry.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(entry.budget.clone());
                }
            }
        }

        let gen_before = self.generation.load(Ordering::Acquire);
        let budget = self.store.fetch(scope_type, scope_id, period).await?;
        {
            let mut cache = self.cache.lock();
            // a record_usage landed while we were fetching; this snapshot
            // predates it, so keep it out of the cache
            if self.generation.load(Ordering::Acquire) == gen_before {
                cache.insert(
                    key,
                    CacheEntry {
                        budget: budget.clone(),
                        fetched_at: Instant::now(),
                    },
                );
            }
        }
        Ok(budget)
    }

    /// Check whether an estimated cost fits the remaining monthly budget.
    /// Never mutates anything.
    pub async fn check_budget(
        &self,
        scope_type: &str,
        scope_id: &str,
        estimated_cost_usd: f64,
    ) -> warden_core::Result<BudgetCheck> {
        let budget = self
            .get_budget(scope_type, scope_id, BudgetPeriod::Monthly)
            .await?;
        let remaining = budget.remaining();
        let allowed = remaining >= estimated_cost_usd;
        if !allowed {
            warn!(
                scope = %budget.id(),
                remaining,
                required = estimated_cost_usd,
                "budget check failed"
            );
        }
        Ok(BudgetCheck {
            allowed,
            remaining,
            budget_id: budget.id(),
        })
    }

    /// Record actual spend: atomic increment in the store, then invalidate
    /// every cached period for the scope so the next read is fresh.
    pub async fn record_usage(
        &self,
        scope_type: &str,
        scope_id: &str,
        actual_cost_usd: f64,
        details: serde_json::Value,
    ) -> warden_core::Result<()> {
        self.store
            .add_spent(scope_type, scope_id, actual_cost_usd)
            .await?;

        let mut cache = self.cache.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        for period in BudgetPeriod::ALL {
            cache.remove(&budget_key(scope_type, scope_id, period));
        }
        drop(cache);

        debug!(
            scope_type,
            scope_id,
            cost = actual_cost_usd,
            %details,
            "recorded budget usage"
        );
        Ok(())
    }
}
