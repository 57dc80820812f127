use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use warden_core::{ActorRef, CallContext, Decision, Environment, InvocationStatus, RiskLevel};

use crate::budget::BudgetService;

/// Governance rules for one (tool, environment) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    #[serde(alias = "toolId")]
    pub tool_id: String,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default, alias = "requiresApproval")]
    pub requires_approval: bool,
    #[serde(default, alias = "allowedRoles")]
    pub allowed_roles: Vec<String>,
    #[serde(default, alias = "rateLimitPerMin")]
    pub rate_limit_per_min: Option<u32>,
    #[serde(default, alias = "riskLevel")]
    pub risk_level: RiskLevel,
    /// Opaque constraint map, passed through to callers.
    #[serde(default)]
    pub constraints: serde_json::Map<String, serde_json::Value>,
    #[serde(default, alias = "estimatedCost", alias = "estimatedCostUsd")]
    pub estimated_cost_usd: f64,
}

/// Audit record appended for every governed invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub id: Uuid,
    pub tool_id: String,
    pub actor_type: String,
    pub actor_id: String,
    pub environment: Environment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_id: Option<String>,
    pub request: serde_json::Value,
    /// Response summary, truncated to 500 chars.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub status: InvocationStatus,
    pub ts: DateTime<Utc>,
}

/// Filter for the invocation audit query.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InvocationFilter {
    pub tool_id: Option<String>,
    pub status: Option<InvocationStatus>,
    pub actor_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyEngineStatus {
    pub policies_registered: usize,
    pub invocations_logged: usize,
}

/// Rule evaluation for tool invocations: roles, rate limits, approval
/// requirements, budget quotas, and risk confirmation, with an append-only
/// audit ring of every decision.
pub struct PolicyEngine {
    policies: RwLock<HashMap<String, Policy>>,
    /// Hot path: minute-bucket counters keyed `tool:env:minute`. CAS on the
    /// counter keeps concurrent evaluations from over- or under-counting.
    rate_counters: DashMap<String, AtomicU64>,
    invocations: RwLock<VecDeque<InvocationRecord>>,
    max_invocations: usize,
    budget: Option<Arc<BudgetService>>,
    /// Estimated cost applied when neither context nor policy supplies one.
    default_estimated_cost_usd: f64,
}

fn policy_key(tool_id: &str, environment: Environment) -> String {
    format!("{tool_id}:{environment}")
}

impl PolicyEngine {
    pub fn new(budget: Option<Arc<BudgetService>>) -> Self {
        Self::with_limits(budget, 10_000, 0.0001)
    }

    pub fn with_limits(
        budget: Option<Arc<BudgetService>>,
        max_invocations: usize,
        default_estimated_cost_usd: f64,
    ) -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
            rate_counters: DashMap::new(),
            invocations: RwLock::new(VecDeque::new()),
            max_invocations,
            budget,
            default_estimated_cost_usd,
        }
    }

    /// Register a policy, replacing any existing one for the same
    /// (tool, environment) key.
    pub fn add_policy(&self, policy: Policy) {
        let key = policy_key(&policy.tool_id, policy.environment);
        info!(tool = %policy.tool_id, env = %policy.environment, "registered policy");
        self.policies.write().insert(key, policy);
    }

    /// Evaluate a tool call against its policy. Denials are reported as
    /// reasons on the decision, never as errors; the only error source is
    /// the budget backing store.
    pub async fn evaluate(
        &self,
        tool_id: &str,
        ctx: &CallContext,
    ) -> warden_core::Result<Decision> {
        let env = ctx.environment;
        let mut decision = Decision::new(tool_id, env);

        let policy = {
            let policies = self.policies.read();
            policies.get(&policy_key(tool_id, env)).cloned()
        };

        // No policy = allow by default (but flag it).
        let Some(policy) = policy else {
            warn!(tool = tool_id, env = %env, "no policy defined, allowing by default");
            decision.reasons.push("no_policy_defined".into());
            return Ok(decision);
        };

        // Role check.
        if !policy.allowed_roles.is_empty() {
            if let Some(ref role) = ctx.role {
                if !policy.allowed_roles.contains(role) {
                    decision.deny(format!("role_denied:{role}"));
                }
            }
        }

        // Rate limit: count this evaluation exactly once, race-safe.
        if let Some(limit) = policy.rate_limit_per_min {
            let minute = Utc::now().timestamp() / 60;
            let key = format!("{tool_id}:{env}:{minute}");
            let counter = self
                .rate_counters
                .entry(key)
                .or_insert_with(|| AtomicU64::new(0));
            loop {
                let current = counter.load(Ordering::Acquire);
                if current >= u64::from(limit) {
                    decision.deny(format!("rate_limited:{current}/{limit}"));
                    break;
                }
                if counter
                    .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    break;
                }
            }
        }

        // Approval requirement. requires_approval stays set even when other
        // checks also deny, so the caller knows to route to a gate.
        if policy.requires_approval {
            decision.requires_approval = true;
            if !ctx.approved {
                decision.deny("approval_required");
            }
        }

        // Budget check — only when a service is wired and an actor is known.
        if let (Some(budget), Some(actor)) = (&self.budget, &ctx.actor) {
            let estimated = ctx
                .estimated_cost_usd
                .filter(|c| *c > 0.0)
                .or((policy.estimated_cost_usd > 0.0).then_some(policy.estimated_cost_usd))
                .unwrap_or(self.default_estimated_cost_usd);
            let check = budget.check_budget(&actor.kind, &actor.id, estimated).await?;
            if !check.allowed {
                decision.deny(format!("budget_exceeded:rem={}", check.remaining));
                decision.budget_constraint = true;
                decision.budget_remaining = Some(check.remaining);
            } else {
                decision.budget_id = Some(check.budget_id);
            }
        }

        // Risk confirmation for HIGH/CRITICAL policies.
        if policy.risk_level.needs_confirmation() && !ctx.confirmed {
            decision.deny(format!("high_risk_unconfirmed:{}", policy.risk_level));
        }

        Ok(decision)
    }

    /// Append an audit record, trimming the oldest past the ring cap.
    pub fn log_invocation(
        &self,
        tool_id: &str,
        actor: &ActorRef,
        environment: Environment,
        request: serde_json::Value,
        response: Option<&serde_json::Value>,
        status: InvocationStatus,
        budget_id: Option<String>,
    ) -> InvocationRecord {
        let record = InvocationRecord {
            id: Uuid::new_v4(),
            tool_id: tool_id.to_string(),
            actor_type: actor.kind.clone(),
            actor_id: actor.id.clone(),
            environment,
            budget_id,
            request,
            response: response.map(|r| {
                let mut s = match r {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if s.len() > 500 {
                    // back up to a char boundary so multibyte content can't
                    // split mid-character
                    let mut cut = 500;
                    while !s.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    s.truncate(cut);
                }
                s
            }),
            status,
            ts: Utc::now(),
        };

        let mut invocations = self.invocations.write();
        invocations.push_back(record.clone());
        while invocations.len() > self.max_invocations {
            invocations.pop_front();
        }
        record
    }

    /// Most recent invocations matching the filter, newest last.
    pub fn invocations(&self, filter: &InvocationFilter, limit: usize) -> Vec<InvocationRecord> {
        let invocations = self.invocations.read();
        let matched: Vec<&InvocationRecord> = invocations
            .iter()
            .filter(|inv| {
                filter
                    .tool_id
                    .as_ref()
                    .is_none_or(|t| &inv.tool_id == t)
                    && filter.status.is_none_or(|s| inv.status == s)
                    && filter
                        .actor_id
                        .as_ref()
                        .is_none_or(|a| &inv.actor_id == a)
            })
            .collect();
        let skip = matched.len().saturating_sub(limit);
        matched.into_iter().skip(skip).cloned().collect()
    }

    /// All registered policies.
    pub fn policies(&self) -> Vec<Policy> {
        self.policies.read().values().cloned().collect()
    }

    pub fn status(&self) -> PolicyEngineStatus {
        PolicyEngineStatus {
            policies_registered: self.policies.read().len(),
            invocations_logged: self.invocations.read().len(),
        }
    }

    /// Evict rate counters from past minutes. Call periodically from a
    /// background task.
    pub fn cleanup_rate_counters(&self) {
        let suffix = format!(":{}", Utc::now().timestamp() / 60);
        self.rate_counters.retain(|key, _| key.ends_with(&suffix));
    }
}
