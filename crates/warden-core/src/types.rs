use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployment environment a policy applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Default for Environment {
    fn default() -> Self {
        Self::Prod
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dev => write!(f, "dev"),
            Self::Staging => write!(f, "staging"),
            Self::Prod => write!(f, "prod"),
        }
    }
}

/// Risk classification attached to a tool policy. HIGH and CRITICAL require
/// an explicit confirmation flag in the call context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Low
    }
}

impl RiskLevel {
    /// Whether this level demands the caller's `confirmed` flag.
    pub fn needs_confirmation(&self) -> bool {
        *self >= Self::High
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entity a governed call is performed on behalf of. Budget spend is
/// tracked against this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorRef {
    /// Scope type, e.g. "USER" or "AGENT".
    #[serde(rename = "type", default = "default_actor_type")]
    pub kind: String,
    #[serde(default = "default_actor_id")]
    pub id: String,
}

fn default_actor_type() -> String {
    "USER".into()
}

fn default_actor_id() -> String {
    "anonymous".into()
}

impl Default for ActorRef {
    fn default() -> Self {
        Self {
            kind: default_actor_type(),
            id: default_actor_id(),
        }
    }
}

/// Caller-supplied context for a single tool invocation. Every field is
/// optional — absent flags simply fail the checks that need them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CallContext {
    pub environment: Environment,
    /// Role of the caller, checked against the policy's allowed roles.
    pub role: Option<String>,
    /// Set once a human has approved the action through a gate.
    pub approved: bool,
    /// Set once the caller has explicitly confirmed a HIGH/CRITICAL action.
    pub confirmed: bool,
    /// Overrides the policy's estimated cost for the budget check.
    pub estimated_cost_usd: Option<f64>,
    /// Who the call is on behalf of; enables the budget check.
    pub actor: Option<ActorRef>,
}

/// Outcome of a policy evaluation. `reasons` carries machine-readable codes
/// such as `role_denied:<role>` or `rate_limited:<cur>/<lim>` so callers can
/// branch without string parsing the human-facing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub tool_id: String,
    pub environment: Environment,
    pub allowed: bool,
    /// True whenever the policy demands human approval, even if other checks
    /// also denied — the caller still needs to know to route to a gate.
    pub requires_approval: bool,
    pub reasons: Vec<String>,
    /// Budget the caller should record actual usage against, when the budget
    /// check passed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_remaining: Option<f64>,
    /// True when the denial came from the budget check specifically.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub budget_constraint: bool,
}

impl Decision {
    pub fn new(tool_id: impl Into<String>, environment: Environment) -> Self {
        Self {
            tool_id: tool_id.into(),
            environment,
            allowed: true,
            requires_approval: false,
            reasons: Vec::new(),
            budget_id: None,
            budget_remaining: None,
            budget_constraint: false,
        }
    }

    pub fn deny(&mut self, reason: impl Into<String>) {
        self.allowed = false;
        self.reasons.push(reason.into());
    }

    /// Invocation-log status for this decision.
    pub fn status(&self) -> InvocationStatus {
        if self.allowed {
            InvocationStatus::Success
        } else if self.requires_approval && self.reasons.iter().any(|r| r == "approval_required") {
            InvocationStatus::PendingApproval
        } else {
            InvocationStatus::Denied
        }
    }
}

/// Terminal status recorded for each governed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Denied,
    PendingApproval,
    Success,
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Denied => write!(f, "denied"),
            Self::PendingApproval => write!(f, "pending_approval"),
            Self::Success => write!(f, "success"),
        }
    }
}
