use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration — maps to `warden.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub server: ServerConfig,
    pub governance: GovernanceConfig,
    pub gates: GatesConfig,
    pub risk: RiskConfig,
    pub incidents: IncidentConfig,
    pub drift: DriftConfig,
    pub logging: LoggingConfig,
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, e.g. "127.0.0.1:7770".
    pub listen: String,
    /// Enable permissive CORS (for dashboards on other origins).
    pub cors: bool,
    /// Optional bearer token required on API routes.
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7770".into(),
            cors: false,
            api_key: None,
        }
    }
}

// ── Governance ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Default USD limit for lazily created budgets.
    pub default_budget_usd: f64,
    /// Budget read-cache TTL in seconds.
    pub budget_cache_ttl_secs: u64,
    /// Estimated cost applied when neither context nor policy supplies one.
    pub default_estimated_cost_usd: f64,
    /// Invocation audit ring size — oldest records trimmed past this.
    pub max_invocations: usize,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            default_budget_usd: 50.0,
            budget_cache_ttl_secs: 60,
            default_estimated_cost_usd: 0.0001,
            max_invocations: 10_000,
        }
    }
}

// ── Approval gates ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatesConfig {
    /// Directory receipt files are written to. Empty = `~/.warden/receipts`.
    pub receipts_dir: Option<PathBuf>,
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self { receipts_dir: None }
    }
}

impl GatesConfig {
    /// Resolve the receipts directory, falling back to `~/.warden/receipts`.
    pub fn resolve_receipts_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.receipts_dir {
            return dir.clone();
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".warden")
            .join("receipts")
    }
}

// ── Risk simulation ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Iterations for a full simulation cycle when the caller doesn't choose.
    pub default_iterations: u32,
    /// Pin the PRNG seed for reproducible runs; unset = derived from clock.
    pub seed: Option<u64>,
    /// Simulation run history cap.
    pub max_history: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            default_iterations: 10_000,
            seed: None,
            max_history: 100,
        }
    }
}

// ── Incidents ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentConfig {
    /// Error rate above which a critical incident auto-opens.
    pub error_rate_critical: f64,
    /// Error rate above which a high incident auto-opens.
    pub error_rate_high: f64,
    /// Consecutive failures at/above which a high incident auto-opens.
    pub consecutive_failures: u32,
    /// Incident ring size.
    pub max_incidents: usize,
}

impl Default for IncidentConfig {
    fn default() -> Self {
        Self {
            error_rate_critical: 0.15,
            error_rate_high: 0.08,
            consecutive_failures: 3,
            max_incidents: 500,
        }
    }
}

// ── Drift detection ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Drift event ring size.
    pub max_events: usize,
    /// File extensions scanned by the directory walker.
    pub scan_extensions: Vec<String>,
    /// Per-service health probe timeout in seconds.
    pub probe_timeout_secs: u64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            max_events: 1000,
            scan_extensions: vec![
                ".json".into(),
                ".yaml".into(),
                ".yml".into(),
                ".toml".into(),
                ".env".into(),
            ],
            probe_timeout_secs: 5,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level filter: trace, debug, info, warn, error.
    pub level: String,
    /// "text" or "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Non-fatal configuration issue surfaced at load time.
#[derive(Debug, Clone)]
pub struct ConfigWarning(pub String);

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl WardenConfig {
    /// Validate the config. Hard errors abort startup; warnings are logged.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        if self.governance.default_budget_usd < 0.0 {
            return Err("governance.default_budget_usd must be non-negative".into());
        }
        if self.incidents.error_rate_high >= self.incidents.error_rate_critical {
            return Err(
                "incidents.error_rate_high must be below incidents.error_rate_critical".into(),
            );
        }
        if self.risk.default_iterations == 0 {
            return Err("risk.default_iterations must be at least 1".into());
        }
        if self.logging.format != "text" && self.logging.format != "json" {
            return Err(format!(
                "logging.format must be \"text\" or \"json\", got {:?}",
                self.logging.format
            ));
        }

        if self.server.api_key.is_none() && !self.server.listen.starts_with("127.0.0.1") {
            warnings.push(ConfigWarning(
                "server listens on a non-loopback address without an api_key".into(),
            ));
        }
        if self.governance.default_estimated_cost_usd <= 0.0 {
            warnings.push(ConfigWarning(
                "governance.default_estimated_cost_usd is zero — budget checks always pass".into(),
            ));
        }
        if self.risk.default_iterations > 1_000_000 {
            warnings.push(ConfigWarning(
                "risk.default_iterations above 1M will make /api/monte-carlo/run slow".into(),
            ));
        }

        Ok(warnings)
    }
}
