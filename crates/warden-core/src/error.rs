use thiserror::Error;

/// Unified error type for the entire Warden control plane.
///
/// Expected denial conditions (role mismatch, rate limit, missing approval,
/// budget exhaustion) are *not* errors — policy evaluation reports them as
/// machine-readable reasons on a [`crate::Decision`]. Errors are reserved for
/// caller misuse and infrastructure faults.
#[derive(Error, Debug)]
pub enum WardenError {
    // ── Resource lookup ────────────────────────────────────────
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    // ── Input validation ───────────────────────────────────────
    #[error("validation failed: {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    // ── Budget ─────────────────────────────────────────────────
    #[error("budget exceeded for {scope}: remaining {remaining:.4}, required {required:.4}")]
    BudgetExceeded {
        scope: String,
        remaining: f64,
        required: f64,
    },

    // ── Connectivity probes ────────────────────────────────────
    #[error("health probe failed: {endpoint}: {reason}")]
    Probe { endpoint: String, reason: String },

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl WardenError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
