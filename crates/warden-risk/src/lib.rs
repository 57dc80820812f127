//! Risk scoring: an O(1) readiness check for routine actions and a seeded
//! Monte Carlo simulation for critical ones. Everything here is
//! deterministic given a seed, which keeps simulation results auditable.

pub mod readiness;
pub mod rng;
pub mod simulate;

pub use readiness::{
    quick_readiness, ReadinessGrade, ReadinessReport, ReadinessSignals, Recommendation,
};
pub use simulate::{
    EngineStatus, Mitigation, MitigationAdvice, MonteCarloEngine, Outcomes, RiskFactor, RiskGrade,
    RunResult, Scenario,
};
