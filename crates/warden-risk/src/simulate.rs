use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::info;

use crate::readiness::{quick_readiness, ReadinessReport, ReadinessSignals};
use crate::rng::draw;

const DEFAULT_MITIGATION: &str = "Add circuit breaker / retry logic";

/// A simulated action: its baseline success rate, the risks that can degrade
/// it, and the mitigations that buy it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub name: String,
    #[serde(alias = "baseSuccessRate")]
    pub base_success_rate: f64,
    #[serde(alias = "riskFactors")]
    pub risk_factors: Vec<RiskFactor>,
    pub mitigations: Vec<Mitigation>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "unnamed".into(),
            base_success_rate: 0.85,
            risk_factors: Vec::new(),
            mitigations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    #[serde(default = "default_probability")]
    pub probability: f64,
    #[serde(default = "default_impact")]
    pub impact: f64,
    #[serde(default)]
    pub mitigation: Option<String>,
}

fn default_probability() -> f64 {
    0.1
}

fn default_impact() -> f64 {
    0.3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mitigation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_boost")]
    pub boost: f64,
}

fn default_boost() -> f64 {
    0.05
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcomes {
    pub success: u64,
    pub partial: u64,
    pub failure: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskGrade {
    Low,
    Medium,
    High,
    Critical,
}

/// One risk factor's standing in the run, ranked by how often it fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationAdvice {
    pub risk: String,
    pub hit_rate: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub scenario: String,
    pub iterations: u64,
    pub seed: u64,
    pub outcomes: Outcomes,
    /// Success percentage, 2 decimals.
    pub confidence: f64,
    /// Failure percentage, 2 decimals.
    pub failure_rate: f64,
    pub risk_grade: RiskGrade,
    pub top_mitigations: Vec<MitigationAdvice>,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub runs_completed: usize,
    pub last_run: Option<RunResult>,
    pub default_iterations: u64,
}

/// Seeded simulation engine. Quick checks for routine actions, full
/// simulations for critical ones. The same seed and scenario always
/// reproduce bit-identical outcome counts.
pub struct MonteCarloEngine {
    default_iterations: u64,
    seed: u64,
    history: Mutex<VecDeque<RunResult>>,
    max_history: usize,
}

impl MonteCarloEngine {
    /// `seed` defaults to the current clock millis when not pinned by config.
    pub fn new(default_iterations: u64, seed: Option<u64>, max_history: usize) -> Self {
        Self {
            default_iterations,
            seed: seed.unwrap_or_else(|| Utc::now().timestamp_millis() as u64),
            history: Mutex::new(VecDeque::new()),
            max_history,
        }
    }

    pub fn quick_readiness(&self, signals: &ReadinessSignals) -> ReadinessReport {
        quick_readiness(signals)
    }

    /// Run the full simulation and append the result to history.
    pub fn run_full_cycle(&self, scenario: &Scenario, iterations: Option<u64>) -> RunResult {
        let iterations = iterations.unwrap_or(self.default_iterations).max(1);
        let seed = self.seed;
        let mut outcomes = Outcomes::default();
        let mut risk_hits = vec![0u64; scenario.risk_factors.len()];

        for i in 0..iterations {
            let rand = draw(seed.wrapping_add(i));
            let mut effective_rate = scenario.base_success_rate;

            for (idx, risk) in scenario.risk_factors.iter().enumerate() {
                let risk_rand =
                    draw(seed.wrapping_add(i).wrapping_add(risk.name.len() as u64 * 1000));
                if risk_rand < risk.probability {
                    effective_rate *= 1.0 - risk.impact;
                    risk_hits[idx] += 1;
                }
            }

            for mitigation in &scenario.mitigations {
                effective_rate = (effective_rate + mitigation.boost).min(1.0);
            }

            if rand < effective_rate {
                outcomes.success += 1;
            } else if rand < effective_rate + 0.1 {
                outcomes.partial += 1;
            } else {
                outcomes.failure += 1;
            }
        }

        let confidence = outcomes.success as f64 / iterations as f64;
        let failure_rate = outcomes.failure as f64 / iterations as f64;
        let risk_grade = if failure_rate < 0.05 {
            RiskGrade::Low
        } else if failure_rate < 0.15 {
            RiskGrade::Medium
        } else if failure_rate < 0.30 {
            RiskGrade::High
        } else {
            RiskGrade::Critical
        };

        // Risks ranked by how often they fired, top five.
        let mut ranked: Vec<(usize, &RiskFactor)> =
            scenario.risk_factors.iter().enumerate().collect();
        ranked.sort_by(|a, b| risk_hits[b.0].cmp(&risk_hits[a.0]));
        let top_mitigations = ranked
            .into_iter()
            .take(5)
            .map(|(idx, risk)| MitigationAdvice {
                risk: risk.name.clone(),
                hit_rate: format!(
                    "{:.1}%",
                    risk_hits[idx] as f64 / iterations as f64 * 100.0
                ),
                recommendation: risk
                    .mitigation
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MITIGATION.into()),
            })
            .collect();

        let result = RunResult {
            scenario: scenario.name.clone(),
            iterations,
            seed,
            outcomes,
            confidence: round2(confidence * 100.0),
            failure_rate: round2(failure_rate * 100.0),
            risk_grade,
            top_mitigations,
            ts: Utc::now(),
        };

        info!(
            scenario = %result.scenario,
            iterations,
            confidence = result.confidence,
            grade = ?result.risk_grade,
            "simulation complete"
        );

        let mut history = self.history.lock();
        history.push_back(result.clone());
        while history.len() > self.max_history {
            history.pop_front();
        }
        result
    }

    /// Most recent runs, oldest first.
    pub fn history(&self, limit: usize) -> Vec<RunResult> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn status(&self) -> EngineStatus {
        let history = self.history.lock();
        EngineStatus {
            runs_completed: history.len(),
            last_run: history.back().cloned(),
            default_iterations: self.default_iterations,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
