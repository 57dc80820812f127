use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telemetry inputs for the cheap readiness check. Every field has a neutral
/// default so partial signal sets still score sensibly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSignals {
    #[serde(alias = "errorRate")]
    pub error_rate: f64,
    #[serde(alias = "lastDeploySuccess")]
    pub last_deploy_success: bool,
    #[serde(alias = "cpuPressure", alias = "cpu")]
    pub cpu_pressure: f64,
    #[serde(alias = "memoryPressure", alias = "memory")]
    pub memory_pressure: f64,
    #[serde(alias = "serviceHealthRatio", alias = "health")]
    pub service_health_ratio: f64,
    #[serde(alias = "openIncidents")]
    pub open_incidents: u32,
}

impl Default for ReadinessSignals {
    fn default() -> Self {
        Self {
            error_rate: 0.0,
            last_deploy_success: true,
            cpu_pressure: 0.3,
            memory_pressure: 0.4,
            service_health_ratio: 1.0,
            open_incidents: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReadinessGrade {
    Green,
    Yellow,
    Orange,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Proceed,
    Hold,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub score: u32,
    pub grade: ReadinessGrade,
    pub recommendation: Recommendation,
    pub signals: ReadinessSignals,
    pub ts: DateTime<Utc>,
}

/// Weighted-sum readiness score over current telemetry, clamped to 0..=100.
/// O(1) by construction — cheap enough to run on every risky request.
pub fn quick_readiness(signals: &ReadinessSignals) -> ReadinessReport {
    let mut score = 50.0;
    score += (1.0 - signals.error_rate) * 40.0;
    score += if signals.last_deploy_success { 15.0 } else { 0.0 };
    score += (1.0 - signals.cpu_pressure) * 20.0;
    score += (1.0 - signals.memory_pressure) * 15.0;
    score += signals.service_health_ratio * 30.0;
    score += (1.0 - f64::from(signals.open_incidents) * 0.2).max(0.0) * 10.0;

    let score = score.round().clamp(0.0, 100.0) as u32;
    let grade = match score {
        80.. => ReadinessGrade::Green,
        60..=79 => ReadinessGrade::Yellow,
        40..=59 => ReadinessGrade::Orange,
        _ => ReadinessGrade::Red,
    };
    let recommendation = if score >= 60 {
        Recommendation::Proceed
    } else {
        Recommendation::Hold
    };

    ReadinessReport {
        score,
        grade,
        recommendation,
        signals: signals.clone(),
        ts: Utc::now(),
    }
}
