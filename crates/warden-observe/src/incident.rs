use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{info, warn};
use uuid::Uuid;

use warden_core::WardenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Mitigating,
    Resolved,
    Postmortem,
    Closed,
}

impl IncidentStatus {
    /// Resolved and postmortem incidents are settled; everything else still
    /// counts as open work.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Resolved | Self::Postmortem)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEntry {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub auto: bool,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub severity: Severity,
    pub title: String,
    pub status: IncidentStatus,
    pub source: String,
    pub detected_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub actions: Vec<ActionEntry>,
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// Manual incident creation payload; everything optional with sane defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewIncident {
    pub severity: Option<Severity>,
    pub title: Option<String>,
    pub source: Option<String>,
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// Telemetry batch fed to the threshold engine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IncidentSignals {
    #[serde(alias = "errorRate")]
    pub error_rate: Option<f64>,
    #[serde(alias = "consecutiveFailures")]
    pub consecutive_failures: Option<u32>,
    #[serde(alias = "serviceName")]
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IncidentUpdate {
    pub status: Option<IncidentStatus>,
    pub action: Option<String>,
    pub actor: Option<String>,
    #[serde(alias = "actionDetails")]
    pub action_details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Postmortem {
    pub incident_id: Uuid,
    pub title: String,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub timeline: Vec<ActionEntry>,
    pub root_cause: String,
    pub impact: String,
    pub lessons_learned: serde_json::Value,
    pub prevention_actions: serde_json::Value,
}

#[derive(Debug, Clone, Copy)]
pub struct IncidentThresholds {
    pub error_rate_critical: f64,
    pub error_rate_high: f64,
    pub consecutive_failures: u32,
}

impl Default for IncidentThresholds {
    fn default() -> Self {
        Self {
            error_rate_critical: 0.15,
            error_rate_high: 0.08,
            consecutive_failures: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IncidentManagerStatus {
    pub total: usize,
    pub open: usize,
    pub critical: usize,
    pub high: usize,
}

/// Incident lifecycle: creation (manual or threshold-triggered), triage
/// actions, resolution, and postmortem generation.
pub struct IncidentManager {
    incidents: Mutex<VecDeque<Incident>>,
    max_incidents: usize,
    thresholds: IncidentThresholds,
}

impl IncidentManager {
    pub fn new(thresholds: IncidentThresholds, max_incidents: usize) -> Self {
        Self {
            incidents: Mutex::new(VecDeque::new()),
            max_incidents,
            thresholds,
        }
    }

    /// Open an incident. Critical severity auto-appends an emergency pause
    /// action so downstream gating sees it immediately.
    pub fn create(&self, new: NewIncident) -> Incident {
        let severity = new.severity.unwrap_or_default();
        let mut incident = Incident {
            id: Uuid::new_v4(),
            severity,
            title: new.title.unwrap_or_else(|| "Untitled Incident".into()),
            status: IncidentStatus::Open,
            source: new.source.unwrap_or_else(|| "manual".into()),
            detected_at: Utc::now(),
            resolved_at: None,
            actions: Vec::new(),
            details: new.details,
        };

        if severity == Severity::Critical {
            incident.actions.push(ActionEntry {
                action: "emergency_pause".into(),
                actor: None,
                ts: Utc::now(),
                auto: true,
                details: serde_json::Value::Null,
            });
            warn!(id = %incident.id, title = %incident.title, "critical incident, emergency pause triggered");
        } else {
            info!(id = %incident.id, severity = ?severity, title = %incident.title, "incident opened");
        }

        let mut incidents = self.incidents.lock();
        incidents.push_back(incident.clone());
        while incidents.len() > self.max_incidents {
            incidents.pop_front();
        }
        incident
    }

    /// Threshold engine over a telemetry batch. Error rate and consecutive
    /// failures are judged independently, so one batch can open several
    /// incidents.
    pub fn evaluate_signals(&self, signals: &IncidentSignals) -> Vec<Incident> {
        let mut created = Vec::new();

        if let Some(error_rate) = signals.error_rate {
            if error_rate > self.thresholds.error_rate_critical {
                created.push(self.create(NewIncident {
                    severity: Some(Severity::Critical),
                    title: Some(format!("Error rate critical: {:.1}%", error_rate * 100.0)),
                    source: Some("auto_detect".into()),
                    details: details_map(serde_json::json!({
                        "error_rate": error_rate,
                        "threshold": self.thresholds.error_rate_critical,
                    })),
                }));
            } else if error_rate > self.thresholds.error_rate_high {
                created.push(self.create(NewIncident {
                    severity: Some(Severity::High),
                    title: Some(format!("Error rate elevated: {:.1}%", error_rate * 100.0)),
                    source: Some("auto_detect".into()),
                    details: details_map(serde_json::json!({"error_rate": error_rate})),
                }));
            }
        }

        if let Some(failures) = signals.consecutive_failures {
            if failures >= self.thresholds.consecutive_failures {
                let service = signals.service_name.as_deref().unwrap_or("unknown");
                created.push(self.create(NewIncident {
                    severity: Some(Severity::High),
                    title: Some(format!("{failures} consecutive failures on {service}")),
                    source: Some("auto_detect".into()),
                    details: details_map(serde_json::json!({"consecutive_failures": failures})),
                }));
            }
        }

        created
    }

    /// Apply a status change and/or append a triage action.
    pub fn update(&self, id: Uuid, update: IncidentUpdate) -> warden_core::Result<Incident> {
        let mut incidents = self.incidents.lock();
        let incident = incidents
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| WardenError::not_found("incident", id.to_string()))?;

        if let Some(status) = update.status {
            incident.status = status;
            if status == IncidentStatus::Resolved {
                incident.resolved_at = Some(Utc::now());
            }
        }
        if let Some(action) = update.action {
            incident.actions.push(ActionEntry {
                action,
                actor: Some(update.actor.unwrap_or_else(|| "system".into())),
                ts: Utc::now(),
                auto: false,
                details: update.action_details.unwrap_or(serde_json::Value::Null),
            });
        }
        Ok(incident.clone())
    }

    /// Structured postmortem report; unfilled fields fall back to TBD
    /// placeholders so the template is always complete.
    pub fn postmortem(&self, id: Uuid) -> warden_core::Result<Postmortem> {
        let incidents = self.incidents.lock();
        let incident = incidents
            .iter()
            .find(|i| i.id == id)
            .ok_or_else(|| WardenError::not_found("incident", id.to_string()))?;

        let duration_seconds = incident
            .resolved_at
            .map(|resolved| (resolved - incident.detected_at).num_seconds());

        let detail_str = |key: &str, fallback: &str| {
            incident
                .details
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or(fallback)
                .to_string()
        };

        Ok(Postmortem {
            incident_id: incident.id,
            title: incident.title.clone(),
            severity: incident.severity,
            detected_at: incident.detected_at,
            resolved_at: incident.resolved_at,
            duration_seconds,
            timeline: incident.actions.clone(),
            root_cause: detail_str("root_cause", "TBD — update after investigation"),
            impact: detail_str("impact", "TBD"),
            lessons_learned: incident
                .details
                .get("lessons")
                .cloned()
                .unwrap_or_else(|| serde_json::json!([])),
            prevention_actions: incident
                .details
                .get("prevention")
                .cloned()
                .unwrap_or_else(|| serde_json::json!([])),
        })
    }

    pub fn open(&self) -> Vec<Incident> {
        self.incidents
            .lock()
            .iter()
            .filter(|i| i.status.is_open())
            .cloned()
            .collect()
    }

    /// Most recent incidents, oldest first.
    pub fn all(&self, limit: usize) -> Vec<Incident> {
        let incidents = self.incidents.lock();
        let skip = incidents.len().saturating_sub(limit);
        incidents.iter().skip(skip).cloned().collect()
    }

    pub fn status(&self) -> IncidentManagerStatus {
        let incidents = self.incidents.lock();
        let open: Vec<&Incident> = incidents.iter().filter(|i| i.status.is_open()).collect();
        IncidentManagerStatus {
            total: incidents.len(),
            open: open.len(),
            critical: open.iter().filter(|i| i.severity == Severity::Critical).count(),
            high: open.iter().filter(|i| i.severity == Severity::High).count(),
        }
    }
}

fn details_map(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}
