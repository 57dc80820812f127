use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DriftKind {
    Registry,
    Connectivity,
    Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftEvent {
    pub id: Uuid,
    pub kind: DriftKind,
    pub key: String,
    pub before_hash: String,
    pub after_hash: String,
    pub status: String,
    pub detected_at: DateTime<Utc>,
    /// Timestamp of the snapshot this change displaced.
    pub previous_ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileDrift {
    pub file: String,
    pub prev_hash: String,
    pub new_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub drifts: Vec<FileDrift>,
    pub scanned: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftStatus {
    pub snapshots_tracked: usize,
    pub drift_events_total: usize,
    pub last_event: Option<DriftEvent>,
}

/// A service endpoint to probe for connectivity drift.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSpec {
    pub id: String,
    pub endpoint: String,
    #[serde(default, alias = "healthEndpoint")]
    pub health_endpoint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnState {
    Healthy,
    Degraded,
    Down,
}

impl ConnState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Down => "down",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityResult {
    pub id: String,
    pub status: ConnState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health probe seam; swapped for a stub in tests.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, endpoint: &str) -> warden_core::Result<u16>;
}

/// Probe over real HTTP with a hard per-request timeout so one dead service
/// cannot stall a batch.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> warden_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| warden_core::WardenError::Config(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self, endpoint: &str) -> warden_core::Result<u16> {
        let response = self.client.get(endpoint).send().await.map_err(|e| {
            warden_core::WardenError::Probe {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(response.status().as_u16())
    }
}

struct SnapshotEntry {
    hash: String,
    ts: DateTime<Utc>,
    data: serde_json::Value,
}

/// Watches for drift across three fronts: tool registries, service
/// connectivity, and configuration files. Every observed change becomes a
/// [`DriftEvent`] in a bounded ring.
pub struct DriftDetector {
    snapshots: RwLock<HashMap<String, SnapshotEntry>>,
    events: Mutex<VecDeque<DriftEvent>>,
    max_events: usize,
}

/// Truncated content digest: stable across restarts, short enough to log.
fn content_hash(data: &serde_json::Value) -> String {
    let digest = match data {
        serde_json::Value::String(s) => blake3::hash(s.as_bytes()),
        other => blake3::hash(other.to_string().as_bytes()),
    };
    digest.to_hex()[..16].to_string()
}

fn classify_kind(key: &str) -> DriftKind {
    if key.contains("registry") {
        DriftKind::Registry
    } else if key.contains("connectivity") || key.contains("service") {
        DriftKind::Connectivity
    } else {
        DriftKind::Config
    }
}

impl DriftDetector {
    pub fn new(max_events: usize) -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            events: Mutex::new(VecDeque::new()),
            max_events,
        }
    }

    /// Record the current state of `key`. Emits a drift event when the hash
    /// differs from the previous snapshot, then overwrites it either way.
    pub fn snapshot(&self, key: &str, data: serde_json::Value) -> String {
        let hash = content_hash(&data);
        let now = Utc::now();
        let mut snapshots = self.snapshots.write();

        if let Some(prev) = snapshots.get(key) {
            if prev.hash != hash {
                let event = DriftEvent {
                    id: Uuid::new_v4(),
                    kind: classify_kind(key),
                    key: key.to_string(),
                    before_hash: prev.hash.clone(),
                    after_hash: hash.clone(),
                    status: "detected".into(),
                    detected_at: now,
                    previous_ts: prev.ts,
                };
                info!(key, kind = ?event.kind, before = %event.before_hash, after = %event.after_hash, "drift detected");
                let mut events = self.events.lock();
                events.push_back(event);
                while events.len() > self.max_events {
                    events.pop_front();
                }
            }
        }

        snapshots.insert(
            key.to_string(),
            SnapshotEntry {
                hash: hash.clone(),
                ts: now,
                data,
            },
        );
        hash
    }

    /// Walk `dir` recursively and snapshot every file with a matching
    /// extension. Best effort: unreadable entries are skipped, never fatal.
    pub fn scan_directory(&self, dir: &Path, extensions: &[String]) -> ScanReport {
        let mut drifts = Vec::new();
        self.scan_recursive(dir, extensions, &mut drifts);
        debug!(dir = %dir.display(), drifts = drifts.len(), "directory scan complete");
        ScanReport {
            drifts,
            scanned: self.snapshots.read().len(),
        }
    }

    fn scan_recursive(&self, dir: &Path, extensions: &[String], drifts: &mut Vec<FileDrift>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.scan_recursive(&path, extensions, drifts);
                continue;
            }
            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| extensions.iter().any(|want| want.trim_start_matches('.') == ext));
            if !matches {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let key = path.to_string_lossy().to_string();
            let prev_hash = {
                let snapshots = self.snapshots.read();
                snapshots.get(&key).map(|s| s.hash.clone())
            };
            let new_hash = self.snapshot(&key, serde_json::Value::String(content));
            if let Some(prev) = prev_hash {
                if prev != new_hash {
                    drifts.push(FileDrift {
                        file: key,
                        prev_hash: prev,
                        new_hash,
                    });
                }
            }
        }
    }

    /// Probe each service once. Failures are isolated per service, and a
    /// snapshot is only taken when the classification changes — stable
    /// failures do not flood the event ring.
    pub async fn check_connectivity(
        &self,
        probe: &dyn HealthProbe,
        services: &[ServiceSpec],
    ) -> Vec<ConnectivityResult> {
        let mut results = Vec::with_capacity(services.len());
        for service in services {
            let endpoint = service.health_endpoint.as_ref().unwrap_or(&service.endpoint);
            let key = format!("connectivity:{}", service.id);
            let start = Instant::now();

            match probe.check(endpoint).await {
                Ok(http_status) => {
                    let latency_ms = start.elapsed().as_millis() as u64;
                    let status = if (200..300).contains(&http_status) {
                        ConnState::Healthy
                    } else {
                        ConnState::Degraded
                    };
                    if self.last_conn_state(&key).as_deref() != Some(status.as_str()) {
                        self.snapshot(
                            &key,
                            serde_json::json!({"status": status.as_str(), "latency": latency_ms}),
                        );
                    }
                    results.push(ConnectivityResult {
                        id: service.id.clone(),
                        status,
                        latency_ms: Some(latency_ms),
                        http_status: Some(http_status),
                        error: None,
                    });
                }
                Err(err) => {
                    if self.last_conn_state(&key).as_deref() != Some("down") {
                        self.snapshot(
                            &key,
                            serde_json::json!({"status": "down", "error": err.to_string()}),
                        );
                    }
                    results.push(ConnectivityResult {
                        id: service.id.clone(),
                        status: ConnState::Down,
                        latency_ms: None,
                        http_status: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }
        results
    }

    fn last_conn_state(&self, key: &str) -> Option<String> {
        let snapshots = self.snapshots.read();
        snapshots
            .get(key)?
            .data
            .get("status")?
            .as_str()
            .map(str::to_string)
    }

    /// Most recent drift events, oldest first.
    pub fn latest(&self, limit: usize) -> Vec<DriftEvent> {
        let events = self.events.lock();
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn status(&self) -> DriftStatus {
        let events = self.events.lock();
        DriftStatus {
            snapshots_tracked: self.snapshots.read().len(),
            drift_events_total: events.len(),
            last_event: events.back().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_data_never_drifts() {
        let d = DriftDetector::new(100);
        let h1 = d.snapshot("config:app", serde_json::json!({"a": 1}));
        let h2 = d.snapshot("config:app", serde_json::json!({"a": 1}));
        assert_eq!(h1, h2);
        assert!(d.latest(10).is_empty());
    }

    #[test]
    fn test_changed_data_emits_one_event() {
        let d = DriftDetector::new(100);
        let before = d.snapshot("tool-registry", serde_json::json!({"tools": 3}));
        let after = d.snapshot("tool-registry", serde_json::json!({"tools": 4}));

        let events = d.latest(10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, DriftKind::Registry);
        assert_eq!(events[0].before_hash, before);
        assert_eq!(events[0].after_hash, after);
        assert_ne!(before, after);
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(classify_kind("tool-registry"), DriftKind::Registry);
        assert_eq!(classify_kind("connectivity:api"), DriftKind::Connectivity);
        assert_eq!(classify_kind("service:db"), DriftKind::Connectivity);
        assert_eq!(classify_kind("/etc/app.toml"), DriftKind::Config);
    }

    #[test]
    fn test_hash_is_16_hex_chars() {
        let h = content_hash(&serde_json::Value::String("hello".into()));
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_event_ring_bounded() {
        let d = DriftDetector::new(3);
        for i in 0..10 {
            d.snapshot("k", serde_json::json!(i));
        }
        assert_eq!(d.latest(100).len(), 3);
        assert_eq!(d.status().drift_events_total, 3);
    }

    #[test]
    fn test_scan_detects_file_change() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.toml");
        std::fs::write(&file, "x = 1").unwrap();

        let d = DriftDetector::new(100);
        let exts = vec![".toml".to_string()];
        let first = d.scan_directory(dir.path(), &exts);
        assert!(first.drifts.is_empty());
        assert_eq!(first.scanned, 1);

        std::fs::write(&file, "x = 2").unwrap();
        let second = d.scan_directory(dir.path(), &exts);
        assert_eq!(second.drifts.len(), 1);
        assert_ne!(second.drifts[0].prev_hash, second.drifts[0].new_hash);
    }

    #[test]
    fn test_scan_skips_unmatched_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("cfg.json"), "{}").unwrap();

        let d = DriftDetector::new(100);
        let report = d.scan_directory(dir.path(), &[".json".to_string()]);
        assert_eq!(report.scanned, 1);
    }

    #[test]
    fn test_scan_missing_dir_is_empty_not_fatal() {
        let d = DriftDetector::new(100);
        let report = d.scan_directory(Path::new("/nonexistent/nowhere"), &[".json".to_string()]);
        assert!(report.drifts.is_empty());
    }

    struct StubProbe {
        status: u16,
        fail: bool,
    }

    #[async_trait]
    impl HealthProbe for StubProbe {
        async fn check(&self, endpoint: &str) -> warden_core::Result<u16> {
            if self.fail {
                return Err(warden_core::WardenError::Probe {
                    endpoint: endpoint.to_string(),
                    reason: "connection refused".into(),
                });
            }
            Ok(self.status)
        }
    }

    fn svc(id: &str) -> ServiceSpec {
        ServiceSpec {
            id: id.into(),
            endpoint: format!("http://{id}.internal/health"),
            health_endpoint: None,
        }
    }

    #[tokio::test]
    async fn test_connectivity_healthy() {
        let d = DriftDetector::new(100);
        let probe = StubProbe { status: 200, fail: false };
        let results = d.check_connectivity(&probe, &[svc("api")]).await;
        assert_eq!(results[0].status, ConnState::Healthy);
        assert_eq!(results[0].http_status, Some(200));
    }

    #[tokio::test]
    async fn test_connectivity_down_isolated_per_service() {
        let d = DriftDetector::new(100);
        let probe = StubProbe { status: 0, fail: true };
        let results = d.check_connectivity(&probe, &[svc("a"), svc("b")]).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status == ConnState::Down));
        assert!(results[0].error.is_some());
    }

    #[tokio::test]
    async fn test_stable_failure_snapshots_once() {
        let d = DriftDetector::new(100);
        let probe = StubProbe { status: 0, fail: true };
        d.check_connectivity(&probe, &[svc("api")]).await;
        d.check_connectivity(&probe, &[svc("api")]).await;
        d.check_connectivity(&probe, &[svc("api")]).await;
        // One snapshot on first failure, no drift events after.
        assert_eq!(d.status().snapshots_tracked, 1);
        assert!(d.latest(10).is_empty());
    }

    #[tokio::test]
    async fn test_status_flap_emits_drift() {
        let d = DriftDetector::new(100);
        d.check_connectivity(&StubProbe { status: 200, fail: false }, &[svc("api")])
            .await;
        d.check_connectivity(&StubProbe { status: 0, fail: true }, &[svc("api")])
            .await;
        let events = d.latest(10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, DriftKind::Connectivity);
    }
}
