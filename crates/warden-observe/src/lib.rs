//! Observability: configuration/connectivity drift detection, incident
//! workflow with threshold-based auto-detection, and audit receipts for
//! knowledge vault operations.

pub mod drift;
pub mod incident;
pub mod receipts;

pub use drift::{
    ConnState, ConnectivityResult, DriftDetector, DriftEvent, DriftKind, DriftStatus, FileDrift,
    HealthProbe, HttpProbe, ScanReport, ServiceSpec,
};
pub use incident::{
    ActionEntry, Incident, IncidentManager, IncidentManagerStatus, IncidentSignals,
    IncidentStatus, IncidentThresholds, IncidentUpdate, NewIncident, Postmortem, Severity,
};
pub use receipts::{
    MemoryReceipt, MemoryReceipts, ReceiptFilter, ReceiptInput, ReceiptOp, ReceiptStats,
};
