use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use warden_core::WardenError;

/// A request for human sign-off on a high-stakes action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub intent: String,
    /// Why the model/router chose this action — carried into the receipt.
    #[serde(alias = "modelDecision")]
    pub model_decision: serde_json::Value,
    #[serde(default, alias = "toolsExecuted")]
    pub tools_executed: Vec<String>,
    #[serde(default, alias = "projectedROI", alias = "projectedRoi")]
    pub projected_roi: Option<String>,
    pub status: GateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// PENDING transitions exactly once, to APPROVED or DENIED. Both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateStatus {
    Pending,
    Approved,
    Denied,
}

/// The immutable audit artifact written once per resolved gate. Receipts are
/// the system of record — the live queue forgets resolved requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub receipt_id: Uuid,
    pub action_intent: String,
    pub routing_decision: serde_json::Value,
    pub tools_executed: Vec<String>,
    pub validation: String,
    pub roi: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_signature: Option<String>,
    pub operator_id: String,
    pub ts: DateTime<Utc>,
}

/// Human-in-the-loop approval queue. Resolution atomically removes the
/// pending entry, so a gate can never be resolved twice.
pub struct ApprovalGates {
    pending: Mutex<HashMap<Uuid, ApprovalRequest>>,
    receipts_dir: PathBuf,
}

impl ApprovalGates {
    /// Create the gate queue, ensuring the receipts directory exists.
    pub fn new(receipts_dir: impl Into<PathBuf>) -> warden_core::Result<Self> {
        let receipts_dir = receipts_dir.into();
        std::fs::create_dir_all(&receipts_dir)?;
        Ok(Self {
            pending: Mutex::new(HashMap::new()),
            receipts_dir,
        })
    }

    /// File an approval request. Returns immediately — resolution happens
    /// out of band, possibly hours later.
    pub fn request_approval(
        &self,
        intent: &str,
        model_decision: serde_json::Value,
        tools_executed: Vec<String>,
        projected_roi: Option<String>,
    ) -> warden_core::Result<Uuid> {
        if intent.trim().is_empty() {
            return Err(WardenError::validation("intent", "must not be empty"));
        }
        let id = Uuid::new_v4();
        let request = ApprovalRequest {
            id,
            intent: intent.to_string(),
            model_decision,
            tools_executed,
            projected_roi,
            status: GateStatus::Pending,
            operator_id: None,
            signature: None,
            created_at: Utc::now(),
            resolved_at: None,
        };

        info!(gate_id = %id, intent, "approval gate opened");
        self.pending.lock().insert(id, request);
        Ok(id)
    }

    /// All requests still awaiting an operator.
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        let mut requests: Vec<ApprovalRequest> = self.pending.lock().values().cloned().collect();
        requests.sort_by_key(|r| r.created_at);
        requests
    }

    /// Resolve a gate. The pending entry is removed under the lock before
    /// anything else happens — a second resolution attempt finds nothing and
    /// gets `NotFound`.
    pub fn resolve(
        &self,
        id: Uuid,
        approved: bool,
        operator_id: &str,
        signature: Option<String>,
    ) -> warden_core::Result<ApprovalRequest> {
        let mut request = self
            .pending
            .lock()
            .remove(&id)
            .ok_or_else(|| WardenError::not_found("gate", id.to_string()))?;

        request.status = if approved {
            GateStatus::Approved
        } else {
            GateStatus::Denied
        };
        request.operator_id = Some(operator_id.to_string());
        request.signature = signature;
        request.resolved_at = Some(Utc::now());

        self.write_receipt(&request)?;
        info!(
            gate_id = %id,
            approved,
            operator = operator_id,
            "approval gate resolved"
        );
        Ok(request)
    }

    /// Read back a persisted receipt.
    pub fn receipt(&self, id: Uuid) -> warden_core::Result<Receipt> {
        let path = self.receipt_path(id);
        if !path.exists() {
            return Err(WardenError::not_found("receipt", id.to_string()));
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn receipts_dir(&self) -> &Path {
        &self.receipts_dir
    }

    fn receipt_path(&self, id: Uuid) -> PathBuf {
        self.receipts_dir.join(format!("{id}.json"))
    }

    fn write_receipt(&self, request: &ApprovalRequest) -> warden_core::Result<()> {
        let receipt = Receipt {
            receipt_id: request.id,
            action_intent: request.intent.clone(),
            routing_decision: request.model_decision.clone(),
            tools_executed: request.tools_executed.clone(),
            validation: match request.status {
                GateStatus::Approved => "Human Verified: PASS".into(),
                _ => "Human Verified: DENIED".into(),
            },
            roi: request.projected_roi.clone().unwrap_or_else(|| "N/A".into()),
            operator_signature: request.signature.clone(),
            operator_id: request.operator_id.clone().unwrap_or_default(),
            ts: Utc::now(),
        };

        let path = self.receipt_path(request.id);
        if path.exists() {
            // Receipts are write-once; hitting this means an id collision.
            warn!(path = %path.display(), "receipt already exists, refusing to overwrite");
            return Ok(());
        }
        std::fs::write(&path, serde_json::to_string_pretty(&receipt)?)?;
        Ok(())
    }
}
