use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;
use uuid::Uuid;

use warden_core::WardenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReceiptOp {
    Ingest,
    Embed,
    Store,
    Drop,
}

/// One audit entry for a knowledge vault operation: what came in, whether it
/// was kept, and why not when it wasn't.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryReceipt {
    pub id: Uuid,
    pub operation: ReceiptOp,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub stored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
    pub ts: DateTime<Utc>,
}

/// Emit payload; id and timestamp are assigned on emit. Operation defaults
/// to INGEST, matching the ingest endpoint this payload arrives through.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptInput {
    #[serde(default = "default_operation")]
    pub operation: ReceiptOp,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default, alias = "sourceId")]
    pub source_id: Option<String>,
    #[serde(default, alias = "documentId")]
    pub document_id: Option<String>,
    #[serde(default = "default_stored")]
    pub stored: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, alias = "contentHash")]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
}

fn default_operation() -> ReceiptOp {
    ReceiptOp::Ingest
}

fn default_source() -> String {
    "unknown".into()
}

fn default_stored() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReceiptFilter {
    pub operation: Option<ReceiptOp>,
    pub source: Option<String>,
    pub stored: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptStats {
    pub ingested: u64,
    pub embedded: u64,
    pub stored: u64,
    pub dropped: u64,
    pub total: usize,
    pub stored_rate: f64,
}

#[derive(Default)]
struct Counters {
    ingested: u64,
    embedded: u64,
    stored: u64,
    dropped: u64,
}

struct Inner {
    ring: VecDeque<MemoryReceipt>,
    counters: Counters,
}

/// Append-only receipt log for knowledge operations, with running counters
/// so stats stay O(1).
pub struct MemoryReceipts {
    inner: Mutex<Inner>,
    max_receipts: usize,
}

impl MemoryReceipts {
    pub fn new(max_receipts: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ring: VecDeque::new(),
                counters: Counters::default(),
            }),
            max_receipts,
        }
    }

    /// Record a receipt. A dropped item must carry a reason.
    pub fn emit(&self, input: ReceiptInput) -> warden_core::Result<MemoryReceipt> {
        if !input.stored && input.reason.as_deref().is_none_or(|r| r.trim().is_empty()) {
            return Err(WardenError::validation(
                "reason",
                "required when stored is false",
            ));
        }

        let receipt = MemoryReceipt {
            id: Uuid::new_v4(),
            operation: input.operation,
            source: input.source,
            source_id: input.source_id,
            document_id: input.document_id,
            stored: input.stored,
            reason: input.reason,
            content_hash: input.content_hash,
            details: input.details,
            ts: Utc::now(),
        };

        let mut inner = self.inner.lock();
        match receipt.operation {
            ReceiptOp::Ingest => inner.counters.ingested += 1,
            ReceiptOp::Embed => inner.counters.embedded += 1,
            _ => {}
        }
        if receipt.stored {
            inner.counters.stored += 1;
        } else {
            inner.counters.dropped += 1;
        }
        inner.ring.push_back(receipt.clone());
        while inner.ring.len() > self.max_receipts {
            inner.ring.pop_front();
        }
        drop(inner);

        debug!(op = ?receipt.operation, source = %receipt.source, stored = receipt.stored, "memory receipt");
        Ok(receipt)
    }

    pub fn ingest(&self, source: &str, source_id: &str) -> warden_core::Result<MemoryReceipt> {
        self.emit(ReceiptInput {
            operation: ReceiptOp::Ingest,
            source: source.to_string(),
            source_id: Some(source_id.to_string()),
            document_id: None,
            stored: true,
            reason: None,
            content_hash: None,
            details: serde_json::Value::Null,
        })
    }

    pub fn embed(
        &self,
        document_id: &str,
        provider: &str,
        model: &str,
    ) -> warden_core::Result<MemoryReceipt> {
        self.emit(ReceiptInput {
            operation: ReceiptOp::Embed,
            source: default_source(),
            source_id: None,
            document_id: Some(document_id.to_string()),
            stored: true,
            reason: None,
            content_hash: None,
            details: serde_json::json!({"provider": provider, "model": model}),
        })
    }

    pub fn store(
        &self,
        source: &str,
        source_id: &str,
        document_id: &str,
    ) -> warden_core::Result<MemoryReceipt> {
        self.emit(ReceiptInput {
            operation: ReceiptOp::Store,
            source: source.to_string(),
            source_id: Some(source_id.to_string()),
            document_id: Some(document_id.to_string()),
            stored: true,
            reason: None,
            content_hash: None,
            details: serde_json::Value::Null,
        })
    }

    pub fn drop_item(
        &self,
        source: &str,
        source_id: &str,
        reason: &str,
    ) -> warden_core::Result<MemoryReceipt> {
        self.emit(ReceiptInput {
            operation: ReceiptOp::Drop,
            source: source.to_string(),
            source_id: Some(source_id.to_string()),
            document_id: None,
            stored: false,
            reason: Some(reason.to_string()),
            content_hash: None,
            details: serde_json::Value::Null,
        })
    }

    /// Most recent receipts matching the filter, oldest first.
    pub fn receipts(&self, filter: &ReceiptFilter, limit: usize) -> Vec<MemoryReceipt> {
        let inner = self.inner.lock();
        let matched: Vec<&MemoryReceipt> = inner
            .ring
            .iter()
            .filter(|r| {
                filter.operation.is_none_or(|op| r.operation == op)
                    && filter.source.as_ref().is_none_or(|s| &r.source == s)
                    && filter.stored.is_none_or(|s| r.stored == s)
            })
            .collect();
        let skip = matched.len().saturating_sub(limit);
        matched.into_iter().skip(skip).cloned().collect()
    }

    pub fn stats(&self) -> ReceiptStats {
        let inner = self.inner.lock();
        let c = &inner.counters;
        ReceiptStats {
            ingested: c.ingested,
            embedded: c.embedded,
            stored: c.stored,
            dropped: c.dropped,
            total: inner.ring.len(),
            stored_rate: c.stored as f64 / 1f64.max((c.stored + c.dropped) as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrappers_set_fields() {
        let r = MemoryReceipts::new(100);
        let ingest = r.ingest("slack", "msg-1").unwrap();
        assert_eq!(ingest.operation, ReceiptOp::Ingest);
        assert!(ingest.stored);

        let embed = r.embed("doc-1", "openai", "text-embedding-3-small").unwrap();
        assert_eq!(embed.operation, ReceiptOp::Embed);
        assert_eq!(embed.details["provider"], "openai");

        let store = r.store("slack", "msg-1", "doc-1").unwrap();
        assert_eq!(store.document_id.as_deref(), Some("doc-1"));

        let dropped = r.drop_item("slack", "msg-2", "duplicate content").unwrap();
        assert!(!dropped.stored);
        assert_eq!(dropped.reason.as_deref(), Some("duplicate content"));
    }

    #[test]
    fn test_drop_without_reason_rejected() {
        let r = MemoryReceipts::new(100);
        let err = r
            .emit(ReceiptInput {
                operation: ReceiptOp::Drop,
                source: "slack".into(),
                source_id: None,
                document_id: None,
                stored: false,
                reason: None,
                content_hash: None,
                details: serde_json::Value::Null,
            })
            .unwrap_err();
        assert!(matches!(err, WardenError::Validation { field: "reason", .. }));
    }

    #[test]
    fn test_stats_and_stored_rate() {
        let r = MemoryReceipts::new(100);
        r.ingest("a", "1").unwrap();
        r.store("a", "1", "d1").unwrap();
        r.store("a", "2", "d2").unwrap();
        r.drop_item("a", "3", "too large").unwrap();

        let stats = r.stats();
        assert_eq!(stats.ingested, 1);
        assert_eq!(stats.stored, 3);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.stored_rate, 0.75);
    }

    #[test]
    fn test_empty_log_rate_is_zero() {
        let r = MemoryReceipts::new(100);
        assert_eq!(r.stats().stored_rate, 0.0);
    }

    #[test]
    fn test_filter_by_operation_and_stored() {
        let r = MemoryReceipts::new(100);
        r.ingest("slack", "1").unwrap();
        r.drop_item("slack", "2", "spam").unwrap();
        r.ingest("jira", "3").unwrap();

        let ingests = r.receipts(
            &ReceiptFilter {
                operation: Some(ReceiptOp::Ingest),
                ..Default::default()
            },
            50,
        );
        assert_eq!(ingests.len(), 2);

        let dropped = r.receipts(
            &ReceiptFilter {
                stored: Some(false),
                ..Default::default()
            },
            50,
        );
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].source, "slack");
    }

    #[test]
    fn test_ring_bounded_but_counters_persist() {
        let r = MemoryReceipts::new(2);
        for i in 0..5 {
            r.ingest("s", &i.to_string()).unwrap();
        }
        let stats = r.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.ingested, 5);
    }
}
