//! Audit records: one plain value per classified prompt. Storage is the sink's concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mapping::schema::IstvonMap;
use crate::security::Verdict;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub verdict: Verdict,
    pub original_prompt: String,
    pub reason: Option<String>,
    pub sanitized_prompt: Option<String>,
    /// Absent for blocked prompts.
    pub istvon_map: Option<IstvonMap>,
}

/// Receives audit records after each classification.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Writes each record as a structured `info` event on target `istvon::audit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        let payload = serde_json::to_string(record).unwrap_or_default();
        tracing::info!(
            target: "istvon::audit",
            ts = %record.timestamp.to_rfc3339(),
            verdict = %record.verdict,
            reason = record.reason.as_deref().unwrap_or(""),
            record = %payload,
            "Audit record"
        );
    }
}
