//! Audit records for signature verification attempts.
//!
//! The registry emits one record per verification attempt - success or
//! failure - through a pluggable [`AuditSink`]. No particular destination is
//! prescribed; the default logs through `tracing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One verification attempt, as seen by an audit consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the attempt happened.
    pub timestamp: DateTime<Utc>,
    /// What was attempted (always `plugin_signature_verification` today).
    pub action: String,
    /// Emitting component.
    pub component: String,
    /// The plugin being registered.
    pub plugin_name: String,
    /// The manifest's signer id.
    pub signer_id: String,
    /// The manifest's version.
    pub version: String,
    /// Whether verification succeeded.
    pub verified: bool,
    /// Verifier-reported failure reason, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    /// Build a signature-verification record stamped now.
    #[must_use]
    pub fn signature_verification(
        plugin_name: impl Into<String>,
        signer_id: impl Into<String>,
        version: impl Into<String>,
        verified: bool,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            action: "plugin_signature_verification".to_string(),
            component: "plugin-registry".to_string(),
            plugin_name: plugin_name.into(),
            signer_id: signer_id.into(),
            version: version.into(),
            verified,
            error,
        }
    }
}

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Deliver one record. Implementations must not fail the caller.
    fn emit(&self, record: AuditRecord);
}

/// Default sink: structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, record: AuditRecord) {
        info!(
            action = %record.action,
            plugin = %record.plugin_name,
            signer = %record.signer_id,
            version = %record.version,
            verified = record.verified,
            error = record.error.as_deref().unwrap_or(""),
            "Plugin signature verification"
        );
    }
}

/// In-memory sink, useful for tests and embedders that forward elsewhere.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: parking_lot::Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records emitted so far.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn emit(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_collects_records() {
        let sink = MemoryAuditSink::new();
        sink.emit(AuditRecord::signature_verification(
            "loader-a", "ops", "1.0.0", true, None,
        ));
        sink.emit(AuditRecord::signature_verification(
            "loader-b",
            "ops",
            "1.0.0",
            false,
            Some("unknown signer".to_string()),
        ));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(records[0].verified);
        assert_eq!(records[1].error.as_deref(), Some("unknown signer"));
        assert!(records
            .iter()
            .all(|r| r.action == "plugin_signature_verification"));
    }
}
