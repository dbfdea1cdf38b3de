//! Audit blobs and their journal line framing.

use serde::{Deserialize, Serialize};

/// Quarantine reason code for contract-violating segments.
pub const ENTRY_CONTRACT_CODE: &str = "WAL_ENTRY_CONTRACT_INVALID";

/// Required metadata on every audit blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMeta {
    pub service: String,
    /// Event time, epoch milliseconds.
    pub ts: i64,
    #[serde(rename = "requestId")]
    pub request_id: String,
}

/// Opaque audit payload plus required meta. The payload schema is owned by
/// the audit service; the fabric only enforces the shared entry contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditBlob {
    pub meta: AuditMeta,
    pub blob: serde_json::Value,
}

impl AuditBlob {
    pub fn new(
        service: impl Into<String>,
        ts: i64,
        request_id: impl Into<String>,
        blob: serde_json::Value,
    ) -> Self {
        Self {
            meta: AuditMeta {
                service: service.into(),
                ts,
                request_id: request_id.into(),
            },
            blob,
        }
    }

    /// Enforce the shared audit-entry contract: all meta fields present and
    /// non-empty, a positive timestamp, and a `begin`/`end` phase on the
    /// payload.
    pub fn check_contract(&self) -> Result<(), String> {
        if self.meta.service.trim().is_empty() {
            return Err("meta.service is empty".to_string());
        }
        if self.meta.request_id.trim().is_empty() {
            return Err("meta.requestId is empty".to_string());
        }
        if self.meta.ts <= 0 {
            return Err(format!("meta.ts is not a positive epoch-ms value: {}", self.meta.ts));
        }
        match self.blob.get("phase").and_then(|p| p.as_str()) {
            Some("begin") | Some("end") => Ok(()),
            Some(other) => Err(format!("blob.phase is not begin/end: {other}")),
            None => Err("blob.phase is missing".to_string()),
        }
    }
}

/// One journal line: `{appendedAt, blob}` serialized as compact JSON,
/// newline-terminated, never multi-line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalLine {
    #[serde(rename = "appendedAt")]
    pub appended_at: i64,
    pub blob: AuditBlob,
}

impl WalLine {
    pub fn now(blob: AuditBlob) -> Self {
        Self {
            appended_at: chrono::Utc::now().timestamp_millis(),
            blob,
        }
    }

    /// Serialize to a newline-terminated frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(phase: &str) -> AuditBlob {
        AuditBlob::new(
            "gateway",
            1_700_000_000_000,
            "rid-1",
            serde_json::json!({"phase": phase, "opId": "getUser"}),
        )
    }

    #[test]
    fn valid_begin_and_end_pass_contract() {
        assert!(blob("begin").check_contract().is_ok());
        assert!(blob("end").check_contract().is_ok());
    }

    #[test]
    fn empty_service_fails_contract() {
        let mut b = blob("begin");
        b.meta.service = "  ".to_string();
        assert!(b.check_contract().is_err());
    }

    #[test]
    fn missing_phase_fails_contract() {
        let mut b = blob("begin");
        b.blob = serde_json::json!({"opId": "x"});
        assert!(b.check_contract().is_err());
    }

    #[test]
    fn non_positive_ts_fails_contract() {
        let mut b = blob("begin");
        b.meta.ts = 0;
        assert!(b.check_contract().is_err());
    }

    #[test]
    fn frame_is_single_line_json() {
        let frame = WalLine::now(blob("begin")).to_frame().unwrap();
        assert!(frame.ends_with('\n'));
        assert_eq!(frame.matches('\n').count(), 1);
        let parsed: WalLine = serde_json::from_str(frame.trim_end()).unwrap();
        assert_eq!(parsed.blob.meta.request_id, "rid-1");
    }
}
