//! Canonical S2S response envelope.
//!
//! Handlers behind the receiver return `Envelope<T>`; the wire shape is
//! `{ok, service, data, requestId}` with the error variant carrying
//! `data: {status, detail}`.

use serde::{Deserialize, Serialize};

/// Error payload placed in `data` when `ok` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub detail: String,
}

/// Canonical response envelope for S2S calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub ok: bool,
    pub service: String,
    pub data: T,
    #[serde(rename = "requestId")]
    pub request_id: String,
}

impl<T> Envelope<T> {
    pub fn ok(service: impl Into<String>, data: T, request_id: impl Into<String>) -> Self {
        Self {
            ok: true,
            service: service.into(),
            data,
            request_id: request_id.into(),
        }
    }
}

impl Envelope<ErrorBody> {
    pub fn error(
        service: impl Into<String>,
        status: u16,
        detail: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            ok: false,
            service: service.into(),
            data: ErrorBody {
                status,
                detail: detail.into(),
            },
            request_id: request_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_serializes_request_id_camel_case() {
        let env = Envelope::ok("audit", serde_json::json!({"n": 1}), "rid-1");
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["service"], "audit");
        assert_eq!(json["requestId"], "rid-1");
        assert_eq!(json["data"]["n"], 1);
    }

    #[test]
    fn error_envelope_carries_status_and_detail() {
        let env = Envelope::error("user", 404, "no such user", "rid-2");
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["data"]["status"], 404);
        assert_eq!(json["data"]["detail"], "no such user");
    }
}
