//! Claim sets for the two-token model.
//!
//! CTX is minted once at the public edge per request; HOP is minted per
//! outbound call and lives at most two minutes. Neither is ever persisted.

use serde::{Deserialize, Serialize};

/// End-user projection derived from a validated external credential. Opaque
/// to the fabric; schema is owned by the identity service.
pub type Act = serde_json::Value;

/// Request-scoped context token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtxClaims {
    /// Request id.
    pub rid: String,
    /// Remaining downstream hops; decremented per hop, deny at zero.
    #[serde(rename = "hopBudget")]
    pub hop_budget: u32,
    /// Absolute request deadline, epoch milliseconds.
    #[serde(rename = "deadlineMs")]
    pub deadline_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub act: Option<Act>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl CtxClaims {
    /// Consume one hop from the budget. Returns false when exhausted; the
    /// caller must refuse to fan out further.
    pub fn try_consume_hop(&mut self) -> bool {
        if self.hop_budget == 0 {
            return false;
        }
        self.hop_budget -= 1;
        true
    }
}

/// Per-hop capability token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopClaims {
    /// Caller slug.
    pub iss: String,
    /// Target slug, matched exactly at the receiver.
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    /// Caller slug again, checked against the target's allowed-caller set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub svc: Option<String>,
    pub rid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub act: Option<Act>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_budget_consumes_down_to_zero() {
        let mut ctx = CtxClaims {
            rid: "r".into(),
            hop_budget: 2,
            deadline_ms: 0,
            act: None,
            iss: "gateway".into(),
            iat: 0,
            exp: 0,
        };
        assert!(ctx.try_consume_hop());
        assert!(ctx.try_consume_hop());
        assert!(!ctx.try_consume_hop());
        assert_eq!(ctx.hop_budget, 0);
    }

    #[test]
    fn absent_act_is_omitted_from_wire() {
        let hop = HopClaims {
            iss: "gateway".into(),
            aud: "user".into(),
            iat: 1,
            exp: 2,
            svc: Some("gateway".into()),
            rid: "r".into(),
            act: None,
        };
        let json = serde_json::to_value(&hop).unwrap();
        assert!(json.get("act").is_none());
        assert_eq!(json["aud"], "user");
    }
}
