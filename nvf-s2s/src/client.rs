//! Outbound S2S client.
//!
//! Every call resolves its target through the config mirror, mints a fresh
//! hop token, and runs under a hard deadline. Responses come back as a
//! structured [`UpstreamResponse`]; non-2xx always surfaces as an error
//! carrying the target identity and a body snippet. No retries here —
//! callers and writers own that decision.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use tracing::{debug, warn};

use nvf_core::headers::{X_API_VERSION, X_NV_CONTRACT, X_REQUEST_ID, X_SERVICE_NAME};
use nvf_mirror::ConfigMirror;
use nvf_policy::{AssertionMode, RoutePolicyStore};
use nvf_token::{Act, TokenMinter};

use crate::error::S2sError;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const SNIPPET_MAX: usize = 512;

/// Where the request goes, relative to the resolved target.
#[derive(Debug, Clone)]
pub enum CallPath {
    /// `baseUrl + outboundApiPrefix + /<slug>/v<version>/<dtoType>/<op>`.
    Structured { dto_type: String, op: String },
    /// `baseUrl + fullPath`, bit-for-bit; must stay under the API prefix.
    Raw { full_path: String },
}

/// Parameters for one outbound call.
#[derive(Debug, Clone)]
pub struct CallParams {
    pub env: String,
    pub slug: String,
    pub major_version: u16,
    pub method: Method,
    pub path: CallPath,
    pub body: Option<serde_json::Value>,
    /// Extra headers; never override auth or the request id.
    pub headers: Vec<(String, String)>,
    pub request_id: Option<String>,
    pub timeout_ms: Option<u64>,
    /// End-user projection from the CTX; dropped when the target route's
    /// policy forbids assertions.
    pub act: Option<Act>,
    /// Contract id attached as `X-NV-Contract` on body-carrying calls.
    pub contract: Option<String>,
}

impl CallParams {
    pub fn get(env: impl Into<String>, slug: impl Into<String>, major_version: u16) -> Self {
        Self {
            env: env.into(),
            slug: slug.into(),
            major_version,
            method: Method::GET,
            path: CallPath::Raw {
                full_path: String::new(),
            },
            body: None,
            headers: Vec::new(),
            request_id: None,
            timeout_ms: None,
            act: None,
            contract: None,
        }
    }

    pub fn structured(mut self, dto_type: impl Into<String>, op: impl Into<String>) -> Self {
        self.path = CallPath::Structured {
            dto_type: dto_type.into(),
            op: op.into(),
        };
        self
    }

    pub fn raw(mut self, full_path: impl Into<String>) -> Self {
        self.path = CallPath::Raw {
            full_path: full_path.into(),
        };
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn json_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn request_id(mut self, rid: impl Into<String>) -> Self {
        self.request_id = Some(rid.into());
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }
}

/// Fully read upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Bytes,
    /// Present when the body parsed as JSON.
    pub json: Option<serde_json::Value>,
}

impl UpstreamResponse {
    /// The parsed body, or `UpstreamBadJson` when it did not parse.
    pub fn require_json(&self) -> Result<&serde_json::Value, S2sError> {
        self.json
            .as_ref()
            .ok_or_else(|| S2sError::UpstreamBadJson("expected a JSON body".to_string()))
    }
}

pub struct SvcClient {
    mirror: Arc<ConfigMirror>,
    minter: Arc<TokenMinter>,
    policy: Arc<RoutePolicyStore>,
    client: reqwest::Client,
    /// This caller's major API version, propagated as `X-Api-Version`.
    caller_version: u16,
    api_prefix: String,
}

impl SvcClient {
    pub fn new(
        mirror: Arc<ConfigMirror>,
        minter: Arc<TokenMinter>,
        policy: Arc<RoutePolicyStore>,
        caller_version: u16,
        api_prefix: impl Into<String>,
    ) -> Self {
        Self {
            mirror,
            minter,
            policy,
            client: reqwest::Client::new(),
            caller_version,
            api_prefix: api_prefix.into(),
        }
    }

    /// Execute one S2S call charged against a request's context token:
    /// decrements the hop budget and refuses to fan out once it is spent.
    /// The caller re-mints the CTX from the mutated claims when forwarding.
    pub async fn call_with_ctx(
        &self,
        ctx: &mut nvf_token::CtxClaims,
        mut params: CallParams,
    ) -> Result<UpstreamResponse, S2sError> {
        if !ctx.try_consume_hop() {
            warn!(rid = %ctx.rid, "hop budget exhausted");
            return Err(S2sError::HopBudgetExhausted {
                rid: ctx.rid.clone(),
            });
        }
        params.request_id.get_or_insert_with(|| ctx.rid.clone());
        if params.act.is_none() {
            params.act = ctx.act.clone();
        }
        self.call(params).await
    }

    /// Execute one S2S call end to end.
    pub async fn call(&self, params: CallParams) -> Result<UpstreamResponse, S2sError> {
        let target = self
            .mirror
            .resolve(&params.env, &params.slug, params.major_version)
            .await?;
        if !target.is_authorized {
            let reason = target
                .deny_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "UNKNOWN".to_string());
            warn!(slug = %params.slug, version = params.major_version, %reason, "unauthorized S2S call");
            return Err(S2sError::UnauthorizedCall {
                slug: params.slug,
                major_version: params.major_version,
                reason,
            });
        }

        let (url, policy_path) = match &params.path {
            CallPath::Structured { dto_type, op } => {
                let path = format!(
                    "/{}/v{}/{}/{}",
                    target.slug, target.major_version, dto_type, op
                );
                (
                    format!("{}{}{}", target.base_url, target.outbound_api_prefix, path),
                    path,
                )
            }
            CallPath::Raw { full_path } => {
                if !full_path.starts_with(&self.api_prefix) {
                    return Err(S2sError::RawPathOutsidePrefix {
                        path: full_path.clone(),
                        prefix: self.api_prefix.clone(),
                    });
                }
                (format!("{}{}", target.base_url, full_path), full_path.clone())
            }
        };

        let rid = params
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        // The target route's assertion policy decides whether the act
        // projection rides along on this hop.
        let act = match self.assertion_mode_for(&target.slug, target.major_version, &params) {
            Some(AssertionMode::Forbidden) | None => None,
            Some(AssertionMode::Required) | Some(AssertionMode::Optional) => params.act.clone(),
        };

        let hop = self.minter.mint_hop(&target.slug, &rid, act)?;

        let timeout_ms = params.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
        let mut request = self
            .client
            .request(params.method.clone(), &url)
            .bearer_auth(&hop)
            .header(X_REQUEST_ID.as_str(), rid.as_str())
            .header(X_SERVICE_NAME.as_str(), self.minter.service_slug())
            .header(X_API_VERSION.as_str(), self.caller_version.to_string())
            .timeout(Duration::from_millis(timeout_ms));

        for (name, value) in &params.headers {
            let lowered = name.to_ascii_lowercase();
            if lowered == "authorization" || lowered == X_REQUEST_ID.as_str() {
                continue;
            }
            request = request.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &params.body {
            if let Some(contract) = &params.contract {
                request = request.header(X_NV_CONTRACT.as_str(), contract.as_str());
            }
            request = request.json(body);
        }

        debug!(%url, rid = %rid, method = %params.method, "S2S call begin");
        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                warn!(slug = %target.slug, timeout_ms, rid = %rid, "S2S call timed out");
                S2sError::UpstreamTimeout {
                    slug: target.slug.clone(),
                    timeout_ms,
                }
            } else {
                warn!(slug = %target.slug, error = %err, rid = %rid, "S2S transport failure");
                S2sError::UpstreamNetwork(err.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| S2sError::UpstreamNetwork(err.to_string()))?;

        if !(200..300).contains(&status) {
            let snippet = String::from_utf8_lossy(&body)
                .chars()
                .take(SNIPPET_MAX)
                .collect::<String>();
            warn!(slug = %target.slug, status, rid = %rid, "S2S call non-2xx");
            return Err(S2sError::UpstreamNon2xx {
                slug: target.slug,
                major_version: target.major_version,
                status,
                snippet,
            });
        }

        let json = if body.is_empty() {
            None
        } else {
            serde_json::from_slice(&body).ok()
        };
        debug!(slug = %target.slug, status, rid = %rid, path = %policy_path, "S2S call success");
        Ok(UpstreamResponse { status, body, json })
    }

    fn assertion_mode_for(
        &self,
        slug: &str,
        major_version: u16,
        params: &CallParams,
    ) -> Option<AssertionMode> {
        if params.act.is_none() {
            return None;
        }
        let path = match &params.path {
            CallPath::Structured { dto_type, op } => {
                format!("/v{major_version}/{dto_type}/{op}")
            }
            CallPath::Raw { full_path } => {
                let unprefixed = full_path
                    .strip_prefix(&self.api_prefix)
                    .unwrap_or(full_path);
                unprefixed
                    .strip_prefix(&format!("/{slug}"))
                    .unwrap_or(unprefixed)
                    .to_string()
            }
        };
        self.policy
            .lookup(slug, major_version, params.method.as_str(), &path)
            .rule
            .map(|r| r.user_assertion)
    }
}
