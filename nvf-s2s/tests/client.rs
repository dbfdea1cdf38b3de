use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use http::Method;
use url::Url;

use nvf_mirror::{ConfigMirror, ServiceConfig};
use nvf_policy::{AssertionMode, RoutePolicy, RoutePolicyStore, Rule};
use nvf_s2s::{CallParams, S2sError, SvcClient};
use nvf_token::{KeyRing, StaticAttestor, TokenMinter};

#[derive(Clone, Default)]
struct Captured {
    headers: Arc<std::sync::Mutex<Option<HeaderMap>>>,
}

async fn echo(State(captured): State<Captured>, headers: HeaderMap) -> Json<serde_json::Value> {
    *captured.headers.lock().unwrap() = Some(headers);
    Json(serde_json::json!({"ok": true, "service": "user", "data": {}, "requestId": "rid"}))
}

async fn plain(State(captured): State<Captured>, headers: HeaderMap) -> &'static str {
    *captured.headers.lock().unwrap() = Some(headers);
    "plain text"
}

async fn teapot() -> (http::StatusCode, &'static str) {
    (http::StatusCode::IM_A_TEAPOT, "short and stout")
}

async fn slow() -> Json<serde_json::Value> {
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    Json(serde_json::json!({}))
}

async fn spawn_target(captured: Captured) -> String {
    let app = Router::new()
        .route("/api/user/v1/users/get", post(echo))
        .route("/api/user/v1/users/42", get(echo))
        .route("/api/user/v1/plain/get", post(plain))
        .route("/api/user/v1/teapot/get", post(teapot))
        .route("/api/user/v1/slow/get", post(slow))
        .with_state(captured);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn client_for(base_url: &str) -> SvcClient {
    let mirror = Arc::new(ConfigMirror::new(
        Url::parse("http://127.0.0.1:1/").unwrap(),
    ));
    mirror.put(ServiceConfig {
        env: "dev".to_string(),
        slug: "user".to_string(),
        major_version: 1,
        base_url: base_url.to_string(),
        enabled: true,
        is_s2s_target: true,
        expose_health: true,
        outbound_api_prefix: "/api".to_string(),
        updated_at: 1,
        revision: 1,
    });
    mirror.put(ServiceConfig {
        env: "dev".to_string(),
        slug: "dark".to_string(),
        major_version: 1,
        base_url: base_url.to_string(),
        enabled: false,
        is_s2s_target: true,
        expose_health: false,
        outbound_api_prefix: "/api".to_string(),
        updated_at: 1,
        revision: 1,
    });

    let ring = Arc::new(
        KeyRing::new(Arc::new(StaticAttestor::new("kms-dev")))
            .await
            .unwrap(),
    );
    let minter = Arc::new(TokenMinter::new(ring, "gateway"));

    let policy = Arc::new(RoutePolicyStore::new());
    policy
        .load(RoutePolicy {
            slug: "user".to_string(),
            major_version: 1,
            revision: 1,
            rules: vec![
                Rule::new("POST", "/v1/users/get", "getUser").assertion(AssertionMode::Optional),
                Rule::new("POST", "/v1/plain/get", "plain").assertion(AssertionMode::Forbidden),
            ],
        })
        .unwrap();

    SvcClient::new(mirror, minter, policy, 1, "/api")
}

#[tokio::test]
async fn structured_call_propagates_fabric_headers() {
    let captured = Captured::default();
    let base = spawn_target(captured.clone()).await;
    let client = client_for(&base).await;

    let response = client
        .call(
            CallParams::get("dev", "user", 1)
                .structured("users", "get")
                .method(Method::POST)
                .json_body(serde_json::json!({"id": 42}))
                .request_id("rid-77"),
        )
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert!(response.json.is_some());

    let headers = captured.headers.lock().unwrap().clone().unwrap();
    assert_eq!(headers.get("x-request-id").unwrap(), "rid-77");
    assert_eq!(headers.get("x-service-name").unwrap(), "gateway");
    assert_eq!(headers.get("x-api-version").unwrap(), "1");
    let auth = headers.get("authorization").unwrap().to_str().unwrap();
    assert!(auth.starts_with("Bearer "));
}

#[tokio::test]
async fn extra_headers_cannot_override_auth_or_request_id() {
    let captured = Captured::default();
    let base = spawn_target(captured.clone()).await;
    let client = client_for(&base).await;

    let mut params = CallParams::get("dev", "user", 1)
        .structured("users", "get")
        .method(Method::POST)
        .json_body(serde_json::json!({}))
        .request_id("rid-88");
    params.headers = vec![
        ("Authorization".to_string(), "Bearer forged".to_string()),
        ("X-Request-Id".to_string(), "spoofed".to_string()),
        ("X-Extra".to_string(), "kept".to_string()),
    ];
    client.call(params).await.unwrap();

    let headers = captured.headers.lock().unwrap().clone().unwrap();
    assert_eq!(headers.get("x-request-id").unwrap(), "rid-88");
    assert_ne!(headers.get("authorization").unwrap(), "Bearer forged");
    assert_eq!(headers.get("x-extra").unwrap(), "kept");
}

#[tokio::test]
async fn raw_passthrough_preserves_path() {
    let captured = Captured::default();
    let base = spawn_target(captured.clone()).await;
    let client = client_for(&base).await;

    let response = client
        .call(CallParams::get("dev", "user", 1).raw("/api/user/v1/users/42"))
        .await
        .unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn raw_passthrough_outside_prefix_is_refused() {
    let captured = Captured::default();
    let base = spawn_target(captured.clone()).await;
    let client = client_for(&base).await;

    let err = client
        .call(CallParams::get("dev", "user", 1).raw("/internal/debug"))
        .await
        .expect_err("path escapes the API prefix");
    assert!(matches!(err, S2sError::RawPathOutsidePrefix { .. }));
}

#[tokio::test]
async fn unauthorized_target_surfaces_reason() {
    let captured = Captured::default();
    let base = spawn_target(captured.clone()).await;
    let client = client_for(&base).await;

    let err = client
        .call(
            CallParams::get("dev", "dark", 1)
                .structured("users", "get")
                .method(Method::POST),
        )
        .await
        .expect_err("disabled target");
    match err {
        S2sError::UnauthorizedCall { slug, reason, .. } => {
            assert_eq!(slug, "dark");
            assert_eq!(reason, "DISABLED");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn non_2xx_carries_status_and_snippet() {
    let captured = Captured::default();
    let base = spawn_target(captured.clone()).await;
    let client = client_for(&base).await;

    let err = client
        .call(
            CallParams::get("dev", "user", 1)
                .structured("teapot", "get")
                .method(Method::POST)
                .json_body(serde_json::json!({})),
        )
        .await
        .expect_err("teapot answers 418");
    match err {
        S2sError::UpstreamNon2xx {
            status, snippet, ..
        } => {
            assert_eq!(status, 418);
            assert!(snippet.contains("stout"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn deadline_expiry_is_a_timeout() {
    let captured = Captured::default();
    let base = spawn_target(captured.clone()).await;
    let client = client_for(&base).await;

    let err = client
        .call(
            CallParams::get("dev", "user", 1)
                .structured("slow", "get")
                .method(Method::POST)
                .json_body(serde_json::json!({}))
                .timeout_ms(50),
        )
        .await
        .expect_err("upstream is slower than the deadline");
    assert!(matches!(err, S2sError::UpstreamTimeout { timeout_ms: 50, .. }));
}

#[tokio::test]
async fn forbidden_route_policy_drops_act_from_hop() {
    let captured = Captured::default();
    let base = spawn_target(captured.clone()).await;
    let client = client_for(&base).await;

    let mut params = CallParams::get("dev", "user", 1)
        .structured("plain", "get")
        .method(Method::POST)
        .json_body(serde_json::json!({}));
    params.act = Some(serde_json::json!({"id": "u-1"}));
    // The plain/get rule forbids assertions: the call itself still succeeds
    // (the target returns text, so skip JSON expectations).
    let response = client.call(params).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.json.is_none());

    // Token minted without act: decode the payload segment and check.
    let headers = captured.headers.lock().unwrap().clone().unwrap();
    let auth = headers.get("authorization").unwrap().to_str().unwrap();
    let token = auth.trim_start_matches("Bearer ");
    let payload = token.split('.').nth(1).unwrap();
    use base64::Engine;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .unwrap();
    let claims: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(claims.get("act").is_none());
}

#[tokio::test]
async fn hop_budget_spends_down_then_denies() {
    let captured = Captured::default();
    let base = spawn_target(captured.clone()).await;
    let client = client_for(&base).await;

    let mut ctx = nvf_token::CtxClaims {
        rid: "rid-budget".to_string(),
        hop_budget: 2,
        deadline_ms: 0,
        act: None,
        iss: "gateway".to_string(),
        iat: 0,
        exp: 0,
    };
    let params = || {
        CallParams::get("dev", "user", 1)
            .structured("users", "get")
            .method(Method::POST)
            .json_body(serde_json::json!({}))
    };

    client.call_with_ctx(&mut ctx, params()).await.unwrap();
    client.call_with_ctx(&mut ctx, params()).await.unwrap();
    assert_eq!(ctx.hop_budget, 0);

    let err = client
        .call_with_ctx(&mut ctx, params())
        .await
        .expect_err("third hop exceeds the budget");
    assert!(matches!(err, S2sError::HopBudgetExhausted { ref rid } if rid == "rid-budget"));

    let headers = captured.headers.lock().unwrap().clone().unwrap();
    assert_eq!(headers.get("x-request-id").unwrap(), "rid-budget");
}
