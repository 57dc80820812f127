//! HTTP API integration tests — exercise the governance endpoints end to end.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use warden_config::WardenConfig;
use warden_server::{build_router, build_state};

fn setup() -> (axum::Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = WardenConfig::default();
    config.gates.receipts_dir = Some(dir.path().to_path_buf());
    config.risk.seed = Some(424_242);
    let state = build_state(config).unwrap();
    (build_router(state), dir)
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// Router construction must be side-effect free: no background tasks, so it
// works outside a tokio runtime and tests can build as many as they like.
#[test]
fn test_router_builds_without_runtime() {
    let (_app, _dir) = setup();
}

// ── Health & metrics ───────────────────────────────────────────

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _dir) = setup();
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _dir) = setup();
    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(ct.contains("text/plain"));
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.contains("warden_http_requests_total"));
    assert!(body.contains("warden_evaluations_total"));
}

// ── Policies & evaluation ──────────────────────────────────────

#[tokio::test]
async fn test_register_and_list_policies() {
    let (app, _dir) = setup();
    let resp = app
        .clone()
        .oneshot(post_json(
            "/policies",
            r#"{"toolId": "database:delete", "environment": "prod", "requiresApproval": true, "riskLevel": "CRITICAL", "allowedRoles": ["admin"], "rateLimitPerMin": 5}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .oneshot(Request::get("/policies").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["tool_id"], "database:delete");
}

#[tokio::test]
async fn test_evaluate_no_policy_fails_open() {
    let (app, _dir) = setup();
    let resp = app
        .oneshot(post_json("/evaluate", r#"{"toolId": "unknown:tool"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["allowed"], true);
    assert_eq!(json["reasons"][0], "no_policy_defined");
    assert_eq!(json["status"], "success");
}

#[tokio::test]
async fn test_evaluate_pending_approval_is_200() {
    let (app, _dir) = setup();
    app.clone()
        .oneshot(post_json(
            "/policies",
            r#"{"toolId": "prod:migrate", "requiresApproval": true}"#,
        ))
        .await
        .unwrap();

    let resp = app
        .oneshot(post_json("/evaluate", r#"{"toolId": "prod:migrate"}"#))
        .await
        .unwrap();
    // Awaiting a human is the expected workflow, not an error.
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["allowed"], false);
    assert_eq!(json["requires_approval"], true);
    assert_eq!(json["status"], "pending_approval");
}

#[tokio::test]
async fn test_evaluate_role_denial_is_403() {
    let (app, _dir) = setup();
    app.clone()
        .oneshot(post_json(
            "/policies",
            r#"{"toolId": "db:write", "allowedRoles": ["admin"]}"#,
        ))
        .await
        .unwrap();

    let resp = app
        .oneshot(post_json(
            "/evaluate",
            r#"{"toolId": "db:write", "context": {"role": "viewer"}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let json = body_json(resp).await;
    assert_eq!(json["reasons"][0], "role_denied:viewer");
}

#[tokio::test]
async fn test_evaluate_missing_tool_id_is_400() {
    let (app, _dir) = setup();
    let resp = app
        .oneshot(post_json("/evaluate", r#"{"toolId": "  "}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_invocations_are_logged_and_filterable() {
    let (app, _dir) = setup();
    app.clone()
        .oneshot(post_json("/evaluate", r#"{"toolId": "a:one"}"#))
        .await
        .unwrap();
    app.clone()
        .oneshot(post_json("/evaluate", r#"{"toolId": "b:two"}"#))
        .await
        .unwrap();

    let resp = app
        .oneshot(
            Request::get("/invocations?toolId=a:one")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["invocations"][0]["tool_id"], "a:one");
}

// ── Budgets ────────────────────────────────────────────────────

#[tokio::test]
async fn test_budget_lazy_default_and_record() {
    let (app, _dir) = setup();
    let resp = app
        .clone()
        .oneshot(
            Request::get("/budgets/USER/alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["limit_usd"], 50.0);
    assert_eq!(json["spent_usd"], 0.0);

    let resp = app
        .clone()
        .oneshot(post_json(
            "/budgets/record",
            r#"{"scopeType": "USER", "scopeId": "alice", "actualCostUsd": 12.5}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(
            Request::get("/budgets/USER/alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["spent_usd"], 12.5);
}

// ── Gates ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_gate_lifecycle_over_http() {
    let (app, dir) = setup();
    let resp = app
        .clone()
        .oneshot(post_json(
            "/gates/request",
            r#"{"intent": "rotate prod keys", "toolsExecuted": ["secrets:rotate"]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "PENDING");
    let gate_id = json["gateId"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(
            Request::get("/gates/pending")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 1);

    let resp = app
        .clone()
        .oneshot(post_json(
            &format!("/gates/{gate_id}/resolve"),
            r#"{"approved": true, "operatorId": "op-1"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "APPROVED");

    // Second resolution finds nothing.
    let resp = app
        .clone()
        .oneshot(post_json(
            &format!("/gates/{gate_id}/resolve"),
            r#"{"approved": false, "operatorId": "op-2"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Durable receipt file exists and is readable over the API.
    assert!(dir.path().join(format!("{gate_id}.json")).exists());
    let resp = app
        .oneshot(
            Request::get(format!("/gates/receipts/{gate_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["validation"], "Human Verified: PASS");
}

#[tokio::test]
async fn test_gate_empty_intent_is_400() {
    let (app, _dir) = setup();
    let resp = app
        .oneshot(post_json("/gates/request", r#"{"intent": ""}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── Monte Carlo ────────────────────────────────────────────────

#[tokio::test]
async fn test_readiness_query_params() {
    let (app, _dir) = setup();
    let resp = app
        .oneshot(
            Request::get("/api/monte-carlo/readiness?errorRate=0.5&cpu=0.9&memory=0.9&health=0.2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert!(json["score"].as_u64().unwrap() < 60);
    assert_eq!(json["recommendation"], "HOLD");
}

#[tokio::test]
async fn test_simulation_run_and_history() {
    let (app, _dir) = setup();
    let resp = app
        .clone()
        .oneshot(post_json(
            "/api/monte-carlo/run",
            r#"{"scenario": {"name": "deploy", "baseSuccessRate": 1.0}, "iterations": 1000}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["confidence"], 100.0);
    assert_eq!(json["risk_grade"], "LOW");
    assert_eq!(json["seed"], 424_242);

    let resp = app
        .oneshot(
            Request::get("/api/monte-carlo/history?limit=5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["scenario"], "deploy");
}

// ── Observability ──────────────────────────────────────────────

#[tokio::test]
async fn test_drift_scan_and_listing() {
    let (app, _dir) = setup();
    let config_dir = tempfile::tempdir().unwrap();
    std::fs::write(config_dir.path().join("app.toml"), "x = 1").unwrap();

    let scan_body = serde_json::json!({"directory": config_dir.path()}).to_string();
    app.clone().oneshot(post_json("/api/observability/drift/scan", &scan_body)).await.unwrap();

    std::fs::write(config_dir.path().join("app.toml"), "x = 2").unwrap();
    let resp = app
        .clone()
        .oneshot(post_json("/api/observability/drift/scan", &scan_body))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["drifts"].as_array().unwrap().len(), 1);

    let resp = app
        .oneshot(
            Request::get("/api/observability/drift")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["latest"][0]["kind"], "CONFIG");
}

#[tokio::test]
async fn test_incident_flow_over_http() {
    let (app, _dir) = setup();
    let resp = app
        .clone()
        .oneshot(post_json(
            "/api/observability/incidents/signals",
            r#"{"errorRate": 0.20}"#,
        ))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["severity"], "critical");
    assert_eq!(json[0]["actions"][0]["action"], "emergency_pause");
    let id = json[0]["id"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(
            Request::patch(format!("/api/observability/incidents/{id}"))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"status": "resolved", "action": "rolled back"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(
            Request::get(format!("/api/observability/incidents/{id}/postmortem"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert!(json["duration_seconds"].is_number());
    assert_eq!(json["impact"], "TBD");

    let resp = app
        .oneshot(
            Request::get("/api/observability/incidents/open")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(body_json(resp).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_postmortem_unknown_id_is_404() {
    let (app, _dir) = setup();
    let resp = app
        .oneshot(
            Request::get(format!(
                "/api/observability/incidents/{}/postmortem",
                uuid::Uuid::new_v4()
            ))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_knowledge_receipts_flow() {
    let (app, _dir) = setup();
    let resp = app
        .clone()
        .oneshot(post_json(
            "/api/knowledge/ingest",
            r#"{"source": "slack", "sourceId": "msg-1"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let json = body_json(resp).await;
    assert_eq!(json["operation"], "INGEST");

    app.clone()
        .oneshot(post_json(
            "/api/knowledge/ingest",
            r#"{"operation": "DROP", "source": "slack", "sourceId": "msg-2", "stored": false, "reason": "duplicate"}"#,
        ))
        .await
        .unwrap();

    let resp = app
        .clone()
        .oneshot(
            Request::get("/api/knowledge/receipts/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["ingested"], 1);
    assert_eq!(json["dropped"], 1);
    assert_eq!(json["stored_rate"], 0.5);

    let resp = app
        .oneshot(
            Request::get("/api/knowledge/receipts?stored=false")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["reason"], "duplicate");
}

#[tokio::test]
async fn test_drop_without_reason_is_400() {
    let (app, _dir) = setup();
    let resp = app
        .oneshot(post_json(
            "/api/knowledge/ingest",
            r#"{"operation": "DROP", "source": "slack", "stored": false}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── Status & auth ──────────────────────────────────────────────

#[tokio::test]
async fn test_status_aggregate() {
    let (app, _dir) = setup();
    app.clone()
        .oneshot(post_json("/evaluate", r#"{"toolId": "x:y"}"#))
        .await
        .unwrap();
    let resp = app
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["policy"]["invocations_logged"], 1);
    assert_eq!(json["gates_pending"], 0);
    assert!(json["incidents"]["total"].is_number());
}

#[tokio::test]
async fn test_api_key_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = WardenConfig::default();
    config.gates.receipts_dir = Some(dir.path().to_path_buf());
    config.server.api_key = Some("sekrit".into());
    let app = build_router(build_state(config).unwrap());

    // Health stays open.
    let resp = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(Request::get("/policies").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .oneshot(
            Request::get("/policies")
                .header("authorization", "Bearer sekrit")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
