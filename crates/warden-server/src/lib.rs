//! # warden-server
//!
//! HTTP API for the governance control plane:
//!
//! - policy registration and evaluation, with a full invocation audit trail
//! - approval gates and durable receipts
//! - Monte Carlo readiness/risk endpoints
//! - drift, incident, and knowledge-receipt observability

pub mod metrics;

use axum::{
    Router,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use warden_config::WardenConfig;
use warden_core::{CallContext, Decision, InvocationStatus, WardenError};
use warden_governance::{
    ApprovalGates, BudgetPeriod, BudgetService, InvocationFilter, Policy, PolicyEngine,
};
use warden_observe::{
    DriftDetector, HttpProbe, IncidentManager, IncidentSignals, IncidentThresholds,
    IncidentUpdate, MemoryReceipts, NewIncident, ReceiptFilter, ReceiptInput, ReceiptOp,
    ServiceSpec,
};
use warden_risk::{MonteCarloEngine, ReadinessSignals, Scenario};

/// Shared server state: one instance of every engine plus metrics.
pub struct AppState {
    pub config: WardenConfig,
    pub policy: Arc<PolicyEngine>,
    pub budget: Arc<BudgetService>,
    pub gates: ApprovalGates,
    pub monte_carlo: MonteCarloEngine,
    pub drift: DriftDetector,
    pub incidents: IncidentManager,
    pub receipts: MemoryReceipts,
    pub probe: HttpProbe,
    pub metrics: metrics::Metrics,
}

/// Wire every engine up from config.
pub fn build_state(config: WardenConfig) -> warden_core::Result<Arc<AppState>> {
    let budget = Arc::new(BudgetService::in_memory(
        config.governance.default_budget_usd,
        Duration::from_secs(config.governance.budget_cache_ttl_secs),
    ));
    let policy = Arc::new(PolicyEngine::with_limits(
        Some(Arc::clone(&budget)),
        config.governance.max_invocations,
        config.governance.default_estimated_cost_usd,
    ));
    let gates = ApprovalGates::new(config.gates.resolve_receipts_dir())?;
    let monte_carlo = MonteCarloEngine::new(
        u64::from(config.risk.default_iterations),
        config.risk.seed,
        config.risk.max_history,
    );
    let drift = DriftDetector::new(config.drift.max_events);
    let incidents = IncidentManager::new(
        IncidentThresholds {
            error_rate_critical: config.incidents.error_rate_critical,
            error_rate_high: config.incidents.error_rate_high,
            consecutive_failures: config.incidents.consecutive_failures,
        },
        config.incidents.max_incidents,
    );
    let receipts = MemoryReceipts::new(5_000);
    let probe = HttpProbe::new(Duration::from_secs(config.drift.probe_timeout_secs))?;

    Ok(Arc::new(AppState {
        config,
        policy,
        budget,
        gates,
        monte_carlo,
        drift,
        incidents,
        receipts,
        probe,
        metrics: metrics::Metrics::new(),
    }))
}

/// Build the Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/policies", get(list_policies_handler).post(add_policy_handler))
        .route("/evaluate", post(evaluate_handler))
        .route("/invocations", get(invocations_handler))
        .route("/budgets/{scope_type}/{scope_id}", get(budget_handler))
        .route("/budgets/record", post(record_usage_handler))
        .route("/gates/pending", get(gates_pending_handler))
        .route("/gates/request", post(gates_request_handler))
        .route("/gates/{id}/resolve", post(gates_resolve_handler))
        .route("/gates/receipts/{id}", get(gate_receipt_handler))
        .route("/api/monte-carlo/readiness", get(readiness_handler))
        .route("/api/monte-carlo/run", post(run_simulation_handler))
        .route("/api/monte-carlo/history", get(simulation_history_handler))
        .route("/api/observability/drift", get(drift_handler))
        .route("/api/observability/drift/scan", post(drift_scan_handler))
        .route(
            "/api/observability/drift/connectivity",
            post(connectivity_handler),
        )
        .route(
            "/api/observability/incidents",
            get(incidents_handler).post(create_incident_handler),
        )
        .route("/api/observability/incidents/open", get(open_incidents_handler))
        .route(
            "/api/observability/incidents/signals",
            post(incident_signals_handler),
        )
        .route(
            "/api/observability/incidents/{id}",
            patch(update_incident_handler),
        )
        .route(
            "/api/observability/incidents/{id}/postmortem",
            get(postmortem_handler),
        )
        .route("/api/knowledge/receipts", get(receipts_handler))
        .route("/api/knowledge/receipts/stats", get(receipt_stats_handler))
        .route("/api/knowledge/ingest", post(ingest_handler))
        .route("/status", get(status_handler));

    // Apply API key auth if configured
    let api_routes = if state.config.server.api_key.is_some() {
        api_routes.layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
    } else {
        api_routes
    };

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            track_metrics,
        ));

    let cors = state.config.server.cors;
    let mut router = router.with_state(state);
    if cors {
        router = router.layer(CorsLayer::permissive());
    }
    router
}

/// Evict stale per-minute rate counters in the background. Called once from
/// the serving path; building a router has no side effects.
pub fn spawn_rate_counter_cleanup(state: &Arc<AppState>) -> tokio::task::JoinHandle<()> {
    let policy = Arc::clone(&state.policy);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            policy.cleanup_rate_counters();
        }
    })
}

/// Error wrapper mapping the domain taxonomy onto HTTP statuses.
pub struct ApiError(WardenError);

impl From<WardenError> for ApiError {
    fn from(err: WardenError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            WardenError::NotFound { .. } => StatusCode::NOT_FOUND,
            WardenError::Validation { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(serde_json::json!({"error": self.0.to_string()}))).into_response()
    }
}

/// Count every request, and every 4xx/5xx response.
async fn track_metrics(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    state.metrics.inc_http_requests();
    let response = next.run(request).await;
    if response.status().is_client_error() || response.status().is_server_error() {
        state.metrics.inc_http_errors();
    }
    response
}

/// Middleware that checks the Authorization header against the configured API key.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(ref expected_key) = state.config.server.api_key {
        let provided = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match provided {
            Some(key) if key == expected_key => {}
            _ => {
                warn!("unauthorized API request, invalid or missing API key");
                return Err(StatusCode::UNAUTHORIZED);
            }
        }
    }
    Ok(next.run(request).await)
}

// ── Health, metrics, status ────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: state.metrics.uptime_secs(),
    })
}

/// Prometheus-compatible metrics endpoint.
async fn metrics_handler(
    State(state): State<Arc<AppState>>,
) -> (
    StatusCode,
    [(axum::http::header::HeaderName, &'static str); 1],
    String,
) {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.render_prometheus(),
    )
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "policy": state.policy.status(),
        "gates_pending": state.gates.pending().len(),
        "monte_carlo": state.monte_carlo.status(),
        "drift": state.drift.status(),
        "incidents": state.incidents.status(),
        "receipts": state.receipts.stats(),
    }))
}

// ── Policies & evaluation ──────────────────────────────────────

async fn list_policies_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Policy>> {
    Json(state.policy.policies())
}

async fn add_policy_handler(
    State(state): State<Arc<AppState>>,
    Json(policy): Json<Policy>,
) -> Result<(StatusCode, Json<Policy>), ApiError> {
    if policy.tool_id.trim().is_empty() {
        return Err(WardenError::validation("tool_id", "must not be empty").into());
    }
    state.policy.add_policy(policy.clone());
    Ok((StatusCode::CREATED, Json(policy)))
}

#[derive(Deserialize)]
struct EvaluateRequest {
    #[serde(alias = "toolId")]
    tool_id: String,
    #[serde(default)]
    context: CallContext,
    /// Request summary carried into the invocation log.
    #[serde(default)]
    request: serde_json::Value,
}

#[derive(Serialize)]
struct EvaluateResponse {
    #[serde(flatten)]
    decision: Decision,
    status: InvocationStatus,
}

/// Evaluate a tool call. Denials come back as 403 with machine-readable
/// reasons; pending approval is a 200 — it is the expected workflow, not an
/// error.
async fn evaluate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EvaluateRequest>,
) -> Result<Response, ApiError> {
    if req.tool_id.trim().is_empty() {
        return Err(WardenError::validation("tool_id", "must not be empty").into());
    }
    let decision = state.policy.evaluate(&req.tool_id, &req.context).await?;
    let status = decision.status();
    state.metrics.inc_evaluations(!decision.allowed);

    let actor = req.context.actor.clone().unwrap_or_default();
    state.policy.log_invocation(
        &req.tool_id,
        &actor,
        req.context.environment,
        req.request,
        None,
        status,
        decision.budget_id.clone(),
    );

    let code = match status {
        InvocationStatus::Denied => StatusCode::FORBIDDEN,
        _ => StatusCode::OK,
    };
    Ok((code, Json(EvaluateResponse { decision, status })).into_response())
}

#[derive(Deserialize)]
struct InvocationParams {
    #[serde(default, alias = "toolId")]
    tool_id: Option<String>,
    #[serde(default)]
    status: Option<InvocationStatus>,
    #[serde(default, alias = "actorId")]
    actor_id: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

async fn invocations_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InvocationParams>,
) -> Json<serde_json::Value> {
    let filter = InvocationFilter {
        tool_id: params.tool_id,
        status: params.status,
        actor_id: params.actor_id,
    };
    let records = state.policy.invocations(&filter, params.limit);
    Json(serde_json::json!({"count": records.len(), "invocations": records}))
}

// ── Budgets ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct BudgetParams {
    #[serde(default = "default_period")]
    period: BudgetPeriod,
}

fn default_period() -> BudgetPeriod {
    BudgetPeriod::Monthly
}

async fn budget_handler(
    State(state): State<Arc<AppState>>,
    Path((scope_type, scope_id)): Path<(String, String)>,
    Query(params): Query<BudgetParams>,
) -> Result<Json<warden_governance::Budget>, ApiError> {
    let budget = state
        .budget
        .get_budget(&scope_type, &scope_id, params.period)
        .await?;
    Ok(Json(budget))
}

#[derive(Deserialize)]
struct RecordUsageRequest {
    #[serde(alias = "scopeType")]
    scope_type: String,
    #[serde(alias = "scopeId")]
    scope_id: String,
    #[serde(alias = "actualCostUsd")]
    actual_cost_usd: f64,
    #[serde(default)]
    details: serde_json::Value,
}

async fn record_usage_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecordUsageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.actual_cost_usd < 0.0 {
        return Err(WardenError::validation("actual_cost_usd", "must be non-negative").into());
    }
    state
        .budget
        .record_usage(&req.scope_type, &req.scope_id, req.actual_cost_usd, req.details)
        .await?;
    Ok(Json(serde_json::json!({"recorded": true})))
}

// ── Approval gates ─────────────────────────────────────────────

#[derive(Deserialize)]
struct GateRequest {
    intent: String,
    #[serde(default, alias = "modelDecision")]
    model_decision: serde_json::Value,
    #[serde(default, alias = "toolsExecuted")]
    tools_executed: Vec<String>,
    #[serde(default, alias = "projectedROI", alias = "projectedRoi")]
    projected_roi: Option<String>,
}

async fn gates_pending_handler(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<warden_governance::ApprovalRequest>> {
    Json(state.gates.pending())
}

async fn gates_request_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = state.gates.request_approval(
        &req.intent,
        req.model_decision,
        req.tools_executed,
        req.projected_roi,
    )?;
    state.metrics.inc_gates_requested();
    Ok(Json(serde_json::json!({"gateId": id, "status": "PENDING"})))
}

#[derive(Deserialize)]
struct ResolveRequest {
    approved: bool,
    #[serde(alias = "operatorId")]
    operator_id: String,
    #[serde(default)]
    signature: Option<String>,
}

async fn gates_resolve_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<warden_governance::ApprovalRequest>, ApiError> {
    let resolved = state
        .gates
        .resolve(id, req.approved, &req.operator_id, req.signature)?;
    state.metrics.inc_gates_resolved(req.approved);
    Ok(Json(resolved))
}

async fn gate_receipt_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<warden_governance::Receipt>, ApiError> {
    Ok(Json(state.gates.receipt(id)?))
}

// ── Monte Carlo ────────────────────────────────────────────────

/// Readiness folds in the live open-incident count unless the caller
/// supplied one explicitly.
async fn readiness_handler(
    State(state): State<Arc<AppState>>,
    Query(mut signals): Query<ReadinessSignals>,
) -> Json<warden_risk::ReadinessReport> {
    if signals.open_incidents == 0 {
        signals.open_incidents = state.incidents.open().len() as u32;
    }
    Json(state.monte_carlo.quick_readiness(&signals))
}

#[derive(Deserialize)]
struct RunRequest {
    #[serde(default)]
    scenario: Scenario,
    #[serde(default)]
    iterations: Option<u64>,
}

async fn run_simulation_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunRequest>,
) -> Json<warden_risk::RunResult> {
    let result = state.monte_carlo.run_full_cycle(&req.scenario, req.iterations);
    state.metrics.inc_simulations();
    Json(result)
}

#[derive(Deserialize)]
struct LimitParams {
    #[serde(default = "default_history_limit")]
    limit: usize,
}

fn default_history_limit() -> usize {
    20
}

async fn simulation_history_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> Json<Vec<warden_risk::RunResult>> {
    Json(state.monte_carlo.history(params.limit))
}

// ── Drift ──────────────────────────────────────────────────────

async fn drift_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": state.drift.status(),
        "latest": state.drift.latest(20),
    }))
}

#[derive(Deserialize)]
struct ScanRequest {
    directory: String,
}

async fn drift_scan_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScanRequest>,
) -> Result<Json<warden_observe::ScanReport>, ApiError> {
    if req.directory.trim().is_empty() {
        return Err(WardenError::validation("directory", "must not be empty").into());
    }
    let report = state.drift.scan_directory(
        std::path::Path::new(&req.directory),
        &state.config.drift.scan_extensions,
    );
    Ok(Json(report))
}

#[derive(Deserialize)]
struct ConnectivityRequest {
    services: Vec<ServiceSpec>,
}

async fn connectivity_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConnectivityRequest>,
) -> Json<Vec<warden_observe::ConnectivityResult>> {
    Json(state.drift.check_connectivity(&state.probe, &req.services).await)
}

// ── Incidents ──────────────────────────────────────────────────

async fn incidents_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> Json<Vec<warden_observe::Incident>> {
    Json(state.incidents.all(params.limit))
}

async fn open_incidents_handler(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<warden_observe::Incident>> {
    Json(state.incidents.open())
}

async fn create_incident_handler(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewIncident>,
) -> (StatusCode, Json<warden_observe::Incident>) {
    let incident = state.incidents.create(new);
    state.metrics.add_incidents_opened(1);
    info!(id = %incident.id, "incident created via API");
    (StatusCode::CREATED, Json(incident))
}

async fn incident_signals_handler(
    State(state): State<Arc<AppState>>,
    Json(signals): Json<IncidentSignals>,
) -> Json<Vec<warden_observe::Incident>> {
    let created = state.incidents.evaluate_signals(&signals);
    state.metrics.add_incidents_opened(created.len() as u64);
    Json(created)
}

async fn update_incident_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<IncidentUpdate>,
) -> Result<Json<warden_observe::Incident>, ApiError> {
    Ok(Json(state.incidents.update(id, update)?))
}

async fn postmortem_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<warden_observe::Postmortem>, ApiError> {
    Ok(Json(state.incidents.postmortem(id)?))
}

// ── Knowledge receipts ─────────────────────────────────────────

#[derive(Deserialize)]
struct ReceiptParams {
    #[serde(default)]
    operation: Option<ReceiptOp>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    stored: Option<bool>,
    #[serde(default = "default_limit")]
    limit: usize,
}

async fn receipts_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReceiptParams>,
) -> Json<Vec<warden_observe::MemoryReceipt>> {
    let filter = ReceiptFilter {
        operation: params.operation,
        source: params.source,
        stored: params.stored,
    };
    Json(state.receipts.receipts(&filter, params.limit))
}

async fn receipt_stats_handler(
    State(state): State<Arc<AppState>>,
) -> Json<warden_observe::ReceiptStats> {
    Json(state.receipts.stats())
}

async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ReceiptInput>,
) -> Result<(StatusCode, Json<warden_observe::MemoryReceipt>), ApiError> {
    let receipt = state.receipts.emit(input)?;
    state.metrics.inc_receipts_emitted();
    Ok((StatusCode::CREATED, Json(receipt)))
}
