//! HTTP request handlers for the gateway API.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use gateway_config::ModelConfig;
use gateway_core::{ChatCompletionResponse, GatewayError, GatewayRequest, Principal};
use gateway_telemetry::{BudgetAlert, CostEntry, PeriodReport};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::{
    auth::AuthenticatedKey,
    error::ApiError,
    extractors::{GuardedJson, RequestId},
    health::{HealthResponse, LivenessResponse, ReadinessResponse},
    pipeline::RequestEnvelope,
    state::AppState,
};

/// Default page size for the admin listings
const DEFAULT_ADMIN_LIMIT: usize = 100;

/// Health summary
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let health = state.health().check_health(state.provider_id());
    let status = StatusCode::from_u16(health.status.http_status_code())
        .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
    (status, Json(health))
}

/// Liveness probe
pub async fn liveness_check(State(state): State<AppState>) -> Json<LivenessResponse> {
    Json(state.health().check_liveness())
}

/// Readiness probe; 503 once draining
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let readiness = state.health().check_readiness();
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness))
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics_endpoint(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state.pipeline().metrics().gather().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        ApiError::internal("Failed to encode metrics")
    })?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

/// Model listing entry
#[derive(Debug, Serialize)]
pub struct ModelObject {
    /// Model name
    pub id: String,
    /// Always `model`
    pub object: &'static str,
    /// Upstream provider ID
    pub owned_by: String,
    /// USD per 1000 prompt tokens
    pub input_cost_per_1k: Decimal,
    /// USD per 1000 completion tokens
    pub output_cost_per_1k: Decimal,
}

impl ModelObject {
    fn new(model: &ModelConfig, owned_by: &str) -> Self {
        Self {
            id: model.name.clone(),
            object: "model",
            owned_by: owned_by.to_string(),
            input_cost_per_1k: model.input_cost_per_1k,
            output_cost_per_1k: model.output_cost_per_1k,
        }
    }
}

/// Model listing
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    /// Always `list`
    pub object: &'static str,
    /// Configured models
    pub data: Vec<ModelObject>,
}

/// List configured models with prices (OpenAI compatible)
#[instrument(skip(state))]
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let data = state
        .config()
        .models
        .iter()
        .map(|m| ModelObject::new(m, state.provider_id()))
        .collect();
    Json(ModelsResponse {
        object: "list",
        data,
    })
}

/// Get one configured model
#[instrument(skip(state))]
pub async fn get_model(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> Result<Json<ModelObject>, ApiError> {
    state
        .config()
        .model(&model_id)
        .map(|m| Json(ModelObject::new(m, state.provider_id())))
        .ok_or_else(|| ApiError::not_found(format!("Model not found: {model_id}")))
}

/// Chat completion (OpenAI compatible, non-streaming)
#[instrument(skip_all, fields(request_id = %request_id, model = %body.value.model))]
pub async fn chat_completion(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    Extension(key): Extension<AuthenticatedKey>,
    headers: HeaderMap,
    body: GuardedJson<GatewayRequest>,
) -> Result<Response, ApiError> {
    let GuardedJson {
        value: request,
        content_type,
        size,
    } = body;

    if request.stream {
        return Err(GatewayError::validation("Streaming is not supported", Some("stream")).into());
    }

    let principal = Principal::new(state.authenticator().principal_for(
        &headers,
        request.user.as_deref(),
        &key,
    ));
    let model = request.model.clone();
    debug!(principal = %principal.id(), size, "Chat completion request");

    let envelope = RequestEnvelope::new(&request_id, content_type.as_deref(), size);
    let completion = state.pipeline().handle(&principal, request, envelope).await?;

    let mut response =
        Json(ChatCompletionResponse::from_completion(&request_id, &model, &completion))
            .into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    Ok(response)
}

/// Paging for the admin listings
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    /// Maximum number of items, newest last
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_ADMIN_LIMIT)
    }
}

/// Guardrail settings shown on the status page
#[derive(Debug, Serialize)]
pub struct GuardrailStatus {
    /// Whether guardrails run at all
    pub enabled: bool,
    /// Installed classifiers, in evaluation order
    pub classifiers: Vec<&'static str>,
    /// Prompt token ceiling
    pub max_input_tokens: u32,
    /// Completion token ceiling
    pub max_output_tokens: u32,
    /// Request size ceiling in bytes
    pub max_request_size: usize,
    /// Whether completions are scanned for secrets
    pub scan_for_secrets: bool,
}

/// Gateway status summary
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Global spend per period against its ceiling
    pub budgets: Vec<PeriodReport>,
    /// Guardrail settings
    pub guardrails: GuardrailStatus,
    /// Cost entries held in the recent log
    pub recent_entries: usize,
    /// Requests currently admitted
    pub in_flight: u64,
}

/// Budget, guardrail and load summary
#[instrument(skip(state))]
pub async fn admin_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let pipeline = state.pipeline();
    let guardrails = &state.config().guardrails;
    let now = pipeline.clock().now();

    Json(StatusResponse {
        budgets: pipeline.budgets().status_report(now),
        guardrails: GuardrailStatus {
            enabled: pipeline.guardrail().is_enabled(),
            classifiers: pipeline
                .guardrail()
                .classifier_categories()
                .iter()
                .map(|c| c.as_str())
                .collect(),
            max_input_tokens: guardrails.max_input_tokens,
            max_output_tokens: guardrails.max_output_tokens,
            max_request_size: guardrails.max_request_size,
            scan_for_secrets: guardrails.scan_for_secrets,
        },
        recent_entries: pipeline.costs().entry_count(),
        in_flight: pipeline.limiter().total_in_flight(),
    })
}

/// Recent cost entries
#[instrument(skip(state))]
pub async fn admin_usage(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<CostEntry>> {
    Json(state.pipeline().costs().recent_entries(query.limit()))
}

/// Recent budget alerts
#[instrument(skip(state))]
pub async fn admin_alerts(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<BudgetAlert>> {
    Json(state.pipeline().budgets().recent_alerts(query.limit()))
}
