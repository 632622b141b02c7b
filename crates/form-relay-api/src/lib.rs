//! # Form Relay API
//!
//! HTTP service for form-submission webhooks.
//!
//! This crate provides:
//! - The webhook endpoint that turns CRM form submissions into custom objects
//! - Configuration management, test submissions and activity-log endpoints
//! - Health, statistics and Prometheus metrics endpoints
//! - Pass-through reads used to populate configuration UIs

pub mod config;
pub mod errors;
pub mod metrics;
pub mod responses;

pub use config::{CrmConfig, DispatchConfig, LoggingConfig, ServerConfig, ServiceConfig};
pub use errors::{ApiError, ConfigError, ServiceError};
pub use metrics::ServiceMetrics;
pub use responses::{
    ConfigureResponse, CredentialQuery, HealthResponse, LogsResponse, MessageResponse,
    StatsResponse, TestSubmissionRequest, WebhookResponse,
};

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use form_relay_core::{
    ActivityLog, ApiKey, ConfigKey, ConfigKeyArity, ConfigurationRequest, ConfigurationStore,
    CrmClient, DispatchError, DispatchOutcome, FormConfiguration, FormId, FormSubmission,
    KeyGenerator, LocationId, ObjectSubmitter, Timestamp, ValidationError, WebhookDispatcher,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{
    collections::HashMap,
    future::IntoFuture,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Notify;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Form configurations keyed by location (and form)
    pub store: Arc<dyn ConfigurationStore>,

    /// Rolling activity log shared with the dispatcher and CRM client
    pub activity_log: Arc<dyn ActivityLog>,

    /// Submission pipeline
    pub dispatcher: WebhookDispatcher,

    /// CRM client used by the pass-through routes
    pub crm_client: Arc<CrmClient>,

    /// Metrics collector for observability
    pub metrics: Arc<ServiceMetrics>,

    /// Process start, reported as uptime
    pub started_at: Instant,
}

impl AppState {
    /// Create new application state
    ///
    /// `submitter` receives mapped records; production wiring passes the same
    /// CRM client as `crm_client`.
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn ConfigurationStore>,
        activity_log: Arc<dyn ActivityLog>,
        submitter: Arc<dyn ObjectSubmitter>,
        crm_client: Arc<CrmClient>,
        key_generator: KeyGenerator,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        let dispatcher = WebhookDispatcher::new(
            store.clone(),
            activity_log.clone(),
            submitter,
            key_generator,
            config.dispatch.config_key_arity,
        );

        Self {
            config,
            store,
            activity_log,
            dispatcher,
            crm_client,
            metrics,
            started_at: Instant::now(),
        }
    }

    fn arity(&self) -> ConfigKeyArity {
        self.dispatcher.arity()
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let webhook_routes = Router::new().route("/webhook/form-submission", post(handle_webhook));

    let configuration_routes = Router::new()
        .route("/api/configure", post(handle_configure))
        .route(
            "/api/configure/{location_id}",
            get(get_location_configuration).delete(delete_location_configuration),
        )
        .route(
            "/api/configure/{location_id}/{form_id}",
            get(get_form_configuration).delete(delete_form_configuration),
        )
        .route("/api/test-submission", post(handle_test_submission));

    let monitoring_routes = Router::new()
        .route("/api/logs", get(list_logs).delete(clear_logs))
        .route("/api/stats", get(get_statistics))
        .route("/health", get(handle_health_check))
        .route("/metrics", get(metrics_endpoint));

    let crm_routes = Router::new()
        .route("/api/forms/{location_id}", get(list_crm_forms))
        .route("/api/objects/{location_id}", get(list_crm_objects));

    let mut router = Router::new()
        .merge(webhook_routes)
        .merge(configuration_routes)
        .merge(monitoring_routes)
        .merge(crm_routes)
        .layer(DefaultBodyLimit::max(state.config.server.max_body_size))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .layer(middleware::from_fn(request_logging_middleware));

    if state.config.server.enable_compression {
        router = router.layer(CompressionLayer::new());
    }
    if state.config.server.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Start HTTP server
///
/// Stops accepting connections on SIGINT or SIGTERM, then gives in-flight
/// requests up to `shutdown_timeout_seconds` to finish.
pub async fn start_server(state: AppState) -> Result<(), ServiceError> {
    let host = state.config.server.host.clone();
    let port = state.config.server.port;
    let shutdown_timeout = Duration::from_secs(state.config.server.shutdown_timeout_seconds);
    let address = format!("{}:{}", host, port);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!(address = %address, "Starting HTTP server");

    let shutdown_started = Arc::new(Notify::new());
    let notify = shutdown_started.clone();

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "Initiating graceful shutdown"
            );
            notify.notify_one();
        })
        .into_future();

    tokio::select! {
        result = server => {
            result.map_err(|e| ServiceError::ServerFailed {
                message: e.to_string(),
            })?;
        }
        _ = async {
            shutdown_started.notified().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            warn!("Shutdown timeout elapsed with requests still in flight");
        }
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

// ============================================================================
// Webhook Handlers
// ============================================================================

/// Handle a CRM form-submission webhook
///
/// Unconfigured forms are acknowledged with `success: false` and HTTP 200 so
/// the CRM does not retry them.
#[instrument(skip(state, headers, body))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let submission = parse_submission(&body, &headers)
        .map_err(|e| record_rejection(&state, "Webhook rejected", e))?;

    let start = Instant::now();
    let result = state.dispatcher.dispatch(submission).await;
    state
        .metrics
        .record_dispatch(outcome_label(&result), start.elapsed());

    let outcome = result?;
    if let DispatchOutcome::NotConfigured { message, .. } = &outcome {
        info!(message = %message, "Submission acknowledged without configuration");
    }

    Ok(Json(WebhookResponse::from_outcome(
        outcome,
        "Custom object created successfully",
    )))
}

/// Run the pipeline against the sample record
#[instrument(skip(state, body))]
async fn handle_test_submission(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let (location_id, form_id) = test_submission_target(&body)
        .map_err(|e| record_rejection(&state, "Test submission rejected", e))?;

    let start = Instant::now();
    let result = state.dispatcher.dispatch_test(location_id, form_id).await;
    state
        .metrics
        .record_dispatch(outcome_label(&result), start.elapsed());

    let outcome = result?;
    let test_data = match &outcome {
        DispatchOutcome::Completed(receipt) => Some(receipt.mapped.to_json()),
        DispatchOutcome::NotConfigured { .. } => None,
    };

    Ok(Json(WebhookResponse {
        test_data,
        ..WebhookResponse::from_outcome(outcome, "Test submission successful")
    }))
}

fn test_submission_target(body: &[u8]) -> Result<(LocationId, Option<FormId>), ApiError> {
    let request: TestSubmissionRequest = if body.is_empty() {
        TestSubmissionRequest::default()
    } else {
        parse_json(body)?
    };

    let location_id = request
        .location_id
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| ValidationError::Required {
            field: "locationId".to_string(),
        })?;
    let location_id = LocationId::new(location_id.trim())?;
    let form_id = request
        .form_id
        .filter(|f| !f.trim().is_empty())
        .map(|f| FormId::new(f.trim()))
        .transpose()?;

    Ok((location_id, form_id))
}

// ============================================================================
// Configuration Handlers
// ============================================================================

/// Create or replace a form configuration
#[instrument(skip(state, body))]
async fn handle_configure(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ConfigureResponse>, ApiError> {
    save_configuration(&state, &body)
        .await
        .map(Json)
        .map_err(|e| record_rejection(&state, "Configuration error", e))
}

async fn save_configuration(state: &AppState, body: &[u8]) -> Result<ConfigureResponse, ApiError> {
    let request: ConfigurationRequest = parse_json(body)?;
    let configuration = request.into_configuration(state.arity(), Timestamp::now())?;
    let config_key = configuration.key.clone();

    let previous = state.store.put(configuration).await?;
    refresh_configuration_gauge(state).await;

    let verb = if previous.is_some() { "updated" } else { "saved" };
    info!(config_key = %config_key, "Configuration {}", verb);
    state
        .activity_log
        .info(&format!("Configuration {} for {}", verb, config_key));

    Ok(ConfigureResponse {
        success: true,
        message: "Configuration saved successfully".to_string(),
        config_key: config_key.to_string(),
    })
}

async fn get_location_configuration(
    State(state): State<AppState>,
    Path(location_id): Path<String>,
) -> Result<Response, ApiError> {
    let configuration = find_configuration(&state, &location_id, None).await?;
    Ok(Json(configuration.redacted()).into_response())
}

async fn get_form_configuration(
    State(state): State<AppState>,
    Path((location_id, form_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let configuration = find_configuration(&state, &location_id, Some(&form_id)).await?;
    Ok(Json(configuration.redacted()).into_response())
}

async fn delete_location_configuration(
    State(state): State<AppState>,
    Path(location_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let configuration = find_configuration(&state, &location_id, None).await?;
    remove_configuration(&state, configuration.key).await
}

async fn delete_form_configuration(
    State(state): State<AppState>,
    Path((location_id, form_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, ApiError> {
    let configuration = find_configuration(&state, &location_id, Some(&form_id)).await?;
    remove_configuration(&state, configuration.key).await
}

/// Look up the configuration addressed by a request path
///
/// A location-only path under location-and-form keying addresses the
/// location's oldest configuration.
async fn find_configuration(
    state: &AppState,
    location_id: &str,
    form_id: Option<&str>,
) -> Result<FormConfiguration, ApiError> {
    let location_id = LocationId::new(location_id)?;
    let form_id = form_id.map(FormId::new).transpose()?;

    let found = match (state.arity(), form_id) {
        (ConfigKeyArity::LocationAndForm, None) => {
            state.store.find_by_location(&location_id).await?
        }
        (arity, form_id) => {
            let key = ConfigKey::new(arity, location_id, form_id)?;
            state.store.get(&key).await?
        }
    };

    found.ok_or_else(|| ApiError::not_found("Configuration not found"))
}

async fn remove_configuration(
    state: &AppState,
    key: ConfigKey,
) -> Result<Json<MessageResponse>, ApiError> {
    if state.store.delete(&key).await?.is_none() {
        return Err(ApiError::not_found("Configuration not found"));
    }
    refresh_configuration_gauge(state).await;

    info!(config_key = %key, "Configuration deleted");
    state
        .activity_log
        .info(&format!("Configuration deleted for {}", key));

    Ok(Json(MessageResponse::ok("Configuration deleted successfully")))
}

// ============================================================================
// Monitoring Handlers
// ============================================================================

async fn list_logs(State(state): State<AppState>) -> Json<LogsResponse> {
    Json(LogsResponse {
        logs: state
            .activity_log
            .recent(state.config.dispatch.log_page_size),
        total_logs: state.activity_log.len(),
    })
}

async fn clear_logs(State(state): State<AppState>) -> Json<MessageResponse> {
    let cleared = state.activity_log.len();
    state.activity_log.clear();
    info!(cleared, "Activity log cleared");
    Json(MessageResponse::ok("Logs cleared successfully"))
}

#[instrument(skip(state))]
async fn handle_health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, ApiError> {
    let active_configurations = state.store.count().await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Timestamp::now(),
        active_configurations,
        total_logs: state.activity_log.len(),
        uptime: state.started_at.elapsed().as_secs_f64(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn get_statistics(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let active_configurations = state.store.count().await?;
    let counts = state.activity_log.counts();

    Ok(Json(StatsResponse {
        active_configurations,
        total_processed: counts.total(),
        successful_submissions: counts.success,
        failed_submissions: counts.error,
        success_rate: counts.success_rate(),
        last_activity: counts.last_activity,
    }))
}

#[instrument(skip_all)]
async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, ApiError> {
    refresh_configuration_gauge(&state).await;

    state.metrics.render().map_err(|e| ApiError::Internal {
        message: format!("Failed to encode metrics: {}", e),
    })
}

// ============================================================================
// CRM Pass-through Handlers
// ============================================================================

#[instrument(skip(state, headers, query))]
async fn list_crm_forms(
    State(state): State<AppState>,
    Path(location_id): Path<String>,
    Query(query): Query<CredentialQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let context = "CRM forms listing failed";
    let (location_id, api_key) = crm_target(location_id, &headers, &query)
        .map_err(|e| record_rejection(&state, context, e))?;

    let forms = state
        .crm_client
        .list_forms(&location_id, &api_key)
        .await
        .map_err(|e| record_rejection(&state, context, ApiError::Upstream(e)))?;
    Ok(Json(forms))
}

#[instrument(skip(state, headers, query))]
async fn list_crm_objects(
    State(state): State<AppState>,
    Path(location_id): Path<String>,
    Query(query): Query<CredentialQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let context = "CRM objects listing failed";
    let (location_id, api_key) = crm_target(location_id, &headers, &query)
        .map_err(|e| record_rejection(&state, context, e))?;

    let objects = state
        .crm_client
        .list_objects(&location_id, &api_key)
        .await
        .map_err(|e| record_rejection(&state, context, ApiError::Upstream(e)))?;
    Ok(Json(objects))
}

fn crm_target(
    location_id: String,
    headers: &HeaderMap,
    query: &CredentialQuery,
) -> Result<(LocationId, ApiKey), ApiError> {
    Ok((LocationId::new(location_id)?, credential(headers, query)?))
}

/// Caller credential from `Authorization: Bearer` or the `apiKey` query
///
/// The scheme name matches case-insensitively.
fn credential(headers: &HeaderMap, query: &CredentialQuery) -> Result<ApiKey, ApiError> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then_some(token)
        })
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let from_query = query
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());

    bearer
        .or(from_query)
        .map(ApiKey::new)
        .ok_or_else(|| ApiError::bad_request("API key is required"))
}

// ============================================================================
// Helpers
// ============================================================================

/// Log a request that failed outside the dispatcher, then hand the error back
///
/// Dispatch failures are logged by the dispatcher itself.
fn record_rejection(state: &AppState, context: &str, error: ApiError) -> ApiError {
    warn!(error = %error, status = %error.status(), "{}", context);
    state
        .activity_log
        .warning(&format!("{}: {}", context, error));
    error
}

fn parse_submission(body: &[u8], headers: &HeaderMap) -> Result<FormSubmission, ApiError> {
    let payload: Value = parse_json(body)?;
    Ok(FormSubmission::from_payload(&payload, &header_map(headers))?)
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON payload: {}", e)))
}

/// Header names and UTF-8 values; names are already lowercase
fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn outcome_label(result: &Result<DispatchOutcome, DispatchError>) -> &'static str {
    match result {
        Ok(DispatchOutcome::Completed(_)) => metrics::OUTCOME_COMPLETED,
        Ok(DispatchOutcome::NotConfigured { .. }) => metrics::OUTCOME_NOT_CONFIGURED,
        Err(DispatchError::Submission(_)) => metrics::OUTCOME_FAILED,
        Err(DispatchError::Internal(_)) => metrics::OUTCOME_INTERNAL_ERROR,
    }
}

async fn refresh_configuration_gauge(state: &AppState) {
    match state.store.count().await {
        Ok(count) => state.metrics.set_active_configurations(count),
        Err(e) => warn!(error = %e, "Failed to count configurations"),
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware with correlation ID tracking
///
/// Reuses the caller's `x-correlation-id` or generates one, echoes it on the
/// response and logs completion at a level chosen by status class.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    let status = response.status();
    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

/// Records request count and latency by method and status
async fn metrics_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let response = next.run(request).await;

    state
        .metrics
        .record_http_request(method.as_str(), response.status().as_u16(), start.elapsed());

    response
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
