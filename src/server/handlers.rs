/// API Request Handlers
/// Thin wrappers over the collector, profiler and hub

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use super::auth::Owner;
use super::AppState;
use crate::core::error::MonitorError;
use crate::core::metrics::ContainerMetrics;
use crate::core::profiler::{profile_container, Recommendation};
use crate::utils::short_id;

/// Longest profiling session a request may ask for
const MAX_PROFILE_DURATION: Duration = Duration::from_secs(600);

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(msg: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg),
        }
    }
}

/// Error response carrying the `{success:false, error}` body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<MonitorError> for ApiError {
    fn from(err: MonitorError) -> Self {
        let status = match &err {
            MonitorError::NotFound(_) => StatusCode::NOT_FOUND,
            MonitorError::RuntimeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthInfo {
    pub status: String,
    pub runtime_reachable: bool,
    pub runtime_error: Option<String>,
    pub subscribers: usize,
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<HealthInfo> {
    let ping = state.collector.runtime().ping().await;
    let health = HealthInfo {
        status: if ping.is_ok() { "healthy" } else { "degraded" }.to_string(),
        runtime_reachable: ping.is_ok(),
        runtime_error: ping.err().map(|e| e.to_string()),
        subscribers: state.hub.subscriber_count().await,
    };
    Ok(Json(ApiResponse::ok(health)))
}

// ============================================================================
// Metrics
// ============================================================================

pub async fn get_metrics(State(state): State<AppState>) -> ApiResult<Vec<ContainerMetrics>> {
    let metrics = state.collector.collect_all().await?;
    Ok(Json(ApiResponse::ok(metrics)))
}

pub async fn get_container_metrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ContainerMetrics> {
    let metrics = state.collector.collect(&id).await?;
    Ok(Json(ApiResponse::ok(metrics)))
}

// ============================================================================
// Profiling
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    /// humantime duration, e.g. "30s" or "2m"
    duration: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResult {
    pub container_id: String,
    pub samples: usize,
    pub recommendation: Recommendation,
    pub reason: String,
    pub devcontainer: serde_json::Value,
}

pub async fn profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ProfileQuery>,
    owner: Option<Extension<Owner>>,
) -> ApiResult<ProfileResult> {
    let duration = match query.duration.as_deref() {
        Some(raw) => humantime::parse_duration(raw)
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid duration '{}': {}", raw, e)))?,
        None => state.config.profile.duration(),
    };
    if duration.is_zero() || duration > MAX_PROFILE_DURATION {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("duration must be between 1s and {}", humantime::format_duration(MAX_PROFILE_DURATION)),
        ));
    }

    // fail fast instead of sampling a container that is not there
    state.collector.runtime().inspect(&id).await?;

    let owner = owner.map(|Extension(Owner(o))| o).unwrap_or_default();
    info!(container = %short_id(&id), owner = %owner, duration = ?duration, "profiling started");

    let report = profile_container(
        &state.collector,
        &id,
        duration,
        state.config.profile.interval(),
        state.cancel.child_token(),
        |_, _| {},
    )
    .await;

    let recommendation = report.recommendation.ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("no samples collected for {} in {}", id, humantime::format_duration(duration)),
        )
    })?;

    Ok(Json(ApiResponse::ok(ProfileResult {
        container_id: report.container_id,
        samples: report.samples,
        reason: recommendation.reason(),
        devcontainer: recommendation.host_requirements(),
        recommendation,
    })))
}
