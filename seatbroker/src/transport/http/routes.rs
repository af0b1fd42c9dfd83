//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::pool::LicenseStats;
use crate::service::{AllocateOutcome, InvocationSpec, LicenseService, Phase, RefreshOutcome};

#[derive(Debug, Deserialize)]
pub struct AllocateBody {
    pub invocation: InvocationSpec,
}

#[derive(Debug, Deserialize)]
pub struct RefreshBody {
    pub invocation: InvocationSpec,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseBody {
    pub invocation_id: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: Phase,
    pub license_stats: Vec<LicenseStats>,
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: Phase,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    error: String,
}

fn error_response(err: ServiceError) -> Response {
    let (status, code) = match &err {
        ServiceError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
        ServiceError::UnknownLicense(_) => (StatusCode::NOT_FOUND, "not_found"),
        ServiceError::InvocationNotFound(_) | ServiceError::NotAllocated(_) => {
            (StatusCode::CONFLICT, "failed_precondition")
        }
        ServiceError::Exhausted(_) => (StatusCode::TOO_MANY_REQUESTS, "resource_exhausted"),
        ServiceError::IdGeneration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    (
        status,
        Json(ErrorBody {
            code,
            error: err.to_string(),
        }),
    )
        .into_response()
}

async fn allocate(
    State(service): State<Arc<LicenseService>>,
    Json(body): Json<AllocateBody>,
) -> Response {
    match service.allocate(&body.invocation) {
        Ok(outcome @ AllocateOutcome::Allocated { .. }) => Json(outcome).into_response(),
        Ok(outcome @ AllocateOutcome::Queued { .. }) => {
            (StatusCode::ACCEPTED, Json(outcome)).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn refresh(
    State(service): State<Arc<LicenseService>>,
    Json(body): Json<RefreshBody>,
) -> Response {
    match service.refresh(&body.invocation) {
        Ok(outcome) => Json::<RefreshOutcome>(outcome).into_response(),
        Err(err) => error_response(err),
    }
}

async fn release(
    State(service): State<Arc<LicenseService>>,
    Json(body): Json<ReleaseBody>,
) -> Response {
    match service.release(&body.invocation_id) {
        Ok(()) => Json(serde_json::json!({})).into_response(),
        Err(err) => error_response(err),
    }
}

async fn status(State(service): State<Arc<LicenseService>>) -> Json<StatusResponse> {
    let (state, license_stats) = service.licenses_status();
    Json(StatusResponse {
        state,
        license_stats,
    })
}

async fn health_check(State(service): State<Arc<LicenseService>>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: service.phase(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn routes(service: Arc<LicenseService>) -> Router {
    Router::new()
        .route("/health-check", get(health_check))
        .route("/v1/licenses/allocate", post(allocate))
        .route("/v1/licenses/refresh", post(refresh))
        .route("/v1/licenses/release", post(release))
        .route("/v1/licenses/status", get(status))
        .with_state(service)
}
