// Copyright 2025 Cowboy AI, LLC.

//! HTTP trigger surface for the demo scenarios
//!
//! Thin glue over [`DemoRunner`]: each endpoint triggers one demo run and
//! returns the delivery report as JSON. The engine itself is HTTP-agnostic.

use crate::delivery::DeliveryReport;
use crate::demo::{ComparisonReport, DemoBooking, DemoRunner};
use crate::errors::DomainError;
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

/// Shared state for the API handlers
#[derive(Debug)]
pub struct AppState {
    /// The demo runner all endpoints trigger
    pub runner: DemoRunner,
}

/// Request body naming one booking to run a demo for
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoRequest {
    /// Booking identity
    pub booking_id: String,
    /// Customer who owns the booking
    pub customer_id: String,
    /// Flight the booking is for
    pub flight_number: String,
}

impl From<DemoRequest> for DemoBooking {
    fn from(request: DemoRequest) -> Self {
        DemoBooking::new(
            request.booking_id,
            request.customer_id,
            request.flight_number,
        )
    }
}

/// Request body for the multi-booking demo
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiDemoRequest {
    /// Bookings to interleave, each getting the full lifecycle
    pub bookings: Vec<DemoRequest>,
}

/// Request body for the side-by-side comparison demo
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonDemoRequest {
    /// Booking sent through the unkeyed problem pipeline
    pub problem: DemoRequest,
    /// Booking sent through the keyed solution pipeline
    pub solved: DemoRequest,
}

/// API error type mapping to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request was malformed or failed validation
    #[error("invalid input: {0}")]
    BadRequest(String),
    /// The transport or engine failed
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::ValidationError(_)
            | DomainError::ConfigurationError(_)
            | DomainError::UnknownEventType(_) => ApiError::BadRequest(error.to_string()),
            DomainError::Transport(_) | DomainError::SerializationError(_) => {
                ApiError::InternalServerError(error.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

/// Handler for `GET /health`
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Handler for `POST /api/bookings/demo-problem`
async fn demo_problem(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<DemoRequest>,
) -> Result<Json<DeliveryReport>, ApiError> {
    let report = state
        .runner
        .run_unkeyed_demo(
            &request.booking_id,
            &request.customer_id,
            &request.flight_number,
        )
        .await?;
    Ok(Json(report))
}

/// Handler for `POST /api/bookings/demo-solved`
async fn demo_solved(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<DemoRequest>,
) -> Result<Json<DeliveryReport>, ApiError> {
    let report = state
        .runner
        .run_keyed_demo(
            &request.booking_id,
            &request.customer_id,
            &request.flight_number,
        )
        .await?;
    Ok(Json(report))
}

/// Handler for `POST /api/bookings/demo-multiple`
async fn demo_multiple(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<MultiDemoRequest>,
) -> Result<Json<DeliveryReport>, ApiError> {
    let bookings: Vec<DemoBooking> = request.bookings.into_iter().map(Into::into).collect();
    let report = state.runner.run_multi_entity_demo(&bookings).await?;
    Ok(Json(report))
}

/// Handler for `POST /api/bookings/demo-comparison`
async fn demo_comparison(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<ComparisonDemoRequest>,
) -> Result<Json<ComparisonReport>, ApiError> {
    let comparison = state
        .runner
        .run_comparison_demo(&request.problem.into(), &request.solved.into())
        .await?;
    Ok(Json(comparison))
}

/// Build the application router over shared state
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/bookings/demo-problem", post(demo_problem))
        .route("/api/bookings/demo-solved", post(demo_solved))
        .route("/api/bookings/demo-multiple", post(demo_multiple))
        .route("/api/bookings/demo-comparison", post(demo_comparison))
        .layer(Extension(state))
}
