use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use booking_domain::booking::{CancelBookingRequest, CreateBookingRequest, UpdateBookingRequest};
use booking_domain::{Booking, BookingStatus};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::response::{ok, trace_id, ApiResponse};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/bookings", post(create_booking))
        .route("/api/v1/bookings/{id}", get(get_booking).put(update_booking))
        .route("/api/v1/bookings/{id}/cancel", post(cancel_booking))
}

/// Body of a `202`: the cancellation is queued, the status has not moved yet.
#[derive(Debug, Serialize)]
pub struct CancellationAccepted {
    pub booking_id: Uuid,
    pub status: BookingStatus,
    pub cancellation_requested: bool,
}

async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Booking>>), AppError> {
    let Json(req) = payload?;
    let booking = state.bookings.create_booking(req, trace_id(&headers)).await?;
    Ok((StatusCode::CREATED, ok(booking)))
}

async fn get_booking(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    let Path(id) = id?;
    Ok(ok(state.bookings.get_booking(id).await?))
}

async fn update_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateBookingRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    let Path(id) = id?;
    let Json(req) = payload?;
    let booking = state
        .bookings
        .update_booking(id, req, trace_id(&headers))
        .await?;
    Ok(ok(booking))
}

async fn cancel_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CancelBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CancellationAccepted>>), AppError> {
    let Path(id) = id?;
    let Json(req) = payload?;
    let booking = state
        .bookings
        .request_cancellation(id, req, trace_id(&headers))
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        ok(CancellationAccepted {
            booking_id: booking.id,
            status: booking.status,
            cancellation_requested: true,
        }),
    ))
}
