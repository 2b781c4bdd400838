//! Booking API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{Booking, CreateBookingRequest};
use crate::scheduling;
use crate::AppState;

/// POST /api/bookings - Validate and commit a booking request.
pub async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> ApiResult<Booking> {
    success(scheduling::create_booking(&state.repo, &request).await?)
}

/// GET /api/bookings/:id - Get a booking.
pub async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
) -> ApiResult<Booking> {
    let booking = state
        .repo
        .get_booking(booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", booking_id)))?;
    success(booking)
}

/// PUT /api/bookings/:id/start - Mark the session as started.
pub async fn start_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
) -> ApiResult<Booking> {
    success(scheduling::start_booking(&state.repo, booking_id).await?)
}

/// PUT /api/bookings/:id/conclude - Mark the session as concluded.
pub async fn conclude_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
) -> ApiResult<Booking> {
    success(scheduling::conclude_booking(&state.repo, booking_id).await?)
}

/// GET /api/users/:uid/bookings - A user's bookings as student, newest first.
pub async fn list_student_bookings(
    State(state): State<AppState>,
    Path(uid): Path<i64>,
) -> ApiResult<Vec<Booking>> {
    success(state.repo.list_student_bookings(uid).await?)
}

/// GET /api/tutors/:tid/bookings - A tutor's bookings, newest first.
pub async fn list_tutor_bookings(
    State(state): State<AppState>,
    Path(tutor_id): Path<i64>,
) -> ApiResult<Vec<Booking>> {
    success(state.repo.list_tutor_bookings(tutor_id).await?)
}
