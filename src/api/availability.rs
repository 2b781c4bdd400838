//! Availability API endpoints: slot management and bookable-time resolution.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{AvailabilitySlot, SetSlotsRequest, SlotWindow, Weekday};
use crate::scheduling::resolver;
use crate::AppState;

/// Optional day filter for slot listings.
#[derive(Debug, Deserialize)]
pub struct DayFilter {
    pub day: Option<Weekday>,
}

/// Required day selector for bookable-time resolution.
#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub day: Weekday,
}

/// Day plus hour selector for a single bookability check.
#[derive(Debug, Deserialize)]
pub struct BookableQuery {
    pub day: Weekday,
    pub time: i64,
}

/// GET /api/tutors/:tid/availability - List active slots, optionally for one day.
pub async fn list_slots(
    State(state): State<AppState>,
    Path(tutor_id): Path<i64>,
    Query(filter): Query<DayFilter>,
) -> ApiResult<Vec<AvailabilitySlot>> {
    success(state.repo.list_active_slots(tutor_id, filter.day).await?)
}

/// PUT /api/tutors/:tid/availability - Replace the weekly schedule.
pub async fn set_slots(
    State(state): State<AppState>,
    Path(tutor_id): Path<i64>,
    Json(request): Json<SetSlotsRequest>,
) -> ApiResult<Vec<AvailabilitySlot>> {
    require_tutor(&state, tutor_id).await?;
    success(state.repo.set_slots(tutor_id, &request.slots).await?)
}

/// POST /api/tutors/:tid/availability - Add a single slot.
pub async fn add_slot(
    State(state): State<AppState>,
    Path(tutor_id): Path<i64>,
    Json(window): Json<SlotWindow>,
) -> ApiResult<AvailabilitySlot> {
    require_tutor(&state, tutor_id).await?;
    success(
        state
            .repo
            .add_slot(tutor_id, window.day, window.start_time, window.end_time)
            .await?,
    )
}

/// DELETE /api/availability/:slot_id - Deactivate a slot.
pub async fn remove_slot(State(state): State<AppState>, Path(slot_id): Path<i64>) -> ApiResult<()> {
    state.repo.remove_slot(slot_id).await?;
    success(())
}

/// GET /api/tutors/:tid/bookable-times?day= - Bookable hours for a day.
pub async fn bookable_times(
    State(state): State<AppState>,
    Path(tutor_id): Path<i64>,
    Query(query): Query<DayQuery>,
) -> ApiResult<Vec<i64>> {
    success(resolver::resolve_bookable_times(&state.repo, tutor_id, query.day).await?)
}

/// GET /api/tutors/:tid/bookable?day=&time= - Single-hour bookability check.
pub async fn check_bookable(
    State(state): State<AppState>,
    Path(tutor_id): Path<i64>,
    Query(query): Query<BookableQuery>,
) -> ApiResult<bool> {
    success(resolver::is_bookable(&state.repo, tutor_id, query.day, query.time).await?)
}

async fn require_tutor(state: &AppState, tutor_id: i64) -> Result<(), AppError> {
    state
        .repo
        .get_tutor(tutor_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tutor {} not found", tutor_id)))?;
    Ok(())
}
