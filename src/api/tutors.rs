//! Tutor registry API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{CreateTutorRequest, SetTutorTagsRequest, Tutor};
use crate::AppState;

/// POST /api/tutors - Register a user as a tutor.
pub async fn create_tutor(
    State(state): State<AppState>,
    Json(request): Json<CreateTutorRequest>,
) -> ApiResult<Tutor> {
    success(state.repo.create_tutor(&request).await?)
}

/// GET /api/tutors/:tid - Get a tutor with its offered subjects.
pub async fn get_tutor(
    State(state): State<AppState>,
    Path(tutor_id): Path<i64>,
) -> ApiResult<Tutor> {
    let tutor = state
        .repo
        .get_tutor(tutor_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tutor {} not found", tutor_id)))?;
    success(tutor)
}

/// PUT /api/tutors/:tid/tags - Replace a tutor's offered subjects.
pub async fn set_tutor_tags(
    State(state): State<AppState>,
    Path(tutor_id): Path<i64>,
    Json(request): Json<SetTutorTagsRequest>,
) -> ApiResult<Tutor> {
    success(state.repo.set_tutor_tags(tutor_id, &request.tag_ids).await?)
}
