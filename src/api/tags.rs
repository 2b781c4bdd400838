//! Subject tag API endpoints.
//!
//! The taxonomy is read-mostly reference data; creation is the
//! administrative seeding surface.

use axum::{extract::State, Json};

use super::{success, ApiResult};
use crate::models::{CreateTagRequest, Tag};
use crate::AppState;

/// GET /api/tags - List all tags.
pub async fn list_tags(State(state): State<AppState>) -> ApiResult<Vec<Tag>> {
    success(state.repo.list_tags().await?)
}

/// POST /api/tags - Create a new tag.
pub async fn create_tag(
    State(state): State<AppState>,
    Json(request): Json<CreateTagRequest>,
) -> ApiResult<Tag> {
    success(state.repo.create_tag(&request).await?)
}
