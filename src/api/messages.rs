//! Messaging API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{success, ApiResult};
use crate::models::{ConversationSummary, Message, SendMessageRequest};
use crate::AppState;

/// Whether two users are allowed to message each other.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanMessageResponse {
    pub allowed: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    #[serde(default = "default_conversation_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct RecentsQuery {
    #[serde(default = "default_recents_limit")]
    pub limit: i64,
}

fn default_conversation_limit() -> i64 {
    50
}

fn default_recents_limit() -> i64 {
    20
}

/// GET /api/messages/can-message/:a/:b - Permission gate check.
pub async fn can_message(
    State(state): State<AppState>,
    Path((uid_a, uid_b)): Path<(i64, i64)>,
) -> ApiResult<CanMessageResponse> {
    let allowed = state.repo.can_message(uid_a, uid_b).await?;
    success(CanMessageResponse { allowed })
}

/// POST /api/messages - Store a message, then push it to the receiver if
/// online. The ledger write is authoritative; a failed push is not an error.
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<Message> {
    let message = state
        .repo
        .send_message(request.sender_uid, request.receiver_uid, &request.content)
        .await?;

    state.channel.deliver(&message);

    success(message)
}

/// GET /api/messages/:a/:b - Paginated conversation, oldest first.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path((uid_a, uid_b)): Path<(i64, i64)>,
    Query(query): Query<ConversationQuery>,
) -> ApiResult<Vec<Message>> {
    success(
        state
            .repo
            .get_conversation(uid_a, uid_b, query.limit, query.offset)
            .await?,
    )
}

/// GET /api/users/:uid/conversations - Recent conversation summaries.
pub async fn recent_conversations(
    State(state): State<AppState>,
    Path(uid): Path<i64>,
    Query(query): Query<RecentsQuery>,
) -> ApiResult<Vec<ConversationSummary>> {
    success(state.repo.get_recent_conversations(uid, query.limit).await?)
}
