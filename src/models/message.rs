//! Message models for the conversation ledger.

use serde::{Deserialize, Serialize};

/// A single immutable message. The ledger is append-only and ordered by
/// (timestamp, id).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub sender_uid: i64,
    pub receiver_uid: i64,
    pub content: String,
    pub timestamp: String,
}

/// Request body for sending a message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub sender_uid: i64,
    pub receiver_uid: i64,
    pub content: String,
}

/// Most recent message exchanged with one counterpart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub counterpart_uid: i64,
    pub last_message: String,
    pub last_message_at: String,
}
