//! Tutor registry model.
//!
//! A tutor is a distinct identity owned by a user; bookings reference the
//! tutor id while messaging permissions resolve back to the owning uid.

use serde::{Deserialize, Serialize};

use super::Tag;

/// A tutor profile with the subjects it offers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tutor {
    pub id: i64,
    /// Owning user id
    pub uid: i64,
    pub tags: Vec<Tag>,
    pub created_at: String,
}

/// Request body for registering a user as a tutor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTutorRequest {
    pub uid: i64,
}

/// Request body for replacing a tutor's offered subjects.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTutorTagsRequest {
    pub tag_ids: Vec<i64>,
}
