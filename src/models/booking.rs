//! Booking model and lifecycle fields.

use serde::{Deserialize, Serialize};

use super::Weekday;

/// A confirmed tutoring session occupying one (tutor, day, hour) key.
///
/// The booking references the slot window it was carved from only implicitly:
/// the slot outlives any single booking, and once `concluded_at` is set the
/// key is bookable again.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: i64,
    pub student_uid: i64,
    pub tutor_id: i64,
    pub tag_id: i64,
    pub day: Weekday,
    pub time: i64,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concluded_at: Option<String>,
}

/// Request body for creating a booking.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub student_uid: i64,
    pub tutor_id: i64,
    pub tag_id: i64,
    pub day: Weekday,
    pub time: i64,
}
