//! Booking coordination.
//!
//! Each booking attempt runs a validation pipeline and then an atomic claim
//! of its (tutor, day, time) key. The claim is a tagged transaction outcome:
//! of N concurrent attempts for one key exactly one commits and the rest
//! observe the same conflict they would have seen losing the availability
//! check. Operations on different keys never block each other.

pub mod resolver;

use tracing::info;

use crate::db::{ClaimResult, Repository};
use crate::errors::AppError;
use crate::models::{Booking, CreateBookingRequest, MAX_HOUR, MIN_HOUR};

/// Validate and commit a booking request.
pub async fn create_booking(
    repo: &Repository,
    request: &CreateBookingRequest,
) -> Result<Booking, AppError> {
    if !(MIN_HOUR..MAX_HOUR).contains(&request.time) {
        return Err(AppError::Validation(format!(
            "Booking time must be an hour within {}..{}",
            MIN_HOUR, MAX_HOUR
        )));
    }

    let tutor = repo
        .get_tutor(request.tutor_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tutor {} not found", request.tutor_id)))?;

    if tutor.uid == request.student_uid {
        return Err(AppError::SelfBooking(
            "A tutor cannot book a session with themselves".to_string(),
        ));
    }

    if !repo
        .tutor_offers_tag(request.tutor_id, request.tag_id)
        .await?
    {
        return Err(AppError::TagMismatch(format!(
            "Tutor {} does not offer subject tag {}",
            request.tutor_id, request.tag_id
        )));
    }

    if !resolver::is_bookable(repo, request.tutor_id, request.day, request.time).await? {
        return Err(AppError::SlotUnavailable(format!(
            "Tutor {} is not bookable on {:?} at {}:00",
            request.tutor_id, request.day, request.time
        )));
    }

    // The claim re-checks the key atomically; a concurrent winner surfaces
    // here as a conflict rather than a double booking.
    match repo.claim_booking(request).await? {
        ClaimResult::Claimed(booking) => {
            info!(
                "Booking {} committed: student={} tutor={} {:?} {}:00",
                booking.id, booking.student_uid, booking.tutor_id, booking.day, booking.time
            );
            Ok(booking)
        }
        ClaimResult::Conflict => Err(AppError::SlotUnavailable(format!(
            "Tutor {} is already booked on {:?} at {}:00",
            request.tutor_id, request.day, request.time
        ))),
    }
}

/// Mark a booking as started.
pub async fn start_booking(repo: &Repository, booking_id: i64) -> Result<Booking, AppError> {
    let booking = repo.start_booking(booking_id).await?;
    info!("Booking {} started", booking.id);
    Ok(booking)
}

/// Mark a booking as concluded, freeing its key for future claims.
pub async fn conclude_booking(repo: &Repository, booking_id: i64) -> Result<Booking, AppError> {
    let booking = repo.conclude_booking(booking_id).await?;
    info!("Booking {} concluded", booking.id);
    Ok(booking)
}
