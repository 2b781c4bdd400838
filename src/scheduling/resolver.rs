//! Availability resolution: which hours of a day can still be booked.
//!
//! A pure read derived from the slot store and the booking ledger. It holds
//! no state of its own and is recomputed from storage on every call, so the
//! coordinator always sees the current picture.

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{AvailabilitySlot, Weekday};

/// Hours covered by a set of slot windows, ascending and deduplicated.
pub fn covered_hours(slots: &[AvailabilitySlot]) -> Vec<i64> {
    let mut hours: Vec<i64> = slots
        .iter()
        .flat_map(|slot| slot.start_time..slot.end_time)
        .collect();
    hours.sort_unstable();
    hours.dedup();
    hours
}

/// Bookable hours for a tutor on a day: the union of hours covered by active
/// slots minus the hours held by active (unconcluded) bookings.
pub async fn resolve_bookable_times(
    repo: &Repository,
    tutor_id: i64,
    day: Weekday,
) -> Result<Vec<i64>, AppError> {
    let slots = repo.list_active_slots(tutor_id, Some(day)).await?;
    let booked = repo.booked_times(tutor_id, day).await?;

    Ok(covered_hours(&slots)
        .into_iter()
        .filter(|hour| !booked.contains(hour))
        .collect())
}

/// Membership test, equivalent to `resolve_bookable_times` containing `time`.
pub async fn is_bookable(
    repo: &Repository,
    tutor_id: i64,
    day: Weekday,
    time: i64,
) -> Result<bool, AppError> {
    Ok(resolve_bookable_times(repo, tutor_id, day)
        .await?
        .contains(&time))
}
