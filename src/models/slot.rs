//! Availability slot model and weekly-schedule validation.

use serde::{Deserialize, Serialize};

/// Earliest bookable hour of a day.
pub const MIN_HOUR: i64 = 0;
/// One past the latest bookable hour; slot windows may end here.
pub const MAX_HOUR: i64 = 24;

/// Day of the week for recurring availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    /// Ordinal used for storage and ordering (Monday = 0).
    pub fn index(self) -> i64 {
        self as i64
    }

    pub fn from_index(value: i64) -> Option<Self> {
        Self::ALL.get(usize::try_from(value).ok()?).copied()
    }
}

/// A recurring weekly availability window. Times are military hours and the
/// window is half-open: a 9-11 slot covers the 9:00 and 10:00 sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySlot {
    pub id: i64,
    pub tutor_id: i64,
    pub day: Weekday,
    pub start_time: i64,
    pub end_time: i64,
    pub is_active: bool,
}

/// One window in an availability request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotWindow {
    pub day: Weekday,
    pub start_time: i64,
    pub end_time: i64,
}

/// Request body for replacing a tutor's entire weekly schedule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSlotsRequest {
    pub slots: Vec<SlotWindow>,
}

/// Two half-open windows overlap iff each starts before the other ends.
pub fn windows_overlap(a_start: i64, a_end: i64, b_start: i64, b_end: i64) -> bool {
    a_start < b_end && b_start < a_end
}

/// Check a single window for well-formedness.
pub fn validate_window(start_time: i64, end_time: i64) -> Result<(), String> {
    if !(MIN_HOUR..MAX_HOUR).contains(&start_time) || !(MIN_HOUR..=MAX_HOUR).contains(&end_time) {
        return Err(format!(
            "Slot times must be hours within {}..{}",
            MIN_HOUR, MAX_HOUR
        ));
    }
    if start_time >= end_time {
        return Err(format!(
            "Slot start time {} must be before end time {}",
            start_time, end_time
        ));
    }
    Ok(())
}

/// Validate a whole weekly schedule: every window well-formed and no two
/// windows for the same day overlapping.
pub fn validate_schedule(slots: &[SlotWindow]) -> Result<(), String> {
    for slot in slots {
        validate_window(slot.start_time, slot.end_time)?;
    }
    for (i, a) in slots.iter().enumerate() {
        for b in &slots[i + 1..] {
            if a.day == b.day && windows_overlap(a.start_time, a.end_time, b.start_time, b.end_time)
            {
                return Err(format!(
                    "Overlapping slots on {:?}: {}-{} and {}-{}",
                    a.day, a.start_time, a.end_time, b.start_time, b.end_time
                ));
            }
        }
    }
    Ok(())
}
