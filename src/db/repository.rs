//! Database repository for the slot store, booking ledger, and conversation ledger.
//!
//! Uses prepared statements and conditional writes for data integrity. The
//! booking claim and the slot insert are single conditional statements so a
//! competing request can never interleave between check and write.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    validate_schedule, validate_window, AvailabilitySlot, Booking, ConversationSummary,
    CreateBookingRequest, CreateTagRequest, CreateTutorRequest, Message, SlotWindow, Tag, Tutor,
    Weekday,
};

/// Outcome of an atomic booking claim. A conflict is an expected transaction
/// result, not an exceptional condition.
#[derive(Debug)]
pub enum ClaimResult {
    Claimed(Booking),
    Conflict,
}

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== TAG OPERATIONS ====================

    /// List all tags.
    pub async fn list_tags(&self) -> Result<Vec<Tag>, AppError> {
        let rows = sqlx::query("SELECT id, name FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|row| tag_from_row(&row)).collect())
    }

    /// Create a new tag.
    pub async fn create_tag(&self, request: &CreateTagRequest) -> Result<Tag, AppError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Tag name is required".to_string()));
        }

        let result = sqlx::query("INSERT INTO tags (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Validation(format!("Tag '{}' already exists", name))
                } else {
                    AppError::from(e)
                }
            })?;

        Ok(Tag {
            id: result.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    /// Check that a tag exists.
    pub async fn tag_exists(&self, tag_id: i64) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM tags WHERE id = ?")
            .bind(tag_id)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.get("n");
        Ok(n > 0)
    }

    // ==================== TUTOR OPERATIONS ====================

    /// Register a user as a tutor.
    pub async fn create_tutor(&self, request: &CreateTutorRequest) -> Result<Tutor, AppError> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query("INSERT INTO tutors (uid, created_at) VALUES (?, ?)")
            .bind(request.uid)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Validation(format!("User {} is already a tutor", request.uid))
                } else {
                    AppError::from(e)
                }
            })?;

        Ok(Tutor {
            id: result.last_insert_rowid(),
            uid: request.uid,
            tags: Vec::new(),
            created_at: now,
        })
    }

    /// Get a tutor by ID with the subjects it offers.
    pub async fn get_tutor(&self, tutor_id: i64) -> Result<Option<Tutor>, AppError> {
        let row = sqlx::query("SELECT id, uid, created_at FROM tutors WHERE id = ?")
            .bind(tutor_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tag_rows = sqlx::query(
            r#"SELECT t.id, t.name
               FROM tutor_tags tt
               INNER JOIN tags t ON tt.tag_id = t.id
               WHERE tt.tutor_id = ?
               ORDER BY t.name"#,
        )
        .bind(tutor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Tutor {
            id: row.get("id"),
            uid: row.get("uid"),
            tags: tag_rows.into_iter().map(|r| tag_from_row(&r)).collect(),
            created_at: row.get("created_at"),
        }))
    }

    /// Replace a tutor's offered subjects.
    pub async fn set_tutor_tags(&self, tutor_id: i64, tag_ids: &[i64]) -> Result<Tutor, AppError> {
        self.get_tutor(tutor_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Tutor {} not found", tutor_id)))?;

        for tag_id in tag_ids {
            if !self.tag_exists(*tag_id).await? {
                return Err(AppError::Validation(format!("Tag {} does not exist", tag_id)));
            }
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM tutor_tags WHERE tutor_id = ?")
            .bind(tutor_id)
            .execute(&mut *tx)
            .await?;

        for tag_id in tag_ids {
            sqlx::query("INSERT OR IGNORE INTO tutor_tags (tutor_id, tag_id) VALUES (?, ?)")
                .bind(tutor_id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.get_tutor(tutor_id)
            .await?
            .ok_or_else(|| AppError::Database(format!("Tutor {} vanished during update", tutor_id)))
    }

    /// Check whether a tutor offers a subject.
    pub async fn tutor_offers_tag(&self, tutor_id: i64, tag_id: i64) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM tutor_tags WHERE tutor_id = ? AND tag_id = ?")
            .bind(tutor_id)
            .bind(tag_id)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.get("n");
        Ok(n > 0)
    }

    // ==================== SLOT OPERATIONS ====================

    /// List a tutor's active availability slots, ordered by day then start.
    pub async fn list_active_slots(
        &self,
        tutor_id: i64,
        day: Option<Weekday>,
    ) -> Result<Vec<AvailabilitySlot>, AppError> {
        let rows = match day {
            Some(day) => {
                sqlx::query(
                    r#"SELECT id, tutor_id, day, start_time, end_time, is_active
                       FROM availability
                       WHERE tutor_id = ? AND day = ? AND is_active = 1
                       ORDER BY start_time"#,
                )
                .bind(tutor_id)
                .bind(day.index())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"SELECT id, tutor_id, day, start_time, end_time, is_active
                       FROM availability
                       WHERE tutor_id = ? AND is_active = 1
                       ORDER BY day, start_time"#,
                )
                .bind(tutor_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(slot_from_row).collect()
    }

    /// Replace a tutor's entire weekly schedule atomically.
    ///
    /// Slots absent from the new list are deactivated rather than deleted so
    /// historical bookings keep resolving the window they were carved from.
    pub async fn set_slots(
        &self,
        tutor_id: i64,
        slots: &[SlotWindow],
    ) -> Result<Vec<AvailabilitySlot>, AppError> {
        validate_schedule(slots).map_err(AppError::Validation)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE availability SET is_active = 0 WHERE tutor_id = ?")
            .bind(tutor_id)
            .execute(&mut *tx)
            .await?;

        let mut created = Vec::with_capacity(slots.len());
        for slot in slots {
            let result = sqlx::query(
                r#"INSERT INTO availability (tutor_id, day, start_time, end_time, is_active)
                   VALUES (?, ?, ?, ?, 1)"#,
            )
            .bind(tutor_id)
            .bind(slot.day.index())
            .bind(slot.start_time)
            .bind(slot.end_time)
            .execute(&mut *tx)
            .await?;

            created.push(AvailabilitySlot {
                id: result.last_insert_rowid(),
                tutor_id,
                day: slot.day,
                start_time: slot.start_time,
                end_time: slot.end_time,
                is_active: true,
            });
        }

        tx.commit().await?;

        created.sort_by_key(|s| (s.day, s.start_time));
        Ok(created)
    }

    /// Insert one slot unless it overlaps an existing active slot for the
    /// same tutor and day. The existence check and the insert are a single
    /// statement, so concurrent inserts cannot both pass the check.
    pub async fn add_slot(
        &self,
        tutor_id: i64,
        day: Weekday,
        start_time: i64,
        end_time: i64,
    ) -> Result<AvailabilitySlot, AppError> {
        validate_window(start_time, end_time).map_err(AppError::Validation)?;

        let result = sqlx::query(
            r#"INSERT INTO availability (tutor_id, day, start_time, end_time, is_active)
               SELECT ?1, ?2, ?3, ?4, 1
               WHERE NOT EXISTS (
                   SELECT 1 FROM availability
                   WHERE tutor_id = ?1 AND day = ?2 AND is_active = 1
                     AND start_time < ?4 AND ?3 < end_time
               )"#,
        )
        .bind(tutor_id)
        .bind(day.index())
        .bind(start_time)
        .bind(end_time)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Overlap(format!(
                "Slot {}-{} on {:?} overlaps an existing active slot",
                start_time, end_time, day
            )));
        }

        Ok(AvailabilitySlot {
            id: result.last_insert_rowid(),
            tutor_id,
            day,
            start_time,
            end_time,
            is_active: true,
        })
    }

    /// Mark a slot inactive. Succeeds idempotently if already inactive.
    pub async fn remove_slot(&self, slot_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE availability SET is_active = 0 WHERE id = ?")
            .bind(slot_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Slot {} not found", slot_id)));
        }
        Ok(())
    }

    // ==================== BOOKING OPERATIONS ====================

    /// Atomically claim a (tutor, day, time) key. The insert only fires when
    /// no active booking holds the key; the partial unique index backstops
    /// the race, so of N concurrent claims exactly one returns `Claimed`.
    pub async fn claim_booking(
        &self,
        request: &CreateBookingRequest,
    ) -> Result<ClaimResult, AppError> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"INSERT INTO bookings (student_uid, tutor_id, tag_id, day, time, created_at)
               SELECT ?1, ?2, ?3, ?4, ?5, ?6
               WHERE NOT EXISTS (
                   SELECT 1 FROM bookings
                   WHERE tutor_id = ?2 AND day = ?4 AND time = ?5 AND concluded_at IS NULL
               )"#,
        )
        .bind(request.student_uid)
        .bind(request.tutor_id)
        .bind(request.tag_id)
        .bind(request.day.index())
        .bind(request.time)
        .bind(&now)
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(result) => result,
            Err(e) if is_unique_violation(&e) => return Ok(ClaimResult::Conflict),
            Err(e) => return Err(AppError::from(e)),
        };

        if result.rows_affected() == 0 {
            return Ok(ClaimResult::Conflict);
        }

        Ok(ClaimResult::Claimed(Booking {
            id: result.last_insert_rowid(),
            student_uid: request.student_uid,
            tutor_id: request.tutor_id,
            tag_id: request.tag_id,
            day: request.day,
            time: request.time,
            created_at: now,
            started_at: None,
            concluded_at: None,
        }))
    }

    /// Get a booking by ID.
    pub async fn get_booking(&self, booking_id: i64) -> Result<Option<Booking>, AppError> {
        let row = sqlx::query(
            r#"SELECT id, student_uid, tutor_id, tag_id, day, time, created_at, started_at, concluded_at
               FROM bookings WHERE id = ?"#,
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(booking_from_row).transpose()
    }

    /// Set the start timestamp on a booking that has not started yet.
    pub async fn start_booking(&self, booking_id: i64) -> Result<Booking, AppError> {
        let now = Utc::now().to_rfc3339();

        let result =
            sqlx::query("UPDATE bookings SET started_at = ? WHERE id = ? AND started_at IS NULL")
                .bind(&now)
                .bind(booking_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return match self.get_booking(booking_id).await? {
                None => Err(AppError::NotFound(format!(
                    "Booking {} not found",
                    booking_id
                ))),
                Some(_) => Err(AppError::AlreadyStarted(format!(
                    "Booking {} was already started",
                    booking_id
                ))),
            };
        }

        self.get_booking(booking_id).await?.ok_or_else(|| {
            AppError::Database(format!("Booking {} vanished during update", booking_id))
        })
    }

    /// Set the conclusion timestamp, freeing the booking's key for future
    /// claims. Idempotent when the booking is already concluded.
    pub async fn conclude_booking(&self, booking_id: i64) -> Result<Booking, AppError> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"UPDATE bookings SET concluded_at = ?
               WHERE id = ? AND started_at IS NOT NULL AND concluded_at IS NULL"#,
        )
        .bind(&now)
        .bind(booking_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get_booking(booking_id).await? {
                None => Err(AppError::NotFound(format!(
                    "Booking {} not found",
                    booking_id
                ))),
                Some(booking) if booking.started_at.is_none() => Err(AppError::NotStarted(
                    format!("Booking {} has not been started", booking_id),
                )),
                // Already concluded
                Some(booking) => Ok(booking),
            };
        }

        self.get_booking(booking_id).await?.ok_or_else(|| {
            AppError::Database(format!("Booking {} vanished during update", booking_id))
        })
    }

    /// List a user's bookings as student, newest first.
    pub async fn list_student_bookings(&self, uid: i64) -> Result<Vec<Booking>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, student_uid, tutor_id, tag_id, day, time, created_at, started_at, concluded_at
               FROM bookings WHERE student_uid = ? ORDER BY id DESC"#,
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(booking_from_row).collect()
    }

    /// List a tutor's bookings, newest first.
    pub async fn list_tutor_bookings(&self, tutor_id: i64) -> Result<Vec<Booking>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, student_uid, tutor_id, tag_id, day, time, created_at, started_at, concluded_at
               FROM bookings WHERE tutor_id = ? ORDER BY id DESC"#,
        )
        .bind(tutor_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(booking_from_row).collect()
    }

    /// Hours held by active (unconcluded) bookings for a tutor and day.
    pub async fn booked_times(&self, tutor_id: i64, day: Weekday) -> Result<Vec<i64>, AppError> {
        let rows = sqlx::query(
            r#"SELECT time FROM bookings
               WHERE tutor_id = ? AND day = ? AND concluded_at IS NULL
               ORDER BY time"#,
        )
        .bind(tutor_id)
        .bind(day.index())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("time")).collect())
    }

    // ==================== MESSAGE OPERATIONS ====================

    /// Two users may message iff some booking links one as student to a
    /// tutor owned by the other, in either orientation. Symmetric in its
    /// arguments by construction.
    pub async fn can_message(&self, uid_a: i64, uid_b: i64) -> Result<bool, AppError> {
        let row = sqlx::query(
            r#"SELECT COUNT(*) AS n
               FROM bookings b
               WHERE (b.student_uid = ?1 AND b.tutor_id IN (SELECT id FROM tutors WHERE uid = ?2))
                  OR (b.student_uid = ?2 AND b.tutor_id IN (SELECT id FROM tutors WHERE uid = ?1))"#,
        )
        .bind(uid_a)
        .bind(uid_b)
        .fetch_one(&self.pool)
        .await?;

        let n: i64 = row.get("n");
        Ok(n > 0)
    }

    /// Gate, then append to the conversation ledger. The ledger is the sole
    /// writer of messages; rows are never edited or deleted.
    pub async fn send_message(
        &self,
        sender_uid: i64,
        receiver_uid: i64,
        content: &str,
    ) -> Result<Message, AppError> {
        if content.trim().is_empty() {
            return Err(AppError::Validation(
                "Message content must not be empty".to_string(),
            ));
        }
        if !self.can_message(sender_uid, receiver_uid).await? {
            return Err(AppError::PermissionDenied(
                "Users must share a booked session before messaging".to_string(),
            ));
        }

        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"INSERT INTO messages (sender_uid, receiver_uid, content, timestamp)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(sender_uid)
        .bind(receiver_uid)
        .bind(content)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Message {
            id: result.last_insert_rowid(),
            sender_uid,
            receiver_uid,
            content: content.to_string(),
            timestamp: now,
        })
    }

    /// Messages between a pair, oldest first by (timestamp, id), paginated.
    /// Ascending offsets concatenate into the full ledger without gaps or
    /// duplicates.
    pub async fn get_conversation(
        &self,
        uid_a: i64,
        uid_b: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, sender_uid, receiver_uid, content, timestamp
               FROM messages
               WHERE (sender_uid = ?1 AND receiver_uid = ?2)
                  OR (sender_uid = ?2 AND receiver_uid = ?1)
               ORDER BY timestamp, id
               LIMIT ?3 OFFSET ?4"#,
        )
        .bind(uid_a)
        .bind(uid_b)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(message_from_row).collect())
    }

    /// Per distinct counterpart, the most recent message, ordered by that
    /// message's recency descending.
    pub async fn get_recent_conversations(
        &self,
        uid: i64,
        limit: i64,
    ) -> Result<Vec<ConversationSummary>, AppError> {
        let rows = sqlx::query(
            r#"SELECT counterpart_uid, content, timestamp FROM (
                   SELECT
                       CASE WHEN sender_uid = ?1 THEN receiver_uid ELSE sender_uid END
                           AS counterpart_uid,
                       content,
                       timestamp,
                       ROW_NUMBER() OVER (
                           PARTITION BY CASE WHEN sender_uid = ?1 THEN receiver_uid
                                             ELSE sender_uid END
                           ORDER BY timestamp DESC, id DESC
                       ) AS rn
                   FROM messages
                   WHERE sender_uid = ?1 OR receiver_uid = ?1
               )
               WHERE rn = 1
               ORDER BY timestamp DESC
               LIMIT ?2"#,
        )
        .bind(uid)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ConversationSummary {
                counterpart_uid: row.get("counterpart_uid"),
                last_message: row.get("content"),
                last_message_at: row.get("timestamp"),
            })
            .collect())
    }
}

// Helper functions for row conversion

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            // SQLITE_CONSTRAINT_UNIQUE / SQLITE_CONSTRAINT_PRIMARYKEY
            matches!(db_err.code().as_deref(), Some("2067") | Some("1555"))
        }
        _ => false,
    }
}

fn day_from_ordinal(value: i64) -> Result<Weekday, AppError> {
    Weekday::from_index(value)
        .ok_or_else(|| AppError::Database(format!("Invalid weekday ordinal {} in storage", value)))
}

fn tag_from_row(row: &sqlx::sqlite::SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
    }
}

fn slot_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AvailabilitySlot, AppError> {
    let is_active: i64 = row.get("is_active");
    Ok(AvailabilitySlot {
        id: row.get("id"),
        tutor_id: row.get("tutor_id"),
        day: day_from_ordinal(row.get("day"))?,
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        is_active: is_active != 0,
    })
}

fn booking_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Booking, AppError> {
    Ok(Booking {
        id: row.get("id"),
        student_uid: row.get("student_uid"),
        tutor_id: row.get("tutor_id"),
        tag_id: row.get("tag_id"),
        day: day_from_ordinal(row.get("day"))?,
        time: row.get("time"),
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        concluded_at: row.get("concluded_at"),
    })
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Message {
    Message {
        id: row.get("id"),
        sender_uid: row.get("sender_uid"),
        receiver_uid: row.get("receiver_uid"),
        content: row.get("content"),
        timestamp: row.get("timestamp"),
    }
}
