//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for slots, bookings, and messages.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Create tables if they don't exist
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tutors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uid INTEGER NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tutor_tags (
            tutor_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY (tutor_id, tag_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS availability (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tutor_id INTEGER NOT NULL,
            day INTEGER NOT NULL,
            start_time INTEGER NOT NULL,
            end_time INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bookings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_uid INTEGER NOT NULL,
            tutor_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            day INTEGER NOT NULL,
            time INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            started_at TEXT,
            concluded_at TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_uid INTEGER NOT NULL,
            receiver_uid INTEGER NOT NULL,
            content TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // The uniqueness invariant for booked keys: among unconcluded bookings a
    // (tutor, day, time) key exists at most once. Concluded rows fall out of
    // the index, which is what makes the key immediately reusable.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_bookings_active_key
            ON bookings(tutor_id, day, time)
            WHERE concluded_at IS NULL;
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_availability_tutor_day ON availability(tutor_id, day);
        CREATE INDEX IF NOT EXISTS idx_bookings_student ON bookings(student_uid);
        CREATE INDEX IF NOT EXISTS idx_bookings_tutor ON bookings(tutor_id);
        CREATE INDEX IF NOT EXISTS idx_messages_pair ON messages(sender_uid, receiver_uid);
        CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
