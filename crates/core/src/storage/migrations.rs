//! Database migration system
//!
//! Tracks schema versions and applies migrations in order.

use rusqlite::Connection;
use tracing::{info, instrument};

use crate::error::Result;

/// A database migration
pub struct Migration {
    /// Version number (must be sequential starting from 1)
    pub version: u32,
    /// Description of what this migration does
    pub description: &'static str,
    /// SQL to run for this migration
    pub sql: &'static str,
}

/// All migrations in order
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema",
        sql: r#"
            -- Users as known to the booking core
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT,
                role INTEGER NOT NULL,
                membership TEXT NOT NULL DEFAULT 'CREDIT',
                credits TEXT NOT NULL DEFAULT '0',
                unlimited_expiry TEXT
            );

            -- Instructors
            CREATE TABLE IF NOT EXISTS instructors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                bio TEXT NOT NULL DEFAULT '',
                image_url TEXT,
                phone_number TEXT,
                default_rate TEXT NOT NULL DEFAULT '0'
            );

            -- Recurring class templates
            -- instructor_id is a weak reference, resolved by lookup
            CREATE TABLE IF NOT EXISTS classes (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                difficulty TEXT NOT NULL DEFAULT 'beginner',
                day_of_week INTEGER NOT NULL,
                start_time TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL,
                instructor_id TEXT NOT NULL,
                capacity INTEGER NOT NULL,
                points_cost TEXT NOT NULL DEFAULT '1',
                created_at TEXT NOT NULL,
                archived INTEGER NOT NULL DEFAULT 0,
                archived_at TEXT
            );

            -- Per-date rosters; student_id may dangle (ghost bookings)
            CREATE TABLE IF NOT EXISTS class_bookings (
                class_id INTEGER NOT NULL,
                date_key TEXT NOT NULL,
                student_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                charged TEXT NOT NULL DEFAULT '0',
                PRIMARY KEY (class_id, date_key, student_id),
                FOREIGN KEY (class_id) REFERENCES classes(id) ON DELETE CASCADE
            );

            -- Per-date instructor overrides
            CREATE TABLE IF NOT EXISTS class_substitutions (
                class_id INTEGER NOT NULL,
                date_key TEXT NOT NULL,
                instructor_id TEXT NOT NULL,
                PRIMARY KEY (class_id, date_key),
                FOREIGN KEY (class_id) REFERENCES classes(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 2,
        description: "Add indexes for query performance",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_classes_archived ON classes(archived);
            CREATE INDEX IF NOT EXISTS idx_classes_day ON classes(day_of_week, archived);
            CREATE INDEX IF NOT EXISTS idx_bookings_student ON class_bookings(student_id, date_key);
            CREATE INDEX IF NOT EXISTS idx_bookings_date ON class_bookings(date_key);
            CREATE INDEX IF NOT EXISTS idx_substitutions_date ON class_substitutions(date_key);
        "#,
    },
    Migration {
        version: 3,
        description: "Add global settings document",
        sql: r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
    },
];

/// Initialize the migrations table
fn init_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version
pub(crate) fn get_current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .unwrap_or(None);
    Ok(version.unwrap_or(0))
}

/// Record that a migration was applied
fn record_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            migration.version,
            migration.description,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

/// Run all pending migrations
#[instrument(skip(conn))]
pub fn run_migrations(conn: &Connection) -> Result<()> {
    init_migrations_table(conn)?;

    let current_version = get_current_version(conn)?;
    info!(current_version, "Checking for pending migrations");

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                description = migration.description,
                "Applying migration"
            );

            conn.execute_batch(migration.sql)?;
            record_migration(conn, migration)?;

            info!(version = migration.version, "Migration complete");
        }
    }

    let new_version = get_current_version(conn)?;
    if new_version > current_version {
        info!(
            from = current_version,
            to = new_version,
            "Database schema updated"
        );
    }

    Ok(())
}
