//! Global studio settings document

use chrono::Utc;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::parse::OptionalExt;
use crate::error::Result;
use crate::projector::BookingWindow;

const GLOBAL_KEY: &str = "global";

/// Studio-wide tunables, stored as the `settings/global` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioSettings {
    pub booking_window: BookingWindow,
    /// Months of history kept when pruning without an explicit value
    pub prune_months_to_keep: u32,
    /// Maximum operations per atomic prune batch
    pub prune_batch_size: usize,
    /// Rate used for instructors with no rate of their own
    pub default_hourly_rate: Decimal,
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self {
            booking_window: BookingWindow::default(),
            prune_months_to_keep: 6,
            prune_batch_size: 400,
            default_hourly_rate: Decimal::ZERO,
        }
    }
}

pub struct SettingsStore<'a> {
    conn: &'a Connection,
}

impl<'a> SettingsStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Get the stored settings, if any were saved
    #[instrument(skip(self))]
    pub fn get(&self) -> Result<Option<StudioSettings>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = ?1",
                params![GLOBAL_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Stored settings, or defaults when none were saved
    pub fn get_or_default(&self) -> Result<StudioSettings> {
        Ok(self.get()?.unwrap_or_default())
    }

    /// Save settings
    #[instrument(skip(self, settings))]
    pub fn save(&self, settings: &StudioSettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        self.conn.execute(
            "INSERT INTO settings (key, value_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value_json = ?2, updated_at = ?3",
            params![GLOBAL_KEY, json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
