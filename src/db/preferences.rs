//! Email report preferences.

use super::Database;
use crate::error::ApiError;
use crate::types::EmailPreferences;
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

/// Latest hour a report can be scheduled for.
pub const MAX_EMAIL_HOUR: u32 = 23;

fn parse_preferences_row(row: &Row) -> rusqlite::Result<EmailPreferences> {
    Ok(EmailPreferences {
        user_id: row.get("user_id")?,
        selected_email_hour: row.get("selected_email_hour")?,
        previous_report_day: row.get("previous_report_day")?,
    })
}

impl Database {
    /// Get a user's report preferences.
    pub fn email_preferences(&self, user_id: i64) -> Result<Option<EmailPreferences>> {
        self.with_conn(|conn| {
            let prefs = conn
                .query_row(
                    "SELECT user_id, selected_email_hour, previous_report_day
                     FROM email_preferences WHERE user_id = ?1",
                    params![user_id],
                    parse_preferences_row,
                )
                .optional()?;
            Ok(prefs)
        })
    }

    /// Change the hour a user's daily report is sent at.
    pub fn update_email_hour(&self, user_id: i64, hour: u32) -> Result<EmailPreferences> {
        if hour > MAX_EMAIL_HOUR {
            return Err(ApiError::invalid_value(
                "selected_email_hour",
                "Error: hour must be from 0 to 23",
            )
            .into());
        }

        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE email_preferences SET selected_email_hour = ?1 WHERE user_id = ?2",
                params![hour, user_id],
            )?;
            if updated == 0 {
                return Err(ApiError::user_not_found(user_id).into());
            }

            let prefs = conn.query_row(
                "SELECT user_id, selected_email_hour, previous_report_day
                 FROM email_preferences WHERE user_id = ?1",
                params![user_id],
                parse_preferences_row,
            )?;
            tracing::info!(user_id, hour, "Email report hour updated");
            Ok(prefs)
        })
    }

    /// Preferences whose report is due: the selected hour has passed and no
    /// report went out on `current_day` yet.
    pub fn due_report_preferences(
        &self,
        current_hour: u32,
        current_day: u32,
    ) -> Result<Vec<EmailPreferences>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, selected_email_hour, previous_report_day
                 FROM email_preferences
                 WHERE selected_email_hour <= ?1 AND previous_report_day != ?2
                 ORDER BY user_id",
            )?;
            let prefs = stmt
                .query_map(params![current_hour, current_day], parse_preferences_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(prefs)
        })
    }

    /// Remember that the user's report for `day` was sent.
    pub fn mark_report_sent(&self, user_id: i64, day: u32) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE email_preferences SET previous_report_day = ?1 WHERE user_id = ?2",
                params![day, user_id],
            )?;
            Ok(())
        })
    }
}
