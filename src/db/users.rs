//! Users, login sessions and API tokens.

use super::{Database, now_ms};
use crate::auth::{generate_key, hash_password, verify_password};
use crate::error::ApiError;
use crate::types::{NewUser, User};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info, warn};

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, date_joined";

fn parse_user_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        date_joined: row.get("date_joined")?,
    })
}

pub(crate) fn get_user_internal(conn: &Connection, user_id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![user_id],
            parse_user_row,
        )
        .optional()?;
    Ok(user)
}

impl Database {
    /// Register a user together with default email preferences.
    pub fn create_user(&self, new_user: NewUser) -> Result<User> {
        let now = now_ms();
        let password_hash = hash_password(&new_user.password);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
                params![&new_user.username],
                |row| row.get(0),
            )?;
            if taken {
                return Err(ApiError::already_exists("user", &new_user.username)
                    .with_field("username")
                    .into());
            }

            tx.execute(
                "INSERT INTO users (username, email, first_name, last_name, password_hash, date_joined)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    &new_user.username,
                    &new_user.email,
                    &new_user.first_name,
                    &new_user.last_name,
                    &password_hash,
                    now,
                ],
            )?;
            let user_id = tx.last_insert_rowid();

            // Every user gets a report schedule from the start
            tx.execute(
                "INSERT INTO email_preferences (user_id) VALUES (?1)",
                params![user_id],
            )?;

            tx.commit()?;

            info!(user_id, username = %new_user.username, "User registered");

            Ok(User {
                id: user_id,
                username: new_user.username,
                email: new_user.email,
                first_name: new_user.first_name,
                last_name: new_user.last_name,
                date_joined: now,
            })
        })
    }

    /// Get a user by ID.
    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        self.with_conn(|conn| get_user_internal(conn, user_id))
    }

    /// Get a user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
                    params![username],
                    parse_user_row,
                )
                .optional()?;
            Ok(user)
        })
    }

    /// Check credentials. Returns the user when the password matches.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let row: Option<(i64, String)> = conn
                .query_row(
                    "SELECT id, password_hash FROM users WHERE username = ?1",
                    params![username],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((user_id, stored)) = row else {
                debug!(username, "Login attempt for unknown user");
                return Ok(None);
            };

            match verify_password(password, &stored) {
                Ok(true) => get_user_internal(conn, user_id),
                Ok(false) => {
                    debug!(user_id, "Login attempt with wrong password");
                    Ok(None)
                }
                Err(e) => {
                    warn!(user_id, error = %e, "Cannot verify stored password");
                    Ok(None)
                }
            }
        })
    }

    /// Start a login session lasting `ttl_ms`. Returns the session key.
    pub fn create_session(&self, user_id: i64, ttl_ms: i64) -> Result<String> {
        let now = now_ms();
        let key = generate_key();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (key, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
                params![&key, user_id, now, now + ttl_ms],
            )?;
            Ok(())
        })?;

        debug!(user_id, "Session created");
        Ok(key)
    }

    /// Resolve a session key to its user. Expired sessions are purged.
    pub fn session_user(&self, key: &str) -> Result<Option<User>> {
        let now = now_ms();

        self.with_conn(|conn| {
            let row: Option<(i64, i64)> = conn
                .query_row(
                    "SELECT user_id, expires_at FROM sessions WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((user_id, expires_at)) if expires_at > now => get_user_internal(conn, user_id),
                Some(_) => {
                    conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }

    /// End a login session.
    pub fn delete_session(&self, key: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM sessions WHERE key = ?1", params![key])?;
            Ok(deleted > 0)
        })
    }

    /// Return the user's API token, creating it on first use.
    pub fn get_or_create_token(&self, user_id: i64) -> Result<String> {
        let now = now_ms();

        self.with_conn(|conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT key FROM auth_tokens WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(key) = existing {
                return Ok(key);
            }

            let key = generate_key();
            conn.execute(
                "INSERT INTO auth_tokens (key, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![&key, user_id, now],
            )?;
            info!(user_id, "API token issued");
            Ok(key)
        })
    }

    /// Resolve an API token to its user.
    pub fn token_user(&self, key: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    "SELECT u.id, u.username, u.email, u.first_name, u.last_name, u.date_joined
                     FROM users u INNER JOIN auth_tokens t ON t.user_id = u.id
                     WHERE t.key = ?1",
                    params![key],
                    parse_user_row,
                )
                .optional()?;
            Ok(user)
        })
    }
}
