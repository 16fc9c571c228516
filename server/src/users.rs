// server/src/users.rs
//! Owns the `users` and `payment_orders` tables (spec.md §6). Out of the
//! core's scope per spec.md §1 ("the HTTP/JSON edge ... the admin/billing
//! CRUD ... are treated as thin adapters"), but still the edge's single
//! source of truth for identity, password hashes and the billing tuple.

use std::sync::{Arc, Mutex as StdMutex};

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use shared_models::{Billing, User};

use crate::error::ApiError;
use crate::schema;

pub struct UserStore {
    conn: Arc<StdMutex<Connection>>,
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let created_at: String = row.get(3)?;
    let paid_until: Option<String> = row.get(6)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        email_alerts_enabled: row.get::<_, i64>(4)? != 0,
        billing: Billing {
            is_paid: row.get::<_, i64>(5)? != 0,
            paid_until: paid_until.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            plan: row.get(7)?,
        },
    })
}

const USER_COLUMNS: &str = "id, username, email, created_at, email_alerts_enabled, is_paid, paid_until, plan";

impl UserStore {
    pub fn new(conn: Connection) -> rusqlite::Result<Self> {
        schema::init(&conn)?;
        Ok(Self { conn: Arc::new(StdMutex::new(conn)) })
    }

    pub fn register(&self, username: &str, email: &str, password: &str) -> Result<User, ApiError> {
        if username.trim().is_empty() || email.trim().is_empty() || password.len() < 8 {
            return Err(ApiError::Validation(
                "username, email and a password of at least 8 characters are required".into(),
            ));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?
            .to_string();

        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO users (username, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![username, email, hash, now],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
                ApiError::Conflict("username or email already registered".into())
            }
            other => ApiError::from(other),
        })?;

        let id = conn.last_insert_rowid();
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        Ok(conn.query_row(&sql, params![id], row_to_user)?)
    }

    /// Verifies the password and returns the user on success. Username and
    /// password mismatches are reported identically (`Unauthorized`) so a
    /// caller cannot enumerate usernames.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User, ApiError> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let row: Option<(User, String)> = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE username = ?1"),
                params![username],
                |row| {
                    let user = row_to_user(row)?;
                    let hash: String = row.get(8)?;
                    Ok((user, hash))
                },
            )
            .optional()?;

        let (user, hash) = row.ok_or(ApiError::Unauthorized)?;
        let parsed = PasswordHash::new(&hash).map_err(|e| ApiError::Internal(format!("corrupt password hash: {e}")))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| ApiError::Unauthorized)?;
        Ok(user)
    }

    pub fn find_by_id(&self, user_id: i64) -> Result<Option<User>, ApiError> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        Ok(conn.query_row(&sql, params![user_id], row_to_user).optional()?)
    }

    pub fn set_email_alerts_enabled(&self, user_id: i64, enabled: bool) -> Result<(), ApiError> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let updated = conn.execute(
            "UPDATE users SET email_alerts_enabled = ?1 WHERE id = ?2",
            params![enabled as i64, user_id],
        )?;
        if updated == 0 {
            return Err(ApiError::NotFound);
        }
        Ok(())
    }

    /// Records a completed purchase as an audit trail (`payment_orders`)
    /// and updates the authoritative billing tuple on `users`, per
    /// SPEC_FULL.md §3's resolution of this table's role.
    pub fn record_payment(&self, user_id: i64, amount: f64, plan: &str, paid_until: NaiveDate) -> Result<(), ApiError> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO payment_orders (user_id, amount, plan, status, created_at, paid_at)
             VALUES (?1, ?2, ?3, 'paid', ?4, ?4)",
            params![user_id, amount, plan, now],
        )?;
        conn.execute(
            "UPDATE users SET is_paid = 1, paid_until = ?1, plan = ?2 WHERE id = ?3",
            params![paid_until.format("%Y-%m-%d").to_string(), plan, user_id],
        )?;
        Ok(())
    }
}
