// server/src/schema.rs
//! Idempotent bootstrap for the tables the edge owns (`users`,
//! `payment_orders`, `admin_settings`) — mandated by spec.md §6's
//! persisted state layout, mirroring `ledger::schema`'s
//! `CREATE TABLE IF NOT EXISTS` style. No migration history table, per
//! SPEC_FULL.md's ambient non-goal.

use rusqlite::Connection;

pub fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                     INTEGER PRIMARY KEY AUTOINCREMENT,
            username               TEXT NOT NULL UNIQUE,
            email                  TEXT NOT NULL UNIQUE,
            password_hash          TEXT NOT NULL,
            created_at             TEXT NOT NULL,
            email_alerts_enabled   INTEGER NOT NULL DEFAULT 1,
            is_paid                INTEGER NOT NULL DEFAULT 0,
            paid_until             TEXT,
            plan                   TEXT
        );

        CREATE TABLE IF NOT EXISTS payment_orders (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL,
            amount      REAL NOT NULL,
            plan        TEXT NOT NULL,
            status      TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            paid_at     TEXT
        );

        CREATE TABLE IF NOT EXISTS admin_settings (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )
}
