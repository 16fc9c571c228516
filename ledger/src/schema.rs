// ledger/src/schema.rs
use rusqlite::Connection;

/// Idempotent bootstrap — no migration history table, per SPEC_FULL.md's
/// ambient "database migrations" non-goal. Safe to call on every startup.
pub fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS strategies (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         INTEGER NOT NULL,
            name            TEXT NOT NULL,
            market          TEXT NOT NULL,
            initial_capital REAL,
            initial_date    TEXT,
            is_deleted      INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS capital_anchors (
            strategy_id INTEGER PRIMARY KEY,
            amount      REAL NOT NULL,
            date        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS trades (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         INTEGER NOT NULL,
            strategy_id     INTEGER NOT NULL,
            instrument_code TEXT NOT NULL,
            instrument_name TEXT,
            side            TEXT NOT NULL,
            shares          REAL NOT NULL,
            open_time       TEXT NOT NULL,
            open_price      REAL NOT NULL,
            close_time      TEXT,
            close_price     REAL,
            commission_buy  REAL NOT NULL DEFAULT 0,
            commission_sell REAL NOT NULL DEFAULT 0,
            stop_loss_price   REAL,
            take_profit_price REAL,
            stop_loss_alert   INTEGER NOT NULL DEFAULT 0,
            take_profit_alert INTEGER NOT NULL DEFAULT 0,
            status            TEXT NOT NULL,
            order_result      TEXT,
            is_deleted        INTEGER NOT NULL DEFAULT 0,
            parent_trade_id   INTEGER,
            note              TEXT,
            theoretical_risk_reward_ratio REAL
        );

        CREATE INDEX IF NOT EXISTS idx_trades_strategy ON trades (strategy_id, is_deleted);
        CREATE INDEX IF NOT EXISTS idx_trades_parent ON trades (parent_trade_id);

        CREATE TABLE IF NOT EXISTS capital_history (
            strategy_id     INTEGER NOT NULL,
            date            TEXT NOT NULL,
            total_assets    REAL NOT NULL,
            available_funds REAL NOT NULL,
            position_value  REAL NOT NULL,
            PRIMARY KEY (strategy_id, date)
        );

        CREATE TABLE IF NOT EXISTS alert_delivery (
            user_id         INTEGER NOT NULL,
            instrument_code TEXT NOT NULL,
            direction       TEXT NOT NULL,
            last_sent_at    TEXT NOT NULL,
            PRIMARY KEY (user_id, instrument_code, direction)
        );
        ",
    )
}
