// server/src/config.rs
//! Process configuration, loaded once from environment variables (and the
//! `admin_settings` table) at startup — matching
//! `position_manager/src/config.rs`'s
//! `lazy_static! { pub static ref CONFIG: Config = Config::load(); }` shape.
//! No hot-reload (SPEC_FULL.md §4.3's `admin_settings` note): an operator
//! tunes `billing_enabled` and the tick/TTL overrides by writing that table,
//! but a process restart is required to pick the new values up.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use lazy_static::lazy_static;
use rusqlite::Connection;
use tracing::warn;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Reads the `key`/`value` overrides an operator has written to
/// `admin_settings`, tolerating a missing database or table on first boot
/// (the edge's own schema bootstrap runs after `Config` is first touched).
fn admin_settings(database_path: &str) -> HashMap<String, String> {
    let load = || -> rusqlite::Result<HashMap<String, String>> {
        let conn = Connection::open(database_path)?;
        conn.execute_batch("CREATE TABLE IF NOT EXISTS admin_settings (key TEXT PRIMARY KEY, value TEXT NOT NULL)")?;
        let mut stmt = conn.prepare("SELECT key, value FROM admin_settings")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        rows.collect()
    };
    load().unwrap_or_else(|err| {
        warn!(%err, "could not read admin_settings overrides, using defaults");
        HashMap::new()
    })
}

fn setting_or<T: std::str::FromStr>(settings: &HashMap<String, String>, key: &str, env_key: &str, default: T) -> T {
    if let Ok(v) = env::var(env_key) {
        if let Ok(parsed) = v.parse() {
            return parsed;
        }
    }
    settings.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

pub struct Config {
    pub database_path: String,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,

    pub smtp_relay: String,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_from: String,

    pub ashare_endpoint: String,
    pub forex_endpoint: String,

    pub monitor_tick_interval: Duration,
    pub price_ttl: Duration,

    pub billing_enabled: bool,

    pub admin_username: String,
    pub admin_password: String,

    /// One reporting timezone per deployment (spec.md §9); `Asia/Shanghai`
    /// in the original deployment, overridable for others.
    pub reporting_timezone: String,

    pub api_bind: String,
    pub metrics_bind: String,
}

impl Config {
    fn load() -> Self {
        let database_path = env_or("DATABASE_PATH", "trade_journal.sqlite3");
        let settings = admin_settings(&database_path);

        Self {
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            jwt_ttl: Duration::from_secs(env_parse_or("JWT_TTL_SECS", 24 * 3600)),

            smtp_relay: env_or("SMTP_RELAY", "localhost"),
            smtp_username: env_or("SMTP_USERNAME", ""),
            smtp_password: env_or("SMTP_PASSWORD", ""),
            smtp_from: env_or("SMTP_FROM", "alerts@trade-journal.local"),

            ashare_endpoint: env_or("ASHARE_QUOTE_ENDPOINT", "https://hq.sinajs.cn/list"),
            forex_endpoint: env_or("FOREX_QUOTE_ENDPOINT", "https://fx.example.invalid/quote"),

            monitor_tick_interval: Duration::from_secs(setting_or(&settings, "monitor_tick_secs", "MONITOR_TICK_SECS", 10)),
            price_ttl: Duration::from_secs(setting_or(&settings, "price_ttl_secs", "PRICE_TTL_SECS", 30)),

            billing_enabled: setting_or(&settings, "billing_enabled", "BILLING_ENABLED", false),

            admin_username: env_or("ADMIN_USERNAME", "admin"),
            admin_password: env_or("ADMIN_PASSWORD", "changeme"),

            reporting_timezone: env_or("REPORTING_TIMEZONE", "Asia/Shanghai"),

            api_bind: env_or("API_BIND", "0.0.0.0:8080"),
            metrics_bind: env_or("METRICS_BIND", "0.0.0.0:9090"),

            database_path,
        }
    }

    pub fn tz(&self) -> chrono_tz::Tz {
        self.reporting_timezone
            .parse()
            .unwrap_or_else(|_| panic!("invalid REPORTING_TIMEZONE: {}", self.reporting_timezone))
    }
}

lazy_static! {
    pub static ref CONFIG: Config = Config::load();
}
