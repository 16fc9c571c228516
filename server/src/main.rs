// server/src/main.rs
//! E2 — process wiring. Boots the sqlite-backed stores, the quote cascade,
//! and the two background loops (C4's monitor, C5's dispatcher), then
//! serves the HTTP edge and a separate metrics listener until a shutdown
//! signal arrives (spec.md §5's cancellation contract).

mod auth;
mod config;
mod directory;
mod error;
mod routes;
mod schema;
mod state;
mod users;

use std::sync::Arc;

use anyhow::{Context, Result};
use ledger::Store;
use monitor::Monitor;
use notifier::{Dispatcher, SmtpMailer};
use price_cache::PriceCache;
use quote_source::{AShareProvider, ForexProvider, QuoteSource, Variant};
use rusqlite::Connection;
use tokio::sync::{mpsc, watch};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use crate::config::CONFIG;
use crate::directory::ServerUserDirectory;
use crate::state::AppState;
use crate::users::UserStore;

const ALERT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(database = %CONFIG.database_path, "starting trade journal server");

    let ledger_conn = Connection::open(&CONFIG.database_path)
        .with_context(|| format!("opening ledger database at {}", CONFIG.database_path))?;
    let store = Arc::new(Store::new(ledger_conn, CONFIG.tz())?);

    let users_conn = Connection::open(&CONFIG.database_path)
        .with_context(|| format!("opening users database at {}", CONFIG.database_path))?;
    let users = Arc::new(UserStore::new(users_conn)?);

    let quote_source = QuoteSource::new(vec![
        Box::new(AShareProvider::new(CONFIG.ashare_endpoint.clone(), Variant::Sina)),
        Box::new(AShareProvider::new(CONFIG.ashare_endpoint.clone(), Variant::Tencent)),
        Box::new(ForexProvider::new(CONFIG.forex_endpoint.clone())),
    ]);
    let cache = Arc::new(PriceCache::with_ttl(quote_source, CONFIG.price_ttl));

    let mailer: Arc<dyn notifier::Mailer> = Arc::new(SmtpMailer::new(
        &CONFIG.smtp_relay,
        CONFIG.smtp_username.clone(),
        CONFIG.smtp_password.clone(),
        CONFIG.smtp_from.clone(),
    )?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (alert_tx, alert_rx) = mpsc::channel(ALERT_CHANNEL_CAPACITY);

    let monitor = Monitor::with_tick_interval(store.clone(), cache.clone(), alert_tx, CONFIG.monitor_tick_interval);
    let monitor_shutdown = shutdown_rx.clone();
    let monitor_handle = tokio::spawn(monitor.run(monitor_shutdown));

    let directory = Arc::new(ServerUserDirectory(users.clone()));
    let dispatcher = Dispatcher::new(store.clone(), directory, mailer.clone());
    let dispatcher_shutdown = shutdown_rx.clone();
    let dispatcher_handle = tokio::spawn(dispatcher.run(alert_rx, dispatcher_shutdown));

    let state = AppState { store, users, cache, mailer, config: &*CONFIG };
    let app = routes::build(state);

    let listener = tokio::net::TcpListener::bind(&CONFIG.api_bind)
        .await
        .with_context(|| format!("binding api listener on {}", CONFIG.api_bind))?;
    info!(addr = %CONFIG.api_bind, "serving api");

    let metrics_app = metrics::router();
    let metrics_listener = tokio::net::TcpListener::bind(&CONFIG.metrics_bind)
        .await
        .with_context(|| format!("binding metrics listener on {}", CONFIG.metrics_bind))?;
    info!(addr = %CONFIG.metrics_bind, "serving metrics");
    let metrics_handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(metrics_listener, metrics_app).await {
            tracing::error!(%err, "metrics listener stopped");
        }
    });

    let server_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        let _ = server_shutdown.send(true);
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.clone().changed().await;
        })
        .await
        .context("api server failed")?;

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(monitor_handle, dispatcher_handle, metrics_handle);

    Ok(())
}

mod metrics {
    use axum::routing::get;
    use axum::Router;
    use prometheus::{Encoder, TextEncoder};

    pub fn router() -> Router {
        Router::new().route("/health", get(health)).route("/metrics", get(scrape))
    }

    async fn health() -> &'static str {
        "ok"
    }

    async fn scrape() -> String {
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }
}
