// server/src/routes/mod.rs
//! Assembles the axum router for spec.md §6's full endpoint table.
//! Authenticated routes run behind [`crate::auth::require_auth`]; the two
//! auth routes (`register`, `login`) are the only ones that don't.

mod auth_routes;
mod capital;
mod forex;
mod positions;
mod prices;
mod strategies;
mod trades;
mod user;

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::auth::require_auth;
use crate::state::AppState;

pub fn build(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/auth/register", post(auth_routes::register))
        .route("/api/auth/login", post(auth_routes::login));

    let protected = Router::new()
        .route("/api/user/profile", get(user::profile))
        .route("/api/user/email-alerts", post(user::set_email_alerts))
        .route("/api/user/test-email", post(user::test_email))
        .route("/api/user/billing-status", get(user::billing_status))
        .route("/api/user/strategies", get(strategies::list).post(strategies::create).delete(strategies::delete_all))
        .route("/api/user/strategies/:id", delete(strategies::delete_one))
        .route("/api/user/capital", get(capital::today).post(capital::set_anchor))
        .route("/api/user/capital-history", get(capital::history))
        .route("/api/user/strategies/capital-histories", get(capital::histories_by_strategy))
        .route("/api/trades", get(trades::list).post(trades::create))
        .route("/api/trades/date/:date", get(trades::on_date))
        .route("/api/trades/dates", get(trades::dates))
        .route("/api/trades/stock-codes", get(trades::stock_codes))
        .route("/api/trades/stock/:code", get(trades::for_code))
        .route("/api/trades/:id", put(trades::update).delete(trades::delete))
        .route("/api/trades/clear-all", delete(trades::clear_all))
        .route("/api/positions", get(positions::list))
        .route("/api/positions/:id", put(positions::update))
        .route("/api/positions/:id/take-profit", post(positions::take_profit))
        .route("/api/positions/:id/stop-loss", post(positions::stop_loss))
        .route("/api/price/:code", get(prices::single))
        .route("/api/price/batch", post(prices::batch))
        .route("/api/forex/account", get(forex::account))
        .route("/api/forex/account/initial", post(forex::set_initial))
        .route("/api/forex/account/reset", post(forex::reset))
        .route("/api/forex/trades", get(forex::list_trades).post(forex::create_trade).delete(forex::clear_all))
        .route("/api/forex/trades/:id", put(forex::update_trade).delete(forex::delete_trade))
        .route("/api/forex/trades/:id/close", post(forex::close_trade))
        .route("/api/forex/positions", get(forex::positions))
        .route("/api/forex/capital-history", get(forex::capital_history))
        .route("/api/forex/quotes", post(forex::quotes))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public.merge(protected).with_state(state)
}
