// server/src/routes/user.rs
use axum::extract::{Extension, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn profile(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<shared_models::User>> {
    let user = state.users.find_by_id(user_id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct EmailAlertsQuery {
    pub enabled: bool,
}

pub async fn set_email_alerts(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<EmailAlertsQuery>,
) -> ApiResult<()> {
    state.users.set_email_alerts_enabled(user_id, query.enabled)
}

pub async fn test_email(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<()> {
    let user = state.users.find_by_id(user_id)?.ok_or(ApiError::NotFound)?;
    if user.email.trim().is_empty() {
        return Err(ApiError::Validation("no email on file".into()));
    }
    state
        .mailer
        .send(
            &user.email,
            "Trade Journal test email",
            "<p>This is a test email from your trade journal's alert dispatcher.</p>",
        )
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

#[derive(Serialize)]
pub struct BillingStatusResponse {
    pub billing_enabled: bool,
    pub is_paid: bool,
    pub paid_until: Option<chrono::NaiveDate>,
    pub plan: Option<String>,
}

pub async fn billing_status(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<BillingStatusResponse>> {
    let user = state.users.find_by_id(user_id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(BillingStatusResponse {
        billing_enabled: state.config.billing_enabled,
        is_paid: user.billing.is_paid,
        paid_until: user.billing.paid_until,
        plan: user.billing.plan,
    }))
}
