// server/src/auth.rs
//! JWT issuance/verification (SPEC_FULL.md §4.6). Claims carry `sub` (user
//! id) and `exp`; tokens are signed `HS256` with the configured secret.
//! [`require_auth`] is the `axum::middleware::from_fn_with_state` guard
//! that every authenticated route runs behind — missing or invalid tokens
//! short-circuit with `401`, matching spec.md §6's status conventions.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub exp: i64,
}

pub fn issue_token(user_id: i64, secret: &str, ttl: std::time::Duration) -> Result<String, ApiError> {
    let exp = (Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(24))).timestamp();
    let claims = Claims { sub: user_id, exp };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| ApiError::Internal(format!("failed to sign token: {e}")))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| ApiError::Unauthorized)
}

/// The authenticated caller's id, injected as a request extension by
/// [`require_auth`]. Handlers pull it out with
/// `axum::extract::Extension<AuthUser>`.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub i64);

pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = verify_token(token, &state.config.jwt_secret)?;
    request.extensions_mut().insert(AuthUser(claims.sub));
    Ok(next.run(request).await)
}
