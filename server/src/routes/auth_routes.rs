// server/src/routes/auth_routes.rs
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::issue_token;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: shared_models::User,
}

fn respond(state: &AppState, user: shared_models::User) -> ApiResult<Json<AuthResponse>> {
    let token = issue_token(user.id, &state.config.jwt_secret, state.config.jwt_ttl)?;
    Ok(Json(AuthResponse { token, user }))
}

pub async fn register(State(state): State<AppState>, Json(body): Json<RegisterRequest>) -> ApiResult<Json<AuthResponse>> {
    let user = state.users.register(&body.username, &body.email, &body.password)?;
    respond(&state, user)
}

pub async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> ApiResult<Json<AuthResponse>> {
    let user = state.users.authenticate(&body.username, &body.password)?;
    respond(&state, user)
}
