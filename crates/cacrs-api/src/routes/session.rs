use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use cacrs_core::models::User;
use cacrs_core::session::Session;

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Identity token issued by the identity provider.
    credential: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<Session>> {
    let session = state.sessions.login(&body.credential).await?;
    Ok(Json(session))
}

#[derive(Serialize)]
pub struct LogoutResponse {
    closed: bool,
}

pub async fn logout(State(state): State<AppState>, current: CurrentUser) -> Json<LogoutResponse> {
    let closed = state.sessions.logout(&current.token).await;
    Json(LogoutResponse { closed })
}

pub async fn me(current: CurrentUser) -> Json<User> {
    Json(current.user)
}
