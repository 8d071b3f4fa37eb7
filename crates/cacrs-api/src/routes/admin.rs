use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;

use cacrs_core::Error;
use cacrs_core::export;
use cacrs_core::models::{User, UserRole, UserStatus};
use cacrs_core::services::{ServiceConfig, ServicePatch, ServiceTestResult};

use super::{ExportQuery, attachment};
use crate::auth::AdminUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn users(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.repo.list_users().await?))
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    role: UserRole,
}

pub async fn set_role(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(body): Json<RoleRequest>,
) -> ApiResult<Json<User>> {
    let user = state.repo.set_user_role(&id, body.role).await?;
    log::info!("{} set role of {} to {}", admin.email, user.email, body.role.as_str());
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    status: UserStatus,
}

pub async fn set_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(body): Json<StatusRequest>,
) -> ApiResult<Json<User>> {
    let user = state.repo.set_user_status(&id, body.status).await?;
    log::info!(
        "{} set status of {} to {}",
        admin.email,
        user.email,
        body.status.as_str()
    );
    Ok(Json(user))
}

pub async fn services(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Json<Vec<ServiceConfig>> {
    Json(state.services.list().await)
}

pub async fn service(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ServiceConfig>> {
    let service = state
        .services
        .get(&id)
        .await
        .ok_or_else(|| Error::NotFound(format!("service {id}")))?;
    Ok(Json(service))
}

pub async fn update_service(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(patch): Json<ServicePatch>,
) -> ApiResult<Json<ServiceConfig>> {
    Ok(Json(state.services.update(&id, patch).await?))
}

pub async fn test_service(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Json<ServiceTestResult> {
    Json(state.services.test(&id).await)
}

pub async fn export_cases(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<ExportQuery>,
) -> ApiResult<Response> {
    let format = params.format()?;
    let cases = state.repo.list_cases().await?;
    let content = export::export_cases(&cases, format)?;
    Ok(attachment("cases", format, content))
}
