use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde::{Deserialize, Serialize};

use cacrs_core::ai::WebSearchResult;
use cacrs_core::dashboard::{self, DashboardSummary};
use cacrs_core::export;
use cacrs_core::models::{Alert, Finding, GroundingSource, Watchlist};

use super::{ExportQuery, attachment};
use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    query: String,
}

pub async fn search(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Json<WebSearchResult>> {
    Ok(Json(state.research.web_search(&params.query).await?))
}

pub async fn findings(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<Json<Vec<Finding>>> {
    Ok(Json(state.research.findings().await?))
}

#[derive(Debug, Deserialize)]
pub struct SaveFindingRequest {
    query: String,
    text: String,
    #[serde(default)]
    sources: Vec<GroundingSource>,
}

pub async fn save_finding(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(body): Json<SaveFindingRequest>,
) -> ApiResult<(StatusCode, Json<Finding>)> {
    let result = WebSearchResult {
        text: body.text,
        sources: body.sources,
    };
    let finding = state.research.save_finding(&body.query, result).await?;
    Ok((StatusCode::CREATED, Json(finding)))
}

#[derive(Debug, Deserialize)]
pub struct DeleteFindingsRequest {
    ids: Vec<String>,
}

#[derive(Serialize)]
pub struct DeleteFindingsResponse {
    removed: usize,
}

pub async fn delete_findings(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(body): Json<DeleteFindingsRequest>,
) -> ApiResult<Json<DeleteFindingsResponse>> {
    let removed = state.research.delete_findings(&body.ids).await?;
    Ok(Json(DeleteFindingsResponse { removed }))
}

pub async fn delete_finding(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteFindingsResponse>> {
    let removed = state.research.delete_findings(&[id]).await?;
    Ok(Json(DeleteFindingsResponse { removed }))
}

pub async fn export_findings(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(params): Query<ExportQuery>,
) -> ApiResult<Response> {
    let format = params.format()?;
    let findings = state.research.findings().await?;
    let content = export::export_findings(&findings, format)?;
    Ok(attachment("findings", format, content))
}

pub async fn watchlists(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<Json<Vec<Watchlist>>> {
    Ok(Json(state.research.watchlists().await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistRequest {
    name: String,
    query: String,
    refresh_interval_minutes: u32,
}

pub async fn create_watchlist(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(body): Json<WatchlistRequest>,
) -> ApiResult<(StatusCode, Json<Watchlist>)> {
    let watchlist = state
        .research
        .create_watchlist(&body.name, &body.query, body.refresh_interval_minutes)
        .await?;
    Ok((StatusCode::CREATED, Json(watchlist)))
}

pub async fn alerts(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<Json<Vec<Alert>>> {
    Ok(Json(state.repo.list_alerts().await?))
}

pub async fn dashboard(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<Json<DashboardSummary>> {
    let cases = state.repo.list_cases().await?;
    let findings = state.repo.list_findings().await?;
    let alerts = state.repo.list_alerts().await?;
    Ok(Json(dashboard::summarize(&cases, &findings, &alerts)))
}
