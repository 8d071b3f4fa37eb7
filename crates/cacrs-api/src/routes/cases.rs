use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use cacrs_core::Error;
use cacrs_core::analysis::AnalysisOutcome;
use cacrs_core::models::{
    Case, CaseEvent, CaseEventKind, CaseFile, CaseStatus, NewCase, NewCaseFile,
};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list(State(state): State<AppState>, _user: CurrentUser) -> ApiResult<Json<Vec<Case>>> {
    Ok(Json(state.repo.list_cases().await?))
}

pub async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(body): Json<NewCase>,
) -> ApiResult<(StatusCode, Json<Case>)> {
    let case = state
        .repo
        .create_case(body.normalized()?, &current.user.email)
        .await?;
    log::info!("Case {} opened by {}", case.id, current.user.email);
    Ok((StatusCode::CREATED, Json(case)))
}

/// A case with its files and timeline.
#[derive(Serialize)]
pub struct CaseDetail {
    #[serde(flatten)]
    case: Case,
    files: Vec<CaseFile>,
    events: Vec<CaseEvent>,
}

pub async fn show(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<CaseDetail>> {
    let case = state
        .repo
        .get_case(&id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("case {id}")))?;
    let files = state.repo.list_files(&id).await?;
    let events = state.repo.list_events(&id).await?;
    Ok(Json(CaseDetail {
        case,
        files,
        events,
    }))
}

pub async fn delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.repo.delete_case(&id).await?;
    log::info!("Case {id} deleted by {}", current.user.email);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    status: CaseStatus,
}

pub async fn set_status(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<StatusRequest>,
) -> ApiResult<Json<Case>> {
    let case = state
        .repo
        .set_case_status(&id, body.status, &current.user.email)
        .await?;
    Ok(Json(case))
}

pub async fn files(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<CaseFile>>> {
    Ok(Json(state.repo.list_files(&id).await?))
}

pub async fn upload(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<NewCaseFile>,
) -> ApiResult<(StatusCode, Json<CaseFile>)> {
    if body.name.trim().is_empty() {
        return Err(Error::InvalidInput("file name is required".to_string()).into());
    }
    let file = state.repo.add_file(&id, body, &current.user.email).await?;
    Ok((StatusCode::CREATED, Json(file)))
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    file: CaseFile,
    /// False when the file already carried an analysis.
    analyzed: bool,
}

pub async fn analyze(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path((id, file_id)): Path<(String, String)>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let outcome = state.analyzer.analyze_file(&id, &file_id).await?;
    let analyzed = matches!(outcome, AnalysisOutcome::Analyzed(_));
    Ok(Json(AnalyzeResponse {
        file: outcome.file().clone(),
        analyzed,
    }))
}

pub async fn events(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<CaseEvent>>> {
    if state.repo.get_case(&id).await?.is_none() {
        return Err(Error::NotFound(format!("case {id}")).into());
    }
    Ok(Json(state.repo.list_events(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    text: String,
}

/// Post a free-text note on the case timeline.
pub async fn add_note(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<NoteRequest>,
) -> ApiResult<(StatusCode, Json<CaseEvent>)> {
    let text = body.text.trim();
    if text.is_empty() {
        return Err(Error::InvalidInput("note text is required".to_string()).into());
    }
    let kind = CaseEventKind::Message {
        author: current.user.email.clone(),
        text: text.to_string(),
    };
    let event = state
        .repo
        .record_event(&id, kind, &current.user.email)
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}
