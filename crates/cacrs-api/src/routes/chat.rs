use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use cacrs_core::Error;
use cacrs_core::chat::{ChatUpdate, Rejection, ReportOutcome, SendOutcome};
use cacrs_core::models::Message;

use super::rejected;
use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn messages(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Message>>> {
    if state.repo.get_case(&id).await?.is_none() {
        return Err(Error::NotFound(format!("case {id}")).into());
    }
    Ok(Json(state.repo.list_messages(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    text: String,
}

fn to_event(update: &ChatUpdate) -> Event {
    let event = Event::default().event(update.kind());
    match serde_json::to_string(update) {
        Ok(data) => event.data(data),
        Err(e) => {
            log::error!("Failed to encode chat update: {e}");
            event.data("{}")
        }
    }
}

/// Send a message and stream the chat updates as server-sent events.
///
/// Blank input and a case with a request in flight answer with a JSON
/// rejection instead of a stream. A send that loses the race for the case
/// after this check streams a single `rejected` event.
pub async fn send(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<SendRequest>,
) -> ApiResult<Response> {
    if body.text.trim().is_empty() {
        return Ok(rejected(Rejection::EmptyInput));
    }
    if state.chat.is_busy(&id) {
        return Ok(rejected(Rejection::Busy));
    }
    if state.repo.get_case(&id).await?.is_none() {
        return Err(Error::NotFound(format!("case {id}")).into());
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let chat = state.chat.clone();
    tokio::spawn(async move {
        match chat.send_message(&id, &body.text, Some(&tx)).await {
            Ok(SendOutcome::Rejected(reason)) => {
                log::debug!("Chat send on {id} rejected: {reason:?}");
            }
            Ok(SendOutcome::Completed(_) | SendOutcome::Degraded(_)) => {}
            Err(e) => log::error!("Chat send on {id} failed: {e}"),
        }
    });

    let stream = UnboundedReceiverStream::new(rx)
        .map(|update| Ok::<_, Infallible>(to_event(&update)));
    Ok(Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keep-alive"),
        )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct SelectionRequest {
    selected: bool,
}

pub async fn select(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path((id, message_id)): Path<(String, String)>,
    Json(body): Json<SelectionRequest>,
) -> ApiResult<Json<Message>> {
    let message = state
        .repo
        .set_message_selected(&id, &message_id, body.selected)
        .await?;
    Ok(Json(message))
}

#[derive(Serialize)]
pub struct ReportResponse {
    status: &'static str,
    report: Message,
    messages: Vec<Message>,
}

/// Condense the selected messages of a case into a report.
pub async fn report(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    match state.chat.generate_report_from_selection(&id).await? {
        ReportOutcome::Rejected(reason) => Ok(rejected(reason)),
        ReportOutcome::Generated { report, messages } => Ok(Json(ReportResponse {
            status: "generated",
            report,
            messages,
        })
        .into_response()),
    }
}
