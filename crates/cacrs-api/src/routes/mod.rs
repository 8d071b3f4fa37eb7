//! Route table.

mod admin;
mod cases;
mod chat;
mod research;
mod session;
mod tour;

use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use cacrs_core::chat::Rejection;
use cacrs_core::export::{ExportFormat, with_extension};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/auth/login", post(session::login))
        .route("/auth/logout", post(session::logout))
        .route("/auth/me", get(session::me))
        .route("/cases", get(cases::list).post(cases::create))
        .route("/cases/{id}", get(cases::show).delete(cases::delete))
        .route("/cases/{id}/status", put(cases::set_status))
        .route("/cases/{id}/files", get(cases::files).post(cases::upload))
        .route("/cases/{id}/files/{file_id}/analyze", post(cases::analyze))
        .route("/cases/{id}/events", get(cases::events).post(cases::add_note))
        .route("/cases/{id}/messages", get(chat::messages).post(chat::send))
        .route(
            "/cases/{id}/messages/{message_id}/selection",
            put(chat::select),
        )
        .route("/cases/{id}/report", post(chat::report))
        .route("/search", get(research::search))
        .route(
            "/findings",
            get(research::findings)
                .post(research::save_finding)
                .delete(research::delete_findings),
        )
        .route("/findings/export", get(research::export_findings))
        .route("/findings/{id}", axum::routing::delete(research::delete_finding))
        .route(
            "/watchlists",
            get(research::watchlists).post(research::create_watchlist),
        )
        .route("/alerts", get(research::alerts))
        .route("/dashboard", get(research::dashboard))
        .route("/tour", get(tour::show))
        .route("/tour/start", post(tour::start))
        .route("/tour/next", post(tour::next))
        .route("/tour/previous", post(tour::previous))
        .route("/tour/skip", post(tour::skip))
        .route("/tour/layout", post(tour::layout))
        .route("/admin/users", get(admin::users))
        .route("/admin/users/{id}/role", put(admin::set_role))
        .route("/admin/users/{id}/status", put(admin::set_status))
        .route("/admin/services", get(admin::services))
        .route(
            "/admin/services/{id}",
            get(admin::service).patch(admin::update_service),
        )
        .route("/admin/services/{id}/test", post(admin::test_service))
        .route("/admin/cases/export", get(admin::export_cases))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct RootResponse {
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Body returned when a request was ignored.
#[derive(Serialize)]
struct Rejected {
    status: &'static str,
    reason: Rejection,
}

fn rejected(reason: Rejection) -> Response {
    Json(Rejected {
        status: "rejected",
        reason,
    })
    .into_response()
}

#[derive(Debug, serde::Deserialize)]
pub struct ExportQuery {
    format: Option<String>,
}

impl ExportQuery {
    fn format(&self) -> cacrs_core::Result<ExportFormat> {
        self.format
            .as_deref()
            .map_or(Ok(ExportFormat::Csv), |format| format.parse())
    }
}

/// Attachment response for an export.
fn attachment(file_stem: &str, format: ExportFormat, content: String) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}\"",
        with_extension(file_stem, format)
    );
    let mut response = content.into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(format.content_type()));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    response
}
