use std::collections::HashMap;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use cacrs_core::tour::{
    MeasuredAnchors, Rect, Size, StepLayout, TourController, TourState, TourStep,
};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Serialize)]
pub struct TourView {
    state: TourState,
    step: Option<TourStep>,
    total: usize,
}

impl TourView {
    fn of(controller: &TourController) -> Self {
        Self {
            state: controller.state(),
            step: controller.current_step().cloned(),
            total: controller.steps().len(),
        }
    }
}

pub async fn show(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<TourView>> {
    let view = state
        .tours
        .with(&current.user.id, |tour| Ok(TourView::of(tour)))
        .await?;
    Ok(Json(view))
}

pub async fn start(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<TourView>> {
    let view = state
        .tours
        .with(&current.user.id, |tour| {
            tour.start();
            Ok(TourView::of(tour))
        })
        .await?;
    Ok(Json(view))
}

pub async fn next(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<TourView>> {
    let view = state
        .tours
        .with(&current.user.id, |tour| {
            tour.next()?;
            Ok(TourView::of(tour))
        })
        .await?;
    Ok(Json(view))
}

pub async fn previous(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<TourView>> {
    let view = state
        .tours
        .with(&current.user.id, |tour| {
            tour.previous();
            Ok(TourView::of(tour))
        })
        .await?;
    Ok(Json(view))
}

pub async fn skip(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<TourView>> {
    let view = state
        .tours
        .with(&current.user.id, |tour| {
            tour.skip();
            Ok(TourView::of(tour))
        })
        .await?;
    Ok(Json(view))
}

/// Anchor rectangles measured by the client, keyed by anchor id.
#[derive(Debug, Deserialize)]
pub struct LayoutRequest {
    #[serde(default)]
    anchors: HashMap<String, Rect>,
    tooltip: Size,
    viewport: Size,
}

pub async fn layout(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(body): Json<LayoutRequest>,
) -> ApiResult<Json<Option<StepLayout>>> {
    let anchors = MeasuredAnchors(body.anchors);
    let layout = state
        .tours
        .with(&current.user.id, |tour| {
            Ok(tour.layout(&anchors, body.tooltip, body.viewport))
        })
        .await?;
    Ok(Json(layout))
}
