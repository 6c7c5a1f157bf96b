//! BOQ estimation routes
//!
//! Bill of quantities CRUD plus the cost summary.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, NoContent};
use crate::app::AppState;
use crate::domain::{BoqFilter, CreateBoqRequest, SummaryParams, UpdateBoqRequest};
use crate::error::ApiError;

/// POST /estimation/boq
///
/// Create a BOQ with its line items.
pub async fn create_boq(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBoqRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(
        project_name = %req.project_name,
        client_name = %req.client_name,
        item_count = req.items.len(),
        "Creating BOQ"
    );

    let boq = state.estimation.create(req).await?;
    Ok(Created(boq))
}

/// GET /estimation/boq
///
/// List BOQs, newest first. Optional `status` and `search` filters.
pub async fn list_boqs(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<BoqFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let boqs = state.estimation.find_all(&filter).await?;
    Ok(Json(boqs))
}

/// GET /estimation/boq/:boq_id
pub async fn get_boq(
    State(state): State<Arc<AppState>>,
    Path(boq_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let boq = state.estimation.find_one(boq_id).await?;
    Ok(Json(boq))
}

/// GET /estimation/boq/:boq_id/items
///
/// Line items ordered by item number.
pub async fn list_boq_items(
    State(state): State<Arc<AppState>>,
    Path(boq_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state.estimation.find_items_by_boq_id(boq_id).await?;
    Ok(Json(items))
}

/// PATCH /estimation/boq/:boq_id
///
/// Partial update. An `items` array replaces every existing line item.
pub async fn update_boq(
    State(state): State<Arc<AppState>>,
    Path(boq_id): Path<Uuid>,
    Json(req): Json<UpdateBoqRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(
        boq_id = %boq_id,
        replaces_items = req.items.is_some(),
        status = ?req.status,
        "Updating BOQ"
    );

    let boq = state.estimation.update(boq_id, req).await?;
    Ok(Json(boq))
}

/// DELETE /estimation/boq/:boq_id
pub async fn delete_boq(
    State(state): State<Arc<AppState>>,
    Path(boq_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.estimation.remove(boq_id).await?;
    Ok(NoContent)
}

/// GET /estimation/boq/:boq_id/summary
///
/// Category totals with optional overhead and margin percentages.
pub async fn get_boq_summary(
    State(state): State<Arc<AppState>>,
    Path(boq_id): Path<Uuid>,
    Query(params): Query<SummaryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.estimation.summarize(boq_id, &params).await?;
    Ok(Json(summary))
}
