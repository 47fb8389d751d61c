// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP handlers for the coordinator API.
//!
//! Thin adapters from the REST surface to [`CoordinatorService`]; every
//! error maps to its HTTP status through
//! [`CoordinatorError::status`](crate::error::CoordinatorError::status).
//! LRA ids arrive URL-encoded as a single path segment.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::instrument;

use crate::error::Result;
use crate::id::RECOVERY_HEADER;
use crate::lra::LraData;
use crate::service::CoordinatorService;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// The coordinator engine.
    pub service: Arc<CoordinatorService>,
}

/// Query parameters accepted by the list endpoint.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Optional status filter.
    #[serde(rename = "Status")]
    pub status: Option<String>,
}

/// Query parameters accepted by the start endpoint.
#[derive(Debug, Deserialize)]
pub struct StartQuery {
    /// Opaque caller identifier.
    #[serde(rename = "ClientID")]
    pub client_id: Option<String>,
    /// Deadline in milliseconds; any long is permitted.
    #[serde(rename = "TimeLimit")]
    pub time_limit: Option<i64>,
    /// Parent LRA id for a nested start.
    #[serde(rename = "ParentLRA")]
    pub parent_lra: Option<String>,
}

/// Query parameters accepted by the renew and join endpoints.
#[derive(Debug, Deserialize)]
pub struct TimeLimitQuery {
    /// Deadline in milliseconds.
    #[serde(rename = "TimeLimit")]
    pub time_limit: Option<i64>,
}

/// GET `/` — snapshot all LRAs, optionally filtered by `?Status=`.
#[instrument(skip_all)]
pub async fn list_lras(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<LraData>>> {
    let data = state.service.list_lras(query.status.as_deref()).await?;
    Ok(Json(data))
}

/// GET `/{lra_id}` — info for one LRA.
#[instrument(skip_all)]
pub async fn lra_info(
    State(state): State<AppState>,
    Path(lra_id): Path<String>,
) -> Result<Json<LraData>> {
    let data = state.service.get_info(&lra_id).await?;
    Ok(Json(data))
}

/// GET `/{lra_id}/status` — status only, as text.
#[instrument(skip_all)]
pub async fn lra_status(
    State(state): State<AppState>,
    Path(lra_id): Path<String>,
) -> Result<String> {
    let status = state.service.get_status(&lra_id).await?;
    Ok(status.as_str().to_string())
}

/// POST `/start?ClientID=&TimeLimit=&ParentLRA=` — begin an LRA.
///
/// Responds 201 with the new id as the body and in the `Location` header.
/// Nested ids are published as `<id>?ParentLRA=<parent>`.
#[instrument(skip_all)]
pub async fn start_lra(
    State(state): State<AppState>,
    Query(query): Query<StartQuery>,
) -> Result<Response> {
    let (id, parent) = state
        .service
        .start_lra(
            query.client_id.as_deref().unwrap_or_default(),
            query.time_limit.unwrap_or(0),
            query.parent_lra.as_deref(),
        )
        .await?;
    let published = match &parent {
        Some(parent) => id.with_parent(parent),
        None => id.to_string(),
    };
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, published.clone())],
        published,
    )
        .into_response())
}

/// PUT `/{lra_id}/renew?TimeLimit=` — change the deadline.
#[instrument(skip_all)]
pub async fn renew_lra(
    State(state): State<AppState>,
    Path(lra_id): Path<String>,
    Query(query): Query<TimeLimitQuery>,
) -> Result<String> {
    let id = state
        .service
        .renew(&lra_id, query.time_limit.unwrap_or(0))
        .await?;
    Ok(id.to_string())
}

/// PUT `/{lra_id}/close` — drive the complete phase.
#[instrument(skip_all)]
pub async fn close_lra(
    State(state): State<AppState>,
    Path(lra_id): Path<String>,
) -> Result<String> {
    let status = state.service.close(&lra_id).await?;
    Ok(status.as_str().to_string())
}

/// PUT `/{lra_id}/cancel` — drive the compensate phase.
#[instrument(skip_all)]
pub async fn cancel_lra(
    State(state): State<AppState>,
    Path(lra_id): Path<String>,
) -> Result<String> {
    let status = state.service.cancel(&lra_id).await?;
    Ok(status.as_str().to_string())
}

/// PUT `/{lra_id}` — enlist a participant.
///
/// The endpoints come from the `Link` header when present, in which case a
/// request body is opaque participant data passed back on callbacks.
/// Without a `Link` header the body is the participant base URI. Responds
/// with the recovery URI in the body, the `Location` header and the
/// recovery header.
#[instrument(skip_all)]
pub async fn join_lra(
    State(state): State<AppState>,
    Path(lra_id): Path<String>,
    Query(query): Query<TimeLimitQuery>,
    headers: HeaderMap,
    body: String,
) -> Result<Response> {
    let link = headers
        .get(header::LINK)
        .and_then(|value| value.to_str().ok());
    let (enlist_body, user_data) = match link {
        Some(_) => {
            let trimmed = body.trim();
            (None, (!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        None => (Some(body.as_str()), None),
    };
    let recovery = state
        .service
        .join(
            &lra_id,
            link,
            enlist_body,
            query.time_limit.unwrap_or(0),
            user_data,
        )
        .await?;
    let recovery = recovery.to_string();
    Ok((
        StatusCode::OK,
        [("location", recovery.clone()), (RECOVERY_HEADER, recovery.clone())],
        recovery,
    )
        .into_response())
}

/// PUT `/{lra_id}/remove` — leave; the body names the participant.
#[instrument(skip_all)]
pub async fn leave_lra(
    State(state): State<AppState>,
    Path(lra_id): Path<String>,
    body: String,
) -> Result<StatusCode> {
    state.service.leave(&lra_id, body.trim()).await?;
    Ok(StatusCode::OK)
}

/// GET `/recovery` — ids of LRAs with outstanding end-phase work.
#[instrument(skip_all)]
pub async fn recovery_ids(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.service.recovering_ids().await)
}
