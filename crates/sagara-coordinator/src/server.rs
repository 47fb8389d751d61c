// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Router assembly and the HTTP server loop.
//!
//! Every response carries the API version header, echoing the version the
//! client requested or the current version when none was sent. Unsupported
//! versions are rejected before routing.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::error::CoordinatorError;
use crate::handlers::{self, AppState};
use crate::id::{API_VERSION_HEADER, CURRENT_API_VERSION, SUPPORTED_API_VERSIONS};

/// Echo the requested API version on every response; reject versions this
/// coordinator does not speak.
async fn api_version(request: Request, next: Next) -> Response {
    let requested = request
        .headers()
        .get(API_VERSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    if let Some(version) = &requested {
        if !SUPPORTED_API_VERSIONS.contains(&version.as_str()) {
            let mut response = CoordinatorError::UnsupportedApiVersion {
                version: version.clone(),
            }
            .into_response();
            if let Ok(value) = HeaderValue::from_str(CURRENT_API_VERSION) {
                response.headers_mut().insert(API_VERSION_HEADER, value);
            }
            return response;
        }
    }

    let mut response = next.run(request).await;
    let echo = requested.as_deref().unwrap_or(CURRENT_API_VERSION);
    if let Ok(value) = HeaderValue::from_str(echo) {
        response.headers_mut().insert(API_VERSION_HEADER, value);
    }
    response
}

/// Build the coordinator router under `path_prefix`.
pub fn router(state: AppState, path_prefix: &str) -> Router {
    let prefix = path_prefix.trim_end_matches('/').to_string();
    let list_path = if prefix.is_empty() {
        "/".to_string()
    } else {
        prefix.clone()
    };
    let path = |suffix: &str| format!("{prefix}{suffix}");

    Router::new()
        .route(&list_path, get(handlers::list_lras))
        .route(&path("/start"), post(handlers::start_lra))
        .route(&path("/recovery"), get(handlers::recovery_ids))
        .route(
            &path("/{lra_id}"),
            get(handlers::lra_info).put(handlers::join_lra),
        )
        .route(&path("/{lra_id}/status"), get(handlers::lra_status))
        .route(&path("/{lra_id}/close"), put(handlers::close_lra))
        .route(&path("/{lra_id}/cancel"), put(handlers::cancel_lra))
        .route(&path("/{lra_id}/renew"), put(handlers::renew_lra))
        .route(&path("/{lra_id}/remove"), put(handlers::leave_lra))
        .layer(middleware::from_fn(api_version))
        .with_state(state)
}

/// Serve the coordinator API until the shutdown signal fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    path_prefix: String,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let app = router(state, &path_prefix);
    let addr = listener.local_addr()?;
    info!(%addr, prefix = %path_prefix, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}
