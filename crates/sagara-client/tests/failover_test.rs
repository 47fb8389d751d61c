// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Failover behavior against stub coordinators: retry on connection
//! errors and 5xx, attempt accounting, and the unavailable paths.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;

use sagara_client::config::ClientConfig;
use sagara_client::error::ClientError;
use sagara_client::ClusteredCoordinatorClient;

struct StubState {
    addr: SocketAddr,
    starts: AtomicU32,
    fail_with_500: bool,
}

async fn stub_start(State(state): State<Arc<StubState>>) -> (StatusCode, String) {
    state.starts.fetch_add(1, Ordering::SeqCst);
    if state.fail_with_500 {
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    (
        StatusCode::CREATED,
        format!(
            "http://{}/lra-coordinator/{}",
            state.addr,
            uuid::Uuid::new_v4()
        ),
    )
}

async fn stub_list() -> (StatusCode, String) {
    (StatusCode::OK, "[]".to_string())
}

/// Start a stub coordinator; returns its base URL and start-call counter.
async fn start_stub(fail_with_500: bool) -> (String, Arc<StubState>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(StubState {
        addr,
        starts: AtomicU32::new(0),
        fail_with_500,
    });
    let app = Router::new()
        .route("/lra-coordinator/start", post(stub_start))
        .route("/lra-coordinator", get(stub_list))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/lra-coordinator"), state)
}

/// A URL nothing listens on.
fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/lra-coordinator")
}

fn config(urls: Vec<String>) -> ClientConfig {
    ClientConfig::new()
        .with_urls(urls)
        .with_request_timeout(Duration::from_secs(2))
        .with_max_retries(3)
}

#[tokio::test]
async fn test_connection_error_fails_over_to_next_instance() {
    let (live, state) = start_stub(false).await;
    let client =
        ClusteredCoordinatorClient::new(config(vec![dead_url(), live])).unwrap();

    let lra = client.start_lra("failover", None, None).await.unwrap();
    assert!(lra.contains("/lra-coordinator/"));
    assert_eq!(state.starts.load(Ordering::SeqCst), 1);
    assert_eq!(client.request_count(), 2, "dead instance consumed one attempt");
}

#[tokio::test]
async fn test_server_errors_fail_over_too() {
    let (failing, failing_state) = start_stub(true).await;
    let (live, live_state) = start_stub(false).await;
    let client = ClusteredCoordinatorClient::new(config(vec![failing, live])).unwrap();

    client.start_lra("5xx-failover", None, None).await.unwrap();
    assert_eq!(failing_state.starts.load(Ordering::SeqCst), 1);
    assert_eq!(live_state.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_all_instances_down_reports_attempts() {
    let client = ClusteredCoordinatorClient::new(
        config(vec![dead_url(), dead_url()]).with_max_retries(2),
    )
    .unwrap();

    let err = client.start_lra("doomed", None, None).await.unwrap_err();
    match err {
        ClientError::AllAttemptsFailed { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("expected AllAttemptsFailed, got {other}"),
    }
}

#[tokio::test]
async fn test_list_is_load_balanced() {
    let (live, _) = start_stub(false).await;
    let client = ClusteredCoordinatorClient::new(config(vec![live])).unwrap();

    let lras = client.list_lras(None).await.unwrap();
    assert!(lras.is_empty());
    assert_eq!(client.request_count(), 1);
}

#[tokio::test]
async fn test_unknown_method_never_sends_a_request() {
    let (live, state) = start_stub(false).await;
    let client = ClusteredCoordinatorClient::new(
        config(vec![live]).with_lb_method("invalid-lb-algorithm"),
    )
    .unwrap();

    assert!(!client.is_load_balancing());
    let err = client.start_lra("rejected", None, None).await.unwrap_err();
    assert!(matches!(err, ClientError::Unavailable(_)));
    assert_eq!(state.starts.load(Ordering::SeqCst), 0);
    assert_eq!(client.request_count(), 0);
}
