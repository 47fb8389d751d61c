// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for coordinator integration tests.
//!
//! Provides a TestContext that runs the coordinator runtime in-process on
//! an ephemeral port, plus scripted test participants with invocation
//! counters.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, put};
use axum::Router;

use sagara_coordinator::config::Config;
use sagara_coordinator::runtime::CoordinatorRuntime;
use sagara_coordinator::store::ObjectStore;

/// Coordinator API version header.
pub const API_VERSION_HEADER: &str = "Narayana-LRA-API-version";

/// Recovery URI response header on join.
pub const RECOVERY_HEADER: &str = "Long-Running-Action-Recovery";

/// Helper macro to skip tests if TEST_DATABASE_URL is not set.
#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}

/// Test context owning an in-process coordinator runtime.
pub struct TestContext {
    pub runtime: CoordinatorRuntime,
    pub base: String,
    pub http: reqwest::Client,
}

impl TestContext {
    /// Start a coordinator on an ephemeral port with the volatile store
    /// and a fast recovery tick.
    pub async fn start() -> Self {
        Self::with_store(None).await
    }

    /// Start a coordinator over a pre-built store (e.g. a file store whose
    /// directory outlives the runtime, for crash-recovery tests).
    pub async fn with_store(store: Option<Arc<dyn ObjectStore>>) -> Self {
        let config = Config {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            recovery_interval: Duration::from_millis(100),
            participant_timeout: Duration::from_millis(2000),
            ..Config::default()
        };
        let mut builder = CoordinatorRuntime::builder().config(config);
        if let Some(store) = store {
            builder = builder.store(store);
        }
        let runtime = builder.build().unwrap().start().await.unwrap();
        let base = runtime.base_url().to_string();
        Self {
            runtime,
            base,
            http: reqwest::Client::new(),
        }
    }

    /// Percent-encode an LRA id for use as one path segment.
    pub fn encode(id: &str) -> String {
        let mut out = String::new();
        for byte in id.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    out.push(byte as char)
                }
                _ => out.push_str(&format!("%{byte:02X}")),
            }
        }
        out
    }

    /// URL of a per-LRA endpoint.
    pub fn lra_url(&self, id: &str, suffix: Option<&str>) -> String {
        match suffix {
            Some(suffix) => format!("{}/{}/{}", self.base, Self::encode(id), suffix),
            None => format!("{}/{}", self.base, Self::encode(id)),
        }
    }

    /// Start an LRA and return its id.
    pub async fn start_lra(&self, client_id: &str) -> String {
        let response = self
            .http
            .post(format!("{}/start", self.base))
            .query(&[("ClientID", client_id)])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        response.text().await.unwrap()
    }

    /// Start a nested LRA under `parent` and return its published id.
    pub async fn start_nested(&self, client_id: &str, parent: &str) -> String {
        let response = self
            .http
            .post(format!("{}/start", self.base))
            .query(&[("ClientID", client_id), ("ParentLRA", parent)])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        response.text().await.unwrap()
    }

    /// Join by participant base URI in the request body; returns the
    /// recovery URI.
    pub async fn join(&self, id: &str, participant_base: &str) -> String {
        let response = self
            .http
            .put(self.lra_url(id, None))
            .body(participant_base.to_string())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.text().await.unwrap()
    }

    /// PUT close; returns the response.
    pub async fn close(&self, id: &str) -> reqwest::Response {
        self.http
            .put(self.lra_url(id, Some("close")))
            .send()
            .await
            .unwrap()
    }

    /// PUT cancel; returns the response.
    pub async fn cancel(&self, id: &str) -> reqwest::Response {
        self.http
            .put(self.lra_url(id, Some("cancel")))
            .send()
            .await
            .unwrap()
    }

    /// GET the status endpoint.
    pub async fn status(&self, id: &str) -> (StatusCode, String) {
        let response = self
            .http
            .get(self.lra_url(id, Some("status")))
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.text().await.unwrap())
    }

    /// GET the list endpoint, optionally with a status filter.
    pub async fn list(&self, filter: Option<&str>) -> reqwest::Response {
        let mut request = self.http.get(&self.base);
        if let Some(filter) = filter {
            request = request.query(&[("Status", filter)]);
        }
        request.send().await.unwrap()
    }

    /// Ids currently known to the list endpoint.
    pub async fn listed_ids(&self, filter: Option<&str>) -> Vec<String> {
        let response = self.list(filter).await;
        assert_eq!(response.status(), StatusCode::OK);
        let data: Vec<serde_json::Value> = response.json().await.unwrap();
        data.iter()
            .filter_map(|v| v.get("lraId").and_then(|id| id.as_str()))
            .map(str::to_string)
            .collect()
    }

    /// Poll the status endpoint until it reports `expected` or the
    /// deadline passes.
    pub async fn wait_for_status(&self, id: &str, expected: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let (_, body) = self.status(id).await;
            if body == expected {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Poll the list endpoint until `id` disappears or the deadline passes.
    pub async fn wait_until_unlisted(&self, id: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.listed_ids(None).await.iter().any(|l| l == id) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

// ============================================================================
// Scripted test participants
// ============================================================================

/// How a participant endpoint answers across successive calls.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// 200 with a terminal state body on every call.
    Ok,
    /// 202 for the first N calls, then 200 with a terminal state body.
    AcceptedThenOk(u32),
    /// 500 for the first N calls, then 200 with a terminal state body.
    FailThenOk(u32),
    /// Always 500.
    AlwaysFail,
    /// 200 with the matching `FailedTo*` body: a permanent failure.
    ReportFailed,
}

/// Per-participant behavior script.
#[derive(Debug, Clone, Copy)]
pub struct Script {
    pub complete: Behavior,
    pub compensate: Behavior,
    /// 202s served by the status endpoint before it reports terminal.
    pub status_accepted: u32,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            complete: Behavior::Ok,
            compensate: Behavior::Ok,
            status_accepted: 0,
        }
    }
}

/// Shared, ordered record of callback invocations across participants.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct ParticipantEndpoint {
    name: String,
    script: Mutex<Script>,
    log: CallLog,
    complete_calls: AtomicU32,
    compensate_calls: AtomicU32,
    status_calls: AtomicU32,
    after_calls: AtomicU32,
    forget_calls: AtomicU32,
    cancelled: AtomicBool,
}

impl ParticipantEndpoint {
    fn respond(behavior: Behavior, call: u32, terminal: &str) -> (StatusCode, String) {
        match behavior {
            Behavior::Ok => (StatusCode::OK, terminal.to_string()),
            Behavior::AcceptedThenOk(n) if call < n => (StatusCode::ACCEPTED, String::new()),
            Behavior::AcceptedThenOk(_) => (StatusCode::OK, terminal.to_string()),
            Behavior::FailThenOk(n) if call < n => {
                (StatusCode::INTERNAL_SERVER_ERROR, String::new())
            }
            Behavior::FailThenOk(_) => (StatusCode::OK, terminal.to_string()),
            Behavior::AlwaysFail => (StatusCode::INTERNAL_SERVER_ERROR, String::new()),
            Behavior::ReportFailed => {
                let failed = if terminal == "Compensated" {
                    "FailedToCompensate"
                } else {
                    "FailedToComplete"
                };
                (StatusCode::OK, failed.to_string())
            }
        }
    }
}

/// One scripted participant service on an ephemeral port.
pub struct TestParticipant {
    pub addr: SocketAddr,
    pub base: String,
    state: Arc<ParticipantEndpoint>,
}

impl TestParticipant {
    /// Start a participant named `name` with the default script.
    pub async fn start(name: &str, log: CallLog) -> Self {
        Self::start_scripted(name, log, Script::default()).await
    }

    /// Start a participant with an explicit behavior script.
    pub async fn start_scripted(name: &str, log: CallLog, script: Script) -> Self {
        let state = Arc::new(ParticipantEndpoint {
            name: name.to_string(),
            script: Mutex::new(script),
            log,
            complete_calls: AtomicU32::new(0),
            compensate_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            after_calls: AtomicU32::new(0),
            forget_calls: AtomicU32::new(0),
            cancelled: AtomicBool::new(false),
        });

        let app = Router::new()
            .route("/participant/complete", put(complete))
            .route("/participant/compensate", put(compensate))
            .route("/participant/status", get(status))
            .route("/participant/forget", delete(forget))
            .route("/participant/after", put(after))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            base: format!("http://{addr}/participant"),
            state,
        }
    }

    /// Swap the complete behavior mid-test (crash-recovery scenarios).
    pub fn set_complete(&self, behavior: Behavior) {
        self.state.script.lock().unwrap().complete = behavior;
    }

    /// Swap the compensate behavior mid-test.
    pub fn set_compensate(&self, behavior: Behavior) {
        self.state.script.lock().unwrap().compensate = behavior;
    }

    pub fn complete_calls(&self) -> u32 {
        self.state.complete_calls.load(Ordering::SeqCst)
    }

    pub fn compensate_calls(&self) -> u32 {
        self.state.compensate_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> u32 {
        self.state.status_calls.load(Ordering::SeqCst)
    }

    pub fn after_calls(&self) -> u32 {
        self.state.after_calls.load(Ordering::SeqCst)
    }

    pub fn forget_calls(&self) -> u32 {
        self.state.forget_calls.load(Ordering::SeqCst)
    }
}

async fn complete(State(state): State<Arc<ParticipantEndpoint>>) -> (StatusCode, String) {
    let call = state.complete_calls.fetch_add(1, Ordering::SeqCst);
    state.cancelled.store(false, Ordering::SeqCst);
    state.log.record(format!("{}:complete", state.name));
    let behavior = state.script.lock().unwrap().complete;
    ParticipantEndpoint::respond(behavior, call, "Completed")
}

async fn compensate(State(state): State<Arc<ParticipantEndpoint>>) -> (StatusCode, String) {
    let call = state.compensate_calls.fetch_add(1, Ordering::SeqCst);
    state.cancelled.store(true, Ordering::SeqCst);
    state.log.record(format!("{}:compensate", state.name));
    let behavior = state.script.lock().unwrap().compensate;
    ParticipantEndpoint::respond(behavior, call, "Compensated")
}

async fn status(State(state): State<Arc<ParticipantEndpoint>>) -> (StatusCode, String) {
    let call = state.status_calls.fetch_add(1, Ordering::SeqCst);
    state.log.record(format!("{}:status", state.name));
    let accepted = state.script.lock().unwrap().status_accepted;
    if call < accepted {
        (StatusCode::ACCEPTED, String::new())
    } else if state.cancelled.load(Ordering::SeqCst) {
        (StatusCode::OK, "Compensated".to_string())
    } else {
        (StatusCode::OK, "Completed".to_string())
    }
}

async fn forget(State(state): State<Arc<ParticipantEndpoint>>) -> StatusCode {
    state.forget_calls.fetch_add(1, Ordering::SeqCst);
    state.log.record(format!("{}:forget", state.name));
    StatusCode::OK
}

async fn after(State(state): State<Arc<ParticipantEndpoint>>) -> StatusCode {
    state.after_calls.fetch_add(1, Ordering::SeqCst);
    state.log.record(format!("{}:after", state.name));
    StatusCode::OK
}
