// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Clustered coordinator client.
//!
//! Wraps N coordinator base URLs behind one API. `start_lra` and
//! `list_lras` are load-balanced through the configured
//! [`Selector`](crate::selector::Selector) with failover to the next
//! instance on connection errors and 5xx responses. Every operation on a
//! known LRA id bypasses the balancer and targets the coordinator base
//! embedded in the id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::selector::{selector_for, Selector};
use crate::types::{LraData, LraStatus};

/// Request/response header carrying the dotted API version string.
pub const API_VERSION_HEADER: &str = "Narayana-LRA-API-version";

/// API version this client speaks.
pub const CURRENT_API_VERSION: &str = "1.2";

/// Path segment a coordinator serves its API under.
const COORDINATOR_PATH: &str = "lra-coordinator";

/// Retry backoff: doubles per attempt, capped at five seconds.
fn backoff_delay(attempt: u32) -> Duration {
    let doublings = attempt.saturating_sub(1).min(16);
    let millis = 1000u64.saturating_mul(1u64 << doublings);
    Duration::from_millis(millis.min(5000))
}

/// Client for a cluster of LRA coordinators.
pub struct ClusteredCoordinatorClient {
    config: ClientConfig,
    http: reqwest::Client,
    selector: Box<dyn Selector>,
    request_counter: AtomicU64,
}

impl std::fmt::Debug for ClusteredCoordinatorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusteredCoordinatorClient")
            .field("config", &self.config)
            .field("request_counter", &self.request_counter)
            .finish_non_exhaustive()
    }
}

impl ClusteredCoordinatorClient {
    /// Create a client from the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.urls.is_empty() {
            return Err(ClientError::Config(
                "no coordinator URLs configured".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let selector = selector_for(&config.lb_method, config.urls.len());
        Ok(Self {
            config,
            http,
            selector,
            request_counter: AtomicU64::new(0),
        })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether requests are actually load balanced. `false` means the
    /// configured method was not recognized and every balanced request
    /// will fail unavailable.
    pub fn is_load_balancing(&self) -> bool {
        self.selector.is_load_balancing()
    }

    /// Number of balanced request attempts made so far.
    pub fn request_count(&self) -> u64 {
        self.request_counter.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Load-balanced operations
    // ========================================================================

    /// Begin a new LRA on any available coordinator.
    ///
    /// A nested start (with `parent`) has affinity for the parent's
    /// coordinator and bypasses the balancer. Returns the new LRA id.
    #[instrument(skip(self))]
    pub async fn start_lra(
        &self,
        client_id: &str,
        time_limit: Option<i64>,
        parent: Option<&str>,
    ) -> Result<String> {
        let mut query: Vec<(&str, String)> = vec![("ClientID", client_id.to_string())];
        if let Some(limit) = time_limit {
            query.push(("TimeLimit", limit.to_string()));
        }
        if let Some(parent) = parent {
            query.push(("ParentLRA", parent.to_string()));
        }

        let response = match parent {
            Some(parent_id) => {
                // nested LRAs are owned by the parent's coordinator
                let base = Self::coordinator_base(parent_id)?;
                let url = join_path(&base, &["start"])?;
                self.send_direct(self.http.post(url).query(&query)).await?
            }
            None => {
                self.send_balanced(|base| {
                    let url = format!("{}/start", base.trim_end_matches('/'));
                    self.http.post(url).query(&query)
                })
                .await?
            }
        };

        let response = Self::expect_success(response).await?;
        let id = response.text().await?;
        if id.is_empty() {
            return Err(ClientError::UnexpectedResponse(
                "empty body from start".to_string(),
            ));
        }
        debug!(lra_id = %id, "LRA started");
        Ok(id)
    }

    /// Snapshot LRAs from any available coordinator, optionally filtered
    /// by status.
    #[instrument(skip(self))]
    pub async fn list_lras(&self, status: Option<LraStatus>) -> Result<Vec<LraData>> {
        let response = self
            .send_balanced(|base| {
                let mut request = self.http.get(base.to_string());
                if let Some(status) = status {
                    request = request.query(&[("Status", status.as_str())]);
                }
                request
            })
            .await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    // ========================================================================
    // Per-LRA operations (coordinator affinity)
    // ========================================================================

    /// Current status of an LRA, from the coordinator that owns it.
    #[instrument(skip(self))]
    pub async fn get_status(&self, lra_id: &str) -> Result<LraStatus> {
        let url = self.lra_url(lra_id, Some("status"))?;
        let response = self.send_direct(self.http.get(url)).await?;
        let response = Self::expect_success(response).await?;
        let body = response.text().await?;
        LraStatus::parse(body.trim())
            .ok_or_else(|| ClientError::UnexpectedResponse(format!("unknown status '{body}'")))
    }

    /// Info snapshot of an LRA, from the coordinator that owns it.
    #[instrument(skip(self))]
    pub async fn get_info(&self, lra_id: &str) -> Result<LraData> {
        let url = self.lra_url(lra_id, None)?;
        let response = self.send_direct(self.http.get(url)).await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    /// Close an LRA; returns the status after the first drive pass.
    #[instrument(skip(self))]
    pub async fn close_lra(&self, lra_id: &str) -> Result<LraStatus> {
        self.finish(lra_id, "close").await
    }

    /// Cancel an LRA; returns the status after the first drive pass.
    #[instrument(skip(self))]
    pub async fn cancel_lra(&self, lra_id: &str) -> Result<LraStatus> {
        self.finish(lra_id, "cancel").await
    }

    async fn finish(&self, lra_id: &str, verb: &str) -> Result<LraStatus> {
        let url = self.lra_url(lra_id, Some(verb))?;
        let response = self.send_direct(self.http.put(url)).await?;
        let response = Self::expect_success(response).await?;
        let body = response.text().await?;
        LraStatus::parse(body.trim())
            .ok_or_else(|| ClientError::UnexpectedResponse(format!("unknown status '{body}'")))
    }

    /// Update the deadline of an LRA.
    #[instrument(skip(self))]
    pub async fn renew_time_limit(&self, lra_id: &str, time_limit: i64) -> Result<()> {
        let url = self.lra_url(lra_id, Some("renew"))?;
        let response = self
            .send_direct(
                self.http
                    .put(url)
                    .query(&[("TimeLimit", time_limit.to_string())]),
            )
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    /// Enlist a participant by base URL; returns the recovery URI.
    #[instrument(skip(self))]
    pub async fn join_lra(&self, lra_id: &str, participant_url: &str) -> Result<String> {
        let url = self.lra_url(lra_id, None)?;
        let response = self
            .send_direct(self.http.put(url).body(participant_url.to_string()))
            .await?;
        let response = Self::expect_success(response).await?;
        Ok(response.text().await?)
    }

    /// Leave an LRA; `participant` is the recovery URI returned by join or
    /// the URL the participant enlisted with.
    #[instrument(skip(self))]
    pub async fn leave_lra(&self, lra_id: &str, participant: &str) -> Result<()> {
        let url = self.lra_url(lra_id, Some("remove"))?;
        let response = self
            .send_direct(self.http.put(url).body(participant.to_string()))
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    /// Run one balanced request: select an instance, fail over to the next
    /// on connection errors and 5xx, give up after `max_retries` attempts.
    async fn send_balanced<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        let mut attempts = 0u32;
        let mut last = String::new();

        while attempts < self.config.max_retries {
            let Some(index) = self.selector.next() else {
                break;
            };
            let base = self.config.urls[index].as_str();
            attempts += 1;
            self.request_counter.fetch_add(1, Ordering::Relaxed);

            let request = build(base).header(API_VERSION_HEADER, CURRENT_API_VERSION);
            match request.send().await {
                Ok(response) if response.status().is_server_error() => {
                    last = format!("{} answered {}", base, response.status());
                    warn!(%base, attempts, "coordinator instance failed, trying next");
                    self.selector.mark_failed(index);
                }
                Ok(response) => return Ok(response),
                Err(e) => {
                    last = format!("{base}: {e}");
                    warn!(%base, attempts, error = %e, "coordinator instance unreachable");
                    self.selector.mark_failed(index);
                }
            }

            if attempts < self.config.max_retries {
                tokio::time::sleep(backoff_delay(attempts)).await;
            }
        }

        if attempts == 0 {
            return Err(ClientError::Unavailable(format!(
                "load balancing disabled for service '{}' (method '{}')",
                self.config.service_name, self.config.lb_method
            )));
        }
        Err(ClientError::AllAttemptsFailed { attempts, last })
    }

    async fn send_direct(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        Ok(request
            .header(API_VERSION_HEADER, CURRENT_API_VERSION)
            .send()
            .await?)
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(ClientError::Coordinator {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }

    /// The coordinator base embedded in an LRA id.
    fn coordinator_base(lra_id: &str) -> Result<String> {
        let mut url =
            Url::parse(lra_id).map_err(|_| ClientError::InvalidId(lra_id.to_string()))?;
        url.set_query(None);
        url.set_fragment(None);
        let path = url.path().trim_end_matches('/').to_string();
        if let Some((prefix, last)) = path.rsplit_once('/') {
            if last != COORDINATOR_PATH && !prefix.is_empty() {
                url.set_path(prefix);
            }
        }
        Ok(url.to_string())
    }

    /// URL of a per-LRA endpoint on the owning coordinator: the id travels
    /// URL-encoded as one path segment.
    fn lra_url(&self, lra_id: &str, suffix: Option<&str>) -> Result<Url> {
        let lra_id = lra_id.trim();
        let bare = lra_id.split(['?', '#']).next().unwrap_or(lra_id);
        let base = Self::coordinator_base(bare)?;
        let mut url = Url::parse(&base).map_err(|_| ClientError::InvalidId(bare.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ClientError::InvalidId(bare.to_string()))?;
            segments.push(bare);
            if let Some(suffix) = suffix {
                segments.push(suffix);
            }
        }
        Ok(url)
    }
}

fn join_path(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|_| ClientError::InvalidId(base.to_string()))?;
    {
        let mut parts = url
            .path_segments_mut()
            .map_err(|_| ClientError::InvalidId(base.to_string()))?;
        parts.pop_if_empty();
        for segment in segments {
            parts.push(segment);
        }
    }
    Ok(url)
}
