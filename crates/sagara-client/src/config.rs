// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the clustered client.

use std::time::Duration;

use crate::error::{ClientError, Result};

/// Name of the round-robin load-balancing method.
pub const LB_METHOD_ROUND_ROBIN: &str = "round-robin";

/// Name of the sticky load-balancing method.
pub const LB_METHOD_STICKY: &str = "sticky";

/// Configuration for the clustered coordinator client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Ordered list of coordinator base URLs.
    pub urls: Vec<String>,
    /// Load-balancing method; unknown values disable load balancing.
    pub lb_method: String,
    /// Logical service name, used in logs and for discovery layers.
    pub service_name: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Maximum attempts across the instance list.
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            lb_method: LB_METHOD_ROUND_ROBIN.to_string(),
            service_name: "lra-coordinator".to_string(),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SAGARA_COORDINATOR_URLS`: comma-separated coordinator base URLs (required)
    /// - `SAGARA_LB_METHOD`: load-balancing method (default: "round-robin")
    /// - `SAGARA_SERVICE_NAME`: service name (default: "lra-coordinator")
    /// - `SAGARA_REQUEST_TIMEOUT_MS`: request timeout in milliseconds (default: 30000)
    /// - `SAGARA_MAX_RETRIES`: maximum attempts (default: 3)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let urls = std::env::var("SAGARA_COORDINATOR_URLS")
            .map_err(|_| ClientError::Config("missing SAGARA_COORDINATOR_URLS".to_string()))?;
        let urls: Vec<String> = urls
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect();

        let lb_method = std::env::var("SAGARA_LB_METHOD").unwrap_or(defaults.lb_method);
        let service_name = std::env::var("SAGARA_SERVICE_NAME").unwrap_or(defaults.service_name);

        let request_timeout = match std::env::var("SAGARA_REQUEST_TIMEOUT_MS") {
            Ok(v) => Duration::from_millis(v.parse().map_err(|_| {
                ClientError::Config("invalid SAGARA_REQUEST_TIMEOUT_MS".to_string())
            })?),
            Err(_) => defaults.request_timeout,
        };

        let max_retries = match std::env::var("SAGARA_MAX_RETRIES") {
            Ok(v) => v
                .parse()
                .map_err(|_| ClientError::Config("invalid SAGARA_MAX_RETRIES".to_string()))?,
            Err(_) => defaults.max_retries,
        };

        Ok(Self {
            urls,
            lb_method,
            service_name,
            request_timeout,
            max_retries,
        })
    }

    /// Set the coordinator URL list.
    pub fn with_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Set the load-balancing method.
    pub fn with_lb_method(mut self, method: impl Into<String>) -> Self {
        self.lb_method = method.into();
        self
    }

    /// Set the service name.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the maximum attempt count.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config.urls.is_empty());
        assert_eq!(config.lb_method, LB_METHOD_ROUND_ROBIN);
        assert_eq!(config.service_name, "lra-coordinator");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_builder_methods() {
        let config = ClientConfig::new()
            .with_urls(["http://c1:8081/lra-coordinator", "http://c2:8082/lra-coordinator"])
            .with_lb_method(LB_METHOD_STICKY)
            .with_service_name("my-coordinators")
            .with_request_timeout(Duration::from_secs(5))
            .with_max_retries(7);

        assert_eq!(config.urls.len(), 2);
        assert_eq!(config.lb_method, "sticky");
        assert_eq!(config.service_name, "my-coordinators");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.max_retries, 7);
    }
}
