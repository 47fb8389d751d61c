// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// Which object store backend to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Volatile in-memory store.
    Memory,
    /// File-per-record store.
    File,
    /// PostgreSQL table store.
    Sql,
}

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for the HTTP API
    pub bind_addr: SocketAddr,
    /// Externally visible coordinator base URL used in minted LRA ids.
    /// When unset it is derived from the bound address.
    pub external_base: Option<Url>,
    /// Object store backend
    pub store: StoreKind,
    /// Root directory of the file store
    pub store_dir: PathBuf,
    /// Connection URL for the SQL store
    pub database_url: Option<String>,
    /// How often the recovery scanner runs
    pub recovery_interval: Duration,
    /// Timeout applied to each outbound participant call
    pub participant_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            external_base: None,
            store: StoreKind::Memory,
            store_dir: PathBuf::from(".sagara"),
            database_url: None,
            recovery_interval: Duration::from_millis(2000),
            participant_timeout: Duration::from_millis(10_000),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `SAGARA_BIND_ADDR`: HTTP listen address (default: 0.0.0.0:8080)
    /// - `SAGARA_EXTERNAL_URL`: coordinator base used in minted LRA ids
    /// - `SAGARA_STORE`: `memory` | `file` | `sql` (default: memory)
    /// - `SAGARA_STORE_DIR`: file store root (default: .sagara)
    /// - `SAGARA_DATABASE_URL`: required when `SAGARA_STORE=sql`
    /// - `SAGARA_RECOVERY_INTERVAL_MS`: recovery scan interval (default: 2000)
    /// - `SAGARA_PARTICIPANT_TIMEOUT_MS`: outbound call timeout (default: 10000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind_addr = match std::env::var("SAGARA_BIND_ADDR") {
            Ok(v) => v
                .parse()
                .map_err(|_| ConfigError::Invalid("SAGARA_BIND_ADDR", "must be a socket address"))?,
            Err(_) => defaults.bind_addr,
        };

        let external_base = match std::env::var("SAGARA_EXTERNAL_URL") {
            Ok(v) => Some(
                Url::parse(&v)
                    .map_err(|_| ConfigError::Invalid("SAGARA_EXTERNAL_URL", "must be a URL"))?,
            ),
            Err(_) => None,
        };

        let store = match std::env::var("SAGARA_STORE").as_deref() {
            Ok("memory") | Err(_) => StoreKind::Memory,
            Ok("file") => StoreKind::File,
            Ok("sql") => StoreKind::Sql,
            Ok(_) => {
                return Err(ConfigError::Invalid(
                    "SAGARA_STORE",
                    "must be one of: memory, file, sql",
                ))
            }
        };

        let store_dir = std::env::var("SAGARA_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.store_dir);

        let database_url = std::env::var("SAGARA_DATABASE_URL").ok();
        if store == StoreKind::Sql && database_url.is_none() {
            return Err(ConfigError::Missing("SAGARA_DATABASE_URL"));
        }

        let recovery_interval = millis_var(
            "SAGARA_RECOVERY_INTERVAL_MS",
            defaults.recovery_interval,
        )?;
        let participant_timeout = millis_var(
            "SAGARA_PARTICIPANT_TIMEOUT_MS",
            defaults.participant_timeout,
        )?;

        Ok(Self {
            bind_addr,
            external_base,
            store,
            store_dir,
            database_url,
            recovery_interval,
            participant_timeout,
        })
    }
}

fn millis_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(v) => v
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Invalid(name, "must be a millisecond count")),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
