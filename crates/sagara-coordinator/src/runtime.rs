// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for the coordinator.
//!
//! [`CoordinatorRuntime`] runs the HTTP server and the recovery scanner as
//! owned background tasks inside an existing tokio application, with clean
//! shutdown ordering: workers stop before the object store is dropped.
//!
//! # Example
//!
//! ```rust,ignore
//! use sagara_coordinator::config::Config;
//! use sagara_coordinator::runtime::CoordinatorRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CoordinatorRuntime::builder()
//!         .config(Config::from_env()?)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... run your application ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::info;
use url::Url;

use crate::config::{Config, StoreKind};
use crate::handlers::AppState;
use crate::id::COORDINATOR_PATH;
use crate::recovery::{RecoveryScanner, RecoveryScannerConfig};
use crate::server;
use crate::service::CoordinatorService;
use crate::store::{FileStore, MemoryStore, ObjectStore, SqlStore};

/// Builder for creating a [`CoordinatorRuntime`].
pub struct CoordinatorRuntimeBuilder {
    config: Config,
    store: Option<Arc<dyn ObjectStore>>,
}

impl std::fmt::Debug for CoordinatorRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorRuntimeBuilder")
            .field("config", &self.config)
            .field("store", &self.store.as_ref().map(|_| "..."))
            .finish()
    }
}

impl Default for CoordinatorRuntimeBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            store: None,
        }
    }
}

impl CoordinatorRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the coordinator configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use a pre-built object store instead of the configured backend.
    pub fn store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate and freeze the runtime configuration.
    pub fn build(self) -> Result<CoordinatorRuntimeConfig> {
        if self.store.is_none()
            && self.config.store == StoreKind::Sql
            && self.config.database_url.is_none()
        {
            return Err(anyhow!("the sql store requires a database URL"));
        }
        Ok(CoordinatorRuntimeConfig {
            config: self.config,
            store: self.store,
        })
    }
}

/// Configuration for a [`CoordinatorRuntime`].
pub struct CoordinatorRuntimeConfig {
    config: Config,
    store: Option<Arc<dyn ObjectStore>>,
}

impl std::fmt::Debug for CoordinatorRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorRuntimeConfig")
            .field("config", &self.config)
            .field("store", &self.store.as_ref().map(|_| "..."))
            .finish()
    }
}

impl CoordinatorRuntimeConfig {
    /// Start the runtime, spawning the HTTP server and recovery scanner.
    pub async fn start(self) -> Result<CoordinatorRuntime> {
        let store: Arc<dyn ObjectStore> = match self.store {
            Some(store) => store,
            None => match self.config.store {
                StoreKind::Memory => Arc::new(MemoryStore::new()),
                StoreKind::File => Arc::new(
                    FileStore::open(&self.config.store_dir)
                        .await
                        .context("opening file store")?,
                ),
                StoreKind::Sql => {
                    let url = self
                        .config
                        .database_url
                        .as_ref()
                        .ok_or_else(|| anyhow!("the sql store requires a database URL"))?;
                    Arc::new(SqlStore::connect(url).await.context("opening sql store")?)
                }
            },
        };

        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .context("binding HTTP listener")?;
        let local_addr = listener.local_addr()?;

        let base = match &self.config.external_base {
            Some(base) => base.clone(),
            None => Url::parse(&format!("http://{local_addr}/{COORDINATOR_PATH}"))?,
        };
        let path_prefix = base.path().trim_end_matches('/').to_string();

        let http = reqwest::Client::builder()
            .timeout(self.config.participant_timeout)
            .build()
            .context("building participant HTTP client")?;
        let service = CoordinatorService::new(base.clone(), store.clone(), http);

        let scanner = RecoveryScanner::new(
            service.clone(),
            store,
            RecoveryScannerConfig {
                interval: self.config.recovery_interval,
            },
        );
        let scanner_shutdown = scanner.shutdown_handle();
        let scanner_handle = tokio::spawn(scanner.run());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = AppState {
            service: service.clone(),
        };
        let server_handle = tokio::spawn(server::serve(listener, state, path_prefix, shutdown_rx));

        info!(addr = %local_addr, base = %base, "coordinator runtime started");

        Ok(CoordinatorRuntime {
            local_addr,
            base,
            service,
            server_handle,
            scanner_handle,
            shutdown_tx,
            scanner_shutdown,
        })
    }
}

/// A running coordinator that can be embedded in an application.
///
/// The runtime owns:
/// - the HTTP API server
/// - the recovery scanner
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct CoordinatorRuntime {
    local_addr: SocketAddr,
    base: Url,
    service: Arc<CoordinatorService>,
    server_handle: JoinHandle<std::io::Result<()>>,
    scanner_handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    scanner_shutdown: Arc<Notify>,
}

impl CoordinatorRuntime {
    /// Create a builder.
    pub fn builder() -> CoordinatorRuntimeBuilder {
        CoordinatorRuntimeBuilder::new()
    }

    /// The address the HTTP server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The coordinator base minted ids live under.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// The engine, for embedded callers that bypass HTTP.
    pub fn service(&self) -> Arc<CoordinatorService> {
        self.service.clone()
    }

    /// Stop the workers and the server, in that order, and wait for both.
    pub async fn shutdown(self) -> Result<()> {
        self.scanner_shutdown.notify_one();
        let _ = self.shutdown_tx.send(true);
        self.scanner_handle.await.context("joining recovery scanner")?;
        self.server_handle
            .await
            .context("joining HTTP server")?
            .context("HTTP server failed")?;
        info!("coordinator runtime stopped");
        Ok(())
    }
}
