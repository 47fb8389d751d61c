// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Recovery scanner for unfinished LRAs.
//!
//! Periodically reloads persisted records, re-hydrates any that are missing
//! from the in-memory registry (a crashed predecessor left them behind) and
//! re-invokes the end-phase driver for everything with outstanding work.
//! Per-LRA locking makes a pass idempotent even when it overlaps a
//! user-triggered close or cancel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::driver;
use crate::lra::{now_millis, Lra};
use crate::service::CoordinatorService;
use crate::store::{ObjectStore, RecordKind};

/// Recovery scanner configuration.
#[derive(Debug, Clone)]
pub struct RecoveryScannerConfig {
    /// How often to scan for unfinished LRAs
    pub interval: Duration,
}

impl Default for RecoveryScannerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
        }
    }
}

/// Recovery scanner that runs as a background task.
pub struct RecoveryScanner {
    service: Arc<CoordinatorService>,
    store: Arc<dyn ObjectStore>,
    config: RecoveryScannerConfig,
    shutdown: Arc<Notify>,
}

impl RecoveryScanner {
    /// Create a new scanner over the given engine and store.
    pub fn new(
        service: Arc<CoordinatorService>,
        store: Arc<dyn ObjectStore>,
        config: RecoveryScannerConfig,
    ) -> Self {
        Self {
            service,
            store,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the recovery loop.
    pub async fn run(self) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            "recovery scanner started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("recovery scanner shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.config.interval) => {
                    self.pass().await;
                }
            }
        }
    }

    /// One recovery pass. Errors on individual LRAs are logged and do not
    /// stop the pass.
    pub async fn pass(&self) {
        self.rehydrate().await;

        let now = now_millis();
        for (uid, entry) in self.service.entries().await {
            let (expired, recovering) = {
                let lra = entry.lock().await;
                (lra.deadline_expired(now), lra.is_recovering())
            };
            if expired {
                // the deadline watcher died with the previous process
                self.service.cancel_expired(&uid).await;
            } else if recovering {
                if let Err(e) = driver::drive(&self.service, &uid).await {
                    warn!(uid, error = %e, "recovery drive failed");
                }
            }
        }

        let remaining = self.service.recovering_ids().await;
        if !remaining.is_empty() {
            debug!(count = remaining.len(), "LRAs still in recovery");
        }
    }

    /// Load records the registry has never seen, typically after a restart.
    async fn rehydrate(&self) {
        let uids = match self.store.list(RecordKind::LongRunningAction).await {
            Ok(uids) => uids,
            Err(e) => {
                error!(error = %e, "failed to enumerate persisted LRAs");
                return;
            }
        };

        for uid in uids {
            if self.service.entry(&uid).await.is_some() {
                continue;
            }
            let bytes = match self.store.read(RecordKind::LongRunningAction, &uid).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue, // removed between list and read
                Err(e) => {
                    warn!(uid, error = %e, "failed to read persisted LRA");
                    continue;
                }
            };
            match Lra::decode(&bytes) {
                Ok(lra) => {
                    info!(lra_id = %lra.id, status = lra.status.as_str(), "re-hydrated LRA");
                    self.service.rehydrate(lra).await;
                }
                Err(e) => {
                    warn!(uid, error = %e, "failed to decode persisted LRA");
                }
            }
        }
    }
}
