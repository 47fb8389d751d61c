// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Coordinator binary: load configuration, start the runtime, run until
//! interrupted.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sagara_coordinator::config::Config;
use sagara_coordinator::runtime::CoordinatorRuntime;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let runtime = CoordinatorRuntime::builder()
        .config(config)
        .build()?
        .start()
        .await?;

    info!(addr = %runtime.local_addr(), base = %runtime.base_url(), "sagara coordinator running");

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    runtime.shutdown().await
}
