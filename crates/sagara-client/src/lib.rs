// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sagara Client - clustered coordinator access for participant services.
//!
//! Consumer-side counterpart of the coordinator: wraps a list of
//! coordinator base URLs behind a single client with selectable load
//! balancing and failover.
//!
//! - `round-robin` walks the URL list with a monotonic counter
//! - `sticky` pins the first instance and fails closed when it goes down
//! - any other method name disables load balancing; balanced requests
//!   fail with an unavailable error
//!
//! Only `start_lra` and `list_lras` are load-balanced. Every operation on
//! a known LRA id is routed to the coordinator base embedded in the id.
//!
//! # Example
//!
//! ```rust,ignore
//! use sagara_client::client::ClusteredCoordinatorClient;
//! use sagara_client::config::ClientConfig;
//!
//! # async fn run() -> sagara_client::error::Result<()> {
//! let client = ClusteredCoordinatorClient::new(
//!     ClientConfig::new().with_urls([
//!         "http://c1:8081/lra-coordinator",
//!         "http://c2:8082/lra-coordinator",
//!     ]),
//! )?;
//!
//! let lra = client.start_lra("order-77", None, None).await?;
//! client.join_lra(&lra, "http://me:8080/order-participant").await?;
//! client.close_lra(&lra).await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Clustered client implementation.
pub mod client;

/// Client configuration.
pub mod config;

/// Client error types.
pub mod error;

/// Coordinator instance selection strategies.
pub mod selector;

/// Wire types returned by the coordinator API.
pub mod types;

pub use client::ClusteredCoordinatorClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
