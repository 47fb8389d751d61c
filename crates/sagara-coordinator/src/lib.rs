// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sagara Coordinator - Long-Running Action Engine
//!
//! This crate implements a coordinator for long-running actions (LRAs):
//! compensation-based sagas spread across HTTP participants. The
//! coordinator owns each LRA's lifecycle (start, nest, close, cancel,
//! renew, recover) and drives every enlisted participant to a terminal
//! state, including after a crash.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Participant Services                     │
//! │        (join / leave via REST, receive callbacks)           │
//! └─────────────────────────────────────────────────────────────┘
//!               │ REST                        ▲ complete / compensate /
//!               ▼                             │ status / forget / after
//! ┌─────────────────────────┐                 │
//! │       HTTP surface      │      ┌──────────┴──────────┐
//! │  (axum router, version  │─────▶│  Coordinator engine │
//! │        middleware)      │      │  registry + per-LRA │
//! └─────────────────────────┘      │  locks + driver     │
//!                                  └──────────┬──────────┘
//!        ┌─────────────────────┐              │ write-through
//!        │  Recovery scanner   │◀─────────────┤
//!        │  (re-drives end     │              ▼
//!        │   phases on a tick) │   ┌─────────────────────┐
//!        └─────────────────────┘   │     Object store    │
//!                                  │ memory / file / sql │
//!                                  └─────────────────────┘
//! ```
//!
//! # LRA status machine
//!
//! ```text
//!              ┌────────┐
//!      ┌───────│ ACTIVE │───────┐
//!      │close  └───┬────┘  cancel│ (or deadline)
//!      ▼           │             ▼
//! ┌─────────┐      │       ┌────────────┐
//! │ CLOSING │      │       │ CANCELLING │
//! └────┬────┘      │       └─────┬──────┘
//!      │ all completed           │ all compensated
//!      ▼                         ▼
//! ┌─────────┐              ┌───────────┐
//! │ CLOSED  │              │ CANCELLED │
//! └─────────┘              └───────────┘
//!      │ any FailedToComplete    │ any FailedToCompensate
//!      ▼                         ▼
//! ┌──────────────┐         ┌────────────────┐
//! │ FailedToClose│         │ FailedToCancel │
//! └──────────────┘         └────────────────┘
//! ```
//!
//! Completion runs in enlistment order; compensation runs in reverse
//! enlistment order. Closing a parent closes its children first,
//! depth-first, and a cancelled child forces the parent to cancel.
//!
//! # Modules
//!
//! - [`config`]: configuration from environment variables
//! - [`error`]: error types with HTTP status mapping
//! - [`handlers`]: REST handlers for the coordinator verbs
//! - [`id`]: LRA identifiers and protocol constants
//! - [`lra`]: the LRA record and status machine
//! - [`participant`]: participant records and enlistment parsing
//! - [`recovery`]: the periodic recovery scanner
//! - [`runtime`]: embeddable runtime with graceful shutdown
//! - [`server`]: router assembly and the HTTP server loop
//! - [`service`]: the coordinator engine
//! - [`store`]: the object store interface and backends

#![deny(missing_docs)]

/// Configuration from environment variables.
pub mod config;

/// End-phase driver: participant callbacks and status polling.
mod driver;

/// Error types with HTTP status mapping.
pub mod error;

/// REST handlers for the coordinator verbs.
pub mod handlers;

/// LRA identifiers and protocol constants.
pub mod id;

/// The LRA record and status machine.
pub mod lra;

/// Participant records and enlistment parsing.
pub mod participant;

/// The periodic recovery scanner.
pub mod recovery;

/// Embeddable runtime with graceful shutdown.
pub mod runtime;

/// Router assembly and the HTTP server loop.
pub mod server;

/// The coordinator engine.
pub mod service;

/// Object store interface and backends.
pub mod store;
