// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client-specific error types.

use thiserror::Error;

/// Errors that can occur in the clustered client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Configuration error (missing or invalid value)
    #[error("configuration error: {0}")]
    Config(String),

    /// No coordinator instance can be selected: the load-balancing method
    /// is unknown, or the sticky endpoint is down.
    #[error("no coordinator available: {0}")]
    Unavailable(String),

    /// Transport-level failure talking to a coordinator
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The coordinator answered with an error status
    #[error("coordinator error: {status} - {message}")]
    Coordinator {
        /// HTTP status code returned by the coordinator
        status: u16,
        /// Response body
        message: String,
    },

    /// Every configured instance was tried and failed
    #[error("all {attempts} attempts failed, last error: {last}")]
    AllAttemptsFailed {
        /// Number of attempts made
        attempts: u32,
        /// Description of the last failure
        last: String,
    },

    /// An LRA id could not be parsed for affinity routing
    #[error("invalid LRA id: {0}")]
    InvalidId(String),

    /// The coordinator answered with something the client cannot use
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Type alias for client results.
pub type Result<T> = std::result::Result<T, ClientError>;
