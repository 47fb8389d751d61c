// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the coordinator.
//!
//! Provides a unified error type that maps to HTTP response statuses.
//! Error messages embed the offending id so that clients can tell which
//! LRA or participant a failure refers to.

use std::fmt;

use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::lra::LraStatus;
use crate::store::StoreError;

/// Result type using CoordinatorError
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Coordinator errors that can occur during request processing.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoordinatorError {
    /// The LRA was not found in the registry or the store.
    LraNotFound {
        /// The id that was not found.
        lra_id: String,
    },

    /// A nested start named a parent that does not exist.
    ParentNotFound {
        /// The parent id that was not found.
        parent_id: String,
    },

    /// A leave request named an unknown participant.
    ParticipantNotFound {
        /// The owning LRA.
        lra_id: String,
        /// The participant or recovery URI that was not enlisted.
        participant: String,
    },

    /// The `Status` query filter is not a valid LRA status.
    InvalidStatusFilter {
        /// The unrecognized filter value.
        value: String,
    },

    /// A Link-header enlistment carried rels but no compensate endpoint.
    MissingCompensate {
        /// The LRA the enlistment targeted.
        lra_id: String,
    },

    /// A body enlistment was not a usable absolute URI.
    InvalidParticipantUri {
        /// The LRA the enlistment targeted.
        lra_id: String,
        /// The rejected URI.
        uri: String,
    },

    /// A Link header could not be parsed.
    MalformedLink {
        /// The LRA the enlistment targeted.
        lra_id: String,
    },

    /// The LRA has reached a terminal state; mutating verbs are gone.
    Terminal {
        /// The terminal LRA.
        lra_id: String,
        /// Its status.
        status: LraStatus,
    },

    /// The requested API version is not supported.
    UnsupportedApiVersion {
        /// The rejected version string.
        version: String,
    },

    /// The object store failed.
    Store {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// Record serialization failed.
    Serialization {
        /// Error details.
        details: String,
    },
}

impl CoordinatorError {
    /// The HTTP status this error maps to on the API surface.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::LraNotFound { .. } | Self::ParentNotFound { .. } => StatusCode::NOT_FOUND,
            Self::ParticipantNotFound { .. }
            | Self::InvalidStatusFilter { .. }
            | Self::MissingCompensate { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidParticipantUri { .. } => StatusCode::PRECONDITION_FAILED,
            Self::MalformedLink { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Terminal { .. } => StatusCode::GONE,
            Self::UnsupportedApiVersion { .. } => StatusCode::EXPECTATION_FAILED,
            Self::Store { .. } | Self::Serialization { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LraNotFound { lra_id } => write!(f, "LRA '{}' not found", lra_id),
            Self::ParentNotFound { parent_id } => {
                write!(f, "parent LRA '{}' not found", parent_id)
            }
            Self::ParticipantNotFound { lra_id, participant } => {
                write!(
                    f,
                    "participant '{}' is not enlisted in LRA '{}'",
                    participant, lra_id
                )
            }
            Self::InvalidStatusFilter { value } => {
                write!(f, "invalid status filter '{}'", value)
            }
            Self::MissingCompensate { lra_id } => {
                write!(
                    f,
                    "enlistment in LRA '{}' has no compensate endpoint",
                    lra_id
                )
            }
            Self::InvalidParticipantUri { lra_id, uri } => {
                write!(
                    f,
                    "participant URI '{}' for LRA '{}' is not a valid URI",
                    uri, lra_id
                )
            }
            Self::MalformedLink { lra_id } => {
                write!(f, "malformed Link header enlisting in LRA '{}'", lra_id)
            }
            Self::Terminal { lra_id, status } => {
                write!(
                    f,
                    "LRA '{}' is no longer active ({})",
                    lra_id,
                    status.as_str()
                )
            }
            Self::UnsupportedApiVersion { version } => {
                write!(f, "unsupported API version '{}'", version)
            }
            Self::Store { operation, details } => {
                write!(f, "store error during '{}': {}", operation, details)
            }
            Self::Serialization { details } => write!(f, "serialization error: {}", details),
        }
    }
}

impl std::error::Error for CoordinatorError {}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), self.to_string()).into_response()
    }
}

impl From<StoreError> for CoordinatorError {
    fn from(err: StoreError) -> Self {
        CoordinatorError::Store {
            operation: "access".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoordinatorError {
    fn from(err: serde_json::Error) -> Self {
        CoordinatorError::Serialization {
            details: err.to_string(),
        }
    }
}
