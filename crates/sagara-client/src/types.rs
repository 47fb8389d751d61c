// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire types returned by the coordinator API.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an LRA as reported by a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LraStatus {
    /// Accepting joins; no end phase started.
    Active,
    /// Close requested; complete callbacks in flight.
    Closing,
    /// All participants completed.
    Closed,
    /// Cancel requested; compensate callbacks in flight.
    Cancelling,
    /// All participants compensated.
    Cancelled,
    /// At least one participant permanently failed to complete.
    FailedToClose,
    /// At least one participant permanently failed to compensate.
    FailedToCancel,
}

impl LraStatus {
    /// Wire form of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
            Self::Cancelling => "Cancelling",
            Self::Cancelled => "Cancelled",
            Self::FailedToClose => "FailedToClose",
            Self::FailedToCancel => "FailedToCancel",
        }
    }

    /// Parse a wire status. Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Active" => Some(Self::Active),
            "Closing" => Some(Self::Closing),
            "Closed" => Some(Self::Closed),
            "Cancelling" => Some(Self::Cancelling),
            "Cancelled" => Some(Self::Cancelled),
            "FailedToClose" => Some(Self::FailedToClose),
            "FailedToCancel" => Some(Self::FailedToCancel),
            _ => None,
        }
    }

    /// True for `Closed`, `Cancelled` and the `FailedTo*` outcomes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Closed | Self::Cancelled | Self::FailedToClose | Self::FailedToCancel
        )
    }
}

/// Snapshot of one LRA as served by the list and info endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LraData {
    /// The LRA id.
    pub lra_id: String,
    /// Caller-supplied client id.
    pub client_id: String,
    /// Current status.
    pub status: LraStatus,
    /// Whether this LRA has no parent.
    pub top_level: bool,
    /// Whether an end-phase attempt is still outstanding.
    pub recovering: bool,
    /// Start time in epoch milliseconds.
    pub start_time: i64,
    /// Deadline or termination time in epoch milliseconds; 0 until set.
    pub finish_time: i64,
    /// HTTP status code equivalent of the current status.
    pub http_status: u16,
}
