// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The long-running action record and its status machine.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::id::LraId;
use crate::participant::Participant;

/// Lifecycle status of an LRA.
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

    /// Stable numeric ordinal used by the SQL record layout.
    pub fn ordinal(&self) -> i32 {
        match self {
            Self::Active => 0,
            Self::Closing => 1,
            Self::Closed => 2,
            Self::Cancelling => 3,
            Self::Cancelled => 4,
            Self::FailedToClose => 5,
            Self::FailedToCancel => 6,
        }
    }

    /// True for `Closed`, `Cancelled` and the `FailedTo*` outcomes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Closed | Self::Cancelled | Self::FailedToClose | Self::FailedToCancel
        )
    }

    /// True for the permanent failure outcomes.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::FailedToClose | Self::FailedToCancel)
    }

    /// HTTP status a participant probe of this LRA would observe, as
    /// reported in [`LraData`].
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Active => 204,
            Self::Closing | Self::Cancelling => 202,
            Self::Closed | Self::Cancelled => 200,
            Self::FailedToClose | Self::FailedToCancel => 412,
        }
    }
}

/// Wire snapshot of one LRA, served by the list and info endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LraData {
    /// The LRA id.
    pub lra_id: LraId,
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

/// One long-running action: the aggregate of its participants under a
/// single lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lra {
    /// Globally unique id, minted under this coordinator's base.
    pub id: LraId,
    /// Opaque caller-supplied identifier, for telemetry only.
    pub client_id: String,
    /// Parent id when this LRA is nested.
    pub parent_id: Option<LraId>,
    /// Ids of nested LRAs started under this one.
    pub children: Vec<LraId>,
    /// Enlisted participants in enlistment order.
    pub participants: Vec<Participant>,
    /// Current status.
    pub status: LraStatus,
    /// Start time in epoch milliseconds.
    pub start_time: i64,
    /// Deadline or termination time in epoch milliseconds; 0 until set.
    pub finish_time: i64,
    /// Deadline in epoch milliseconds; 0 means none.
    pub deadline: i64,
    /// End-phase driver guard; never persisted.
    #[serde(skip)]
    pub driving: bool,
}

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl Lra {
    /// Create a new active LRA. A positive `time_limit` (milliseconds) arms
    /// the deadline; zero or negative means no deadline.
    pub fn new(id: LraId, client_id: String, parent_id: Option<LraId>, time_limit: i64) -> Self {
        let start_time = now_millis();
        let deadline = if time_limit > 0 {
            start_time + time_limit
        } else {
            0
        };
        Self {
            id,
            client_id,
            parent_id,
            children: Vec::new(),
            participants: Vec::new(),
            status: LraStatus::Active,
            start_time,
            finish_time: deadline,
            deadline,
            driving: false,
        }
    }

    /// Whether this LRA has no parent.
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Whether an end-phase attempt has not yet completed for all
    /// participants, i.e. the recovery scanner still owns work here.
    pub fn is_recovering(&self) -> bool {
        match self.status {
            LraStatus::Active => false,
            LraStatus::Closing | LraStatus::Cancelling => true,
            LraStatus::Closed | LraStatus::Cancelled => {
                self.participants.iter().any(|p| !p.after_delivered())
            }
            LraStatus::FailedToClose | LraStatus::FailedToCancel => false,
        }
    }

    /// Whether the deadline has passed for a still-active LRA.
    pub fn deadline_expired(&self, now: i64) -> bool {
        self.status == LraStatus::Active && self.deadline > 0 && now >= self.deadline
    }

    /// Update the deadline. Zero or negative disables it.
    pub fn set_time_limit(&mut self, time_limit: i64) {
        if time_limit > 0 {
            self.deadline = now_millis() + time_limit;
            self.finish_time = self.deadline;
        } else {
            self.deadline = 0;
            self.finish_time = 0;
        }
    }

    /// Snapshot for the wire.
    pub fn data(&self) -> LraData {
        LraData {
            lra_id: self.id.clone(),
            client_id: self.client_id.clone(),
            status: self.status,
            top_level: self.is_top_level(),
            recovering: self.is_recovering(),
            start_time: self.start_time,
            finish_time: self.finish_time,
            http_status: self.status.http_status(),
        }
    }

    /// Serialize for the object store.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize a stored record.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
