// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Participant records and enlistment parsing.
//!
//! A participant is one `(LRA, endpoint set)` pair. Endpoints arrive either
//! as an HTTP `Link` header with rel-qualified entries or as a plain-text
//! base URI from which the standard callback paths are derived.

use serde::{Deserialize, Serialize};
use url::Url;

/// State of a single enlistment.
///
/// Terminal states are sticky: once a participant reports `Completed`,
/// `Compensated` or a `FailedTo*` outcome it never transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantState {
    /// Enlisted, no end-phase call made yet.
    Active,
    /// A complete call was accepted but has not finished.
    Completing,
    /// The participant finished its completion work.
    Completed,
    /// A compensate call was accepted but has not finished.
    Compensating,
    /// The participant undid its work.
    Compensated,
    /// The participant reported a permanent completion failure.
    FailedToComplete,
    /// The participant reported a permanent compensation failure.
    FailedToCompensate,
}

impl ParticipantState {
    /// String form used on the wire and in participant response bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Completing => "Completing",
            Self::Completed => "Completed",
            Self::Compensating => "Compensating",
            Self::Compensated => "Compensated",
            Self::FailedToComplete => "FailedToComplete",
            Self::FailedToCompensate => "FailedToCompensate",
        }
    }

    /// Parse a wire status body. Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Active" => Some(Self::Active),
            "Completing" => Some(Self::Completing),
            "Completed" => Some(Self::Completed),
            "Compensating" => Some(Self::Compensating),
            "Compensated" => Some(Self::Compensated),
            "FailedToComplete" => Some(Self::FailedToComplete),
            "FailedToCompensate" => Some(Self::FailedToCompensate),
            _ => None,
        }
    }

    /// True for `Completed`, `Compensated` and the `FailedTo*` outcomes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Compensated | Self::FailedToComplete | Self::FailedToCompensate
        )
    }

    /// True for the permanent failure outcomes.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::FailedToComplete | Self::FailedToCompensate)
    }
}

/// Why an enlistment request was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnlistError {
    /// The `Link` header could not be parsed.
    MalformedLink(String),
    /// The header carried rels but neither `compensate` nor `after`.
    MissingCompensate,
    /// The plain-text body was not a usable absolute URI.
    InvalidUri(String),
}

/// The callback endpoint set of one enlistment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// Invoked on cancel to undo the participant's work.
    pub compensate: Option<Url>,
    /// Invoked on close to finalize the participant's work.
    pub complete: Option<Url>,
    /// Polled while the participant reports 202 from an end-phase call.
    pub status: Option<Url>,
    /// Told to discard state once the coordinator no longer needs it.
    pub forget: Option<Url>,
    /// Notified after the LRA reaches a terminal state.
    pub after: Option<Url>,
}

impl Endpoints {
    /// An enlistment with no callbacks at all.
    ///
    /// Permitted for an empty join body; such a participant is trivially
    /// terminal in both end phases.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Derive the standard endpoint set from a participant base URI.
    pub fn from_base(raw: &str) -> Result<Self, EnlistError> {
        let base = parse_endpoint(raw).ok_or_else(|| EnlistError::InvalidUri(raw.to_string()))?;
        let join = |suffix: &str| {
            let raw = format!("{}/{}", base.as_str().trim_end_matches('/'), suffix);
            Url::parse(&raw).ok()
        };
        Ok(Self {
            compensate: join("compensate"),
            complete: join("complete"),
            status: join("status"),
            forget: join("forget"),
            after: join("after"),
        })
    }

    /// Parse an HTTP `Link` header.
    ///
    /// Entries look like `<uri>; rel="compensate"`. A header that is a bare
    /// URI (no angle brackets, no rel) is treated as a participant base and
    /// expanded like a body join. An entry without a rel parameter is
    /// expanded the same way.
    pub fn from_link_header(header: &str) -> Result<Self, EnlistError> {
        let header = header.trim();
        if header.is_empty() {
            return Err(EnlistError::MalformedLink(header.to_string()));
        }
        if !header.contains('<') {
            // bare URI form, e.g. `Link: http://compensator:8080`
            return parse_endpoint(header)
                .ok_or_else(|| EnlistError::MalformedLink(header.to_string()))
                .and_then(|url| Self::from_base(url.as_str()));
        }

        let mut endpoints = Self::default();
        let mut saw_rel = false;
        for entry in split_links(header) {
            let entry = entry.trim();
            let (uri, params) = parse_link_entry(entry)
                .ok_or_else(|| EnlistError::MalformedLink(header.to_string()))?;
            let url =
                parse_endpoint(uri).ok_or_else(|| EnlistError::MalformedLink(header.to_string()))?;
            match params {
                None => {
                    // rel-less entry: expand as a base, keeping anything a
                    // rel-qualified entry already claimed
                    let derived = Self::from_base(url.as_str())
                        .map_err(|_| EnlistError::MalformedLink(header.to_string()))?;
                    endpoints.merge_missing(derived);
                }
                Some(rel) => {
                    saw_rel = true;
                    match rel.as_str() {
                        "compensate" => endpoints.compensate = Some(url),
                        "complete" => endpoints.complete = Some(url),
                        "status" => endpoints.status = Some(url),
                        "forget" => endpoints.forget = Some(url),
                        "after" => endpoints.after = Some(url),
                        _ => {} // unknown rels are ignored
                    }
                }
            }
        }

        if saw_rel && endpoints.compensate.is_none() && endpoints.after.is_none() {
            return Err(EnlistError::MissingCompensate);
        }
        Ok(endpoints)
    }

    fn merge_missing(&mut self, other: Self) {
        if self.compensate.is_none() {
            self.compensate = other.compensate;
        }
        if self.complete.is_none() {
            self.complete = other.complete;
        }
        if self.status.is_none() {
            self.status = other.status;
        }
        if self.forget.is_none() {
            self.forget = other.forget;
        }
        if self.after.is_none() {
            self.after = other.after;
        }
    }
}

fn parse_endpoint(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Split a Link header on the commas that separate entries. Commas never
/// occur inside `<...>` URI brackets for the rels we accept.
fn split_links(header: &str) -> impl Iterator<Item = &str> {
    header.split(',').filter(|s| !s.trim().is_empty())
}

/// Split one Link entry into its URI and optional rel parameter.
/// Returns `None` when the entry is structurally broken.
fn parse_link_entry(entry: &str) -> Option<(&str, Option<String>)> {
    let rest = entry.strip_prefix('<')?;
    let (uri, params) = rest.split_once('>')?;
    let mut rel = None;
    for param in params.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("rel") {
            let value = value.trim().trim_matches('"');
            rel = Some(value.to_string());
        }
    }
    // an entry with parameters but no rel at all is malformed enough that
    // the original answers with an internal error
    if rel.is_none() && !params.trim().is_empty() {
        return None;
    }
    Some((uri, rel))
}

/// One enlistment of a participant endpoint set in an LRA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Opaque uid of this enlistment, unique within the LRA.
    pub uid: String,
    /// Coordinator-assigned URI clients use to refer to this enlistment.
    pub recovery_id: Url,
    /// The URL the participant enlisted with, kept for leave-by-URL.
    pub source: Option<Url>,
    /// Callback endpoints.
    pub endpoints: Endpoints,
    /// Participant-specific deadline in epoch milliseconds; 0 means none.
    pub time_limit: i64,
    /// Opaque payload passed back on every callback.
    pub user_data: Option<String>,
    /// Current enlistment state.
    pub state: ParticipantState,
    /// Whether the after-callback has been delivered.
    pub after_done: bool,
}

impl Participant {
    /// Create a fresh enlistment in the `Active` state.
    pub fn new(
        uid: String,
        recovery_id: Url,
        source: Option<Url>,
        endpoints: Endpoints,
        time_limit: i64,
        user_data: Option<String>,
    ) -> Self {
        Self {
            uid,
            recovery_id,
            source,
            endpoints,
            time_limit,
            user_data,
            state: ParticipantState::Active,
            after_done: false,
        }
    }

    /// Apply a state transition, honouring terminal stickiness.
    pub fn transition(&mut self, next: ParticipantState) {
        if !self.state.is_terminal() {
            self.state = next;
        }
    }

    /// Whether this enlistment matches a leave request for `target`.
    pub fn matches(&self, target: &str) -> bool {
        let target = target.trim().trim_end_matches('/');
        if self.recovery_id.as_str().trim_end_matches('/') == target {
            return true;
        }
        self.source
            .as_ref()
            .is_some_and(|s| s.as_str().trim_end_matches('/') == target)
    }

    /// True once the after-callback needs no further delivery attempts.
    pub fn after_delivered(&self) -> bool {
        self.endpoints.after.is_none() || self.after_done
    }
}
