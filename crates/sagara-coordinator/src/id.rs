// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! LRA identifiers and wire protocol constants.
//!
//! An LRA id is an absolute URI of the form `<coordinator-base>/<uid>`.
//! The coordinator base is embedded in every id so that consumers can route
//! follow-up operations to the coordinator that owns the LRA.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Default path segment under which a coordinator serves its API.
pub const COORDINATOR_PATH: &str = "lra-coordinator";

/// Request/response header carrying the dotted API version string.
pub const API_VERSION_HEADER: &str = "Narayana-LRA-API-version";

/// Response header carrying the participant recovery URI returned by join.
pub const RECOVERY_HEADER: &str = "Long-Running-Action-Recovery";

/// Header identifying the LRA context on participant callbacks.
pub const CONTEXT_HEADER: &str = "Long-Running-Action";

/// Header identifying the ended LRA on after-callbacks.
pub const ENDED_CONTEXT_HEADER: &str = "Long-Running-Action-Ended";

/// Query parameter naming the parent LRA of a nested start.
pub const PARENT_LRA_PARAM: &str = "ParentLRA";

/// API version reported when the client does not request one.
pub const CURRENT_API_VERSION: &str = "1.2";

/// All API versions this coordinator accepts.
pub const SUPPORTED_API_VERSIONS: &[&str] = &["1.0", "1.1", "1.2"];

/// Error raised when a string cannot be parsed as an LRA id.
#[derive(Debug, thiserror::Error)]
#[error("invalid LRA id '{0}'")]
pub struct InvalidLraId(pub String);

/// Absolute URI identifying a single LRA.
///
/// The identity is canonical: query and fragment are stripped on parse, so
/// the nested-id form `<id>?ParentLRA=<parent>` resolves to the same `LraId`
/// as the bare id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LraId(Url);

impl LraId {
    /// Mint a fresh id under the given coordinator base.
    pub fn mint(base: &Url) -> Self {
        let uid = Uuid::new_v4().to_string();
        let raw = format!("{}/{}", base.as_str().trim_end_matches('/'), uid);
        // base is a valid URL and the uid is URI-safe, so this cannot fail
        LraId(Url::parse(&raw).expect("minted LRA id is a valid URL"))
    }

    /// Parse an absolute LRA id, canonicalizing away query and fragment.
    pub fn parse(raw: &str) -> Result<Self, InvalidLraId> {
        let mut url = Url::parse(raw).map_err(|_| InvalidLraId(raw.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(InvalidLraId(raw.to_string()));
        }
        url.set_query(None);
        url.set_fragment(None);
        Ok(LraId(url))
    }

    /// Resolve a client-supplied id against a coordinator base.
    ///
    /// Absolute ids are taken as-is; a bare token is interpreted as a uid
    /// under the base, which is how unqualified path segments reach us.
    pub fn resolve(base: &Url, raw: &str) -> Result<Self, InvalidLraId> {
        if let Ok(id) = Self::parse(raw) {
            return Ok(id);
        }
        let candidate = format!("{}/{}", base.as_str().trim_end_matches('/'), raw);
        Url::parse(&candidate)
            .map(|mut url| {
                url.set_query(None);
                url.set_fragment(None);
                LraId(url)
            })
            .map_err(|_| InvalidLraId(raw.to_string()))
    }

    /// The coordinator base this id was minted under.
    ///
    /// Strips the trailing uid segment along with query and fragment. When
    /// the final segment is itself the coordinator path name the id is
    /// already a base and is returned unchanged.
    pub fn coordinator_base(&self) -> Url {
        let mut url = self.0.clone();
        url.set_query(None);
        url.set_fragment(None);
        let path = url.path().trim_end_matches('/').to_string();
        if let Some((prefix, last)) = path.rsplit_once('/') {
            if last != COORDINATOR_PATH && !prefix.is_empty() {
                url.set_path(prefix);
            }
        }
        url
    }

    /// The opaque uid segment of this id.
    pub fn uid(&self) -> &str {
        self.0
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or_default()
    }

    /// The published form of a nested id: `<id>?ParentLRA=<parent>`.
    pub fn with_parent(&self, parent: &LraId) -> String {
        let mut url = self.0.clone();
        url.query_pairs_mut()
            .append_pair(PARENT_LRA_PARAM, parent.as_str());
        url.to_string()
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The id as a URL.
    pub fn as_url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for LraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Build the recovery URI for one enlistment:
/// `<base>/recovery/<lra-uid>/<participant-uid>`.
pub fn recovery_uri(base: &Url, lra_uid: &str, participant_uid: &str) -> Url {
    let raw = format!(
        "{}/recovery/{}/{}",
        base.as_str().trim_end_matches('/'),
        lra_uid,
        participant_uid
    );
    Url::parse(&raw).expect("recovery URI is a valid URL")
}
