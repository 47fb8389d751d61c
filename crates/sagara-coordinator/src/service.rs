// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The coordinator engine: the in-memory LRA registry and the public
//! lifecycle operations.
//!
//! The registry maps LRA uids to shared entries behind a read-mostly lock;
//! each entry carries its own mutex that serializes every mutation of that
//! LRA. Registry and entry locks are never held together in the direction
//! entry-then-registry, and nested LRAs are always locked parent before
//! child, so lock acquisition cannot cycle.
//!
//! Every state transition is written through to the object store before it
//! is acknowledged to the caller.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::driver;
use crate::error::{CoordinatorError, Result};
use crate::id::{recovery_uri, LraId};
use crate::lra::{now_millis, Lra, LraData, LraStatus};
use crate::participant::{Endpoints, EnlistError, Participant};
use crate::store::{ObjectStore, RecordKind};

/// The coordinator engine.
///
/// Owns the in-memory registry of active LRAs and orchestrates the
/// start/join/leave/close/cancel/status/renew verbs.
pub struct CoordinatorService {
    base: Url,
    pub(crate) store: Arc<dyn ObjectStore>,
    registry: RwLock<HashMap<String, Arc<Mutex<Lra>>>>,
    pub(crate) http: reqwest::Client,
    // handle back to the owning Arc, for spawning deadline watchers
    weak: Weak<CoordinatorService>,
}

impl CoordinatorService {
    /// Create an engine minting ids under `base` and persisting to `store`.
    ///
    /// `http` is the client used for participant callbacks; it should carry
    /// the configured per-call timeout.
    pub fn new(base: Url, store: Arc<dyn ObjectStore>, http: reqwest::Client) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            base,
            store,
            registry: RwLock::new(HashMap::new()),
            http,
            weak: weak.clone(),
        })
    }

    /// The coordinator base minted ids live under.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve a client-supplied id string against this coordinator's base.
    fn resolve(&self, raw: &str) -> Result<LraId> {
        LraId::resolve(&self.base, raw).map_err(|_| CoordinatorError::LraNotFound {
            lra_id: raw.to_string(),
        })
    }

    pub(crate) async fn entry(&self, uid: &str) -> Option<Arc<Mutex<Lra>>> {
        self.registry.read().await.get(uid).cloned()
    }

    pub(crate) async fn entries(&self) -> Vec<(String, Arc<Mutex<Lra>>)> {
        self.registry
            .read()
            .await
            .iter()
            .map(|(uid, entry)| (uid.clone(), entry.clone()))
            .collect()
    }

    async fn lookup(&self, raw: &str) -> Result<(LraId, Arc<Mutex<Lra>>)> {
        let id = self.resolve(raw)?;
        let entry = self
            .entry(id.uid())
            .await
            .ok_or_else(|| CoordinatorError::LraNotFound {
                lra_id: id.to_string(),
            })?;
        Ok((id, entry))
    }

    /// Write an LRA through to the store. Failed LRAs land under the failed
    /// record kind, everything else under the live kind.
    pub(crate) async fn persist(&self, lra: &Lra) -> Result<()> {
        let kind = if lra.status.is_failed() {
            RecordKind::FailedLongRunningAction
        } else {
            RecordKind::LongRunningAction
        };
        let bytes = lra.encode()?;
        self.store.write(kind, lra.id.uid(), &bytes).await?;
        Ok(())
    }

    /// Put a record loaded from the store back into the registry unless a
    /// live entry already exists. Used by the recovery scanner.
    pub(crate) async fn rehydrate(&self, lra: Lra) {
        let uid = lra.id.uid().to_string();
        let mut registry = self.registry.write().await;
        registry
            .entry(uid)
            .or_insert_with(|| Arc::new(Mutex::new(lra)));
    }

    /// Drop entries from the registry, e.g. to undo a partial start.
    pub(crate) async fn purge(&self, uids: &[String]) {
        if uids.is_empty() {
            return;
        }
        let mut registry = self.registry.write().await;
        for uid in uids {
            registry.remove(uid);
        }
    }

    // ========================================================================
    // Public lifecycle operations
    // ========================================================================

    /// Begin a new LRA, optionally nested under `parent`.
    ///
    /// The record is persisted before this returns. A positive `time_limit`
    /// in milliseconds arms an asynchronous cancel at the deadline.
    /// Returns the new id together with the resolved parent id, which the
    /// API surface needs for the published nested-id form.
    pub async fn start_lra(
        &self,
        client_id: &str,
        time_limit: i64,
        parent: Option<&str>,
    ) -> Result<(LraId, Option<LraId>)> {
        let parent_link = match parent.filter(|p| !p.trim().is_empty()) {
            Some(raw) => {
                let pid = self
                    .resolve(raw)
                    .map_err(|_| CoordinatorError::ParentNotFound {
                        parent_id: raw.to_string(),
                    })?;
                let entry =
                    self.entry(pid.uid())
                        .await
                        .ok_or_else(|| CoordinatorError::ParentNotFound {
                            parent_id: pid.to_string(),
                        })?;
                Some((pid, entry))
            }
            None => None,
        };

        let id = LraId::mint(&self.base);
        let parent_id = parent_link.as_ref().map(|(pid, _)| pid.clone());
        let lra = Lra::new(
            id.clone(),
            client_id.to_string(),
            parent_id.clone(),
            time_limit,
        );
        let deadline = lra.deadline;

        self.persist(&lra).await?;
        self.registry
            .write()
            .await
            .insert(id.uid().to_string(), Arc::new(Mutex::new(lra)));

        if let Some((pid, entry)) = parent_link {
            let mut parent = entry.lock().await;
            let parent_status = parent.status;
            if parent_status != LraStatus::Active {
                drop(parent);
                // the parent finished while we were setting up; undo
                self.purge(&[id.uid().to_string()]).await;
                self.store
                    .remove(RecordKind::LongRunningAction, id.uid())
                    .await?;
                return Err(CoordinatorError::Terminal {
                    lra_id: pid.to_string(),
                    status: parent_status,
                });
            }
            parent.children.push(id.clone());
            self.persist(&parent).await?;
        }

        if deadline > 0 {
            self.watch_deadline(id.uid().to_string(), deadline);
        }

        info!(lra_id = %id, client_id, time_limit, "LRA started");
        Ok((id, parent_id))
    }

    /// Update the deadline of an LRA. Zero or negative disables it.
    pub async fn renew(&self, raw: &str, time_limit: i64) -> Result<LraId> {
        let (id, entry) = self.lookup(raw).await?;
        let deadline = {
            let mut lra = entry.lock().await;
            if lra.status.is_terminal() {
                return Err(CoordinatorError::Terminal {
                    lra_id: id.to_string(),
                    status: lra.status,
                });
            }
            lra.set_time_limit(time_limit);
            self.persist(&lra).await?;
            lra.deadline
        };
        if deadline > 0 {
            self.watch_deadline(id.uid().to_string(), deadline);
        }
        debug!(lra_id = %id, time_limit, "time limit renewed");
        Ok(id)
    }

    /// Enlist a participant.
    ///
    /// `link_header` takes precedence; without it a non-empty `body` is
    /// treated as the participant base URI. Returns the recovery URI
    /// assigned to the enlistment.
    pub async fn join(
        &self,
        raw: &str,
        link_header: Option<&str>,
        body: Option<&str>,
        time_limit: i64,
        user_data: Option<String>,
    ) -> Result<Url> {
        let (id, entry) = self.lookup(raw).await?;
        let map_enlist = |e: EnlistError| match e {
            EnlistError::MalformedLink(_) => CoordinatorError::MalformedLink {
                lra_id: id.to_string(),
            },
            EnlistError::MissingCompensate => CoordinatorError::MissingCompensate {
                lra_id: id.to_string(),
            },
            EnlistError::InvalidUri(uri) => CoordinatorError::InvalidParticipantUri {
                lra_id: id.to_string(),
                uri,
            },
        };

        let body = body.map(str::trim).filter(|b| !b.is_empty());
        let (endpoints, source) = match link_header {
            Some(header) => (Endpoints::from_link_header(header).map_err(map_enlist)?, None),
            None => match body {
                Some(b) => (
                    Endpoints::from_base(b).map_err(map_enlist)?,
                    Url::parse(b).ok(),
                ),
                None => (Endpoints::empty(), None),
            },
        };

        let mut lra = entry.lock().await;
        if lra.status != LraStatus::Active {
            return Err(CoordinatorError::Terminal {
                lra_id: id.to_string(),
                status: lra.status,
            });
        }
        let participant_uid = Uuid::new_v4().to_string();
        let recovery = recovery_uri(&self.base, id.uid(), &participant_uid);
        lra.participants.push(Participant::new(
            participant_uid,
            recovery.clone(),
            source,
            endpoints,
            time_limit,
            user_data,
        ));
        self.persist(&lra).await?;
        debug!(lra_id = %id, recovery_id = %recovery, "participant joined");
        Ok(recovery)
    }

    /// Remove an enlistment, identified by its recovery URI or by the URL
    /// it enlisted with.
    pub async fn leave(&self, raw: &str, participant: &str) -> Result<()> {
        let (id, entry) = self.lookup(raw).await?;
        let mut lra = entry.lock().await;
        let target = participant.trim();
        match lra.participants.iter().position(|p| p.matches(target)) {
            Some(idx) => {
                lra.participants.remove(idx);
                self.persist(&lra).await?;
                debug!(lra_id = %id, participant = target, "participant left");
                Ok(())
            }
            None => Err(CoordinatorError::ParticipantNotFound {
                lra_id: id.to_string(),
                participant: target.to_string(),
            }),
        }
    }

    /// Close the LRA: drive the complete phase and return the status after
    /// the first drive pass.
    pub async fn close(&self, raw: &str) -> Result<LraStatus> {
        self.finish(raw, false).await
    }

    /// Cancel the LRA: drive the compensate phase and return the status
    /// after the first drive pass.
    pub async fn cancel(&self, raw: &str) -> Result<LraStatus> {
        self.finish(raw, true).await
    }

    async fn finish(&self, raw: &str, cancel: bool) -> Result<LraStatus> {
        let (id, entry) = self.lookup(raw).await?;
        {
            let mut lra = entry.lock().await;
            if lra.status != LraStatus::Active {
                return Err(CoordinatorError::Terminal {
                    lra_id: id.to_string(),
                    status: lra.status,
                });
            }
            lra.status = if cancel {
                LraStatus::Cancelling
            } else {
                LraStatus::Closing
            };
            lra.finish_time = now_millis();
            self.persist(&lra).await?;
        }
        info!(lra_id = %id, cancel, "end phase started");
        driver::drive(self, id.uid()).await
    }

    /// Current status of an LRA.
    pub async fn get_status(&self, raw: &str) -> Result<LraStatus> {
        let (_, entry) = self.lookup(raw).await?;
        let lra = entry.lock().await;
        Ok(lra.status)
    }

    /// Wire snapshot of an LRA.
    pub async fn get_info(&self, raw: &str) -> Result<LraData> {
        let (_, entry) = self.lookup(raw).await?;
        let lra = entry.lock().await;
        Ok(lra.data())
    }

    /// Snapshot all known LRAs, optionally filtered by status.
    ///
    /// The view is not point-in-time consistent across LRAs; each element
    /// is individually consistent. Without a filter, finished top-level
    /// LRAs are omitted; finished nested LRAs remain visible until their
    /// parent completes.
    pub async fn list_lras(&self, filter: Option<&str>) -> Result<Vec<LraData>> {
        let wanted = match filter.map(str::trim).filter(|f| !f.is_empty()) {
            Some(value) => Some(LraStatus::parse(value).ok_or_else(|| {
                CoordinatorError::InvalidStatusFilter {
                    value: value.to_string(),
                }
            })?),
            None => None,
        };

        let entries = self.entries().await;
        let mut snapshots = Vec::with_capacity(entries.len());
        for (uid, entry) in entries {
            let lra = entry.lock().await;
            snapshots.push((uid, lra.parent_id.clone(), lra.data()));
        }
        let status_by_uid: HashMap<&str, LraStatus> = snapshots
            .iter()
            .map(|(uid, _, data)| (uid.as_str(), data.status))
            .collect();

        let mut out = Vec::with_capacity(snapshots.len());
        for (_, parent_id, data) in &snapshots {
            let include = match wanted {
                Some(status) => data.status == status,
                // finished LRAs stay visible only while a live parent still
                // accounts for them
                None => {
                    !data.status.is_terminal()
                        || parent_id
                            .as_ref()
                            .and_then(|pid| status_by_uid.get(pid.uid()))
                            .is_some_and(|parent_status| !parent_status.is_terminal())
                }
            };
            if include {
                out.push(data.clone());
            }
        }
        Ok(out)
    }

    /// Ids of LRAs whose end phase still has outstanding work.
    pub async fn recovering_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for (_, entry) in self.entries().await {
            let lra = entry.lock().await;
            if lra.is_recovering() {
                ids.push(lra.id.to_string());
            }
        }
        ids.sort_unstable();
        ids
    }

    // ========================================================================
    // Deadline handling
    // ========================================================================

    /// Arm a one-shot watcher that cancels the LRA once `deadline` passes.
    /// A renew arms a fresh watcher; stale watchers notice the deadline
    /// moved and do nothing.
    fn watch_deadline(&self, uid: String, deadline: i64) {
        let Some(svc) = self.weak.upgrade() else {
            return; // engine is shutting down
        };
        tokio::spawn(async move {
            let wait = deadline.saturating_sub(now_millis()).max(0) as u64;
            tokio::time::sleep(Duration::from_millis(wait)).await;
            svc.cancel_expired(&uid).await;
        });
    }

    /// Cancel an LRA whose deadline has passed. Competes with explicit
    /// close/cancel through the per-LRA lock, so a lost race is a no-op.
    pub(crate) async fn cancel_expired(&self, uid: &str) {
        let Some(entry) = self.entry(uid).await else {
            return;
        };
        {
            let mut lra = entry.lock().await;
            if !lra.deadline_expired(now_millis()) {
                return;
            }
            lra.status = LraStatus::Cancelling;
            lra.finish_time = now_millis();
            if let Err(e) = self.persist(&lra).await {
                warn!(uid, error = %e, "failed to persist deadline cancel");
                return;
            }
            info!(lra_id = %lra.id, "deadline expired, cancelling");
        }
        if let Err(e) = driver::drive(self, uid).await {
            warn!(uid, error = %e, "deadline-triggered cancel failed");
        }
    }
}
