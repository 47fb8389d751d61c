// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The end-phase driver.
//!
//! Given an LRA in `Closing` or `Cancelling`, drives every participant to a
//! terminal state: children first (depth-first), then completion callbacks
//! in enlistment order or compensation callbacks in reverse enlistment
//! order. Participant HTTP calls happen outside the per-LRA lock; each
//! result is applied under the lock against the live record so that a
//! concurrent leave or crash-recovered state cannot be clobbered.
//!
//! A per-LRA guard flag keeps this to at most one running driver per LRA.
//! The driver never sleeps to retry: anything retryable is left in place
//! for the next recovery pass.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::StatusCode;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{CoordinatorError, Result};
use crate::id::{LraId, CONTEXT_HEADER, ENDED_CONTEXT_HEADER};
use crate::lra::{now_millis, Lra, LraStatus};
use crate::participant::{Participant, ParticipantState};
use crate::service::CoordinatorService;
use crate::store::RecordKind;

/// Outcome of one callback attempt against a participant.
enum CallResult {
    /// The participant reached the given terminal state.
    Finished(ParticipantState),
    /// 202: the participant is still working; poll its status later.
    InProgress,
    /// Retryable failure; leave the state as it is for recovery.
    Retry,
}

/// Drive the end phase of one LRA and return its status afterwards.
///
/// Safe to call on an LRA in any state: anything that has no outstanding
/// end-phase work returns its current status untouched.
pub(crate) fn drive<'a>(
    svc: &'a CoordinatorService,
    uid: &'a str,
) -> Pin<Box<dyn Future<Output = Result<LraStatus>> + Send + 'a>> {
    Box::pin(async move {
        let Some(entry) = svc.entry(uid).await else {
            return Err(CoordinatorError::LraNotFound {
                lra_id: uid.to_string(),
            });
        };

        let (lra_id, status, children) = {
            let mut lra = entry.lock().await;
            if lra.driving {
                // another driver owns this LRA right now
                return Ok(lra.status);
            }
            match lra.status {
                LraStatus::Active => return Ok(LraStatus::Active),
                LraStatus::FailedToClose | LraStatus::FailedToCancel => return Ok(lra.status),
                LraStatus::Closed | LraStatus::Cancelled if !lra.is_recovering() => {
                    return Ok(lra.status)
                }
                _ => {}
            }
            lra.driving = true;
            (lra.id.clone(), lra.status, lra.children.clone())
        };

        let result = run(svc, uid, &entry, &lra_id, status, children).await;
        entry.lock().await.driving = false;
        result
    })
}

async fn run(
    svc: &CoordinatorService,
    uid: &str,
    entry: &Arc<Mutex<Lra>>,
    lra_id: &LraId,
    status: LraStatus,
    children: Vec<LraId>,
) -> Result<LraStatus> {
    let mut cancelling = status == LraStatus::Cancelling;

    let final_status = if status.is_terminal() {
        // re-entered only to finish delivering after-callbacks
        status
    } else {
        // 1. children first, depth-first; a cancelled child forces the
        //    parent into the cancel phase
        for child in &children {
            let child_uid = child.uid().to_string();
            let Some(child_entry) = svc.entry(&child_uid).await else {
                continue;
            };
            {
                let mut c = child_entry.lock().await;
                if c.status == LraStatus::Active {
                    c.status = if cancelling {
                        LraStatus::Cancelling
                    } else {
                        LraStatus::Closing
                    };
                    c.finish_time = now_millis();
                    svc.persist(&c).await?;
                }
            }
            let child_status = drive(svc, &child_uid).await?;
            if !cancelling
                && matches!(
                    child_status,
                    LraStatus::Cancelling | LraStatus::Cancelled | LraStatus::FailedToCancel
                )
            {
                let mut lra = entry.lock().await;
                if lra.status == LraStatus::Closing {
                    info!(lra_id = %lra_id, child = %child, "child cancelled, cancelling parent");
                    lra.status = LraStatus::Cancelling;
                    svc.persist(&lra).await?;
                }
                cancelling = true;
            }
        }

        // 2. participants: completion forward, compensation in reverse
        //    enlistment order
        let participants: Vec<Participant> = entry.lock().await.participants.clone();
        let order: Vec<usize> = if cancelling {
            (0..participants.len()).rev().collect()
        } else {
            (0..participants.len()).collect()
        };
        for idx in order {
            let participant = &participants[idx];
            if participant.state.is_terminal() {
                continue;
            }
            let result = call_participant(svc, participant, lra_id, cancelling).await;
            let next = match result {
                CallResult::Finished(state) => Some(state),
                CallResult::InProgress => Some(if cancelling {
                    ParticipantState::Compensating
                } else {
                    ParticipantState::Completing
                }),
                CallResult::Retry => None,
            };
            if let Some(next) = next {
                let mut lra = entry.lock().await;
                if let Some(live) = lra
                    .participants
                    .iter_mut()
                    .find(|p| p.uid == participant.uid)
                {
                    live.transition(next);
                }
            }
        }

        // 3. account for the pass
        let mut lra = entry.lock().await;
        if matches!(lra.status, LraStatus::Closing | LraStatus::Cancelling) {
            let all_terminal = lra.participants.iter().all(|p| p.state.is_terminal());
            let any_failed = lra.participants.iter().any(|p| p.state.is_failed());
            if all_terminal {
                lra.status = match (lra.status, any_failed) {
                    (LraStatus::Closing, false) => LraStatus::Closed,
                    (LraStatus::Closing, true) => LraStatus::FailedToClose,
                    (LraStatus::Cancelling, false) => LraStatus::Cancelled,
                    (LraStatus::Cancelling, true) => LraStatus::FailedToCancel,
                    (other, _) => other,
                };
                lra.finish_time = now_millis();
            }
        }
        let status = lra.status;
        drop(lra);

        if status.is_failed() {
            // reclassify before refreshing the payload so the record never
            // disappears from both kinds
            svc.store
                .move_record(
                    RecordKind::LongRunningAction,
                    RecordKind::FailedLongRunningAction,
                    uid,
                )
                .await?;
            warn!(lra_id = %lra_id, status = status.as_str(), "end phase failed permanently");
        }
        {
            let lra = entry.lock().await;
            svc.persist(&lra).await?;
        }
        status
    };

    if !final_status.is_terminal() {
        // retryable work remains; the recovery scanner owns it now
        debug!(lra_id = %lra_id, status = final_status.as_str(), "end phase incomplete");
        return Ok(final_status);
    }

    // 4. after-callbacks are best-effort for every terminal outcome,
    //    retried by recovery while undelivered
    deliver_after_callbacks(svc, entry, lra_id, final_status).await;

    let recovering = entry.lock().await.is_recovering();
    if recovering || final_status.is_failed() {
        let lra = entry.lock().await;
        svc.persist(&lra).await?;
    } else {
        // fully finished: the record leaves the store; the registry keeps
        // the terminal entry so later reads still observe the outcome
        svc.store
            .remove(RecordKind::LongRunningAction, uid)
            .await?;
        info!(lra_id = %lra_id, status = final_status.as_str(), "LRA finished");
    }

    Ok(final_status)
}

/// Invoke the appropriate callback for one participant, outside any lock.
async fn call_participant(
    svc: &CoordinatorService,
    participant: &Participant,
    lra_id: &LraId,
    cancelling: bool,
) -> CallResult {
    match participant.state {
        ParticipantState::Active => {
            let endpoint = if cancelling {
                &participant.endpoints.compensate
            } else {
                &participant.endpoints.complete
            };
            match endpoint {
                Some(url) => call_end_phase(svc, url, participant, lra_id, cancelling).await,
                // nothing to call: trivially terminal in this phase
                None => CallResult::Finished(done_state(cancelling)),
            }
        }
        ParticipantState::Completing | ParticipantState::Compensating => {
            match &participant.endpoints.status {
                Some(url) => poll_status(svc, url, participant, lra_id, cancelling).await,
                None => {
                    // no status endpoint: repeat the end-phase call
                    let endpoint = if cancelling {
                        &participant.endpoints.compensate
                    } else {
                        &participant.endpoints.complete
                    };
                    match endpoint {
                        Some(url) => call_end_phase(svc, url, participant, lra_id, cancelling).await,
                        None => CallResult::Finished(done_state(cancelling)),
                    }
                }
            }
        }
        // terminal states are filtered out by the caller
        _ => CallResult::Finished(participant.state),
    }
}

/// PUT the complete or compensate endpoint and interpret the response.
async fn call_end_phase(
    svc: &CoordinatorService,
    url: &Url,
    participant: &Participant,
    lra_id: &LraId,
    cancelling: bool,
) -> CallResult {
    let mut request = svc
        .http
        .put(url.clone())
        .header(CONTEXT_HEADER, lra_id.as_str());
    if let Some(data) = &participant.user_data {
        request = request.body(data.clone());
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            debug!(url = %url, error = %e, "end-phase call failed");
            return CallResult::Retry;
        }
    };

    match response.status() {
        StatusCode::ACCEPTED => CallResult::InProgress,
        // 410 means the participant already forgot this LRA
        StatusCode::GONE => CallResult::Finished(done_state(cancelling)),
        code if code.is_success() => {
            let body = response.text().await.unwrap_or_default();
            match ParticipantState::parse(body.trim()) {
                Some(state) if state.is_terminal() => CallResult::Finished(state),
                Some(_) => CallResult::InProgress,
                None => CallResult::Finished(done_state(cancelling)),
            }
        }
        code => {
            debug!(url = %url, %code, "end-phase call rejected");
            CallResult::Retry
        }
    }
}

/// GET the status endpoint of an in-progress participant.
async fn poll_status(
    svc: &CoordinatorService,
    url: &Url,
    participant: &Participant,
    lra_id: &LraId,
    cancelling: bool,
) -> CallResult {
    let response = match svc
        .http
        .get(url.clone())
        .header(CONTEXT_HEADER, lra_id.as_str())
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            debug!(url = %url, error = %e, "status poll failed");
            return CallResult::Retry;
        }
    };

    match response.status() {
        StatusCode::ACCEPTED => CallResult::InProgress,
        // the participant no longer knows the LRA: it is lost
        StatusCode::NOT_FOUND => CallResult::Finished(failed_state(cancelling)),
        code if code.is_success() => {
            let body = response.text().await.unwrap_or_default();
            match ParticipantState::parse(body.trim()) {
                Some(state) if state.is_terminal() => {
                    forget(svc, participant, lra_id).await;
                    CallResult::Finished(state)
                }
                _ => CallResult::Retry,
            }
        }
        _ => CallResult::Retry,
    }
}

/// Tell a finished participant it can drop its state. Best-effort.
async fn forget(svc: &CoordinatorService, participant: &Participant, lra_id: &LraId) {
    let Some(url) = &participant.endpoints.forget else {
        return;
    };
    let result = svc
        .http
        .delete(url.clone())
        .header(CONTEXT_HEADER, lra_id.as_str())
        .send()
        .await;
    if let Err(e) = result {
        debug!(url = %url, error = %e, "forget call failed");
    }
}

/// Deliver pending after-callbacks, marking each delivered one.
async fn deliver_after_callbacks(
    svc: &CoordinatorService,
    entry: &Arc<Mutex<Lra>>,
    lra_id: &LraId,
    final_status: LraStatus,
) {
    let pending: Vec<Participant> = {
        let lra = entry.lock().await;
        lra.participants
            .iter()
            .filter(|p| !p.after_delivered())
            .cloned()
            .collect()
    };

    for participant in pending {
        let Some(url) = &participant.endpoints.after else {
            continue;
        };
        let delivered = svc
            .http
            .put(url.clone())
            .header(ENDED_CONTEXT_HEADER, lra_id.as_str())
            .body(final_status.as_str())
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false);
        if delivered {
            let mut lra = entry.lock().await;
            if let Some(live) = lra
                .participants
                .iter_mut()
                .find(|p| p.uid == participant.uid)
            {
                live.after_done = true;
            }
        } else {
            debug!(url = %url, "after-callback not delivered");
        }
    }
}

fn done_state(cancelling: bool) -> ParticipantState {
    if cancelling {
        ParticipantState::Compensated
    } else {
        ParticipantState::Completed
    }
}

fn failed_state(cancelling: bool) -> ParticipantState {
    if cancelling {
        ParticipantState::FailedToCompensate
    } else {
        ParticipantState::FailedToComplete
    }
}
