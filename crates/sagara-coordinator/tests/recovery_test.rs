// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Recovery tests: async participants driven to completion by status
//! polling, the recovery endpoint, and crash recovery over the file store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;

use common::{Behavior, CallLog, Script, TestContext, TestParticipant};
use sagara_coordinator::store::FileStore;

#[tokio::test]
async fn test_async_participant_completes_through_status_polling() {
    let ctx = TestContext::start().await;
    let log = CallLog::new();
    let participant = TestParticipant::start_scripted(
        "slow",
        log.clone(),
        Script {
            // the complete call is accepted but never finishes inline
            complete: Behavior::AcceptedThenOk(99),
            compensate: Behavior::Ok,
            status_accepted: 1,
        },
    )
    .await;

    let lra = ctx.start_lra("async").await;
    ctx.join(&lra, &participant.base).await;

    let response = ctx.close(&lra).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "Closing");

    assert!(
        ctx.wait_for_status(&lra, "Closed", Duration::from_secs(5)).await,
        "recovery should drive the participant to Completed via status polls"
    );
    assert!(participant.status_calls() >= 2);
    assert_eq!(participant.forget_calls(), 1);
    assert!(ctx.wait_until_unlisted(&lra, Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_recovery_endpoint_converges_to_empty() {
    let ctx = TestContext::start().await;
    let log = CallLog::new();
    let participant = TestParticipant::start_scripted(
        "flaky",
        log.clone(),
        Script {
            complete: Behavior::FailThenOk(2),
            compensate: Behavior::Ok,
            status_accepted: 0,
        },
    )
    .await;

    let lra = ctx.start_lra("recovering").await;
    ctx.join(&lra, &participant.base).await;

    let response = ctx.close(&lra).await;
    assert_eq!(response.text().await.unwrap(), "Closing");

    let recovering: Vec<String> = ctx
        .http
        .get(format!("{}/recovery", ctx.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(recovering.contains(&lra), "LRA should be in recovery");

    assert!(ctx.wait_for_status(&lra, "Closed", Duration::from_secs(5)).await);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let recovering: Vec<String> = ctx
            .http
            .get(format!("{}/recovery", ctx.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if recovering.is_empty() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "recovery list should drain, still: {recovering:?}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn test_started_lra_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = TestContext::with_store(Some(Arc::new(
        FileStore::open(dir.path()).await.unwrap(),
    )))
    .await;
    let lra = first.start_lra("durable").await;
    first.runtime.shutdown().await.unwrap();

    let second = TestContext::with_store(Some(Arc::new(
        FileStore::open(dir.path()).await.unwrap(),
    )))
    .await;

    // the recovery tick re-hydrates the record into the new registry
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let (code, body) = second.status(&lra).await;
        if code == StatusCode::OK {
            assert_eq!(body, "Active");
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "restarted coordinator should know the LRA"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn test_interrupted_close_is_redriven_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::new();
    let participant = TestParticipant::start_scripted(
        "hanging",
        log.clone(),
        Script {
            complete: Behavior::AlwaysFail,
            compensate: Behavior::Ok,
            status_accepted: 0,
        },
    )
    .await;

    let first = TestContext::with_store(Some(Arc::new(
        FileStore::open(dir.path()).await.unwrap(),
    )))
    .await;
    let lra = first.start_lra("crashed-close").await;
    first.join(&lra, &participant.base).await;

    let response = first.close(&lra).await;
    assert_eq!(response.text().await.unwrap(), "Closing");
    let calls_before = participant.complete_calls();
    assert!(calls_before >= 1);

    // "crash" the coordinator mid-close, then let the participant heal
    first.runtime.shutdown().await.unwrap();
    participant.set_complete(Behavior::Ok);

    let second = TestContext::with_store(Some(Arc::new(
        FileStore::open(dir.path()).await.unwrap(),
    )))
    .await;

    assert!(
        second.wait_for_status(&lra, "Closed", Duration::from_secs(5)).await,
        "recovery on the restarted coordinator should finish the close"
    );
    assert!(participant.complete_calls() > calls_before);
    assert!(second.wait_until_unlisted(&lra, Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_permanent_failure_moves_record_to_failed_kind() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::with_store(Some(Arc::new(
        FileStore::open(dir.path()).await.unwrap(),
    )))
    .await;
    let log = CallLog::new();
    let participant = TestParticipant::start_scripted(
        "broken",
        log.clone(),
        Script {
            complete: Behavior::Ok,
            compensate: Behavior::ReportFailed,
            status_accepted: 0,
        },
    )
    .await;

    let lra = ctx.start_lra("fails-compensation").await;
    ctx.join(&lra, &participant.base).await;

    let response = ctx.cancel(&lra).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "FailedToCancel");

    // terminal and sticky
    let (_, status) = ctx.status(&lra).await;
    assert_eq!(status, "FailedToCancel");
    assert_eq!(ctx.cancel(&lra).await.status(), StatusCode::GONE);

    // the record was reclassified for the operator, not deleted
    let uid = lra.rsplit('/').next().unwrap();
    assert!(dir
        .path()
        .join("FailedLongRunningAction")
        .join(uid)
        .exists());
    assert!(!dir.path().join("LongRunningAction").join(uid).exists());
}
