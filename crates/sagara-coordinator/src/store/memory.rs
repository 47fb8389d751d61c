// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Volatile in-memory store backend.
//!
//! Survives nothing, but gives the full store contract for embedded use
//! and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ObjectStore, RecordKind, Result, StoreError};

/// In-memory store backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(RecordKind, String), Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn write(&self, kind: RecordKind, uid: &str, bytes: &[u8]) -> Result<()> {
        self.records
            .write()
            .await
            .insert((kind, uid.to_string()), bytes.to_vec());
        Ok(())
    }

    async fn read(&self, kind: RecordKind, uid: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .records
            .read()
            .await
            .get(&(kind, uid.to_string()))
            .cloned())
    }

    async fn remove(&self, kind: RecordKind, uid: &str) -> Result<()> {
        self.records.write().await.remove(&(kind, uid.to_string()));
        Ok(())
    }

    async fn list(&self, kind: RecordKind) -> Result<Vec<String>> {
        let records = self.records.read().await;
        let mut uids: Vec<String> = records
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, uid)| uid.clone())
            .collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn move_record(&self, from: RecordKind, to: RecordKind, uid: &str) -> Result<()> {
        let mut records = self.records.write().await;
        let bytes = records
            .remove(&(from, uid.to_string()))
            .ok_or_else(|| StoreError::NotFound {
                kind: from.as_str(),
                uid: uid.to_string(),
            })?;
        records.insert((to, uid.to_string()), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let store = MemoryStore::new();
        store
            .write(RecordKind::LongRunningAction, "a", b"payload")
            .await
            .unwrap();
        let read = store
            .read(RecordKind::LongRunningAction, "a")
            .await
            .unwrap();
        assert_eq!(read.as_deref(), Some(&b"payload"[..]));
        assert!(store
            .read(RecordKind::FailedLongRunningAction, "a")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_write_replaces() {
        let store = MemoryStore::new();
        store
            .write(RecordKind::LongRunningAction, "a", b"v1")
            .await
            .unwrap();
        store
            .write(RecordKind::LongRunningAction, "a", b"v2")
            .await
            .unwrap();
        let read = store
            .read(RecordKind::LongRunningAction, "a")
            .await
            .unwrap();
        assert_eq!(read.as_deref(), Some(&b"v2"[..]));
    }

    #[tokio::test]
    async fn test_list_is_per_kind() {
        let store = MemoryStore::new();
        store
            .write(RecordKind::LongRunningAction, "b", b"x")
            .await
            .unwrap();
        store
            .write(RecordKind::LongRunningAction, "a", b"x")
            .await
            .unwrap();
        store
            .write(RecordKind::FailedLongRunningAction, "c", b"x")
            .await
            .unwrap();
        assert_eq!(
            store.list(RecordKind::LongRunningAction).await.unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(
            store
                .list(RecordKind::FailedLongRunningAction)
                .await
                .unwrap(),
            vec!["c".to_string()]
        );
    }

    #[tokio::test]
    async fn test_move_record_reclassifies() {
        let store = MemoryStore::new();
        store
            .write(RecordKind::LongRunningAction, "a", b"x")
            .await
            .unwrap();
        store
            .move_record(
                RecordKind::LongRunningAction,
                RecordKind::FailedLongRunningAction,
                "a",
            )
            .await
            .unwrap();
        assert!(store
            .read(RecordKind::LongRunningAction, "a")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .read(RecordKind::FailedLongRunningAction, "a")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_move_missing_record_fails() {
        let store = MemoryStore::new();
        let err = store
            .move_record(
                RecordKind::LongRunningAction,
                RecordKind::FailedLongRunningAction,
                "ghost",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = MemoryStore::new();
        store.remove(RecordKind::LongRunningAction, "ghost").await.unwrap();
        store
            .write(RecordKind::LongRunningAction, "a", b"x")
            .await
            .unwrap();
        store.remove(RecordKind::LongRunningAction, "a").await.unwrap();
        assert!(store
            .read(RecordKind::LongRunningAction, "a")
            .await
            .unwrap()
            .is_none());
    }
}
