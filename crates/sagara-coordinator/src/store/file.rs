// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! File-backed store backend.
//!
//! One file per record under `<root>/<kind>/<uid>`. Writes go through a
//! temporary file followed by a rename so a crash never leaves a torn
//! record, and `move_record` is a rename between kind directories on the
//! same filesystem.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::{ObjectStore, RecordKind, Result, StoreError};

const TMP_SUFFIX: &str = ".tmp";

/// Store backend persisting each record as a file.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the kind directories.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for kind in [
            RecordKind::LongRunningAction,
            RecordKind::FailedLongRunningAction,
        ] {
            fs::create_dir_all(root.join(kind.as_str())).await?;
        }
        Ok(Self { root })
    }

    fn record_path(&self, kind: RecordKind, uid: &str) -> PathBuf {
        self.root.join(kind.as_str()).join(uid)
    }
}

#[async_trait]
impl ObjectStore for FileStore {
    async fn write(&self, kind: RecordKind, uid: &str, bytes: &[u8]) -> Result<()> {
        let path = self.record_path(kind, uid);
        let tmp = self.record_path(kind, &format!("{uid}{TMP_SUFFIX}"));
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn read(&self, kind: RecordKind, uid: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.record_path(kind, uid)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, kind: RecordKind, uid: &str) -> Result<()> {
        match fs::remove_file(self.record_path(kind, uid)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, kind: RecordKind) -> Result<Vec<String>> {
        let mut uids = Vec::new();
        let mut entries = fs::read_dir(self.root.join(kind.as_str())).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(TMP_SUFFIX) {
                continue; // torn write left behind by a crash
            }
            uids.push(name.to_string());
        }
        uids.sort_unstable();
        Ok(uids)
    }

    async fn move_record(&self, from: RecordKind, to: RecordKind, uid: &str) -> Result<()> {
        match fs::rename(self.record_path(from, uid), self.record_path(to, uid)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                kind: from.as_str(),
                uid: uid.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let (_dir, store) = open_store().await;
        store
            .write(RecordKind::LongRunningAction, "a", b"payload")
            .await
            .unwrap();
        let read = store
            .read(RecordKind::LongRunningAction, "a")
            .await
            .unwrap();
        assert_eq!(read.as_deref(), Some(&b"payload"[..]));
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).await.unwrap();
            store
                .write(RecordKind::LongRunningAction, "a", b"durable")
                .await
                .unwrap();
        }
        let store = FileStore::open(dir.path()).await.unwrap();
        let read = store
            .read(RecordKind::LongRunningAction, "a")
            .await
            .unwrap();
        assert_eq!(read.as_deref(), Some(&b"durable"[..]));
    }

    #[tokio::test]
    async fn test_list_skips_temp_files() {
        let (dir, store) = open_store().await;
        store
            .write(RecordKind::LongRunningAction, "a", b"x")
            .await
            .unwrap();
        std::fs::write(
            dir.path().join("LongRunningAction").join("b.tmp"),
            b"torn",
        )
        .unwrap();
        assert_eq!(
            store.list(RecordKind::LongRunningAction).await.unwrap(),
            vec!["a".to_string()]
        );
    }

    #[tokio::test]
    async fn test_move_record_reclassifies() {
        let (_dir, store) = open_store().await;
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
        assert_eq!(
            store
                .list(RecordKind::FailedLongRunningAction)
                .await
                .unwrap(),
            vec!["a".to_string()]
        );
    }

    #[tokio::test]
    async fn test_move_missing_record_fails() {
        let (_dir, store) = open_store().await;
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
}
