// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Object store interface and backends.
//!
//! Records are opaque byte strings keyed by `(RecordKind, uid)`. Backends
//! must give at-least-once durability: a successful [`ObjectStore::write`]
//! survives a process crash. [`ObjectStore::move_record`] reclassifies a
//! record atomically so a failed LRA never appears in neither kind.

pub mod file;
pub mod memory;
pub mod sql;

pub use self::file::FileStore;
pub use self::memory::MemoryStore;
pub use self::sql::SqlStore;

use async_trait::async_trait;

/// Type tag a record is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A live LRA record.
    LongRunningAction,
    /// An LRA whose end phase declared permanent failure.
    FailedLongRunningAction,
}

impl RecordKind {
    /// The kind name used in persisted layouts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LongRunningAction => "LongRunningAction",
            Self::FailedLongRunningAction => "FailedLongRunningAction",
        }
    }

    /// Parse a persisted kind name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LongRunningAction" => Some(Self::LongRunningAction),
            "FailedLongRunningAction" => Some(Self::FailedLongRunningAction),
            _ => None,
        }
    }
}

/// Store errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The record to move or remove does not exist.
    #[error("record {kind}/{uid} not found")]
    NotFound {
        /// Kind the record was looked up under.
        kind: &'static str,
        /// The missing uid.
        uid: String,
    },
}

/// Result type using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistent key-value store keyed by `(kind, uid)`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Atomically replace the record at `(kind, uid)`.
    async fn write(&self, kind: RecordKind, uid: &str, bytes: &[u8]) -> Result<()>;

    /// Read the record at `(kind, uid)`, if present.
    async fn read(&self, kind: RecordKind, uid: &str) -> Result<Option<Vec<u8>>>;

    /// Remove the record at `(kind, uid)`. Removing an absent record is not
    /// an error; the caller only cares that it is gone.
    async fn remove(&self, kind: RecordKind, uid: &str) -> Result<()>;

    /// List the uids stored under `kind`.
    async fn list(&self, kind: RecordKind) -> Result<Vec<String>>;

    /// Atomically rename a record from one kind to another.
    async fn move_record(&self, from: RecordKind, to: RecordKind, uid: &str) -> Result<()>;
}
