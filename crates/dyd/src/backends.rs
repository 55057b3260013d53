//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 Tables pour the data out, blob stores hold it, and later the whole thing
//! runs in reverse. In between, we don't panic (we use `Result`).
//!
//! 🎭 This module is the casting agency. Need a DynamoDB table? An S3 bucket?
//! A table that lives entirely in RAM and throttles on command for the tests?
//! We've got a backend for that.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls → `*Backend` enum dispatcher. Same shape for both traits.
//! - `Table`: `scan_page` (export side), `write_batch` + `describe` (restore side).
//! - `BlobStore`: `put_object`, `get_object`, `object_exists`. Bucket is always explicit,
//!   because restore follows whatever bucket the manifest points at.
//! - Backends report `BackendError`. Throttling is its own variant so the workers can
//!   retry it; everything else is fatal upstream.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use async_trait::async_trait;
use thiserror::Error;

use crate::record::Record;

pub mod dynamo;
pub mod in_mem;
pub mod s3;

/// 💀 What a backend can tell us about a failed call.
#[derive(Debug, Error)]
pub enum BackendError {
    /// 🐢 The service asked us to slow down. The only failure worth waiting out.
    #[error("throttled: {0}")]
    Throttled(String),

    /// 📡 Anything else the service or the network threw at us.
    #[error("{message}")]
    Service {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl BackendError {
    pub(crate) fn service(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        BackendError::Service {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn is_throttling(&self) -> bool {
        matches!(self, BackendError::Throttled(_))
    }
}

/// 📄 One page of a scan: the records, plus where to resume (`None` = last page).
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ScanPage {
    pub records: Vec<Record>,
    pub last_evaluated_key: Option<Record>,
}

/// 🩺 What the restore gate learns about the destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableState {
    Missing,
    NotActive { status: String },
    Active { item_count: i64 },
}

// ===== Table Trait and Backend Enum =====

/// 🗄️ A key-value table that can be scanned, written in batches, and described.
///
/// # Contract 📜
/// - `scan_page` returns at most `limit` records starting after `start_key`.
///   Calling it again with the same `start_key` returns the same page (modulo concurrent writes).
/// - `write_batch` writes every record or fails. Writes are puts, so replaying a batch is harmless.
/// - `describe` never errors for a missing table; that's `TableState::Missing`.
#[async_trait]
pub(crate) trait Table: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    async fn scan_page(&self, limit: usize, start_key: Option<Record>) -> Result<ScanPage, BackendError>;
    async fn write_batch(&self, batch: &[Record]) -> Result<(), BackendError>;
    async fn describe(&self) -> Result<TableState, BackendError>;
}

/// 🎭 The many faces of a Table. Callers never need to know which one they got.
#[derive(Debug)]
pub enum TableBackend {
    InMemory(in_mem::InMemoryTable),
    Dynamo(dynamo::DynamoTable),
}

#[async_trait]
impl Table for TableBackend {
    fn name(&self) -> &str {
        match self {
            TableBackend::InMemory(t) => t.name(),
            TableBackend::Dynamo(t) => t.name(),
        }
    }

    async fn scan_page(&self, limit: usize, start_key: Option<Record>) -> Result<ScanPage, BackendError> {
        match self {
            TableBackend::InMemory(t) => t.scan_page(limit, start_key).await,
            TableBackend::Dynamo(t) => t.scan_page(limit, start_key).await,
        }
    }

    async fn write_batch(&self, batch: &[Record]) -> Result<(), BackendError> {
        match self {
            TableBackend::InMemory(t) => t.write_batch(batch).await,
            TableBackend::Dynamo(t) => t.write_batch(batch).await,
        }
    }

    async fn describe(&self) -> Result<TableState, BackendError> {
        match self {
            TableBackend::InMemory(t) => t.describe().await,
            TableBackend::Dynamo(t) => t.describe().await,
        }
    }
}

// ===== BlobStore Trait and Backend Enum =====

/// 🪣 A flat object store addressed by `(bucket, key)`.
///
/// # Contract 📜
/// - `put_object` writes the whole body or fails. No partial objects.
/// - `get_object` returns `Ok(None)` for a missing key; only real failures are `Err`.
/// - `object_exists` is a HEAD. It doesn't download anything.
#[async_trait]
pub(crate) trait BlobStore: std::fmt::Debug + Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), BackendError>;
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, BackendError>;
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, BackendError>;
}

/// 🎭 The many faces of a BlobStore. Mirrors `TableBackend` on the other side of the pipe.
#[derive(Debug)]
pub enum BlobBackend {
    InMemory(in_mem::InMemoryBlobStore),
    S3(s3::S3BlobStore),
}

#[async_trait]
impl BlobStore for BlobBackend {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), BackendError> {
        match self {
            BlobBackend::InMemory(s) => s.put_object(bucket, key, body).await,
            BlobBackend::S3(s) => s.put_object(bucket, key, body).await,
        }
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        match self {
            BlobBackend::InMemory(s) => s.get_object(bucket, key).await,
            BlobBackend::S3(s) => s.get_object(bucket, key).await,
        }
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, BackendError> {
        match self {
            BlobBackend::InMemory(s) => s.object_exists(bucket, key).await,
            BlobBackend::S3(s) => s.object_exists(bucket, key).await,
        }
    }
}
