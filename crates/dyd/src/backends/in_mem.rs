//! # Previously, on Dynadump...
//!
//! 🎬 The table was trapped in RAM. The bucket was a `BTreeMap`. Nobody had AWS
//! credentials, and yet the tests had to pass. Someone had to build backends so
//! simple they live entirely in the heap, gone the moment you blink.
//!
//! That someone was this module.
//!
//! `in_mem` provides an in-memory [`Table`] and [`BlobStore`]. Both are `Clone`
//! around an `Arc<Mutex<...>>` so a test can hand one copy to the pipeline and
//! keep another to peek at what arrived. Both can be told to misbehave on cue:
//! throttle the next N calls, fail a write, pretend the table is still CREATING.
//!
//! ⚠️ This is NOT for production. This is for tests and dry runs.
//! ✅ No network calls. No disk I/O. Just vibes and heap memory. 🦆

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::backends::{BackendError, BlobStore, ScanPage, Table, TableState};
use crate::record::{AttributeValue, Record};

const OFFSET_ATTRIBUTE: &str = "__offset";

#[derive(Debug, Default)]
struct TableInner {
    items: Vec<Record>,
    state_override: Option<TableState>,
    throttle_scans: usize,
    throttle_writes: usize,
    fail_next_write: Option<String>,
    fail_scan_after: Option<(usize, String)>,
    pages_served: usize,
    scan_calls: Vec<(Option<Record>, Instant)>,
    write_attempts: Vec<(Vec<Record>, Instant)>,
    batches: Vec<Vec<Record>>,
}

/// 📦 A table that never forgets, and throttles whenever a test asks it to.
#[derive(Debug, Clone)]
pub struct InMemoryTable {
    name: String,
    inner: Arc<Mutex<TableInner>>,
}

impl InMemoryTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(TableInner::default())),
        }
    }

    /// 🌱 A table pre-seeded with rows, in scan order.
    pub async fn with_records(name: impl Into<String>, records: Vec<Record>) -> Self {
        let table = Self::new(name);
        table.inner.lock().await.items = records;
        table
    }

    pub async fn set_state(&self, state: TableState) {
        self.inner.lock().await.state_override = Some(state);
    }

    /// 🐢 The next `n` scan calls answer "slow down".
    pub async fn throttle_next_scans(&self, n: usize) {
        self.inner.lock().await.throttle_scans = n;
    }

    /// 🐢 The next `n` batch writes answer "slow down".
    pub async fn throttle_next_writes(&self, n: usize) {
        self.inner.lock().await.throttle_writes = n;
    }

    /// 💀 Once `pages` pages have been served, every scan fails for real.
    pub async fn fail_scan_after(&self, pages: usize, message: impl Into<String>) {
        self.inner.lock().await.fail_scan_after = Some((pages, message.into()));
    }

    /// 💀 The next batch write fails for real.
    pub async fn fail_next_write(&self, message: impl Into<String>) {
        self.inner.lock().await.fail_next_write = Some(message.into());
    }

    pub async fn records(&self) -> Vec<Record> {
        self.inner.lock().await.items.clone()
    }

    /// 📚 Every batch that was accepted, in order.
    pub async fn batches(&self) -> Vec<Vec<Record>> {
        self.inner.lock().await.batches.clone()
    }

    /// 🧾 Every write attempt, accepted or not, with the (tokio) time it happened.
    pub async fn write_attempts(&self) -> Vec<(Vec<Record>, Instant)> {
        self.inner.lock().await.write_attempts.clone()
    }

    /// 🧾 Every scan call with its start key and time.
    pub async fn scan_calls(&self) -> Vec<(Option<Record>, Instant)> {
        self.inner.lock().await.scan_calls.clone()
    }
}

fn offset_of(start_key: &Option<Record>) -> Result<usize, BackendError> {
    match start_key.as_ref().and_then(|key| key.get(OFFSET_ATTRIBUTE)) {
        None => Ok(0),
        Some(AttributeValue::N(n)) => n.parse().map_err(|e| BackendError::service("bad in-memory start key", e)),
        Some(other) => Err(BackendError::Service {
            message: format!("bad in-memory start key {other:?}"),
            source: None,
        }),
    }
}

#[async_trait]
impl Table for InMemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan_page(&self, limit: usize, start_key: Option<Record>) -> Result<ScanPage, BackendError> {
        let mut inner = self.inner.lock().await;
        inner.scan_calls.push((start_key.clone(), Instant::now()));
        if inner.throttle_scans > 0 {
            inner.throttle_scans -= 1;
            return Err(BackendError::Throttled("ProvisionedThroughputExceededException".into()));
        }
        if let Some((pages, message)) = &inner.fail_scan_after {
            if inner.pages_served >= *pages {
                return Err(BackendError::Service {
                    message: message.clone(),
                    source: None,
                });
            }
        }
        inner.pages_served += 1;
        let from = offset_of(&start_key)?.min(inner.items.len());
        let to = (from + limit.max(1)).min(inner.items.len());
        let records = inner.items[from..to].to_vec();
        let last_evaluated_key = (to < inner.items.len())
            .then(|| Record::new().with(OFFSET_ATTRIBUTE, AttributeValue::N(to.to_string())));
        Ok(ScanPage {
            records,
            last_evaluated_key,
        })
    }

    async fn write_batch(&self, batch: &[Record]) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().await;
        inner.write_attempts.push((batch.to_vec(), Instant::now()));
        if inner.throttle_writes > 0 {
            inner.throttle_writes -= 1;
            return Err(BackendError::Throttled("ProvisionedThroughputExceededException".into()));
        }
        if let Some(message) = inner.fail_next_write.take() {
            return Err(BackendError::Service { message, source: None });
        }
        inner.items.extend_from_slice(batch);
        inner.batches.push(batch.to_vec());
        Ok(())
    }

    async fn describe(&self) -> Result<TableState, BackendError> {
        let inner = self.inner.lock().await;
        Ok(match &inner.state_override {
            Some(state) => state.clone(),
            None => TableState::Active {
                item_count: inner.items.len() as i64,
            },
        })
    }
}

#[derive(Debug, Default)]
struct BlobInner {
    objects: BTreeMap<(String, String), Vec<u8>>,
    put_log: Vec<String>,
    fail_puts_from: Option<usize>,
    throttle_puts: usize,
    throttle_gets: usize,
    throttled_calls: usize,
}

/// 🪣 A bucket made of `BTreeMap`. Remembers the order things were put in it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStore {
    inner: Arc<Mutex<BlobInner>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 🌱 Plant an object directly, bypassing the put log.
    pub async fn insert(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.inner
            .lock()
            .await
            .objects
            .insert((bucket.to_string(), key.to_string()), body);
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .await
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// 🧾 `bucket/key` of every successful put, in order.
    pub async fn put_log(&self) -> Vec<String> {
        self.inner.lock().await.put_log.clone()
    }

    /// 🐢 The next `n` puts answer "SlowDown".
    pub async fn throttle_next_puts(&self, n: usize) {
        self.inner.lock().await.throttle_puts = n;
    }

    /// 🐢 The next `n` reads (GETs and HEADs alike) answer "SlowDown".
    pub async fn throttle_next_gets(&self, n: usize) {
        self.inner.lock().await.throttle_gets = n;
    }

    /// 🧾 How many calls were turned away with "SlowDown" so far.
    pub async fn throttled_calls(&self) -> usize {
        self.inner.lock().await.throttled_calls
    }

    /// 💀 Every put from the `n`-th (0-based) onwards fails.
    pub async fn fail_puts_from(&self, n: usize) {
        self.inner.lock().await.fail_puts_from = Some(n);
    }
}

impl BlobInner {
    fn take_throttle(&mut self, read: bool) -> Result<(), BackendError> {
        let remaining = if read { &mut self.throttle_gets } else { &mut self.throttle_puts };
        if *remaining == 0 {
            return Ok(());
        }
        *remaining -= 1;
        self.throttled_calls += 1;
        Err(BackendError::Throttled("SlowDown".into()))
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().await;
        inner.take_throttle(false)?;
        if inner.fail_puts_from.is_some_and(|n| inner.put_log.len() >= n) {
            return Err(BackendError::Service {
                message: format!("in-memory put of {bucket}/{key} refused"),
                source: None,
            });
        }
        inner.put_log.push(format!("{bucket}/{key}"));
        inner.objects.insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let mut inner = self.inner.lock().await;
        inner.take_throttle(true)?;
        Ok(inner.objects.get(&(bucket.to_string(), key.to_string())).cloned())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, BackendError> {
        let mut inner = self.inner.lock().await;
        inner.take_throttle(true)?;
        Ok(inner.objects.contains_key(&(bucket.to_string(), key.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(i: usize) -> Record {
        Record::new().with("id", AttributeValue::N(i.to_string()))
    }

    #[tokio::test]
    async fn the_one_where_scan_pages_walk_the_whole_table() -> Result<(), BackendError> {
        let table = InMemoryTable::with_records("t", (0..5).map(row).collect()).await;
        let first = table.scan_page(2, None).await?;
        assert_eq!(first.records, vec![row(0), row(1)]);
        let second = table.scan_page(2, first.last_evaluated_key).await?;
        assert_eq!(second.records, vec![row(2), row(3)]);
        let third = table.scan_page(2, second.last_evaluated_key).await?;
        assert_eq!(third.records, vec![row(4)]);
        assert_eq!(third.last_evaluated_key, None);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_throttles_run_out() {
        let table = InMemoryTable::new("t");
        table.throttle_next_writes(1).await;
        assert!(table.write_batch(&[row(1)]).await.is_err_and(|e| e.is_throttling()));
        assert!(table.write_batch(&[row(1)]).await.is_ok());
        assert_eq!(table.write_attempts().await.len(), 2);
        assert_eq!(table.batches().await, vec![vec![row(1)]]);
    }

    #[tokio::test]
    async fn the_one_where_the_bucket_says_slow_down_on_cue() {
        let blobs = InMemoryBlobStore::new();
        blobs.throttle_next_puts(1).await;
        blobs.throttle_next_gets(1).await;
        assert!(blobs.put_object("bkt", "k", b"x".to_vec()).await.is_err_and(|e| e.is_throttling()));
        assert!(blobs.put_object("bkt", "k", b"x".to_vec()).await.is_ok());
        assert!(blobs.object_exists("bkt", "k").await.is_err_and(|e| e.is_throttling()));
        assert!(matches!(blobs.get_object("bkt", "k").await, Ok(Some(body)) if body == b"x"));
        assert_eq!(blobs.throttled_calls().await, 2);
        assert_eq!(blobs.put_log().await, vec!["bkt/k".to_string()]);
    }
}
