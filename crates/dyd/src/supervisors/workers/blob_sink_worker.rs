// ai
//! 🎬 *[a channel fills with rows. somewhere, a buffer grows.]*
//! *[at 10 MiB it gives up, becomes an object, and starts over.]*
//!
//! 🪣 BlobSinkWorker: the export consumer. Turns a stream of records into
//! a sequence of newline-delimited JSON objects and keeps the books on them.
//!
//! 🧠 Knowledge graph:
//! - One buffer. Before appending a line, if `buffer + line >= threshold` and the buffer
//!   isn't empty, the buffer is flushed as a fresh uuid-named object and listed in the manifest.
//! - A single line bigger than the threshold still goes out, alone in its own object.
//! - Channel closed → flush what's left, even nothing. An empty table still gets one
//!   empty object, so a restore always has at least one entry to chew on.
//! - Then the manifest, then `_SUCCESS`. Never the other way around.
//! - "SlowDown" on any put: double the delay, wait, put the identical bytes again.
//!   Every other failure is fatal.

use std::time::Duration;

use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Worker, describe_record};
use crate::backends::{BlobBackend, BlobStore};
use crate::error::{DumpError, Result, Stage};
use crate::manifest::{ArchiveLayout, Manifest, persist_manifest, write_success_marker};
use crate::progress::{Direction, ProgressMetrics, RunSummary};
use crate::record::{Record, encode_record};
use crate::throttle::{Backoff, retry_throttled};

#[derive(Debug)]
pub(crate) struct BlobSinkWorker {
    rx: Receiver<Record>,
    store: BlobBackend,
    layout: ArchiveLayout,
    max_object_size: usize,
    backoff: Backoff,
    source_label: String,
}

impl BlobSinkWorker {
    pub(crate) fn new(
        rx: Receiver<Record>,
        store: BlobBackend,
        layout: ArchiveLayout,
        max_object_size: usize,
        wait: Duration,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            rx,
            store,
            layout,
            max_object_size,
            backoff: Backoff::new(wait),
            source_label: source_label.into(),
        }
    }

    /// 📤 Ship the buffer as one object and list it. The buffer comes back empty.
    async fn flush(
        &mut self,
        buffer: &mut Vec<u8>,
        buffered_records: &mut u64,
        manifest: &mut Manifest,
        progress: &mut ProgressMetrics,
    ) -> Result<()> {
        let key = self.layout.new_object_key();
        let body = std::mem::take(buffer);
        let size = body.len() as u64;
        debug!("📤 flushing {} records ({} bytes) to {}", buffered_records, size, key);
        let location = self.layout.locator(&key);
        let (store, bucket, key, body) = (&self.store, &self.layout.bucket, &key, &body);
        retry_throttled(&mut self.backoff, &location, move || store.put_object(bucket, key, body.clone()))
            .await
            .map_err(|e| DumpError::from_backend(Stage::Upload, e))?;
        manifest.push_mandatory(location);
        progress.object_done(*buffered_records, size);
        *buffered_records = 0;
        Ok(())
    }
}

impl Worker for BlobSinkWorker {
    type Output = RunSummary;

    fn start(mut self) -> JoinHandle<Result<RunSummary>> {
        tokio::spawn(async move {
            debug!("📥 BlobSinkWorker started draining channel...");
            let mut manifest = Manifest::default();
            let mut progress = ProgressMetrics::new(format!("exporting {}", self.source_label));
            let mut buffer: Vec<u8> = Vec::with_capacity(self.max_object_size);
            let mut buffered_records = 0u64;

            while let Ok(record) = self.rx.recv().await {
                let line = encode_record(&record)
                    .map_err(|e| DumpError::codec(Stage::Upload, describe_record(&record), e))?;
                if !buffer.is_empty() && buffer.len() + line.len() >= self.max_object_size {
                    self.flush(&mut buffer, &mut buffered_records, &mut manifest, &mut progress)
                        .await?;
                }
                buffer.extend_from_slice(line.as_bytes());
                buffer.push(b'\n');
                buffered_records += 1;
            }

            // -- 🏁 channel closed and drained. The tail goes out even when it's nothing.
            debug!("🏁 BlobSinkWorker: channel closed, flushing the tail");
            self.flush(&mut buffer, &mut buffered_records, &mut manifest, &mut progress)
                .await?;

            persist_manifest(&self.store, &self.layout, &manifest, &mut self.backoff).await?;
            write_success_marker(&self.store, &self.layout, &mut self.backoff).await?;

            let destination = self.layout.locator(&self.layout.prefix);
            let summary = progress.finish(Direction::Export, self.source_label, destination);
            info!(
                "✅ export complete: {} records in {} objects",
                summary.records, summary.objects
            );
            Ok(summary)
        })
    }
}
