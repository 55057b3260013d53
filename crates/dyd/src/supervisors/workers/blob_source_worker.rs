// ai
//! 📥 BlobSourceWorker: the restore producer. Walks the manifest top to bottom,
//! downloads each object, and feeds it into the channel one line at a time.
//!
//! 🧠 Knowledge graph:
//! - Entries are processed strictly in manifest order. Order in = order out.
//! - Entries that aren't `s3://` (or don't parse at all) are skipped with a warning.
//!   Data Pipeline never writes them, but we've all met a hand-edited manifest.
//! - A listed object that isn't there is fatal. So is a line that won't decode.
//! - "SlowDown" on a download doubles the delay and fetches the same object again.
//! - Lines are split on `\n` with memchr; a stray `\r` is trimmed and blank lines are ignored.

use std::time::Duration;

use async_channel::Sender;
use memchr::memchr_iter;
use tracing::{debug, info, warn};

use super::hand_off;
use crate::backends::{BlobBackend, BlobStore};
use crate::error::{DumpError, Result, Stage};
use crate::manifest::{BlobLocator, Manifest};
use crate::record::{Record, decode_record};
use crate::throttle::{Backoff, retry_throttled};

/// 📊 What the producer pulled out of the archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ReadStats {
    pub objects: u64,
    pub skipped: u64,
    pub bytes: u64,
    pub records: u64,
}

#[derive(Debug)]
pub(crate) struct BlobSourceWorker {
    store: BlobBackend,
    manifest: Manifest,
    backoff: Backoff,
}

impl BlobSourceWorker {
    pub(crate) fn new(store: BlobBackend, manifest: Manifest, wait: Duration) -> Self {
        Self {
            store,
            manifest,
            backoff: Backoff::new(wait),
        }
    }

    /// 🚀 Read every listed object and hand off every record in it.
    pub(crate) async fn run(mut self, tx: &Sender<Record>) -> Result<ReadStats> {
        let mut stats = ReadStats::default();
        info!("📥 reading {} archive objects", self.manifest.len());

        for entry in &self.manifest.entries {
            let locator = match BlobLocator::parse(&entry.url) {
                Some(locator) if locator.is_blob() => locator,
                _ => {
                    warn!("⏭️ skipping manifest entry {} (not an s3:// locator)", entry.url);
                    stats.skipped += 1;
                    continue;
                }
            };

            let (store, container, key) = (&self.store, &locator.container, &locator.key);
            let body = retry_throttled(&mut self.backoff, &entry.url, move || store.get_object(container, key))
                .await
                .map_err(|e| DumpError::from_backend(Stage::Download, e))?
                .ok_or_else(|| DumpError::Transport {
                    stage: Stage::Download,
                    message: format!("{} is listed in the manifest but does not exist", entry.url),
                    source: None,
                })?;
            debug!("📦 {} ({} bytes)", entry.url, body.len());
            stats.objects += 1;
            stats.bytes += body.len() as u64;

            let mut line_start = 0;
            let mut line_no = 0usize;
            let ends = memchr_iter(b'\n', &body).chain(std::iter::once(body.len()));
            for line_end in ends {
                line_no += 1;
                let mut line = &body[line_start..line_end];
                line_start = line_end + 1;
                if let Some(trimmed) = line.strip_suffix(b"\r") {
                    line = trimmed;
                }
                if line.is_empty() {
                    continue;
                }
                let record = decode_record(line)
                    .map_err(|e| DumpError::codec(Stage::Download, format!("{} line {}", entry.url, line_no), e))?;
                hand_off(tx, record).await?;
                stats.records += 1;
            }
        }

        info!(
            "🏁 archive read: {} records from {} objects ({} skipped)",
            stats.records, stats.objects, stats.skipped
        );
        Ok(stats)
    }
}
