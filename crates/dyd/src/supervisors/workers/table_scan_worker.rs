// ai
//! 🚰 TableScanWorker: the export producer. Pages through the whole table and
//! pours it into the channel one row at a time.
//!
//! 🧠 Knowledge graph:
//! - Throttled page? Wait the current delay, double it, ask for the SAME page again.
//!   No skipping, no duplicates, no giving up.
//! - Any other failure ends the export.
//! - Between pages it waits the current delay too, so a cold table isn't hammered.
//! - `hand_off` blocks until the BlobSinkWorker takes the row. That's the backpressure.

use std::time::Duration;

use async_channel::Sender;
use tracing::{debug, info, warn};

use super::hand_off;
use crate::backends::{Table, TableBackend};
use crate::error::{DumpError, Result, Stage};
use crate::record::Record;
use crate::throttle::Backoff;

#[derive(Debug)]
pub(crate) struct TableScanWorker {
    table: TableBackend,
    page_size: usize,
    backoff: Backoff,
}

impl TableScanWorker {
    pub(crate) fn new(table: TableBackend, page_size: usize, wait: Duration) -> Self {
        Self {
            table,
            page_size,
            backoff: Backoff::new(wait),
        }
    }

    /// 🚀 Scan to the end. Returns how many records were handed off.
    pub(crate) async fn run(mut self, tx: &Sender<Record>) -> Result<u64> {
        info!("🚰 scanning table {} ({} items per page)", self.table.name(), self.page_size);
        let mut start_key: Option<Record> = None;
        let mut pages = 0u64;
        let mut emitted = 0u64;

        loop {
            let page = match self.table.scan_page(self.page_size, start_key.clone()).await {
                Ok(page) => page,
                Err(err) if err.is_throttling() => {
                    warn!(
                        "🐢 scan of {} throttled ({}); retrying the same page in {:?}",
                        self.table.name(),
                        err,
                        self.backoff.current()
                    );
                    self.backoff.wait().await;
                    self.backoff.escalate();
                    continue;
                }
                Err(err) => return Err(DumpError::from_backend(Stage::Scan, err)),
            };

            pages += 1;
            debug!("📄 page {} of {}: {} records", pages, self.table.name(), page.records.len());
            for record in page.records {
                hand_off(tx, record).await?;
                emitted += 1;
            }

            match page.last_evaluated_key {
                Some(next) => {
                    start_key = Some(next);
                    self.backoff.wait().await;
                }
                None => break,
            }
        }

        info!("🏁 scan of {} finished: {} records in {} pages", self.table.name(), emitted, pages);
        Ok(emitted)
    }
}
