//! 🧵 Workers: the ones who actually move the rows while the Supervisor takes
//! all the credit in the sprint retro.
//!
//! 🧠 Knowledge graph:
//! - Producers (`TableScanWorker`, `BlobSourceWorker`) run on the caller's task and
//!   push one `Record` at a time through `hand_off`.
//! - Consumers (`BlobSinkWorker`, `TableSinkWorker`) implement `Worker` and get spawned.
//! - The channel between them holds one record. A producer that gets ahead simply waits.
//!
//! ⚠️ "If you're reading this, the code review went poorly." 🦆

use async_channel::Sender;
use tokio::task::JoinHandle;

use crate::error::{DumpError, Result};
use crate::record::Record;

mod blob_sink_worker;
mod blob_source_worker;
mod table_scan_worker;
mod table_sink_worker;

pub(crate) use blob_sink_worker::BlobSinkWorker;
pub(crate) use blob_source_worker::BlobSourceWorker;
pub(crate) use table_scan_worker::TableScanWorker;
pub(crate) use table_sink_worker::TableSinkWorker;

/// 🏗️ A background worker, that does work. duh.
pub(crate) trait Worker {
    type Output: Send + 'static;

    /// 🚀 Spawn the worker. The handle resolves once the channel is drained and
    /// every downstream write has finished.
    fn start(self) -> JoinHandle<Result<Self::Output>>;
}

/// 📨 Hand one record to the consumer, waiting until it's taken.
///
/// Fails only when the consumer is gone, which means it already failed; the
/// coordinator fetches the consumer's own error in that case.
pub(crate) async fn hand_off(tx: &Sender<Record>, record: Record) -> Result<()> {
    tx.send(record)
        .await
        .map_err(|_| DumpError::Pipeline("consumer stopped before the producer finished".to_string()))
}

/// 🔍 Debug-print a record for an error message without dumping a 400 KB item into the log.
pub(crate) fn describe_record(record: &Record) -> String {
    const LIMIT: usize = 256;
    let rendered = format!("{record:?}");
    if rendered.len() <= LIMIT {
        return rendered;
    }
    let mut cut = LIMIT;
    while !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &rendered[..cut])
}
