// ai
//! 🗑️ TableSinkWorker: the restore consumer. Patient, tireless, and deeply
//! unbothered by throttling. It receives rows, it batches rows, it writes rows.
//!
//! 🧠 Knowledge graph:
//! - Batch fills to `batch_size`, gets written, then the worker waits the current
//!   delay before taking the next record.
//! - Throttled write? Double the delay, wait it out, send the exact same batch again.
//!   The doubled delay sticks around for every batch after that.
//! - Channel closed with a half-full batch? That one goes out too.
//! - Any non-throttling failure ends the restore. Rows already written stay written.

use std::time::Duration;

use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::Worker;
use crate::backends::{Table, TableBackend};
use crate::error::{DumpError, Result, Stage};
use crate::progress::{Direction, ProgressMetrics, RunSummary};
use crate::record::Record;
use crate::throttle::{Backoff, retry_throttled};

#[derive(Debug)]
pub(crate) struct TableSinkWorker {
    rx: Receiver<Record>,
    table: TableBackend,
    batch_size: usize,
    backoff: Backoff,
    source_label: String,
}

impl TableSinkWorker {
    pub(crate) fn new(
        rx: Receiver<Record>,
        table: TableBackend,
        batch_size: usize,
        wait: Duration,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            rx,
            table,
            batch_size: batch_size.max(1),
            backoff: Backoff::new(wait),
            source_label: source_label.into(),
        }
    }

    /// 🔁 Write one batch, riding out throttling for as long as it takes.
    async fn write_with_backoff(&mut self, batch: &[Record]) -> Result<()> {
        let table = &self.table;
        let what = format!("write of {} records to {}", batch.len(), table.name());
        retry_throttled(&mut self.backoff, &what, move || table.write_batch(batch))
            .await
            .map_err(|e| DumpError::from_backend(Stage::Write, e))
    }
}

impl Worker for TableSinkWorker {
    type Output = RunSummary;

    fn start(mut self) -> JoinHandle<Result<RunSummary>> {
        tokio::spawn(async move {
            debug!("📥 TableSinkWorker started draining channel...");
            let mut progress = ProgressMetrics::new(format!("restoring {}", self.table.name()));
            let mut batch: Vec<Record> = Vec::with_capacity(self.batch_size);

            while let Ok(record) = self.rx.recv().await {
                batch.push(record);
                if batch.len() >= self.batch_size {
                    self.write_with_backoff(&batch).await?;
                    progress.batch_done(batch.len() as u64);
                    batch.clear();
                    self.backoff.wait().await;
                }
            }

            if !batch.is_empty() {
                debug!("🏁 TableSinkWorker: channel closed, flushing {} trailing records", batch.len());
                self.write_with_backoff(&batch).await?;
                progress.batch_done(batch.len() as u64);
            }

            let destination = self.table.name().to_string();
            let summary = progress.finish(Direction::Restore, self.source_label, destination);
            info!(
                "✅ restore complete: {} records in {} batches",
                summary.records, summary.batches
            );
            Ok(summary)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::in_mem::InMemoryTable;
    use crate::record::AttributeValue;

    fn row(i: usize) -> Record {
        Record::new().with("id", AttributeValue::N(i.to_string()))
    }

    async fn run_sink(table: InMemoryTable, rows: Vec<Record>, batch_size: usize, wait: Duration) -> Result<RunSummary> {
        let (tx, rx) = async_channel::bounded(1);
        let handle = TableSinkWorker::new(rx, TableBackend::InMemory(table), batch_size, wait, "s3://bkt/p").start();
        for record in rows {
            if tx.send(record).await.is_err() {
                break;
            }
        }
        drop(tx);
        handle.await.expect("💀 sink panicked")
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_ten_rows_make_four_batches_of_three() -> Result<()> {
        let table = InMemoryTable::new("t");
        let rows: Vec<Record> = (0..10).map(row).collect();
        let summary = run_sink(table.clone(), rows.clone(), 3, Duration::from_millis(5)).await?;

        let sizes: Vec<usize> = table.batches().await.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        assert_eq!(table.records().await, rows, "order survives batching");
        assert_eq!(summary.batches, 4);
        assert_eq!(summary.records, 10);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_throttled_batch_is_resent_verbatim_after_twice_the_wait() -> Result<()> {
        let wait = Duration::from_millis(100);
        let table = InMemoryTable::new("t");
        table.throttle_next_writes(1).await;
        run_sink(table.clone(), (0..4).map(row).collect(), 2, wait).await?;

        let attempts = table.write_attempts().await;
        assert_eq!(attempts.len(), 3, "one throttled attempt, then two clean batches");
        assert_eq!(attempts[0].0, attempts[1].0, "the retry is the identical batch");
        assert!(attempts[1].1 - attempts[0].1 >= wait * 2, "retry only after the doubled wait");
        // -- ⏫ the doubled delay sticks: the next batch waits 200ms, not 100ms
        assert!(attempts[2].1 - attempts[1].1 >= wait * 2);
        assert_eq!(table.records().await, (0..4).map(row).collect::<Vec<_>>());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_real_failure_is_not_retried() {
        let table = InMemoryTable::new("t");
        table.fail_next_write("ValidationException").await;
        let err = run_sink(table.clone(), (0..3).map(row).collect(), 2, Duration::ZERO)
            .await
            .expect_err("💀 validation errors are forever");
        assert_eq!(err.stage(), Some(Stage::Write));
        assert_eq!(table.write_attempts().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_no_rows_means_no_writes() -> Result<()> {
        let table = InMemoryTable::new("t");
        let summary = run_sink(table.clone(), Vec::new(), 5, Duration::ZERO).await?;
        assert!(table.write_attempts().await.is_empty());
        assert_eq!(summary.batches, 0);
        Ok(())
    }
}
