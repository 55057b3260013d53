//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 *[dramatic orchestral music swells]*
//! 🎬 "In a world where workers toil endlessly..."
//! 🎬 "One supervisor dared to manage them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor module: part middle manager, part helicopter parent. It owns
//! the channel, starts the consumer, runs the producer, and decides who gets blamed.
//!
//! 🧠 Knowledge graph:
//! - One producer, one consumer, one `bounded(1)` channel. The consumer is spawned first;
//!   the producer runs right here on the caller's task.
//! - The Supervisor holds the only `Sender`. The channel closes when it says so, never earlier.
//! - Export, producer failed: abort the BlobSinkWorker, THEN close the channel. It never sees
//!   a clean close, so it never writes a manifest or a marker for a half-read table.
//! - Restore, producer failed: close the channel and let the TableSinkWorker finish what it
//!   already has. Partial restores stay partial; nothing is rolled back.
//! - Consumer failed first: the producer's next send bounces. The consumer's error is the real one.
//!
//! ⚠️ DO NOT MAKE THIS PUB EVER
//! 💀 WORKERS ARE SUPERVISORS PRIVATE LITTLE MINIONS WHOM THE WORLD FORGOT ABOUT

mod preflight;
mod workers;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::app_config::{AppConfig, RunMode};
use crate::backends::Table;
use crate::context::{ExportContext, RestoreContext};
use crate::error::{DumpError, Result};
use crate::manifest::ArchiveLayout;
use crate::progress::RunSummary;
use preflight::{Preflight, PreflightOptions};
use workers::{BlobSinkWorker, BlobSourceWorker, TableScanWorker, TableSinkWorker, Worker};

/// 🤝 One record in flight at a time: the producer can't get ahead of the consumer.
const CHANNEL_DEPTH: usize = 1;

/// 🧵 Wait for a worker and flatten "it panicked" into the error taxonomy.
async fn join<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    handle
        .await
        .map_err(|e| DumpError::Pipeline(format!("worker task did not finish: {e}")))?
}

/// 💀 The producer failed because the consumer hung up first.
/// The consumer has the more interesting story.
async fn blame<T>(consumer: JoinHandle<Result<T>>, producer_err: DumpError) -> DumpError {
    match join(consumer).await {
        Err(consumer_err) => consumer_err,
        Ok(_) => producer_err,
    }
}

/// 📦 The Supervisor: because even async tasks need someone hovering over them
/// asking "is it done yet?"
#[derive(Debug)]
pub(crate) struct Supervisor {
    app_config: AppConfig,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig) -> Self {
        Self { app_config }
    }

    /// 📤 Table → archive. Returns once the manifest and `_SUCCESS` are both in the bucket.
    pub(crate) async fn export(&self, context: ExportContext) -> Result<RunSummary> {
        let config = &self.app_config;
        config.validate(RunMode::Export)?;
        let layout = ArchiveLayout::new(config.archive.bucket.clone(), config.resolved_prefix(Utc::now()));
        let ExportContext { source, destination } = context;
        info!(
            "📤 exporting table {} to {}",
            source.name(),
            layout.locator(&layout.prefix)
        );

        let (tx, rx) = async_channel::bounded(CHANNEL_DEPTH);
        let consumer = BlobSinkWorker::new(
            rx,
            destination,
            layout,
            config.archive.max_object_size_bytes,
            config.wait(),
            source.name(),
        )
        .start();
        let producer = TableScanWorker::new(source, config.table.batch_size, config.wait());

        match producer.run(&tx).await {
            Ok(scanned) => {
                drop(tx);
                let summary = join(consumer).await?;
                info!("📦 {} records scanned, {} archived", scanned, summary.records);
                Ok(summary)
            }
            Err(err) if tx.is_closed() => Err(blame(consumer, err).await),
            Err(err) => {
                warn!("🛑 export aborted ({}); no manifest, no success marker", err);
                consumer.abort();
                // -- the JoinError here is just "cancelled"; the producer's error is the story
                let _ = consumer.await;
                drop(tx);
                Err(err)
            }
        }
    }

    /// 📥 Archive → table. Pre-flight first; nothing is written until every gate passes.
    pub(crate) async fn restore(&self, context: RestoreContext) -> Result<RunSummary> {
        let config = &self.app_config;
        config.validate(RunMode::Restore)?;
        let layout = ArchiveLayout::new(config.archive.bucket.clone(), config.archive.prefix.clone());
        let RestoreContext { source, destination } = context;
        info!(
            "📥 restoring {} into table {}",
            layout.locator(&layout.prefix),
            destination.name()
        );

        let options = PreflightOptions {
            append: config.restore.append,
            force: config.restore.force,
            wait: config.wait(),
        };
        let manifest = Preflight::new(&destination, &source, &layout, options).run().await?;

        let (tx, rx) = async_channel::bounded(CHANNEL_DEPTH);
        let consumer = TableSinkWorker::new(
            rx,
            destination,
            config.table.batch_size,
            config.wait(),
            layout.locator(&layout.prefix),
        )
        .start();
        let producer = BlobSourceWorker::new(source, manifest, config.wait());

        let stats = match producer.run(&tx).await {
            Ok(stats) => stats,
            Err(err) if tx.is_closed() => return Err(blame(consumer, err).await),
            Err(err) => {
                drop(tx);
                match join(consumer).await {
                    Ok(partial) => warn!(
                        "🩹 restore stopped early; {} records were already written and stay written",
                        partial.records
                    ),
                    Err(consumer_err) => warn!("💀 writer failed while draining too: {}", consumer_err),
                }
                return Err(err);
            }
        };

        drop(tx);
        let mut summary = join(consumer).await?;
        summary.objects = stats.objects;
        summary.bytes = stats.bytes;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::{ArchiveConfig, AwsSideConfig, RestoreOptions, TableConfig};
    use crate::backends::in_mem::{InMemoryBlobStore, InMemoryTable};
    use crate::backends::{BlobBackend, TableBackend, TableState};
    use crate::error::{PreflightError, Stage};
    use crate::manifest::Manifest;
    use crate::record::{AttributeValue, Record, decode_record};

    fn config(batch_size: usize, max_object_size_bytes: usize) -> AppConfig {
        AppConfig {
            table: TableConfig {
                name: "orders".into(),
                batch_size,
                wait_ms: 10,
                aws: AwsSideConfig::default(),
            },
            archive: ArchiveConfig {
                bucket: "bkt".into(),
                prefix: "backups/orders".into(),
                date_suffix: false,
                max_object_size_bytes,
                aws: AwsSideConfig::default(),
            },
            restore: RestoreOptions::default(),
        }
    }

    fn row(i: usize) -> Record {
        Record::new()
            .with("pk", AttributeValue::S(format!("order-{i:04}")))
            .with("total", AttributeValue::N(format!("{}.50", i * 3)))
            .with("shipped", AttributeValue::Bool(i % 2 == 0))
    }

    fn rows(n: usize) -> Vec<Record> {
        (0..n).map(row).collect()
    }

    async fn export(cfg: &AppConfig, table: &InMemoryTable, blobs: &InMemoryBlobStore) -> Result<RunSummary> {
        let context = ExportContext::new(
            TableBackend::InMemory(table.clone()),
            BlobBackend::InMemory(blobs.clone()),
        );
        Supervisor::new(cfg.clone()).export(context).await
    }

    async fn restore(cfg: &AppConfig, blobs: &InMemoryBlobStore, table: &InMemoryTable) -> Result<RunSummary> {
        let context = RestoreContext::new(
            BlobBackend::InMemory(blobs.clone()),
            TableBackend::InMemory(table.clone()),
        );
        Supervisor::new(cfg.clone()).restore(context).await
    }

    async fn stored_manifest(blobs: &InMemoryBlobStore, prefix: &str) -> Manifest {
        let body = blobs
            .object("bkt", &format!("{prefix}/manifest"))
            .await
            .expect("💀 no manifest was written");
        serde_json::from_slice(&body).expect("💀 manifest is not JSON")
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_table_goes_there_and_back_again() -> Result<()> {
        let cfg = config(7, 200);
        let original = InMemoryTable::with_records("orders", rows(50)).await;
        let blobs = InMemoryBlobStore::new();

        let exported = export(&cfg, &original, &blobs).await?;
        assert_eq!(exported.records, 50);
        assert!(blobs.object("bkt", "backups/orders/_SUCCESS").await.is_some());

        let copy = InMemoryTable::new("orders-copy");
        let restored = restore(&cfg, &blobs, &copy).await?;
        assert_eq!(restored.records, 50);
        assert_eq!(restored.objects, exported.objects);
        assert_eq!(copy.records().await, rows(50), "same rows, same order, no extras");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_an_empty_table_still_leaves_a_complete_archive() -> Result<()> {
        let cfg = config(10, 1024);
        let blobs = InMemoryBlobStore::new();
        export(&cfg, &InMemoryTable::new("orders"), &blobs).await?;

        let manifest = stored_manifest(&blobs, "backups/orders").await;
        assert_eq!(manifest.len(), 1, "one trailing empty object");
        let log = blobs.put_log().await;
        assert_eq!(log.last().map(String::as_str), Some("bkt/backups/orders/_SUCCESS"));

        let copy = InMemoryTable::new("orders-copy");
        let restored = restore(&cfg, &blobs, &copy).await?;
        assert_eq!(restored.records, 0);
        assert!(copy.write_attempts().await.is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_manifest_lists_every_object_and_nothing_else() -> Result<()> {
        let cfg = config(4, 150);
        let blobs = InMemoryBlobStore::new();
        export(&cfg, &InMemoryTable::with_records("orders", rows(23)).await, &blobs).await?;

        let manifest = stored_manifest(&blobs, "backups/orders").await;
        let data_puts: Vec<String> = blobs
            .put_log()
            .await
            .into_iter()
            .filter(|key| !key.ends_with("/manifest") && !key.ends_with("/_SUCCESS"))
            .map(|key| format!("s3://{key}"))
            .collect();
        let listed: Vec<String> = manifest.entries.iter().map(|e| e.url.clone()).collect();
        assert_eq!(listed, data_puts, "every object listed, in write order");
        assert!(manifest.entries.iter().all(|e| e.mandatory));

        let mut recovered = Vec::new();
        for url in &listed {
            let body = blobs
                .object("bkt", url.trim_start_matches("s3://bkt/"))
                .await
                .expect("💀 listed object exists");
            assert!(body.len() <= 150 || body.iter().filter(|b| **b == b'\n').count() == 1);
            for line in body.split(|b| *b == b'\n').filter(|l| !l.is_empty()) {
                recovered.push(decode_record(line).expect("💀 every line decodes"));
            }
        }
        assert_eq!(recovered, rows(23));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_date_suffix_lands_under_the_prefix() -> Result<()> {
        let mut cfg = config(10, 1024);
        cfg.archive.date_suffix = true;
        let blobs = InMemoryBlobStore::new();
        let summary = export(&cfg, &InMemoryTable::with_records("orders", rows(3)).await, &blobs).await?;

        assert!(summary.destination.starts_with("s3://bkt/backups/orders/20"));
        let log = blobs.put_log().await;
        assert!(log.iter().all(|key| key.starts_with("bkt/backups/orders/20")));
        assert!(log.iter().any(|key| key.ends_with("/_SUCCESS")));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_failed_scan_leaves_no_manifest_and_no_marker() {
        let cfg = config(2, 40);
        let table = InMemoryTable::with_records("orders", rows(10)).await;
        table.fail_scan_after(3, "InternalServerError").await;
        let blobs = InMemoryBlobStore::new();

        let err = export(&cfg, &table, &blobs).await.expect_err("💀 the scan dies on page four");
        assert_eq!(err.stage(), Some(Stage::Scan));
        assert_eq!(blobs.object("bkt", "backups/orders/manifest").await, None);
        assert_eq!(blobs.object("bkt", "backups/orders/_SUCCESS").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_failed_upload_is_the_error_you_see() {
        let cfg = config(5, 40);
        let blobs = InMemoryBlobStore::new();
        blobs.fail_puts_from(0).await;

        let err = export(&cfg, &InMemoryTable::with_records("orders", rows(10)).await, &blobs)
            .await
            .expect_err("💀 the bucket refuses everything");
        assert_eq!(err.stage(), Some(Stage::Upload), "the consumer's error, not a hung-up channel");
        assert!(blobs.put_log().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_batches_are_full_except_the_last() -> Result<()> {
        let blobs = InMemoryBlobStore::new();
        export(&config(100, 10 * 1024), &InMemoryTable::with_records("orders", rows(23)).await, &blobs).await?;

        let copy = InMemoryTable::new("orders-copy");
        let summary = restore(&config(5, 10 * 1024), &blobs, &copy).await?;
        let sizes: Vec<usize> = copy.batches().await.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![5, 5, 5, 5, 3], "⌈23/5⌉ batches");
        assert_eq!(summary.batches, 5);
        assert_eq!(copy.records().await, rows(23));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_throttling_costs_time_but_not_rows() -> Result<()> {
        let cfg = config(4, 10 * 1024);
        let blobs = InMemoryBlobStore::new();
        export(&cfg, &InMemoryTable::with_records("orders", rows(12)).await, &blobs).await?;

        let copy = InMemoryTable::new("orders-copy");
        copy.throttle_next_writes(2).await;
        restore(&cfg, &blobs, &copy).await?;

        let attempts = copy.write_attempts().await;
        assert_eq!(attempts.len(), 5, "two throttled tries, then three clean batches");
        assert_eq!(attempts[0].0, attempts[1].0);
        assert_eq!(attempts[1].0, attempts[2].0, "the identical batch every time");
        let wait = cfg.wait();
        assert!(attempts[1].1 - attempts[0].1 >= wait * 2);
        assert!(attempts[2].1 - attempts[1].1 >= wait * 4);
        assert_eq!(copy.records().await, rows(12), "no loss, no duplicates");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_slow_bucket_still_gets_a_complete_round_trip() -> Result<()> {
        let cfg = config(4, 150);
        let blobs = InMemoryBlobStore::new();
        blobs.throttle_next_puts(3).await;
        let exported = export(&cfg, &InMemoryTable::with_records("orders", rows(20)).await, &blobs).await?;
        assert_eq!(exported.records, 20);
        assert!(blobs.object("bkt", "backups/orders/_SUCCESS").await.is_some());
        let manifest = stored_manifest(&blobs, "backups/orders").await;
        assert_eq!(manifest.len() as u64, exported.objects, "no duplicate objects from the retries");

        // -- 🐢 the marker HEAD is turned away three times before it answers
        blobs.throttle_next_gets(3).await;
        let copy = InMemoryTable::new("orders-copy");
        let restored = restore(&cfg, &blobs, &copy).await?;
        assert_eq!(restored.records, 20);
        assert_eq!(copy.records().await, rows(20));
        assert_eq!(blobs.throttled_calls().await, 6);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_full_table_is_left_alone_unless_appending() -> Result<()> {
        let mut cfg = config(10, 1024);
        let blobs = InMemoryBlobStore::new();
        export(&cfg, &InMemoryTable::with_records("orders", rows(3)).await, &blobs).await?;

        let occupied = InMemoryTable::with_records("orders", vec![row(99)]).await;
        let err = restore(&cfg, &blobs, &occupied).await.expect_err("💀 not empty");
        assert!(matches!(err, DumpError::Preflight(PreflightError::TargetNotEmpty { count: 1, .. })));
        assert!(occupied.write_attempts().await.is_empty(), "nothing written before the gate");

        cfg.restore.append = true;
        restore(&cfg, &blobs, &occupied).await?;
        assert_eq!(occupied.records().await.len(), 4);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_missing_and_creating_tables_are_turned_away() {
        let cfg = config(10, 1024);
        let blobs = InMemoryBlobStore::new();
        let table = InMemoryTable::new("orders");

        table.set_state(TableState::Missing).await;
        let err = restore(&cfg, &blobs, &table).await.expect_err("💀 missing");
        assert!(matches!(err, DumpError::Preflight(PreflightError::TargetMissing { .. })));

        table.set_state(TableState::NotActive { status: "UPDATING".into() }).await;
        let err = restore(&cfg, &blobs, &table).await.expect_err("💀 busy");
        assert!(matches!(err, DumpError::Preflight(PreflightError::TargetNotWritable { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_an_unfinished_archive_needs_force() -> Result<()> {
        let mut cfg = config(10, 1024);
        let blobs = InMemoryBlobStore::new();
        export(&cfg, &InMemoryTable::with_records("orders", rows(3)).await, &blobs).await?;
        // -- 🪓 pretend the export died between the manifest and the marker
        let unfinished = InMemoryBlobStore::new();
        let manifest_body = blobs.object("bkt", "backups/orders/manifest").await;
        unfinished
            .insert("bkt", "backups/orders/manifest", manifest_body.expect("💀 manifest exists"))
            .await;
        let manifest = stored_manifest(&blobs, "backups/orders").await;
        for entry in &manifest.entries {
            let key = entry.url.trim_start_matches("s3://bkt/");
            let body = blobs.object("bkt", key).await.expect("💀 object exists");
            unfinished.insert("bkt", key, body).await;
        }

        let table = InMemoryTable::new("orders");
        let err = restore(&cfg, &unfinished, &table).await.expect_err("💀 no marker");
        assert!(matches!(err, DumpError::Preflight(PreflightError::IncompleteArchive { .. })));

        cfg.restore.force = true;
        let summary = restore(&cfg, &unfinished, &table).await?;
        assert_eq!(summary.records, 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_there_is_no_manifest_at_all() {
        let mut cfg = config(10, 1024);
        cfg.restore.force = true;
        let err = restore(&cfg, &InMemoryBlobStore::new(), &InMemoryTable::new("orders"))
            .await
            .expect_err("💀 nothing to follow");
        assert!(matches!(err, DumpError::Preflight(PreflightError::MissingManifest { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_bad_line_stops_the_restore_halfway() {
        let cfg = config(2, 1024);
        let blobs = InMemoryBlobStore::new();
        let good = format!(
            "{}\n{}\n{}\n",
            crate::record::encode_record(&row(0)).expect("💀 encodes"),
            crate::record::encode_record(&row(1)).expect("💀 encodes"),
            crate::record::encode_record(&row(2)).expect("💀 encodes"),
        );
        let bad = format!("{}\n{{broken\n", crate::record::encode_record(&row(3)).expect("💀 encodes"));
        let never = crate::record::encode_record(&row(4)).expect("💀 encodes");
        blobs.insert("bkt", "backups/orders/a", good.into_bytes()).await;
        blobs.insert("bkt", "backups/orders/b", bad.into_bytes()).await;
        blobs.insert("bkt", "backups/orders/c", never.into_bytes()).await;
        let manifest = r#"{"name":"DynamoDB-export","version":3,"entries":[
            {"url":"s3://bkt/backups/orders/a","mandatory":true},
            {"url":"s3://bkt/backups/orders/b","mandatory":true},
            {"url":"s3://bkt/backups/orders/c","mandatory":true}]}"#;
        blobs.insert("bkt", "backups/orders/manifest", manifest.as_bytes().to_vec()).await;
        blobs.insert("bkt", "backups/orders/_SUCCESS", Vec::new()).await;

        let table = InMemoryTable::new("orders");
        let err = restore(&cfg, &blobs, &table).await.expect_err("💀 line two of b is junk");
        match err {
            DumpError::Codec { stage, context, .. } => {
                assert_eq!(stage, Stage::Download);
                assert_eq!(context, "s3://bkt/backups/orders/b line 2");
            }
            other => panic!("💀 expected a codec error, got {other:?}"),
        }
        assert_eq!(table.records().await, rows(4), "everything before the bad line made it in");
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_failed_write_is_the_error_you_see() -> Result<()> {
        let cfg = config(1, 1024);
        let blobs = InMemoryBlobStore::new();
        export(&cfg, &InMemoryTable::with_records("orders", rows(6)).await, &blobs).await?;

        let table = InMemoryTable::new("orders");
        table.fail_next_write("ValidationException").await;
        let err = restore(&cfg, &blobs, &table).await.expect_err("💀 the write is rejected");
        assert_eq!(err.stage(), Some(Stage::Write));
        assert!(table.records().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_bad_config_never_touches_the_network() {
        let mut cfg = config(0, 1024);
        let table = InMemoryTable::with_records("orders", rows(2)).await;
        let blobs = InMemoryBlobStore::new();
        let err = export(&cfg, &table, &blobs).await.expect_err("💀 zero batch size");
        assert!(matches!(err, DumpError::Configuration(_)));
        assert!(table.scan_calls().await.is_empty());

        cfg.table.batch_size = 10;
        cfg.archive.date_suffix = true;
        let err = restore(&cfg, &blobs, &table).await.expect_err("💀 date suffix on restore");
        assert!(matches!(err, DumpError::Configuration(_)));
    }
}
