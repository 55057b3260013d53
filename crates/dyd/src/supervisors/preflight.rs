//! 🚧 Preflight: the bouncer at the restore door.
//!
//! Three gates, in order, each able to send you home:
//! 1. 🩺 Is the target table there, ACTIVE, and (unless appending) empty?
//! 2. ✅ Did the export that made this archive actually finish? (`_SUCCESS`, or `force`)
//! 3. 📜 Is there a manifest to follow?
//!
//! Nothing is written anywhere until all three say yes. The loaded manifest is the
//! prize for getting through, and it goes straight to the BlobSourceWorker.

use std::time::Duration;

use tracing::{info, warn};

use crate::backends::{BlobBackend, Table, TableBackend, TableState};
use crate::error::{DumpError, PreflightError, Result, Stage};
use crate::manifest::{ArchiveLayout, Manifest, load_manifest, success_marker_exists};
use crate::throttle::Backoff;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PreflightOptions {
    pub append: bool,
    pub force: bool,
    /// 🐢 Seed for riding out a throttled HEAD or GET on the archive.
    pub wait: Duration,
}

#[derive(Debug)]
pub(crate) struct Preflight<'a> {
    table: &'a TableBackend,
    store: &'a BlobBackend,
    layout: &'a ArchiveLayout,
    options: PreflightOptions,
    backoff: Backoff,
}

impl<'a> Preflight<'a> {
    pub(crate) fn new(
        table: &'a TableBackend,
        store: &'a BlobBackend,
        layout: &'a ArchiveLayout,
        options: PreflightOptions,
    ) -> Self {
        Self {
            table,
            store,
            layout,
            options,
            backoff: Backoff::new(options.wait),
        }
    }

    /// 🚀 Run every gate in order. Returns the manifest once they all pass.
    pub(crate) async fn run(mut self) -> Result<Manifest> {
        self.check_target().await?;
        self.check_completion_marker().await?;
        let manifest = load_manifest(self.store, self.layout, &mut self.backoff).await?;
        info!("🟢 pre-flight passed, {} objects to restore", manifest.len());
        Ok(manifest)
    }

    async fn check_target(&self) -> Result<()> {
        let table = self.table.name().to_string();
        let state = self
            .table
            .describe()
            .await
            .map_err(|e| DumpError::from_backend(Stage::Preflight, e))?;
        match state {
            TableState::Missing => Err(PreflightError::TargetMissing { table }.into()),
            TableState::NotActive { status } => Err(PreflightError::TargetNotWritable { table, status }.into()),
            TableState::Active { item_count } if item_count > 0 && !self.options.append => {
                Err(PreflightError::TargetNotEmpty { table, count: item_count }.into())
            }
            TableState::Active { item_count } => {
                if item_count > 0 {
                    info!("➕ appending to {} (~{} items already there)", table, item_count);
                }
                Ok(())
            }
        }
    }

    async fn check_completion_marker(&mut self) -> Result<()> {
        if success_marker_exists(self.store, self.layout, &mut self.backoff).await? {
            return Ok(());
        }
        let location = self.layout.locator(&self.layout.marker_key());
        if self.options.force {
            warn!("⚠️ no success marker at {}; restoring anyway because force is set", location);
            Ok(())
        } else {
            Err(PreflightError::IncompleteArchive { location }.into())
        }
    }
}
