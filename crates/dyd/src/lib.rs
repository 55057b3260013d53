//! 🗄️➡️🪣 dyd: DynamoDB to S3 and back again, one typed JSON line at a time.
//!
//! 🧠 Knowledge graph:
//! - `export`: scan a table, write newline-delimited typed JSON objects under a prefix,
//!   then a manifest, then `_SUCCESS`. The archive looks exactly like an AWS Data Pipeline export.
//! - `restore`: check the target table and the archive, then replay the manifest into the table.
//! - The `*_with` variants take a ready-made context, for callers that bring their own backends.
//!
//! 🦆 The duck has been exported and restored 14 times. It claims to feel the same.

pub mod app_config;
pub mod backends;
pub mod context;
pub mod error;
pub mod manifest;
pub mod progress;
pub mod record;
mod supervisors;
mod throttle;

use tracing::info;

use crate::app_config::{AppConfig, RunMode};
use crate::context::{ExportContext, RestoreContext};
use crate::error::Result;
use crate::progress::RunSummary;
use crate::supervisors::Supervisor;

/// 📤 Export the configured table to the configured archive location, using real AWS clients.
pub async fn export(app_config: AppConfig) -> Result<RunSummary> {
    app_config.validate(RunMode::Export)?;
    info!("🔌 connecting export context");
    let context = ExportContext::connect(&app_config).await;
    export_with(app_config, context).await
}

/// 📤 Export using the backends in `context`.
pub async fn export_with(app_config: AppConfig, context: ExportContext) -> Result<RunSummary> {
    Supervisor::new(app_config).export(context).await
}

/// 📥 Restore the configured archive into the configured table, using real AWS clients.
pub async fn restore(app_config: AppConfig) -> Result<RunSummary> {
    app_config.validate(RunMode::Restore)?;
    info!("🔌 connecting restore context");
    let context = RestoreContext::connect(&app_config).await;
    restore_with(app_config, context).await
}

/// 📥 Restore using the backends in `context`.
pub async fn restore_with(app_config: AppConfig, context: RestoreContext) -> Result<RunSummary> {
    Supervisor::new(app_config).restore(context).await
}
