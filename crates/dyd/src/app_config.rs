//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! 🧠 Knowledge graph:
//! - `[table]` is the DynamoDB side, `[archive]` is the S3 side, `[restore]` holds the two
//!   restore-only switches. Each side may live in its own region and its own account.
//! - `DYD_TABLE__NAME=orders` is the env spelling of `[table] name = "orders"`.
//! - Figment reads env values as TOML-ish literals, so `DYD_ARCHIVE__ACCOUNT_ID=012345678901`
//!   would arrive as a number (minus its leading zero). Text keys are re-read verbatim.
//! - Loading only parses. `validate(mode)` is where a config gets told it's wrong.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::error::{DumpError, Result};

/// 🎭 Role assumed in the other account when `account_id` is set and nobody says otherwise.
pub const DEFAULT_ROLE_NAME: &str = "OrganizationAccountAccessRole";
const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_WAIT_MS: u64 = 100;
const DEFAULT_MAX_OBJECT_SIZE_BYTES: usize = 10 * 1024 * 1024;
const DATE_SUFFIX_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";
const ENV_PREFIX: &str = "DYD_";

/// 🔤 Keys that are always text, however numeric they look in the environment.
const VERBATIM_ENV_KEYS: &[&str] = &[
    "table.name",
    "table.region",
    "table.account_id",
    "table.role_name",
    "archive.bucket",
    "archive.prefix",
    "archive.region",
    "archive.account_id",
    "archive.role_name",
];

/// 🧭 Which way this run is going. Validation rules differ a little per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Export,
    Restore,
}

/// 🌍 Where one side of the run lives, and whose credentials it borrows.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct AwsSideConfig {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default = "default_role_name")]
    pub role_name: String,
}

/// 🗄️ The DynamoDB table being exported from or restored into.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub name: String,
    /// 📄 Scan page size on export, write batch size on restore.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 💤 Starting inter-batch wait, also the seed of the throttling backoff.
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,
    #[serde(flatten)]
    pub aws: AwsSideConfig,
}

/// 🪣 The S3 location of the archive.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    pub bucket: String,
    pub prefix: String,
    #[serde(default)]
    pub date_suffix: bool,
    #[serde(default = "default_max_object_size_bytes")]
    pub max_object_size_bytes: usize,
    #[serde(flatten)]
    pub aws: AwsSideConfig,
}

/// 🚧 Restore-only switches. Both default to the cautious answer.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// ➕ Write into a table that already has items.
    #[serde(default)]
    pub append: bool,
    /// 🔨 Restore even without a `_SUCCESS` marker.
    #[serde(default)]
    pub force: bool,
}

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub table: TableConfig,
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub restore: RestoreOptions,
}

fn default_role_name() -> String {
    DEFAULT_ROLE_NAME.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_wait_ms() -> u64 {
    DEFAULT_WAIT_MS
}

fn default_max_object_size_bytes() -> usize {
    DEFAULT_MAX_OBJECT_SIZE_BYTES
}

fn check_side(section: &str, side: &AwsSideConfig) -> Result<()> {
    if side.account_id.as_deref().is_some_and(|id| !id.trim().is_empty()) && side.role_name.trim().is_empty() {
        return Err(DumpError::Configuration(format!(
            "[{section}] account_id is set but role_name is empty"
        )));
    }
    Ok(())
}

impl AppConfig {
    /// 🔍 Reject anything that would fail later, before a single request goes out.
    pub fn validate(&self, mode: RunMode) -> Result<()> {
        let required = [
            ("table.name", &self.table.name),
            ("archive.bucket", &self.archive.bucket),
            ("archive.prefix", &self.archive.prefix),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(DumpError::Configuration(format!("{key} is required")));
            }
        }
        if self.table.batch_size == 0 {
            return Err(DumpError::Configuration("table.batch_size must be at least 1".into()));
        }
        if self.archive.max_object_size_bytes == 0 {
            return Err(DumpError::Configuration(
                "archive.max_object_size_bytes must be at least 1".into(),
            ));
        }
        check_side("table", &self.table.aws)?;
        check_side("archive", &self.archive.aws)?;
        if mode == RunMode::Restore && self.archive.date_suffix {
            return Err(DumpError::Configuration(
                "archive.date_suffix only applies to export; restore reads an exact prefix".into(),
            ));
        }
        Ok(())
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.table.wait_ms)
    }

    /// 📁 The prefix this run actually uses. With `date_suffix`, `backups/orders`
    /// becomes `backups/orders/2024-05-01-13-37-00`.
    pub fn resolved_prefix(&self, now: DateTime<Utc>) -> String {
        let base = self.archive.prefix.trim_end_matches('/');
        if self.archive.date_suffix {
            format!("{}/{}", base, now.format(DATE_SUFFIX_FORMAT))
        } else {
            base.to_string()
        }
    }
}

/// 🚀 Load the config: from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (`DYD_*`, nested keys split on `__`) with an optional
/// TOML file. TOML wins on conflicts. No file means env only; there's no default path.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let env = || Env::prefixed(ENV_PREFIX).split("__");
    let mut config = Figment::new().merge(env());
    for (key, value) in env().only(VERBATIM_ENV_KEYS).iter() {
        config = config.merge(Serialized::default(key.as_str(), value));
    }
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (DYD_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (DYD_*). \
                 No file was provided, this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}
