//! 🚀 dyd-cli: the front door, the bouncer, the maitre d' of dynadump.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that loads config,
//! sets up logging, and then lets the real code do the heavy lifting.
//! Like a manager. 🦆
//!
//! 🚪 Exit codes: 0 it worked, 2 the config is wrong, 3 the restore gate said no, 1 anything else.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dyd::app_config::{AppConfig, load_config};
use dyd::error::DumpError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIGURATION: u8 = 2;
const EXIT_PREFLIGHT: u8 = 3;

/// 🗄️➡️🪣 Export a DynamoDB table to S3, or restore it back.
#[derive(Debug, Parser)]
#[command(name = "dyd", version)]
struct Cli {
    /// 🔧 TOML config file. Missing file = environment variables (DYD_*) only.
    #[arg(short, long, global = true, default_value = "dyd.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 📤 Table → archive.
    Export {
        /// 📅 Put this run under `<prefix>/<UTC timestamp>`.
        #[arg(long)]
        date_suffix: bool,
    },
    /// 📥 Archive → table.
    Restore {
        /// ➕ Restore into a table that already has items.
        #[arg(long)]
        append: bool,
        /// 🔨 Restore even if the archive has no `_SUCCESS` marker.
        #[arg(long)]
        force: bool,
    },
}

impl Command {
    /// 🎛️ Flags only ever switch things on; they never turn off what the config file set.
    fn apply(&self, config: &mut AppConfig) {
        match self {
            Command::Export { date_suffix } => config.archive.date_suffix |= date_suffix,
            Command::Restore { append, force } => {
                config.restore.append |= append;
                config.restore.force |= force;
            }
        }
    }
}

fn exit_code_for(err: &DumpError) -> u8 {
    match err {
        DumpError::Configuration(_) => EXIT_CONFIGURATION,
        DumpError::Preflight(_) => EXIT_PREFLIGHT,
        _ => EXIT_FAILURE,
    }
}

/// 🔍 Does the config file exist? If not, we go env-only rather than guessing.
fn config_path(path: &Path) -> anyhow::Result<Option<&Path>> {
    let exists = path.try_exists().context(format!(
        "💀 Couldn't check whether the configuration file exists. Was checking here: '{}'",
        path.display()
    ))?;
    Ok(exists.then_some(path))
}

/// 🚀 main(): where it all begins. The genesis. The big bang.
/// The "I pressed F5 and held my breath" moment.
#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let loaded = config_path(&cli.config).and_then(|path| {
        load_config(path).context(
            "💀 In dyd-cli, main, we couldn't load the configuration. Make sure you didn't forget something obvious.",
        )
    });
    let mut app_config = match loaded {
        Ok(config) => config,
        Err(err) => {
            error!("💀 {:#}", err);
            return ExitCode::from(EXIT_CONFIGURATION);
        }
    };
    cli.command.apply(&mut app_config);

    let result = match cli.command {
        Command::Export { .. } => dyd::export(app_config).await,
        Command::Restore { .. } => dyd::restore(app_config).await,
    };

    match result {
        Ok(summary) => {
            info!("✅ done");
            println!("{}", summary.to_table());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one layer at a time
            let mut cause = std::error::Error::source(&err);
            while let Some(inner) = cause {
                error!("⚠️  cause: {}", inner);
                cause = std::error::Error::source(inner);
            }
            ExitCode::from(exit_code_for(&err))
        }
    }
}
