//! 💀 Errors: the many ways a table can refuse to leave the building.
//!
//! 🧠 Knowledge graph:
//! - `DumpError` is what every pipeline entry point returns. One variant per category,
//!   so the CLI can pick an exit code without string-sniffing.
//! - `PreflightError` is the restore gate's refusal letter. Always fatal, never retried.
//! - Backends speak `BackendError` (see `backends.rs`); the workers translate it into
//!   `DumpError` and stamp on the `Stage` they were in when it blew up.
//! - Throttling is the only category anyone retries. Every worker rides it out in place,
//!   so `Throttling` only surfaces from a backend call made outside a retry loop.
//!
//! 🦆 The duck has been asked to classify itself. It refused. `Pipeline` it is.

use std::fmt;

use thiserror::Error;

use crate::backends::BackendError;

/// 🎯 The crate-wide result. Short, sweet, typed.
pub type Result<T, E = DumpError> = std::result::Result<T, E>;

/// 📍 Where in the run things went sideways. Shows up in every abort message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preflight,
    Scan,
    Upload,
    Manifest,
    Download,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Preflight => "pre-flight",
            Stage::Scan => "scan",
            Stage::Upload => "upload",
            Stage::Manifest => "manifest",
            Stage::Download => "download",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

/// 💀 Every fatal condition an export or restore can hit.
#[derive(Debug, Error)]
pub enum DumpError {
    /// 🔧 Bad or contradictory parameters. Caught before a single byte moves.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 🚧 The restore gate said no.
    #[error("pre-flight check failed: {0}")]
    Preflight(#[from] PreflightError),

    /// 🐢 Capacity exceeded and nobody retried it.
    #[error("throttled during {stage}: {message}")]
    Throttling { stage: Stage, message: String },

    /// 📡 The network or the store failed in some non-throttling way.
    #[error("transport failure during {stage}: {message}")]
    Transport {
        stage: Stage,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// 🔤 A record, a line or a manifest would not (de)serialize.
    #[error("codec failure during {stage} ({context}): {source}")]
    Codec {
        stage: Stage,
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// 🧵 A worker task panicked, was cancelled, or hung up on its sibling.
    #[error("pipeline failure: {0}")]
    Pipeline(String),
}

impl DumpError {
    /// 🏷️ Translate a backend failure into the crate taxonomy, tagged with the stage.
    pub(crate) fn from_backend(stage: Stage, err: BackendError) -> Self {
        match err {
            BackendError::Throttled(message) => DumpError::Throttling { stage, message },
            BackendError::Service { message, source } => DumpError::Transport {
                stage,
                message,
                source,
            },
        }
    }

    pub(crate) fn codec(stage: Stage, context: impl Into<String>, source: serde_json::Error) -> Self {
        DumpError::Codec {
            stage,
            context: context.into(),
            source,
        }
    }

    /// 🎯 The stage this error was raised in, when it carries one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            DumpError::Configuration(_) | DumpError::Pipeline(_) => None,
            DumpError::Preflight(_) => Some(Stage::Preflight),
            DumpError::Throttling { stage, .. }
            | DumpError::Transport { stage, .. }
            | DumpError::Codec { stage, .. } => Some(*stage),
        }
    }
}

/// 🚧 Reasons the restore gate refuses to open.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreflightError {
    #[error("target table '{table}' already holds ~{count} items; pass append to restore into it")]
    TargetNotEmpty { table: String, count: i64 },

    #[error("target table '{table}' does not exist")]
    TargetMissing { table: String },

    #[error("target table '{table}' is {status}, not ACTIVE, so it is not writable")]
    TargetNotWritable { table: String, status: String },

    #[error("no _SUCCESS marker at {location}; the export may not have finished (force overrides)")]
    IncompleteArchive { location: String },

    #[error("no manifest at {location}; nothing to restore")]
    MissingManifest { location: String },
}
