// ai
//! 📜 Manifest Store: the archive's table of contents and its "we made it" flag.
//!
//! An archive is a pile of anonymous objects under a prefix. A pile is not a backup.
//! The manifest turns the pile into an ordered list, and the `_SUCCESS` marker is the
//! signature at the bottom saying the list is complete.
//!
//! 🧠 Knowledge graph:
//! - `Manifest { name, version, entries }`: the JSON AWS Data Pipeline writes, byte for byte
//!   in shape, so either tool can read the other's archives.
//! - `ArchiveLayout { bucket, prefix }`: where everything lives: `<prefix>/manifest`,
//!   `<prefix>/_SUCCESS`, `<prefix>/<uuid>`.
//! - Marker goes in strictly AFTER the manifest lands. A marker without a manifest would
//!   be a signed blank cheque.
//! - `BlobLocator` parses `s3://bucket/key` entries back into something fetchable.
//! - Every store call here rides out "SlowDown" on the caller's `Backoff`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::backends::{BlobBackend, BlobStore};
use crate::error::{DumpError, PreflightError, Result, Stage};
use crate::throttle::{Backoff, retry_throttled};

/// 🏷️ The name Data Pipeline stamps on its exports. We wear the same badge.
pub const MANIFEST_NAME: &str = "DynamoDB-export";
/// 🔢 Manifest format version, also borrowed from Data Pipeline.
pub const MANIFEST_VERSION: i64 = 3;
/// 📡 The only locator scheme this store resolves.
pub const BLOB_SCHEME: &str = "s3";

const MANIFEST_OBJECT: &str = "manifest";
const SUCCESS_MARKER_OBJECT: &str = "_SUCCESS";

/// 📄 One archive object reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    pub mandatory: bool,
}

/// 📜 The ordered table of contents. Entries are append-only; order is restore order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: i64,
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            name: MANIFEST_NAME.to_string(),
            version: MANIFEST_VERSION,
            entries: Vec::new(),
        }
    }
}

impl Manifest {
    pub(crate) fn push_mandatory(&mut self, url: String) {
        self.entries.push(ManifestEntry { url, mandatory: true });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 🗺️ A parsed `<scheme>://<container>/<path>` locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocator {
    pub scheme: String,
    pub container: String,
    pub key: String,
}

impl BlobLocator {
    /// 🔍 Parse a manifest URL. `None` when it isn't shaped like a locator at all.
    ///
    /// The key never keeps a leading `/`; S3 keys don't have one, URL paths do.
    pub fn parse(url: &str) -> Option<Self> {
        let (scheme, rest) = url.split_once("://")?;
        let (container, key) = rest.split_once('/').unwrap_or((rest, ""));
        if scheme.is_empty() || container.is_empty() {
            return None;
        }
        Some(Self {
            scheme: scheme.to_ascii_lowercase(),
            container: container.to_string(),
            key: key.trim_start_matches('/').to_string(),
        })
    }

    pub fn is_blob(&self) -> bool {
        self.scheme == BLOB_SCHEME
    }
}

/// 🏠 Where an archive lives: one bucket, one prefix, three kinds of objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    pub bucket: String,
    pub prefix: String,
}

impl ArchiveLayout {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            bucket: bucket.into(),
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    fn key_for(&self, object: &str) -> String {
        if self.prefix.is_empty() {
            object.to_string()
        } else {
            format!("{}/{}", self.prefix, object)
        }
    }

    pub fn manifest_key(&self) -> String {
        self.key_for(MANIFEST_OBJECT)
    }

    pub fn marker_key(&self) -> String {
        self.key_for(SUCCESS_MARKER_OBJECT)
    }

    /// 🎲 A fresh, never-before-seen object key for the next data object.
    pub fn new_object_key(&self) -> String {
        self.key_for(&Uuid::new_v4().hyphenated().to_string())
    }

    /// 📡 Fully qualified `s3://bucket/key` locator for a key in this archive.
    pub fn locator(&self, key: &str) -> String {
        format!("{}://{}/{}", BLOB_SCHEME, self.bucket, key)
    }
}

/// 💾 Persist the manifest as JSON at `<prefix>/manifest`.
pub(crate) async fn persist_manifest(
    store: &BlobBackend,
    layout: &ArchiveLayout,
    manifest: &Manifest,
    backoff: &mut Backoff,
) -> Result<()> {
    let key = layout.manifest_key();
    let location = layout.locator(&key);
    let body = serde_json::to_vec(manifest)
        .map_err(|e| DumpError::codec(Stage::Manifest, format!("manifest for {location}"), e))?;
    info!("📜 writing manifest with {} entries to {}", manifest.len(), location);
    let (key, body) = (&key, &body);
    retry_throttled(backoff, &location, move || store.put_object(&layout.bucket, key, body.clone()))
        .await
        .map_err(|e| DumpError::from_backend(Stage::Manifest, e))
}

/// ✅ Drop the zero-byte `_SUCCESS` marker. Only ever called after `persist_manifest`.
pub(crate) async fn write_success_marker(
    store: &BlobBackend,
    layout: &ArchiveLayout,
    backoff: &mut Backoff,
) -> Result<()> {
    let key = layout.marker_key();
    let location = layout.locator(&key);
    info!("✅ writing success marker {}", location);
    let key = &key;
    retry_throttled(backoff, &location, move || store.put_object(&layout.bucket, key, Vec::new()))
        .await
        .map_err(|e| DumpError::from_backend(Stage::Manifest, e))
}

/// 🔍 Is the `_SUCCESS` marker there?
pub(crate) async fn success_marker_exists(
    store: &BlobBackend,
    layout: &ArchiveLayout,
    backoff: &mut Backoff,
) -> Result<bool> {
    let key = layout.marker_key();
    let location = layout.locator(&key);
    let key = &key;
    let exists = retry_throttled(backoff, &location, move || store.object_exists(&layout.bucket, key))
        .await
        .map_err(|e| DumpError::from_backend(Stage::Preflight, e))?;
    debug!("🔍 success marker {} present: {}", location, exists);
    Ok(exists)
}

/// 📥 Fetch and parse the manifest. Missing is a pre-flight refusal, not a transport error.
pub(crate) async fn load_manifest(
    store: &BlobBackend,
    layout: &ArchiveLayout,
    backoff: &mut Backoff,
) -> Result<Manifest> {
    let key = layout.manifest_key();
    let location = layout.locator(&key);
    let key_ref = &key;
    let body = retry_throttled(backoff, &location, move || store.get_object(&layout.bucket, key_ref))
        .await
        .map_err(|e| DumpError::from_backend(Stage::Manifest, e))?
        .ok_or_else(|| PreflightError::MissingManifest { location: location.clone() })?;
    let manifest: Manifest =
        serde_json::from_slice(&body).map_err(|e| DumpError::codec(Stage::Manifest, location.clone(), e))?;
    info!("📜 loaded manifest '{}' v{} with {} entries from {}", manifest.name, manifest.version, manifest.len(), location);
    Ok(manifest)
}
