//! Cache store contract shared by every store variant
//!
//! A run gets exactly one cache store, picked by `selection::classify`:
//! - `memory`: ephemeral, in-process only
//! - `local_file`: rooted at the run's temp location
//! - `remote_file`: run-scoped directory on a remote file share
//!
//! All variants expose the same byte-oriented surface. `put` is idempotent
//! with last-write-wins semantics, `get` of an absent key is an error rather
//! than a default value, and every operation is bounded by the store's task
//! timeout.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

mod file;
mod memory;
mod remote;

pub use file::FileCacheStore;
pub use memory::MemoryCacheStore;
pub use remote::RemoteFileCacheStore;

/// Schema version for store_manifest.json
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for store_manifest.json
pub const MANIFEST_SCHEMA_ID: &str = "runcache/store_manifest@1";

/// File name of the manifest written by file-backed stores at construction
pub const STORE_MANIFEST_FILENAME: &str = "store_manifest.json";

/// Suffix of entry payload files
pub(crate) const PAYLOAD_SUFFIX: &str = ".bin";

/// Suffix of entry metadata sidecar files
pub(crate) const META_SUFFIX: &str = ".meta.json";

/// Cache result type
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors from cache store construction and operations.
///
/// `Configuration` and `Connection` are construction-time failures and are
/// surfaced immediately, never deferred to the first operation.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("connection error: share at '{endpoint}' unreachable: {message}")]
    Connection { endpoint: String, message: String },

    #[error("operation '{operation}' exceeded task timeout: {elapsed:?} elapsed, limit {limit:?}")]
    Timeout {
        operation: String,
        elapsed: Duration,
        limit: Duration,
    },

    #[error("key not found: {key}")]
    NotFound { key: String },

    #[error("I/O error during {operation} at {path}: {source}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl CacheError {
    /// Build a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Build a `Connection` error for an unreachable share endpoint.
    pub fn connection(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Build a `NotFound` error for an absent key.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Build an `Io` error with operation and path context.
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Build a `Serialization` error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Stable lowercase label for logs and observers.
    pub fn subkind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Connection { .. } => "connection",
            Self::Timeout { .. } => "timeout",
            Self::NotFound { .. } => "not_found",
            Self::Io { .. } => "io",
            Self::Serialization { .. } => "serialization",
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Store variant chosen for a run.
///
/// - `memory`: no run id, nothing worth persisting
/// - `local_file`: run on the local target, or no remote data store attached
/// - `remote_file`: identified run on a remote target with a data store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Ephemeral in-process map
    Memory,
    /// Filesystem store rooted at the run's temp location
    LocalFile,
    /// Remote file share store scoped to the run id
    RemoteFile,
}

impl StoreKind {
    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "local_file" => Some(Self::LocalFile),
            "remote_file" => Some(Self::RemoteFile),
            _ => None,
        }
    }

    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::LocalFile => "local_file",
            Self::RemoteFile => "remote_file",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry count and payload size for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries currently stored
    pub entries: usize,
    /// Total payload bytes across all entries
    pub total_bytes: u64,
}

/// Manifest written by file-backed stores at construction
/// (`store_manifest.json` at the store root).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreManifest {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// When the store was constructed
    pub created_at: DateTime<Utc>,

    /// Store variant
    pub kind: StoreKind,

    /// Run identifier, when the run has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    /// Task timeout applied to every operation, in seconds
    pub task_timeout_seconds: u64,
}

impl StoreManifest {
    /// Build a manifest for a freshly constructed store.
    pub fn new(kind: StoreKind, run_id: Option<&str>, task_timeout: Duration) -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            schema_id: MANIFEST_SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            kind,
            run_id: run_id.map(|id| id.to_string()),
            task_timeout_seconds: task_timeout.as_secs(),
        }
    }
}

/// Metadata sidecar stored next to each entry payload
/// (`<digest>.meta.json` next to `<digest>.bin`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Original cache key (payload files are digest-named)
    pub key: String,

    /// Payload size in bytes
    pub size: u64,

    /// When the entry was last written
    pub created_at: DateTime<Utc>,
}

impl EntryMeta {
    /// Build metadata for a payload about to be written.
    pub fn new(key: &str, size: u64) -> Self {
        Self {
            key: key.to_string(),
            size,
            created_at: Utc::now(),
        }
    }
}

/// Common capability contract of all store variants.
///
/// Object safe; the selector hands stores out as `Box<dyn CacheStore>`.
pub trait CacheStore: Send + Sync {
    /// Which variant this store is.
    fn kind(&self) -> StoreKind;

    /// Task timeout applied to every operation on this store.
    fn task_timeout(&self) -> Duration;

    /// Local root directory for file-backed stores.
    fn local_root(&self) -> Option<&Path> {
        None
    }

    /// Share-side path for the remote store (equals the run id).
    fn remote_path(&self) -> Option<&str> {
        None
    }

    /// Store an artifact under a key. Idempotent; last write wins.
    fn put(&self, key: &str, value: &[u8]) -> CacheResult<()>;

    /// Retrieve an artifact by key. Absent keys are `NotFound`.
    fn get(&self, key: &str) -> CacheResult<Vec<u8>>;

    /// Whether a key currently has an entry.
    fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Remove an entry. Returns false when the key was absent.
    fn remove(&self, key: &str) -> CacheResult<bool>;

    /// All keys currently stored, sorted.
    fn keys(&self) -> CacheResult<Vec<String>>;

    /// Drop every entry.
    fn clear(&self) -> CacheResult<()>;

    /// Entry count and total payload bytes.
    fn stats(&self) -> CacheResult<CacheStats>;
}

/// Typed and batch helpers layered over the byte-oriented contract.
pub trait CacheStoreExt: CacheStore {
    /// Serialize a value as JSON and store it under a key.
    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> CacheResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put(key, &bytes)
    }

    /// Retrieve a JSON value by key.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> CacheResult<T> {
        let bytes = self.get(key)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Store several entries. Stops at the first failure.
    fn put_many(&self, entries: &[(&str, &[u8])]) -> CacheResult<()> {
        for (key, value) in entries {
            self.put(key, value)?;
        }
        Ok(())
    }

    /// Retrieve several entries. Absent keys are omitted from the result.
    fn get_many(&self, keys: &[&str]) -> CacheResult<BTreeMap<String, Vec<u8>>> {
        let mut found = BTreeMap::new();
        for key in keys {
            match self.get(key) {
                Ok(value) => {
                    found.insert(key.to_string(), value);
                }
                Err(CacheError::NotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(found)
    }
}

impl<S: CacheStore + ?Sized> CacheStoreExt for S {}

/// Reject keys the contract does not support.
pub(crate) fn validate_key(key: &str) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::configuration("cache key must not be empty"));
    }
    Ok(())
}

/// Filesystem-safe entry address: first 16 hex chars of SHA-256 of the key.
///
/// Keys are arbitrary strings; digest addressing keeps path separators and
/// unicode from escaping the store root. The original key lives in the
/// entry's metadata sidecar.
pub(crate) fn key_digest(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..8])
}

/// Payload file name for a key.
pub(crate) fn payload_name(key: &str) -> String {
    format!("{}{}", key_digest(key), PAYLOAD_SUFFIX)
}

/// Metadata sidecar file name for a key.
pub(crate) fn meta_name(key: &str) -> String {
    format!("{}{}", key_digest(key), META_SUFFIX)
}
