//! Remote file share seam for the remote store
//!
//! The remote store never embeds a cloud storage SDK. It talks to a
//! `FileShare` obtained from a `ShareConnector`:
//! - `FileShare` trait: file-level interface to the run's share directory
//! - `ShareConnector` trait: reachability probe at store construction
//! - `MountedShare` / `MountedShareConnector`: production impl over a
//!   filesystem mount of the share
//!
//! An SDK-backed client would be another `FileShare` impl downstream. Tests
//! use `mock::MockShare`.

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::context::DataStoreConfig;

mod mounted;

pub use mounted::{MountedShare, MountedShareConnector, DEFAULT_MOUNT_BASE};

/// Share errors
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("share at '{endpoint}' unreachable: {message}")]
    Unreachable { endpoint: String, message: String },

    #[error("no share file named '{name}'")]
    NotFound { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// File-level interface to the run's directory on a remote share.
///
/// Names are plain file names inside the run directory, never paths.
/// Payloads move through local staging files; mounted shares and cloud
/// transfer clients both copy whole files.
pub trait FileShare: Send + Sync {
    /// Check the share directory is usable.
    fn ensure_ready(&self) -> Result<(), ShareError>;

    /// Copy a local file to the share under `name`, replacing any old file.
    fn upload(&self, name: &str, source: &Path) -> Result<(), ShareError>;

    /// Copy the share file `name` to a local path.
    fn download(&self, name: &str, dest: &Path) -> Result<(), ShareError>;

    /// Whether a share file named `name` exists.
    fn exists(&self, name: &str) -> Result<bool, ShareError>;

    /// Delete the share file `name`. Returns false when absent.
    fn delete(&self, name: &str) -> Result<bool, ShareError>;

    /// Names of all files in the run directory, sorted.
    fn list(&self) -> Result<Vec<String>, ShareError>;
}

/// Builds `FileShare` clients from data store credentials.
///
/// `connect` performs the reachability probe. An unreachable share is a
/// construction-time failure of the remote store, never deferred to the
/// first operation.
pub trait ShareConnector: Send + Sync {
    /// Connect to the share directory `share_path` on the account's share.
    fn connect(
        &self,
        data_store: &DataStoreConfig,
        share_path: &str,
    ) -> Result<Box<dyn FileShare>, ShareError>;
}
