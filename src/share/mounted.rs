//! Filesystem-mounted share client
//!
//! Cloud file shares are routinely mounted into the filesystem (SMB or NFS)
//! by the compute environment. `MountedShare` reaches the run's share
//! directory through such a mount:
//!
//! - mount layout: `<base>/<account>.<endpoint_suffix>/<share_path>/...`
//! - the connect probe requires the account mount to exist
//! - the run directory is created during connect
//!
//! Credentials are consumed by whatever established the mount; this client
//! only needs the endpoint to locate it.

use std::fs;
use std::path::{Path, PathBuf};

use super::{FileShare, ShareConnector, ShareError};
use crate::context::DataStoreConfig;

/// Default directory where the environment mounts file shares
pub const DEFAULT_MOUNT_BASE: &str = "/mnt/runcache";

/// `FileShare` over a filesystem mount of the share.
pub struct MountedShare {
    /// Endpoint the share was addressed by, kept for error context
    endpoint: String,

    /// Run directory inside the mounted share
    dir: PathBuf,
}

impl MountedShare {
    pub(crate) fn new(endpoint: String, dir: PathBuf) -> Self {
        Self { endpoint, dir }
    }

    /// Run directory this client operates on.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl FileShare for MountedShare {
    fn ensure_ready(&self) -> Result<(), ShareError> {
        if !self.dir.is_dir() {
            return Err(ShareError::Unreachable {
                endpoint: self.endpoint.clone(),
                message: format!("share directory {} is missing", self.dir.display()),
            });
        }
        Ok(())
    }

    fn upload(&self, name: &str, source: &Path) -> Result<(), ShareError> {
        // Replace atomically on the share side: hidden temp name, then rename.
        let target = self.file_path(name);
        let tmp = self.dir.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));
        let written = (|| {
            fs::copy(source, &tmp)?;
            fs::rename(&tmp, &target)?;
            Ok(())
        })();
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written
    }

    fn download(&self, name: &str, dest: &Path) -> Result<(), ShareError> {
        let source = self.file_path(name);
        if !source.is_file() {
            return Err(ShareError::NotFound {
                name: name.to_string(),
            });
        }
        fs::copy(&source, dest)?;
        Ok(())
    }

    fn exists(&self, name: &str) -> Result<bool, ShareError> {
        Ok(self.file_path(name).is_file())
    }

    fn delete(&self, name: &str) -> Result<bool, ShareError> {
        let path = self.file_path(name);
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        Ok(true)
    }

    fn list(&self) -> Result<Vec<String>, ShareError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            // Hidden names are in-flight uploads.
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }
}

/// Connects to shares the environment has mounted under a base directory.
pub struct MountedShareConnector {
    /// Directory the environment mounts account shares under
    mount_base: PathBuf,
}

impl MountedShareConnector {
    /// Create a connector for mounts under the given base directory.
    pub fn new(mount_base: impl Into<PathBuf>) -> Self {
        Self {
            mount_base: mount_base.into(),
        }
    }
}

impl Default for MountedShareConnector {
    fn default() -> Self {
        Self::new(DEFAULT_MOUNT_BASE)
    }
}

impl ShareConnector for MountedShareConnector {
    fn connect(
        &self,
        data_store: &DataStoreConfig,
        share_path: &str,
    ) -> Result<Box<dyn FileShare>, ShareError> {
        let endpoint = data_store.endpoint();
        let mount_root = self.mount_base.join(&endpoint);
        if !mount_root.is_dir() {
            return Err(ShareError::Unreachable {
                endpoint,
                message: format!("no mount at {}", mount_root.display()),
            });
        }
        let dir = mount_root.join(share_path);
        fs::create_dir_all(&dir).map_err(|e| ShareError::Unreachable {
            endpoint: endpoint.clone(),
            message: format!("cannot prepare {}: {}", dir.display(), e),
        })?;
        Ok(Box::new(MountedShare::new(endpoint, dir)))
    }
}
