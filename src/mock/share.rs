//! In-memory mock share
//!
//! In-process `FileShare` and `ShareConnector` for tests. Files live in a
//! shared map; clones of a `MockShare` see the same state, so a test can
//! inspect what a store uploaded. Failures and delays are injected through
//! `FailureInjector`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use super::failure::{FailureConfig, FailureInjector, InjectedFailure, ShareOp};
use crate::context::DataStoreConfig;
use crate::share::{FileShare, ShareConnector, ShareError};

/// Shared state behind a mock share
#[derive(Debug, Default)]
struct MockShareState {
    /// Share files by name
    files: BTreeMap<String, Vec<u8>>,
    /// Failure injection
    injector: FailureInjector,
}

/// In-memory `FileShare` for tests.
#[derive(Clone, Default)]
pub struct MockShare {
    state: Arc<Mutex<MockShareState>>,
}

impl MockShare {
    /// Create an empty mock share.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockShareState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Inject a failure for an operation.
    pub fn inject(&self, op: ShareOp, config: FailureConfig) {
        self.state().injector.inject(op, config);
    }

    /// Clear all failure injections.
    pub fn clear_injections(&self) {
        self.state().injector.clear();
    }

    /// Snapshot of the share files (name to bytes).
    pub fn files(&self) -> BTreeMap<String, Vec<u8>> {
        self.state().files.clone()
    }

    /// Seed a share file directly, bypassing injection.
    pub fn seed(&self, name: &str, bytes: &[u8]) {
        self.state().files.insert(name.to_string(), bytes.to_vec());
    }

    /// Apply any injection for an operation: sleep the delay, produce the
    /// configured error. The lock is released before sleeping.
    fn apply_injection(&self, op: ShareOp) -> Result<(), ShareError> {
        let config: Option<FailureConfig> = self.state().injector.check(op);
        if let Some(config) = config {
            if let Some(delay) = config.delay {
                thread::sleep(delay);
            }
            match config.failure {
                Some(InjectedFailure::Unreachable) => {
                    return Err(ShareError::Unreachable {
                        endpoint: "mock".to_string(),
                        message: config.message,
                    })
                }
                Some(InjectedFailure::Io) => {
                    return Err(ShareError::Io(io::Error::new(
                        io::ErrorKind::Other,
                        config.message,
                    )))
                }
                None => {}
            }
        }
        Ok(())
    }
}

impl FileShare for MockShare {
    fn ensure_ready(&self) -> Result<(), ShareError> {
        self.apply_injection(ShareOp::Connect)
    }

    fn upload(&self, name: &str, source: &Path) -> Result<(), ShareError> {
        self.apply_injection(ShareOp::Upload)?;
        let bytes = fs::read(source)?;
        self.state().files.insert(name.to_string(), bytes);
        Ok(())
    }

    fn download(&self, name: &str, dest: &Path) -> Result<(), ShareError> {
        self.apply_injection(ShareOp::Download)?;
        let bytes = self
            .state()
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| ShareError::NotFound {
                name: name.to_string(),
            })?;
        fs::write(dest, bytes)?;
        Ok(())
    }

    fn exists(&self, name: &str) -> Result<bool, ShareError> {
        self.apply_injection(ShareOp::Exists)?;
        Ok(self.state().files.contains_key(name))
    }

    fn delete(&self, name: &str) -> Result<bool, ShareError> {
        self.apply_injection(ShareOp::Delete)?;
        Ok(self.state().files.remove(name).is_some())
    }

    fn list(&self) -> Result<Vec<String>, ShareError> {
        self.apply_injection(ShareOp::List)?;
        Ok(self.state().files.keys().cloned().collect())
    }
}

/// `ShareConnector` handing out clones of one `MockShare`.
///
/// Records the share path of the last connect so tests can assert the
/// remote store asked for the run-scoped directory.
#[derive(Clone, Default)]
pub struct MockConnector {
    share: MockShare,
    last_share_path: Arc<Mutex<Option<String>>>,
}

impl MockConnector {
    /// Create a connector with a fresh empty share.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connector handing out clones of a pre-configured share.
    pub fn with_share(share: MockShare) -> Self {
        Self {
            share,
            last_share_path: Arc::new(Mutex::new(None)),
        }
    }

    /// The underlying share, for test configuration and inspection.
    pub fn share(&self) -> &MockShare {
        &self.share
    }

    /// Share path of the most recent connect.
    pub fn last_share_path(&self) -> Option<String> {
        match self.last_share_path.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ShareConnector for MockConnector {
    fn connect(
        &self,
        _data_store: &DataStoreConfig,
        share_path: &str,
    ) -> Result<Box<dyn FileShare>, ShareError> {
        if let Ok(mut last) = self.last_share_path.lock() {
            *last = Some(share_path.to_string());
        }
        Ok(Box::new(self.share.clone()))
    }
}
