//! Run execution context consumed by store selection
//!
//! `RunContext` carries everything `selection::classify` looks at:
//! - `temp_location`: scratch directory for this run
//! - `run_target`: compute target name, compared by value against `local`
//! - `run_id`: platform-assigned identifier, absent for throwaway runs
//! - `data_store`: credentials for the remote file share, when one is attached
//! - `task_timeout`: bound applied to every operation of the selected store
//!
//! `DataStoreConfig` is the explicit credential bundle for the remote share.
//! It is validated at the store construction boundary; a missing credential
//! is a `Configuration` error there, never a deferred failure.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::{CacheError, CacheResult};

/// Compute target name that keeps runs on the local store
pub const LOCAL_TARGET: &str = "local";

/// Default task timeout applied to store operations (15 minutes)
pub const DEFAULT_TASK_TIMEOUT_SECONDS: u64 = 900;

/// Default task timeout as a duration
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(DEFAULT_TASK_TIMEOUT_SECONDS);

/// Default endpoint suffix for well-known cloud shares
pub const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Generate a new run ID (ULID-based, lowercase).
///
/// For ad hoc runs that have no platform-assigned identifier.
pub fn generate_run_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

/// Credentials and addressing for a remote file share.
///
/// Exactly the four fields the remote store consumes. At least one of
/// `account_key` / `sas_token` must be present; `validate` enforces that
/// before any connection attempt.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStoreConfig {
    /// Storage account name
    pub account_name: String,

    /// Shared account key, if key auth is used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_key: Option<String>,

    /// SAS token, if token auth is used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sas_token: Option<String>,

    /// Endpoint suffix the share is reached under
    pub endpoint_suffix: String,
}

impl DataStoreConfig {
    /// Create a config for an account under the default endpoint suffix.
    pub fn new(account_name: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            account_key: None,
            sas_token: None,
            endpoint_suffix: DEFAULT_ENDPOINT_SUFFIX.to_string(),
        }
    }

    /// Set the shared account key.
    pub fn with_account_key(mut self, key: impl Into<String>) -> Self {
        self.account_key = Some(key.into());
        self
    }

    /// Set the SAS token.
    pub fn with_sas_token(mut self, token: impl Into<String>) -> Self {
        self.sas_token = Some(token.into());
        self
    }

    /// Set the endpoint suffix.
    pub fn with_endpoint_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.endpoint_suffix = suffix.into();
        self
    }

    /// Endpoint the share is addressed by (`<account>.<suffix>`).
    pub fn endpoint(&self) -> String {
        format!("{}.{}", self.account_name, self.endpoint_suffix)
    }

    /// Check that every required credential field is present.
    pub fn validate(&self) -> CacheResult<()> {
        if self.account_name.trim().is_empty() {
            return Err(CacheError::configuration(
                "data store account_name must not be empty",
            ));
        }
        if self.endpoint_suffix.trim().is_empty() {
            return Err(CacheError::configuration(
                "data store endpoint_suffix must not be empty",
            ));
        }
        let has_key = self
            .account_key
            .as_deref()
            .map_or(false, |k| !k.trim().is_empty());
        let has_sas = self
            .sas_token
            .as_deref()
            .map_or(false, |t| !t.trim().is_empty());
        if !has_key && !has_sas {
            return Err(CacheError::configuration(
                "data store requires an account_key or sas_token",
            ));
        }
        Ok(())
    }
}

// Credentials never reach logs through Debug output.
impl fmt::Debug for DataStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStoreConfig")
            .field("account_name", &self.account_name)
            .field("account_key", &self.account_key.as_ref().map(|_| "<redacted>"))
            .field("sas_token", &self.sas_token.as_ref().map(|_| "<redacted>"))
            .field("endpoint_suffix", &self.endpoint_suffix)
            .finish()
    }
}

/// Execution context of a run, the input to store selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Scratch directory for this run; file-backed stores root here
    pub temp_location: PathBuf,

    /// Compute target name
    pub run_target: String,

    /// Platform-assigned run identifier
    pub run_id: Option<String>,

    /// Remote file share credentials, when a data store is attached
    pub data_store: Option<DataStoreConfig>,

    /// Bound applied to every operation of the selected store
    pub task_timeout: Duration,
}

impl RunContext {
    /// Create a context for a run on the given compute target.
    pub fn new(temp_location: impl Into<PathBuf>, run_target: impl Into<String>) -> Self {
        Self {
            temp_location: temp_location.into(),
            run_target: run_target.into(),
            run_id: None,
            data_store: None,
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }

    /// Create a context for a run on the local target.
    pub fn local(temp_location: impl Into<PathBuf>) -> Self {
        Self::new(temp_location, LOCAL_TARGET)
    }

    /// Set the run identifier.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Attach a remote data store.
    pub fn with_data_store(mut self, data_store: DataStoreConfig) -> Self {
        self.data_store = Some(data_store);
        self
    }

    /// Override the task timeout.
    pub fn with_task_timeout(mut self, task_timeout: Duration) -> Self {
        self.task_timeout = task_timeout;
        self
    }

    /// Whether the run executes on the local target.
    ///
    /// Value comparison. Any other spelling, including a different case,
    /// is a remote target.
    pub fn is_local_target(&self) -> bool {
        self.run_target == LOCAL_TARGET
    }
}
