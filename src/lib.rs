//! runcache - Run-scoped artifact cache store selection
//!
//! This crate selects and constructs the cache store a compute run uses
//! for intermediate artifacts: an in-memory store for runs without an id,
//! a remote file-share store for identified runs on remote targets with a
//! data store attached, and a local file store otherwise.

pub mod context;
pub mod mock;
pub mod selection;
pub mod share;
pub mod store;
pub mod timeout;

pub use context::{
    generate_run_id, DataStoreConfig, RunContext, DEFAULT_ENDPOINT_SUFFIX, DEFAULT_TASK_TIMEOUT,
    DEFAULT_TASK_TIMEOUT_SECONDS, LOCAL_TARGET,
};
pub use selection::{classify, select_cache_store, LogObserver, SelectionObserver, StoreSelector};
pub use share::{FileShare, MountedShare, MountedShareConnector, ShareConnector, ShareError};
pub use store::{
    CacheError, CacheResult, CacheStats, CacheStore, CacheStoreExt, EntryMeta, FileCacheStore,
    MemoryCacheStore, RemoteFileCacheStore, StoreKind, StoreManifest,
};
pub use timeout::{validate_task_timeout, TaskDeadline};
