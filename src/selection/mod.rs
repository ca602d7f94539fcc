//! Cache store selection
//!
//! Decides which store variant a run gets and constructs it:
//! - classification is a pure function over the run context
//! - construction happens exactly once, with no fallback, no retry, and no
//!   substitution: a broken remote store never silently degrades to a
//!   local one
//! - every outcome is reported to an injected observer, and a construction
//!   error is returned to the caller exactly as produced
//!
//! `select_cache_store` is the plain entry point with the default observer
//! and connector; `StoreSelector` lets callers inject either.

use crate::context::RunContext;
use crate::share::{MountedShareConnector, ShareConnector};
use crate::store::{
    CacheError, CacheResult, CacheStore, FileCacheStore, MemoryCacheStore, RemoteFileCacheStore,
    StoreKind,
};

/// Classify which store variant a run context gets - pure function
///
/// Priority order, first match wins:
/// 1. no run id: `Memory`, regardless of every other field
/// 2. data store attached and target not `local`: `RemoteFile`
/// 3. otherwise: `LocalFile`
///
/// Testable as a pure function with NO I/O. Construction is
/// `StoreSelector::select`.
pub fn classify(ctx: &RunContext) -> StoreKind {
    match (&ctx.run_id, &ctx.data_store) {
        (None, _) => StoreKind::Memory,
        (Some(_), Some(_)) if !ctx.is_local_target() => StoreKind::RemoteFile,
        (Some(_), _) => StoreKind::LocalFile,
    }
}

/// Logging collaborator scoped to a selection call.
///
/// Injected instead of a process-global logger so library consumers decide
/// where selection outcomes go.
pub trait SelectionObserver: Send + Sync {
    /// A store of `kind` was constructed for the run.
    fn store_selected(&self, run_id: Option<&str>, kind: StoreKind);

    /// Constructing a store of `kind` failed. The error is returned to the
    /// caller unchanged after this notification.
    fn selection_failed(&self, run_id: Option<&str>, kind: StoreKind, error: &CacheError);
}

/// Default observer, emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl SelectionObserver for LogObserver {
    fn store_selected(&self, run_id: Option<&str>, kind: StoreKind) {
        tracing::info!(
            run_id = run_id.unwrap_or("<none>"),
            store = kind.as_str(),
            "cache store selected"
        );
    }

    fn selection_failed(&self, run_id: Option<&str>, kind: StoreKind, error: &CacheError) {
        tracing::error!(
            run_id = run_id.unwrap_or("<none>"),
            store = kind.as_str(),
            error_kind = error.subkind(),
            error = %error,
            "cache store construction failed"
        );
    }
}

/// Builds the store a run context calls for.
///
/// Holds the two injected collaborators: the share connector consulted for
/// remote stores and the observer notified of every outcome.
pub struct StoreSelector {
    connector: Box<dyn ShareConnector>,
    observer: Box<dyn SelectionObserver>,
}

impl StoreSelector {
    /// Selector with the mounted-share connector and the tracing observer.
    pub fn new() -> Self {
        Self {
            connector: Box::new(MountedShareConnector::default()),
            observer: Box::new(LogObserver),
        }
    }

    /// Replace the share connector.
    pub fn with_connector(mut self, connector: Box<dyn ShareConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Replace the observer.
    pub fn with_observer(mut self, observer: Box<dyn SelectionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Classify the context and construct the matching store.
    ///
    /// Exactly one construction attempt per call; repeated calls with the
    /// same context yield fresh, independent instances.
    pub fn select(&self, ctx: &RunContext) -> CacheResult<Box<dyn CacheStore>> {
        let kind = classify(ctx);
        let run_id = ctx.run_id.as_deref();
        match self.construct(ctx, kind) {
            Ok(store) => {
                self.observer.store_selected(run_id, kind);
                Ok(store)
            }
            Err(error) => {
                self.observer.selection_failed(run_id, kind, &error);
                Err(error)
            }
        }
    }

    fn construct(&self, ctx: &RunContext, kind: StoreKind) -> CacheResult<Box<dyn CacheStore>> {
        match kind {
            StoreKind::Memory => Ok(Box::new(MemoryCacheStore::new(ctx.task_timeout)?)),
            StoreKind::LocalFile => Ok(Box::new(FileCacheStore::create(
                &ctx.temp_location,
                ctx.run_id.as_deref(),
                ctx.task_timeout,
            )?)),
            StoreKind::RemoteFile => match (ctx.run_id.as_deref(), ctx.data_store.as_ref()) {
                (Some(run_id), Some(data_store)) => {
                    let store = RemoteFileCacheStore::connect(
                        self.connector.as_ref(),
                        data_store,
                        run_id,
                        &ctx.temp_location,
                        ctx.task_timeout,
                    )?;
                    Ok(Box::new(store))
                }
                // classify picks RemoteFile only when both are present
                _ => Err(CacheError::configuration(
                    "remote store requires a run id and a data store",
                )),
            },
        }
    }
}

impl Default for StoreSelector {
    fn default() -> Self {
        Self::new()
    }
}

/// Select and construct the cache store for a run context.
///
/// Fixed call surface over a default `StoreSelector`; use the selector
/// directly to inject a connector or observer.
pub fn select_cache_store(ctx: &RunContext) -> CacheResult<Box<dyn CacheStore>> {
    StoreSelector::new().select(ctx)
}
