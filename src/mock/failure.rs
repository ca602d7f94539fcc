//! Failure injection for the mock share
//!
//! Supports configurable failure injection for testing error paths:
//! unreachable shares at construction, I/O faults and delays during
//! operations.

use std::collections::HashMap;
use std::time::Duration;

/// Share operations that can be failure-injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShareOp {
    Connect,
    Upload,
    Download,
    Exists,
    Delete,
    List,
}

/// Error an injected failure produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Share unreachable, maps to a connection failure
    Unreachable,
    /// I/O fault inside the share
    Io,
}

/// Failure configuration for a share operation
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// Error to produce (None = delay-only injection)
    pub failure: Option<InjectedFailure>,
    /// Message carried by the produced error
    pub message: String,
    /// Delay to add before the operation proceeds
    pub delay: Option<Duration>,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// Create a config that makes the share unreachable.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            failure: Some(InjectedFailure::Unreachable),
            message: message.into(),
            delay: None,
            fail_count: None,
        }
    }

    /// Create a config that produces an I/O fault.
    pub fn io_error(message: impl Into<String>) -> Self {
        Self {
            failure: Some(InjectedFailure::Io),
            message: message.into(),
            delay: None,
            fail_count: None,
        }
    }

    /// Create a config that just adds delay.
    pub fn delay(duration: Duration) -> Self {
        Self {
            failure: None,
            message: String::new(),
            delay: Some(duration),
            fail_count: None,
        }
    }

    /// Add a delay before the failure or the operation.
    pub fn with_delay(mut self, duration: Duration) -> Self {
        self.delay = Some(duration);
        self
    }

    /// Set the number of times to fail before succeeding.
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

/// Failure injector for the mock share
#[derive(Debug, Default)]
pub struct FailureInjector {
    /// Per-operation failure configs
    configs: HashMap<ShareOp, FailureConfig>,
    /// Call counts per operation (for fail_count tracking)
    call_counts: HashMap<ShareOp, u32>,
}

impl FailureInjector {
    /// Create a new failure injector
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a failure for an operation
    pub fn inject(&mut self, op: ShareOp, config: FailureConfig) {
        self.configs.insert(op, config);
        self.call_counts.insert(op, 0);
    }

    /// Clear all failure injections
    pub fn clear(&mut self) {
        self.configs.clear();
        self.call_counts.clear();
    }

    /// Clear failure injection for a specific operation
    pub fn clear_op(&mut self, op: ShareOp) {
        self.configs.remove(&op);
        self.call_counts.remove(&op);
    }

    /// Check if an injection applies to this call of an operation.
    ///
    /// Returns an owned config so the caller can release any lock before
    /// sleeping out the configured delay.
    pub fn check(&mut self, op: ShareOp) -> Option<FailureConfig> {
        let config = self.configs.get(&op)?;
        let count = self.call_counts.entry(op).or_insert(0);
        *count += 1;

        if let Some(fail_limit) = config.fail_count {
            if *count > fail_limit {
                return None; // Exceeded fail count, succeed now
            }
        }

        Some(config.clone())
    }
}
