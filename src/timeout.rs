//! Task timeout enforcement for cache store operations
//!
//! Every store operation is bounded by the task timeout carried in the run
//! context:
//! - one `TaskDeadline` is started per operation
//! - payload copies check the deadline between chunks
//! - blocking share calls are not preemptible, so an overrun inside one
//!   surfaces at the next checkpoint after the call returns
//!
//! Overruns are reported as the `Timeout` cache error carrying the operation
//! name, the elapsed time, and the limit.

use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::store::{CacheError, CacheResult};

/// Chunk size for deadline-checked payload copies
pub const COPY_CHUNK_BYTES: usize = 64 * 1024;

/// Upper bound on task timeouts (24 hours)
pub const MAX_TASK_TIMEOUT_SECONDS: u64 = 86_400;

/// Validate a task timeout before constructing a store.
///
/// The bound must be in (0, 86400] seconds. A zero timeout would fail every
/// operation immediately and is rejected at the construction boundary.
pub fn validate_task_timeout(limit: Duration) -> CacheResult<()> {
    if limit.is_zero() {
        return Err(CacheError::configuration(
            "task timeout must be greater than zero",
        ));
    }
    if limit.as_secs() > MAX_TASK_TIMEOUT_SECONDS {
        return Err(CacheError::configuration(format!(
            "task timeout must be at most {} seconds, got {}",
            MAX_TASK_TIMEOUT_SECONDS,
            limit.as_secs()
        )));
    }
    Ok(())
}

/// Deadline for a single store operation.
///
/// Tracks wall-clock time from operation start. The deadline does not
/// interrupt anything itself; operations call `check` at their checkpoints
/// and propagate the `Timeout` error.
#[derive(Debug, Clone, Copy)]
pub struct TaskDeadline {
    /// Maximum wall-clock time for the operation
    limit: Duration,

    /// When the operation started
    started: Instant,
}

impl TaskDeadline {
    /// Start a deadline for one operation.
    pub fn start(limit: Duration) -> Self {
        Self {
            limit,
            started: Instant::now(),
        }
    }

    /// Elapsed time since the operation started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Remaining time before the deadline, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.started.elapsed())
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        self.started.elapsed() > self.limit
    }

    /// Fail with `Timeout` once the deadline has passed.
    pub fn check(&self, operation: &str) -> CacheResult<()> {
        let elapsed = self.started.elapsed();
        if elapsed > self.limit {
            return Err(CacheError::Timeout {
                operation: operation.to_string(),
                elapsed,
                limit: self.limit,
            });
        }
        Ok(())
    }
}

/// Copy a payload stream in chunks, checking the deadline between chunks.
///
/// Returns the number of bytes copied. I/O failures carry the supplied
/// operation and path context.
pub(crate) fn copy_with_deadline<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    deadline: &TaskDeadline,
    operation: &str,
    path: &Path,
) -> CacheResult<u64> {
    let mut buf = vec![0u8; COPY_CHUNK_BYTES];
    let mut copied: u64 = 0;
    loop {
        deadline.check(operation)?;
        let read = reader
            .read(&mut buf)
            .map_err(|e| CacheError::io(operation, path, e))?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&buf[..read])
            .map_err(|e| CacheError::io(operation, path, e))?;
        copied += read as u64;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::thread;

    #[test]
    fn test_validate_accepts_default_range() {
        assert!(validate_task_timeout(Duration::from_secs(900)).is_ok());
        assert!(validate_task_timeout(Duration::from_secs(1)).is_ok());
        assert!(validate_task_timeout(Duration::from_secs(MAX_TASK_TIMEOUT_SECONDS)).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero() {
        let err = validate_task_timeout(Duration::ZERO).unwrap_err();
        assert!(matches!(err, CacheError::Configuration { .. }));
    }

    #[test]
    fn test_validate_rejects_over_max() {
        let err =
            validate_task_timeout(Duration::from_secs(MAX_TASK_TIMEOUT_SECONDS + 1)).unwrap_err();
        assert!(matches!(err, CacheError::Configuration { .. }));
    }

    #[test]
    fn test_fresh_deadline_passes_check() {
        let deadline = TaskDeadline::start(Duration::from_secs(60));
        assert!(deadline.check("put").is_ok());
        assert!(!deadline.expired());
        assert!(deadline.remaining() > Duration::ZERO);
    }

    #[test]
    fn test_expired_deadline_fails_with_operation_name() {
        let deadline = TaskDeadline::start(Duration::from_millis(5));
        thread::sleep(Duration::from_millis(20));
        let err = deadline.check("get").unwrap_err();
        match err {
            CacheError::Timeout {
                operation,
                elapsed,
                limit,
            } => {
                assert_eq!(operation, "get");
                assert!(elapsed >= limit);
                assert_eq!(limit, Duration::from_millis(5));
            }
            other => panic!("expected Timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_limit_deadline_expires_immediately() {
        let deadline = TaskDeadline::start(Duration::ZERO);
        thread::sleep(Duration::from_millis(1));
        assert!(deadline.expired());
        assert!(deadline.check("exists").is_err());
    }

    #[test]
    fn test_copy_with_deadline_copies_all_bytes() {
        let payload = vec![7u8; COPY_CHUNK_BYTES * 2 + 17];
        let deadline = TaskDeadline::start(Duration::from_secs(60));
        let mut src: &[u8] = &payload;
        let mut dst = Vec::new();
        let copied =
            copy_with_deadline(&mut src, &mut dst, &deadline, "put", &PathBuf::from("mem"))
                .unwrap();
        assert_eq!(copied, payload.len() as u64);
        assert_eq!(dst, payload);
    }

    #[test]
    fn test_copy_with_deadline_stops_when_expired() {
        let payload = vec![0u8; COPY_CHUNK_BYTES * 4];
        let deadline = TaskDeadline::start(Duration::from_millis(1));
        thread::sleep(Duration::from_millis(10));
        let mut src: &[u8] = &payload;
        let mut dst = Vec::new();
        let err = copy_with_deadline(&mut src, &mut dst, &deadline, "put", &PathBuf::from("mem"))
            .unwrap_err();
        assert!(matches!(err, CacheError::Timeout { .. }));
        assert!(dst.is_empty());
    }
}
