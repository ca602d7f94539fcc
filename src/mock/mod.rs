//! Mock infrastructure for tests
//!
//! Mirrors the production seams without touching a real share or log sink.
//! Supports failure injection for testing error paths.
//!
//! # Pieces
//!
//! - `MockShare`: in-memory file share; clones see the same files
//! - `MockConnector`: `ShareConnector` handing out clones of one share
//! - `FailureInjector` / `FailureConfig`: per-operation failures and delays,
//!   keyed by `ShareOp`
//! - `RecordingObserver`: captures selection events for assertions
//!
//! Shipped as a regular module so integration tests and downstream crates
//! can exercise selection end to end without a mounted share.

mod failure;
mod observer;
mod share;

pub use failure::{FailureConfig, FailureInjector, InjectedFailure, ShareOp};
pub use observer::{RecordingObserver, SelectionEvent};
pub use share::{MockConnector, MockShare};
