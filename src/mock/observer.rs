//! Recording observer for selection tests

use std::sync::{Arc, Mutex};

use crate::selection::SelectionObserver;
use crate::store::{CacheError, StoreKind};

/// One observed selection outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    /// A store was constructed
    Selected {
        run_id: Option<String>,
        kind: StoreKind,
    },
    /// Construction failed; `subkind` is the error's stable label
    Failed {
        run_id: Option<String>,
        kind: StoreKind,
        subkind: &'static str,
    },
}

/// `SelectionObserver` that records events for assertions.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<SelectionEvent>>>,
}

impl RecordingObserver {
    /// Create an observer with an empty event log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all observed events, in order.
    pub fn events(&self) -> Vec<SelectionEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn push(&self, event: SelectionEvent) {
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event);
    }
}

impl SelectionObserver for RecordingObserver {
    fn store_selected(&self, run_id: Option<&str>, kind: StoreKind) {
        self.push(SelectionEvent::Selected {
            run_id: run_id.map(|id| id.to_string()),
            kind,
        });
    }

    fn selection_failed(&self, run_id: Option<&str>, kind: StoreKind, error: &CacheError) {
        self.push(SelectionEvent::Failed {
            run_id: run_id.map(|id| id.to_string()),
            kind,
            subkind: error.subkind(),
        });
    }
}
