use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

/// Registry of live background tasks, backing the "active tasks" control.
///
/// Each task holds a [`TaskGuard`] for its whole lifetime; dropping the guard
/// (normal exit, early return or panic unwind) deregisters it.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    next_id: AtomicU64,
    active: Mutex<BTreeMap<u64, String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListing {
    pub active_count: usize,
    pub tasks: Vec<String>,
}

pub struct TaskGuard {
    registry: Arc<TaskRegistry>,
    id: u64,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.registry.entries().remove(&self.id);
    }
}

impl TaskRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(self: &Arc<Self>, name: impl Into<String>) -> TaskGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        tracing::debug!(task = %name, id, "Background task registered");
        self.entries().insert(id, name);
        TaskGuard {
            registry: self.clone(),
            id,
        }
    }

    pub fn active_count(&self) -> usize {
        self.entries().len()
    }

    pub fn listing(&self) -> TaskListing {
        let entries = self.entries();
        TaskListing {
            active_count: entries.len(),
            tasks: entries.values().cloned().collect(),
        }
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<u64, String>> {
        // 持锁期间不会 panic，中毒时直接沿用内部数据
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
