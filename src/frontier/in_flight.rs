//! Tasks currently checked out for execution

use crate::state::lock;
use crate::task::{ProcessingTask, TaskId};
use std::collections::HashMap;
use std::mem;
use std::sync::Mutex;

/// Registry of tasks that left the frontier and have no applied disposition yet
///
/// After a crash, whatever is still registered here was interrupted and gets
/// requeued by the bootstrapper.
#[derive(Debug, Default)]
pub struct InFlightBuffer {
    tasks: Mutex<HashMap<TaskId, ProcessingTask>>,
}

impl InFlightBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task as checked out
    pub fn put(&self, task: ProcessingTask) {
        lock(&self.tasks).insert(task.id().clone(), task);
    }

    /// Unregisters a task once its disposition is applied
    pub fn remove(&self, id: &TaskId) -> Option<ProcessingTask> {
        lock(&self.tasks).remove(id)
    }

    /// Atomically empties the buffer, oldest schedule first
    pub fn drain_all(&self) -> Vec<ProcessingTask> {
        let drained = mem::take(&mut *lock(&self.tasks));
        sorted(drained.into_values().collect())
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        lock(&self.tasks).contains_key(id)
    }

    pub fn size(&self) -> usize {
        lock(&self.tasks).len()
    }

    /// Copies the current content, oldest schedule first
    pub fn snapshot(&self) -> Vec<ProcessingTask> {
        sorted(lock(&self.tasks).values().cloned().collect())
    }
}

fn sorted(mut tasks: Vec<ProcessingTask>) -> Vec<ProcessingTask> {
    tasks.sort_by(|a, b| {
        a.scheduled_at()
            .cmp(&b.scheduled_at())
            .then_with(|| a.id().cmp(b.id()))
    });
    tasks
}
