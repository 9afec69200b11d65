//! Deferred per-context work.
//!
//! GPU objects can only be deleted while their context is current. Work that
//! targets another context is boxed into a [`RenderTask`] and parked on that
//! context's [`TaskQueue`] until the context is made current again. There is
//! no timeout: a context that is never revisited never runs its queue.

use std::time::{Duration, Instant};

use tessera_core::{ContextId, GpuHandle};

use crate::settings::TaskBudget;

/// Frees GPU handles. Only valid to call while `context` is current.
pub trait HandleDeleter {
    fn delete_handles(&mut self, context: ContextId, handles: &[GpuHandle]);
}

/// A one-shot task run by the context that owns it. The deleter of that
/// context is injected at execution time.
pub type RenderTask = Box<dyn FnOnce(&mut dyn HandleDeleter) + Send + 'static>;

/// Multi-producer queue of [`RenderTask`]s, drained by the owning context.
pub struct TaskQueue {
    tx: flume::Sender<RenderTask>,
    rx: flume::Receiver<RenderTask>,
}

impl TaskQueue {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    pub fn enqueue(&self, task: RenderTask) {
        // Both ends live in `self`, the channel cannot be disconnected here.
        let _ = self.tx.send(task);
    }

    pub fn enqueue_fn<F>(&self, task: F)
    where
        F: FnOnce(&mut dyn HandleDeleter) + Send + 'static,
    {
        self.enqueue(Box::new(task));
    }

    /// Runs pending tasks within `budget`; returns how many ran.
    pub fn execute(&self, deleter: &mut dyn HandleDeleter, budget: TaskBudget) -> usize {
        let start = Instant::now();
        let mut executed = 0;
        while let Ok(task) = self.rx.try_recv() {
            task(&mut *deleter);
            executed += 1;

            let keep_going = match budget {
                TaskBudget::One => false,
                TaskBudget::All => true,
                TaskBudget::Millis(ms) => start.elapsed() < Duration::from_millis(ms),
            };
            if !keep_going {
                break;
            }
        }
        executed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Discards all pending tasks; returns how many were dropped.
    pub fn clear(&self) -> usize {
        self.rx.drain().count()
    }

    /// Moves every pending task onto `other`, preserving order. Returns how
    /// many tasks moved.
    pub fn drain_into(&self, other: &TaskQueue) -> usize {
        let mut moved = 0;
        for task in self.rx.drain() {
            other.enqueue(task);
            moved += 1;
        }
        moved
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue").field("pending", &self.len()).finish()
    }
}
