//! Per-context delete batches and their dispatch.

use rustc_hash::FxHashMap;
use tessera_core::{ContextId, GpuHandle};

use crate::context_manager::ContextManager;
use crate::task_queue::HandleDeleter;

/// Handles awaiting deletion, grouped by the namespace that owns them.
#[derive(Debug, Default, Clone)]
pub struct DeleteBatch {
    by_context: FxHashMap<ContextId, Vec<GpuHandle>>,
}

impl DeleteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, context: ContextId, handle: GpuHandle) {
        self.by_context.entry(context).or_default().push(handle);
    }

    /// Total number of handles across all contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_context.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_context.values().all(Vec::is_empty)
    }

    #[must_use]
    pub fn handles_for(&self, context: ContextId) -> &[GpuHandle] {
        self.by_context.get(&context).map_or(&[], Vec::as_slice)
    }

    pub fn contexts(&self) -> impl Iterator<Item = ContextId> + '_ {
        self.by_context.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContextId, &[GpuHandle])> {
        self.by_context.iter().map(|(id, handles)| (*id, handles.as_slice()))
    }
}

impl IntoIterator for DeleteBatch {
    type Item = (ContextId, Vec<GpuHandle>);
    type IntoIter = std::collections::hash_map::IntoIter<ContextId, Vec<GpuHandle>>;

    fn into_iter(self) -> Self::IntoIter {
        self.by_context.into_iter()
    }
}

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Handles deleted synchronously on the current context.
    pub immediate: usize,
    /// Handles parked on another context's task queue.
    pub deferred: usize,
    /// Handles whose namespace has no live context left.
    pub dropped: usize,
    /// Buffers whose reclamation message was drained by this sweep.
    pub reclaimed_owners: usize,
}

impl SweepReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.immediate + self.deferred + self.dropped
    }

    pub fn merge(&mut self, other: SweepReport) {
        self.immediate += other.immediate;
        self.deferred += other.deferred;
        self.dropped += other.dropped;
        self.reclaimed_owners += other.reclaimed_owners;
    }
}

/// Sends every group of `batch` to its context.
///
/// A group is deleted right away when its namespace is current and a
/// `deleter` is supplied; otherwise one task is queued on a live context of
/// that namespace. Groups with no live context are dropped.
pub fn dispatch(
    batch: DeleteBatch,
    contexts: &ContextManager,
    mut deleter: Option<&mut dyn HandleDeleter>,
) -> SweepReport {
    let mut report = SweepReport::default();
    let current = contexts.current_id();

    for (id, handles) in batch {
        if handles.is_empty() {
            continue;
        }
        let count = handles.len();

        if current == Some(id)
            && let Some(deleter) = deleter.as_mut()
        {
            deleter.delete_handles(id, &handles);
            report.immediate += count;
            continue;
        }

        match contexts.context_for_id(id) {
            Some(context) => {
                context
                    .tasks()
                    .enqueue_fn(move |deleter| deleter.delete_handles(id, &handles));
                report.deferred += count;
            }
            None => {
                log::warn!("Dropping {count} GPU handle(s) for {id}: no live context owns that namespace");
                report.dropped += count;
            }
        }
    }

    if report.total() > 0 {
        log::debug!(
            "Dispatched GPU handles: {} immediate, {} deferred, {} dropped",
            report.immediate,
            report.deferred,
            report.dropped
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::ContextRef;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(ContextId, Vec<u32>)>,
    }

    impl HandleDeleter for Recorder {
        fn delete_handles(&mut self, context: ContextId, handles: &[GpuHandle]) {
            self.calls.push((context, handles.iter().map(|h| h.get()).collect()));
        }
    }

    fn h(raw: u32) -> GpuHandle {
        GpuHandle::new(raw).unwrap()
    }

    #[test]
    fn batch_groups_by_context() {
        let a = ContextRef::new();
        let b = ContextRef::new();
        let mut batch = DeleteBatch::new();
        batch.push(a.id(), h(1));
        batch.push(b.id(), h(2));
        batch.push(a.id(), h(3));

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.handles_for(a.id()), &[h(1), h(3)]);
        assert_eq!(batch.handles_for(b.id()), &[h(2)]);
        assert!(batch.handles_for(ContextRef::new().id()).is_empty());
    }

    #[test]
    fn current_context_deletes_immediately_others_defer() {
        let manager = ContextManager::new();
        let ka = manager.create_context("a", None).unwrap();
        let kb = manager.create_context("b", None).unwrap();
        let a = manager.get(ka).unwrap().id();
        let b = manager.get(kb).unwrap().id();

        let mut recorder = Recorder::default();
        manager.make_current(ka, &mut recorder).unwrap();

        let mut batch = DeleteBatch::new();
        batch.push(a, h(7));
        batch.push(b, h(9));
        let report = dispatch(batch, &manager, Some(&mut recorder));

        assert_eq!(report.immediate, 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(recorder.calls, vec![(a, vec![7])]);

        manager.make_current(kb, &mut recorder).unwrap();
        assert_eq!(recorder.calls, vec![(a, vec![7]), (b, vec![9])]);
    }

    #[test]
    fn without_deleter_everything_defers() {
        let manager = ContextManager::new();
        let ka = manager.create_context("a", None).unwrap();
        let a = manager.get(ka).unwrap().id();
        manager.make_current(ka, &mut Recorder::default()).unwrap();

        let mut batch = DeleteBatch::new();
        batch.push(a, h(4));
        let report = dispatch(batch, &manager, None);
        assert_eq!(report.deferred, 1);
        assert_eq!(manager.get(ka).unwrap().tasks().len(), 1);
    }

    #[test]
    fn unknown_namespace_is_dropped() {
        let manager = ContextManager::new();
        let orphan = ContextRef::new();
        let mut batch = DeleteBatch::new();
        batch.push(orphan.id(), h(5));
        let report = dispatch(batch, &manager, None);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.total(), 1);
    }
}
