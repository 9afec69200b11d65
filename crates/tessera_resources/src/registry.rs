//! Resource Registry
//!
//! Owns the set of live [`BufferData`] objects and the queue through which
//! dropped buffers report the GPU handles they still held.
//!
//! Every buffer is created through the registry, which records a weak
//! reference in a generational arena. When the last [`BufferRef`] is dropped
//! the buffer drains its [`HandleMap`] and sends the harvest back over a
//! channel; the next sweep removes the arena slot and dispatches the
//! handles. Because a buffer can only be dropped once, each handle it held
//! reaches exactly one delete batch.
//!
//! # Sweeps
//!
//! | method | visits | removes |
//! |---|---|---|
//! | [`clean_expired`](ResourceRegistry::clean_expired) | reclaim queue | every handle of dropped buffers |
//! | [`clean_for_context`](ResourceRegistry::clean_for_context) | reclaim queue, live buffers | one namespace's handles |
//! | [`clean_all`](ResourceRegistry::clean_all) | reclaim queue, live buffers | every handle |
//! | [`release`](ResourceRegistry::release) | one buffer | every handle of that buffer |

use std::sync::{Arc, Weak};

use bytemuck::Pod;
use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};
use tessera_core::{ContextId, Result, TesseraError};

use crate::batch::{DeleteBatch, SweepReport, dispatch};
use crate::buffer::{BufferData, BufferRef, BufferUsage, Reclaimed};
use crate::context_manager::{ContextCleanListener, ContextManager, RenderContext};
use crate::handle_map::{HandleMap, HarvestedHandle};
use crate::settings::{CacheMode, ResourceSettings};
use crate::task_queue::HandleDeleter;

new_key_type! {
    pub struct BufferKey;
}

pub struct ResourceRegistry {
    settings: ResourceSettings,
    contexts: Arc<ContextManager>,
    live: Mutex<SlotMap<BufferKey, Weak<BufferData>>>,
    reclaim_tx: flume::Sender<Reclaimed>,
    reclaim_rx: flume::Receiver<Reclaimed>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new(settings: ResourceSettings, contexts: Arc<ContextManager>) -> Self {
        if contexts.task_budget() != settings.task_budget {
            log::warn!(
                "Context manager runs deferred tasks with {:?}, settings ask for {:?}",
                contexts.task_budget(),
                settings.task_budget
            );
        }
        let (reclaim_tx, reclaim_rx) = flume::unbounded();
        Self {
            settings,
            contexts,
            live: Mutex::new(SlotMap::with_key()),
            reclaim_tx,
            reclaim_rx,
        }
    }

    /// Creates a shared registry that cleans up after destroyed contexts.
    #[must_use]
    pub fn new_shared(settings: ResourceSettings, contexts: Arc<ContextManager>) -> Arc<Self> {
        let registry = Arc::new(Self::new(settings, contexts));
        let listener: Weak<dyn ContextCleanListener> = Arc::downgrade(&registry) as Weak<dyn ContextCleanListener>;
        registry.contexts.add_clean_listener(listener);
        registry
    }

    /// Creates a shared registry together with a fresh [`ContextManager`]
    /// configured from the same settings.
    #[must_use]
    pub fn with_settings(settings: ResourceSettings) -> Arc<Self> {
        Self::new_shared(settings, Arc::new(ContextManager::from_settings(&settings)))
    }

    #[must_use]
    pub fn settings(&self) -> &ResourceSettings {
        &self.settings
    }

    #[must_use]
    pub fn contexts(&self) -> &Arc<ContextManager> {
        &self.contexts
    }

    // ========================================================================
    // Buffer creation
    // ========================================================================

    pub fn create_buffer(&self, bytes: Vec<u8>, usage: BufferUsage, label: &str) -> BufferRef {
        let mut live = self.live.lock();
        let key = live.insert(Weak::new());
        let data = Arc::new(BufferData::new(
            key,
            label,
            usage,
            bytes,
            HandleMap::new(self.settings.cache_mode),
            self.reclaim_tx.clone(),
        ));
        if let Some(slot) = live.get_mut(key) {
            *slot = Arc::downgrade(&data);
        }
        log::trace!("Buffer '{label}' registered as {key:?}");
        BufferRef::from_arc(data)
    }

    pub fn create_buffer_from<T: Pod>(&self, data: &[T], usage: BufferUsage, label: &str) -> BufferRef {
        self.create_buffer(bytemuck::cast_slice(data).to_vec(), usage, label)
    }

    /// Buffers that are still referenced somewhere.
    #[must_use]
    pub fn live_buffers(&self) -> Vec<BufferRef> {
        self.live
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .map(BufferRef::from_arc)
            .collect()
    }

    /// Arena slots still occupied, including dropped buffers whose
    /// reclamation has not been swept yet.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Dropped buffers waiting for the next sweep.
    #[must_use]
    pub fn pending_reclaims(&self) -> usize {
        self.reclaim_rx.len()
    }

    // ========================================================================
    // Sweeps
    // ========================================================================

    /// Dispatches the handles of every buffer dropped since the last sweep.
    pub fn clean_expired(&self, deleter: Option<&mut dyn HandleDeleter>) -> Result<SweepReport> {
        let fallback = self.attribution()?;
        let mut batch = DeleteBatch::new();
        let reclaimed = self.drain_reclaimed(&mut batch, fallback);
        Ok(self.finish(batch, reclaimed, deleter))
    }

    /// Dispatches every handle of every buffer, live or dropped, and empties
    /// all handle maps.
    pub fn clean_all(&self, deleter: Option<&mut dyn HandleDeleter>) -> Result<SweepReport> {
        let fallback = self.attribution()?;
        let mut batch = DeleteBatch::new();
        let reclaimed = self.drain_reclaimed(&mut batch, fallback);
        for buffer in self.live_buffers() {
            push_harvest(&mut batch, buffer.handles().drain(), fallback);
        }
        Ok(self.finish(batch, reclaimed, deleter))
    }

    /// Removes the handles of namespace `context` from every buffer and
    /// dispatches them. Handles for other namespaces are left untouched.
    pub fn clean_for_context(
        &self,
        context: ContextId,
        deleter: Option<&mut dyn HandleDeleter>,
    ) -> Result<SweepReport> {
        let fallback = self.contexts.current_id().or(Some(context));
        let mut batch = DeleteBatch::new();
        let reclaimed = self.drain_reclaimed(&mut batch, fallback);
        for buffer in self.live_buffers() {
            if let Some(handle) = buffer.handles().take(context) {
                batch.push(context, handle);
            }
        }
        Ok(self.finish(batch, reclaimed, deleter))
    }

    /// Explicitly disposes of `buffer`'s GPU copies without waiting for it
    /// to be dropped.
    pub fn release(&self, buffer: &BufferRef, deleter: Option<&mut dyn HandleDeleter>) -> Result<SweepReport> {
        let fallback = self.attribution()?;
        let mut batch = DeleteBatch::new();
        push_harvest(&mut batch, buffer.handles().drain(), fallback);
        Ok(self.finish(batch, 0, deleter))
    }

    /// Namespace that single-context handles are attributed to.
    ///
    /// Checked before anything is drained, so a failed sweep leaves every
    /// handle where it was.
    fn attribution(&self) -> Result<Option<ContextId>> {
        let current = self.contexts.current_id();
        match (self.settings.cache_mode, current) {
            (CacheMode::SingleContext, None) => Err(TesseraError::NoCurrentContext),
            _ => Ok(current),
        }
    }

    fn drain_reclaimed(&self, batch: &mut DeleteBatch, fallback: Option<ContextId>) -> usize {
        let mut live = self.live.lock();
        let mut reclaimed = 0;
        for Reclaimed { key, handles } in self.reclaim_rx.try_iter() {
            live.remove(key);
            push_harvest(batch, handles, fallback);
            reclaimed += 1;
        }
        reclaimed
    }

    fn finish(&self, batch: DeleteBatch, reclaimed: usize, deleter: Option<&mut dyn HandleDeleter>) -> SweepReport {
        let mut report = dispatch(batch, &self.contexts, deleter);
        report.reclaimed_owners = reclaimed;
        if reclaimed > 0 {
            log::debug!("Reclaimed {reclaimed} dropped buffer(s)");
        }
        report
    }
}

fn push_harvest(
    batch: &mut DeleteBatch,
    harvest: impl IntoIterator<Item = HarvestedHandle>,
    fallback: Option<ContextId>,
) {
    for HarvestedHandle { context, handle } in harvest {
        match context.or(fallback) {
            Some(id) => batch.push(id, handle),
            None => log::warn!("GPU handle {} has no context to be deleted in", handle.get()),
        }
    }
}

impl ContextCleanListener for ResourceRegistry {
    fn clean_for_context(&self, context: &RenderContext, deleter: Option<&mut dyn HandleDeleter>) {
        match ResourceRegistry::clean_for_context(self, context.id(), deleter) {
            Ok(report) => log::debug!(
                "Cleaned {} handle(s) for context '{}' ({} dropped)",
                report.total(),
                context.name(),
                report.dropped
            ),
            Err(err) => log::error!("Failed to clean context '{}': {err}", context.name()),
        }
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("settings", &self.settings)
            .field("tracked", &self.tracked_count())
            .field("pending_reclaims", &self.pending_reclaims())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::TaskBudget;
    use tessera_core::GpuHandle;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(ContextId, Vec<u32>)>,
    }

    impl HandleDeleter for Recorder {
        fn delete_handles(&mut self, context: ContextId, handles: &[GpuHandle]) {
            let mut raw: Vec<u32> = handles.iter().map(|h| h.get()).collect();
            raw.sort_unstable();
            self.calls.push((context, raw));
        }
    }

    fn flatten(recorder: Recorder) -> Vec<(ContextId, u32)> {
        let mut pairs: Vec<(ContextId, u32)> = recorder
            .calls
            .into_iter()
            .flat_map(|(id, raw)| raw.into_iter().map(move |r| (id, r)))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    fn setup(mode: CacheMode) -> (ResourceRegistry, Arc<ContextManager>) {
        let contexts = Arc::new(ContextManager::new());
        let registry = ResourceRegistry::new(ResourceSettings::default().with_cache_mode(mode), contexts.clone());
        (registry, contexts)
    }

    #[test]
    fn dropped_buffer_is_reclaimed_once() {
        let (registry, contexts) = setup(CacheMode::MultiContext);
        let ka = contexts.create_context("a", None).unwrap();
        let ctx = contexts.get(ka).unwrap();
        let mut recorder = Recorder::default();
        contexts.make_current(ka, &mut recorder).unwrap();

        let buffer = registry.create_buffer_from(&[0u8; 4], BufferUsage::VERTEX, "vb");
        buffer.handles().put(ctx.identity(), 12).unwrap();
        assert_eq!(registry.tracked_count(), 1);
        drop(buffer);
        assert_eq!(registry.pending_reclaims(), 1);

        let report = registry.clean_expired(Some(&mut recorder)).unwrap();
        assert_eq!(report.reclaimed_owners, 1);
        assert_eq!(report.immediate, 1);
        assert_eq!(registry.tracked_count(), 0);

        let report = registry.clean_expired(Some(&mut recorder)).unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(recorder.calls, vec![(ctx.id(), vec![12])]);
    }

    #[test]
    fn clean_all_empties_live_buffers() {
        let (registry, contexts) = setup(CacheMode::MultiContext);
        let ka = contexts.create_context("a", None).unwrap();
        let kb = contexts.create_context("b", None).unwrap();
        let a = contexts.get(ka).unwrap();
        let b = contexts.get(kb).unwrap();

        let buffer = registry.create_buffer(vec![0; 8], BufferUsage::INDEX, "ib");
        buffer.handles().put(a.identity(), 3).unwrap();
        buffer.handles().put(b.identity(), 4).unwrap();

        let report = registry.clean_all(None).unwrap();
        assert_eq!(report.deferred, 2);
        assert!(!buffer.handles().is_uploaded());
        assert_eq!(a.tasks().len(), 1);
        assert_eq!(b.tasks().len(), 1);
    }

    #[test]
    fn release_disposes_without_dropping() {
        let (registry, contexts) = setup(CacheMode::MultiContext);
        let ka = contexts.create_context("a", None).unwrap();
        let a = contexts.get(ka).unwrap();
        let mut recorder = Recorder::default();
        contexts.make_current(ka, &mut recorder).unwrap();

        let buffer = registry.create_buffer(vec![0; 4], BufferUsage::VERTEX, "vb");
        buffer.handles().put(a.identity(), 5).unwrap();
        let report = registry.release(&buffer, Some(&mut recorder)).unwrap();
        assert_eq!(report.immediate, 1);
        assert_eq!(buffer.handles().get(a.id()), 0);

        drop(buffer);
        let report = registry.clean_expired(Some(&mut recorder)).unwrap();
        assert_eq!(report.reclaimed_owners, 1);
        assert_eq!(report.total(), 0);
        assert_eq!(recorder.calls.len(), 1);
    }

    #[test]
    fn single_context_requires_current_context() {
        let (registry, contexts) = setup(CacheMode::SingleContext);
        let ka = contexts.create_context("main", None).unwrap();
        let buffer = registry.create_buffer(vec![0; 4], BufferUsage::VERTEX, "vb");
        buffer.handles().put(contexts.get(ka).unwrap().identity(), 8).unwrap();
        drop(buffer);

        assert_eq!(registry.clean_expired(None), Err(TesseraError::NoCurrentContext));
        assert_eq!(registry.pending_reclaims(), 1);

        let mut recorder = Recorder::default();
        contexts.make_current(ka, &mut recorder).unwrap();
        let report = registry.clean_expired(Some(&mut recorder)).unwrap();
        assert_eq!(report.immediate, 1);
        assert_eq!(recorder.calls, vec![(contexts.get(ka).unwrap().id(), vec![8])]);
    }

    #[test]
    fn destroying_context_cleans_through_listener() {
        let contexts = Arc::new(ContextManager::new());
        let registry = ResourceRegistry::new_shared(ResourceSettings::default(), contexts.clone());
        let ka = contexts.create_context("a", None).unwrap();
        let kb = contexts.create_context("b", None).unwrap();
        let a = contexts.get(ka).unwrap();
        let b = contexts.get(kb).unwrap();

        let buffer = registry.create_buffer(vec![0; 4], BufferUsage::VERTEX, "vb");
        buffer.handles().put(a.identity(), 1).unwrap();
        buffer.handles().put(b.identity(), 2).unwrap();

        let mut recorder = Recorder::default();
        contexts.make_current(ka, &mut recorder).unwrap();
        contexts.destroy_context(ka, Some(&mut recorder)).unwrap();

        assert_eq!(recorder.calls, vec![(a.id(), vec![1])]);
        assert_eq!(buffer.handles().get(a.id()), 0);
        assert_eq!(buffer.handles().get(b.id()), 2);
    }

    #[test]
    fn with_settings_configures_context_manager() {
        let settings = ResourceSettings::default().with_task_budget(TaskBudget::One);
        let registry = ResourceRegistry::with_settings(settings);
        assert_eq!(registry.contexts().task_budget(), TaskBudget::One);
        assert_eq!(registry.settings().task_budget, TaskBudget::One);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn concurrent_traffic_delivers_each_handle_once() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::time::Duration;

        const WORKERS: u32 = 4;
        const BUFFERS_PER_WORKER: u32 = 64;

        let contexts = Arc::new(ContextManager::new());
        let registry = ResourceRegistry::new_shared(ResourceSettings::default(), contexts.clone());
        let ka = contexts.create_context("a", None).unwrap();
        let kb = contexts.create_context("b", None).unwrap();
        let a = contexts.get(ka).unwrap();
        let b = contexts.get(kb).unwrap();
        // `a` is current: its handles are deleted by the sweeper, `b`'s are deferred.
        contexts.make_current(ka, &mut Recorder::default()).unwrap();

        let workers_done = AtomicBool::new(false);
        let (swept, expected) = std::thread::scope(|scope| {
            let watchdog = scope.spawn(|| {
                while !workers_done.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_millis(10));
                    let deadlocks = parking_lot::deadlock::check_deadlock();
                    assert!(deadlocks.is_empty(), "{} deadlock(s) detected", deadlocks.len());
                }
            });

            let sweeper = scope.spawn(|| {
                let mut recorder = Recorder::default();
                loop {
                    let finished = workers_done.load(Ordering::Acquire);
                    registry.clean_expired(Some(&mut recorder)).unwrap();
                    if finished {
                        break recorder;
                    }
                    std::thread::yield_now();
                }
            });

            let workers: Vec<_> = (0..WORKERS)
                .map(|w| {
                    let (registry, a, b) = (&registry, &a, &b);
                    scope.spawn(move || {
                        let mut expected = Vec::new();
                        let mut kept = Vec::new();
                        for i in 0..BUFFERS_PER_WORKER {
                            let raw = (w * BUFFERS_PER_WORKER + i) * 2 + 1;
                            let buffer = registry.create_buffer(vec![0; 4], BufferUsage::VERTEX, "worker");
                            buffer.handles().put(a.identity(), raw).unwrap();
                            buffer.handles().put(b.identity(), raw + 1).unwrap();
                            expected.push((a.id(), raw));

                            // Every third buffer loses its `b` copy before it is dropped.
                            if i % 3 == 0 {
                                assert_eq!(buffer.handles().take(b.id()).map(GpuHandle::get), Some(raw + 1));
                            } else {
                                expected.push((b.id(), raw + 1));
                            }
                            assert_eq!(buffer.handles().get(a.id()), raw);

                            if i % 4 == 0 {
                                kept.push(buffer);
                            }
                        }
                        drop(kept);
                        expected
                    })
                })
                .collect();

            let expected: Vec<(ContextId, u32)> = workers.into_iter().flat_map(|w| w.join().unwrap()).collect();
            workers_done.store(true, Ordering::Release);
            watchdog.join().unwrap();
            (sweeper.join().unwrap(), expected)
        });

        // Anything the sweeper missed, then `b`'s deferred deletions.
        let mut recorder = swept;
        registry.clean_expired(Some(&mut recorder)).unwrap();
        contexts.make_current(kb, &mut recorder).unwrap();

        let mut expected = expected;
        expected.sort_unstable();
        assert_eq!(flatten(recorder), expected);
        assert_eq!(registry.tracked_count(), 0);
        assert!(b.tasks().is_empty());
    }
}
