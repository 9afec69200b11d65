//! Registry of live render contexts.
//!
//! The manager resolves a [`ContextId`] namespace back to a live
//! [`RenderContext`], tracks which context is current, runs a context's
//! deferred tasks when it becomes current, and tells interested parties
//! (usually the [`ResourceRegistry`](crate::ResourceRegistry)) when the last
//! context of a namespace is about to be destroyed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use slotmap::{SlotMap, new_key_type};
use tessera_core::{ContextId, ContextRef, Result, TesseraError};

use crate::settings::{ResourceSettings, TaskBudget};
use crate::task_queue::{HandleDeleter, TaskQueue};

new_key_type! {
    pub struct ContextKey;
}

/// One logical render context.
#[derive(Debug)]
pub struct RenderContext {
    key: ContextKey,
    name: String,
    identity: ContextRef,
    tasks: TaskQueue,
    closing: AtomicBool,
}

impl RenderContext {
    #[inline]
    #[must_use]
    pub fn key(&self) -> ContextKey {
        self.key
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace this context allocates GPU objects in. Shared contexts
    /// return equal references.
    #[inline]
    #[must_use]
    pub fn identity(&self) -> &ContextRef {
        &self.identity
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.identity.id()
    }

    #[must_use]
    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    /// True while [`ContextManager::destroy_context`] is tearing this
    /// context down. A closing context accepts no new deferred work.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}

/// Notified before the last context of a namespace is destroyed.
pub trait ContextCleanListener: Send + Sync {
    fn clean_for_context(&self, context: &RenderContext, deleter: Option<&mut dyn HandleDeleter>);
}

pub struct ContextManager {
    task_budget: TaskBudget,
    contexts: RwLock<SlotMap<ContextKey, Arc<RenderContext>>>,
    current: RwLock<Option<ContextKey>>,
    listeners: RwLock<Vec<Weak<dyn ContextCleanListener>>>,
}

impl ContextManager {
    #[must_use]
    pub fn new() -> Self {
        Self::with_task_budget(TaskBudget::default())
    }

    /// Builds a manager that runs deferred tasks with `settings.task_budget`.
    #[must_use]
    pub fn from_settings(settings: &ResourceSettings) -> Self {
        Self::with_task_budget(settings.task_budget)
    }

    #[must_use]
    pub fn with_task_budget(task_budget: TaskBudget) -> Self {
        Self {
            task_budget,
            contexts: RwLock::new(SlotMap::with_key()),
            current: RwLock::new(None),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Registers a new context. With `shared_with`, the new context joins
    /// that context's GPU object namespace.
    pub fn create_context(&self, name: &str, shared_with: Option<ContextKey>) -> Result<ContextKey> {
        let mut contexts = self.contexts.write();
        let identity = match shared_with {
            Some(other) => contexts
                .get(other)
                .map(|c| c.identity.clone())
                .ok_or_else(|| TesseraError::UnknownContext(format!("{other:?}")))?,
            None => ContextRef::new(),
        };

        let key = contexts.insert_with_key(|key| {
            Arc::new(RenderContext {
                key,
                name: name.to_string(),
                identity,
                tasks: TaskQueue::new(),
                closing: AtomicBool::new(false),
            })
        });
        log::debug!("Render context '{name}' created ({key:?})");
        Ok(key)
    }

    #[must_use]
    pub fn task_budget(&self) -> TaskBudget {
        self.task_budget
    }

    #[must_use]
    pub fn get(&self, key: ContextKey) -> Option<Arc<RenderContext>> {
        self.contexts.read().get(key).cloned()
    }

    /// Resolves a namespace to a live context, preferring the current one.
    /// Contexts that are being destroyed are skipped.
    #[must_use]
    pub fn context_for_id(&self, id: ContextId) -> Option<Arc<RenderContext>> {
        if let Some(current) = self.current()
            && current.id() == id
            && !current.is_closing()
        {
            return Some(current);
        }
        self.contexts
            .read()
            .values()
            .find(|c| c.id() == id && !c.is_closing())
            .cloned()
    }

    /// Makes `key` current and runs its deferred tasks with `deleter`.
    /// Returns how many tasks ran.
    pub fn make_current(&self, key: ContextKey, deleter: &mut dyn HandleDeleter) -> Result<usize> {
        let context = self
            .get(key)
            .ok_or_else(|| TesseraError::UnknownContext(format!("{key:?}")))?;
        *self.current.write() = Some(key);

        let executed = context.tasks.execute(deleter, self.task_budget);
        if executed > 0 {
            log::debug!("Context '{}' ran {executed} deferred task(s)", context.name);
        }
        Ok(executed)
    }

    pub fn release_current(&self) {
        *self.current.write() = None;
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<RenderContext>> {
        let key = (*self.current.read())?;
        self.get(key)
    }

    #[must_use]
    pub fn current_id(&self) -> Option<ContextId> {
        self.current().map(|c| c.id())
    }

    pub fn add_clean_listener(&self, listener: Weak<dyn ContextCleanListener>) {
        self.listeners.write().push(listener);
    }

    /// Destroys a context.
    ///
    /// If another context shares the namespace, the destroyed context's
    /// pending tasks move to it and run when it next becomes current.
    /// Otherwise clean listeners run first so they can free handles for the
    /// namespace. Nothing can be queued on a closing context, so handles
    /// that cannot be deleted right away are dropped and reported as such.
    pub fn destroy_context(&self, key: ContextKey, mut deleter: Option<&mut dyn HandleDeleter>) -> Result<()> {
        let context = self
            .get(key)
            .ok_or_else(|| TesseraError::UnknownContext(format!("{key:?}")))?;
        context.closing.store(true, Ordering::Release);

        let shared = self
            .contexts
            .read()
            .values()
            .any(|c| c.key != key && c.id() == context.id());

        if !shared {
            let listeners: Vec<Arc<dyn ContextCleanListener>> = {
                let mut listeners = self.listeners.write();
                listeners.retain(|l| l.strong_count() > 0);
                listeners.iter().filter_map(Weak::upgrade).collect()
            };
            for listener in listeners {
                let deleter: Option<&mut dyn HandleDeleter> = match deleter.as_mut() {
                    Some(d) => Some(&mut **d),
                    None => None,
                };
                listener.clean_for_context(&context, deleter);
            }
        }

        {
            let mut current = self.current.write();
            if *current == Some(key) {
                *current = None;
            }
        }
        self.contexts.write().remove(key);

        match self.context_for_id(context.id()) {
            Some(survivor) => {
                let moved = context.tasks.drain_into(survivor.tasks());
                if moved > 0 {
                    log::debug!(
                        "Render context '{}' destroyed; {moved} pending task(s) moved to '{}'",
                        context.name,
                        survivor.name
                    );
                }
            }
            None => {
                let abandoned = context.tasks.clear();
                if abandoned > 0 {
                    log::warn!(
                        "Render context '{}' destroyed with {abandoned} pending task(s)",
                        context.name
                    );
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.read().is_empty()
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tessera_core::GpuHandle;

    #[derive(Default)]
    struct CountingDeleter {
        deleted: usize,
    }

    impl HandleDeleter for CountingDeleter {
        fn delete_handles(&mut self, _context: ContextId, handles: &[GpuHandle]) {
            self.deleted += handles.len();
        }
    }

    #[derive(Default)]
    struct CountingListener {
        calls: AtomicUsize,
    }

    impl ContextCleanListener for CountingListener {
        fn clean_for_context(&self, _context: &RenderContext, _deleter: Option<&mut dyn HandleDeleter>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn shared_contexts_share_identity() {
        let manager = ContextManager::new();
        let a = manager.create_context("a", None).unwrap();
        let b = manager.create_context("b", Some(a)).unwrap();
        let c = manager.create_context("c", None).unwrap();

        let id = |k| manager.get(k).unwrap().id();
        assert_eq!(id(a), id(b));
        assert_ne!(id(a), id(c));
    }

    #[test]
    fn make_current_runs_deferred_tasks() {
        let manager = ContextManager::new();
        let a = manager.create_context("a", None).unwrap();
        let ctx = manager.get(a).unwrap();
        let id = ctx.id();
        let handle = GpuHandle::new(3).unwrap();
        ctx.tasks().enqueue_fn(move |d| d.delete_handles(id, &[handle]));

        let mut deleter = CountingDeleter::default();
        assert_eq!(manager.make_current(a, &mut deleter).unwrap(), 1);
        assert_eq!(deleter.deleted, 1);
        assert_eq!(manager.current_id(), Some(id));
    }

    #[test]
    fn destroy_notifies_only_for_last_shared_context() {
        let manager = ContextManager::new();
        let listener = Arc::new(CountingListener::default());
        let weak: Weak<dyn ContextCleanListener> = Arc::downgrade(&listener) as Weak<dyn ContextCleanListener>;
        manager.add_clean_listener(weak);

        let a = manager.create_context("a", None).unwrap();
        let b = manager.create_context("b", Some(a)).unwrap();

        manager.destroy_context(a, None).unwrap();
        assert_eq!(listener.calls.load(Ordering::SeqCst), 0);

        manager.destroy_context(b, None).unwrap();
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
        assert!(manager.is_empty());
    }

    #[test]
    fn destroying_current_context_clears_current() {
        let manager = ContextManager::new();
        let a = manager.create_context("a", None).unwrap();
        manager.make_current(a, &mut CountingDeleter::default()).unwrap();
        manager.destroy_context(a, None).unwrap();
        assert!(manager.current().is_none());
        assert!(manager.destroy_context(a, None).is_err());
    }
}
