//! Per-buffer table of GPU handles, indexed by context namespace.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tessera_core::{ContextId, ContextRef, GpuHandle, Result, WeakContextRef};

use crate::settings::CacheMode;

/// A handle pulled out of a [`HandleMap`] for deletion.
///
/// `context` is `None` in single-context mode; the sweep attributes such
/// handles to the context that is current at harvest time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestedHandle {
    pub context: Option<ContextId>,
    pub handle: GpuHandle,
}

pub type Harvest = SmallVec<[HarvestedHandle; 2]>;

#[derive(Debug)]
struct Entry {
    context: WeakContextRef,
    handle: GpuHandle,
}

#[derive(Debug)]
enum Entries {
    // 0 = not uploaded
    Single(AtomicU32),
    Multi(Mutex<FxHashMap<ContextId, Entry>>),
}

/// Mapping from context namespace to the GPU handle backing one CPU buffer.
///
/// In [`CacheMode::SingleContext`] the map is a single atomic slot and the
/// context arguments are ignored. In [`CacheMode::MultiContext`] each entry
/// keeps only a weak reference to its context, and entries whose context
/// has been destroyed are discarded whenever the map is iterated.
#[derive(Debug)]
pub struct HandleMap {
    entries: Entries,
}

impl HandleMap {
    #[must_use]
    pub fn new(mode: CacheMode) -> Self {
        let entries = match mode {
            CacheMode::SingleContext => Entries::Single(AtomicU32::new(0)),
            CacheMode::MultiContext => Entries::Multi(Mutex::new(FxHashMap::default())),
        };
        Self { entries }
    }

    #[must_use]
    pub fn mode(&self) -> CacheMode {
        match self.entries {
            Entries::Single(_) => CacheMode::SingleContext,
            Entries::Multi(_) => CacheMode::MultiContext,
        }
    }

    /// Stores (or overwrites) the handle for `context`.
    ///
    /// Returns [`TesseraError::InvalidHandle`](tessera_core::TesseraError::InvalidHandle)
    /// for `raw == 0`; nothing is stored in that case.
    pub fn put(&self, context: &ContextRef, raw: u32) -> Result<()> {
        let handle = GpuHandle::new(raw)?;
        self.put_handle(context, handle);
        Ok(())
    }

    pub fn put_handle(&self, context: &ContextRef, handle: GpuHandle) {
        match &self.entries {
            Entries::Single(slot) => slot.store(handle.get(), Ordering::Release),
            Entries::Multi(map) => {
                map.lock().insert(
                    context.id(),
                    Entry {
                        context: context.downgrade(),
                        handle,
                    },
                );
            }
        }
    }

    /// Raw handle for `context`, or `0` if the buffer is not uploaded there.
    #[must_use]
    pub fn get(&self, context: ContextId) -> u32 {
        self.handle(context).map_or(0, GpuHandle::get)
    }

    #[must_use]
    pub fn handle(&self, context: ContextId) -> Option<GpuHandle> {
        match &self.entries {
            Entries::Single(slot) => GpuHandle::new(slot.load(Ordering::Acquire)).ok(),
            Entries::Multi(map) => map.lock().get(&context).map(|e| e.handle),
        }
    }

    /// Removes the entry for `context`, returning the previous raw handle or `0`.
    pub fn remove(&self, context: ContextId) -> u32 {
        self.take(context).map_or(0, GpuHandle::get)
    }

    pub fn take(&self, context: ContextId) -> Option<GpuHandle> {
        match &self.entries {
            Entries::Single(slot) => GpuHandle::new(slot.swap(0, Ordering::AcqRel)).ok(),
            Entries::Multi(map) => map.lock().remove(&context).map(|e| e.handle),
        }
    }

    /// Live contexts holding a handle for this buffer. Always empty in
    /// single-context mode, which does not track contexts.
    #[must_use]
    pub fn contexts(&self) -> Vec<ContextId> {
        match &self.entries {
            Entries::Single(_) => Vec::new(),
            Entries::Multi(map) => {
                let mut map = map.lock();
                map.retain(|_, e| e.context.is_alive());
                map.keys().copied().collect()
            }
        }
    }

    /// `true` if a handle is registered for at least one live context.
    #[must_use]
    pub fn is_uploaded(&self) -> bool {
        match &self.entries {
            Entries::Single(slot) => slot.load(Ordering::Acquire) != 0,
            Entries::Multi(map) => map.lock().values().any(|e| e.context.is_alive()),
        }
    }

    /// Drops every entry without reporting anything for deletion.
    pub fn clear(&self) {
        match &self.entries {
            Entries::Single(slot) => slot.store(0, Ordering::Release),
            Entries::Multi(map) => map.lock().clear(),
        }
    }

    /// Discards entries whose context no longer exists; returns how many.
    pub fn prune(&self) -> usize {
        match &self.entries {
            Entries::Single(_) => 0,
            Entries::Multi(map) => {
                let mut map = map.lock();
                let before = map.len();
                map.retain(|_, e| e.context.is_alive());
                before - map.len()
            }
        }
    }

    /// Empties the map and returns every handle whose context is still alive.
    ///
    /// Handles of destroyed contexts are dropped: their namespace is gone
    /// and there is nothing left to delete them in.
    pub fn drain(&self) -> Harvest {
        match &self.entries {
            Entries::Single(slot) => GpuHandle::new(slot.swap(0, Ordering::AcqRel))
                .ok()
                .map(|handle| HarvestedHandle {
                    context: None,
                    handle,
                })
                .into_iter()
                .collect(),
            Entries::Multi(map) => map
                .lock()
                .drain()
                .filter(|(_, e)| e.context.is_alive())
                .map(|(id, e)| HarvestedHandle {
                    context: Some(id),
                    handle: e.handle,
                })
                .collect(),
        }
    }
}

impl Default for HandleMap {
    fn default() -> Self {
        Self::new(CacheMode::default())
    }
}
