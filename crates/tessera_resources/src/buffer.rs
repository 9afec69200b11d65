use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use bytemuck::Pod;
use glam::Vec3;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::handle_map::{Harvest, HandleMap};
use crate::registry::BufferKey;

bitflags! {
    /// What the GPU copy of a buffer is bound as.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX  = 1 << 0;
        const INDEX   = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
    }
}

/// Upload hint passed to the renderer when the buffer is (re)uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    #[default]
    StaticDraw,
    StaticCopy,
    StaticRead,
    StreamDraw,
    StreamCopy,
    StreamRead,
    DynamicDraw,
    DynamicCopy,
    DynamicRead,
}

/// Sent by a buffer when its last reference goes away.
#[derive(Debug)]
pub(crate) struct Reclaimed {
    pub key: BufferKey,
    pub handles: Harvest,
}

/// CPU-side geometry buffer plus the GPU handles it is uploaded as.
///
/// Instances are created by a [`ResourceRegistry`](crate::ResourceRegistry)
/// and always live behind a [`BufferRef`].
#[derive(Debug)]
pub struct BufferData {
    key: BufferKey,
    label: String,
    usage: BufferUsage,
    access_mode: Mutex<AccessMode>,
    data: RwLock<Vec<u8>>,
    version: AtomicU64,
    needs_refresh: AtomicBool,
    handles: HandleMap,
    reclaim: flume::Sender<Reclaimed>,
}

impl BufferData {
    pub(crate) fn new(
        key: BufferKey,
        label: &str,
        usage: BufferUsage,
        bytes: Vec<u8>,
        handles: HandleMap,
        reclaim: flume::Sender<Reclaimed>,
    ) -> Self {
        Self {
            key,
            label: label.to_string(),
            usage,
            access_mode: Mutex::new(AccessMode::default()),
            data: RwLock::new(bytes),
            version: AtomicU64::new(0),
            needs_refresh: AtomicBool::new(true),
            handles,
            reclaim,
        }
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> BufferKey {
        self.key
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[must_use]
    pub fn access_mode(&self) -> AccessMode {
        *self.access_mode.lock()
    }

    pub fn set_access_mode(&self, mode: AccessMode) {
        *self.access_mode.lock() = mode;
    }

    /// Lock-free data version, bumped by every [`update`](Self::update).
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Relaxed)
    }

    /// `true` when the CPU copy changed since the renderer last uploaded it.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh.load(Ordering::Acquire)
    }

    /// Called by the uploader once the GPU copy matches the CPU copy.
    pub fn mark_refreshed(&self) {
        self.needs_refresh.store(false, Ordering::Release);
    }

    pub fn read_data(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.data.read()
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.data.read().len()
    }

    pub fn update<T: Pod>(&self, data: &[T]) {
        self.update_bytes(bytemuck::cast_slice(data));
    }

    pub fn update_bytes(&self, bytes: &[u8]) {
        {
            let mut inner = self.data.write();
            inner.clear();
            inner.extend_from_slice(bytes);
        }
        self.version.fetch_add(1, Ordering::Relaxed);
        self.needs_refresh.store(true, Ordering::Release);
    }

    /// Reads the payload as tightly packed `f32` triples. Trailing bytes that
    /// do not form a whole triple are ignored.
    #[must_use]
    pub fn positions(&self) -> Vec<Vec3> {
        const STRIDE: usize = 3 * std::mem::size_of::<f32>();
        self.data
            .read()
            .chunks_exact(STRIDE)
            .map(|chunk| Vec3::from_array(bytemuck::pod_read_unaligned::<[f32; 3]>(chunk)))
            .collect()
    }

    /// Per-context GPU handles of this buffer.
    #[inline]
    #[must_use]
    pub fn handles(&self) -> &HandleMap {
        &self.handles
    }
}

impl Drop for BufferData {
    fn drop(&mut self) {
        let handles = self.handles.drain();
        // The registry may already be gone; its handles go with it.
        let _ = self.reclaim.send(Reclaimed {
            key: self.key,
            handles,
        });
    }
}

/// Shared reference to a [`BufferData`]. Equality and hashing use the
/// registry key, not the contents.
#[derive(Debug, Clone)]
pub struct BufferRef(Arc<BufferData>);

impl BufferRef {
    pub(crate) fn from_arc(inner: Arc<BufferData>) -> Self {
        Self(inner)
    }

    /// Number of live `BufferRef`s to this buffer.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl PartialEq for BufferRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.key == other.0.key
    }
}

impl Eq for BufferRef {}

impl std::hash::Hash for BufferRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.key.hash(state);
    }
}

impl std::ops::Deref for BufferRef {
    type Target = BufferData;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ResourceRegistry, ResourceSettings};
    use std::sync::Arc;

    fn registry() -> ResourceRegistry {
        ResourceRegistry::new(ResourceSettings::default(), Arc::new(crate::ContextManager::new()))
    }

    #[test]
    fn update_bumps_version_and_flags_refresh() {
        let registry = registry();
        let buffer = registry.create_buffer_from(&[1.0f32, 2.0, 3.0], BufferUsage::VERTEX, "positions");
        buffer.mark_refreshed();
        assert_eq!(buffer.version(), 0);
        assert!(!buffer.needs_refresh());

        buffer.update(&[4.0f32, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(buffer.version(), 1);
        assert!(buffer.needs_refresh());
        assert_eq!(buffer.byte_len(), 24);
    }

    #[test]
    fn positions_reads_packed_triples() {
        let registry = registry();
        let buffer = registry.create_buffer_from(
            &[0.0f32, 1.0, 2.0, -1.0, -2.0, -3.0, 9.0],
            BufferUsage::VERTEX,
            "tri",
        );
        let positions = buffer.positions();
        assert_eq!(positions, vec![Vec3::new(0.0, 1.0, 2.0), Vec3::new(-1.0, -2.0, -3.0)]);
    }

    #[test]
    fn equality_is_by_key() {
        let registry = registry();
        let a = registry.create_buffer_from(&[0u16, 1, 2], BufferUsage::INDEX, "a");
        let b = registry.create_buffer_from(&[0u16, 1, 2], BufferUsage::INDEX, "b");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.ref_count(), 1);
    }
}
