use std::fmt;
use std::num::NonZeroU32;

use crate::errors::{Result, TesseraError};

/// Name of an uploaded GPU object (buffer, VBO, ...).
///
/// Always strictly positive. The raw value `0` is reserved as the
/// "not uploaded in this context" sentinel and can never be wrapped.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuHandle(NonZeroU32);

impl GpuHandle {
    /// Wraps a raw handle, rejecting `0`.
    #[inline]
    pub fn new(raw: u32) -> Result<Self> {
        NonZeroU32::new(raw)
            .map(Self)
            .ok_or(TesseraError::InvalidHandle(raw))
    }

    #[inline]
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Debug for GpuHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuHandle({})", self.0)
    }
}

impl From<GpuHandle> for u32 {
    fn from(handle: GpuHandle) -> Self {
        handle.get()
    }
}

impl TryFrom<u32> for GpuHandle {
    type Error = TesseraError;

    fn try_from(raw: u32) -> Result<Self> {
        Self::new(raw)
    }
}
