//! Foundational types shared by the Tessera crates.
//!
//! - [`ContextRef`] / [`ContextId`]: identity of a GPU object namespace
//! - [`GpuHandle`]: a positive GPU object name
//! - [`Transform`] and [`BoundingBox`]: the spatial data scene nodes derive from
//! - [`FrameTimer`]: per-frame delta time
//! - [`TesseraError`]: the error type used across the workspace

pub mod bounds;
pub mod context;
pub mod errors;
pub mod handle;
pub mod time;
pub mod transform;

pub use bounds::BoundingBox;
pub use context::{ContextId, ContextRef, WeakContextRef};
pub use errors::{Result, TesseraError};
pub use handle::GpuHandle;
pub use time::FrameTimer;
pub use transform::Transform;
