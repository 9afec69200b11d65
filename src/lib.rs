#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

//! Tessera: a retained-mode scene graph with context-scoped GPU resource
//! tracking.
//!
//! This crate re-exports the workspace members:
//!
//! - [`core`]: context identities, GPU handles, transforms, bounds, errors
//! - [`resources`]: buffers, handle maps, the resource registry and contexts
//! - [`scene`]: the scene graph, render states and frame drivers

pub use glam;
pub use tessera_core as core;
pub use tessera_resources as resources;
pub use tessera_scene as scene;

pub use tessera_core::{BoundingBox, ContextId, ContextRef, GpuHandle, Result, TesseraError, Transform};
pub use tessera_resources::{
    BufferRef, BufferUsage, CacheMode, ContextKey, ContextManager, HandleDeleter, ResourceRegistry, ResourceSettings,
    SweepReport, TaskBudget,
};
pub use tessera_scene::{
    DirtyEvent, DirtyFlags, DirtyType, FrameDriver, MeshData, NodeKey, RenderState, Scene, SceneSettings,
    SceneUpdater, StateType,
};

/// Common imports.
pub mod prelude {
    pub use glam::{Affine3A, Quat, Vec3};
    pub use tessera_core::{BoundingBox, ContextId, GpuHandle, Transform};
    pub use tessera_resources::{
        BufferRef, BufferUsage, ContextManager, HandleDeleter, ResourceRegistry, ResourceSettings,
    };
    pub use tessera_scene::{DirtyType, MeshData, NodeKey, RenderState, Scene, StateType};
}
