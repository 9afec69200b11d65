//! Hierarchical scene graph with dirty propagation.
//!
//! - [`Scene`]: node arena, hierarchy edits, dirty marks, the update pass
//! - [`Node`] / [`NodeKind`]: group and mesh nodes
//! - [`DirtyType`] / [`DirtyListener`]: invalidation kinds and observers
//! - [`StateStack`]: render state inheritance
//! - [`SceneUpdater`] / [`FrameDriver`]: per-frame entry points

pub mod controller;
pub mod dirty;
pub mod node;
pub mod scene;
pub mod settings;
pub mod state;
pub mod updater;
pub mod wrapper;

use slotmap::new_key_type;

new_key_type! {
    pub struct NodeKey;
}

pub use controller::{Controller, ControllerId};
pub use dirty::{DirtyEvent, DirtyFlags, DirtyListener, DirtyType, ListenerId};
pub use node::{MeshData, Node, NodeKind};
pub use scene::Scene;
pub use settings::SceneSettings;
pub use state::{
    BlendFactor, BlendState, ColorMask, CompareFunction, CullFace, FogState, Light, LightCombineMode, LightState,
    MaterialState, RenderState, ResolvedStates, ShadingMode, StackMarker, StateSet, StateStack, StateType,
    WireframeState, ZBufferState,
};
pub use updater::{FrameDriver, FrameReport, SceneUpdater};
pub use wrapper::SceneNode;
