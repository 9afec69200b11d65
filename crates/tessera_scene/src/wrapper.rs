//! Chainable node operation wrapper.
//!
//! [`SceneNode`] borrows a [`Scene`] mutably and provides a fluent API for
//! editing one node. Every setter raises the same dirty marks as the
//! corresponding [`Scene`] method.
//!
//! All methods silently no-op when the handle is stale.
//!
//! # Example
//!
//! ```rust,ignore
//! scene.node(handle)
//!     .set_position(0.0, 3.0, 0.0)
//!     .set_scale(2.0)
//!     .set_state(RenderState::Cull(CullFace::None));
//! ```
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::must_use_candidate)]
use glam::{Quat, Vec3};
use tessera_core::{BoundingBox, Transform};

use crate::NodeKey;
use crate::controller::Controller;
use crate::dirty::DirtyType;
use crate::scene::Scene;
use crate::state::RenderState;

/// Temporary mutable borrow of a scene node for chainable operations.
pub struct SceneNode<'a> {
    scene: &'a mut Scene,
    handle: NodeKey,
}

impl<'a> SceneNode<'a> {
    #[inline]
    pub fn new(scene: &'a mut Scene, handle: NodeKey) -> Self {
        Self { scene, handle }
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> NodeKey {
        self.handle
    }

    // -- Transform setters (chainable) --

    #[inline]
    pub fn set_position(self, x: f32, y: f32, z: f32) -> Self {
        self.set_position_vec(Vec3::new(x, y, z))
    }

    #[inline]
    pub fn set_position_vec(self, pos: Vec3) -> Self {
        let _ = self.scene.set_translation(self.handle, pos);
        self
    }

    /// Moves the node by `delta` in parent space (cumulative).
    #[inline]
    pub fn translate(self, delta: Vec3) -> Self {
        let _ = self.scene.add_translation(self.handle, delta);
        self
    }

    /// Sets uniform scale.
    #[inline]
    pub fn set_scale(self, s: f32) -> Self {
        self.set_scale_xyz(s, s, s)
    }

    #[inline]
    pub fn set_scale_xyz(self, x: f32, y: f32, z: f32) -> Self {
        let _ = self.scene.set_scale(self.handle, Vec3::new(x, y, z));
        self
    }

    #[inline]
    pub fn set_rotation(self, quat: Quat) -> Self {
        let _ = self.scene.set_rotation(self.handle, quat);
        self
    }

    /// Sets rotation from Euler angles (XYZ order, radians).
    #[inline]
    pub fn set_rotation_euler(self, x: f32, y: f32, z: f32) -> Self {
        let _ = self.scene.set_rotation_euler(self.handle, x, y, z);
        self
    }

    /// Rotates around the Y axis by `angle` radians (cumulative).
    #[inline]
    pub fn rotate_y(self, angle: f32) -> Self {
        if let Some(rotation) = self.scene.local_transform(self.handle).map(|t| t.rotation) {
            let _ = self.scene.set_rotation(self.handle, rotation * Quat::from_rotation_y(angle));
        }
        self
    }

    #[inline]
    pub fn set_transform(self, transform: Transform) -> Self {
        let _ = self.scene.set_transform(self.handle, transform);
        self
    }

    /// Orients the node to face `target` (in parent space).
    #[inline]
    pub fn look_at(self, target: Vec3) -> Self {
        let _ = self.scene.look_at(self.handle, target, Vec3::Y);
        self
    }

    // -- Other setters --

    #[inline]
    pub fn set_state(self, state: RenderState) -> Self {
        let _ = self.scene.set_render_state(self.handle, state);
        self
    }

    /// Sets the model bound (no-op if the node is not a mesh).
    #[inline]
    pub fn set_model_bound(self, bound: BoundingBox) -> Self {
        let _ = self.scene.set_model_bound(self.handle, Some(bound));
        self
    }

    #[inline]
    pub fn with_controller(self, controller: impl Controller + 'static) -> Self {
        let _ = self.scene.add_controller(self.handle, controller);
        self
    }

    #[inline]
    pub fn mark_dirty(self, kind: DirtyType) -> Self {
        self.scene.mark_dirty(self.handle, kind);
        self
    }
}
