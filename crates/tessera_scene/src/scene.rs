//! The scene graph arena.
//!
//! # Dirty propagation
//!
//! | kind | marked on subtree | marked upward |
//! |---|---|---|
//! | `Transform` | transform, bounding | bounding, from the parent |
//! | `RenderState` | render state | - |
//! | `Bounding` | - | bounding, from the node itself |
//! | `Attached` / `Detached` | everything | bounding, from the parent |
//! | `Destroyed` | - | bounding, from the parent |
//!
//! Every mark and clear is then announced to listeners on the node and its
//! ancestors, nearest first, until a listener consumes the event. Flag
//! propagation does not depend on listeners.
//!
//! # Update pass
//!
//! [`Scene::update_geometric_state`] runs controllers, recomputes the world
//! transform and resolved render states of dirty nodes on the way down, and
//! recomputes world bounds on the way back up.

use glam::{Affine3A, Quat, Vec3};
use slotmap::SlotMap;
use smallvec::SmallVec;
use tessera_core::{BoundingBox, Result, TesseraError, Transform};
use tessera_resources::BufferRef;

use crate::NodeKey;
use crate::controller::{Controller, ControllerId};
use crate::dirty::{DirtyEvent, DirtyFlags, DirtyListener, DirtyType, ListenerId};
use crate::node::{MeshData, Node, NodeKind};
use crate::settings::SceneSettings;
use crate::state::{RenderState, StateStack, StateType};
use crate::wrapper::SceneNode;

type Children = SmallVec<[NodeKey; 8]>;

pub struct Scene {
    nodes: SlotMap<NodeKey, Node>,
    roots: Vec<NodeKey>,
    next_id: u64,
    settings: SceneSettings,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(SceneSettings::default())
    }

    #[must_use]
    pub fn with_settings(settings: SceneSettings) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            roots: Vec::new(),
            next_id: 1,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &SceneSettings {
        &self.settings
    }

    // ========================================================================
    // Node creation and lookup
    // ========================================================================

    /// Creates a parentless group. New nodes start with every dirty flag set.
    pub fn create_group(&mut self, name: &str) -> NodeKey {
        self.insert(Node::new(name, NodeKind::Group { children: Vec::new() }))
    }

    pub fn create_mesh(&mut self, name: &str, mesh: MeshData) -> NodeKey {
        self.insert(Node::new(name, NodeKind::Mesh(mesh)))
    }

    /// Creates a group and attaches it under `parent`.
    pub fn add_group(&mut self, parent: NodeKey, name: &str) -> Result<NodeKey> {
        let key = self.create_group(name);
        self.attach_new(parent, key)
    }

    /// Creates a mesh leaf and attaches it under `parent`.
    pub fn add_mesh(&mut self, parent: NodeKey, name: &str, mesh: MeshData) -> Result<NodeKey> {
        let key = self.create_mesh(name, mesh);
        self.attach_new(parent, key)
    }

    fn insert(&mut self, node: Node) -> NodeKey {
        let key = self.nodes.insert(node);
        self.roots.push(key);
        key
    }

    fn attach_new(&mut self, parent: NodeKey, key: NodeKey) -> Result<NodeKey> {
        if let Err(err) = self.attach(parent, key) {
            self.roots.retain(|&r| r != key);
            self.nodes.remove(key);
            return Err(err);
        }
        Ok(key)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Chainable editing handle for `key`.
    pub fn node(&mut self, key: NodeKey) -> SceneNode<'_> {
        SceneNode::new(self, key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes without a parent, in creation/detach order.
    #[must_use]
    pub fn roots(&self) -> &[NodeKey] {
        &self.roots
    }

    #[must_use]
    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes.get(key).and_then(Node::parent)
    }

    #[must_use]
    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.nodes.get(key).map_or(&[], Node::children)
    }

    fn stale(key: NodeKey) -> TesseraError {
        TesseraError::StaleNode(format!("{key:?}"))
    }

    fn describe(&self, key: NodeKey) -> String {
        match self.nodes.get(key) {
            Some(node) => format!("'{}' ({key:?})", node.name),
            None => format!("{key:?}"),
        }
    }

    fn node_mut(&mut self, key: NodeKey) -> Result<&mut Node> {
        self.nodes.get_mut(key).ok_or_else(|| Self::stale(key))
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// `true` if `ancestor` is a strict ancestor of `node`.
    #[must_use]
    pub fn has_ancestor(&self, node: NodeKey, ancestor: NodeKey) -> bool {
        let mut current = self.parent(node);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = self.parent(key);
        }
        false
    }

    #[must_use]
    pub fn child_index(&self, parent: NodeKey, child: NodeKey) -> Option<usize> {
        self.children(parent).iter().position(|&c| c == child)
    }

    /// Appends `child` to `parent`'s children, detaching it from its current
    /// parent first. Attaching a node to its current parent is a no-op.
    pub fn attach(&mut self, parent: NodeKey, child: NodeKey) -> Result<()> {
        self.attach_at(parent, child, usize::MAX)
    }

    /// Like [`attach`](Self::attach), inserting at `index` (clamped).
    pub fn attach_at(&mut self, parent: NodeKey, child: NodeKey, index: usize) -> Result<()> {
        let parent_node = self.nodes.get(parent).ok_or_else(|| Self::stale(parent))?;
        let child_node = self.nodes.get(child).ok_or_else(|| Self::stale(child))?;

        if !parent_node.is_group() {
            return Err(TesseraError::NotAGroup(self.describe(parent)));
        }
        if child == parent || self.has_ancestor(parent, child) {
            return Err(TesseraError::CyclicAttachment {
                child: self.describe(child),
                parent: self.describe(parent),
            });
        }
        if child_node.parent == Some(parent) {
            return Ok(());
        }

        if child_node.parent.is_some() {
            self.detach(child)?;
        }
        self.roots.retain(|&r| r != child);

        if let Some(children) = self.node_mut(parent)?.children_mut() {
            let index = index.min(children.len());
            children.insert(index, child);
        }
        self.node_mut(child)?.parent = Some(parent);

        log::trace!("Attached {} under {}", self.describe(child), self.describe(parent));
        self.mark_dirty(child, DirtyType::Attached);
        Ok(())
    }

    /// Detaches `child` from its parent, making it a root. Returns the former
    /// parent, or `None` if it already was a root.
    ///
    /// The detached subtree is marked dirty in every category and the former
    /// ancestors get [`DirtyFlags::BOUNDING`]. The `Detached` event starts at
    /// the former parent.
    pub fn detach(&mut self, child: NodeKey) -> Result<Option<NodeKey>> {
        let Some(parent) = self.nodes.get(child).ok_or_else(|| Self::stale(child))?.parent else {
            return Ok(None);
        };

        self.unlink(child, parent);
        self.roots.push(child);

        self.propagate_down(child, DirtyType::Detached.down_flags());
        self.propagate_up(parent, DirtyFlags::BOUNDING);
        self.fire(
            parent,
            &DirtyEvent {
                source: child,
                kind: DirtyType::Detached,
                dirty: true,
            },
        );
        log::trace!("Detached {} from {}", self.describe(child), self.describe(parent));
        Ok(Some(parent))
    }

    /// Detaches every child of `parent`; returns them in their former order.
    pub fn detach_all_children(&mut self, parent: NodeKey) -> Result<Vec<NodeKey>> {
        let children = self.nodes.get(parent).ok_or_else(|| Self::stale(parent))?.children().to_vec();
        for &child in &children {
            self.detach(child)?;
        }
        Ok(children)
    }

    /// Swaps two children by index. Out-of-range indices leave the order
    /// unchanged and return `false`.
    pub fn swap_children(&mut self, parent: NodeKey, a: usize, b: usize) -> bool {
        match self.nodes.get_mut(parent).and_then(Node::children_mut) {
            Some(children) if a < children.len() && b < children.len() => {
                children.swap(a, b);
                true
            }
            _ => false,
        }
    }

    /// Destroys `key` and its whole subtree; returns how many nodes were
    /// removed.
    pub fn remove_node(&mut self, key: NodeKey) -> Result<usize> {
        if !self.contains(key) {
            return Err(Self::stale(key));
        }
        self.mark_dirty(key, DirtyType::Destroyed);

        match self.parent(key) {
            Some(parent) => self.unlink(key, parent),
            None => self.roots.retain(|&r| r != key),
        }

        let doomed = self.descendants(key);
        for &node in &doomed {
            self.nodes.remove(node);
        }
        log::debug!("Removed {} node(s) rooted at {key:?}", doomed.len());
        Ok(doomed.len())
    }

    fn unlink(&mut self, child: NodeKey, parent: NodeKey) {
        if let Some(children) = self.nodes.get_mut(parent).and_then(Node::children_mut) {
            children.retain(|&c| c != child);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
        }
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Visits `root` and its descendants, parents before children.
    pub fn visit_pre_order(&self, root: NodeKey, mut visitor: impl FnMut(NodeKey, &Node)) {
        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            if let Some(node) = self.nodes.get(key) {
                visitor(key, node);
                stack.extend(node.children().iter().rev().copied());
            }
        }
    }

    /// Visits `root` and its descendants, children before parents.
    pub fn visit_post_order(&self, root: NodeKey, mut visitor: impl FnMut(NodeKey, &Node)) {
        // (key, children already pushed)
        let mut stack = vec![(root, false)];
        while let Some((key, expanded)) = stack.pop() {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            if expanded {
                visitor(key, node);
            } else {
                stack.push((key, true));
                stack.extend(node.children().iter().rev().map(|&c| (c, false)));
            }
        }
    }

    /// `root` followed by its descendants in pre-order.
    #[must_use]
    pub fn descendants(&self, root: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        self.visit_pre_order(root, |key, _| out.push(key));
        out
    }

    /// First node named `name` in `root`'s subtree, pre-order.
    #[must_use]
    pub fn find_by_name(&self, root: NodeKey, name: &str) -> Option<NodeKey> {
        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            let node = self.nodes.get(key)?;
            if node.name == name {
                return Some(key);
            }
            stack.extend(node.children().iter().rev().copied());
        }
        None
    }

    // ========================================================================
    // Dirty tracking
    // ========================================================================

    /// Marks `key` dirty and notifies listeners. Stale keys are ignored.
    pub fn mark_dirty(&mut self, key: NodeKey, kind: DirtyType) {
        let Some(node) = self.nodes.get(key) else {
            log::warn!("mark_dirty({kind:?}) on stale node {key:?}");
            return;
        };
        let parent = node.parent;

        let down = kind.down_flags();
        if !down.is_empty() {
            self.propagate_down(key, down);
        }
        match kind {
            DirtyType::Bounding => self.propagate_up(key, DirtyFlags::BOUNDING),
            DirtyType::RenderState => {}
            DirtyType::Transform | DirtyType::Attached | DirtyType::Detached | DirtyType::Destroyed => {
                if let Some(parent) = parent {
                    self.propagate_up(parent, DirtyFlags::BOUNDING);
                }
            }
        }

        log::trace!("{key:?} marked {kind:?}");
        self.fire(
            key,
            &DirtyEvent {
                source: key,
                kind,
                dirty: true,
            },
        );
    }

    /// Clears the stored flag for `kind` on `key` alone and notifies
    /// listeners.
    pub fn clear_dirty(&mut self, key: NodeKey, kind: DirtyType) {
        let Some(node) = self.nodes.get_mut(key) else {
            log::warn!("clear_dirty({kind:?}) on stale node {key:?}");
            return;
        };
        node.dirty.remove(kind.flag());
        self.fire(
            key,
            &DirtyEvent {
                source: key,
                kind,
                dirty: false,
            },
        );
    }

    /// Structural kinds are never stored and always report `false`.
    #[must_use]
    pub fn is_dirty(&self, key: NodeKey, kind: DirtyType) -> bool {
        let flag = kind.flag();
        !flag.is_empty() && self.nodes.get(key).is_some_and(|n| n.dirty.contains(flag))
    }

    #[must_use]
    pub fn dirty_flags(&self, key: NodeKey) -> DirtyFlags {
        self.nodes.get(key).map_or(DirtyFlags::empty(), Node::dirty_flags)
    }

    fn propagate_down(&mut self, key: NodeKey, flags: DirtyFlags) {
        let mut stack: Children = SmallVec::new();
        stack.push(key);
        while let Some(key) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(key) {
                node.dirty |= flags;
                stack.extend(node.children().iter().copied());
            }
        }
    }

    fn propagate_up(&mut self, key: NodeKey, flags: DirtyFlags) {
        let mut current = Some(key);
        while let Some(key) = current {
            let Some(node) = self.nodes.get_mut(key) else {
                break;
            };
            node.dirty |= flags;
            current = node.parent;
        }
    }

    fn fire(&mut self, start: NodeKey, event: &DirtyEvent) {
        let mut current = Some(start);
        while let Some(key) = current {
            let Some(node) = self.nodes.get_mut(key) else {
                break;
            };
            for (_, listener) in &mut node.listeners {
                if listener.on_dirty(event) {
                    return;
                }
            }
            current = node.parent;
        }
    }

    pub fn add_listener(&mut self, key: NodeKey, listener: impl DirtyListener + 'static) -> Result<ListenerId> {
        let id = ListenerId(self.next_id);
        self.node_mut(key)?.listeners.push((id, Box::new(listener)));
        self.next_id += 1;
        Ok(id)
    }

    pub fn remove_listener(&mut self, key: NodeKey, id: ListenerId) -> bool {
        let Some(node) = self.nodes.get_mut(key) else {
            return false;
        };
        let before = node.listeners.len();
        node.listeners.retain(|(l, _)| *l != id);
        node.listeners.len() != before
    }

    // ========================================================================
    // Transforms
    // ========================================================================

    fn edit_local(&mut self, key: NodeKey, edit: impl FnOnce(&mut Transform)) -> Result<()> {
        edit(&mut self.node_mut(key)?.local);
        self.mark_dirty(key, DirtyType::Transform);
        Ok(())
    }

    pub fn set_transform(&mut self, key: NodeKey, transform: Transform) -> Result<()> {
        self.edit_local(key, |local| *local = transform)
    }

    pub fn set_translation(&mut self, key: NodeKey, translation: Vec3) -> Result<()> {
        self.edit_local(key, |local| local.translation = translation)
    }

    pub fn add_translation(&mut self, key: NodeKey, delta: Vec3) -> Result<()> {
        self.edit_local(key, |local| local.translate(delta))
    }

    pub fn set_rotation(&mut self, key: NodeKey, rotation: Quat) -> Result<()> {
        self.edit_local(key, |local| local.rotation = rotation)
    }

    pub fn set_rotation_euler(&mut self, key: NodeKey, x: f32, y: f32, z: f32) -> Result<()> {
        self.edit_local(key, |local| local.set_rotation_euler(x, y, z))
    }

    pub fn set_scale(&mut self, key: NodeKey, scale: Vec3) -> Result<()> {
        self.edit_local(key, |local| local.scale = scale)
    }

    /// Orients the node towards `target`, given in parent space.
    pub fn look_at(&mut self, key: NodeKey, target: Vec3, up: Vec3) -> Result<()> {
        self.edit_local(key, |local| local.look_at(target, up))
    }

    #[must_use]
    pub fn local_transform(&self, key: NodeKey) -> Option<&Transform> {
        self.nodes.get(key).map(Node::local_transform)
    }

    #[must_use]
    pub fn world_transform(&self, key: NodeKey) -> Option<&Affine3A> {
        self.nodes.get(key).map(Node::world_matrix)
    }

    #[must_use]
    pub fn world_translation(&self, key: NodeKey) -> Option<Vec3> {
        self.nodes.get(key).map(Node::world_translation)
    }

    #[must_use]
    pub fn world_bound(&self, key: NodeKey) -> Option<BoundingBox> {
        self.nodes.get(key).and_then(|n| n.world_bound)
    }

    /// Overwrites the derived world matrix. Nothing is marked dirty, so the
    /// next transform update of this node replaces the value.
    pub fn set_world_transform(&mut self, key: NodeKey, world: Affine3A) -> Result<()> {
        self.node_mut(key)?.world = world;
        Ok(())
    }

    #[must_use]
    pub fn local_to_world(&self, key: NodeKey, point: Vec3) -> Option<Vec3> {
        self.nodes.get(key).map(|n| n.world.transform_point3(point))
    }

    /// `None` for stale keys and singular world matrices.
    #[must_use]
    pub fn world_to_local(&self, key: NodeKey, point: Vec3) -> Option<Vec3> {
        let world = self.nodes.get(key)?.world;
        if world.matrix3.determinant().abs() <= f32::EPSILON {
            return None;
        }
        Some(world.inverse().transform_point3(point))
    }

    // ========================================================================
    // Render states
    // ========================================================================

    /// Sets a local override, returning the one it replaced.
    pub fn set_render_state(&mut self, key: NodeKey, state: RenderState) -> Result<Option<RenderState>> {
        let previous = self.node_mut(key)?.local_states.set(state);
        self.mark_dirty(key, DirtyType::RenderState);
        Ok(previous)
    }

    pub fn clear_render_state(&mut self, key: NodeKey, ty: StateType) -> Result<Option<RenderState>> {
        let previous = self.node_mut(key)?.local_states.take(ty);
        if previous.is_some() {
            self.mark_dirty(key, DirtyType::RenderState);
        }
        Ok(previous)
    }

    #[must_use]
    pub fn local_state(&self, key: NodeKey, ty: StateType) -> Option<&RenderState> {
        self.nodes.get(key)?.local_states.get(ty)
    }

    /// Effective state of `ty` at `key` as of the last update pass.
    #[must_use]
    pub fn resolved_state(&self, key: NodeKey, ty: StateType) -> Option<&RenderState> {
        self.nodes.get(key)?.resolved_states.get(ty)
    }

    // ========================================================================
    // Mesh data
    // ========================================================================

    #[must_use]
    pub fn mesh(&self, key: NodeKey) -> Option<&MeshData> {
        self.nodes.get(key)?.mesh()
    }

    fn mesh_mut(&mut self, key: NodeKey) -> Result<&mut MeshData> {
        if !self.contains(key) {
            return Err(Self::stale(key));
        }
        let description = self.describe(key);
        self.node_mut(key)?
            .mesh_mut()
            .ok_or(TesseraError::NotAMesh(description))
    }

    pub fn set_model_bound(&mut self, key: NodeKey, bound: Option<BoundingBox>) -> Result<()> {
        self.mesh_mut(key)?.model_bound = bound;
        self.mark_dirty(key, DirtyType::Bounding);
        Ok(())
    }

    /// Replaces the vertex buffer and recomputes the model bound from it.
    pub fn set_vertices(&mut self, key: NodeKey, vertices: BufferRef) -> Result<Option<BoundingBox>> {
        self.mesh_mut(key)?.vertices = Some(vertices);
        self.update_model_bound(key)
    }

    pub fn set_indices(&mut self, key: NodeKey, indices: Option<BufferRef>) -> Result<()> {
        self.mesh_mut(key)?.indices = indices;
        Ok(())
    }

    /// Recomputes the model bound from the vertex buffer's positions and
    /// marks [`DirtyType::Bounding`].
    pub fn update_model_bound(&mut self, key: NodeKey) -> Result<Option<BoundingBox>> {
        let mesh = self.mesh_mut(key)?;
        let bound = mesh
            .vertices
            .as_ref()
            .and_then(|vertices| BoundingBox::from_points(vertices.positions()));
        mesh.model_bound = bound;
        self.mark_dirty(key, DirtyType::Bounding);
        Ok(bound)
    }

    // ========================================================================
    // Controllers
    // ========================================================================

    pub fn add_controller(&mut self, key: NodeKey, controller: impl Controller + 'static) -> Result<ControllerId> {
        let id = ControllerId(self.next_id);
        self.node_mut(key)?.controllers.add(id, Box::new(controller));
        self.next_id += 1;
        Ok(id)
    }

    pub fn remove_controller(&mut self, key: NodeKey, id: ControllerId) -> bool {
        self.nodes.get_mut(key).is_some_and(|n| n.controllers.remove(id))
    }

    pub fn clear_controllers(&mut self, key: NodeKey) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.controllers.clear();
        }
    }

    #[must_use]
    pub fn controller_count(&self, key: NodeKey) -> usize {
        self.nodes.get(key).map_or(0, |n| n.controllers.len())
    }

    fn run_controllers(&mut self, key: NodeKey, time: f64) {
        let mut controllers = match self.nodes.get_mut(key) {
            Some(node) if !node.controllers.is_empty() => node.controllers.lend(),
            _ => return,
        };

        for (_, controller) in &mut controllers {
            if controller.is_active() {
                controller.update(time, key, self);
            }
            match self.nodes.get(key) {
                // Removed by its own controller; the list goes with it.
                None => return,
                Some(node) if node.controllers.changed() => break,
                Some(_) => {}
            }
        }

        if let Some(node) = self.nodes.get_mut(key) {
            node.controllers.restore(controllers);
        }
    }

    // ========================================================================
    // Update pass
    // ========================================================================

    /// Updates every root.
    pub fn update(&mut self, time: f64) {
        let mut stack = StateStack::with_capacity(self.settings.initial_stack_capacity);
        let roots = self.roots.clone();
        for root in roots {
            self.update_geometric_state_with(root, time, true, &mut stack);
        }
    }

    /// Per-frame update of `key` and its subtree.
    ///
    /// `initiator` marks the top-level call: when it recomputes the bound of
    /// `key`, the bounds of the ancestors above `key` are refreshed too.
    pub fn update_geometric_state(&mut self, key: NodeKey, time: f64, initiator: bool) {
        let mut stack = StateStack::with_capacity(self.settings.initial_stack_capacity);
        self.update_geometric_state_with(key, time, initiator, &mut stack);
    }

    /// Same as [`update_geometric_state`](Self::update_geometric_state), with
    /// a caller-owned stack. The stack is left as it was passed in.
    pub fn update_geometric_state_with(&mut self, key: NodeKey, time: f64, initiator: bool, stack: &mut StateStack) {
        let marker = stack.marker();
        self.push_ancestor_states(key, stack);
        let bound_updated = self.update_node(key, time, stack);
        stack.unwind_to(marker);

        if initiator && bound_updated {
            self.propagate_bound_to_root(key);
        }
    }

    fn push_ancestor_states(&self, key: NodeKey, stack: &mut StateStack) {
        let mut ancestors: Children = SmallVec::new();
        let mut current = self.parent(key);
        while let Some(ancestor) = current {
            ancestors.push(ancestor);
            current = self.parent(ancestor);
        }
        for ancestor in ancestors.into_iter().rev() {
            if let Some(node) = self.nodes.get(ancestor) {
                stack.push_all(&node.local_states);
            }
        }
    }

    /// Returns `true` if the world bound of `key` was recomputed.
    fn update_node(&mut self, key: NodeKey, time: f64, stack: &mut StateStack) -> bool {
        self.run_controllers(key, time);

        let Some(node) = self.nodes.get(key) else {
            return false;
        };
        let marker = stack.marker();
        stack.push_all(&node.local_states);
        let dirty = node.dirty;

        let mut bound_updated = false;
        if dirty.is_empty() {
            self.update_children(key, time, stack);
        } else {
            if dirty.contains(DirtyFlags::TRANSFORM) {
                self.update_world_transform(key);
            }
            if dirty.contains(DirtyFlags::RENDER_STATE) {
                self.update_world_render_states(key, stack);
            }
            self.update_children(key, time, stack);
            if self.is_dirty(key, DirtyType::Bounding) {
                self.update_world_bound(key);
                bound_updated = true;
            }
        }

        stack.unwind_to(marker);
        bound_updated
    }

    fn update_children(&mut self, key: NodeKey, time: f64, stack: &mut StateStack) {
        let children: Children = self.children(key).iter().copied().collect();
        for child in children {
            // A controller higher up may have moved it this frame.
            if self.parent(child) == Some(key) {
                self.update_node(child, time, stack);
            }
        }
    }

    /// Recomputes the world matrix of `key` from its parent's world matrix
    /// and clears [`DirtyType::Transform`].
    pub fn update_world_transform(&mut self, key: NodeKey) {
        let parent_world = self.parent(key).and_then(|p| self.nodes.get(p)).map(|p| p.world);
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        let local = node.local.to_affine();
        node.world = match parent_world {
            Some(parent_world) => parent_world * local,
            None => local,
        };
        self.clear_dirty(key, DirtyType::Transform);
    }

    fn update_world_render_states(&mut self, key: NodeKey, stack: &StateStack) {
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        node.resolved_states = stack.resolve();
        self.clear_dirty(key, DirtyType::RenderState);
    }

    /// Recomputes the world bound of `key` from its current inputs and
    /// clears [`DirtyType::Bounding`]. Children are not updated.
    pub fn update_world_bound(&mut self, key: NodeKey) {
        let Some(node) = self.nodes.get(key) else {
            return;
        };

        let bound = match &node.kind {
            NodeKind::Group { children } => {
                let mut merged: Option<BoundingBox> = None;
                for child in children {
                    let Some(child_bound) = self.nodes.get(*child).and_then(|c| c.world_bound) else {
                        continue;
                    };
                    if !child_bound.is_finite() {
                        if self.settings.validate_bounds {
                            log::error!(
                                "Skipping non-finite world bound of {} while merging {}",
                                self.describe(*child),
                                self.describe(key)
                            );
                        }
                        continue;
                    }
                    merged = Some(match merged {
                        Some(acc) => acc.union(&child_bound),
                        None => child_bound,
                    });
                }
                merged
            }
            NodeKind::Mesh(mesh) => mesh.model_bound.map(|b| b.transform(&node.world)),
        };

        if self.settings.validate_bounds && bound.is_some_and(|b| !b.is_finite()) {
            log::error!("World bound of {} is not finite", self.describe(key));
        }
        if let Some(node) = self.nodes.get_mut(key) {
            node.world_bound = bound;
        }
        self.clear_dirty(key, DirtyType::Bounding);
    }

    /// Refreshes the world bounds of every ancestor of `key`, nearest first.
    pub fn propagate_bound_to_root(&mut self, key: NodeKey) {
        let mut current = self.parent(key);
        while let Some(ancestor) = current {
            self.update_world_bound(ancestor);
            current = self.parent(ancestor);
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("nodes", &self.nodes.len())
            .field("roots", &self.roots)
            .field("settings", &self.settings)
            .finish()
    }
}
