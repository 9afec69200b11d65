use glam::{Affine3A, Vec3};
use tessera_core::{BoundingBox, Transform};
use tessera_resources::BufferRef;

use crate::NodeKey;
use crate::controller::ControllerSlot;
use crate::dirty::{DirtyFlags, DirtyListener, ListenerId};
use crate::state::{ResolvedStates, StateSet};

/// Geometry carried by a mesh leaf.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    /// Bound of the geometry in model space.
    pub model_bound: Option<BoundingBox>,
    pub vertices: Option<BufferRef>,
    pub indices: Option<BufferRef>,
}

impl MeshData {
    #[must_use]
    pub fn with_bound(bound: BoundingBox) -> Self {
        Self {
            model_bound: Some(bound),
            ..Self::default()
        }
    }

    /// Builds a mesh around a vertex buffer of packed `f32` positions and
    /// derives the model bound from it.
    #[must_use]
    pub fn from_vertices(vertices: BufferRef) -> Self {
        let model_bound = BoundingBox::from_points(vertices.positions());
        Self {
            model_bound,
            vertices: Some(vertices),
            indices: None,
        }
    }

    #[must_use]
    pub fn with_indices(mut self, indices: BufferRef) -> Self {
        self.indices = Some(indices);
        self
    }
}

/// What a node is: an interior group or a renderable leaf.
#[derive(Debug)]
pub enum NodeKind {
    Group { children: Vec<NodeKey> },
    Mesh(MeshData),
}

/// A scene node.
///
/// Hierarchy links, derived data and dirty flags are only changed through
/// [`Scene`](crate::Scene), which keeps them consistent.
pub struct Node {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) kind: NodeKind,

    pub(crate) local: Transform,
    pub(crate) world: Affine3A,
    pub(crate) world_bound: Option<BoundingBox>,

    pub(crate) dirty: DirtyFlags,
    pub(crate) local_states: StateSet,
    pub(crate) resolved_states: ResolvedStates,

    pub(crate) listeners: Vec<(ListenerId, Box<dyn DirtyListener>)>,
    pub(crate) controllers: ControllerSlot,
}

impl Node {
    pub(crate) fn new(name: &str, kind: NodeKind) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            kind,
            local: Transform::IDENTITY,
            world: Affine3A::IDENTITY,
            world_bound: None,
            dirty: DirtyFlags::all(),
            local_states: StateSet::new(),
            resolved_states: ResolvedStates::new(),
            listeners: Vec::new(),
            controllers: ControllerSlot::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group { .. })
    }

    /// Children of a group; empty for a mesh.
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeKey] {
        match &self.kind {
            NodeKind::Group { children } => children,
            NodeKind::Mesh(_) => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<NodeKey>> {
        match &mut self.kind {
            NodeKind::Group { children } => Some(children),
            NodeKind::Mesh(_) => None,
        }
    }

    #[must_use]
    pub fn mesh(&self) -> Option<&MeshData> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            NodeKind::Group { .. } => None,
        }
    }

    pub(crate) fn mesh_mut(&mut self) -> Option<&mut MeshData> {
        match &mut self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            NodeKind::Group { .. } => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn local_transform(&self) -> &Transform {
        &self.local
    }

    /// World matrix; stale while [`DirtyFlags::TRANSFORM`] is set.
    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world
    }

    #[must_use]
    pub fn world_translation(&self) -> Vec3 {
        self.world.translation.into()
    }

    /// World bound; stale while [`DirtyFlags::BOUNDING`] is set. `None` for
    /// an empty group or a mesh without a model bound.
    #[must_use]
    pub fn world_bound(&self) -> Option<&BoundingBox> {
        self.world_bound.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn dirty_flags(&self) -> DirtyFlags {
        self.dirty
    }

    #[must_use]
    pub fn local_states(&self) -> &StateSet {
        &self.local_states
    }

    /// States in effect at this node as of its last render-state update.
    #[must_use]
    pub fn resolved_states(&self) -> &ResolvedStates {
        &self.resolved_states
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("kind", &self.kind)
            .field("dirty", &self.dirty)
            .field("local", &self.local)
            .field("listeners", &self.listeners.len())
            .field("controllers", &self.controllers.len())
            .finish_non_exhaustive()
    }
}
