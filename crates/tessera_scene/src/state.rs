//! Render states and their inheritance.
//!
//! A node may override any [`StateType`] locally. During the update pass a
//! single [`StateStack`] is threaded through the traversal: each node pushes
//! its local overrides, resolves the top of every category into its
//! [`ResolvedStates`], and pops its overrides again before control returns
//! to its parent.

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// The closed set of render state categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StateType {
    Blend,
    Fog,
    Light,
    Material,
    Shading,
    Wireframe,
    ZBuffer,
    Cull,
    ColorMask,
}

impl StateType {
    pub const COUNT: usize = 9;

    pub const ALL: [StateType; Self::COUNT] = [
        StateType::Blend,
        StateType::Fog,
        StateType::Light,
        StateType::Material,
        StateType::Shading,
        StateType::Wireframe,
        StateType::ZBuffer,
        StateType::Cull,
        StateType::ColorMask,
    ];

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

// ============================================================================
// Per-category payloads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlendFactor {
    Zero,
    #[default]
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendState {
    pub enabled: bool,
    pub source: BlendFactor,
    pub destination: BlendFactor,
}

impl BlendState {
    pub const ALPHA: Self = Self {
        enabled: true,
        source: BlendFactor::SrcAlpha,
        destination: BlendFactor::OneMinusSrcAlpha,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FogState {
    pub color: Vec4,
    pub start: f32,
    pub end: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Light {
    #[must_use]
    pub fn point(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position,
            color,
            intensity,
        }
    }
}

/// How a light state combines with the light states above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LightCombineMode {
    /// The nearest light state wins outright.
    #[default]
    Replace,
    /// Merge with ancestor lights, nearest first, until a `Replace` state
    /// or [`LightState::MAX_LIGHTS`] is reached.
    CombineClosest,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LightState {
    pub lights: SmallVec<[Light; 4]>,
    pub combine: LightCombineMode,
}

impl LightState {
    pub const MAX_LIGHTS: usize = 8;

    #[must_use]
    pub fn new(lights: impl IntoIterator<Item = Light>, combine: LightCombineMode) -> Self {
        Self {
            lights: lights.into_iter().collect(),
            combine,
        }
    }

    /// Combines a stack of light states, innermost last.
    fn combine<'a>(stack: impl DoubleEndedIterator<Item = &'a LightState>) -> LightState {
        let mut merged = LightState::default();
        let mut stack = stack.rev();

        let Some(nearest) = stack.next() else {
            return merged;
        };
        merged.combine = nearest.combine;
        merged.lights.extend(nearest.lights.iter().copied().take(Self::MAX_LIGHTS));
        if nearest.combine == LightCombineMode::Replace {
            return merged;
        }

        for state in stack {
            let room = Self::MAX_LIGHTS - merged.lights.len();
            if room == 0 {
                break;
            }
            merged.lights.extend(state.lights.iter().copied().take(room));
            if state.combine == LightCombineMode::Replace {
                break;
            }
        }
        merged
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialState {
    pub diffuse: Vec4,
    pub ambient: Vec4,
    pub specular: Vec4,
    pub shininess: f32,
}

impl Default for MaterialState {
    fn default() -> Self {
        Self {
            diffuse: Vec4::ONE,
            ambient: Vec4::new(0.2, 0.2, 0.2, 1.0),
            specular: Vec4::ZERO,
            shininess: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShadingMode {
    Flat,
    #[default]
    Smooth,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireframeState {
    pub enabled: bool,
    pub line_width: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompareFunction {
    Never,
    Less,
    #[default]
    LessEqual,
    Equal,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZBufferState {
    pub enabled: bool,
    pub write: bool,
    pub function: CompareFunction,
}

impl Default for ZBufferState {
    fn default() -> Self {
        Self {
            enabled: true,
            write: true,
            function: CompareFunction::LessEqual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CullFace {
    None,
    #[default]
    Back,
    Front,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorMask {
    pub red: bool,
    pub green: bool,
    pub blue: bool,
    pub alpha: bool,
}

impl ColorMask {
    pub const ALL: Self = Self {
        red: true,
        green: true,
        blue: true,
        alpha: true,
    };
}

/// A render state override for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RenderState {
    Blend(BlendState),
    Fog(FogState),
    Light(LightState),
    Material(MaterialState),
    Shading(ShadingMode),
    Wireframe(WireframeState),
    ZBuffer(ZBufferState),
    Cull(CullFace),
    ColorMask(ColorMask),
}

impl RenderState {
    #[must_use]
    pub fn state_type(&self) -> StateType {
        match self {
            RenderState::Blend(_) => StateType::Blend,
            RenderState::Fog(_) => StateType::Fog,
            RenderState::Light(_) => StateType::Light,
            RenderState::Material(_) => StateType::Material,
            RenderState::Shading(_) => StateType::Shading,
            RenderState::Wireframe(_) => StateType::Wireframe,
            RenderState::ZBuffer(_) => StateType::ZBuffer,
            RenderState::Cull(_) => StateType::Cull,
            RenderState::ColorMask(_) => StateType::ColorMask,
        }
    }

    #[must_use]
    pub fn as_light(&self) -> Option<&LightState> {
        match self {
            RenderState::Light(light) => Some(light),
            _ => None,
        }
    }
}

// ============================================================================
// State sets
// ============================================================================

/// One optional state per category.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSet {
    slots: [Option<RenderState>; StateType::COUNT],
}

impl StateSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Stores `state` in its category, returning the state it replaced.
    pub fn set(&mut self, state: RenderState) -> Option<RenderState> {
        let index = state.state_type().index();
        self.slots[index].replace(state)
    }

    pub fn take(&mut self, ty: StateType) -> Option<RenderState> {
        self.slots[ty.index()].take()
    }

    #[must_use]
    pub fn get(&self, ty: StateType) -> Option<&RenderState> {
        self.slots[ty.index()].as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RenderState> {
        self.slots.iter().flatten()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl Default for StateSet {
    fn default() -> Self {
        Self::new()
    }
}

/// The effective state of every category at one node.
pub type ResolvedStates = StateSet;

// ============================================================================
// StateStack
// ============================================================================

/// Per-category stacks shared by a whole traversal.
#[derive(Debug, Clone)]
pub struct StateStack {
    stacks: [Vec<RenderState>; StateType::COUNT],
    journal: Vec<StateType>,
}

/// Position in a [`StateStack`]'s push history, see [`StateStack::marker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackMarker(usize);

impl StateStack {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stacks: std::array::from_fn(|_| Vec::with_capacity(capacity)),
            journal: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, state: &RenderState) {
        let ty = state.state_type();
        self.stacks[ty.index()].push(state.clone());
        self.journal.push(ty);
    }

    pub fn push_all(&mut self, states: &StateSet) {
        for state in states.iter() {
            self.push(state);
        }
    }

    /// Pops the most recent push.
    pub fn pop(&mut self) -> Option<RenderState> {
        let ty = self.journal.pop()?;
        self.stacks[ty.index()].pop()
    }

    #[must_use]
    pub fn marker(&self) -> StackMarker {
        StackMarker(self.journal.len())
    }

    /// Pops everything pushed since `marker` was taken.
    pub fn unwind_to(&mut self, marker: StackMarker) {
        while self.journal.len() > marker.0 {
            self.pop();
        }
    }

    #[must_use]
    pub fn top(&self, ty: StateType) -> Option<&RenderState> {
        self.stacks[ty.index()].last()
    }

    /// Number of pushes not yet popped.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.journal.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.journal.is_empty()
    }

    pub fn clear(&mut self) {
        for stack in &mut self.stacks {
            stack.clear();
        }
        self.journal.clear();
    }

    /// Resolves every category from the current stack contents.
    #[must_use]
    pub fn resolve(&self) -> ResolvedStates {
        let mut resolved = ResolvedStates::new();
        for ty in StateType::ALL {
            let stack = &self.stacks[ty.index()];
            let state = match ty {
                StateType::Light if !stack.is_empty() => Some(RenderState::Light(LightState::combine(
                    stack.iter().filter_map(RenderState::as_light),
                ))),
                _ => stack.last().cloned(),
            };
            if let Some(state) = state {
                resolved.set(state);
            }
        }
        resolved
    }
}

impl Default for StateStack {
    fn default() -> Self {
        Self::new()
    }
}
