//! Dirty flags and dirty-event listeners.

use std::fmt;

use bitflags::bitflags;

use crate::NodeKey;

bitflags! {
    /// Derived values of a node that are stale.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u8 {
        const TRANSFORM    = 1 << 0;
        const RENDER_STATE = 1 << 1;
        const BOUNDING     = 1 << 2;
    }
}

/// What happened to a node. The first three kinds are stored as
/// [`DirtyFlags`]; the structural kinds only drive propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirtyType {
    Transform,
    RenderState,
    Bounding,
    Attached,
    Detached,
    Destroyed,
}

impl DirtyType {
    pub const ALL: [DirtyType; 6] = [
        DirtyType::Transform,
        DirtyType::RenderState,
        DirtyType::Bounding,
        DirtyType::Attached,
        DirtyType::Detached,
        DirtyType::Destroyed,
    ];

    /// The stored flag for this kind, empty for structural kinds.
    #[must_use]
    pub fn flag(self) -> DirtyFlags {
        match self {
            DirtyType::Transform => DirtyFlags::TRANSFORM,
            DirtyType::RenderState => DirtyFlags::RENDER_STATE,
            DirtyType::Bounding => DirtyFlags::BOUNDING,
            DirtyType::Attached | DirtyType::Detached | DirtyType::Destroyed => DirtyFlags::empty(),
        }
    }

    /// Flags set on the node and its whole subtree.
    #[must_use]
    pub(crate) fn down_flags(self) -> DirtyFlags {
        match self {
            DirtyType::Transform => DirtyFlags::TRANSFORM | DirtyFlags::BOUNDING,
            DirtyType::RenderState => DirtyFlags::RENDER_STATE,
            DirtyType::Attached | DirtyType::Detached => DirtyFlags::all(),
            DirtyType::Bounding | DirtyType::Destroyed => DirtyFlags::empty(),
        }
    }

    #[must_use]
    pub fn is_structural(self) -> bool {
        self.flag().is_empty()
    }
}

/// Notification delivered to listeners on the marked node and its
/// ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyEvent {
    /// Node where the mark or clear originated.
    pub source: NodeKey,
    pub kind: DirtyType,
    /// `true` for a mark, `false` for a clear.
    pub dirty: bool,
}

/// Receives [`DirtyEvent`]s. Returning `true` consumes the event and stops
/// it from reaching listeners further up.
pub trait DirtyListener {
    fn on_dirty(&mut self, event: &DirtyEvent) -> bool;
}

impl<F> DirtyListener for F
where
    F: FnMut(&DirtyEvent) -> bool,
{
    fn on_dirty(&mut self, event: &DirtyEvent) -> bool {
        self(event)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Debug for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_kinds_store_nothing() {
        assert!(DirtyType::Attached.is_structural());
        assert!(DirtyType::Destroyed.is_structural());
        assert!(!DirtyType::Bounding.is_structural());
        assert_eq!(DirtyType::Detached.down_flags(), DirtyFlags::all());
        assert_eq!(
            DirtyType::Transform.down_flags(),
            DirtyFlags::TRANSFORM | DirtyFlags::BOUNDING
        );
    }
}
