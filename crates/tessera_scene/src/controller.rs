//! Time-driven node mutators.
//!
//! Controllers run at the start of a node's update, before any derived data
//! is recomputed, so whatever they change is picked up in the same pass.
//! A controller may add or remove controllers on its own node; the rest of
//! that node's controller loop is skipped for the frame and the change takes
//! effect from the next one.

use smallvec::SmallVec;

use crate::NodeKey;
use crate::scene::Scene;

pub trait Controller {
    fn update(&mut self, time: f64, node: NodeKey, scene: &mut Scene);

    /// Inactive controllers stay attached but are skipped.
    fn is_active(&self) -> bool {
        true
    }
}

impl<F> Controller for F
where
    F: FnMut(f64, NodeKey, &mut Scene),
{
    fn update(&mut self, time: f64, node: NodeKey, scene: &mut Scene) {
        self(time, node, scene);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(pub(crate) u64);

type Entry = (ControllerId, Box<dyn Controller>);

/// A node's controllers. While they run, the list is lent out and edits
/// are recorded, then applied when the list is returned.
#[derive(Default)]
pub(crate) struct ControllerSlot {
    entries: Vec<Entry>,
    running: Option<SmallVec<[ControllerId; 4]>>,
    pending_add: Vec<Entry>,
    pending_remove: Vec<ControllerId>,
    pending_clear: bool,
}

impl ControllerSlot {
    pub(crate) fn add(&mut self, id: ControllerId, controller: Box<dyn Controller>) {
        if self.running.is_some() {
            self.pending_add.push((id, controller));
        } else {
            self.entries.push((id, controller));
        }
    }

    pub(crate) fn remove(&mut self, id: ControllerId) -> bool {
        if let Some(pos) = self.pending_add.iter().position(|(i, _)| *i == id) {
            self.pending_add.remove(pos);
            return true;
        }
        match &self.running {
            Some(ids) => {
                let known = !self.pending_clear && ids.contains(&id) && !self.pending_remove.contains(&id);
                if known {
                    self.pending_remove.push(id);
                }
                known
            }
            None => match self.entries.iter().position(|(i, _)| *i == id) {
                Some(pos) => {
                    self.entries.remove(pos);
                    true
                }
                None => false,
            },
        }
    }

    pub(crate) fn clear(&mut self) {
        self.pending_add.clear();
        if self.running.is_some() {
            self.pending_remove.clear();
            self.pending_clear = true;
        } else {
            self.entries.clear();
        }
    }

    pub(crate) fn len(&self) -> usize {
        let base = match &self.running {
            Some(_) if self.pending_clear => 0,
            Some(ids) => ids.len() - self.pending_remove.len(),
            None => self.entries.len(),
        };
        base + self.pending_add.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` once the list was edited while lent out.
    pub(crate) fn changed(&self) -> bool {
        self.pending_clear || !self.pending_add.is_empty() || !self.pending_remove.is_empty()
    }

    pub(crate) fn lend(&mut self) -> Vec<Entry> {
        self.running = Some(self.entries.iter().map(|(id, _)| *id).collect());
        std::mem::take(&mut self.entries)
    }

    pub(crate) fn restore(&mut self, mut entries: Vec<Entry>) {
        self.running = None;
        if std::mem::take(&mut self.pending_clear) {
            entries.clear();
        }
        let removed = std::mem::take(&mut self.pending_remove);
        entries.retain(|(id, _)| !removed.contains(id));
        entries.append(&mut self.pending_add);
        self.entries = entries;
    }
}
