//! Per-frame drivers.
//!
//! [`SceneUpdater`] owns the state stack reused across roots and frames.
//! [`FrameDriver`] adds a clock and, optionally, a resource registry whose
//! expired buffers are swept after every scene update.

use std::sync::Arc;
use std::time::Duration;

use tessera_core::{FrameTimer, Result};
use tessera_resources::{HandleDeleter, ResourceRegistry, SweepReport};

use crate::NodeKey;
use crate::scene::Scene;
use crate::settings::SceneSettings;
use crate::state::StateStack;

#[derive(Debug, Default)]
pub struct SceneUpdater {
    stack: StateStack,
    frame: u64,
}

impl SceneUpdater {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_settings(settings: &SceneSettings) -> Self {
        Self {
            stack: StateStack::with_capacity(settings.initial_stack_capacity),
            frame: 0,
        }
    }

    /// Updates one root as the initiator of the pass.
    pub fn update(&mut self, scene: &mut Scene, root: NodeKey, time: f64) {
        scene.update_geometric_state_with(root, time, true, &mut self.stack);
        debug_assert!(self.stack.is_empty(), "state stack not unwound");
    }

    /// Updates each root in order and counts one frame.
    pub fn update_all(&mut self, scene: &mut Scene, roots: &[NodeKey], time: f64) {
        for &root in roots {
            self.update(scene, root, time);
        }
        self.frame += 1;
    }

    /// Frames completed through [`update_all`](Self::update_all).
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

/// Outcome of one [`FrameDriver`] frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    /// Seconds passed to the update pass.
    pub dt: f64,
    /// `None` when the driver has no registry.
    pub sweep: Option<SweepReport>,
}

#[derive(Debug, Default)]
pub struct FrameDriver {
    timer: FrameTimer,
    updater: SceneUpdater,
    resources: Option<Arc<ResourceRegistry>>,
}

impl FrameDriver {
    #[must_use]
    pub fn new(settings: &SceneSettings) -> Self {
        Self {
            timer: FrameTimer::new(),
            updater: SceneUpdater::with_settings(settings),
            resources: None,
        }
    }

    #[must_use]
    pub fn with_resources(mut self, resources: Arc<ResourceRegistry>) -> Self {
        self.resources = Some(resources);
        self
    }

    #[must_use]
    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }

    #[must_use]
    pub fn updater(&self) -> &SceneUpdater {
        &self.updater
    }

    /// Ticks the wall clock and runs one frame.
    pub fn run_frame(
        &mut self,
        scene: &mut Scene,
        roots: &[NodeKey],
        deleter: Option<&mut dyn HandleDeleter>,
    ) -> Result<FrameReport> {
        self.timer.tick();
        self.frame(scene, roots, deleter)
    }

    /// Runs one frame with a fixed time step.
    pub fn step(
        &mut self,
        scene: &mut Scene,
        roots: &[NodeKey],
        step: Duration,
        deleter: Option<&mut dyn HandleDeleter>,
    ) -> Result<FrameReport> {
        self.timer.advance(step);
        self.frame(scene, roots, deleter)
    }

    fn frame(
        &mut self,
        scene: &mut Scene,
        roots: &[NodeKey],
        deleter: Option<&mut dyn HandleDeleter>,
    ) -> Result<FrameReport> {
        let dt = self.timer.dt_seconds();
        self.updater.update_all(scene, roots, dt);

        let sweep = match &self.resources {
            Some(resources) => Some(resources.clean_expired(deleter)?),
            None => None,
        };

        Ok(FrameReport {
            frame: self.updater.frame(),
            dt,
            sweep,
        })
    }
}
