//! Resource Cache Settings
//!
//! ```rust,ignore
//! use tessera_resources::{ResourceSettings, CacheMode, TaskBudget};
//!
//! // One GL context for the whole application: skip per-context bookkeeping.
//! let settings = ResourceSettings::default()
//!     .with_cache_mode(CacheMode::SingleContext)
//!     .with_task_budget(TaskBudget::Millis(2));
//! ```

use serde::{Deserialize, Serialize};

/// How buffer handle maps key their entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// One "uploaded" slot per buffer. Handles are attributed to whichever
    /// context is current when they are harvested.
    SingleContext,
    /// One entry per context namespace, held weakly so destroyed contexts
    /// are pruned lazily.
    #[default]
    MultiContext,
}

/// How many deferred tasks a context runs each time it is made current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskBudget {
    /// Exactly one task per activation.
    One,
    /// Drain the whole queue.
    #[default]
    All,
    /// Keep running tasks until this many milliseconds have elapsed.
    /// At least one task always runs.
    Millis(u64),
}

/// Configuration for [`ResourceRegistry`](crate::ResourceRegistry) and
/// [`ContextManager`](crate::ContextManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSettings {
    pub cache_mode: CacheMode,
    pub task_budget: TaskBudget,
}

impl ResourceSettings {
    #[must_use]
    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    #[must_use]
    pub fn with_task_budget(mut self, budget: TaskBudget) -> Self {
        self.task_budget = budget;
        self
    }
}
