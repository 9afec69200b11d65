//! Context-scoped GPU resource tracking.
//!
//! Every CPU-side [`BufferRef`] carries a [`HandleMap`] from context
//! namespace to the GPU handle it was uploaded as. The [`ResourceRegistry`]
//! tracks live buffers, collects the handles of dropped ones, and hands
//! delete batches to the [`ContextManager`], which deletes them right away
//! on the current context or parks them on the owning context's
//! [`TaskQueue`].

pub mod batch;
pub mod buffer;
pub mod context_manager;
pub mod handle_map;
pub mod registry;
pub mod settings;
pub mod task_queue;

pub use batch::{DeleteBatch, SweepReport, dispatch};
pub use buffer::{AccessMode, BufferData, BufferRef, BufferUsage};
pub use context_manager::{ContextCleanListener, ContextKey, ContextManager, RenderContext};
pub use handle_map::{HandleMap, Harvest, HarvestedHandle};
pub use registry::{BufferKey, ResourceRegistry};
pub use settings::{CacheMode, ResourceSettings, TaskBudget};
pub use task_queue::{HandleDeleter, RenderTask, TaskQueue};
