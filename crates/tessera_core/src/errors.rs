//! Error Types
//!
//! This module defines the error type shared by every Tessera crate.
//!
//! # Overview
//!
//! [`TesseraError`] covers the failure modes of the two core subsystems:
//! - GPU handle registration and context resolution in the resource cache
//! - Structural edits of the scene graph
//!
//! Lookups that simply find nothing (a buffer not yet uploaded in a context,
//! a node without a local render state) are *not* errors; they return `0`
//! or `None` and the caller decides what to do.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tessera_core::errors::{TesseraError, Result};
//!
//! fn register(map: &HandleMap, ctx: &ContextRef) -> Result<()> {
//!     map.put(ctx, 7)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the Tessera engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TesseraError {
    // ========================================================================
    // Resource Cache Errors
    // ========================================================================
    /// A GPU handle must be strictly positive; `0` means "not uploaded".
    #[error("Invalid GPU handle {0}: handles must be > 0")]
    InvalidHandle(u32),

    /// A single-context harvest needs a current context to attribute handles to.
    #[error("No render context is current; single-context handles cannot be attributed")]
    NoCurrentContext,

    // ========================================================================
    // Context Registry Errors
    // ========================================================================
    /// The referenced render context is not (or no longer) registered.
    #[error("Unknown render context: {0}")]
    UnknownContext(String),

    // ========================================================================
    // Scene Graph Errors
    // ========================================================================
    /// The node handle does not refer to a live node.
    #[error("Stale node handle: {0}")]
    StaleNode(String),

    /// Only group nodes can own children.
    #[error("Node {0} is not a group and cannot own children")]
    NotAGroup(String),

    /// Geometry operations need a mesh leaf.
    #[error("Node {0} is not a mesh")]
    NotAMesh(String),

    /// Attaching would make a node its own ancestor.
    #[error("Child {child} is already part of the hierarchy above {parent}")]
    CyclicAttachment {
        /// Node that was to be attached
        child: String,
        /// Intended parent
        parent: String,
    },
}

/// Alias for `Result<T, TesseraError>`.
pub type Result<T> = std::result::Result<T, TesseraError>;
