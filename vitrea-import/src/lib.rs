//! # Vitrea Import Library
//!
//! The hierarchical import / metadata-synchronization pipeline:
//! - Composite hierarchy tree mirroring the remote containment structure
//! - Remote store collaborator traits (plus an in-memory test double)
//! - Import candidate discovery
//! - Pixel plane linearization and transfer loop
//! - Per-file import state machine and session orchestration

pub mod error;
pub mod pipeline;
pub mod scanner;
pub mod store;
pub mod transfer;
pub mod tree;

pub use crate::error::{ImportError, ImportResult};
pub use crate::pipeline::{FileImporter, FileOutcome, ImportOrchestrator, SessionSummary};
pub use crate::tree::{HierarchyTree, HierarchyVisitor, NodeId, NodeKind, TraversalMode};
