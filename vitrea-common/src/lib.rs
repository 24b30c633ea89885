//! # Vitrea Common Library
//!
//! Shared code for the Vitrea client platform including:
//! - Error taxonomy
//! - Entity (data object) model with identity and dirty-state tracking
//! - Set reconciliation engine (SetMutator)
//! - Import event types and EventBus
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod mutator;

pub use error::{Error, Result};
pub use model::{Entity, EntityId, EntityKind};
pub use mutator::SetMutator;
