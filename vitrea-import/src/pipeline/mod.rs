//! Import pipeline
//!
//! Per-file import runs as a small state machine: upload, image creation and
//! dataset linking, pixel-plane write, optional archiving and thumbnailing.
//! Every stage is reported as an immutable event; every file ends in exactly
//! one terminal event. The orchestrator runs independent per-file pipelines
//! concurrently, serializing only the shared hierarchy tree.

mod file_import;
mod orchestrator;

pub use file_import::{FileImporter, FileOutcome, ImportedFile};
pub use orchestrator::{ImportOrchestrator, SessionSummary};
