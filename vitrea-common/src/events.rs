//! Import event types and EventBus
//!
//! Every step of an import pipeline is communicated as an immutable,
//! timestamped event broadcast to any number of listeners. Consumers
//! reconstruct progress by observing the stream; the pipeline never exposes
//! mutable shared state. Delivery is fire-and-forget through a
//! `tokio::sync::broadcast` channel so a slow listener cannot stall the
//! transfer loop.

use crate::model::EntityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Pixel set dimensions attached to progress events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSize {
    pub size_x: i32,
    pub size_y: i32,
    pub size_z: i32,
    pub size_c: i32,
    pub size_t: i32,
}

/// Discovery-phase bookkeeping: which candidate is being counted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountPayload {
    /// Short display name of the candidate (filename without path)
    pub short_name: String,
    /// Position of the candidate in the submission order
    pub index: usize,
    /// Candidates fully counted so far
    pub num_done: usize,
    /// Total candidates submitted
    pub total: usize,
}

/// Byte-level transfer tracking for one file upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadPayload {
    pub filename: String,
    pub file_index: usize,
    pub file_total: usize,
    pub uploaded_bytes: u64,
    pub content_length: u64,
    /// Present on the failure variants of this family
    pub error: Option<String>,
}

/// Per-file milestone tracking after a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub index: usize,
    pub filename: String,
    /// Target container the file is imported into, once known
    pub target: Option<EntityId>,
    /// Remote pixel set id, once created
    pub pixels_id: Option<EntityId>,
    /// Series index within the file (multi-series formats)
    pub series: usize,
    pub size: Option<ImportSize>,
}

/// One step of an import operation.
///
/// Closed taxonomy: count events for the discovery phase, file-upload events
/// for byte-level transfer, progress events for post-upload milestones, and
/// session bookkeeping. Each submitted file sees exactly one terminal event
/// ([`ImportDone`](ImportEventKind::ImportDone),
/// [`ImportFailed`](ImportEventKind::ImportFailed) or
/// [`ImportCancelled`](ImportEventKind::ImportCancelled)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ImportEventKind {
    // Session bookkeeping
    SessionStarted {
        root_folder: String,
    },
    SessionFailed {
        error: String,
    },
    SessionComplete {
        files_total: usize,
        successes: usize,
        failures: usize,
        cancelled: usize,
    },

    // Count events (discovery phase)
    LoadingImage(CountPayload),
    LoadedImage(CountPayload),

    // File-upload events
    FileUploadStarted(FileUploadPayload),
    FileUploadBytes(FileUploadPayload),
    FileUploadComplete(FileUploadPayload),
    FileUploadFailed(FileUploadPayload),
    FileUploadCancelled(FileUploadPayload),
    FileUploadError(FileUploadPayload),
    FileUploadFinished(FileUploadPayload),

    // Progress events (post-upload milestones)
    ImportStep {
        step: usize,
        series: usize,
        series_count: usize,
    },
    DatasetStored(ProgressPayload),
    DataStored(ProgressPayload),
    ImportArchiving(ProgressPayload),
    ImportThumbnailing(ProgressPayload),
    ImportDone(ProgressPayload),

    // Terminal error/cancellation
    ImportFailed {
        index: usize,
        filename: String,
        error: String,
    },
    ImportCancelled {
        index: usize,
        filename: String,
    },
}

impl ImportEventKind {
    /// Name of the variant, for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "SessionStarted",
            Self::SessionFailed { .. } => "SessionFailed",
            Self::SessionComplete { .. } => "SessionComplete",
            Self::LoadingImage(_) => "LoadingImage",
            Self::LoadedImage(_) => "LoadedImage",
            Self::FileUploadStarted(_) => "FileUploadStarted",
            Self::FileUploadBytes(_) => "FileUploadBytes",
            Self::FileUploadComplete(_) => "FileUploadComplete",
            Self::FileUploadFailed(_) => "FileUploadFailed",
            Self::FileUploadCancelled(_) => "FileUploadCancelled",
            Self::FileUploadError(_) => "FileUploadError",
            Self::FileUploadFinished(_) => "FileUploadFinished",
            Self::ImportStep { .. } => "ImportStep",
            Self::DatasetStored(_) => "DatasetStored",
            Self::DataStored(_) => "DataStored",
            Self::ImportArchiving(_) => "ImportArchiving",
            Self::ImportThumbnailing(_) => "ImportThumbnailing",
            Self::ImportDone(_) => "ImportDone",
            Self::ImportFailed { .. } => "ImportFailed",
            Self::ImportCancelled { .. } => "ImportCancelled",
        }
    }

    /// Terminal events end one file's pipeline.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ImportDone(_) | Self::ImportFailed { .. } | Self::ImportCancelled { .. }
        )
    }
}

/// An immutable, timestamped fact about one import session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportEvent {
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ImportEventKind,
}

impl ImportEvent {
    pub fn new(session_id: Uuid, kind: ImportEventKind) -> Self {
        Self {
            session_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Compact one-line rendering for log views
    pub fn to_log(&self) -> String {
        match &self.kind {
            ImportEventKind::ImportStep {
                step,
                series,
                series_count,
            } => format!(
                "Event: ImportStep Image: {} Series: {} Total Series: {}",
                step, series, series_count
            ),
            ImportEventKind::FileUploadBytes(p) => format!(
                "Event: FileUploadBytes {} {}/{} bytes",
                p.filename, p.uploaded_bytes, p.content_length
            ),
            kind => format!("Event: {}", kind.name()),
        }
    }
}

/// Broadcast channel for import events.
///
/// Listeners subscribe for their own receiver; emission never blocks the
/// pipeline. Events emitted before subscription are not received.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ImportEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per receiver
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ImportEvent> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all subscribers.
    ///
    /// A bus with no subscribers is not an error; the event is dropped and
    /// logged at debug level.
    pub fn emit(&self, event: ImportEvent) {
        match self.tx.send(event) {
            Ok(receivers) => {
                debug!(receivers, "Event broadcast");
            }
            Err(broadcast::error::SendError(event)) => {
                debug!(event = %event.to_log(), "No receivers for event");
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
