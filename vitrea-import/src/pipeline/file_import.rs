//! Per-file import state machine
//!
//! Stage order per submitted file: chunked upload (started / bytes* /
//! complete | failed | cancelled), server-side parse, image creation and
//! dataset link, pixel-plane transfer, optional archiving, optional
//! thumbnailing, then the terminal event. Stage errors never propagate to
//! the caller as panics or bare results; they convert into a terminal
//! failure event, so one file's failure cannot abort sibling pipelines.

use crate::error::{ImportError, ImportResult};
use crate::store::RemoteStore;
use crate::transfer;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use vitrea_common::config::ImportConfig;
use vitrea_common::events::{
    EventBus, FileUploadPayload, ImportEvent, ImportEventKind, ImportSize, ProgressPayload,
};
use vitrea_common::{Entity, EntityId};

/// Successful per-file import result
#[derive(Debug, Clone)]
pub struct ImportedFile {
    pub image: Entity,
    pub pixels: EntityId,
    pub size: ImportSize,
}

/// Terminal outcome of one file's pipeline
#[derive(Debug, Clone)]
pub enum FileOutcome {
    Succeeded(ImportedFile),
    Failed(String),
    Cancelled,
}

/// Runs the import pipeline for single files against a remote store
#[derive(Clone)]
pub struct FileImporter {
    store: Arc<dyn RemoteStore>,
    bus: EventBus,
    session_id: Uuid,
    chunk_size: usize,
    archive_originals: bool,
    generate_thumbnails: bool,
}

impl FileImporter {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        bus: EventBus,
        session_id: Uuid,
        config: &ImportConfig,
    ) -> Self {
        Self {
            store,
            bus,
            session_id,
            chunk_size: config.upload_chunk_size,
            archive_originals: config.archive_originals,
            generate_thumbnails: config.generate_thumbnails,
        }
    }

    fn emit(&self, kind: ImportEventKind) {
        self.bus.emit(ImportEvent::new(self.session_id, kind));
    }

    /// Import one file, emitting pipeline events throughout.
    ///
    /// Exactly one terminal event is emitted per call: `ImportDone` on
    /// success, `ImportFailed` on any stage error, `ImportCancelled` when
    /// the cancellation token is observed.
    pub fn import_file(
        &self,
        path: &Path,
        index: usize,
        total: usize,
        target: Option<EntityId>,
        cancel: &CancellationToken,
    ) -> FileOutcome {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let result = self.run_stages(path, &filename, index, total, target, cancel);
        match result {
            Ok(done) => {
                self.emit(ImportEventKind::ImportDone(ProgressPayload {
                    index,
                    filename: filename.clone(),
                    target,
                    pixels_id: Some(done.pixels),
                    series: 0,
                    size: Some(done.size),
                }));
                info!(file = %filename, image = ?done.image.id(), "Import complete");
                FileOutcome::Succeeded(done)
            }
            Err(ImportError::Cancelled) => {
                self.emit(ImportEventKind::ImportCancelled {
                    index,
                    filename: filename.clone(),
                });
                info!(file = %filename, "Import cancelled");
                FileOutcome::Cancelled
            }
            Err(e) => {
                let error = e.to_string();
                self.emit(ImportEventKind::ImportFailed {
                    index,
                    filename: filename.clone(),
                    error: error.clone(),
                });
                warn!(file = %filename, error = %error, "Import failed");
                FileOutcome::Failed(error)
            }
        }
    }

    fn run_stages(
        &self,
        path: &Path,
        filename: &str,
        index: usize,
        total: usize,
        target: Option<EntityId>,
        cancel: &CancellationToken,
    ) -> ImportResult<ImportedFile> {
        self.upload(path, filename, index, total, cancel)?;

        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        let staged = self.store.finalize_upload(filename)?;

        let image_name = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());
        let created = self.store.create_image(&image_name, staged.size)?;

        let progress = |size: Option<ImportSize>| ProgressPayload {
            index,
            filename: filename.to_string(),
            target,
            pixels_id: Some(created.pixels),
            series: 0,
            size,
        };

        if let Some(dataset) = target {
            let image_id = created
                .image
                .id()
                .ok_or_else(|| vitrea_common::Error::Remote("created image has no id".to_string()))?;
            self.store.link(dataset, image_id)?;
        }
        self.emit(ImportEventKind::DatasetStored(progress(Some(staged.size))));

        self.emit(ImportEventKind::ImportStep {
            step: index,
            series: 0,
            series_count: staged.series_count,
        });

        transfer::transfer_planes(self.store.as_ref(), staged.pixels, created.pixels, cancel)?;
        self.emit(ImportEventKind::DataStored(progress(Some(staged.size))));

        if self.archive_originals {
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }
            self.store.archive_original(filename, created.pixels)?;
            self.emit(ImportEventKind::ImportArchiving(progress(Some(staged.size))));
        }

        if self.generate_thumbnails {
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }
            self.store.create_thumbnail(created.pixels)?;
            self.emit(ImportEventKind::ImportThumbnailing(progress(Some(
                staged.size,
            ))));
        }

        Ok(ImportedFile {
            image: created.image,
            pixels: created.pixels,
            size: staged.size,
        })
    }

    /// Chunked upload with byte-level progress events
    fn upload(
        &self,
        path: &Path,
        filename: &str,
        index: usize,
        total: usize,
        cancel: &CancellationToken,
    ) -> ImportResult<()> {
        let content_length = std::fs::metadata(path)?.len();
        let payload = |uploaded: u64, error: Option<String>| FileUploadPayload {
            filename: filename.to_string(),
            file_index: index,
            file_total: total,
            uploaded_bytes: uploaded,
            content_length,
            error,
        };

        self.emit(ImportEventKind::FileUploadStarted(payload(0, None)));

        let mut file = File::open(path)?;
        let mut buffer = vec![0u8; self.chunk_size];
        let mut uploaded = 0u64;
        loop {
            if cancel.is_cancelled() {
                self.emit(ImportEventKind::FileUploadCancelled(payload(uploaded, None)));
                return Err(ImportError::Cancelled);
            }
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            if let Err(e) = self.store.upload_chunk(filename, uploaded, &buffer[..read]) {
                let error = e.to_string();
                self.emit(ImportEventKind::FileUploadFailed(payload(
                    uploaded,
                    Some(error.clone()),
                )));
                self.emit(ImportEventKind::FileUploadError(payload(
                    uploaded,
                    Some(error),
                )));
                return Err(e.into());
            }
            uploaded += read as u64;
            self.emit(ImportEventKind::FileUploadBytes(payload(uploaded, None)));
        }

        self.emit(ImportEventKind::FileUploadComplete(payload(uploaded, None)));
        self.emit(ImportEventKind::FileUploadFinished(payload(uploaded, None)));
        Ok(())
    }
}
