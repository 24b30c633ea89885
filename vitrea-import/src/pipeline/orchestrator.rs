//! Session-level import orchestration
//!
//! Manages the full session lifecycle: candidate discovery and counting,
//! concurrent per-file pipelines, hierarchy tree linking, and session
//! completion. Per-file pipelines are independent; the only shared mutable
//! state is the hierarchy tree, whose structural mutations are serialized
//! behind a single writer lock.

use crate::pipeline::file_import::{FileImporter, FileOutcome};
use crate::scanner::FileScanner;
use crate::store::RemoteStore;
use crate::tree::HierarchyTree;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use vitrea_common::config::ImportConfig;
use vitrea_common::events::{CountPayload, EventBus, ImportEvent, ImportEventKind};
use vitrea_common::EntityId;

/// Final tally of one import session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub files_total: usize,
    pub successes: usize,
    pub failures: usize,
    pub cancelled: usize,
}

/// Session-level import orchestrator
pub struct ImportOrchestrator {
    store: Arc<dyn RemoteStore>,
    bus: EventBus,
    config: ImportConfig,
    tree: Arc<Mutex<HierarchyTree>>,
    cancel: CancellationToken,
}

impl ImportOrchestrator {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        bus: EventBus,
        config: ImportConfig,
        tree: Arc<Mutex<HierarchyTree>>,
    ) -> Self {
        Self {
            store,
            bus,
            config,
            tree,
            cancel: CancellationToken::new(),
        }
    }

    /// Token observed cooperatively by every per-file pipeline
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute a complete import session over a root folder.
    ///
    /// Scans for candidates, emits count events, then runs one pipeline per
    /// file bounded by the configured concurrency. Imported images are
    /// linked into the hierarchy tree under `target` when it is present in
    /// the tree. Per-file failures never abort sibling pipelines; only a
    /// scan failure fails the session itself.
    pub async fn execute_import(
        &self,
        root_folder: &Path,
        target: Option<EntityId>,
    ) -> Result<SessionSummary> {
        let session_id = Uuid::new_v4();
        info!(
            session_id = %session_id,
            root_folder = %root_folder.display(),
            "Starting import session"
        );

        self.emit(
            session_id,
            ImportEventKind::SessionStarted {
                root_folder: root_folder.display().to_string(),
            },
        );

        // Discovery phase
        let scan = match FileScanner::new().scan(root_folder) {
            Ok(scan) => scan,
            Err(e) => {
                self.emit(
                    session_id,
                    ImportEventKind::SessionFailed {
                        error: e.to_string(),
                    },
                );
                return Err(e.into());
            }
        };
        let total = scan.files.len();

        // Counting phase
        for (index, file) in scan.files.iter().enumerate() {
            let short_name = short_name(file);
            self.emit(
                session_id,
                ImportEventKind::LoadingImage(CountPayload {
                    short_name: short_name.clone(),
                    index,
                    num_done: index,
                    total,
                }),
            );
            self.emit(
                session_id,
                ImportEventKind::LoadedImage(CountPayload {
                    short_name,
                    index,
                    num_done: index + 1,
                    total,
                }),
            );
        }

        if scan.files.is_empty() {
            info!(session_id = %session_id, "No import candidates found");
            let summary = SessionSummary {
                session_id,
                files_total: 0,
                successes: 0,
                failures: 0,
                cancelled: 0,
            };
            self.emit_complete(session_id, &summary);
            return Ok(summary);
        }

        // Per-file pipelines, one task per file
        let importer = FileImporter::new(
            Arc::clone(&self.store),
            self.bus.clone(),
            session_id,
            &self.config,
        );
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_files));
        let mut handles = Vec::with_capacity(total);
        for (index, file) in scan.files.into_iter().enumerate() {
            handles.push(self.spawn_file_task(
                importer.clone(),
                Arc::clone(&semaphore),
                file,
                index,
                total,
                target,
            ));
        }

        let mut successes = 0;
        let mut failures = 0;
        let mut cancelled = 0;
        for handle in handles {
            match handle.await {
                Ok(FileOutcome::Succeeded(_)) => successes += 1,
                Ok(FileOutcome::Failed(_)) => failures += 1,
                Ok(FileOutcome::Cancelled) => cancelled += 1,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Import task panicked");
                    failures += 1;
                }
            }
        }

        let summary = SessionSummary {
            session_id,
            files_total: total,
            successes,
            failures,
            cancelled,
        };
        info!(
            session_id = %session_id,
            files = total,
            successes,
            failures,
            cancelled,
            "Import session finished"
        );
        self.emit_complete(session_id, &summary);
        Ok(summary)
    }

    fn spawn_file_task(
        &self,
        importer: FileImporter,
        semaphore: Arc<Semaphore>,
        file: PathBuf,
        index: usize,
        total: usize,
        target: Option<EntityId>,
    ) -> tokio::task::JoinHandle<FileOutcome> {
        let cancel = self.cancel.clone();
        let tree = Arc::clone(&self.tree);
        tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("import semaphore closed");

            let outcome = tokio::task::spawn_blocking({
                let cancel = cancel.clone();
                move || importer.import_file(&file, index, total, target, &cancel)
            })
            .await
            .unwrap_or_else(|e| FileOutcome::Failed(e.to_string()));

            if let FileOutcome::Succeeded(done) = &outcome {
                link_into_tree(&tree, target, done.image.clone());
            }
            outcome
        })
    }

    fn emit(&self, session_id: Uuid, kind: ImportEventKind) {
        self.bus.emit(ImportEvent::new(session_id, kind));
    }

    fn emit_complete(&self, session_id: Uuid, summary: &SessionSummary) {
        self.emit(
            session_id,
            ImportEventKind::SessionComplete {
                files_total: summary.files_total,
                successes: summary.successes,
                failures: summary.failures,
                cancelled: summary.cancelled,
            },
        );
    }
}

/// Attach a freshly imported image under its dataset node, if the dataset is
/// in the tree. Structural mutation happens under the tree's writer lock.
fn link_into_tree(
    tree: &Arc<Mutex<HierarchyTree>>,
    target: Option<EntityId>,
    image: vitrea_common::Entity,
) {
    let Some(dataset_id) = target else {
        return;
    };
    let mut tree = tree.lock().expect("tree mutex poisoned");
    let Some(dataset_node) = tree.find_by_entity(dataset_id) else {
        return;
    };
    let leaf = tree.new_leaf(image);
    if let Err(e) = tree.add_child(dataset_node, leaf) {
        warn!(error = %e, "Could not attach imported image to tree");
    }
}

fn short_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
