//! Export stage: markdown vault with entity stubs and calendar notes.
//!
//! The vector store is the store of record: an export failure after the
//! vector commit downgrades the result to `stored_unexported` instead of
//! failing the document.

pub mod calendar;
pub mod links;
pub mod note;
pub mod slug;
pub mod stubs;

pub use links::LinkTarget;
pub use note::NoteContext;
pub use slug::{note_filename, slugify};

use crate::config::AutoLinkMode;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Errors from vault writes. Logged, never fatal for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frontmatter serialization: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Writes notes, stubs, and calendar entries into a vault directory.
///
/// Calendar and stub writes are serialized per file path with advisory
/// async locks so concurrent documents from the same day cannot lose
/// updates.
pub struct VaultExporter {
    root: PathBuf,
    auto_link: AutoLinkMode,
    file_locks: DashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>,
}

impl VaultExporter {
    pub fn new(root: impl Into<PathBuf>, auto_link: AutoLinkMode) -> Self {
        Self {
            root: root.into(),
            auto_link,
            file_locks: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        self.file_locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Export one document. Returns the vault-relative note path.
    pub async fn export(&self, context: &NoteContext<'_>) -> Result<PathBuf, ExportError> {
        std::fs::create_dir_all(&self.root)?;

        let filename = note_filename(
            context.created_date,
            context.doc.doc_type.label(),
            &context.metadata.title,
            context.fingerprint.short_id(),
        );
        let note_path = self.root.join(&filename);
        let rendered = note::render_note(context, self.auto_link)?;
        std::fs::write(&note_path, rendered)?;
        debug!(note = %filename, "note exported");

        // Entity stubs, created-if-absent under a per-stub lock.
        for entity in context.metadata.all_entities() {
            let stub_path = self.root.join(stubs::stub_relative_path(entity));
            let lock = self.lock_for(&stub_path);
            let _guard = lock.lock().await;
            stubs::ensure_entity_stub(&self.root, entity)?;
        }
        for date in &context.metadata.dates {
            if date.iso.is_some() {
                stubs::ensure_date_stub(&self.root, date)?;
            }
        }

        // Daily note under the per-date lock.
        let daily_path = self.root.join(calendar::daily_path(context.created_date));
        let note_stem = filename.trim_end_matches(".md").to_string();
        {
            let lock = self.lock_for(&daily_path);
            let _guard = lock.lock().await;
            calendar::record_document(
                &self.root,
                context.created_date,
                context.doc.doc_type.label(),
                &note_stem,
                &context.metadata.title,
            )?;
        }

        Ok(PathBuf::from(filename))
    }

    /// Export, downgrading failures to a warning. Returns the note path on
    /// success, `None` when the export failed and was queued for repair.
    pub async fn export_fail_open(&self, context: &NoteContext<'_>) -> Option<PathBuf> {
        match self.export(context).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(doc_id = context.doc_id, error = %e, "export failed; vector write stands");
                None
            }
        }
    }
}
