//! # Commit Module
//!
//! Sostituisce l'originale con il preview corrente e pulisce la scratch
//! directory. Nessun rollback automatico: un errore viene riportato così
//! com'è e la pipeline si ferma finché l'utente non lo conferma.

use crate::artifact_store::{PurgeReport, TempArtifactStore};
use crate::error::PreviewError;
use crate::file_manager::FileManager;
use crate::model::SourceImage;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use tracing::info;

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub original: PathBuf,
    pub bytes_written: u64,
    pub purge: PurgeReport,
}

/// Swaps a preview artifact into the original's place
#[derive(Clone)]
pub struct CommitController {
    store: Arc<TempArtifactStore>,
}

impl CommitController {
    pub fn new(store: Arc<TempArtifactStore>) -> Self {
        Self { store }
    }

    /// Replaces `original` with the bytes of `artifact`, then purges scratch.
    ///
    /// # Errors
    /// `PreviewError::Commit` if either file is missing or the replacement
    /// fails. Scratch is left untouched in that case.
    pub fn commit(&self, original: &SourceImage, artifact: &Path) -> Result<CommitOutcome, PreviewError> {
        let commit_error = |source: io::Error| PreviewError::Commit {
            path: original.path().to_path_buf(),
            source,
        };

        if !original.path().is_file() {
            return Err(commit_error(io::Error::new(
                io::ErrorKind::NotFound,
                "original file no longer exists",
            )));
        }
        if !artifact.is_file() {
            return Err(commit_error(io::Error::new(
                io::ErrorKind::NotFound,
                format!("preview artifact {} is missing", artifact.display()),
            )));
        }

        let bytes_written = {
            let lock = self.store.lock_for(artifact);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            FileManager::replace_file(original.path(), artifact).map_err(commit_error)?
        };
        info!(
            "Saved preview over {} ({})",
            original,
            FileManager::format_size(bytes_written)
        );

        let purge = self.store.purge_all();

        Ok(CommitOutcome {
            original: original.path().to_path_buf(),
            bytes_written,
            purge,
        })
    }
}
