//! # Temporary Artifact Store Module
//!
//! Questo modulo gestisce la scratch directory in cui pngquant scrive i preview.
//!
//! ## Responsabilità:
//! - Calcola path deterministici per artifact e file di staging
//! - Cancella file stale prima che il compressore scriva
//! - Riporta la dimensione degli artifact
//! - Pulizia massiva (purge) tollerante agli errori
//! - Serializza delete-then-write per ogni artifact con un lock per path
//!
//! ## Naming:
//! ```text
//! Sorgente: /home/me/shots/banner.png
//! Artifact: <scratch>/banner_preview.png
//! Staging:  <scratch>/.banner_preview.png.partial
//! ```
//! Esiste al massimo un artifact vivo per sorgente: una nuova conversione
//! per la stessa sorgente sostituisce quello precedente.
//!
//! ## Scope del purge:
//! - `Managed` (default): solo file creati da questo store o che seguono il suo naming
//! - `Directory`: ogni file nella scratch directory dedicata
//!
//! I file che non si possono rimuovere (già cancellati, scrittura in corso,
//! permessi) vengono saltati con un warning, il purge non si interrompe.

use crate::error::PreviewError;
use crate::model::SourceImage;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use tracing::{debug, warn};
use walkdir::WalkDir;

const STAGING_EXTENSION: &str = ".partial";

/// Which files `purge_all` is allowed to delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurgeScope {
    #[default]
    Managed,
    Directory,
}

/// A file a purge had to leave behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeWarning {
    pub path: PathBuf,
    pub reason: String,
}

/// What a purge removed and what it skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub removed: Vec<PathBuf>,
    pub skipped: Vec<PurgeWarning>,
}

impl PurgeReport {
    fn skip(&mut self, path: &Path, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("Skipping {} during purge: {}", path.display(), reason);
        self.skipped.push(PurgeWarning {
            path: path.to_path_buf(),
            reason,
        });
    }
}

/// Owner of the scratch directory shared by all conversions
pub struct TempArtifactStore {
    root: PathBuf,
    suffix: String,
    scope: PurgeScope,
    managed: Mutex<HashSet<PathBuf>>,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl TempArtifactStore {
    /// Creates the store, creating `root` if needed.
    pub fn new(root: impl Into<PathBuf>, suffix: impl Into<String>, scope: PurgeScope) -> Result<Self, PreviewError> {
        let root = root.into();
        let suffix = suffix.into();
        if suffix.is_empty() || suffix.contains(['/', '\\']) {
            return Err(PreviewError::Config(format!("invalid artifact suffix '{}'", suffix)));
        }
        fs::create_dir_all(&root)?;
        debug!("Scratch directory: {}", root.display());

        Ok(Self {
            root,
            suffix,
            scope,
            managed: Mutex::new(HashSet::new()),
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scope(&self) -> PurgeScope {
        self.scope
    }

    /// Deterministic preview location for `source`.
    pub fn artifact_path(&self, source: &SourceImage) -> PathBuf {
        self.root.join(format!("{}{}", source.base_name(), self.suffix))
    }

    /// Where the compressor writes before its output is promoted.
    pub fn staging_path(&self, source: &SourceImage) -> PathBuf {
        self.root
            .join(format!(".{}{}{}", source.base_name(), self.suffix, STAGING_EXTENSION))
    }

    /// Lock serializing every write, promotion and removal of one artifact.
    ///
    /// Staging files share the lock of the artifact they will become.
    pub fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let key = self.lock_key(path);
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key).or_default().clone()
    }

    /// Deletes whatever is at `path` so a stale file can never pass for a
    /// fresh result. A missing file is fine.
    pub fn prepare_for_write(&self, path: &Path) -> Result<(), PreviewError> {
        fs::create_dir_all(&self.root)?;

        match fs::remove_file(path) {
            Ok(()) => debug!("Removed stale file before write: {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(PreviewError::ArtifactAccess {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }

        self.track(path);
        Ok(())
    }

    /// Moves a finished staging file over the artifact path.
    pub fn promote(&self, staging: &Path, artifact: &Path) -> Result<(), PreviewError> {
        fs::rename(staging, artifact).map_err(|e| PreviewError::ArtifactAccess {
            path: artifact.to_path_buf(),
            source: e,
        })?;

        let mut managed = self.managed.lock().unwrap_or_else(PoisonError::into_inner);
        managed.remove(staging);
        managed.insert(artifact.to_path_buf());
        Ok(())
    }

    /// Size in bytes of an artifact.
    pub fn size_of(&self, path: &Path) -> Result<u64, PreviewError> {
        fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| PreviewError::ArtifactAccess {
                path: path.to_path_buf(),
                source: e,
            })
    }

    /// Removes the artifact and staging file of one source.
    pub fn remove_artifacts_for(&self, source: &SourceImage) -> PurgeReport {
        let mut report = PurgeReport::default();
        for path in [self.artifact_path(source), self.staging_path(source)] {
            if path.exists() {
                self.remove_locked(&path, &mut report);
            }
        }
        report
    }

    /// Removes every file in the scratch directory that falls within the
    /// configured scope.
    pub fn purge_all(&self) -> PurgeReport {
        let mut report = PurgeReport::default();

        if !self.root.exists() {
            return report;
        }

        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                    report.skip(&path, e.to_string());
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            if self.scope == PurgeScope::Managed && !self.is_managed(path) {
                continue;
            }

            self.remove_locked(path, &mut report);
        }

        // tracked paths outside the listing (e.g. unreadable entries) are forgotten
        // only once they are really gone
        let mut managed = self.managed.lock().unwrap_or_else(PoisonError::into_inner);
        managed.retain(|p| p.exists());

        debug!(
            "Purged {} file(s) from {}, skipped {}",
            report.removed.len(),
            self.root.display(),
            report.skipped.len()
        );
        report
    }

    fn remove_locked(&self, path: &Path, report: &mut PurgeReport) {
        let lock = self.lock_for(path);
        let _guard = match lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                report.skip(path, "write in progress");
                return;
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        match fs::remove_file(path) {
            Ok(()) => {
                report.removed.push(path.to_path_buf());
                self.managed
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(path);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => report.skip(path, "already removed"),
            Err(e) => report.skip(path, e.to_string()),
        }
    }

    fn track(&self, path: &Path) {
        self.managed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf());
    }

    fn is_managed(&self, path: &Path) -> bool {
        if self
            .managed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
        {
            return true;
        }

        let name = match path.file_name() {
            Some(name) => name.to_string_lossy(),
            None => return false,
        };
        name.ends_with(&self.suffix)
            || (name.starts_with('.') && name.ends_with(&format!("{}{}", self.suffix, STAGING_EXTENSION)))
    }

    fn lock_key(&self, path: &Path) -> PathBuf {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        match name {
            Some(name)
                if name.len() > STAGING_EXTENSION.len() + 1
                    && name.starts_with('.')
                    && name.ends_with(STAGING_EXTENSION) =>
            {
                let artifact = &name[1..name.len() - STAGING_EXTENSION.len()];
                path.with_file_name(artifact)
            }
            _ => path.to_path_buf(),
        }
    }
}
