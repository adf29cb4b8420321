//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `PreviewError` enum per categorizzare tutti gli errori della sessione
//! - Definisce `ConversionFailure` per i fallimenti del compressore esterno
//! - Classifica ogni errore con una `Severity` che decide come mostrarlo all'utente
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `UnsupportedFile`: File selezionato non PNG (messaggio visibile, nessun artifact)
//! - `Conversion`: pngquant non avviabile, exit code non zero, output mancante
//! - `ArtifactAccess`: Dimensione/lettura artifact fallita ("non disponibile, riprova")
//! - `Commit`: Sostituzione dell'originale fallita (bloccante)
//! - `PreviewNotReady` / `NoSource`: Comando non applicabile allo stato corrente
//! - `Io`, `Config`, `PipelineClosed`: Errori di infrastruttura
//!
//! I parametri fuori range non sono un errore: vengono normalizzati in
//! `params` e non arrivano mai qui.
//!
//! ## Esempio:
//! ```rust,ignore
//! match pipeline.commit().await {
//!     Err(e) if e.severity() == Severity::Blocking => show_dialog(e.user_message()),
//!     Err(e) => show_notice(e.user_message()),
//!     Ok(outcome) => info!("saved {}", outcome.original.display()),
//! }
//! ```

use std::path::PathBuf;

/// Why a single compressor invocation did not yield a usable preview.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionFailure {
    #[error("compressor could not be started ({}): {message}", .program.display())]
    LaunchFailed { program: PathBuf, message: String },

    #[error("compressor exited with status {}: {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    ExitFailure { code: Option<i32>, stderr: String },

    #[error("compressor exited cleanly but produced no usable output at {}", .0.display())]
    OutputMissing(PathBuf),

    #[error("artifact unavailable: {0}")]
    ArtifactUnavailable(String),
}

/// How an error should reach the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Shown inline next to the preview, the UI keeps working.
    Inline,
    /// Shown as a message, the current operation is aborted.
    Notice,
    /// Modal error; automatic actions stop until acknowledged.
    Blocking,
}

/// Custom error types for the preview session
#[derive(thiserror::Error, Debug)]
pub enum PreviewError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file: {0}")]
    UnsupportedFile(String),

    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConversionFailure),

    #[error("Artifact not accessible {}: {source}", .path.display())]
    ArtifactAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Commit failed for {}: {source}", .path.display())]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Preview not ready: {0}")]
    PreviewNotReady(String),

    #[error("No source image selected")]
    NoSource,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Conversion pipeline is no longer running")]
    PipelineClosed,
}

impl PreviewError {
    /// Maps the error onto the presentation policy.
    pub fn severity(&self) -> Severity {
        match self {
            PreviewError::Commit { .. } => Severity::Blocking,
            PreviewError::ArtifactAccess { .. } => Severity::Inline,
            PreviewError::Conversion(ConversionFailure::ArtifactUnavailable(_)) => Severity::Inline,
            PreviewError::Conversion(_) => Severity::Notice,
            PreviewError::UnsupportedFile(_)
            | PreviewError::PreviewNotReady(_)
            | PreviewError::NoSource
            | PreviewError::Config(_)
            | PreviewError::PipelineClosed
            | PreviewError::Io(_) => Severity::Notice,
        }
    }

    /// Text meant for the user; the full detail goes to the log.
    pub fn user_message(&self) -> String {
        match self {
            PreviewError::Conversion(ConversionFailure::ArtifactUnavailable(_))
            | PreviewError::ArtifactAccess { .. } => "Size unavailable, retry".to_string(),
            PreviewError::Conversion(_) => "Conversion failed".to_string(),
            PreviewError::UnsupportedFile(_) => "Only PNG files can be opened".to_string(),
            other => other.to_string(),
        }
    }
}
