//! # Conversion Model Module
//!
//! Value type che attraversano la pipeline di conversione.
//!
//! ## Strutture dati:
//! - `SourceImage`: Identità del file originale (path assoluto + nome base)
//! - `Generation`: Contatore monotono che disambigua richieste sovrapposte
//! - `ConversionRequest`: Sorgente + parametri + generation, mai modificata
//! - `ConversionResult`: `Success` con dimensioni oppure `Failure` con motivo
//!
//! ## Regola di ordinamento:
//! Solo il risultato con la generation più alta tra quelle completate può
//! aggiornare lo stato visibile.

use crate::error::{ConversionFailure, PreviewError};
use crate::file_manager::FileManager;
use crate::params::ConversionParameters;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The user's original file for one editing session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceImage {
    path: PathBuf,
    base_name: String,
}

impl SourceImage {
    /// Validates a user selection and pins it to an absolute path.
    ///
    /// # Errors
    /// `PreviewError::UnsupportedFile` when the path does not exist, is not a
    /// regular file, or is not a PNG (extension and signature are checked).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PreviewError> {
        let path = path.as_ref();

        if !FileManager::is_supported_format(path) {
            return Err(PreviewError::UnsupportedFile(format!(
                "{} is not a PNG file",
                path.display()
            )));
        }

        let path = path.canonicalize().map_err(|e| {
            PreviewError::UnsupportedFile(format!("{}: {}", path.display(), e))
        })?;

        if !path.is_file() {
            return Err(PreviewError::UnsupportedFile(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        match FileManager::is_png(&path) {
            Ok(true) => {}
            Ok(false) => {
                return Err(PreviewError::UnsupportedFile(format!(
                    "{} does not contain PNG data",
                    path.display()
                )))
            }
            Err(e) => {
                return Err(PreviewError::UnsupportedFile(format!("{}: {}", path.display(), e)))
            }
        }

        let base_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| PreviewError::UnsupportedFile(format!("Invalid file name: {}", path.display())))?;

        Ok(Self { path, base_name })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without extension, used to name preview artifacts.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }
}

impl fmt::Display for SourceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Monotonically increasing conversion counter. `Generation::ZERO` is never
/// assigned to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    pub const ZERO: Generation = Generation(0);

    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One immutable unit of work for the compressor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub source: SourceImage,
    pub parameters: ConversionParameters,
    pub generation: Generation,
}

impl ConversionRequest {
    pub fn new(source: SourceImage, parameters: ConversionParameters, generation: Generation) -> Self {
        Self {
            source,
            parameters,
            generation,
        }
    }
}

/// Outcome of one compressor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionResult {
    Success {
        artifact_path: PathBuf,
        artifact_size_bytes: u64,
        source_size_bytes: u64,
    },
    Failure {
        reason: ConversionFailure,
    },
}

impl ConversionResult {
    pub fn failure(reason: ConversionFailure) -> Self {
        ConversionResult::Failure { reason }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConversionResult::Success { .. })
    }

    /// Artifact size as a percentage of the source size.
    pub fn size_ratio_percent(&self) -> Option<f64> {
        match self {
            ConversionResult::Success {
                artifact_size_bytes,
                source_size_bytes,
                ..
            } => Some(FileManager::size_ratio_percent(*source_size_bytes, *artifact_size_bytes)),
            ConversionResult::Failure { .. } => None,
        }
    }

    /// One-line feedback in the "KB (ratio%)" form. Failures only get the
    /// user-facing message; the detail is logged by the coordinator.
    pub fn summary(&self) -> String {
        match self {
            ConversionResult::Success {
                artifact_size_bytes,
                source_size_bytes,
                ..
            } => format!(
                "{} KB -> {} KB ({:.1}%)",
                FileManager::format_kb(*source_size_bytes),
                FileManager::format_kb(*artifact_size_bytes),
                FileManager::size_ratio_percent(*source_size_bytes, *artifact_size_bytes)
            ),
            ConversionResult::Failure { reason } => PreviewError::from(reason.clone()).user_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_png(path: &Path) {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&[0u8; 64]);
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_open_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Screenshot 1.png");
        write_png(&path);

        let source = SourceImage::open(&path).unwrap();
        assert!(source.path().is_absolute());
        assert_eq!(source.base_name(), "Screenshot 1");
    }

    #[test]
    fn test_open_rejects_other_formats() {
        let dir = TempDir::new().unwrap();
        let jpeg = dir.path().join("photo.jpg");
        fs::write(&jpeg, [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        assert!(matches!(SourceImage::open(&jpeg), Err(PreviewError::UnsupportedFile(_))));

        let disguised = dir.path().join("photo.png");
        fs::write(&disguised, [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        assert!(matches!(SourceImage::open(&disguised), Err(PreviewError::UnsupportedFile(_))));

        let missing = dir.path().join("missing.png");
        assert!(matches!(SourceImage::open(&missing), Err(PreviewError::UnsupportedFile(_))));
    }

    #[test]
    fn test_generation_order() {
        let g1 = Generation::ZERO.next();
        let g2 = g1.next();
        assert!(g2 > g1);
        assert_eq!(g2.to_string(), "#2");
    }

    #[test]
    fn test_result_ratio_and_summary() {
        let result = ConversionResult::Success {
            artifact_path: PathBuf::from("/tmp/a_preview.png"),
            artifact_size_bytes: 51_200,
            source_size_bytes: 204_800,
        };
        assert_eq!(result.size_ratio_percent(), Some(25.0));
        assert_eq!(result.summary(), "200.00 KB -> 50.00 KB (25.0%)");

        let failed = ConversionResult::failure(ConversionFailure::OutputMissing(PathBuf::from("/tmp/x")));
        assert!(!failed.is_success());
        assert_eq!(failed.size_ratio_percent(), None);
    }

    #[test]
    fn test_failure_summary_hides_detail() {
        let launch = ConversionResult::failure(ConversionFailure::LaunchFailed {
            program: PathBuf::from("/opt/tools/pngquant"),
            message: "No such file or directory".to_string(),
        });
        assert_eq!(launch.summary(), "Conversion failed");

        let unavailable = ConversionResult::failure(ConversionFailure::ArtifactUnavailable(
            "metadata: permission denied".to_string(),
        ));
        assert_eq!(unavailable.summary(), "Size unavailable, retry");
    }
}
