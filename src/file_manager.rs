//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file fuori dalla scratch directory.
//!
//! ## Responsabilità:
//! - Determinazione formato file (solo PNG: estensione + signature)
//! - Lettura dimensione file
//! - Sostituzione atomica dell'originale con il preview
//! - Formattazione human-readable delle dimensioni e del rapporto
//!
//! ## Sostituzione atomica:
//! Il contenuto del preview viene copiato in un file temporaneo creato nella
//! stessa directory dell'originale, sincronizzato su disco e poi rinominato
//! sopra l'originale. Non esiste un momento in cui l'originale manca.
//!
//! ## Esempio:
//! ```rust,ignore
//! if FileManager::is_png(&path)? {
//!     let bytes = FileManager::replace_file(&original, &artifact)?;
//!     println!("{}", FileManager::format_kb(bytes));
//! }
//! ```

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use tempfile::NamedTempFile;

/// Bytes needed to recognise an image signature.
const SIGNATURE_LEN: usize = 16;

/// Manages file operations outside the scratch directory
pub struct FileManager;

impl FileManager {
    /// Size of a file in bytes
    pub fn file_size(path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    /// Check if a file has the PNG extension (case-insensitive)
    pub fn is_supported_format(path: &Path) -> bool {
        if let Some(ext) = path.extension() {
            ext.to_string_lossy().eq_ignore_ascii_case("png")
        } else {
            false
        }
    }

    /// Check extension and file signature
    pub fn is_png(path: &Path) -> io::Result<bool> {
        if !Self::is_supported_format(path) {
            return Ok(false);
        }

        let mut header = Vec::with_capacity(SIGNATURE_LEN);
        File::open(path)?
            .take(SIGNATURE_LEN as u64)
            .read_to_end(&mut header)?;

        Ok(matches!(image::guess_format(&header), Ok(image::ImageFormat::Png)))
    }

    /// Atomically replace `original` with the contents of `replacement`.
    ///
    /// Returns the number of bytes written. The replacement file is left in
    /// place; cleaning it up is the caller's job.
    pub fn replace_file(original: &Path, replacement: &Path) -> io::Result<u64> {
        let original_meta = fs::metadata(original)?;
        let parent = match original.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut staged = NamedTempFile::new_in(parent)?;
        let mut source = File::open(replacement)?;
        let written = io::copy(&mut source, staged.as_file_mut())?;
        staged.as_file().sync_all()?;
        fs::set_permissions(staged.path(), original_meta.permissions())?;

        staged.persist(original).map_err(|e| e.error)?;
        Ok(written)
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Size in kilobytes with two decimals, as shown next to the preview
    pub fn format_kb(size: u64) -> String {
        format!("{:.2}", size as f64 / 1024.0)
    }

    /// New size as a percentage of the original size
    pub fn size_ratio_percent(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            (new_size as f64 / original_size as f64) * 100.0
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_supported_format() {
        assert!(FileManager::is_supported_format(Path::new("a.png")));
        assert!(FileManager::is_supported_format(Path::new("/x/B.PNG")));
        assert!(!FileManager::is_supported_format(Path::new("a.jpg")));
        assert!(!FileManager::is_supported_format(Path::new("png")));
    }

    #[test]
    fn test_png_signature_check() {
        let dir = TempDir::new().unwrap();

        let real = dir.path().join("real.png");
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        fs::write(&real, &bytes).unwrap();
        assert!(FileManager::is_png(&real).unwrap());

        let fake = dir.path().join("fake.png");
        fs::write(&fake, b"GIF89a not a png at all").unwrap();
        assert!(!FileManager::is_png(&fake).unwrap());

        assert!(FileManager::is_png(&dir.path().join("missing.png")).is_err());
    }

    #[test]
    fn test_replace_file() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("photo.png");
        let replacement = dir.path().join("photo_preview.png");
        fs::write(&original, vec![1u8; 4096]).unwrap();
        fs::write(&replacement, vec![2u8; 1024]).unwrap();

        let written = FileManager::replace_file(&original, &replacement).unwrap();

        assert_eq!(written, 1024);
        assert_eq!(fs::read(&original).unwrap(), vec![2u8; 1024]);
        assert!(replacement.exists());
    }

    #[test]
    fn test_replace_missing_original_fails() {
        let dir = TempDir::new().unwrap();
        let replacement = dir.path().join("photo_preview.png");
        fs::write(&replacement, b"data").unwrap();

        let err = FileManager::replace_file(&dir.path().join("gone.png"), &replacement).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!dir.path().join("gone.png").exists());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(2048), "2.00 KB");
        assert_eq!(FileManager::format_kb(204_800), "200.00");
    }

    #[test]
    fn test_ratio_and_reduction() {
        assert_eq!(FileManager::size_ratio_percent(200, 50), 25.0);
        assert_eq!(FileManager::size_ratio_percent(0, 50), 0.0);
        assert_eq!(FileManager::calculate_reduction(200, 50), 75.0);
    }
}
