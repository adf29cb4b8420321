//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con i parametri della pipeline di preview
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `pngquant_path`: Path esplicito di pngquant (default: None = risoluzione automatica)
//! - `scratch_dir`: Directory per i preview (default: `<tmp>/pngquant-preview`)
//! - `quiescence_ms`: Attesa dopo l'ultima modifica prima di convertire (default: 1000)
//! - `artifact_suffix`: Suffisso dei file di preview (default: "_preview.png")
//! - `purge_scope`: `managed` o `directory` (default: managed)
//! - `defaults`: Parametri iniziali (quality 50, colors 128, floyd 0.5, speed 7)
//! - `json_output`: Eventi come righe JSON su stdout (default: false)
//!
//! ## Validazione:
//! - Controlla che quiescence_ms sia tra 1 e 60000
//! - Controlla che artifact_suffix non sia vuoto e non contenga separatori
//! - Controlla che scratch_dir, se esiste, sia una directory
//!
//! I campi mancanti nel file JSON prendono il valore di default.
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     quiescence_ms: 500,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::artifact_store::{PurgeScope, TempArtifactStore};
use crate::error::PreviewError;
use crate::params::ConversionParameters;
use crate::pipeline::PipelineSettings;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for the quiet period.
pub const MAX_QUIESCENCE_MS: u64 = 60_000;

const APP_DIR: &str = "pngquant-preview";

/// Configuration for the preview pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Explicit pngquant executable
    pub pngquant_path: Option<PathBuf>,
    /// Directory holding preview artifacts
    pub scratch_dir: Option<PathBuf>,
    /// Quiet period before converting, in milliseconds
    pub quiescence_ms: u64,
    /// Suffix appended to the source name for preview files
    pub artifact_suffix: String,
    /// Which scratch files a purge may delete
    pub purge_scope: PurgeScope,
    /// Parameters used until the user changes them
    pub defaults: ConversionParameters,
    /// Output events as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pngquant_path: None,
            scratch_dir: None,
            quiescence_ms: 1000,
            artifact_suffix: "_preview.png".to_string(),
            purge_scope: PurgeScope::Managed,
            defaults: ConversionParameters::default(),
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.quiescence_ms == 0 || self.quiescence_ms > MAX_QUIESCENCE_MS {
            return Err(anyhow::anyhow!(
                "Quiescence must be between 1 and {} ms",
                MAX_QUIESCENCE_MS
            ));
        }

        if self.artifact_suffix.is_empty() {
            return Err(anyhow::anyhow!("Artifact suffix must not be empty"));
        }

        if self.artifact_suffix.contains(['/', '\\']) {
            return Err(anyhow::anyhow!(
                "Artifact suffix must not contain path separators: {}",
                self.artifact_suffix
            ));
        }

        if let Some(ref scratch_dir) = self.scratch_dir {
            if scratch_dir.exists() && !scratch_dir.is_dir() {
                return Err(anyhow::anyhow!(
                    "Scratch path is not a directory: {}",
                    scratch_dir.display()
                ));
            }
        }

        if let Some(ref pngquant) = self.pngquant_path {
            if pngquant.as_os_str().is_empty() {
                return Err(anyhow::anyhow!("pngquant path must not be empty"));
            }
        }

        Ok(())
    }

    /// `<config dir>/pngquant-preview/config.json`, when the platform has one
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.json"))
    }

    /// Load configuration from file. A missing file yields the defaults.
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Effective scratch directory
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR))
    }

    pub fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            quiescence: self.quiescence(),
            initial_parameters: self.defaults,
        }
    }

    /// Opens (and creates) the scratch directory described by this config
    pub fn artifact_store(&self) -> Result<TempArtifactStore, PreviewError> {
        TempArtifactStore::new(self.scratch_dir(), self.artifact_suffix.clone(), self.purge_scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert_ok!(config.validate());

        config.quiescence_ms = 0;
        assert_err!(config.validate());

        config.quiescence_ms = MAX_QUIESCENCE_MS + 1;
        assert_err!(config.validate());

        config.quiescence_ms = 250;
        config.artifact_suffix = String::new();
        assert_err!(config.validate());

        config.artifact_suffix = "/evil.png".to_string();
        assert_err!(config.validate());
    }

    #[test]
    fn test_scratch_dir_must_be_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let config = Config {
            scratch_dir: Some(file),
            ..Default::default()
        };
        assert_err!(config.validate());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.quiescence_ms, 1000);
        assert_eq!(config.artifact_suffix, "_preview.png");
        assert_eq!(config.purge_scope, PurgeScope::Managed);
        assert_eq!(config.defaults, ConversionParameters::new(50.0, 128.0, 0.5, 7.0));
        assert!(!config.json_output);
        assert!(config.scratch_dir().ends_with("pngquant-preview"));
        assert_eq!(config.pipeline_settings().quiescence, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.json");

        let original_config = Config {
            pngquant_path: Some(PathBuf::from("/opt/pngquant/bin/pngquant")),
            scratch_dir: Some(temp_dir.path().join("scratch")),
            quiescence_ms: 400,
            artifact_suffix: "-q.png".to_string(),
            purge_scope: PurgeScope::Directory,
            defaults: ConversionParameters::new(70.0, 64.0, 1.0, 3.0),
            json_output: true,
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config, original_config);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(&config_path, r#"{ "quiescence_ms": 300, "purge_scope": "directory" }"#)
            .await
            .unwrap();

        let config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(config.quiescence_ms, 300);
        assert_eq!(config.purge_scope, PurgeScope::Directory);
        assert_eq!(config.artifact_suffix, "_preview.png");
        assert_eq!(config.defaults, ConversionParameters::default());
    }

    #[tokio::test]
    async fn test_invalid_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(&config_path, r#"{ "quiescence_ms": 0 }"#).await.unwrap();

        assert_err!(Config::from_file(&config_path).await);

        let missing = temp_dir.path().join("missing.json");
        assert_eq!(Config::from_file(&missing).await.unwrap(), Config::default());
    }
}
