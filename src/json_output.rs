//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per chi pilota la CLI
//! da un altro processo.
//!
//! ## Responsabilità:
//! - Converte ogni `PipelineEvent` in un messaggio JSON su una riga
//! - Espone lo stato corrente (`status`) e gli errori dei comandi (`error`)
//!
//! ## Tipi di messaggi:
//! - `source_selected`: Nuovo file aperto
//! - `conversion_started`: Conversione avviata per una generation
//! - `conversion_applied`: Preview aggiornato con dimensione e rapporto
//! - `conversion_failed`: Conversione fallita, preview precedente mantenuto
//! - `conversion_superseded`: Risultato scartato perché superato
//! - `conversion_unchanged`: Parametri identici al preview corrente
//! - `discarded`: Sessione chiusa e artifact rimossi
//! - `commit_succeeded` / `commit_failed`: Esito del salvataggio
//! - `purged`: Pulizia della scratch directory
//! - `status`: Snapshot dello stato
//! - `error`: Errore di un comando

use crate::artifact_store::PurgeReport;
use crate::error::{PreviewError, Severity};
use crate::model::{ConversionResult, Generation};
use crate::params::ConversionParameters;
use crate::pipeline::{PipelineEvent, PreviewView};
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    SourceSelected {
        path: PathBuf,
    },

    ConversionStarted {
        generation: Generation,
        parameters: ConversionParameters,
    },

    ConversionApplied {
        generation: Generation,
        artifact_path: PathBuf,
        artifact_size: u64,
        source_size: u64,
        ratio_percent: f64,
    },

    ConversionFailed {
        generation: Generation,
        message: String,
        severity: &'static str,
        details: String,
    },

    ConversionSuperseded {
        generation: Generation,
    },

    ConversionUnchanged {
        parameters: ConversionParameters,
    },

    Discarded {
        purge: PurgeReport,
    },

    CommitSucceeded {
        original: PathBuf,
        bytes_written: u64,
        purge: PurgeReport,
    },

    CommitFailed {
        message: String,
    },

    Purged {
        report: PurgeReport,
    },

    Status {
        state: &'static str,
        source: Option<PathBuf>,
        parameters: ConversionParameters,
        preview: Option<PathBuf>,
        preview_size: Option<u64>,
        ratio_percent: Option<f64>,
        last_failure: Option<String>,
        halted: bool,
    },

    /// Errore generale
    Error {
        message: String,
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    /// Crea un messaggio di errore
    pub fn error(message: impl Into<String>, details: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            details,
        }
    }

    pub fn status(view: &PreviewView) -> Self {
        Self::Status {
            state: view.state.label(),
            source: view.source.as_ref().map(|s| s.path().to_path_buf()),
            parameters: view.parameters,
            preview: view.preview.as_ref().map(|p| p.artifact_path.clone()),
            preview_size: view.preview.as_ref().map(|p| p.artifact_size_bytes),
            ratio_percent: view.preview.as_ref().map(|p| p.size_ratio_percent()),
            last_failure: view.last_failure.as_ref().map(|f| f.to_string()),
            halted: view.halted,
        }
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Inline => "inline",
        Severity::Notice => "notice",
        Severity::Blocking => "blocking",
    }
}

impl From<&PipelineEvent> for JsonMessage {
    fn from(event: &PipelineEvent) -> Self {
        match event {
            PipelineEvent::SourceSelected { source } => Self::SourceSelected {
                path: source.path().to_path_buf(),
            },
            PipelineEvent::ConversionStarted {
                generation,
                parameters,
            } => Self::ConversionStarted {
                generation: *generation,
                parameters: *parameters,
            },
            PipelineEvent::ConversionApplied { generation, result } => match result {
                ConversionResult::Success {
                    artifact_path,
                    artifact_size_bytes,
                    source_size_bytes,
                } => Self::ConversionApplied {
                    generation: *generation,
                    artifact_path: artifact_path.clone(),
                    artifact_size: *artifact_size_bytes,
                    source_size: *source_size_bytes,
                    ratio_percent: result.size_ratio_percent().unwrap_or_default(),
                },
                ConversionResult::Failure { reason } => {
                    let error = PreviewError::from(reason.clone());
                    Self::ConversionFailed {
                        generation: *generation,
                        message: error.user_message(),
                        severity: severity_label(error.severity()),
                        details: reason.to_string(),
                    }
                }
            },
            PipelineEvent::ConversionSuperseded { generation } => Self::ConversionSuperseded {
                generation: *generation,
            },
            PipelineEvent::ConversionUnchanged { parameters } => Self::ConversionUnchanged {
                parameters: *parameters,
            },
            PipelineEvent::Discarded { purge } => Self::Discarded { purge: purge.clone() },
            PipelineEvent::CommitSucceeded { outcome } => Self::CommitSucceeded {
                original: outcome.original.clone(),
                bytes_written: outcome.bytes_written,
                purge: outcome.purge.clone(),
            },
            PipelineEvent::CommitFailed { message } => Self::CommitFailed {
                message: message.clone(),
            },
            PipelineEvent::Purged { report } => Self::Purged {
                report: report.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversionFailure;
    use serde_json::Value;

    fn to_value(message: &JsonMessage) -> Value {
        serde_json::to_value(message).unwrap()
    }

    #[test]
    fn test_applied_event() {
        let event = PipelineEvent::ConversionApplied {
            generation: Generation(3),
            result: ConversionResult::Success {
                artifact_path: PathBuf::from("/tmp/pngquant-preview/banner_preview.png"),
                artifact_size_bytes: 51_200,
                source_size_bytes: 204_800,
            },
        };

        let value = to_value(&JsonMessage::from(&event));

        assert_eq!(value["type"], "conversion_applied");
        assert_eq!(value["generation"], 3);
        assert_eq!(value["artifact_size"], 51_200);
        assert_eq!(value["ratio_percent"], 25.0);
    }

    #[test]
    fn test_failed_event() {
        let event = PipelineEvent::ConversionApplied {
            generation: Generation(4),
            result: ConversionResult::failure(ConversionFailure::ExitFailure {
                code: Some(99),
                stderr: "quality too low".to_string(),
            }),
        };

        let value = to_value(&JsonMessage::from(&event));

        assert_eq!(value["type"], "conversion_failed");
        assert_eq!(value["message"], "Conversion failed");
        assert_eq!(value["severity"], "notice");
        assert!(value["details"].as_str().unwrap().contains("quality too low"));
    }

    #[test]
    fn test_failure_messages_follow_severity() {
        let launch = PipelineEvent::ConversionApplied {
            generation: Generation(5),
            result: ConversionResult::failure(ConversionFailure::LaunchFailed {
                program: PathBuf::from("/opt/tools/pngquant"),
                message: "No such file or directory".to_string(),
            }),
        };
        let value = to_value(&JsonMessage::from(&launch));
        assert_eq!(value["message"], "Conversion failed");
        assert!(value["details"].as_str().unwrap().contains("/opt/tools/pngquant"));

        let unavailable = PipelineEvent::ConversionApplied {
            generation: Generation(6),
            result: ConversionResult::failure(ConversionFailure::ArtifactUnavailable(
                "metadata: permission denied".to_string(),
            )),
        };
        let value = to_value(&JsonMessage::from(&unavailable));
        assert_eq!(value["message"], "Size unavailable, retry");
        assert_eq!(value["severity"], "inline");
    }

    #[test]
    fn test_parameters_serialize_as_plain_numbers() {
        let event = PipelineEvent::ConversionStarted {
            generation: Generation(1),
            parameters: ConversionParameters::default(),
        };

        let value = to_value(&JsonMessage::from(&event));

        assert_eq!(value["type"], "conversion_started");
        assert_eq!(value["parameters"]["quality"], 50.0);
        assert_eq!(value["parameters"]["color_count"], 128.0);
        assert_eq!(value["parameters"]["dither_strength"], 0.5);
    }

    #[test]
    fn test_idle_status() {
        let value = to_value(&JsonMessage::status(&PreviewView::default()));

        assert_eq!(value["type"], "status");
        assert_eq!(value["state"], "idle");
        assert!(value["source"].is_null());
        assert_eq!(value["halted"], false);
    }

    #[test]
    fn test_error_message() {
        let value = to_value(&JsonMessage::error("Only PNG files can be opened", None));
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "Only PNG files can be opened");
    }
}
