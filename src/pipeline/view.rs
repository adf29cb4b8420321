//! # Pipeline View Module
//!
//! Stato visibile della pipeline, ricalcolato dal coordinatore dopo ogni
//! evento e pubblicato come snapshot immutabile (nessuno stato globale).

use crate::artifact_store::PurgeReport;
use crate::error::ConversionFailure;
use crate::file_manager::FileManager;
use crate::model::{ConversionResult, Generation, SourceImage};
use crate::params::ConversionParameters;
use crate::pipeline::commit::CommitOutcome;
use std::path::PathBuf;

/// Phase of the conversion state machine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Pending {
        parameters: ConversionParameters,
    },
    Running {
        generation: Generation,
        parameters: ConversionParameters,
    },
    Settled {
        generation: Generation,
        result: ConversionResult,
    },
}

impl PipelineState {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Pending { .. } => "pending",
            PipelineState::Running { .. } => "running",
            PipelineState::Settled { .. } => "settled",
        }
    }
}

/// The successful preview currently on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub generation: Generation,
    pub parameters: ConversionParameters,
    pub artifact_path: PathBuf,
    pub artifact_size_bytes: u64,
    pub source_size_bytes: u64,
}

impl Preview {
    pub fn size_ratio_percent(&self) -> f64 {
        FileManager::size_ratio_percent(self.source_size_bytes, self.artifact_size_bytes)
    }

    /// "KB (ratio%)" feedback, as shown under the preview
    pub fn size_text(&self) -> String {
        format!(
            "{} KB ({:.1}%)",
            FileManager::format_kb(self.artifact_size_bytes),
            self.size_ratio_percent()
        )
    }
}

/// Snapshot published after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PreviewView {
    pub state: PipelineState,
    pub source: Option<SourceImage>,
    pub parameters: ConversionParameters,
    /// Parameters waiting for the running conversion to finish.
    pub queued: Option<ConversionParameters>,
    pub preview: Option<Preview>,
    pub last_failure: Option<ConversionFailure>,
    /// Set after a failed commit until the user acknowledges it.
    pub halted: bool,
}

impl PreviewView {
    pub fn is_converting(&self) -> bool {
        matches!(
            self.state,
            PipelineState::Pending { .. } | PipelineState::Running { .. }
        ) || self.queued.is_some()
    }
}

/// Notifications emitted by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    SourceSelected {
        source: SourceImage,
    },
    ConversionStarted {
        generation: Generation,
        parameters: ConversionParameters,
    },
    ConversionApplied {
        generation: Generation,
        result: ConversionResult,
    },
    /// A result arrived after a newer generation or a discard; it was dropped.
    ConversionSuperseded {
        generation: Generation,
    },
    /// Settled parameters equal the current preview; nothing was run.
    ConversionUnchanged {
        parameters: ConversionParameters,
    },
    Discarded {
        purge: PurgeReport,
    },
    CommitSucceeded {
        outcome: CommitOutcome,
    },
    CommitFailed {
        message: String,
    },
    Purged {
        report: PurgeReport,
    },
}
