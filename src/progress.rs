//! # Progress and Statistics Module
//!
//! Questo modulo gestisce il feedback visivo e le statistiche di sessione.
//!
//! ## Responsabilità:
//! - Spinner `indicatif` che segue lo snapshot `PreviewView`: gira mentre una
//!   conversione è in attesa della quiescenza o in corso
//! - Tracking statistiche della sessione (conversioni, fallimenti, salvataggi)
//! - Report finale con i byte risparmiati
//!
//! ## Visual feedback:
//! ```text
//! ⠋ Converting banner.png (quality=50-55 colors=128 floyd=0.5 speed=7)
//! ```

use crate::file_manager::FileManager;
use crate::model::ConversionResult;
use crate::pipeline::{PipelineEvent, PipelineState, PreviewView};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner shown while a preview is being produced
#[derive(Default)]
pub struct ConversionSpinner {
    bar: Option<ProgressBar>,
}

impl ConversionSpinner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the spinner, or updates its message if already running
    pub fn start(&mut self, message: &str) {
        match self.bar {
            Some(ref bar) => bar.set_message(message.to_string()),
            None => self.bar = Some(Self::spinner(message)),
        }
    }

    /// Clears the spinner from the terminal
    pub fn stop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    /// Spins while `view` reports a pending or running conversion.
    ///
    /// A halted pipeline queues edits without converting, so it stops the spinner.
    pub fn follow(&mut self, view: &PreviewView) {
        if view.halted || !view.is_converting() {
            self.stop();
            return;
        }

        let name = view
            .source
            .as_ref()
            .and_then(|source| source.path().file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let message = match view.state {
            PipelineState::Running { parameters, .. } => format!("Converting {} ({})", name, parameters),
            _ => format!("Waiting to convert {} ({})", name, view.parameters),
        };
        self.start(&message);
    }

    fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}

impl Drop for ConversionSpinner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Statistics for one interactive session
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SessionStats {
    pub conversions: usize,
    pub failures: usize,
    pub superseded: usize,
    pub commits: usize,
    pub commit_failures: usize,
    pub total_original_size: u64,
    pub total_bytes_saved: u64,
    /// Source size reported by the latest successful preview.
    last_source_size: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::ConversionApplied { result, .. } => match result {
                ConversionResult::Success {
                    source_size_bytes, ..
                } => {
                    self.conversions += 1;
                    self.last_source_size = *source_size_bytes;
                }
                ConversionResult::Failure { .. } => self.failures += 1,
            },
            PipelineEvent::ConversionSuperseded { .. } => self.superseded += 1,
            PipelineEvent::CommitSucceeded { outcome } => {
                self.add_commit(self.last_source_size, outcome.bytes_written)
            }
            PipelineEvent::CommitFailed { .. } => self.commit_failures += 1,
            _ => {}
        }
    }

    /// Records a successful save of `new_size` bytes over `original_size`
    pub fn add_commit(&mut self, original_size: u64, new_size: u64) {
        self.commits += 1;
        self.total_original_size += original_size;
        self.total_bytes_saved += original_size.saturating_sub(new_size);
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(
            self.total_original_size,
            self.total_original_size - self.total_bytes_saved,
        )
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Conversions: {} | Failed: {} | Superseded: {} | Saved files: {} | Save errors: {} | Total saved: {} ({:.2}%)",
            self.conversions,
            self.failures,
            self.superseded,
            self.commits,
            self.commit_failures,
            FileManager::format_size(self.total_bytes_saved),
            self.overall_reduction_percent()
        )
    }
}
