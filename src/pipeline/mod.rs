//! # Pipeline Module
//!
//! Pipeline di preview con debounce, separata in sottomoduli:
//! - `coordinator`: Task che possiede lo stato e ordina i risultati per generation
//! - `debounce`: Timer di quiescenza riarmabile
//! - `commit`: Sostituzione dell'originale e pulizia della scratch directory
//! - `view`: Snapshot dello stato visibile ed eventi

pub mod commit;
pub mod coordinator;
pub mod debounce;
pub mod view;

pub use commit::{CommitController, CommitOutcome};
pub use coordinator::{ConversionPipeline, PipelineSettings, DEFAULT_QUIESCENCE};
pub use debounce::{DebounceToken, Debouncer};
pub use view::{PipelineEvent, PipelineState, Preview, PreviewView};
