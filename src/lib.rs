//! # pngquant Preview Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `params`: Parametri di conversione sempre validi (clamp e arrotondamento)
//! - `model`: Sorgente, generation, richieste e risultati di conversione
//! - `compressor`: Invocazione sincrona di pngquant come processo esterno
//! - `artifact_store`: Scratch directory, naming dei preview e purge
//! - `pipeline`: Coordinatore con debounce, ordinamento per generation e commit
//! - `config`: Gestione configurazione e validazione parametri
//! - `tool_resolver`: Ricerca dell'eseguibile pngquant
//! - `error`: Tipi di errore custom con severità per l'utente
//! - `file_manager`: Operazioni sui file (dimensioni, formato, sostituzione atomica)
//! - `console`, `json_output`, `progress`: Front end a riga di comando
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use pngquant_preview::{Config, ConversionPipeline, ExternalCompressor};
//!
//! let config = Config::default();
//! let store = Arc::new(config.artifact_store()?);
//! let compressor = Arc::new(ExternalCompressor::new("pngquant", store.clone()));
//! let pipeline = ConversionPipeline::spawn(compressor, store, config.pipeline_settings());
//! pipeline.select_source("banner.png")?;
//! ```

pub mod artifact_store;
pub mod compressor;
pub mod config;
pub mod console;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod model;
pub mod params;
pub mod pipeline;
pub mod progress;
pub mod tool_resolver;
pub mod utils;

pub use artifact_store::{PurgeReport, PurgeScope, PurgeWarning, TempArtifactStore};
pub use compressor::{Compressor, ExternalCompressor};
pub use config::Config;
pub use console::{CommandError, ConsoleCommand, HELP};
pub use error::{ConversionFailure, PreviewError, Severity};
pub use file_manager::FileManager;
pub use json_output::JsonMessage;
pub use model::{ConversionRequest, ConversionResult, Generation, SourceImage};
pub use params::ConversionParameters;
pub use pipeline::{
    CommitController, CommitOutcome, ConversionPipeline, PipelineEvent, PipelineSettings, PipelineState,
    Preview, PreviewView,
};
pub use progress::{ConversionSpinner, SessionStats};
pub use tool_resolver::{ResolvedTool, ToolOrigin, ToolPathResolver};
