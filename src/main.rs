//! # pngquant-preview - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing` (su stderr)
//! - Caricamento della configurazione e applicazione degli override CLI
//! - Avvio della pipeline e lettura dei comandi da stdin
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (file, parametri, pngquant, scratch, config)
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose, `RUST_LOG` vince)
//! 3. Carica il file di configurazione e applica gli override
//! 4. Risolve pngquant e apre la scratch directory
//! 5. Avvia la pipeline, apre il file iniziale e processa i comandi fino a `quit`
//!
//! ## Esempio di utilizzo:
//! ```bash
//! pngquant-preview shots/banner.png --quality 60 --colors 64 --verbose
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use pngquant_preview::{
    CommandError, CommitOutcome, Config, ConsoleCommand, ConversionParameters, ConversionPipeline,
    ConversionResult, ConversionSpinner, ExternalCompressor, FileManager, JsonMessage, PipelineEvent,
    PreviewError, PreviewView, SessionStats, Severity, TempArtifactStore, ToolPathResolver, HELP,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pngquant-preview")]
#[command(version, about = "Live pngquant previews with a debounced conversion pipeline")]
struct Args {
    /// PNG file to open at startup
    source: Option<PathBuf>,

    /// Minimum quality (10-90); the maximum is quality + 5
    #[arg(short, long)]
    quality: Option<f64>,

    /// Number of colors (48-256)
    #[arg(short, long)]
    colors: Option<f64>,

    /// Floyd-Steinberg dithering strength (0.0-1.0)
    #[arg(short, long)]
    floyd: Option<f64>,

    /// Speed/quality trade-off (1-11)
    #[arg(short, long)]
    speed: Option<f64>,

    /// Path to the pngquant executable
    #[arg(long)]
    pngquant: Option<PathBuf>,

    /// Directory for preview files
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Quiet period before converting, in milliseconds
    #[arg(long)]
    quiescence_ms: Option<u64>,

    /// Configuration file (default: <config dir>/pngquant-preview/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output events as JSON lines for programmatic use
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pngquant_preview={}", default_level)));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&args).await?;
    let json = config.json_output;

    let store = Arc::new(config.artifact_store().with_context(|| {
        format!("Cannot use scratch directory {}", config.scratch_dir().display())
    })?);
    let resolver = ToolPathResolver::new(config.pngquant_path.clone());
    let tool = resolver.resolve_pngquant();
    info!("Using pngquant: {} ({})", tool.path.display(), tool.origin);

    let compressor = Arc::new(ExternalCompressor::new(tool.path, Arc::clone(&store)));
    let pipeline = ConversionPipeline::spawn(compressor, Arc::clone(&store), config.pipeline_settings());
    let reporter = tokio::spawn(report_events(pipeline.subscribe(), pipeline.view(), json));

    let mut session = Session {
        pipeline,
        store,
        resolver,
        parameters: config.defaults,
        json,
    };

    if let Some(source) = args.source {
        session.handle(ConsoleCommand::Open(source)).await;
    }
    if !json {
        println!("Type 'help' for the list of commands.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match ConsoleCommand::parse(&line) {
            Ok(None) => {}
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(command)) => session.handle(command).await,
            Err(e) => session.report_command_error(&e),
        }
    }

    // i preview non salvati vengono rimossi all'uscita
    let Session { pipeline, .. } = session;
    if let Err(e) = pipeline.discard() {
        debug!("Discard on exit failed: {}", e);
    }
    pipeline.shutdown().await;

    let stats = reporter.await?;
    if !json {
        info!("{}", stats.format_summary());
    }

    Ok(())
}

async fn load_config(args: &Args) -> Result<Config> {
    let path = args.config.clone().or_else(Config::default_path);
    let mut config = match path {
        Some(ref path) => Config::from_file(path)
            .await
            .with_context(|| format!("Invalid configuration file {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(ref pngquant) = args.pngquant {
        config.pngquant_path = Some(pngquant.clone());
    }
    if let Some(ref scratch_dir) = args.scratch_dir {
        config.scratch_dir = Some(scratch_dir.clone());
    }
    if let Some(quiescence_ms) = args.quiescence_ms {
        config.quiescence_ms = quiescence_ms;
    }
    if let Some(quality) = args.quality {
        config.defaults = config.defaults.with_quality(quality);
    }
    if let Some(colors) = args.colors {
        config.defaults = config.defaults.with_color_count(colors);
    }
    if let Some(floyd) = args.floyd {
        config.defaults = config.defaults.with_dither_strength(floyd);
    }
    if let Some(speed) = args.speed {
        config.defaults = config.defaults.with_speed(speed);
    }
    config.json_output |= args.json;

    config.validate()?;
    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

/// State of the interactive front end
struct Session {
    pipeline: ConversionPipeline,
    store: Arc<TempArtifactStore>,
    resolver: ToolPathResolver,
    /// Slider values; the source of truth for parameter edits.
    parameters: ConversionParameters,
    json: bool,
}

impl Session {
    async fn handle(&mut self, command: ConsoleCommand) {
        if let Some(parameters) = command.apply_to(self.parameters) {
            self.parameters = parameters;
            if let Err(e) = self.pipeline.update_parameters(parameters) {
                self.report_error(&e);
            } else if !self.json {
                println!("Parameters: {}", parameters);
            }
            return;
        }

        let result = match command {
            ConsoleCommand::Open(path) => self.pipeline.select_source(path).map(|_| ()),
            ConsoleCommand::Status => {
                self.print_status();
                Ok(())
            }
            ConsoleCommand::Reset => self.pipeline.discard(),
            ConsoleCommand::Save => self.pipeline.commit().await.map(|outcome: CommitOutcome| {
                debug!("Commit removed {} scratch file(s)", outcome.purge.removed.len());
            }),
            ConsoleCommand::Purge => self.pipeline.purge_scratch().await.map(|_| ()),
            ConsoleCommand::Ack => self.pipeline.acknowledge_commit_failure(),
            ConsoleCommand::Scratch => {
                println!("{}", self.store.root().display());
                Ok(())
            }
            ConsoleCommand::Tools => {
                println!("{}", self.resolver.tools_report());
                Ok(())
            }
            ConsoleCommand::Help => {
                println!("{}", HELP);
                Ok(())
            }
            _ => Ok(()),
        };

        if let Err(e) = result {
            self.report_error(&e);
        }
    }

    fn print_status(&self) {
        let view = self.pipeline.snapshot();
        if self.json {
            JsonMessage::status(&view).emit();
            return;
        }

        match view.source {
            Some(ref source) => println!("File:       {}", source),
            None => println!("File:       (none)"),
        }
        println!("State:      {}", view.state.label());
        println!("Parameters: {}", view.parameters);
        match view.preview {
            Some(ref preview) => println!("Preview:    {} [{}]", preview.size_text(), preview.artifact_path.display()),
            None => println!("Preview:    (none)"),
        }
        if let Some(ref failure) = view.last_failure {
            println!("Last error: {}", failure);
        }
        if view.halted {
            println!("Previews are paused after a failed save. Type 'ack' to resume.");
        }
    }

    fn report_error(&self, error: &PreviewError) {
        if self.json {
            JsonMessage::error(error.user_message(), Some(error.to_string())).emit();
            return;
        }

        match error.severity() {
            Severity::Blocking => {
                eprintln!("ERROR: {}", error);
                eprintln!("Previews are paused. Type 'ack' to resume.");
            }
            Severity::Notice | Severity::Inline => eprintln!("{}", error.user_message()),
        }
        debug!("{:?}", error);
    }

    fn report_command_error(&self, error: &CommandError) {
        if self.json {
            JsonMessage::error(error.to_string(), None).emit();
        } else {
            eprintln!("{}", error);
        }
    }
}

/// Prints pipeline events until the pipeline shuts down.
///
/// The spinner follows the published view rather than the events, so it
/// also covers the quiet period before a conversion starts.
async fn report_events(
    mut events: broadcast::Receiver<PipelineEvent>,
    mut view: watch::Receiver<PreviewView>,
    json: bool,
) -> SessionStats {
    let mut stats = SessionStats::new();
    let mut spinner = ConversionSpinner::new();
    let mut view_open = !json;

    loop {
        let received = tokio::select! {
            received = events.recv() => received,
            changed = view.changed(), if view_open => {
                match changed {
                    Ok(()) => spinner.follow(&view.borrow_and_update()),
                    Err(_) => {
                        view_open = false;
                        spinner.stop();
                    }
                }
                continue;
            }
        };

        let event = match received {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {} pipeline event(s)", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        stats.record(&event);
        if json {
            JsonMessage::from(&event).emit();
        } else {
            describe(&event);
        }
    }

    spinner.stop();
    stats
}

fn describe(event: &PipelineEvent) {
    match event {
        PipelineEvent::SourceSelected { source } => {
            println!("Opened {}", source);
        }
        PipelineEvent::ConversionStarted { generation, parameters } => {
            debug!("Generation {} started with {}", generation, parameters);
        }
        PipelineEvent::ConversionApplied { generation, result } => match result {
            ConversionResult::Success { artifact_path, .. } => {
                println!("Preview {}: {} [{}]", generation, result.summary(), artifact_path.display());
            }
            ConversionResult::Failure { .. } => {
                println!("{} (previous preview kept)", result.summary());
            }
        },
        PipelineEvent::ConversionSuperseded { generation } => {
            debug!("Result of generation {} superseded", generation);
        }
        PipelineEvent::ConversionUnchanged { .. } => {
            println!("Preview already matches these parameters");
        }
        PipelineEvent::Discarded { purge } => {
            println!("Closed file, removed {} preview file(s)", purge.removed.len());
        }
        PipelineEvent::CommitSucceeded { outcome } => {
            println!(
                "Saved {} ({} KB)",
                outcome.original.display(),
                FileManager::format_kb(outcome.bytes_written)
            );
        }
        PipelineEvent::CommitFailed { message } => {
            println!("Save failed: {}", message);
        }
        PipelineEvent::Purged { report } => {
            println!(
                "Removed {} scratch file(s), skipped {}",
                report.removed.len(),
                report.skipped.len()
            );
        }
    }
}
