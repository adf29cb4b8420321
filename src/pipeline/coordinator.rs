//! # Conversion Coordinator
//!
//! Un solo task tokio possiede tutto lo stato della pipeline e lo modifica
//! in risposta a tre sorgenti di eventi:
//! - comandi dell'utente (selezione, parametri, discard, commit, purge)
//! - scatti del debouncer
//! - completamenti dei worker di conversione
//!
//! ## Regole:
//! - Al massimo una conversione in volo; gli eventi arrivati nel frattempo
//!   restano in `pending` e riavviano la quiescenza al completamento
//! - Ogni richiesta riceve una generation strettamente crescente; un
//!   risultato si applica solo se è più recente dell'ultimo applicato e
//!   non precede un discard
//! - Un fallimento non cancella il preview precedente
//! - Un commit fallito ferma le conversioni automatiche finché l'utente
//!   non lo conferma con `acknowledge`
//!
//! Lo stato visibile viene pubblicato su un canale `watch` dopo ogni
//! transizione; gli eventi puntuali su un canale `broadcast`.

use crate::artifact_store::{PurgeReport, TempArtifactStore};
use crate::compressor::Compressor;
use crate::error::{ConversionFailure, PreviewError};
use crate::model::{ConversionRequest, ConversionResult, Generation, SourceImage};
use crate::params::ConversionParameters;
use crate::pipeline::commit::{CommitController, CommitOutcome};
use crate::pipeline::debounce::{DebounceToken, Debouncer};
use crate::pipeline::view::{PipelineEvent, PipelineState, Preview, PreviewView};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Quiet period before a conversion starts.
pub const DEFAULT_QUIESCENCE: Duration = Duration::from_millis(1000);

const EVENT_CAPACITY: usize = 64;

/// Startup values for a pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub quiescence: Duration,
    pub initial_parameters: ConversionParameters,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            quiescence: DEFAULT_QUIESCENCE,
            initial_parameters: ConversionParameters::default(),
        }
    }
}

enum Command {
    SelectSource(SourceImage),
    UpdateParameters(ConversionParameters),
    Discard,
    Commit(oneshot::Sender<Result<CommitOutcome, PreviewError>>),
    Purge(oneshot::Sender<PurgeReport>),
    Acknowledge,
}

struct Completed {
    request: ConversionRequest,
    result: ConversionResult,
}

/// Handle to a running pipeline.
///
/// # Example
/// ```rust,ignore
/// let pipeline = ConversionPipeline::spawn(compressor, store, PipelineSettings::default());
/// pipeline.select_source("shots/banner.png")?;
/// pipeline.update_parameters(ConversionParameters::default().with_quality(70.0))?;
/// ```
pub struct ConversionPipeline {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<PreviewView>,
    events: broadcast::Sender<PipelineEvent>,
    task: JoinHandle<()>,
}

impl ConversionPipeline {
    /// Starts the coordinator task. Must be called inside a tokio runtime.
    pub fn spawn<C: Compressor>(
        compressor: Arc<C>,
        store: Arc<TempArtifactStore>,
        settings: PipelineSettings,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (debouncer, fires_rx) = Debouncer::new(settings.quiescence);
        let (view_tx, view_rx) = watch::channel(PreviewView {
            parameters: settings.initial_parameters,
            ..PreviewView::default()
        });
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let coordinator = Coordinator {
            compressor,
            commit: CommitController::new(Arc::clone(&store)),
            store,
            debouncer,
            completions: completions_tx,
            view: view_tx,
            events: events_tx.clone(),
            source: None,
            parameters: settings.initial_parameters,
            pending: None,
            in_flight: None,
            outstanding: 0,
            generation: Generation::ZERO,
            floor: Generation::ZERO,
            applied: Generation::ZERO,
            settled: None,
            preview: None,
            last_failure: None,
            halted: false,
        };
        let task = tokio::spawn(coordinator.run(commands_rx, fires_rx, completions_rx));

        Self {
            commands: commands_tx,
            view: view_rx,
            events: events_tx,
            task,
        }
    }

    /// Validates `path` and starts a new session on it.
    ///
    /// The previous session, if any, is discarded first. An unsupported file
    /// is rejected here and leaves the pipeline untouched.
    pub fn select_source(&self, path: impl AsRef<Path>) -> Result<SourceImage, PreviewError> {
        let source = SourceImage::open(path)?;
        self.send(Command::SelectSource(source.clone()))?;
        Ok(source)
    }

    /// Records new parameters; converts after the quiet period if a source is selected.
    pub fn update_parameters(&self, parameters: ConversionParameters) -> Result<(), PreviewError> {
        self.send(Command::UpdateParameters(parameters))
    }

    /// Drops the session and its artifacts. Results still running are ignored.
    pub fn discard(&self) -> Result<(), PreviewError> {
        self.send(Command::Discard)
    }

    /// Clears the halt left by a failed commit.
    pub fn acknowledge_commit_failure(&self) -> Result<(), PreviewError> {
        self.send(Command::Acknowledge)
    }

    /// Replaces the original with the current preview.
    ///
    /// # Errors
    /// - `NoSource` when nothing is selected
    /// - `PreviewNotReady` while a conversion is pending or running, or when
    ///   the latest conversion failed
    /// - `Commit` when the replacement fails; conversions stay halted until
    ///   [`acknowledge_commit_failure`](Self::acknowledge_commit_failure)
    pub async fn commit(&self) -> Result<CommitOutcome, PreviewError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Commit(reply))?;
        response.await.map_err(|_| PreviewError::PipelineClosed)?
    }

    /// Deletes the scratch artifacts within the configured scope.
    pub async fn purge_scratch(&self) -> Result<PurgeReport, PreviewError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Purge(reply))?;
        response.await.map_err(|_| PreviewError::PipelineClosed)
    }

    pub fn view(&self) -> watch::Receiver<PreviewView> {
        self.view.clone()
    }

    /// Latest published state.
    pub fn snapshot(&self) -> PreviewView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Stops the coordinator once queued commands are handled.
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            warn!("Conversion pipeline task ended abnormally: {}", e);
        }
    }

    fn send(&self, command: Command) -> Result<(), PreviewError> {
        self.commands.send(command).map_err(|_| PreviewError::PipelineClosed)
    }
}

struct Coordinator {
    compressor: Arc<dyn Compressor>,
    store: Arc<TempArtifactStore>,
    commit: CommitController,
    debouncer: Debouncer,
    completions: mpsc::UnboundedSender<Completed>,
    view: watch::Sender<PreviewView>,
    events: broadcast::Sender<PipelineEvent>,

    source: Option<SourceImage>,
    /// Latest parameters requested by the user.
    parameters: ConversionParameters,
    pending: Option<ConversionParameters>,
    in_flight: Option<(Generation, ConversionParameters)>,
    /// Workers whose result has not come back yet, including ignored ones.
    outstanding: usize,
    /// Last generation issued.
    generation: Generation,
    /// Results at or below this generation belong to a discarded session.
    floor: Generation,
    applied: Generation,
    settled: Option<(Generation, ConversionResult)>,
    preview: Option<Preview>,
    last_failure: Option<ConversionFailure>,
    halted: bool,
}

impl Coordinator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut fires: mpsc::UnboundedReceiver<DebounceToken>,
        mut completions: mpsc::UnboundedReceiver<Completed>,
    ) {
        debug!("Conversion pipeline started (quiescence {:?})", self.debouncer.delay());

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(token) = fires.recv() => self.on_quiescence(token),
                Some(completed) = completions.recv() => self.on_completed(completed),
            }
            self.publish();
        }

        // i worker ancora attivi possono scrivere un artifact dopo il discard
        while self.outstanding > 0 {
            match completions.recv().await {
                Some(completed) => self.on_completed(completed),
                None => break,
            }
        }

        self.debouncer.cancel();
        debug!("Conversion pipeline stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SelectSource(source) => self.select_source(source),
            Command::UpdateParameters(parameters) => self.update_parameters(parameters),
            Command::Discard => self.discard(),
            Command::Commit(reply) => {
                let result = self.commit().await;
                let _ = reply.send(result);
            }
            Command::Purge(reply) => {
                let report = self.purge().await;
                let _ = reply.send(report);
            }
            Command::Acknowledge => self.acknowledge(),
        }
    }

    fn select_source(&mut self, source: SourceImage) {
        if self.source.is_some() {
            self.discard();
        }

        info!("Selected {}", source);
        self.source = Some(source.clone());
        self.emit(PipelineEvent::SourceSelected { source });
        self.schedule(self.parameters);
    }

    fn update_parameters(&mut self, parameters: ConversionParameters) {
        self.parameters = parameters;

        if self.source.is_none() {
            debug!("No source selected, stored {}", parameters);
            return;
        }
        self.schedule(parameters);
    }

    fn schedule(&mut self, parameters: ConversionParameters) {
        self.pending = Some(parameters);

        if self.halted {
            debug!("Conversions halted after a failed save, waiting for acknowledgement");
            return;
        }
        self.debouncer.arm();
    }

    fn on_quiescence(&mut self, token: DebounceToken) {
        if !self.debouncer.accept(token) || self.halted {
            return;
        }

        if let Some((generation, _)) = self.in_flight {
            debug!("Generation {} still running, conversion deferred", generation);
            return;
        }

        let Some(parameters) = self.pending.take() else {
            return;
        };

        if self.is_current_preview(&parameters) {
            debug!("Parameters unchanged, keeping the current preview");
            self.emit(PipelineEvent::ConversionUnchanged { parameters });
            return;
        }

        self.dispatch(parameters);
    }

    fn is_current_preview(&self, parameters: &ConversionParameters) -> bool {
        self.preview.as_ref().is_some_and(|preview| {
            preview.generation == self.applied
                && preview.parameters == *parameters
                && preview.artifact_path.is_file()
        })
    }

    fn dispatch(&mut self, parameters: ConversionParameters) {
        let Some(source) = self.source.clone() else {
            return;
        };

        self.generation = self.generation.next();
        let request = ConversionRequest::new(source, parameters, self.generation);
        self.in_flight = Some((request.generation, parameters));
        self.outstanding += 1;

        info!(
            "Converting {} with {} (generation {})",
            request.source, parameters, request.generation
        );
        self.emit(PipelineEvent::ConversionStarted {
            generation: request.generation,
            parameters,
        });

        let compressor = Arc::clone(&self.compressor);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let job = request.clone();
            let result = match tokio::task::spawn_blocking(move || compressor.compress(&job)).await {
                Ok(result) => result,
                Err(e) => ConversionResult::failure(ConversionFailure::ArtifactUnavailable(format!(
                    "conversion worker failed: {}",
                    e
                ))),
            };
            let _ = completions.send(Completed { request, result });
        });
    }

    fn on_completed(&mut self, completed: Completed) {
        let Completed { request, result } = completed;
        let generation = request.generation;
        self.outstanding = self.outstanding.saturating_sub(1);

        if self.in_flight.is_some_and(|(running, _)| running == generation) {
            self.in_flight = None;
        }

        if generation <= self.floor || generation <= self.applied {
            debug!("Dropping result of generation {}", generation);
            if result.is_success() && !self.shares_artifact(&request.source) {
                let removed = self.store.remove_artifacts_for(&request.source);
                debug!(
                    "Removed {} orphaned file(s) of generation {}",
                    removed.removed.len(),
                    generation
                );
            }
            self.emit(PipelineEvent::ConversionSuperseded { generation });
        } else {
            self.apply(request, result);
        }

        if self.pending.is_some() && self.in_flight.is_none() && !self.halted {
            self.debouncer.arm();
        }
    }

    /// True when the current session still needs the artifact `source` maps to.
    fn shares_artifact(&self, source: &SourceImage) -> bool {
        let Some(current) = self.source.as_ref() else {
            return false;
        };
        self.store.artifact_path(current) == self.store.artifact_path(source)
            && (self.in_flight.is_some() || self.preview.is_some())
    }

    fn apply(&mut self, request: ConversionRequest, result: ConversionResult) {
        let generation = request.generation;
        self.applied = generation;

        match &result {
            ConversionResult::Success {
                artifact_path,
                artifact_size_bytes,
                source_size_bytes,
            } => {
                info!("Generation {}: {}", generation, result.summary());
                self.preview = Some(Preview {
                    generation,
                    parameters: request.parameters,
                    artifact_path: artifact_path.clone(),
                    artifact_size_bytes: *artifact_size_bytes,
                    source_size_bytes: *source_size_bytes,
                });
                self.last_failure = None;
            }
            ConversionResult::Failure { reason } => {
                warn!("Generation {} failed: {}", generation, reason);
                self.last_failure = Some(reason.clone());
            }
        }

        self.settled = Some((generation, result.clone()));
        self.emit(PipelineEvent::ConversionApplied { generation, result });
    }

    fn discard(&mut self) {
        self.debouncer.cancel();
        self.pending = None;
        if let Some((generation, _)) = self.in_flight.take() {
            debug!("Result of generation {} will be ignored", generation);
        }
        self.floor = self.generation;
        self.settled = None;
        self.preview = None;
        self.last_failure = None;

        let purge = match self.source.take() {
            Some(source) => {
                info!("Discarded {}", source);
                self.store.remove_artifacts_for(&source)
            }
            None => PurgeReport::default(),
        };
        self.emit(PipelineEvent::Discarded { purge });
    }

    async fn commit(&mut self) -> Result<CommitOutcome, PreviewError> {
        let source = self.source.clone().ok_or(PreviewError::NoSource)?;

        if self.pending.is_some() || self.in_flight.is_some() {
            return Err(PreviewError::PreviewNotReady(
                "a conversion is still pending".to_string(),
            ));
        }

        let preview = self
            .preview
            .clone()
            .filter(|preview| preview.generation == self.applied)
            .ok_or_else(|| {
                PreviewError::PreviewNotReady("the latest conversion produced no preview".to_string())
            })?;

        let controller = self.commit.clone();
        let original = source.clone();
        let artifact = preview.artifact_path;
        let outcome = tokio::task::spawn_blocking(move || controller.commit(&original, &artifact))
            .await
            .unwrap_or_else(|e| {
                Err(PreviewError::Commit {
                    path: source.path().to_path_buf(),
                    source: io::Error::new(io::ErrorKind::Other, e.to_string()),
                })
            });

        match outcome {
            Ok(outcome) => {
                self.debouncer.cancel();
                self.floor = self.generation;
                self.source = None;
                self.settled = None;
                self.preview = None;
                self.last_failure = None;
                self.emit(PipelineEvent::CommitSucceeded {
                    outcome: outcome.clone(),
                });
                Ok(outcome)
            }
            Err(e) => {
                error!("Save failed: {}", e);
                self.halted = true;
                self.emit(PipelineEvent::CommitFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn purge(&mut self) -> PurgeReport {
        let store = Arc::clone(&self.store);
        let report = tokio::task::spawn_blocking(move || store.purge_all())
            .await
            .unwrap_or_else(|e| {
                warn!("Purge worker failed: {}", e);
                PurgeReport::default()
            });

        if self
            .preview
            .as_ref()
            .is_some_and(|preview| !preview.artifact_path.exists())
        {
            self.preview = None;
        }

        info!("Purged {} scratch file(s)", report.removed.len());
        self.emit(PipelineEvent::Purged {
            report: report.clone(),
        });
        report
    }

    fn acknowledge(&mut self) {
        if !self.halted {
            return;
        }

        info!("Save failure acknowledged, conversions resumed");
        self.halted = false;
        if self.pending.is_some() && self.in_flight.is_none() {
            self.debouncer.arm();
        }
    }

    fn snapshot(&self) -> PreviewView {
        let state = if let Some((generation, parameters)) = self.in_flight {
            PipelineState::Running {
                generation,
                parameters,
            }
        } else if let Some(parameters) = self.pending {
            PipelineState::Pending { parameters }
        } else if let Some((generation, result)) = &self.settled {
            PipelineState::Settled {
                generation: *generation,
                result: result.clone(),
            }
        } else {
            PipelineState::Idle
        };

        PreviewView {
            state,
            source: self.source.clone(),
            parameters: self.parameters,
            queued: self.in_flight.and(self.pending),
            preview: self.preview.clone(),
            last_failure: self.last_failure.clone(),
            halted: self.halted,
        }
    }

    fn publish(&self) {
        let view = self.snapshot();
        self.view.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }

    fn emit(&self, event: PipelineEvent) {
        // nessun subscriber non è un errore
        let _ = self.events.send(event);
    }
}
