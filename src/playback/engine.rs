//! PlaybackEngine: Starts, stops and resets runs of one sequence.
//!
//! Each run is a spawned task bound to a fresh generation. Starting a run
//! advances the generation first, so the outgoing run wakes from whatever it
//! is waiting on, observes cancellation, and exits without touching the log.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PlaybackConfig;
use crate::store::SessionStore;

use super::clock;
use super::completion::CompletionFlag;
use super::generation::{Cancelled, Generation, RunToken};
use super::interpreter::StepInterpreter;
use super::log::MessageLog;
use super::pacing::{Pacing, RandomPacing};
use super::record::{MessageKind, MessageRecord, Role};
use super::state::{PlaybackPhase, RunOutcome, RunStatus};
use super::step::Sequence;

/// Handle to a spawned run.
#[derive(Debug)]
pub struct RunHandle {
    generation: u64,
    handle: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the run to finish.
    pub async fn join(self) -> RunOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(generation = self.generation, error = %e, "Playback task ended abnormally");
                RunOutcome::Cancelled
            }
        }
    }
}

/// Replays one sequence into a caller-owned message log.
pub struct PlaybackEngine {
    sequence: Sequence,
    log: Arc<MessageLog>,
    config: Arc<PlaybackConfig>,
    pacing: Arc<dyn Pacing>,
    flag: Arc<CompletionFlag>,
    generation: Generation,
    status: Arc<watch::Sender<RunStatus>>,
    /// Serializes start/reset so a clear can never land inside a newer run.
    lifecycle: Mutex<()>,
}

impl PlaybackEngine {
    /// Create an engine, reading the completion flag from `store` once.
    pub async fn new(
        sequence: Sequence,
        log: Arc<MessageLog>,
        store: Arc<dyn SessionStore>,
        config: PlaybackConfig,
    ) -> Self {
        let flag = CompletionFlag::load(store, &config.completion_key).await;
        let (status, _rx) = watch::channel(RunStatus::default());
        Self {
            sequence,
            log,
            config: Arc::new(config),
            pacing: Arc::new(RandomPacing),
            flag: Arc::new(flag),
            generation: Generation::new(),
            status: Arc::new(status),
            lifecycle: Mutex::new(()),
        }
    }

    /// Replace the random pacing source.
    pub fn with_pacing(mut self, pacing: Arc<dyn Pacing>) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn log(&self) -> &Arc<MessageLog> {
        &self.log
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    /// Whether a run has completed (this session, or a previous one).
    pub fn is_completed(&self) -> bool {
        self.flag.is_set()
    }

    /// Subscribe to status changes of the latest run.
    pub fn status(&self) -> watch::Receiver<RunStatus> {
        self.status.subscribe()
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.current()
    }

    /// Whether the latest run is still live.
    pub fn is_running(&self) -> bool {
        self.generation.is_active() && !self.status.borrow().phase.is_terminal()
    }

    /// Start a new run, superseding any run in flight.
    pub async fn start(&self) -> RunHandle {
        let _guard = self.lifecycle.lock().await;
        let token = self.generation.advance();
        self.spawn_run(token)
    }

    /// Start a run unless playback already completed or the log has content.
    ///
    /// When skipping a completed playback, the closing record is restored.
    pub async fn start_if_needed(&self) -> Option<RunHandle> {
        if self.flag.is_set() {
            info!("Playback already completed; skipping");
            if let Some(kind) = &self.config.closing_kind {
                let kind = MessageKind::from(kind.as_str());
                if !self.log.contains_kind(&kind).await {
                    self.log
                        .push(MessageRecord::new(Role::Assistant, kind, Value::Object(Map::new())))
                        .await;
                }
            }
            return None;
        }
        if !self.log.is_empty().await {
            debug!("Message log already has content; not starting playback");
            return None;
        }
        Some(self.start().await)
    }

    /// Cancel the current run without waiting for it.
    ///
    /// The run stops at its next resume check; a mutation already in progress
    /// may still land.
    pub fn stop(&self) {
        info!(generation = self.generation.current(), "Stopping playback");
        self.generation.stop();
    }

    /// Restart from scratch: cancel, clear the log and the completion flag,
    /// and start a fresh run of the same sequence.
    pub async fn reset(&self) -> RunHandle {
        let _guard = self.lifecycle.lock().await;
        let token = self.generation.advance();
        self.log.clear().await;
        self.flag.clear().await;
        info!(generation = token.id(), "Playback reset");
        self.spawn_run(token)
    }

    fn spawn_run(&self, token: RunToken) -> RunHandle {
        let generation = token.id();
        let interpreter = StepInterpreter::new(
            Arc::clone(&self.log),
            token,
            Arc::clone(&self.config),
            Arc::clone(&self.pacing),
            Arc::clone(&self.status),
        );
        interpreter.publish(PlaybackPhase::Idle, None);

        let sequence = self.sequence.clone();
        let flag = Arc::clone(&self.flag);
        let handle = tokio::spawn(run(interpreter, sequence, flag));
        RunHandle { generation, handle }
    }
}

async fn run(interpreter: StepInterpreter, sequence: Sequence, flag: Arc<CompletionFlag>) -> RunOutcome {
    let generation = interpreter.token().id();
    info!(generation, steps = sequence.len(), "Playback run started");

    match play(&interpreter, &sequence, &flag).await {
        Ok(()) => {
            interpreter.publish(PlaybackPhase::Completed, None);
            info!(generation, "Playback run completed");
            RunOutcome::Completed
        }
        Err(Cancelled) => {
            interpreter.publish(PlaybackPhase::Cancelled, None);
            info!(generation, "Playback run cancelled");
            RunOutcome::Cancelled
        }
    }
}

async fn play(
    interpreter: &StepInterpreter,
    sequence: &Sequence,
    flag: &CompletionFlag,
) -> Result<(), Cancelled> {
    for (index, step) in sequence.steps().iter().enumerate() {
        interpreter.execute(index, step).await?;
    }

    if !sequence.is_empty() {
        clock::sleep(interpreter.token(), interpreter.config().settle_ms).await?;
    }
    if let Some(kind) = &interpreter.config().closing_kind {
        interpreter.ensure_closing_record(kind).await?;
    }

    // Last cancellable step: once the flag is written the run has completed.
    flag.mark_complete(interpreter.token()).await
}
