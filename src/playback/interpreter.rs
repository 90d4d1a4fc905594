//! Step interpreter: Turns one authored step into log mutations.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::config::PlaybackConfig;

use super::clock;
use super::generation::{Cancelled, RunToken};
use super::log::MessageLog;
use super::pacing::Pacing;
use super::record::{MessageKind, MessageRecord, Role};
use super::state::{PlaybackPhase, RunStatus};
use super::step::Step;
use super::streamer;

/// Skeleton content fields that describe how the placeholder is drawn.
const SKELETON_DISPLAY_FIELDS: [&str; 2] = ["variant", "loadDuration"];

/// Everything one run needs, bound to that run's token.
pub struct StepInterpreter {
    log: Arc<MessageLog>,
    token: RunToken,
    config: Arc<PlaybackConfig>,
    pacing: Arc<dyn Pacing>,
    status: Arc<watch::Sender<RunStatus>>,
}

impl StepInterpreter {
    pub fn new(
        log: Arc<MessageLog>,
        token: RunToken,
        config: Arc<PlaybackConfig>,
        pacing: Arc<dyn Pacing>,
        status: Arc<watch::Sender<RunStatus>>,
    ) -> Self {
        Self {
            log,
            token,
            config,
            pacing,
            status,
        }
    }

    pub fn token(&self) -> &RunToken {
        &self.token
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Publish the run's phase. A run never overwrites the status of a newer generation.
    pub fn publish(&self, phase: PlaybackPhase, step_index: Option<usize>) {
        let generation = self.token.id();
        self.status.send_if_modified(|status| {
            if generation < status.generation {
                return false;
            }
            if generation == status.generation
                && status.phase != phase
                && !status.phase.can_transition_to(phase)
            {
                warn!(generation, from = %status.phase, to = %phase, "Unexpected phase transition");
            }
            *status = RunStatus {
                generation,
                phase,
                step_index,
            };
            true
        });
    }

    /// Run one step: optional delay, then the kind's effect.
    pub async fn execute(&self, index: usize, step: &Step) -> Result<(), Cancelled> {
        if step.delay_before_ms > 0 {
            self.publish(PlaybackPhase::Delaying, Some(index));
            clock::sleep(&self.token, step.delay_before_ms).await?;
        }

        self.publish(PlaybackPhase::Executing, Some(index));
        trace!(generation = self.token.id(), step = index, kind = %step.kind, "Executing step");

        match &step.kind {
            MessageKind::Text => {
                self.publish(PlaybackPhase::Streaming, Some(index));
                self.show_text(step).await?;
            }
            MessageKind::Thinking => {
                self.publish(PlaybackPhase::Atomic, Some(index));
                self.show_thinking(step).await?;
            }
            MessageKind::Table | MessageKind::Chart => {
                self.publish(PlaybackPhase::Atomic, Some(index));
                self.reveal(step).await?;
            }
            MessageKind::Skeleton => {
                self.publish(PlaybackPhase::Atomic, Some(index));
                self.show_skeleton(step).await?;
            }
            MessageKind::FeaturePreview | MessageKind::Other(_) => {
                self.publish(PlaybackPhase::Atomic, Some(index));
                self.pass_through(step).await?;
            }
        }

        self.publish(PlaybackPhase::Idle, Some(index));
        Ok(())
    }

    /// Transient typing indicator: shown for a randomized window, then removed
    /// if it is still the tail.
    async fn show_thinking(&self, step: &Step) -> Result<(), Cancelled> {
        let writer = self.log.writer(&self.token);
        writer
            .append(MessageRecord::new(step.role, MessageKind::Thinking, Value::Null))
            .await?;

        clock::sleep(&self.token, self.pacing.next_in(self.config.thinking)).await?;

        let removed = writer
            .remove_last_if(|tail| tail.kind == MessageKind::Thinking)
            .await?;
        if removed.is_none() {
            debug!(generation = self.token.id(), "Thinking indicator already replaced");
        }
        Ok(())
    }

    /// Empty text record carrying the step metadata, then streamed in.
    async fn show_text(&self, step: &Step) -> Result<(), Cancelled> {
        let record = MessageRecord::new(step.role, MessageKind::Text, Value::String(String::new()))
            .with_metadata(step.metadata.clone());
        self.log.writer(&self.token).append(record.clone()).await?;

        streamer::stream_text(
            &self.log,
            &self.token,
            record,
            &step.text_content(),
            &self.config,
            self.pacing.as_ref(),
        )
        .await
    }

    /// Replace a trailing skeleton with the populated record, or append if
    /// there is no skeleton to consume.
    async fn reveal(&self, step: &Step) -> Result<(), Cancelled> {
        let writer = self.log.writer(&self.token);
        let populated = MessageRecord::new(step.role, step.kind.clone(), step.content.clone())
            .with_metadata(step.metadata.clone());

        let replaced = writer
            .replace_last_if(|tail| tail.kind == MessageKind::Skeleton, populated.clone().revealed())
            .await?;
        if !replaced {
            debug!(generation = self.token.id(), kind = %step.kind, "No skeleton to reveal; appending");
            writer.append(populated).await?;
        }
        Ok(())
    }

    /// Placeholder carrying only its display hints.
    async fn show_skeleton(&self, step: &Step) -> Result<(), Cancelled> {
        let mut display = Map::new();
        if let Value::Object(fields) = &step.content {
            for key in SKELETON_DISPLAY_FIELDS {
                if let Some(value) = fields.get(key) {
                    display.insert(key.to_string(), value.clone());
                }
            }
        }
        let record =
            MessageRecord::new(step.role, MessageKind::Skeleton, Value::Null).with_metadata(display);
        self.log.writer(&self.token).append(record).await
    }

    /// Opaque payloads are appended verbatim.
    async fn pass_through(&self, step: &Step) -> Result<(), Cancelled> {
        let record = MessageRecord::new(step.role, step.kind.clone(), step.content.clone())
            .with_metadata(step.metadata.clone());
        self.log.writer(&self.token).append(record).await
    }

    /// Append an empty closing record of `kind` unless one is already in the log.
    pub async fn ensure_closing_record(&self, kind: &str) -> Result<bool, Cancelled> {
        let kind = MessageKind::from(kind);
        if self.log.contains_kind(&kind).await {
            return Ok(false);
        }
        self.log
            .writer(&self.token)
            .append(MessageRecord::new(Role::Assistant, kind, Value::Object(Map::new())))
            .await?;
        Ok(true)
    }
}
