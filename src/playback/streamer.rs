//! Word-by-word text reveal.
//!
//! Content is split on single spaces and re-joined one token at a time, so a
//! finished stream reproduces the authored text exactly. Each token is
//! followed by a short randomized pause, longer after clause punctuation.

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::PlaybackConfig;

use super::clock;
use super::generation::{Cancelled, RunToken};
use super::log::MessageLog;
use super::pacing::Pacing;
use super::record::MessageRecord;

/// Characters that end a clause and earn an extra pause.
const CLAUSE_ENDINGS: [char; 4] = ['.', '!', '?', ':'];

/// Split content into stream tokens.
pub fn tokenize(content: &str) -> Vec<&str> {
    content.split(' ').collect()
}

/// Whether a token ends on clause punctuation.
pub fn ends_clause(token: &str) -> bool {
    token.chars().last().is_some_and(|c| CLAUSE_ENDINGS.contains(&c))
}

/// Pause to take after emitting `token`.
pub fn token_delay(token: &str, config: &PlaybackConfig, pacing: &dyn Pacing) -> u64 {
    let base = pacing.next_in(config.token);
    if ends_clause(token) {
        base + pacing.next_in(config.clause_pause)
    } else {
        base
    }
}

/// Stream `content` into `record`, which must be the current tail of `log`.
///
/// On cancellation the record keeps its last emitted prefix. If the tail is
/// no longer `record`, streaming stops without touching the log.
pub async fn stream_text(
    log: &MessageLog,
    token: &RunToken,
    mut record: MessageRecord,
    content: &str,
    config: &PlaybackConfig,
    pacing: &dyn Pacing,
) -> Result<(), Cancelled> {
    let writer = log.writer(token);
    let tokens = tokenize(content);
    let mut revealed = String::with_capacity(content.len());

    for (i, word) in tokens.iter().enumerate() {
        if i > 0 {
            revealed.push(' ');
        }
        revealed.push_str(word);

        record.content = Value::String(revealed.clone());
        let id = record.id;
        if !writer.replace_last_if(|tail| tail.id == id, record.clone()).await? {
            warn!(generation = token.id(), record = %id, "Streamed record is no longer the tail; stopping");
            return Ok(());
        }

        clock::sleep(token, token_delay(word, config, pacing)).await?;
    }

    debug!(generation = token.id(), tokens = tokens.len(), "Text stream finished");
    Ok(())
}
