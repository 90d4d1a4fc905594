//! Configuration types.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A half-open delay window `[min_ms, max_ms)` in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }
}

/// Playback engine configuration.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// How long a thinking indicator stays in the log.
    pub thinking: DelayRange,
    /// Base pause after each streamed token.
    pub token: DelayRange,
    /// Extra pause after a token ending a clause (`. ! ? :`).
    pub clause_pause: DelayRange,
    /// Delay between the last step and the completion flag write.
    pub settle_ms: u64,
    /// Session scope for persisted keys.
    pub session_id: String,
    /// Store key holding the completion flag.
    pub completion_key: String,
    /// Store key holding the persisted chat history.
    pub history_key: String,
    /// Record kind guaranteed to close a completed playback (e.g. `bento_grid`).
    pub closing_kind: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            thinking: DelayRange::new(1200, 1800),
            token: DelayRange::new(15, 35),
            clause_pause: DelayRange::new(60, 110),
            settle_ms: 1500,
            session_id: "default".to_string(),
            completion_key: "onboarding_completed".to_string(),
            history_key: "chat_history".to_string(),
            closing_kind: None,
        }
    }
}

impl PlaybackConfig {
    /// Build a config from defaults plus `PLAYBACK_*` environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("PLAYBACK_SETTLE_MS") {
            config.settle_ms = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "PLAYBACK_SETTLE_MS".to_string(),
                message: format!("{e}"),
            })?;
        }
        if let Some(session) = lookup("PLAYBACK_SESSION_ID").filter(|s| !s.is_empty()) {
            config.session_id = session;
        }
        if let Some(key) = lookup("PLAYBACK_COMPLETION_KEY").filter(|s| !s.is_empty()) {
            config.completion_key = key;
        }
        if let Some(kind) = lookup("PLAYBACK_CLOSING_KIND") {
            config.closing_kind = (!kind.is_empty()).then_some(kind);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_playback_timings() {
        let config = PlaybackConfig::default();
        assert_eq!(config.thinking, DelayRange::new(1200, 1800));
        assert_eq!(config.token, DelayRange::new(15, 35));
        assert_eq!(config.clause_pause, DelayRange::new(60, 110));
        assert_eq!(config.settle_ms, 1500);
        assert_eq!(config.completion_key, "onboarding_completed");
        assert!(config.closing_kind.is_none());
    }

    #[test]
    fn env_overrides_apply() {
        let config = PlaybackConfig::from_lookup(lookup_from(&[
            ("PLAYBACK_SETTLE_MS", "250"),
            ("PLAYBACK_SESSION_ID", "tab-7"),
            ("PLAYBACK_CLOSING_KIND", "bento_grid"),
        ]))
        .unwrap();
        assert_eq!(config.settle_ms, 250);
        assert_eq!(config.session_id, "tab-7");
        assert_eq!(config.closing_kind.as_deref(), Some("bento_grid"));
        assert_eq!(config.completion_key, "onboarding_completed");
    }

    #[test]
    fn invalid_settle_is_rejected() {
        let err = PlaybackConfig::from_lookup(lookup_from(&[("PLAYBACK_SETTLE_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("PLAYBACK_SETTLE_MS"));
    }

    #[test]
    fn empty_closing_kind_disables_it() {
        let config =
            PlaybackConfig::from_lookup(lookup_from(&[("PLAYBACK_CLOSING_KIND", "")])).unwrap();
        assert!(config.closing_kind.is_none());
    }
}
