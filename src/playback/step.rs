//! Authored steps and sequences.
//!
//! Steps are static input data. Parsing is deliberately lenient: a step with
//! an unknown kind, a missing field, or a negative delay still loads, with
//! field-level defaults, so one bad entry never takes the whole script down.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::SequenceError;

use super::record::{MessageKind, Role};

/// Kind given to entries that are not JSON objects.
const INVALID_KIND: &str = "invalid";

/// One authored unit of the script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub role: Role,
    pub kind: MessageKind,
    pub content: Value,
    /// Every authored field besides role/kind/content/delay (`context`, `actions`, ...).
    pub metadata: Map<String, Value>,
    pub delay_before_ms: u64,
}

impl Step {
    pub fn new(role: Role, kind: MessageKind, content: Value) -> Self {
        Self {
            role,
            kind,
            content,
            metadata: Map::new(),
            delay_before_ms: 0,
        }
    }

    pub fn text(content: &str) -> Self {
        Self::new(Role::Assistant, MessageKind::Text, Value::String(content.to_string()))
    }

    pub fn with_delay(mut self, delay_before_ms: u64) -> Self {
        self.delay_before_ms = delay_before_ms;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Build a step from one authored JSON entry. Never fails.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut fields) = value else {
            return Self::new(Role::Assistant, MessageKind::from(INVALID_KIND), value);
        };

        let role = fields
            .remove("role")
            .as_ref()
            .and_then(Value::as_str)
            .map(Role::parse)
            .unwrap_or_default();

        let kind = take_first(&mut fields, &["type", "kind"])
            .as_ref()
            .and_then(Value::as_str)
            .map(MessageKind::from)
            .unwrap_or_else(|| MessageKind::from(INVALID_KIND));

        let content = fields.remove("content").unwrap_or(Value::Null);

        let delay_before_ms = take_first(&mut fields, &["delay", "delay_before_ms", "delayBeforeMs"])
            .as_ref()
            .map(delay_ms)
            .unwrap_or(0);

        Self {
            role,
            kind,
            content,
            metadata: fields,
            delay_before_ms,
        }
    }

    /// The content rendered as streamable text.
    pub fn text_content(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Remove and return the first present key among `keys`.
fn take_first(fields: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    let mut found = None;
    for key in keys {
        if let Some(value) = fields.remove(*key) {
            found.get_or_insert(value);
        }
    }
    found
}

/// Clamp any JSON number to a non-negative millisecond count.
fn delay_ms(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| *f > 0.0).map_or(0, |f| f as u64),
        _ => 0,
    }
}

/// The full ordered script. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    steps: Arc<[Step]>,
}

impl Sequence {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
        }
    }

    /// Parse a JSON array of authored steps.
    pub fn from_json(json: &str) -> Result<Self, SequenceError> {
        match serde_json::from_str::<Value>(json)? {
            Value::Array(entries) => Ok(Self::new(entries.into_iter().map(Step::from_value).collect())),
            other => Err(SequenceError::NotAnArray {
                found: json_type_name(&other).to_string(),
            }),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, SequenceError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl From<Vec<Step>> for Sequence {
    fn from(steps: Vec<Step>) -> Self {
        Self::new(steps)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
