//! Shared type definitions for bindings, values and setup results

use crate::device::Device;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Format string applied when a binding declares none
pub const DEFAULT_FORMAT: &str = "%.4f";

/// Register name reserved for callback-only bindings; no default write is issued
pub const INVALID_REGISTER: &str = "-1";

/// A value read from or written to a device register
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    /// Interpret a raw UI input string. Numeric input becomes a number.
    pub fn from_ui(input: &str) -> Self {
        let trimmed = input.trim();
        match trimmed.parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::Text(input.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Number(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Whether a binding is polled by the refresh loop or written from the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Read,
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

/// Caller-supplied value formatter
pub type FormatFn = Arc<dyn Fn(&Value) -> Result<String> + Send + Sync>;

/// Custom write handler: receives the binding, the device and the UI value
/// and performs its own device I/O in place of the default write.
pub type WriteCallback = Arc<dyn Fn(&Binding, &mut dyn Device, &Value) -> Result<()> + Send + Sync>;

/// How a read value is rendered before being pushed to the view
#[derive(Clone)]
pub enum Format {
    /// printf-style format string, e.g. `%.4f`
    Printf(String),
    /// Arbitrary formatting function
    Custom(FormatFn),
    /// Rhai script evaluated with `value`/`raw` in scope
    Script(String),
}

impl Format {
    pub fn printf(spec: impl Into<String>) -> Self {
        Format::Printf(spec.into())
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<String> + Send + Sync + 'static,
    {
        Format::Custom(Arc::new(f))
    }

    pub fn script(source: impl Into<String>) -> Self {
        Format::Script(source.into())
    }
}

impl Default for Format {
    fn default() -> Self {
        Format::Printf(DEFAULT_FORMAT.to_string())
    }
}

impl fmt::Debug for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Printf(spec) => f.debug_tuple("Printf").field(spec).finish(),
            Format::Custom(_) => f.write_str("Custom(<fn>)"),
            Format::Script(src) => f.debug_tuple("Script").field(src).finish(),
        }
    }
}

/// A declared link between one device register and one UI element.
///
/// Any of `binding_class`, `register_name` and `template` may carry an
/// LJMMM range pattern; the registry expands them before storage.
#[derive(Clone)]
pub struct Binding {
    pub binding_class: String,
    /// UI element identifier, also the registry key
    pub template: String,
    pub register_name: String,
    pub direction: Direction,
    /// UI event that triggers a write; required for write bindings
    pub event: Option<String>,
    pub format: Format,
    pub write_callback: Option<WriteCallback>,
}

impl Binding {
    /// A read binding polled by the refresh loop
    pub fn read(
        binding_class: impl Into<String>,
        template: impl Into<String>,
        register_name: impl Into<String>,
    ) -> Self {
        Self {
            binding_class: binding_class.into(),
            template: template.into(),
            register_name: register_name.into(),
            direction: Direction::Read,
            event: None,
            format: Format::default(),
            write_callback: None,
        }
    }

    /// A write binding fired by a UI event
    pub fn write(
        binding_class: impl Into<String>,
        template: impl Into<String>,
        register_name: impl Into<String>,
        event: impl Into<String>,
    ) -> Self {
        Self {
            binding_class: binding_class.into(),
            template: template.into(),
            register_name: register_name.into(),
            direction: Direction::Write,
            event: Some(event.into()),
            format: Format::default(),
            write_callback: None,
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_write_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Binding, &mut dyn Device, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.write_callback = Some(Arc::new(callback));
        self
    }

    /// View selector for the bound element
    pub fn selector(&self) -> String {
        selector_for(&self.template)
    }

    /// True when the register name is the reserved invalid marker
    pub fn is_virtual(&self) -> bool {
        self.register_name == INVALID_REGISTER
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("binding_class", &self.binding_class)
            .field("template", &self.template)
            .field("register_name", &self.register_name)
            .field("direction", &self.direction)
            .field("event", &self.event)
            .field("format", &self.format)
            .field("write_callback", &self.write_callback.is_some())
            .finish()
    }
}

/// Build the view selector for a template identifier
pub fn selector_for(template: &str) -> String {
    if template.starts_with('#') {
        template.to_string()
    } else {
        format!("#{}", template)
    }
}

/// A one-shot register operation run once per device selection
#[derive(Debug, Clone, PartialEq)]
pub struct SetupBinding {
    pub binding_class: String,
    pub register_name: String,
    pub direction: Direction,
    /// Value written by write-direction setup bindings
    pub default_val: Option<Value>,
}

impl SetupBinding {
    pub fn read(binding_class: impl Into<String>, register_name: impl Into<String>) -> Self {
        Self {
            binding_class: binding_class.into(),
            register_name: register_name.into(),
            direction: Direction::Read,
            default_val: None,
        }
    }

    pub fn write(
        binding_class: impl Into<String>,
        register_name: impl Into<String>,
        default_val: impl Into<Value>,
    ) -> Self {
        Self {
            binding_class: binding_class.into(),
            register_name: register_name.into(),
            direction: Direction::Write,
            default_val: Some(default_val.into()),
        }
    }
}

/// Outcome of a single setup binding
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SetupStatus {
    Success { value: Value, formatted: String },
    Error { cause: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetupOutcome {
    pub address: String,
    #[serde(flatten)]
    pub status: SetupStatus,
}

impl SetupOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, SetupStatus::Success { .. })
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.status {
            SetupStatus::Success { value, .. } => Some(value),
            SetupStatus::Error { .. } => None,
        }
    }
}

/// Per-binding setup outcomes in execution order, keyed by binding class
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetupResults {
    entries: Vec<(String, SetupOutcome)>,
}

impl SetupResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, binding_class: impl Into<String>, outcome: SetupOutcome) {
        self.entries.push((binding_class.into(), outcome));
    }

    /// First outcome recorded for `binding_class`; a class broadcast over a
    /// register range keeps the outcome of its first register
    pub fn get(&self, binding_class: &str) -> Option<&SetupOutcome> {
        self.entries
            .iter()
            .find(|(class, _)| class == binding_class)
            .map(|(_, outcome)| outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SetupOutcome)> {
        self.entries.iter().map(|(c, o)| (c.as_str(), o))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|(_, o)| !o.is_success()).count()
    }

    /// JSON object keyed by binding class, used in the render context
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (class, outcome) in &self.entries {
            map.entry(class.clone()).or_insert_with(|| {
                serde_json::to_value(outcome).unwrap_or(serde_json::Value::Null)
            });
        }
        serde_json::Value::Object(map)
    }
}
