//! View layer abstraction
//!
//! The framework renders a module's template once per device selection and
//! then only updates element contents, attaches listeners and reads input
//! values. Anything that can do those things can host a module.
//!
//! Attaching a listener does not take a callback. The host is expected to
//! report fired events back as `ModuleCommand::UiEvent`, which keeps every
//! device write on the module's own worker thread.

use crate::error::{FrameworkError, Result, Severity};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Operations the framework needs from a UI
pub trait View: Send {
    /// Render the template at `location` with a JSON context
    fn render_template(&mut self, location: &str, context: &serde_json::Value) -> Result<String>;

    /// Replace the contents of `target` with rendered markup
    fn set_html(&mut self, target: &str, html: &str) -> Result<()>;

    /// Start reporting `event` on `selector`
    fn attach_event(&mut self, selector: &str, event: &str) -> Result<()>;

    /// Stop reporting `event` on `selector`
    fn detach_event(&mut self, selector: &str, event: &str) -> Result<()>;

    /// Set the displayed content of an element
    fn set_element_content(&mut self, selector: &str, content: &str) -> Result<()>;

    /// Current value of an input element
    fn get_element_value(&self, selector: &str) -> Result<String>;

    /// Show a user-visible alert
    fn show_alert(&mut self, severity: Severity, message: &str);
}

/// Everything a [`RecordingView`] has seen
#[derive(Debug, Default, Clone)]
pub struct ViewState {
    /// Template sources by location
    pub templates: HashMap<String, String>,
    /// Each render call: location and context
    pub renders: Vec<(String, serde_json::Value)>,
    /// Markup written per target
    pub html: HashMap<String, String>,
    /// Currently attached `(selector, event)` listeners
    pub listeners: BTreeSet<(String, String)>,
    /// Every detach call, in order
    pub detached: Vec<(String, String)>,
    /// Current element contents
    pub contents: HashMap<String, String>,
    /// Every content update, in order
    pub content_updates: Vec<(String, String)>,
    /// Input values that `get_element_value` returns
    pub inputs: HashMap<String, String>,
    pub alerts: Vec<(Severity, String)>,
}

/// In-memory view that records every call
///
/// Clones share state, so a test can keep one handle while the framework
/// owns another.
#[derive(Debug, Default, Clone)]
pub struct RecordingView {
    state: Arc<Mutex<ViewState>>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template source. `{{path.to.field}}` placeholders are
    /// replaced from the render context.
    pub fn with_template(self, location: impl Into<String>, source: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.templates.insert(location.into(), source.into());
        }
        self
    }

    fn state(&self) -> Result<MutexGuard<'_, ViewState>> {
        self.state
            .lock()
            .map_err(|e| FrameworkError::View(format!("view state poisoned: {}", e)))
    }

    /// Snapshot of everything recorded so far
    pub fn snapshot(&self) -> ViewState {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Simulate the user typing into an input
    pub fn set_input(&self, selector: &str, value: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.inputs.insert(selector.to_string(), value.to_string());
        }
    }

    pub fn content(&self, selector: &str) -> Option<String> {
        self.state.lock().ok()?.contents.get(selector).cloned()
    }

    pub fn is_listening(&self, selector: &str, event: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.listeners.contains(&(selector.to_string(), event.to_string())))
            .unwrap_or(false)
    }

    pub fn alerts(&self) -> Vec<(Severity, String)> {
        self.state.lock().map(|s| s.alerts.clone()).unwrap_or_default()
    }
}

impl View for RecordingView {
    fn render_template(&mut self, location: &str, context: &serde_json::Value) -> Result<String> {
        let mut state = self.state()?;
        let source = state
            .templates
            .get(location)
            .cloned()
            .ok_or_else(|| FrameworkError::View(format!("template not found: {}", location)))?;
        state.renders.push((location.to_string(), context.clone()));
        Ok(substitute(&source, context))
    }

    fn set_html(&mut self, target: &str, html: &str) -> Result<()> {
        self.state()?.html.insert(target.to_string(), html.to_string());
        Ok(())
    }

    fn attach_event(&mut self, selector: &str, event: &str) -> Result<()> {
        self.state()?
            .listeners
            .insert((selector.to_string(), event.to_string()));
        Ok(())
    }

    fn detach_event(&mut self, selector: &str, event: &str) -> Result<()> {
        let mut state = self.state()?;
        let key = (selector.to_string(), event.to_string());
        state.listeners.remove(&key);
        state.detached.push(key);
        Ok(())
    }

    fn set_element_content(&mut self, selector: &str, content: &str) -> Result<()> {
        let mut state = self.state()?;
        state
            .contents
            .insert(selector.to_string(), content.to_string());
        state
            .content_updates
            .push((selector.to_string(), content.to_string()));
        Ok(())
    }

    fn get_element_value(&self, selector: &str) -> Result<String> {
        self.state()?
            .inputs
            .get(selector)
            .cloned()
            .ok_or_else(|| FrameworkError::View(format!("no input value for {}", selector)))
    }

    fn show_alert(&mut self, severity: Severity, message: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.alerts.push((severity, message.to_string()));
        }
    }
}

/// Replace `{{a.b.c}}` placeholders with values looked up in `context`
fn substitute(source: &str, context: &serde_json::Value) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let path = after[..close].trim();
        let found = path
            .split('.')
            .try_fold(context, |node, key| node.get(key));
        match found {
            Some(serde_json::Value::String(s)) => out.push_str(s),
            Some(serde_json::Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    out
}
