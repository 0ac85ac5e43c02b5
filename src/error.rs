//! Error handling for the binding framework
//!
//! This module defines the crate error type, a Result alias, and the
//! classification used by the lifecycle orchestrator to decide which error
//! hook handles a failure.
//!
//! # Taxonomy
//!
//! Every [`FrameworkError`] falls into one of four [`ErrorKind`]s:
//!
//! - **Load**: malformed binding declarations, missing views, LJMMM expansion
//!   mismatches. Halts the module unless the module asks to continue.
//! - **Write**: a device write or write callback failed.
//! - **Refresh**: a batched read failed or a value could not be formatted.
//!   Continues with the next tick unless the module asks to stop.
//! - **Execution**: a module hook panicked. Always caught and reported.

use thiserror::Error;

/// Main error type for binding framework operations
#[derive(Error, Debug)]
pub enum FrameworkError {
    /// A binding declaration or view could not be loaded
    #[error("Load error: {0}")]
    Load(String),

    /// A UI-originated write could not be completed
    #[error("Write error on {register}: {message}")]
    Write { register: String, message: String },

    /// A refresh tick failed
    #[error("Refresh error: {0}")]
    Refresh(String),

    /// A module hook panicked
    #[error("Execution error in {hook}: {message}")]
    Execution { hook: &'static str, message: String },

    /// A register range pattern could not be expanded
    #[error("Expansion error for '{pattern}': {message}")]
    Expansion { pattern: String, message: String },

    /// The device rejected an operation
    #[error("Device error at {address}: {message}")]
    Device { address: String, message: String },

    /// The view layer failed to render or update
    #[error("View error: {0}")]
    View(String),

    /// Errors related to Rhai format scripts
    #[error("Script error: {0}")]
    Script(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// A lifecycle operation was requested from the wrong state
    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Errors related to channel communication with the module worker
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FrameworkError>,
    },
}

/// Classification of errors by the stage that handles them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Load,
    Write,
    Refresh,
    Execution,
}

/// Severity attached to user-visible alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(label)
    }
}

impl FrameworkError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FrameworkError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a script error from a Rhai error
    pub fn from_rhai_error(err: Box<rhai::EvalAltResult>) -> Self {
        FrameworkError::Script(err.to_string())
    }

    /// Shorthand for a device error
    pub fn device(address: impl Into<String>, message: impl Into<String>) -> Self {
        FrameworkError::Device {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Which error hook is responsible for this error.
    ///
    /// Device and script errors have no stage of their own; callers rewrap
    /// them (see [`FrameworkError::into_refresh`]) when the stage matters.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrameworkError::Write { .. } => ErrorKind::Write,
            FrameworkError::Refresh(_) | FrameworkError::Device { .. } | FrameworkError::Script(_) => {
                ErrorKind::Refresh
            }
            FrameworkError::Execution { .. } => ErrorKind::Execution,
            FrameworkError::WithContext { source, .. } => source.kind(),
            _ => ErrorKind::Load,
        }
    }

    /// Severity used when surfacing this error to the user
    pub fn severity(&self) -> Severity {
        match self.kind() {
            ErrorKind::Execution => Severity::Critical,
            ErrorKind::Load => Severity::Error,
            ErrorKind::Write => Severity::Error,
            ErrorKind::Refresh => Severity::Warning,
        }
    }

    /// Rewrap an arbitrary error as a refresh error, keeping the message
    pub fn into_refresh(self) -> Self {
        match self {
            err @ FrameworkError::Refresh(_) => err,
            other => FrameworkError::Refresh(other.to_string()),
        }
    }

    /// Rewrap an arbitrary error as a write error for `register`
    pub fn into_write(self, register: &str) -> Self {
        match self {
            err @ FrameworkError::Write { .. } => err,
            other => FrameworkError::Write {
                register: register.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Result type alias for binding framework operations
pub type Result<T> = std::result::Result<T, FrameworkError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, Box<rhai::EvalAltResult>> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| FrameworkError::from_rhai_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| FrameworkError::from_rhai_error(e).with_context(f()))
    }
}
