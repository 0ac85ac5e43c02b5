//! Configuration for the binding framework
//!
//! [`FrameworkConfig`] holds the runtime defaults every module shares and is
//! stored as TOML. Declarative module descriptions live in [`manifest`].

pub mod manifest;

pub use manifest::{ManifestBinding, ManifestModule, ManifestSetup, ModuleManifest};

use crate::error::{FrameworkError, Result};
use crate::format::validate_printf;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default interval between refresh ticks
pub const DEFAULT_REFRESH_RATE_MS: u64 = 1000;

/// Element that receives a module's rendered view
pub const DEVICE_VIEW_TARGET: &str = "#device-view";

/// Runtime defaults shared by every module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    /// Milliseconds between refresh ticks unless a module overrides it
    pub refresh_rate_ms: u64,
    /// printf format for bindings that declare none
    pub default_format: String,
    /// Selector the rendered template is written into
    pub device_view_target: String,
    /// Show an alert for every reported error, not only hook panics
    pub alert_on_error: bool,
    /// Capacity of the module worker's command queue
    pub command_queue_depth: usize,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            refresh_rate_ms: DEFAULT_REFRESH_RATE_MS,
            default_format: crate::types::DEFAULT_FORMAT.to_string(),
            device_view_target: DEVICE_VIEW_TARGET.to_string(),
            alert_on_error: true,
            command_queue_depth: 256,
        }
    }
}

impl FrameworkConfig {
    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FrameworkError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| FrameworkError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save config to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FrameworkError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| FrameworkError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            FrameworkError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Reject values the framework cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.refresh_rate_ms == 0 {
            return Err(FrameworkError::Config(
                "refresh_rate_ms must be greater than zero".to_string(),
            ));
        }
        if self.command_queue_depth == 0 {
            return Err(FrameworkError::Config(
                "command_queue_depth must be greater than zero".to_string(),
            ));
        }
        validate_printf(&self.default_format).map_err(|e| {
            FrameworkError::Config(format!("Invalid default_format: {}", e))
        })?;
        Ok(())
    }

    pub fn refresh_rate(&self) -> Duration {
        Duration::from_millis(self.refresh_rate_ms)
    }
}
