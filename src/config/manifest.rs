//! Declarative module manifests
//!
//! A manifest describes a module without code: its view, refresh rate,
//! bindings and setup bindings. [`ManifestModule`] turns a manifest into a
//! module that registers those declarations when it is loaded.
//!
//! ```toml
//! name = "analog-inputs"
//! view = "analog_inputs.html"
//! refresh_rate_ms = 500
//!
//! [[bindings]]
//! class = "AIN#(0:3)"
//! template = "ain#(0:3)-display"
//! register = "AIN#(0:3)"
//! format = "%.3f V"
//!
//! [[bindings]]
//! class = "DAC0"
//! template = "dac0-input"
//! register = "DAC0"
//! direction = "write"
//! event = "change"
//!
//! [[setup]]
//! class = "serial"
//! register = "SERIAL_NUMBER"
//! ```

use crate::error::{FrameworkError, Result};
use crate::format::validate_printf;
use crate::framework::ModuleContext;
use crate::hooks::ModuleHooks;
use crate::scripting::ScriptEngine;
use crate::types::{Binding, Direction, Format, SetupBinding, Value};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

fn default_direction() -> Direction {
    Direction::Read
}

/// A binding entry in a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestBinding {
    pub class: String,
    pub template: String,
    pub register: String,
    #[serde(default = "default_direction")]
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// printf format; mutually exclusive with `script`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Rhai format script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

/// A setup entry in a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSetup {
    pub class: String,
    pub register: String,
    #[serde(default = "default_direction")]
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A module described in TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub name: String,
    /// Template location rendered into the device view
    pub view: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_rate_ms: Option<u64>,
    #[serde(default)]
    pub bindings: Vec<ManifestBinding>,
    #[serde(default)]
    pub setup: Vec<ManifestSetup>,
}

impl ModuleManifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FrameworkError::Config(format!("Failed to read manifest {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(content)
            .map_err(|e| FrameworkError::Config(format!("Failed to parse manifest: {}", e)))?;
        if manifest.refresh_rate_ms == Some(0) {
            return Err(FrameworkError::Config(format!(
                "Manifest {}: refresh_rate_ms must be greater than zero",
                manifest.name
            )));
        }
        Ok(manifest)
    }

    pub fn refresh_rate(&self) -> Option<Duration> {
        self.refresh_rate_ms.map(Duration::from_millis)
    }

    /// Convert every entry into typed declarations, checking formats
    pub fn into_declarations(self) -> Result<(Vec<Binding>, Vec<SetupBinding>)> {
        let scripts = if self.bindings.iter().any(|b| b.script.is_some()) {
            Some(ScriptEngine::new())
        } else {
            None
        };

        let bindings = self
            .bindings
            .iter()
            .map(|entry| entry.to_binding(scripts.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let setup = self
            .setup
            .into_iter()
            .map(|entry| SetupBinding {
                binding_class: entry.class,
                register_name: entry.register,
                direction: entry.direction,
                default_val: entry.default,
            })
            .collect();

        Ok((bindings, setup))
    }
}

impl ManifestBinding {
    fn to_binding(&self, scripts: Option<&ScriptEngine>) -> Result<Binding> {
        let format = match (&self.format, &self.script) {
            (Some(_), Some(_)) => {
                return Err(FrameworkError::Load(format!(
                    "Binding '{}' declares both format and script",
                    self.template
                )))
            }
            (Some(spec), None) => {
                validate_printf(spec)?;
                Format::printf(spec.clone())
            }
            (None, Some(source)) => {
                if let Some(engine) = scripts {
                    engine.validate(source)?;
                }
                Format::script(source.clone())
            }
            (None, None) => Format::default(),
        };

        Ok(Binding {
            binding_class: self.class.clone(),
            template: self.template.clone(),
            register_name: self.register.clone(),
            direction: self.direction,
            event: self.event.clone(),
            format,
            write_callback: None,
        })
    }
}

/// A module whose hooks register a manifest's declarations
#[derive(Debug, Clone)]
pub struct ManifestModule {
    manifest: ModuleManifest,
}

impl ManifestModule {
    pub fn new(manifest: ModuleManifest) -> Self {
        Self { manifest }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        ModuleManifest::load(path).map(Self::new)
    }

    pub fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }
}

impl ModuleHooks for ManifestModule {
    fn on_module_loaded(&mut self, ctx: &mut ModuleContext) -> Result<()> {
        let (bindings, setup) = self.manifest.clone().into_declarations()?;

        ctx.set_view(self.manifest.view.clone());
        if let Some(rate) = self.manifest.refresh_rate() {
            ctx.set_refresh_rate(rate)?;
        }

        let registration = ctx.put_many(bindings)?;
        for entry in setup {
            ctx.put_setup(entry)?;
        }

        info!(
            "Manifest {} registered {} binding(s)",
            self.manifest.name,
            registration.stored.len()
        );
        debug!("Bindings: {:?}", registration.stored);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MANIFEST: &str = r#"
name = "analog-inputs"
view = "analog_inputs.html"
refresh_rate_ms = 500

[[bindings]]
class = "AIN#(0:1)"
template = "ain#(0:1)-display"
register = "AIN#(0:1)"
format = "%.3f V"

[[bindings]]
class = "DAC0"
template = "dac0-input"
register = "DAC0"
direction = "write"
event = "change"

[[bindings]]
class = "state"
template = "relay-state"
register = "RELAY0"
script = 'if value > 0.5 { "On" } else { "Off" }'

[[setup]]
class = "serial"
register = "SERIAL_NUMBER"

[[setup]]
class = "range"
register = "AIN_ALL_RANGE"
direction = "write"
default = 10
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = ModuleManifest::from_toml_str(MANIFEST).unwrap();
        assert_eq!(manifest.name, "analog-inputs");
        assert_eq!(manifest.refresh_rate(), Some(Duration::from_millis(500)));
        assert_eq!(manifest.bindings.len(), 3);
        assert_eq!(manifest.bindings[0].direction, Direction::Read);
        assert_eq!(manifest.setup[1].default, Some(Value::Number(10.0)));
    }

    #[test]
    fn test_declarations() {
        let manifest = ModuleManifest::from_toml_str(MANIFEST).unwrap();
        let (bindings, setup) = manifest.into_declarations().unwrap();

        assert!(matches!(&bindings[0].format, Format::Printf(s) if s == "%.3f V"));
        assert_eq!(bindings[1].event.as_deref(), Some("change"));
        assert!(matches!(bindings[2].format, Format::Script(_)));
        assert!(matches!(bindings[1].format, Format::Printf(ref s) if s == "%.4f"));
        assert_eq!(setup.len(), 2);
        assert_eq!(setup[1].direction, Direction::Write);
    }

    #[test]
    fn test_format_and_script_conflict() {
        let manifest = ModuleManifest::from_toml_str(
            r#"
name = "bad"
view = "bad.html"

[[bindings]]
class = "a"
template = "a"
register = "A"
format = "%d"
script = "value"
"#,
        )
        .unwrap();
        assert!(manifest.into_declarations().is_err());
    }

    #[test]
    fn test_invalid_printf_rejected() {
        let mut manifest = ModuleManifest::from_toml_str(MANIFEST).unwrap();
        manifest.bindings[0].format = Some("%q".to_string());
        assert!(manifest.into_declarations().is_err());
    }

    #[test]
    fn test_zero_refresh_rate_rejected() {
        let err = ModuleManifest::from_toml_str("name = \"x\"\nview = \"x.html\"\nrefresh_rate_ms = 0\n")
            .unwrap_err();
        assert!(matches!(err, FrameworkError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("module.toml");
        std::fs::write(&path, MANIFEST).unwrap();

        let module = ManifestModule::load(&path).unwrap();
        assert_eq!(module.manifest().view, "analog_inputs.html");
        assert!(ManifestModule::load(dir.path().join("missing.toml")).is_err());
    }
}
