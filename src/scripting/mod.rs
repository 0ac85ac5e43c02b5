//! Rhai Scripting Engine for Value Formats
//!
//! Bindings may render their values with a Rhai script instead of a printf
//! format string. The script sees the value being displayed and returns the
//! text to show.
//!
//! ## Variables
//!
//! - `value` / `raw` - The value read from the device (number or string)
//!
//! ## Entry Point
//!
//! If the script defines `fn format(raw)`, it is called with the value.
//! Otherwise the whole script is evaluated as an expression. Either way the
//! result must be a string or a number; numbers are rendered with the
//! default `%.4f` format.
//!
//! ## Example Scripts
//!
//! Showing a digital line as text:
//! ```rhai
//! if value > 0.5 { "HIGH" } else { "LOW" }
//! ```
//!
//! Converting a temperature register from kelvin:
//! ```rhai
//! fn format(raw) {
//!     (raw - 273.15).to_string() + " C"
//! }
//! ```

mod engine;

pub use engine::ScriptEngine;

use crate::error::{FrameworkError, Result};
use rhai::{Engine, AST};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A compiled format script that can be executed efficiently
#[derive(Clone)]
pub struct CompiledFormat {
    /// The compiled AST
    ast: AST,
    /// The original source code
    source: String,
}

impl CompiledFormat {
    /// Get the source code of this script
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Debug for CompiledFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFormat")
            .field("source", &self.source)
            .finish()
    }
}

/// Cache for compiled scripts to avoid recompilation on every tick
#[derive(Default)]
pub struct ScriptCache {
    /// Map from script source to compiled script
    cache: HashMap<String, CompiledFormat>,
}

impl ScriptCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Get a cached script or compile and cache it
    pub fn get_or_compile(&mut self, engine: &Engine, source: &str) -> Result<CompiledFormat> {
        if let Some(compiled) = self.cache.get(source) {
            return Ok(compiled.clone());
        }

        let ast = engine
            .compile(source)
            .map_err(|e| FrameworkError::Script(format!("Compilation error: {}", e)))?;

        let compiled = CompiledFormat {
            ast,
            source: source.to_string(),
        };

        self.cache.insert(source.to_string(), compiled.clone());
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

/// Thread-safe script cache wrapper
pub type SharedScriptCache = Arc<RwLock<ScriptCache>>;

/// Built-in format scripts for common register displays
pub mod builtins {
    /// Digital line state
    pub const HIGH_LOW: &str = r#"
if value > 0.5 { "HIGH" } else { "LOW" }
"#;

    /// Enable flag
    pub const ENABLED: &str = r#"
if value == 0 { "Disabled" } else { "Enabled" }
"#;

    /// Kelvin register shown in Celsius
    pub const KELVIN_TO_CELSIUS: &str = r#"
fn format(raw) {
    let c = raw - 273.15;
    (round(c * 10.0) / 10.0).to_string() + " C"
}
"#;

    /// Fraction shown as a percentage
    pub const PERCENT: &str = r#"
fn format(raw) {
    round(raw * 100.0).to_string() + "%"
}
"#;

    /// IPv4 address packed into a 32-bit register
    pub const IPV4: &str = r#"
fn format(raw) {
    let ip = to_int(raw);
    let a = bit_and(bit_shr(ip, 24), 255);
    let b = bit_and(bit_shr(ip, 16), 255);
    let c = bit_and(bit_shr(ip, 8), 255);
    let d = bit_and(ip, 255);
    `${a}.${b}.${c}.${d}`
}
"#;

    /// List of all built-in format scripts with names
    pub fn all() -> Vec<(&'static str, &'static str)> {
        vec![
            ("High/Low", HIGH_LOW),
            ("Enabled", ENABLED),
            ("Kelvin to Celsius", KELVIN_TO_CELSIUS),
            ("Percent", PERCENT),
            ("IPv4 Address", IPV4),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_cache() {
        let engine = Engine::new();
        let mut cache = ScriptCache::new();

        let script = r#"value.to_string()"#;
        let first = cache.get_or_compile(&engine, script).unwrap();
        let second = cache.get_or_compile(&engine, script).unwrap();

        assert_eq!(first.source(), second.source());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_rejects_bad_source() {
        let engine = Engine::new();
        let mut cache = ScriptCache::new();
        assert!(cache.get_or_compile(&engine, "fn (").is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_builtin_formats_compile() {
        let engine = ScriptEngine::new();
        for (name, source) in builtins::all() {
            let result = engine.validate(source);
            assert!(result.is_ok(), "Built-in '{}' failed to compile", name);
        }
    }
}
