//! Format script engine
//!
//! Runs format scripts against register values. Operation, depth and size
//! limits bound every evaluation.

use crate::error::{FrameworkError, Result, ResultExt};
use crate::format::sprintf;
use crate::scripting::{CompiledFormat, ScriptCache, SharedScriptCache};
use crate::types::{Value, DEFAULT_FORMAT};
use rhai::{Dynamic, Engine, EvalAltResult, Scope};
use std::sync::{Arc, RwLock};

/// Name of the optional entry point a format script may define
const ENTRY_POINT: &str = "format";

/// The script engine used for `Format::Script` bindings
pub struct ScriptEngine {
    /// The Rhai engine instance
    engine: Engine,
    /// Cache of compiled scripts
    cache: SharedScriptCache,
}

impl ScriptEngine {
    /// Create a new script engine with default configuration
    pub fn new() -> Self {
        Self::with_cache(Arc::new(RwLock::new(ScriptCache::new())))
    }

    /// Create a new script engine with a shared cache
    pub fn with_cache(cache: SharedScriptCache) -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine);
        Self { engine, cache }
    }

    /// Configure the Rhai engine with helper functions and safety limits
    fn configure_engine(engine: &mut Engine) {
        // Set safety limits
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(10_000);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(1_000);
        engine.set_max_map_size(1_000);

        engine.register_fn("abs", |x: f64| x.abs());
        engine.register_fn("sqrt", |x: f64| x.sqrt());
        engine.register_fn("pow", |x: f64, y: f64| x.powf(y));
        engine.register_fn("ln", |x: f64| x.ln());
        engine.register_fn("log10", |x: f64| x.log10());

        // Rounding functions
        engine.register_fn("floor", |x: f64| x.floor());
        engine.register_fn("ceil", |x: f64| x.ceil());
        engine.register_fn("round", |x: f64| x.round());
        engine.register_fn("trunc", |x: f64| x.trunc());
        engine.register_fn("clamp", |x: f64, min: f64, max: f64| x.clamp(min, max));

        // Bit manipulation for packed registers
        engine.register_fn("bit_and", |a: i64, b: i64| a & b);
        engine.register_fn("bit_or", |a: i64, b: i64| a | b);
        engine.register_fn("bit_shl", |a: i64, b: i64| a << (b & 63));
        engine.register_fn("bit_shr", |a: i64, b: i64| a >> (b & 63));
        engine.register_fn("bit", |a: i64, n: i64| (a >> (n & 63)) & 1 == 1);

        // Type conversions
        engine.register_fn("to_int", |x: f64| x as i64);
        engine.register_fn("to_float", |x: i64| x as f64);

        // printf from scripts, e.g. sprintf("%.2f V", value)
        engine.register_fn(
            "sprintf",
            |spec: &str, x: f64| -> std::result::Result<String, Box<EvalAltResult>> {
                sprintf(spec, &Value::Number(x)).map_err(|e| e.to_string().into())
            },
        );
    }

    /// Compile a script and cache it
    pub fn compile(&self, source: &str) -> Result<CompiledFormat> {
        let mut cache = self
            .cache
            .write()
            .map_err(|e| FrameworkError::Script(format!("Failed to acquire cache lock: {}", e)))?;

        cache.get_or_compile(&self.engine, source)
    }

    /// Execute a compiled script against a value and return the display text
    pub fn execute(&self, compiled: &CompiledFormat, value: &Value) -> Result<String> {
        let input = match value {
            Value::Number(n) => Dynamic::from_float(*n),
            Value::Text(s) => Dynamic::from(s.clone()),
        };

        let mut scope = Scope::new();
        scope.push_dynamic("value", input.clone());
        scope.push_dynamic("raw", input.clone());

        let result = match self.engine.call_fn::<Dynamic>(
            &mut scope,
            &compiled.ast,
            ENTRY_POINT,
            (input,),
        ) {
            Ok(v) => v,
            // No entry point: the script is a bare expression over `value`
            Err(e) if matches!(*e, EvalAltResult::ErrorFunctionNotFound(..)) => self
                .engine
                .eval_ast_with_scope::<Dynamic>(&mut scope, &compiled.ast)
                .context("Format script failed")?,
            Err(e) => return Err(e).context("Format script failed"),
        };

        Self::display(result)
    }

    fn display(result: Dynamic) -> Result<String> {
        if result.is_string() {
            return result
                .into_string()
                .map_err(|t| FrameworkError::Script(format!("Unexpected result type {}", t)));
        }
        if let Ok(f) = result.as_float() {
            return sprintf(DEFAULT_FORMAT, &Value::Number(f));
        }
        if let Ok(i) = result.as_int() {
            return sprintf(DEFAULT_FORMAT, &Value::Number(i as f64));
        }
        Err(FrameworkError::Script(format!(
            "Script must return a string or number, got {}",
            result.type_name()
        )))
    }

    /// Compile (cached) and run a format script, reporting failures as refresh errors
    pub fn format(&self, source: &str, value: &Value) -> Result<String> {
        self.compile(source)
            .and_then(|compiled| self.execute(&compiled, value))
            .map_err(FrameworkError::into_refresh)
    }

    /// Validate a script without executing it
    pub fn validate(&self, source: &str) -> Result<()> {
        self.engine
            .compile(source)
            .map(|_| ())
            .map_err(|e| FrameworkError::Script(format!("Validation error: {}", e)))
    }

    /// Clear the script cache
    pub fn clear_cache(&self) -> Result<()> {
        let mut cache = self
            .cache
            .write()
            .map_err(|e| FrameworkError::Script(format!("Failed to acquire cache lock: {}", e)))?;
        cache.clear();
        Ok(())
    }

    /// Number of compiled scripts held in the cache
    pub fn cached_scripts(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("cache_size", &self.cache.read().map(|c| c.len()).ok())
            .finish()
    }
}
