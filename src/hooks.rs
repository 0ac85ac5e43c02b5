//! Module hook trait
//!
//! A module customizes the framework by implementing [`ModuleHooks`]. Every
//! hook has a default, so a module implements only the stages it cares
//! about. Stage hooks return `Result<()>`; returning `Err` reports an error
//! for that stage. Error hooks return a [`Decision`] telling the framework
//! whether the module keeps running.

use crate::error::{FrameworkError, Result};
use crate::framework::ModuleContext;
use crate::refresh::RefreshEntry;
use crate::types::{Binding, SetupResults, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

/// Whether a module keeps running after an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop,
}

/// A value read during a refresh tick and the text pushed to the view for it
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshedValue {
    pub value: Value,
    pub formatted: String,
}

/// Values read during one refresh tick, keyed by register name
pub type RefreshedValues = BTreeMap<String, RefreshedValue>;

/// A UI control that is not bound to a register
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigControl {
    pub selector: String,
    pub event: String,
}

impl ConfigControl {
    pub fn new(selector: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            event: event.into(),
        }
    }
}

#[allow(unused_variables)]
pub trait ModuleHooks: Send {
    /// Module code is loaded; declare bindings and the view here
    fn on_module_loaded(&mut self, ctx: &mut ModuleContext) -> Result<()> {
        Ok(())
    }

    /// A device was selected; `ctx.device()` is set
    fn on_device_selected(&mut self, ctx: &mut ModuleContext) -> Result<()> {
        Ok(())
    }

    /// Every setup binding has run against the selected device
    fn on_device_configured(&mut self, ctx: &mut ModuleContext, results: &SetupResults) -> Result<()> {
        Ok(())
    }

    /// The view is rendered and listeners are attached
    fn on_template_loaded(&mut self, ctx: &mut ModuleContext) -> Result<()> {
        Ok(())
    }

    /// Before a UI value is written
    fn on_register_write(&mut self, ctx: &mut ModuleContext, binding: &Binding, value: &Value) -> Result<()> {
        Ok(())
    }

    /// After a UI value was written
    fn on_register_written(&mut self, ctx: &mut ModuleContext, register: &str, value: &Value) -> Result<()> {
        Ok(())
    }

    /// Start of a refresh tick, before the device read
    fn on_refresh(&mut self, ctx: &mut ModuleContext, entries: &[RefreshEntry]) -> Result<()> {
        Ok(())
    }

    /// End of a refresh tick, after the view was updated
    fn on_refreshed(&mut self, ctx: &mut ModuleContext, values: &RefreshedValues) -> Result<()> {
        Ok(())
    }

    /// A config control fired
    fn on_config_control(&mut self, ctx: &mut ModuleContext, control: &ConfigControl) -> Result<()> {
        Ok(())
    }

    /// The selected device is about to be released
    fn on_close_device(&mut self, ctx: &mut ModuleContext) -> Result<()> {
        Ok(())
    }

    /// The module is being torn down
    fn on_unload_module(&mut self, ctx: &mut ModuleContext) -> Result<()> {
        Ok(())
    }

    fn on_load_error(&mut self, ctx: &mut ModuleContext, error: &FrameworkError) -> Decision {
        Decision::Stop
    }

    fn on_write_error(&mut self, ctx: &mut ModuleContext, error: &FrameworkError) -> Decision {
        Decision::Continue
    }

    fn on_refresh_error(&mut self, ctx: &mut ModuleContext, error: &FrameworkError) -> Decision {
        Decision::Continue
    }
}

/// Run module code, converting a panic into an execution error
pub(crate) fn catch_panic<T>(hook: &'static str, f: impl FnOnce() -> T) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| FrameworkError::Execution {
        hook,
        message: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
