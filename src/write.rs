//! UI-originated writes
//!
//! A fired UI event is routed to the write binding listening for it, or to a
//! config control. A write reads the element's current value, gives the
//! module a chance to react, then either runs the binding's write callback
//! or writes the register directly.

use crate::device;
use crate::error::{ErrorKind, FrameworkError, Result};
use crate::framework::Framework;
use crate::hooks::{catch_panic, Decision};
use crate::types::{Binding, Value};
use tracing::{debug, info};

/// What happened to a UI event
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// The value was handed to the device (or to the write callback)
    Written { register: String, value: Value },
    /// A config control fired
    Control,
    /// Nothing listens for this event
    Ignored,
    /// The write failed; the error hook decided how to proceed
    Failed(Decision),
}

impl Framework {
    /// Handle a UI event reported by the view host
    pub fn handle_event(&mut self, selector: &str, event: &str) -> EventOutcome {
        if let Some(binding) = self.ctx.registry.find_write(selector, event).cloned() {
            return self.dispatch_write(&binding);
        }

        let control = self
            .ctx
            .config_controls
            .iter()
            .find(|c| c.selector == selector && c.event == event)
            .cloned();
        let Some(control) = control else {
            debug!("Ignoring {} on {}", event, selector);
            return EventOutcome::Ignored;
        };

        match self.run_hook("on_config_control", |m, ctx| m.on_config_control(ctx, &control)) {
            Ok(()) => EventOutcome::Control,
            Err(err) => self.write_failed(err),
        }
    }

    /// Write the current UI value of `binding` to the device
    pub fn dispatch_write(&mut self, binding: &Binding) -> EventOutcome {
        match self.try_write(binding) {
            Ok(value) => {
                info!("Wrote {} = {}", binding.register_name, value);
                EventOutcome::Written {
                    register: binding.register_name.clone(),
                    value,
                }
            }
            Err(err) => {
                let err = match err {
                    err @ FrameworkError::Execution { .. } => err,
                    other => other.into_write(&binding.register_name),
                };
                self.write_failed(err)
            }
        }
    }

    fn write_failed(&mut self, err: FrameworkError) -> EventOutcome {
        let decision = self.decide(ErrorKind::Write, &err);
        if decision == Decision::Stop {
            self.stop();
        }
        EventOutcome::Failed(decision)
    }

    fn try_write(&mut self, binding: &Binding) -> Result<Value> {
        let raw = self.ctx.view.get_element_value(&binding.selector())?;
        let value = Value::from_ui(&raw);

        self.run_hook("on_register_write", |m, ctx| {
            m.on_register_write(ctx, binding, &value)
        })?;

        let needs_device = binding.write_callback.is_some() || !binding.is_virtual();
        if needs_device {
            let shared = self
                .ctx
                .device
                .clone()
                .ok_or_else(|| FrameworkError::Write {
                    register: binding.register_name.clone(),
                    message: "No device selected".to_string(),
                })?;
            let mut guard = device::lock(&shared)?;

            match &binding.write_callback {
                Some(callback) => {
                    debug!("Write callback for {}", binding.template);
                    catch_panic("write_callback", || callback(binding, &mut *guard, &value))??;
                }
                None => guard.write(&binding.register_name, &value)?,
            }
        } else {
            debug!("Virtual binding {}, skipping device write", binding.template);
        }

        self.run_hook("on_register_written", |m, ctx| {
            m.on_register_written(ctx, &binding.register_name, &value)
        })?;
        Ok(value)
    }
}
