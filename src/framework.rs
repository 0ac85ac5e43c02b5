//! Module lifecycle orchestration
//!
//! A [`Framework`] is one live module instance. It owns the module's hooks,
//! its binding registry and its view, and drives the module through
//!
//! ```text
//! Unloaded -> Loaded -> DeviceSelected -> Configured -> TemplateLoaded -> Running -> Stopped
//! ```
//!
//! Selecting another device while running re-enters at `DeviceSelected`
//! without unloading. Switching tabs or closing the device unloads.
//!
//! # Error policy
//!
//! A failing stage (hook returned `Err`, hook panicked, or the framework
//! itself failed) is reported to the user and handed to the matching error
//! hook, which decides whether the module keeps running. Without an error
//! hook, load-time stages stop and refresh/write stages continue.

use crate::cancel::ActivationToken;
use crate::config::{FrameworkConfig, DEFAULT_REFRESH_RATE_MS};
use crate::device::{self, SharedDevice};
use crate::error::{ErrorKind, FrameworkError, Result, Severity};
use crate::hooks::{catch_panic, ConfigControl, Decision, ModuleHooks};
use crate::refresh::RefreshStats;
use crate::registry::{BindingRegistry, Registration};
use crate::scripting::ScriptEngine;
use crate::types::{Binding, Direction, SetupBinding, SetupResults};
use crate::view::View;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lifecycle stage of a module instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Unloaded,
    Loaded,
    DeviceSelected,
    Configured,
    TemplateLoaded,
    Running,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unloaded => "unloaded",
            LifecycleState::Loaded => "loaded",
            LifecycleState::DeviceSelected => "device-selected",
            LifecycleState::Configured => "configured",
            LifecycleState::TemplateLoaded => "template-loaded",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// The framework state a module's hooks can see and change
pub struct ModuleContext {
    pub(crate) registry: BindingRegistry,
    pub(crate) view: Box<dyn View>,
    pub(crate) device: Option<SharedDevice>,
    pub(crate) config: FrameworkConfig,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) config_controls: Vec<ConfigControl>,
    refresh_rate: Duration,
    custom_context: serde_json::Value,
    setup_results: SetupResults,
    view_location: Option<String>,
    /// Listeners are attached only while a rendered view exists
    listening: bool,
}

fn attach(view: &mut dyn View, binding: &Binding) -> Result<()> {
    match (&binding.direction, &binding.event) {
        (Direction::Write, Some(event)) => view.attach_event(&binding.selector(), event),
        _ => Ok(()),
    }
}

fn detach(view: &mut dyn View, binding: &Binding) -> Result<()> {
    match (&binding.direction, &binding.event) {
        (Direction::Write, Some(event)) => view.detach_event(&binding.selector(), event),
        _ => Ok(()),
    }
}

impl ModuleContext {
    fn new(view: Box<dyn View>, config: FrameworkConfig) -> Self {
        Self {
            registry: BindingRegistry::new(),
            view,
            device: None,
            refresh_rate: if config.refresh_rate_ms == 0 {
                Duration::from_millis(DEFAULT_REFRESH_RATE_MS)
            } else {
                config.refresh_rate()
            },
            config,
            running: Arc::new(AtomicBool::new(false)),
            config_controls: Vec::new(),
            custom_context: serde_json::Value::Null,
            setup_results: SetupResults::new(),
            view_location: None,
            listening: false,
        }
    }

    /// Register a binding; see [`BindingRegistry::put`]
    pub fn put(&mut self, binding: Binding) -> Result<Registration> {
        let registration = self.registry.put(binding)?;
        self.sync_listeners(&registration)?;
        Ok(registration)
    }

    /// Register several bindings; nothing is stored unless all are valid
    pub fn put_many(&mut self, bindings: Vec<Binding>) -> Result<Registration> {
        let registration = self.registry.put_many(bindings)?;
        self.sync_listeners(&registration)?;
        Ok(registration)
    }

    fn sync_listeners(&mut self, registration: &Registration) -> Result<()> {
        if !self.listening {
            return Ok(());
        }
        for old in &registration.replaced {
            detach(self.view.as_mut(), old)?;
        }
        for key in &registration.stored {
            if let Some(binding) = self.registry.get(key) {
                attach(self.view.as_mut(), binding)?;
            }
        }
        Ok(())
    }

    /// Delete bindings by template or class; see [`BindingRegistry::delete`]
    pub fn delete(&mut self, name: &str) -> Result<Vec<Binding>> {
        let removal = self.registry.delete(name)?;
        self.finish_removal(removal)
    }

    pub fn delete_many<S: AsRef<str>>(&mut self, names: &[S]) -> Result<Vec<Binding>> {
        let removal = self.registry.delete_many(names)?;
        self.finish_removal(removal)
    }

    fn finish_removal(&mut self, removal: crate::registry::Removal) -> Result<Vec<Binding>> {
        if self.listening {
            for binding in &removal.removed {
                detach(self.view.as_mut(), binding)?;
            }
        }
        match removal.missing_error() {
            Some(err) => Err(err),
            None => Ok(removal.removed),
        }
    }

    /// Remove every read and write binding
    pub fn clear_bindings(&mut self) -> Result<()> {
        let removed = self.registry.clear();
        if self.listening {
            for binding in &removed {
                detach(self.view.as_mut(), binding)?;
            }
        }
        Ok(())
    }

    pub fn put_setup(&mut self, setup: SetupBinding) -> Result<()> {
        self.registry.put_setup(setup)
    }

    pub fn bindings(&self) -> &BindingRegistry {
        &self.registry
    }

    pub fn num_bindings(&self) -> usize {
        self.registry.len()
    }

    pub fn get(&self, template: &str) -> Option<&Binding> {
        self.registry.get(template)
    }

    pub fn refresh_rate(&self) -> Duration {
        self.refresh_rate
    }

    /// Set the delay between refresh ticks; zero is rejected
    pub fn set_refresh_rate(&mut self, rate: Duration) -> Result<()> {
        if rate.is_zero() {
            return Err(FrameworkError::Config(
                "refresh rate must be greater than zero".to_string(),
            ));
        }
        debug!("Refresh rate set to {:?}", rate);
        self.refresh_rate = rate;
        Ok(())
    }

    /// Extra data exposed to the template as `custom`
    pub fn set_custom_context(&mut self, context: serde_json::Value) {
        self.custom_context = context;
    }

    pub fn custom_context(&self) -> &serde_json::Value {
        &self.custom_context
    }

    /// Controls that fire `on_config_control` instead of writing a register
    pub fn set_config_controls(&mut self, controls: Vec<ConfigControl>) -> Result<()> {
        if self.listening {
            for old in &self.config_controls {
                self.view.detach_event(&old.selector, &old.event)?;
            }
            for new in &controls {
                self.view.attach_event(&new.selector, &new.event)?;
            }
        }
        self.config_controls = controls;
        Ok(())
    }

    pub fn config_controls(&self) -> &[ConfigControl] {
        &self.config_controls
    }

    /// Template location rendered when the device is configured
    pub fn set_view(&mut self, location: impl Into<String>) {
        self.view_location = Some(location.into());
    }

    pub fn view_location(&self) -> Option<&str> {
        self.view_location.as_deref()
    }

    pub fn device(&self) -> Option<SharedDevice> {
        self.device.clone()
    }

    pub fn view(&self) -> &dyn View {
        self.view.as_ref()
    }

    pub fn view_mut(&mut self) -> &mut dyn View {
        self.view.as_mut()
    }

    /// Results of the most recent setup run
    pub fn setup_results(&self) -> &SetupResults {
        &self.setup_results
    }

    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    /// Ask the refresh loop to end after the current tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Context the template is rendered with
    pub fn render_context(&self) -> serde_json::Value {
        serde_json::json!({
            "bindings": self.registry.to_json(),
            "setup": self.setup_results.to_json(),
            "custom": self.custom_context,
        })
    }

    fn attach_listeners(&mut self) -> Result<()> {
        for binding in self.registry.write_bindings() {
            attach(self.view.as_mut(), binding)?;
        }
        for control in &self.config_controls {
            self.view.attach_event(&control.selector, &control.event)?;
        }
        self.listening = true;
        Ok(())
    }

    fn detach_listeners(&mut self) -> Result<()> {
        if !self.listening {
            return Ok(());
        }
        self.listening = false;
        for binding in self.registry.write_bindings() {
            detach(self.view.as_mut(), binding)?;
        }
        for control in &self.config_controls {
            self.view.detach_event(&control.selector, &control.event)?;
        }
        Ok(())
    }
}

/// One module instance and its lifecycle
pub struct Framework {
    name: String,
    module: Box<dyn ModuleHooks>,
    pub(crate) ctx: ModuleContext,
    state: LifecycleState,
    pub(crate) token: ActivationToken,
    pub(crate) scripts: ScriptEngine,
    pub(crate) stats: RefreshStats,
}

impl Framework {
    /// Create a module instance that is always considered the active tab
    pub fn new(
        name: impl Into<String>,
        module: impl ModuleHooks + 'static,
        view: impl View + 'static,
        config: FrameworkConfig,
    ) -> Self {
        Self::from_parts(
            name,
            Box::new(module),
            Box::new(view),
            config,
            ActivationToken::standalone(),
        )
    }

    pub fn from_parts(
        name: impl Into<String>,
        module: Box<dyn ModuleHooks>,
        view: Box<dyn View>,
        config: FrameworkConfig,
        token: ActivationToken,
    ) -> Self {
        Self {
            name: name.into(),
            module,
            ctx: ModuleContext::new(view, config),
            state: LifecycleState::Unloaded,
            token,
            scripts: ScriptEngine::new(),
            stats: RefreshStats::default(),
        }
    }

    /// Tie this instance to a tab activation
    pub fn with_token(mut self, token: ActivationToken) -> Self {
        self.token = token;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn context(&self) -> &ModuleContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ModuleContext {
        &mut self.ctx
    }

    pub fn refresh_stats(&self) -> &RefreshStats {
        &self.stats
    }

    pub fn refresh_rate(&self) -> Duration {
        self.ctx.refresh_rate
    }

    pub fn is_running(&self) -> bool {
        self.ctx.is_running()
    }

    /// True while this instance's tab is displayed
    pub fn is_active(&self) -> bool {
        self.token.is_active()
    }

    /// Handle that stops the refresh loop from another thread
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ctx.running)
    }

    fn expect_state(&self, allowed: &[LifecycleState], to: LifecycleState) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(FrameworkError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            })
        }
    }

    fn set_state(&mut self, state: LifecycleState) {
        debug!("Module {}: {} -> {}", self.name, self.state, state);
        self.state = state;
    }

    /// Call into module code with panics converted to execution errors
    pub(crate) fn call<T>(
        &mut self,
        hook: &'static str,
        f: impl FnOnce(&mut dyn ModuleHooks, &mut ModuleContext) -> T,
    ) -> Result<T> {
        let module = &mut self.module;
        let ctx = &mut self.ctx;
        catch_panic(hook, || f(module.as_mut(), ctx))
    }

    /// Run a stage hook
    pub(crate) fn run_hook(
        &mut self,
        hook: &'static str,
        f: impl FnOnce(&mut dyn ModuleHooks, &mut ModuleContext) -> Result<()>,
    ) -> Result<()> {
        self.call(hook, f).and_then(|r| r)
    }

    /// Log an error and show it to the user
    pub(crate) fn report(&mut self, stage: ErrorKind, err: &FrameworkError) {
        let severity = if err.kind() == ErrorKind::Execution {
            Severity::Critical
        } else {
            match stage {
                ErrorKind::Refresh => Severity::Warning,
                _ => Severity::Error,
            }
        };

        match severity {
            Severity::Critical => error!("Module {} {:?} stage: {}", self.name, stage, err),
            _ => warn!("Module {} {:?} stage: {}", self.name, stage, err),
        }

        if severity == Severity::Critical || self.ctx.config.alert_on_error {
            self.ctx.view.show_alert(severity, &err.to_string());
        }
    }

    /// Report an error and ask the module's error hook how to proceed
    pub(crate) fn decide(&mut self, stage: ErrorKind, err: &FrameworkError) -> Decision {
        self.report(stage, err);

        let (hook, default) = match stage {
            ErrorKind::Load => ("on_load_error", Decision::Stop),
            ErrorKind::Write => ("on_write_error", Decision::Continue),
            ErrorKind::Refresh | ErrorKind::Execution => ("on_refresh_error", Decision::Continue),
        };

        let decision = self.call(hook, |m, ctx| match stage {
            ErrorKind::Load => m.on_load_error(ctx, err),
            ErrorKind::Write => m.on_write_error(ctx, err),
            ErrorKind::Refresh | ErrorKind::Execution => m.on_refresh_error(ctx, err),
        });

        match decision {
            Ok(decision) => decision,
            Err(hook_err) => {
                self.report(stage, &hook_err);
                default
            }
        }
    }

    /// Apply the load-time error policy to a stage result
    fn load_stage(&mut self, result: Result<()>) -> Result<()> {
        let Err(err) = result else {
            return Ok(());
        };
        match self.decide(ErrorKind::Load, &err) {
            Decision::Continue => {
                warn!("Module {} continuing after load error", self.name);
                Ok(())
            }
            Decision::Stop => {
                error!("Module {} halted: {}", self.name, err);
                self.ctx.stop();
                self.set_state(LifecycleState::Stopped);
                Err(err)
            }
        }
    }

    /// Run the module's load hook
    pub fn load(&mut self) -> Result<()> {
        self.expect_state(&[LifecycleState::Unloaded], LifecycleState::Loaded)?;
        info!("Loading module {}", self.name);
        let result = self.run_hook("on_module_loaded", |m, ctx| m.on_module_loaded(ctx));
        self.load_stage(result)?;
        self.set_state(LifecycleState::Loaded);
        Ok(())
    }

    /// Select a device. Only the first of several devices is used.
    pub fn select_device(&mut self, devices: Vec<SharedDevice>) -> Result<()> {
        self.expect_state(&[LifecycleState::Loaded], LifecycleState::DeviceSelected)?;
        let result = self.attach_device(devices);
        self.load_stage(result)?;
        self.set_state(LifecycleState::DeviceSelected);
        Ok(())
    }

    fn attach_device(&mut self, devices: Vec<SharedDevice>) -> Result<()> {
        let count = devices.len();
        let device = devices
            .into_iter()
            .next()
            .ok_or_else(|| FrameworkError::Load("No device selected".to_string()))?;
        if count > 1 {
            warn!("{} devices selected, using the first", count);
        }

        let identifier = device::lock(&device)?.identifier();
        info!("Module {} selected device {}", self.name, identifier);
        self.ctx.device = Some(device);
        self.run_hook("on_device_selected", |m, ctx| m.on_device_selected(ctx))
    }

    /// Run every setup binding against the selected device
    pub fn configure(&mut self) -> Result<SetupResults> {
        self.expect_state(&[LifecycleState::DeviceSelected], LifecycleState::Configured)?;
        let result = self.run_setup();
        self.load_stage(result)?;
        self.set_state(LifecycleState::Configured);
        Ok(self.ctx.setup_results.clone())
    }

    fn run_setup(&mut self) -> Result<()> {
        let device = self
            .ctx
            .device
            .clone()
            .ok_or_else(|| FrameworkError::Load("No device selected".to_string()))?;

        let results = {
            let mut guard = device::lock(&device)?;
            self.ctx
                .registry
                .execute_setup(&mut *guard, &self.ctx.config.default_format)
        };
        info!(
            "Module {} setup finished: {} binding(s), {} failed",
            self.name,
            results.len(),
            results.failures()
        );

        self.ctx.setup_results = results.clone();
        self.run_hook("on_device_configured", |m, ctx| {
            m.on_device_configured(ctx, &results)
        })
    }

    /// Render the module's view and attach its listeners
    pub fn render(&mut self) -> Result<()> {
        self.expect_state(&[LifecycleState::Configured], LifecycleState::TemplateLoaded)?;
        let result = self
            .render_view()
            .and_then(|_| self.run_hook("on_template_loaded", |m, ctx| m.on_template_loaded(ctx)));
        self.load_stage(result)?;
        self.set_state(LifecycleState::TemplateLoaded);
        Ok(())
    }

    fn render_view(&mut self) -> Result<()> {
        let location = self
            .ctx
            .view_location
            .clone()
            .ok_or_else(|| FrameworkError::Load(format!("Module {} has no view", self.name)))?;

        let context = self.ctx.render_context();
        let html = self
            .ctx
            .view
            .render_template(&location, &context)
            .map_err(|e| FrameworkError::Load(format!("Failed to render {}: {}", location, e)))?;

        let target = self.ctx.config.device_view_target.clone();
        self.ctx.view.set_html(&target, &html)?;
        self.ctx.attach_listeners()?;
        debug!("Rendered {} into {}", location, target);
        Ok(())
    }

    /// Mark the refresh loop as running
    pub fn start(&mut self) -> Result<()> {
        self.expect_state(&[LifecycleState::TemplateLoaded], LifecycleState::Running)?;
        self.ctx.running.store(true, Ordering::SeqCst);
        self.set_state(LifecycleState::Running);
        info!(
            "Module {} running, refresh every {:?}",
            self.name, self.ctx.refresh_rate
        );
        Ok(())
    }

    /// Run every stage from load through start
    pub fn open(&mut self, devices: Vec<SharedDevice>) -> Result<()> {
        self.load()?;
        self.select_device(devices)?;
        self.configure()?;
        self.render()?;
        self.start()
    }

    /// Stop the refresh loop; the next tick unloads the module
    pub fn stop(&mut self) {
        self.ctx.stop();
        if self.state == LifecycleState::Running {
            self.set_state(LifecycleState::Stopped);
        }
    }

    /// Switch to another device without unloading the module
    pub fn reselect_device(&mut self, devices: Vec<SharedDevice>) -> Result<()> {
        self.expect_state(
            &[
                LifecycleState::DeviceSelected,
                LifecycleState::Configured,
                LifecycleState::TemplateLoaded,
                LifecycleState::Running,
                LifecycleState::Stopped,
            ],
            LifecycleState::DeviceSelected,
        )?;
        info!("Module {} re-selecting device", self.name);

        self.ctx.stop();
        let closed = self.close_current_device();
        self.load_stage(closed)?;
        self.ctx.detach_listeners()?;

        self.set_state(LifecycleState::Loaded);
        self.select_device(devices)?;
        self.configure()?;
        self.render()?;
        self.start()
    }

    fn close_current_device(&mut self) -> Result<()> {
        if self.ctx.device.is_none() {
            return Ok(());
        }
        let result = self.run_hook("on_close_device", |m, ctx| m.on_close_device(ctx));
        self.ctx.device = None;
        result
    }

    /// The application closed the device: tear the module down
    pub fn close_device(&mut self) {
        self.unload();
    }

    /// Tear down: stop the loop, release the device, clear every binding
    pub fn unload(&mut self) {
        if self.state == LifecycleState::Unloaded {
            return;
        }
        info!("Unloading module {}", self.name);
        self.ctx.stop();

        if let Err(e) = self.close_current_device() {
            self.report(ErrorKind::Load, &e);
        }
        if let Err(e) = self.run_hook("on_unload_module", |m, ctx| m.on_unload_module(ctx)) {
            self.report(ErrorKind::Load, &e);
        }
        if let Err(e) = self.ctx.detach_listeners() {
            self.report(ErrorKind::Load, &e);
        }

        self.ctx.registry.clear();
        self.ctx.registry.clear_setup();
        self.ctx.config_controls.clear();
        self.ctx.setup_results = SetupResults::new();
        self.set_state(LifecycleState::Unloaded);
    }
}

impl fmt::Debug for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framework")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("registry", &self.ctx.registry)
            .field("running", &self.is_running())
            .finish()
    }
}
