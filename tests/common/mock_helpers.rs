//! Mock construction helpers

use regbind::device::shared;
use regbind::{
    Binding, ConfigControl, Decision, FrameworkError, ModuleContext, ModuleHooks, MockDevice,
    RecordingView, RefreshEntry, RefreshedValues, Result, SetupBinding, SetupResults,
    SharedDevice, Value,
};
use std::sync::{Arc, Mutex};

/// Template location every scripted module renders
pub const VIEW: &str = "module.html";

/// A recording view with the test template registered
pub fn create_test_view() -> RecordingView {
    RecordingView::new().with_template(VIEW, "<div id=module></div>")
}

/// A device with the registers the scenario tests use
pub fn create_test_device() -> MockDevice {
    MockDevice::new("470010101")
        .with_register("SERIAL_NUMBER", 470010101.0)
        .with_register("AIN0", 1.5)
        .with_register("AIN1", -2.25)
        .with_register("DAC0", 0.0)
}

pub fn create_shared_device() -> (SharedDevice, Arc<Mutex<MockDevice>>) {
    let device = Arc::new(Mutex::new(create_test_device()));
    let handle: SharedDevice = device.clone();
    (handle, device)
}

pub fn shared_device(device: MockDevice) -> SharedDevice {
    shared(device)
}

/// Everything a [`ScriptedModule`] observed
#[derive(Debug, Default)]
pub struct HookLog {
    pub calls: Vec<String>,
    pub refreshed: Vec<RefreshedValues>,
    pub refresh_entries: Vec<Vec<String>>,
    pub written: Vec<(String, Value)>,
    pub errors: Vec<String>,
    pub controls: Vec<ConfigControl>,
}

/// A module built from declarations that records every hook call
pub struct ScriptedModule {
    pub bindings: Vec<Binding>,
    pub setup: Vec<SetupBinding>,
    pub log: Arc<Mutex<HookLog>>,
    pub refresh_decision: Decision,
    pub panic_on_refreshed: bool,
}

impl ScriptedModule {
    pub fn new(bindings: Vec<Binding>) -> Self {
        Self {
            bindings,
            setup: Vec::new(),
            log: Arc::default(),
            refresh_decision: Decision::Continue,
            panic_on_refreshed: false,
        }
    }

    pub fn with_setup(mut self, setup: SetupBinding) -> Self {
        self.setup.push(setup);
        self
    }

    pub fn stop_on_refresh_error(mut self) -> Self {
        self.refresh_decision = Decision::Stop;
        self
    }

    pub fn log(&self) -> Arc<Mutex<HookLog>> {
        Arc::clone(&self.log)
    }

    fn record(&self, hook: &str) {
        self.log.lock().unwrap().calls.push(hook.to_string());
    }
}

impl ModuleHooks for ScriptedModule {
    fn on_module_loaded(&mut self, ctx: &mut ModuleContext) -> Result<()> {
        self.record("on_module_loaded");
        ctx.set_view(VIEW);
        ctx.put_many(self.bindings.clone())?;
        for setup in &self.setup {
            ctx.put_setup(setup.clone())?;
        }
        Ok(())
    }

    fn on_device_selected(&mut self, _ctx: &mut ModuleContext) -> Result<()> {
        self.record("on_device_selected");
        Ok(())
    }

    fn on_device_configured(&mut self, _ctx: &mut ModuleContext, _results: &SetupResults) -> Result<()> {
        self.record("on_device_configured");
        Ok(())
    }

    fn on_template_loaded(&mut self, _ctx: &mut ModuleContext) -> Result<()> {
        self.record("on_template_loaded");
        Ok(())
    }

    fn on_refresh(&mut self, _ctx: &mut ModuleContext, entries: &[RefreshEntry]) -> Result<()> {
        let addresses = entries.iter().map(|e| e.address.clone()).collect();
        self.log.lock().unwrap().refresh_entries.push(addresses);
        Ok(())
    }

    fn on_refreshed(&mut self, _ctx: &mut ModuleContext, values: &RefreshedValues) -> Result<()> {
        if self.panic_on_refreshed {
            panic!("refresh handler crashed");
        }
        self.log.lock().unwrap().refreshed.push(values.clone());
        Ok(())
    }

    fn on_register_written(&mut self, _ctx: &mut ModuleContext, register: &str, value: &Value) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .written
            .push((register.to_string(), value.clone()));
        Ok(())
    }

    fn on_config_control(&mut self, _ctx: &mut ModuleContext, control: &ConfigControl) -> Result<()> {
        self.log.lock().unwrap().controls.push(control.clone());
        Ok(())
    }

    fn on_close_device(&mut self, _ctx: &mut ModuleContext) -> Result<()> {
        self.record("on_close_device");
        Ok(())
    }

    fn on_unload_module(&mut self, _ctx: &mut ModuleContext) -> Result<()> {
        self.record("on_unload_module");
        Ok(())
    }

    fn on_refresh_error(&mut self, _ctx: &mut ModuleContext, error: &FrameworkError) -> Decision {
        self.log.lock().unwrap().errors.push(error.to_string());
        self.refresh_decision
    }
}
