//! Integration tests for UI-originated writes

mod common;

use common::builders::BindingBuilder;
use common::mock_helpers::{create_shared_device, create_test_view, ScriptedModule};
use regbind::device::mock::DeviceCall;
use regbind::{
    Binding, ConfigControl, EventOutcome, Framework, FrameworkConfig, Value, INVALID_REGISTER,
};

fn dac_module() -> ScriptedModule {
    ScriptedModule::new(vec![BindingBuilder::new("DAC0")
        .template("dac0-input")
        .write_on("change")
        .build()])
}

#[test]
fn test_change_event_writes_register() {
    let (device, mock) = create_shared_device();
    let module = dac_module();
    let log = module.log();
    let view = create_test_view();
    let mut framework = Framework::new("dac", module, view.clone(), FrameworkConfig::default());
    framework.open(vec![device]).unwrap();
    mock.lock().unwrap().clear_calls();

    view.set_input("#dac0-input", "3.3");
    let outcome = framework.handle_event("#dac0-input", "change");

    assert_eq!(
        outcome,
        EventOutcome::Written {
            register: "DAC0".to_string(),
            value: Value::Number(3.3),
        }
    );
    assert_eq!(
        mock.lock().unwrap().calls(),
        &[DeviceCall::Write("DAC0".to_string(), Value::Number(3.3))]
    );
    assert_eq!(
        log.lock().unwrap().written,
        vec![("DAC0".to_string(), Value::Number(3.3))]
    );
}

#[test]
fn test_text_input_is_written_as_text() {
    let (device, mock) = create_shared_device();
    let view = create_test_view();
    let mut framework = Framework::new("dac", dac_module(), view.clone(), FrameworkConfig::default());
    framework.open(vec![device]).unwrap();

    view.set_input("#dac0-input", "auto");
    framework.handle_event("#dac0-input", "change");
    assert_eq!(
        mock.lock().unwrap().register("DAC0"),
        Some(&Value::Text("auto".to_string()))
    );
}

#[test]
fn test_callback_only_binding() {
    let (device, mock) = create_shared_device();
    let reset = Binding::write("reset", "reset-button", INVALID_REGISTER, "click")
        .with_write_callback(|_binding, device, _value| {
            device.write("DAC0", &Value::Number(0.0))?;
            device.write("SYSTEM_REBOOT", &Value::Number(1.0))
        });
    let view = create_test_view();
    let mut framework = Framework::new(
        "reset",
        ScriptedModule::new(vec![reset]),
        view.clone(),
        FrameworkConfig::default(),
    );
    framework.open(vec![device]).unwrap();
    mock.lock().unwrap().clear_calls();

    view.set_input("#reset-button", "");
    let outcome = framework.handle_event("#reset-button", "click");

    assert!(matches!(outcome, EventOutcome::Written { .. }));
    let mock = mock.lock().unwrap();
    assert_eq!(mock.calls().len(), 2);
    assert_eq!(mock.register("SYSTEM_REBOOT"), Some(&Value::Number(1.0)));
}

#[test]
fn test_config_control_reaches_module() {
    let (device, _mock) = create_shared_device();
    let module = dac_module();
    let log = module.log();
    let view = create_test_view();
    let mut framework = Framework::new("dac", module, view.clone(), FrameworkConfig::default());
    framework.open(vec![device]).unwrap();

    framework
        .context_mut()
        .set_config_controls(vec![ConfigControl::new("#update-rate", "change")])
        .unwrap();
    assert!(view.is_listening("#update-rate", "change"));

    assert_eq!(
        framework.handle_event("#update-rate", "change"),
        EventOutcome::Control
    );
    assert_eq!(log.lock().unwrap().controls.len(), 1);
}

#[test]
fn test_missing_input_value_is_write_error() {
    let (device, _mock) = create_shared_device();
    let view = create_test_view();
    let mut framework = Framework::new("dac", dac_module(), view.clone(), FrameworkConfig::default());
    framework.open(vec![device]).unwrap();

    let outcome = framework.handle_event("#dac0-input", "change");
    assert!(matches!(outcome, EventOutcome::Failed(_)));
    assert!(view.alerts()[0].1.contains("Write error on DAC0"));
    assert!(framework.is_running());
}
