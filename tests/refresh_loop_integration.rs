//! Integration tests for the refresh loop
//!
//! These tests drive ticks directly with `Framework::iterate`:
//! - Batched reads and formatted view updates
//! - Tab-switch and stop cancellation
//! - Refresh error policy

mod common;

use common::builders::BindingBuilder;
use common::mock_helpers::{create_shared_device, create_test_view, ScriptedModule};
use mockall::mock;
use regbind::device::{shared, Device};
use regbind::{
    ActiveTab, Binding, Format, Framework, FrameworkConfig, FrameworkError, HaltReason,
    LifecycleState, Result, Severity, TickOutcome, Value,
};

mock! {
    pub Dev {}
    impl Device for Dev {
        fn identifier(&self) -> String;
        fn read(&mut self, address: &str) -> Result<Value>;
        fn write(&mut self, address: &str, value: &Value) -> Result<()>;
        fn read_many(&mut self, addresses: &[String]) -> Result<Vec<Value>>;
    }
}

fn ain_bindings() -> Vec<Binding> {
    vec![
        BindingBuilder::new("AIN0").template("ain0-display").build(),
        BindingBuilder::new("AIN1").template("ain1-display").build(),
    ]
}

#[test]
fn test_one_tick_reads_once_and_updates_view() {
    let mut device = MockDev::new();
    device.expect_identifier().return_const("mock".to_string());
    device
        .expect_read_many()
        .withf(|addresses| addresses.len() == 2 && addresses[0] == "AIN0" && addresses[1] == "AIN1")
        .times(1)
        .returning(|_| Ok(vec![Value::Number(1.5), Value::Number(-2.25)]));

    let module = ScriptedModule::new(ain_bindings());
    let log = module.log();
    let view = create_test_view();
    let config = FrameworkConfig {
        refresh_rate_ms: 100,
        ..FrameworkConfig::default()
    };
    let mut framework = Framework::new("analog", module, view.clone(), config);
    framework.open(vec![shared(device)]).unwrap();

    assert_eq!(framework.iterate(), TickOutcome::Continue);

    assert_eq!(view.content("#ain0-display").as_deref(), Some("1.5000"));
    assert_eq!(view.content("#ain1-display").as_deref(), Some("-2.2500"));

    let log = log.lock().unwrap();
    assert_eq!(log.refreshed.len(), 1);
    let values = &log.refreshed[0];
    assert_eq!(values.len(), 2);
    assert_eq!(values["AIN0"].value, Value::Number(1.5));
    assert_eq!(values["AIN0"].formatted, "1.5000");
    assert_eq!(values["AIN1"].value, Value::Number(-2.25));
    assert_eq!(values["AIN1"].formatted, "-2.2500");
    assert_eq!(log.refresh_entries[0], vec!["AIN0".to_string(), "AIN1".to_string()]);
}

#[test]
fn test_tab_switch_stops_before_read() {
    let (device, mock) = create_shared_device();
    let tabs = ActiveTab::new();
    let module = ScriptedModule::new(ain_bindings());
    let log = module.log();
    let mut framework = Framework::new("analog", module, create_test_view(), FrameworkConfig::default())
        .with_token(tabs.activate());
    framework.open(vec![device]).unwrap();

    assert_eq!(framework.iterate(), TickOutcome::Continue);
    let reads_before = mock.lock().unwrap().read_calls();

    // Another module takes over the display
    let _other = tabs.activate();
    assert_eq!(framework.iterate(), TickOutcome::Halted(HaltReason::Inactive));

    assert_eq!(mock.lock().unwrap().read_calls(), reads_before);
    assert_eq!(framework.state(), LifecycleState::Unloaded);
    assert_eq!(framework.context().num_bindings(), 0);
    assert!(log.lock().unwrap().calls.contains(&"on_unload_module".to_string()));
}

#[test]
fn test_stop_takes_effect_between_ticks() {
    let (device, mock) = create_shared_device();
    let mut framework = Framework::new(
        "analog",
        ScriptedModule::new(ain_bindings()),
        create_test_view(),
        FrameworkConfig::default(),
    );
    framework.open(vec![device]).unwrap();
    let running = framework.running_flag();

    assert_eq!(framework.iterate(), TickOutcome::Continue);
    running.store(false, std::sync::atomic::Ordering::SeqCst);
    let reads_before = mock.lock().unwrap().read_calls();

    assert_eq!(framework.iterate(), TickOutcome::Halted(HaltReason::Stopped));
    assert_eq!(mock.lock().unwrap().read_calls(), reads_before);
}

#[test]
fn test_empty_registry_skips_read() {
    let (device, mock) = create_shared_device();
    let module = ScriptedModule::new(Vec::new());
    let log = module.log();
    let mut framework = Framework::new("empty", module, create_test_view(), FrameworkConfig::default());
    framework.open(vec![device]).unwrap();
    mock.lock().unwrap().clear_calls();

    assert_eq!(framework.iterate(), TickOutcome::Continue);
    assert!(mock.lock().unwrap().calls().is_empty());
    let log = log.lock().unwrap();
    assert_eq!(log.refreshed.len(), 1);
    assert!(log.refreshed[0].is_empty());
}

#[test]
fn test_read_failure_continues_by_default() {
    let (device, mock) = create_shared_device();
    let module = ScriptedModule::new(ain_bindings());
    let log = module.log();
    let view = create_test_view();
    let mut framework = Framework::new("analog", module, view.clone(), FrameworkConfig::default());
    framework.open(vec![device]).unwrap();

    mock.lock().unwrap().set_fail_batches(true);
    assert_eq!(framework.iterate(), TickOutcome::Continue);
    assert_eq!(framework.refresh_stats().failed_ticks, 1);
    assert!(log.lock().unwrap().refreshed.is_empty());
    assert_eq!(view.alerts()[0].0, Severity::Warning);

    mock.lock().unwrap().set_fail_batches(false);
    assert_eq!(framework.iterate(), TickOutcome::Continue);
    assert_eq!(framework.refresh_stats().ticks, 1);
    assert_eq!(log.lock().unwrap().errors.len(), 1);
}

#[test]
fn test_refresh_error_can_stop_loop() {
    let (device, mock) = create_shared_device();
    let module = ScriptedModule::new(ain_bindings()).stop_on_refresh_error();
    let mut framework = Framework::new("analog", module, create_test_view(), FrameworkConfig::default());
    framework.open(vec![device]).unwrap();

    mock.lock().unwrap().set_failing("AIN1", true);
    assert_eq!(framework.iterate(), TickOutcome::Halted(HaltReason::Error));
    assert_eq!(framework.state(), LifecycleState::Unloaded);
}

#[test]
fn test_format_error_is_refresh_error() {
    let (device, _mock) = create_shared_device();
    let failing = Binding::read("ain", "ain0-display", "AIN0").with_format(Format::custom(|_| {
        Err(FrameworkError::Load("cannot format".to_string()))
    }));
    let module = ScriptedModule::new(vec![failing, BindingBuilder::new("AIN1").build()]);
    let log = module.log();
    let view = create_test_view();
    let mut framework = Framework::new("analog", module, view.clone(), FrameworkConfig::default());
    framework.open(vec![device]).unwrap();

    assert_eq!(framework.iterate(), TickOutcome::Continue);

    // The good binding still reaches the view, but the tick is reported as failed
    assert_eq!(view.content("#ain1-display").as_deref(), Some("-2.2500"));
    assert!(view.content("#ain0-display").is_none());
    let log = log.lock().unwrap();
    assert!(log.refreshed.is_empty());
    assert!(log.errors[0].contains("cannot format"));
}

#[test]
fn test_custom_and_script_formats() {
    let (device, _mock) = create_shared_device();
    let custom = Binding::read("ain", "ain0-display", "AIN0").with_format(Format::custom(|v| {
        Ok(format!("{:.1} volts", v.as_f64().unwrap_or_default()))
    }));
    let script = BindingBuilder::new("AIN1").script("if value < 0.0 { \"negative\" } else { \"positive\" }").build();
    let module = ScriptedModule::new(vec![custom, script]);
    let log = module.log();
    let view = create_test_view();
    let mut framework = Framework::new("analog", module, view.clone(), FrameworkConfig::default());
    framework.open(vec![device]).unwrap();

    framework.iterate();
    assert_eq!(view.content("#ain0-display").as_deref(), Some("1.5 volts"));
    assert_eq!(view.content("#ain1-display").as_deref(), Some("negative"));

    // Modules see the same text the view received
    let log = log.lock().unwrap();
    assert_eq!(log.refreshed[0]["AIN0"].formatted, "1.5 volts");
    assert_eq!(log.refreshed[0]["AIN1"].formatted, "negative");
}

#[test]
fn test_panicking_hook_alerts_critical_and_continues() {
    let (device, _mock) = create_shared_device();
    let mut module = ScriptedModule::new(ain_bindings());
    module.panic_on_refreshed = true;
    let view = create_test_view();
    let mut framework = Framework::new("analog", module, view.clone(), FrameworkConfig::default());
    framework.open(vec![device]).unwrap();

    assert_eq!(framework.iterate(), TickOutcome::Continue);
    let alerts = view.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].0, Severity::Critical);
    assert!(alerts[0].1.contains("refresh handler crashed"));
    assert!(framework.is_running());
}

#[test]
fn test_pattern_bindings_refresh_in_order() {
    let (device, mock) = create_shared_device();
    let binding = Binding::read("AIN#(0:1)", "ain#(0:1)-display", "AIN#(0:1)")
        .with_format(Format::printf("%.2f"));
    let view = create_test_view();
    let mut framework = Framework::new(
        "analog",
        ScriptedModule::new(vec![binding]),
        view.clone(),
        FrameworkConfig::default(),
    );
    framework.open(vec![device]).unwrap();
    mock.lock().unwrap().clear_calls();

    framework.iterate();
    assert_eq!(mock.lock().unwrap().read_calls(), 1);
    let updates = view.snapshot().content_updates;
    assert_eq!(
        updates,
        vec![
            ("#ain0-display".to_string(), "1.50".to_string()),
            ("#ain1-display".to_string(), "-2.25".to_string()),
        ]
    );
}
