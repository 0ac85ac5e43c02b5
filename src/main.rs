//! Demo: run a manifest-described module against an in-memory device
//!
//! Usage: `regbind [manifest.toml] [config.toml]`
//!
//! Without arguments a built-in analog monitor manifest is used.

use anyhow::Context;
use regbind::device::shared;
use regbind::logging::{init_tracing, DEFAULT_FILTER};
use regbind::{
    ActiveTab, Framework, FrameworkConfig, ManifestModule, MockDevice, MockPattern,
    ModuleHost, ModuleManifest, ModuleMessage, RecordingView,
};
use std::time::Duration;

const DEMO_MANIFEST: &str = r#"
name = "analog-monitor"
view = "analog_monitor.html"
refresh_rate_ms = 200

[[bindings]]
class = "AIN#(0:1)"
template = "ain#(0:1)-display"
register = "AIN#(0:1)"
format = "%.3f V"

[[bindings]]
class = "counter"
template = "count-display"
register = "COUNTER"
script = 'sprintf("%d ticks", value)'

[[bindings]]
class = "DAC0"
template = "dac0-input"
register = "DAC0"
direction = "write"
event = "change"

[[setup]]
class = "serial"
register = "SERIAL_NUMBER"

[[setup]]
class = "range"
register = "AIN_ALL_RANGE"
direction = "write"
default = 10
"#;

const DEMO_TEMPLATE: &str = "<h1>Analog monitor</h1> serial {{setup.serial.formatted}}";

fn main() -> anyhow::Result<()> {
    init_tracing(DEFAULT_FILTER);

    let mut args = std::env::args().skip(1);
    let manifest = match args.next() {
        Some(path) => ModuleManifest::load(&path).with_context(|| format!("loading {}", path))?,
        None => ModuleManifest::from_toml_str(DEMO_MANIFEST)?,
    };
    let config = match args.next() {
        Some(path) => FrameworkConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => FrameworkConfig::default(),
    };

    tracing::info!("Running module {}", manifest.name);

    let device = shared(
        MockDevice::new("470010101")
            .with_register("SERIAL_NUMBER", 470010101.0)
            .with_register("AIN_ALL_RANGE", 0.0)
            .with_register("DAC0", 0.0)
            .with_pattern(
                "AIN0",
                MockPattern::Sine {
                    frequency: 0.5,
                    amplitude: 2.5,
                    offset: 2.5,
                },
            )
            .with_pattern("AIN1", MockPattern::Constant(-1.25))
            .with_pattern(
                "COUNTER",
                MockPattern::Counter {
                    step: 1.0,
                    min: 0.0,
                    max: 1000.0,
                },
            ),
    );

    let view = RecordingView::new().with_template(manifest.view.clone(), DEMO_TEMPLATE);
    let tabs = ActiveTab::new();
    let framework = Framework::new(
        manifest.name.clone(),
        ManifestModule::new(manifest),
        view.clone(),
        config,
    )
    .with_token(tabs.activate());

    let handle = ModuleHost::spawn(framework, vec![device])?;

    std::thread::sleep(Duration::from_millis(700));
    view.set_input("#dac0-input", "3.3");
    handle.ui_event("#dac0-input", "change");
    std::thread::sleep(Duration::from_millis(500));

    // Switching tabs ends the refresh loop at its next tick
    tabs.deactivate();
    while let Some(msg) = handle.recv_timeout(Duration::from_secs(2)) {
        tracing::info!("Module message: {:?}", msg);
        if matches!(msg, ModuleMessage::Halted(_)) {
            break;
        }
    }

    let framework = handle.join()?;
    let stats = framework.refresh_stats();
    let snapshot = view.snapshot();

    println!("Rendered view:");
    for (target, html) in &snapshot.html {
        println!("  {} => {}", target, html);
    }
    println!("Last values:");
    let mut contents: Vec<_> = snapshot.contents.iter().collect();
    contents.sort();
    for (selector, content) in contents {
        println!("  {} = {}", selector, content);
    }
    println!(
        "Ticks: {} ok, {} failed, avg {:.1}us, jitter {}us",
        stats.ticks,
        stats.failed_ticks,
        stats.avg_tick_us(),
        stats.jitter_us()
    );

    Ok(())
}
