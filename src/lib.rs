//! # regbind: declarative register binding framework
//!
//! Instrument configuration modules declare *bindings* between device
//! register names and UI elements. The framework turns those declarations
//! into a one-time device setup sequence, a cancellable refresh loop that
//! keeps the UI in sync with the device, and a write path that pushes UI
//! changes back to the device.
//!
//! ## Architecture
//!
//! - **ljmmm**: expands register range patterns such as `AIN#(0:3)`
//! - **registry**: stores read, write and setup bindings
//! - **framework**: drives a module through its lifecycle and applies the
//!   error policy
//! - **refresh** / **write**: the polling loop and the UI write path
//! - **host**: runs a module on its own worker thread, fed by crossbeam
//!   channels
//!
//! Devices and views are injected through the [`Device`] and [`View`]
//! traits. Modules implement [`ModuleHooks`] or are described in TOML with
//! a [`ModuleManifest`].
//!
//! ## Example
//!
//! ```ignore
//! use regbind::{Binding, Framework, FrameworkConfig, ModuleContext, ModuleHooks, Result};
//!
//! struct Analog;
//!
//! impl ModuleHooks for Analog {
//!     fn on_module_loaded(&mut self, ctx: &mut ModuleContext) -> Result<()> {
//!         ctx.set_view("analog.html");
//!         ctx.put(Binding::read("AIN#(0:3)", "ain#(0:3)-display", "AIN#(0:3)"))?;
//!         Ok(())
//!     }
//! }
//!
//! let mut framework = Framework::new("analog", Analog, view, FrameworkConfig::default());
//! framework.open(vec![device])?;
//! while framework.iterate() == TickOutcome::Continue {
//!     std::thread::sleep(framework.refresh_rate());
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod device;
pub mod error;
pub mod format;
pub mod framework;
pub mod hooks;
pub mod host;
pub mod ljmmm;
pub mod logging;
pub mod refresh;
pub mod registry;
pub mod scripting;
pub mod types;
pub mod view;
pub mod write;

// Re-export commonly used types
pub use cancel::{ActivationToken, ActiveTab};
pub use config::{FrameworkConfig, ManifestModule, ModuleManifest};
pub use device::{Device, SharedDevice};
pub use error::{ErrorKind, FrameworkError, Result, ResultExt, Severity};
pub use framework::{Framework, LifecycleState, ModuleContext};
pub use hooks::{ConfigControl, Decision, ModuleHooks, RefreshedValue, RefreshedValues};
pub use host::{ModuleCommand, ModuleHandle, ModuleHost, ModuleMessage};
pub use refresh::{HaltReason, RefreshEntry, RefreshStats, TickOutcome};
pub use registry::BindingRegistry;
pub use types::{
    Binding, Direction, Format, SetupBinding, SetupResults, Value, DEFAULT_FORMAT, INVALID_REGISTER,
};
pub use view::{RecordingView, View};
pub use write::EventOutcome;

#[cfg(feature = "mock-device")]
pub use device::mock::{MockDevice, MockPattern};
