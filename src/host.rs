//! Module worker thread
//!
//! A module runs on its own thread that owns the [`Framework`]. The host
//! talks to it over crossbeam channels:
//!
//! - [`ModuleCommand`] - sent from the host to the worker (UI events,
//!   device selection, refresh rate, stop)
//! - [`ModuleMessage`] - sent from the worker to the host (state changes,
//!   event outcomes, halts)
//!
//! The worker waits for commands until the next tick is due, so commands
//! are only ever handled between ticks. Device I/O for a module is therefore
//! never issued concurrently.
//!
//! # Example
//!
//! ```ignore
//! let handle = ModuleHost::spawn(framework, vec![device])?;
//! handle.ui_event("#dac0-input", "change");
//! for msg in handle.drain() {
//!     println!("{:?}", msg);
//! }
//! handle.shutdown();
//! let framework = handle.join()?;
//! ```

use crate::device::SharedDevice;
use crate::error::{FrameworkError, Result};
use crate::framework::{Framework, LifecycleState};
use crate::refresh::{HaltReason, TickOutcome};
use crate::write::EventOutcome;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::fmt;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Capacity of the worker's outgoing message queue
const MESSAGE_QUEUE_DEPTH: usize = 10_000;

/// Message sent from the host to a module worker
pub enum ModuleCommand {
    /// A UI event fired on an attached listener
    UiEvent { selector: String, event: String },
    /// The user selected another device
    SelectDevices(Vec<SharedDevice>),
    SetRefreshRate(Duration),
    /// Stop refreshing; the worker unloads the module at the next tick
    Stop,
    /// Unload immediately and end the worker
    Shutdown,
}

impl fmt::Debug for ModuleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleCommand::UiEvent { selector, event } => f
                .debug_struct("UiEvent")
                .field("selector", selector)
                .field("event", event)
                .finish(),
            ModuleCommand::SelectDevices(devices) => {
                write!(f, "SelectDevices({} device(s))", devices.len())
            }
            ModuleCommand::SetRefreshRate(rate) => f.debug_tuple("SetRefreshRate").field(rate).finish(),
            ModuleCommand::Stop => f.write_str("Stop"),
            ModuleCommand::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Message sent from a module worker to the host
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleMessage {
    StateChanged(LifecycleState),
    EventHandled(EventOutcome),
    /// The refresh loop ended and the module was unloaded
    Halted(HaltReason),
    /// A lifecycle operation failed
    Error(String),
}

/// Spawns module workers
pub struct ModuleHost;

impl ModuleHost {
    /// Open `framework` with `devices` on a new worker thread and start
    /// refreshing.
    pub fn spawn(framework: Framework, devices: Vec<SharedDevice>) -> Result<ModuleHandle> {
        let depth = framework.context().config().command_queue_depth;
        let (cmd_tx, cmd_rx) = bounded(depth);
        let (msg_tx, msg_rx) = bounded(MESSAGE_QUEUE_DEPTH);

        let name = format!("module-{}", framework.name());
        let worker = ModuleWorker {
            framework,
            command_rx: cmd_rx,
            message_tx: msg_tx,
        };
        let thread = std::thread::Builder::new()
            .name(name)
            .spawn(move || worker.run(devices))?;

        Ok(ModuleHandle {
            command_sender: cmd_tx,
            receiver: msg_rx,
            thread,
        })
    }
}

/// Host-side handle to a running module worker
pub struct ModuleHandle {
    command_sender: Sender<ModuleCommand>,
    receiver: Receiver<ModuleMessage>,
    thread: JoinHandle<Framework>,
}

impl ModuleHandle {
    /// Send a command to the worker
    pub fn send_command(&self, cmd: ModuleCommand) -> bool {
        self.command_sender.send(cmd).is_ok()
    }

    /// Report a UI event
    pub fn ui_event(&self, selector: impl Into<String>, event: impl Into<String>) -> bool {
        self.send_command(ModuleCommand::UiEvent {
            selector: selector.into(),
            event: event.into(),
        })
    }

    pub fn select_devices(&self, devices: Vec<SharedDevice>) -> bool {
        self.send_command(ModuleCommand::SelectDevices(devices))
    }

    pub fn set_refresh_rate(&self, rate: Duration) -> bool {
        self.send_command(ModuleCommand::SetRefreshRate(rate))
    }

    pub fn stop(&self) -> bool {
        self.send_command(ModuleCommand::Stop)
    }

    pub fn shutdown(&self) -> bool {
        self.send_command(ModuleCommand::Shutdown)
    }

    /// Try to receive a message without blocking
    pub fn try_recv(&self) -> Option<ModuleMessage> {
        self.receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for the next message
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ModuleMessage> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Receive all pending messages
    pub fn drain(&self) -> Vec<ModuleMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.receiver.try_recv() {
            messages.push(msg);
        }
        messages
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker to exit and take back its framework
    pub fn join(self) -> Result<Framework> {
        drop(self.command_sender);
        self.thread
            .join()
            .map_err(|_| FrameworkError::Channel("module worker panicked".to_string()))
    }
}

struct ModuleWorker {
    framework: Framework,
    command_rx: Receiver<ModuleCommand>,
    message_tx: Sender<ModuleMessage>,
}

impl ModuleWorker {
    fn run(mut self, devices: Vec<SharedDevice>) -> Framework {
        info!("Module worker {} started", self.framework.name());

        match self.framework.open(devices) {
            Ok(()) => self.send(ModuleMessage::StateChanged(self.framework.state())),
            Err(e) => {
                self.send(ModuleMessage::Error(e.to_string()));
                self.framework.unload();
                self.send(ModuleMessage::StateChanged(self.framework.state()));
                return self.framework;
            }
        }

        let mut next_tick = Some(Instant::now());
        loop {
            let received = match next_tick {
                Some(at) => {
                    let wait = at.saturating_duration_since(Instant::now());
                    if wait.is_zero() {
                        match self.framework.iterate() {
                            TickOutcome::Continue => {
                                next_tick = Instant::now().checked_add(self.framework.refresh_rate())
                            }
                            TickOutcome::Halted(reason) => {
                                self.send(ModuleMessage::Halted(reason));
                                break;
                            }
                        }
                        continue;
                    }
                    self.command_rx.recv_timeout(wait)
                }
                // Rate too long to schedule; only a command wakes the worker
                None => self
                    .command_rx
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(ModuleCommand::Shutdown) => {
                    self.framework.unload();
                    self.send(ModuleMessage::StateChanged(self.framework.state()));
                    break;
                }
                Ok(cmd) => {
                    if self.handle_command(cmd) {
                        next_tick = Some(Instant::now());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Command channel closed, unloading {}", self.framework.name());
                    self.framework.unload();
                    break;
                }
            }
        }

        info!("Module worker {} stopped", self.framework.name());
        self.framework
    }

    /// Returns true when the next tick should run immediately
    fn handle_command(&mut self, cmd: ModuleCommand) -> bool {
        debug!("Module {} command: {:?}", self.framework.name(), cmd);
        match cmd {
            ModuleCommand::UiEvent { selector, event } => {
                let outcome = self.framework.handle_event(&selector, &event);
                self.send(ModuleMessage::EventHandled(outcome));
                false
            }
            ModuleCommand::SelectDevices(devices) => {
                let result = self.framework.reselect_device(devices);
                if let Err(e) = result {
                    self.send(ModuleMessage::Error(e.to_string()));
                }
                self.send(ModuleMessage::StateChanged(self.framework.state()));
                true
            }
            ModuleCommand::SetRefreshRate(rate) => {
                match self.framework.context_mut().set_refresh_rate(rate) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Module {}: {}", self.framework.name(), e);
                        self.send(ModuleMessage::Error(e.to_string()));
                        false
                    }
                }
            }
            ModuleCommand::Stop => {
                self.framework.stop();
                true
            }
            ModuleCommand::Shutdown => false,
        }
    }

    fn send(&self, msg: ModuleMessage) {
        match self.message_tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => warn!("Message queue full, dropping {:?}", msg),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
