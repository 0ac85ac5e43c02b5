//! Refresh loop
//!
//! Each call to [`Framework::iterate`] is one tick: collect the read
//! bindings, read them from the device in one batch, format each value,
//! push it to the view and report the tick to the module. Cancellation is
//! checked before the read and again after the tick, never during it, so an
//! in-flight read always completes.

use crate::device;
use crate::error::{ErrorKind, FrameworkError, Result};
use crate::format;
use crate::framework::Framework;
use crate::hooks::{catch_panic, Decision, RefreshedValue, RefreshedValues};
use crate::types::{Format, Value};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Size of the rolling window used for jitter calculations
const RECENT_WINDOW_SIZE: usize = 100;

/// One read binding as seen by a refresh tick
#[derive(Debug, Clone)]
pub struct RefreshEntry {
    pub template: String,
    /// Register name read from the device
    pub address: String,
    pub format: Format,
}

/// Why the refresh loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// `stop()` was called
    Stopped,
    /// The module's tab is no longer displayed
    Inactive,
    /// The refresh error hook asked to stop
    Error,
}

/// Result of one [`Framework::iterate`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Schedule another tick after the refresh rate
    Continue,
    /// The loop ended and the module was unloaded
    Halted(HaltReason),
}

/// Refresh loop timing and success statistics
#[derive(Debug, Clone)]
pub struct RefreshStats {
    /// Ticks that completed without error
    pub ticks: u64,
    pub failed_ticks: u64,
    /// Registers read across all successful ticks
    pub registers_read: u64,
    /// Total tick time in microseconds
    pub total_tick_us: u64,
    pub last_tick_us: u64,
    pub min_tick_us: u64,
    pub max_tick_us: u64,
    /// Rolling window of recent tick times for jitter calculation
    pub recent_tick_us: VecDeque<u64>,
}

impl Default for RefreshStats {
    fn default() -> Self {
        Self {
            ticks: 0,
            failed_ticks: 0,
            registers_read: 0,
            total_tick_us: 0,
            last_tick_us: 0,
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            recent_tick_us: VecDeque::with_capacity(RECENT_WINDOW_SIZE),
        }
    }
}

impl RefreshStats {
    /// Average successful tick time in microseconds
    pub fn avg_tick_us(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            self.total_tick_us as f64 / self.ticks as f64
        }
    }

    /// Percentage of ticks that completed without error
    pub fn success_rate(&self) -> f64 {
        let total = self.ticks + self.failed_ticks;
        if total == 0 {
            100.0
        } else {
            (self.ticks as f64 / total as f64) * 100.0
        }
    }

    pub fn record_success(&mut self, time_us: u64, registers: u64) {
        self.ticks += 1;
        self.total_tick_us += time_us;
        self.last_tick_us = time_us;
        self.registers_read += registers;
        self.min_tick_us = self.min_tick_us.min(time_us);
        self.max_tick_us = self.max_tick_us.max(time_us);

        self.recent_tick_us.push_back(time_us);
        if self.recent_tick_us.len() > RECENT_WINDOW_SIZE {
            self.recent_tick_us.pop_front();
        }
    }

    pub fn record_failure(&mut self) {
        self.failed_ticks += 1;
    }

    /// Max minus min tick time over the recent window
    pub fn jitter_us(&self) -> u64 {
        let min = self.recent_tick_us.iter().min().copied().unwrap_or(0);
        let max = self.recent_tick_us.iter().max().copied().unwrap_or(0);
        max.saturating_sub(min)
    }

    /// Sample standard deviation of recent tick times
    pub fn stddev_us(&self) -> f64 {
        let n = self.recent_tick_us.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.recent_tick_us.iter().sum::<u64>() as f64 / n as f64;
        let variance = self
            .recent_tick_us
            .iter()
            .map(|&t| (t as f64 - mean).powi(2))
            .sum::<f64>()
            / (n - 1) as f64;
        variance.sqrt()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Framework {
    fn halt_reason(&self) -> Option<HaltReason> {
        if !self.token.is_active() {
            Some(HaltReason::Inactive)
        } else if !self.ctx.is_running() {
            Some(HaltReason::Stopped)
        } else {
            None
        }
    }

    fn halt(&mut self, reason: HaltReason) -> TickOutcome {
        debug!("Refresh loop for {} halted: {:?}", self.name(), reason);
        self.unload();
        TickOutcome::Halted(reason)
    }

    /// Run one refresh tick unless the loop has been cancelled.
    ///
    /// A halted loop unloads the module before returning.
    pub fn iterate(&mut self) -> TickOutcome {
        if let Some(reason) = self.halt_reason() {
            return self.halt(reason);
        }

        let started = Instant::now();
        match self.tick() {
            Ok(read) => {
                let elapsed = started.elapsed().as_micros() as u64;
                self.stats.record_success(elapsed, read as u64);
                trace!("Tick for {} took {}us", self.name(), elapsed);
            }
            Err(err) => {
                self.stats.record_failure();
                if self.decide(ErrorKind::Refresh, &err) == Decision::Stop {
                    self.ctx.stop();
                    return self.halt(HaltReason::Error);
                }
            }
        }

        match self.halt_reason() {
            Some(reason) => self.halt(reason),
            None => TickOutcome::Continue,
        }
    }

    /// Collect the current read bindings
    pub fn refresh_entries(&self) -> Vec<RefreshEntry> {
        self.ctx
            .registry
            .read_bindings()
            .map(|b| RefreshEntry {
                template: b.template.clone(),
                address: b.register_name.clone(),
                format: b.format.clone(),
            })
            .collect()
    }

    /// Returns the number of registers read
    fn tick(&mut self) -> Result<usize> {
        let entries = self.refresh_entries();
        self.run_hook("on_refresh", |m, ctx| m.on_refresh(ctx, &entries))?;

        let values = if entries.is_empty() {
            Vec::new()
        } else {
            self.read_values(&entries)?
        };

        let mut refreshed = RefreshedValues::new();
        let mut failures = Vec::new();
        for (entry, value) in entries.iter().zip(values) {
            let scripts = &self.scripts;
            let rendered = catch_panic("format", || format::render(&entry.format, &value, scripts))
                .and_then(|r| r);
            match rendered {
                Ok(text) => {
                    trace!("{} = {}", entry.address, text);
                    let selector = crate::types::selector_for(&entry.template);
                    self.ctx.view.set_element_content(&selector, &text)?;
                    refreshed.insert(
                        entry.address.clone(),
                        RefreshedValue {
                            value,
                            formatted: text,
                        },
                    );
                }
                Err(e) => {
                    warn!("Failed to format {}: {}", entry.address, e);
                    failures.push(format!("{}: {}", entry.address, e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(FrameworkError::Refresh(failures.join("; ")));
        }

        self.run_hook("on_refreshed", |m, ctx| m.on_refreshed(ctx, &refreshed))?;
        Ok(entries.len())
    }

    fn read_values(&self, entries: &[RefreshEntry]) -> Result<Vec<Value>> {
        let device = self
            .ctx
            .device
            .as_ref()
            .ok_or_else(|| FrameworkError::Refresh("No device selected".to_string()))?;
        let addresses: Vec<String> = entries.iter().map(|e| e.address.clone()).collect();

        let values = device::lock(device)?
            .read_many(&addresses)
            .map_err(FrameworkError::into_refresh)?;
        if values.len() != addresses.len() {
            return Err(FrameworkError::Refresh(format!(
                "Read {} values for {} registers",
                values.len(),
                addresses.len()
            )));
        }
        Ok(values)
    }
}
