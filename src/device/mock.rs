//! Mock Device Implementation for Testing
//!
//! An in-memory register map that can stand in for real hardware. Registers
//! hold stored values or generate data from a pattern, individual registers
//! can be made to fail, and every call is recorded so tests can assert on
//! the exact device traffic.
//!
//! # Data Patterns
//!
//! - [`MockPattern::Constant`] - Fixed value
//! - [`MockPattern::Counter`] - Incrementing counter with wrap-around
//! - [`MockPattern::Sine`] - Sinusoidal wave over wall-clock time
//!
//! # Example
//!
//! ```ignore
//! use regbind::device::mock::{MockDevice, MockPattern};
//!
//! let mut device = MockDevice::new("470010101")
//!     .with_register("AIN0", 1.5)
//!     .with_pattern("AIN1", MockPattern::Counter { step: 1.0, min: 0.0, max: 10.0 })
//!     .with_failing_register("WIFI_VERSION");
//!
//! let values = device.read_many(&["AIN0".into(), "AIN1".into()])?;
//! ```
//!
//! # Enabling
//!
//! The mock device is only available when the `mock-device` feature is enabled
//! (on by default).

use crate::device::Device;
use crate::error::{FrameworkError, Result};
use crate::types::Value;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Pattern for generating mock register data
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockPattern {
    /// Constant value
    Constant(f64),
    /// Counter that increments on every read
    Counter { step: f64, min: f64, max: f64 },
    /// Sine wave with frequency and amplitude
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
}

#[derive(Debug, Clone)]
struct PatternState {
    pattern: MockPattern,
    /// Current counter value (for Counter pattern)
    counter_value: Option<f64>,
}

impl PatternState {
    fn new(pattern: MockPattern) -> Self {
        Self {
            pattern,
            counter_value: None,
        }
    }

    fn generate(&mut self, elapsed_secs: f64) -> f64 {
        match self.pattern {
            MockPattern::Constant(v) => v,
            MockPattern::Counter { step, min, max } => {
                let next = match self.counter_value {
                    None => min,
                    Some(current) => {
                        let v = current + step;
                        if v > max {
                            min
                        } else if v < min {
                            max
                        } else {
                            v
                        }
                    }
                };
                self.counter_value = Some(next);
                next
            }
            MockPattern::Sine {
                frequency,
                amplitude,
                offset,
            } => offset + amplitude * (2.0 * std::f64::consts::PI * frequency * elapsed_secs).sin(),
        }
    }
}

/// A single recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Read(String),
    Write(String, Value),
    ReadMany(Vec<String>),
    WriteMany(Vec<String>, Vec<Value>),
    ReadArray(String, usize),
    WriteArray(String, Vec<Value>),
}

/// In-memory device for tests and demos
pub struct MockDevice {
    identifier: String,
    /// Stored register values
    registers: HashMap<String, Value>,
    /// Registers that generate data instead of returning a stored value
    patterns: HashMap<String, PatternState>,
    /// Registers whose every access fails
    failing: HashSet<String>,
    /// Fail every batched read regardless of addresses
    fail_batches: bool,
    /// Simulated I/O latency per call
    delay: Option<Duration>,
    /// Start time for pattern generation
    start_time: Instant,
    calls: Vec<DeviceCall>,
}

impl MockDevice {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            registers: HashMap::new(),
            patterns: HashMap::new(),
            failing: HashSet::new(),
            fail_batches: false,
            delay: None,
            start_time: Instant::now(),
            calls: Vec::new(),
        }
    }

    /// Store a value in a register
    pub fn with_register(mut self, address: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_register(address, value);
        self
    }

    /// Generate a register's values from a pattern
    pub fn with_pattern(mut self, address: impl Into<String>, pattern: MockPattern) -> Self {
        self.patterns.insert(address.into(), PatternState::new(pattern));
        self
    }

    /// Make every access to `address` fail
    pub fn with_failing_register(mut self, address: impl Into<String>) -> Self {
        self.failing.insert(address.into());
        self
    }

    /// Simulate I/O latency
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_register(&mut self, address: impl Into<String>, value: impl Into<Value>) {
        let address = address.into();
        self.patterns.remove(&address);
        self.registers.insert(address, value.into());
    }

    /// Current stored value, without recording a call
    pub fn register(&self, address: &str) -> Option<&Value> {
        self.registers.get(address)
    }

    pub fn set_failing(&mut self, address: impl Into<String>, failing: bool) {
        let address = address.into();
        if failing {
            self.failing.insert(address);
        } else {
            self.failing.remove(&address);
        }
    }

    pub fn set_fail_batches(&mut self, fail: bool) {
        self.fail_batches = fail;
    }

    /// Every call made so far, oldest first
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Number of calls that touched the device for reading
    pub fn read_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    DeviceCall::Read(_) | DeviceCall::ReadMany(_) | DeviceCall::ReadArray(..)
                )
            })
            .count()
    }

    fn simulate_latency(&self) {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
    }

    fn load(&mut self, address: &str) -> Result<Value> {
        if self.failing.contains(address) {
            return Err(FrameworkError::device(address, "simulated failure"));
        }
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if let Some(state) = self.patterns.get_mut(address) {
            return Ok(Value::Number(state.generate(elapsed)));
        }
        self.registers
            .get(address)
            .cloned()
            .ok_or_else(|| FrameworkError::device(address, "no such register"))
    }

    fn store(&mut self, address: &str, value: &Value) -> Result<()> {
        if self.failing.contains(address) {
            return Err(FrameworkError::device(address, "simulated failure"));
        }
        self.set_register(address, value.clone());
        Ok(())
    }
}

impl Device for MockDevice {
    fn identifier(&self) -> String {
        self.identifier.clone()
    }

    fn read(&mut self, address: &str) -> Result<Value> {
        self.calls.push(DeviceCall::Read(address.to_string()));
        self.simulate_latency();
        self.load(address)
    }

    fn write(&mut self, address: &str, value: &Value) -> Result<()> {
        self.calls
            .push(DeviceCall::Write(address.to_string(), value.clone()));
        self.simulate_latency();
        self.store(address, value)
    }

    fn read_many(&mut self, addresses: &[String]) -> Result<Vec<Value>> {
        self.calls.push(DeviceCall::ReadMany(addresses.to_vec()));
        self.simulate_latency();
        if self.fail_batches {
            return Err(FrameworkError::device(addresses.join(","), "simulated batch failure"));
        }
        addresses.iter().map(|a| self.load(a)).collect()
    }

    fn write_many(&mut self, addresses: &[String], values: &[Value]) -> Result<()> {
        self.calls
            .push(DeviceCall::WriteMany(addresses.to_vec(), values.to_vec()));
        self.simulate_latency();
        if addresses.len() != values.len() {
            return Err(FrameworkError::device(addresses.join(","), "length mismatch"));
        }
        if let Some(bad) = addresses.iter().find(|a| self.failing.contains(a.as_str())) {
            return Err(FrameworkError::device(bad.clone(), "simulated failure"));
        }
        for (address, value) in addresses.iter().zip(values) {
            self.store(address, value)?;
        }
        Ok(())
    }

    fn read_array(&mut self, address: &str, count: usize) -> Result<Vec<Value>> {
        self.calls
            .push(DeviceCall::ReadArray(address.to_string(), count));
        self.simulate_latency();
        match self.load(address)? {
            Value::Text(s) => Ok(s.chars().take(count).map(|c| Value::Number(c as u32 as f64)).collect()),
            number => Ok(vec![number; count]),
        }
    }

    fn write_array(&mut self, address: &str, values: &[Value]) -> Result<()> {
        self.calls
            .push(DeviceCall::WriteArray(address.to_string(), values.to_vec()));
        self.simulate_latency();
        let text: String = values
            .iter()
            .filter_map(Value::as_f64)
            .filter_map(|n| char::from_u32(n as u32))
            .collect();
        self.store(address, &Value::Text(text))
    }
}

impl std::fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDevice")
            .field("identifier", &self.identifier)
            .field("registers", &self.registers.len())
            .field("patterns", &self.patterns.len())
            .field("calls", &self.calls.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_registers() {
        let mut device = MockDevice::new("T7").with_register("AIN0", 1.5);
        assert_eq!(device.read("AIN0").unwrap(), Value::Number(1.5));
        device.write("DAC0", &Value::Number(3.3)).unwrap();
        assert_eq!(device.register("DAC0"), Some(&Value::Number(3.3)));
        assert!(device.read("NOPE").is_err());
    }

    #[test]
    fn test_counter_pattern_wraps() {
        let mut device = MockDevice::new("T7").with_pattern(
            "COUNT",
            MockPattern::Counter {
                step: 1.0,
                min: 0.0,
                max: 2.0,
            },
        );
        let reads: Vec<f64> = (0..4)
            .map(|_| device.read("COUNT").unwrap().as_f64().unwrap())
            .collect();
        assert_eq!(reads, vec![0.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_sine_pattern_bounded() {
        let mut device = MockDevice::new("T7").with_pattern(
            "SINE",
            MockPattern::Sine {
                frequency: 1.0,
                amplitude: 2.0,
                offset: 10.0,
            },
        );
        let v = device.read("SINE").unwrap().as_f64().unwrap();
        assert!((8.0..=12.0).contains(&v));
    }

    #[test]
    fn test_failure_injection() {
        let mut device = MockDevice::new("T7")
            .with_register("AIN0", 1.0)
            .with_register("AIN1", 2.0)
            .with_failing_register("AIN1");

        assert!(device.read("AIN1").is_err());
        assert!(device.read_many(&["AIN0".into(), "AIN1".into()]).is_err());

        device.set_failing("AIN1", false);
        assert_eq!(device.read("AIN1").unwrap(), Value::Number(2.0));

        device.set_fail_batches(true);
        assert!(device.read_many(&["AIN0".into()]).is_err());
    }

    #[test]
    fn test_call_log() {
        let mut device = MockDevice::new("T7").with_register("AIN0", 0.0);
        device.read_many(&["AIN0".into()]).unwrap();
        device.write("DAC0", &Value::Number(1.0)).unwrap();

        assert_eq!(
            device.calls(),
            &[
                DeviceCall::ReadMany(vec!["AIN0".into()]),
                DeviceCall::Write("DAC0".into(), Value::Number(1.0)),
            ]
        );
        assert_eq!(device.read_calls(), 1);
        device.clear_calls();
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_string_arrays() {
        let mut device = MockDevice::new("T7");
        let bytes: Vec<Value> = "lab".chars().map(|c| Value::Number(c as u32 as f64)).collect();
        device.write_array("DEVICE_NAME", &bytes).unwrap();
        assert_eq!(device.register("DEVICE_NAME"), Some(&Value::Text("lab".into())));
        assert_eq!(device.read_array("DEVICE_NAME", 2).unwrap(), bytes[..2].to_vec());
    }
}
