//! Device trait for register access
//!
//! The framework never talks to a transport directly. A module is handed a
//! [`SharedDevice`] and every setup operation, refresh read and UI write goes
//! through the [`Device`] trait, so real drivers and the in-memory mock are
//! interchangeable.
//!
//! Batched operations are all-or-nothing: they either return one value per
//! address or fail as a whole. Callers never see partial batch results.

#[cfg(feature = "mock-device")]
pub mod mock;

use crate::error::{FrameworkError, Result};
use crate::types::{Direction, Value};
use std::sync::{Arc, Mutex, MutexGuard};

/// Unified interface for register-addressed devices
///
/// Implementations must be `Send` so the device can be owned by the module
/// worker thread.
pub trait Device: Send {
    /// Human-readable identifier, e.g. a serial number
    fn identifier(&self) -> String;

    /// Read a single register
    fn read(&mut self, address: &str) -> Result<Value>;

    /// Write a single register
    fn write(&mut self, address: &str, value: &Value) -> Result<()>;

    /// Read several registers in one round trip, preserving order
    ///
    /// Default implementation reads one by one and fails the whole batch on
    /// the first error. Drivers with a native batched read should override.
    fn read_many(&mut self, addresses: &[String]) -> Result<Vec<Value>> {
        addresses.iter().map(|a| self.read(a)).collect()
    }

    /// Write several registers in one round trip
    fn write_many(&mut self, addresses: &[String], values: &[Value]) -> Result<()> {
        if addresses.len() != values.len() {
            return Err(FrameworkError::device(
                addresses.join(","),
                format!("{} addresses but {} values", addresses.len(), values.len()),
            ));
        }
        for (address, value) in addresses.iter().zip(values) {
            self.write(address, value)?;
        }
        Ok(())
    }

    /// Mixed batched read/write.
    ///
    /// Operation `i` touches `counts[i]` consecutive values at `addresses[i]`.
    /// Write operations consume their values from `values` in order. Returns
    /// the values of all read operations, concatenated in order.
    fn rw_many(
        &mut self,
        addresses: &[String],
        directions: &[Direction],
        counts: &[usize],
        values: &[Value],
    ) -> Result<Vec<Value>> {
        if addresses.len() != directions.len() || addresses.len() != counts.len() {
            return Err(FrameworkError::device(
                addresses.join(","),
                "addresses, directions and counts differ in length",
            ));
        }

        let mut pending = values.iter();
        let mut read = Vec::new();
        for ((address, direction), &count) in addresses.iter().zip(directions).zip(counts) {
            match direction {
                Direction::Read if count == 1 => read.push(self.read(address)?),
                Direction::Read => read.extend(self.read_array(address, count)?),
                Direction::Write => {
                    let chunk: Vec<Value> = pending.by_ref().take(count).cloned().collect();
                    if chunk.len() != count {
                        return Err(FrameworkError::device(address.clone(), "not enough values to write"));
                    }
                    if count == 1 {
                        self.write(address, &chunk[0])?;
                    } else {
                        self.write_array(address, &chunk)?;
                    }
                }
            }
        }
        Ok(read)
    }

    /// Read `count` consecutive values starting at `address`
    fn read_array(&mut self, address: &str, count: usize) -> Result<Vec<Value>> {
        let _ = count;
        Err(FrameworkError::device(address, "array reads are not supported"))
    }

    /// Write consecutive values starting at `address`
    fn write_array(&mut self, address: &str, values: &[Value]) -> Result<()> {
        let _ = values;
        Err(FrameworkError::device(address, "array writes are not supported"))
    }
}

/// A device shared between the host and the module worker
pub type SharedDevice = Arc<Mutex<dyn Device>>;

/// Wrap a concrete device for use by the framework
pub fn shared<D: Device + 'static>(device: D) -> SharedDevice {
    Arc::new(Mutex::new(device))
}

/// Lock a shared device, mapping a poisoned lock to a device error
pub fn lock(device: &SharedDevice) -> Result<MutexGuard<'_, dyn Device + 'static>> {
    device
        .lock()
        .map_err(|e| FrameworkError::device("<device>", format!("device lock poisoned: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Minimal device relying on every default method
    struct MapDevice {
        regs: HashMap<String, Value>,
    }

    impl Device for MapDevice {
        fn identifier(&self) -> String {
            "map".into()
        }

        fn read(&mut self, address: &str) -> Result<Value> {
            self.regs
                .get(address)
                .cloned()
                .ok_or_else(|| FrameworkError::device(address, "no such register"))
        }

        fn write(&mut self, address: &str, value: &Value) -> Result<()> {
            self.regs.insert(address.to_string(), value.clone());
            Ok(())
        }
    }

    fn device() -> MapDevice {
        let mut regs = HashMap::new();
        regs.insert("AIN0".to_string(), Value::Number(1.0));
        regs.insert("AIN1".to_string(), Value::Number(2.0));
        MapDevice { regs }
    }

    #[test]
    fn test_default_read_many_preserves_order() {
        let mut d = device();
        let values = d.read_many(&["AIN1".into(), "AIN0".into()]).unwrap();
        assert_eq!(values, vec![Value::Number(2.0), Value::Number(1.0)]);
    }

    #[test]
    fn test_default_read_many_fails_whole_batch() {
        let mut d = device();
        assert!(d.read_many(&["AIN0".into(), "AIN9".into()]).is_err());
    }

    #[test]
    fn test_write_many_length_mismatch() {
        let mut d = device();
        assert!(d.write_many(&["DAC0".into()], &[]).is_err());
        d.write_many(&["DAC0".into()], &[Value::Number(2.5)]).unwrap();
        assert_eq!(d.read("DAC0").unwrap(), Value::Number(2.5));
    }

    #[test]
    fn test_rw_many_mixed() {
        let mut d = device();
        let read = d
            .rw_many(
                &["DAC0".into(), "AIN0".into(), "DAC0".into()],
                &[Direction::Write, Direction::Read, Direction::Read],
                &[1, 1, 1],
                &[Value::Number(4.0)],
            )
            .unwrap();
        assert_eq!(read, vec![Value::Number(1.0), Value::Number(4.0)]);
    }

    #[test]
    fn test_array_access_unsupported_by_default() {
        let mut d = device();
        assert!(d.read_array("AIN0", 2).is_err());
        assert!(d.write_array("AIN0", &[Value::Number(1.0)]).is_err());
    }

    #[test]
    fn test_shared_lock() {
        let shared = shared(device());
        let mut guard = lock(&shared).unwrap();
        assert_eq!(guard.identifier(), "map");
        assert_eq!(guard.read("AIN0").unwrap(), Value::Number(1.0));
    }
}
