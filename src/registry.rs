//! Binding registry
//!
//! Stores read and write bindings keyed by their expanded template, plus the
//! ordered list of one-shot setup bindings. Pattern-bearing declarations are
//! expanded and validated in full before anything is stored, so a rejected
//! declaration never leaves a partial registration behind.

use crate::device::Device;
use crate::error::{FrameworkError, Result};
use crate::format::sprintf;
use crate::ljmmm;
use crate::types::{
    Binding, Direction, SetupBinding, SetupOutcome, SetupResults, SetupStatus, Value,
};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// What a `put` changed
#[derive(Debug, Default)]
pub struct Registration {
    /// Templates of the bindings now stored, in declaration order
    pub stored: Vec<String>,
    /// Bindings that were replaced by this registration
    pub replaced: Vec<Binding>,
}

impl Registration {
    fn merge(&mut self, other: Registration) {
        self.stored.extend(other.stored);
        self.replaced.extend(other.replaced);
    }
}

/// What a `delete` removed
#[derive(Debug, Default)]
pub struct Removal {
    pub removed: Vec<Binding>,
    /// Names that matched no binding
    pub missing: Vec<String>,
}

impl Removal {
    /// A load error naming every unmatched name, if any
    pub fn missing_error(&self) -> Option<FrameworkError> {
        if self.missing.is_empty() {
            None
        } else {
            Some(FrameworkError::Load(format!(
                "No binding for {}",
                self.missing.join(", ")
            )))
        }
    }
}

#[derive(Default)]
pub struct BindingRegistry {
    bindings: HashMap<String, Binding>,
    /// Templates in registration order
    order: Vec<String>,
    read_index: Vec<String>,
    write_index: Vec<String>,
    setup: Vec<SetupBinding>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that every required field of a binding is present
    pub fn validate(binding: &Binding) -> Result<()> {
        if binding.binding_class.is_empty() {
            return Err(FrameworkError::Load("Config binding missing class".into()));
        }
        if binding.template.is_empty() {
            return Err(FrameworkError::Load("Config binding missing template".into()));
        }
        if binding.register_name.is_empty() {
            return Err(FrameworkError::Load("Config binding missing register".into()));
        }
        if binding.direction == Direction::Write
            && binding.event.as_deref().map_or(true, str::is_empty)
        {
            return Err(FrameworkError::Load(format!(
                "Write binding '{}' missing event",
                binding.template
            )));
        }
        Ok(())
    }

    /// Validate and expand a declaration into concrete bindings
    pub fn expand(binding: &Binding) -> Result<Vec<Binding>> {
        Self::validate(binding)?;
        let names = ljmmm::expand_lockstep(
            &binding.binding_class,
            &binding.register_name,
            &binding.template,
        )?;
        Ok(names
            .into_iter()
            .map(|n| Binding {
                binding_class: n.binding_class,
                template: n.template,
                register_name: n.register_name,
                ..binding.clone()
            })
            .collect())
    }

    /// Register a binding, expanding any range patterns.
    ///
    /// Re-registering a template replaces the earlier binding in place; the
    /// replaced binding is returned so its listener can be detached.
    pub fn put(&mut self, binding: Binding) -> Result<Registration> {
        let expanded = Self::expand(&binding)?;
        let mut registration = Registration::default();
        for concrete in expanded {
            registration.merge(self.insert(concrete));
        }
        Ok(registration)
    }

    /// Register several bindings. Nothing is stored unless all are valid.
    pub fn put_many(&mut self, bindings: Vec<Binding>) -> Result<Registration> {
        let mut expanded = Vec::new();
        for binding in &bindings {
            expanded.extend(Self::expand(binding)?);
        }
        let mut registration = Registration::default();
        for concrete in expanded {
            registration.merge(self.insert(concrete));
        }
        Ok(registration)
    }

    fn insert(&mut self, binding: Binding) -> Registration {
        let key = binding.template.clone();
        debug!(
            "Registering {} binding {} -> {}",
            binding.direction, binding.register_name, key
        );

        let replaced = self.bindings.insert(key.clone(), binding.clone());
        match &replaced {
            Some(old) => {
                trace!("Replacing binding for {}", key);
                if old.direction != binding.direction {
                    self.unindex(&key, old.direction);
                    self.index(&key, binding.direction);
                }
            }
            None => {
                self.order.push(key.clone());
                self.index(&key, binding.direction);
            }
        }

        Registration {
            stored: vec![key],
            replaced: replaced.into_iter().collect(),
        }
    }

    fn index(&mut self, key: &str, direction: Direction) {
        match direction {
            Direction::Read => self.read_index.push(key.to_string()),
            Direction::Write => self.write_index.push(key.to_string()),
        }
    }

    fn unindex(&mut self, key: &str, direction: Direction) {
        match direction {
            Direction::Read => self.read_index.retain(|k| k != key),
            Direction::Write => self.write_index.retain(|k| k != key),
        }
    }

    fn remove(&mut self, key: &str) -> Option<Binding> {
        let binding = self.bindings.remove(key)?;
        self.order.retain(|k| k != key);
        self.unindex(key, binding.direction);
        Some(binding)
    }

    /// Delete bindings by template or binding class, expanding range patterns.
    ///
    /// Each expanded name is first looked up as a template key; if no binding
    /// has that template, every binding of that class is removed. Names that
    /// match nothing are reported in [`Removal::missing`].
    pub fn delete(&mut self, name: &str) -> Result<Removal> {
        let mut removal = Removal::default();

        for key in ljmmm::expand(name)? {
            if let Some(binding) = self.remove(&key) {
                removal.removed.push(binding);
                continue;
            }
            let by_class: Vec<String> = self
                .order
                .iter()
                .filter(|t| {
                    self.bindings
                        .get(*t)
                        .is_some_and(|b| b.binding_class == key)
                })
                .cloned()
                .collect();
            if by_class.is_empty() {
                warn!("No binding for {}", key);
                removal.missing.push(key);
            }
            for template in by_class {
                removal.removed.extend(self.remove(&template));
            }
        }

        debug!("Deleted {} binding(s) for {}", removal.removed.len(), name);
        Ok(removal)
    }

    /// Delete several names
    pub fn delete_many<S: AsRef<str>>(&mut self, names: &[S]) -> Result<Removal> {
        let mut removal = Removal::default();
        for name in names {
            let next = self.delete(name.as_ref())?;
            removal.removed.extend(next.removed);
            removal.missing.extend(next.missing);
        }
        Ok(removal)
    }

    /// Remove every read and write binding, returning them
    pub fn clear(&mut self) -> Vec<Binding> {
        self.read_index.clear();
        self.write_index.clear();
        let order = std::mem::take(&mut self.order);
        let mut bindings = std::mem::take(&mut self.bindings);
        order
            .into_iter()
            .filter_map(|k| bindings.remove(&k))
            .collect()
    }

    /// Register a setup binding, expanding a range in its register name
    pub fn put_setup(&mut self, setup: SetupBinding) -> Result<()> {
        if setup.binding_class.is_empty() {
            return Err(FrameworkError::Load("Setup binding missing class".into()));
        }
        if setup.register_name.is_empty() {
            return Err(FrameworkError::Load("Setup binding missing register".into()));
        }
        if setup.direction == Direction::Write && setup.default_val.is_none() {
            return Err(FrameworkError::Load(format!(
                "Write setup binding '{}' missing default value",
                setup.binding_class
            )));
        }

        let registers = ljmmm::expand(&setup.register_name)?;
        let classes = ljmmm::expand(&setup.binding_class)?;
        if classes.len() != 1 && classes.len() != registers.len() {
            return Err(FrameworkError::Expansion {
                pattern: format!("{} / {}", setup.binding_class, setup.register_name),
                message: format!(
                    "mismatched expansion lengths (class {}, register {})",
                    classes.len(),
                    registers.len()
                ),
            });
        }

        for (i, register_name) in registers.into_iter().enumerate() {
            let binding_class = classes.get(i).unwrap_or(&classes[0]).clone();
            debug!("Registering setup binding {} ({})", binding_class, register_name);
            self.setup.push(SetupBinding {
                binding_class,
                register_name,
                ..setup.clone()
            });
        }
        Ok(())
    }

    pub fn clear_setup(&mut self) {
        self.setup.clear();
    }

    /// Run every setup binding against `device`, one at a time, in order.
    ///
    /// Individual failures are recorded and do not stop later bindings.
    pub fn execute_setup(&self, device: &mut dyn Device, default_format: &str) -> SetupResults {
        let mut results = SetupResults::new();
        for setup in &self.setup {
            let outcome = match setup.direction {
                Direction::Read => device.read(&setup.register_name),
                Direction::Write => {
                    let value = setup.default_val.clone().unwrap_or(Value::Number(0.0));
                    device.write(&setup.register_name, &value).map(|_| value)
                }
            };

            let status = match outcome {
                Ok(value) => {
                    let formatted = format_setup_value(&value, default_format);
                    trace!("Setup {} = {}", setup.register_name, formatted);
                    SetupStatus::Success { value, formatted }
                }
                Err(e) => {
                    warn!("Setup binding {} failed: {}", setup.binding_class, e);
                    SetupStatus::Error {
                        cause: e.to_string(),
                    }
                }
            };

            results.push(
                setup.binding_class.clone(),
                SetupOutcome {
                    address: setup.register_name.clone(),
                    status,
                },
            );
        }
        results
    }

    pub fn get(&self, template: &str) -> Option<&Binding> {
        self.bindings.get(template)
    }

    /// Number of read and write bindings
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// All bindings in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.order.iter().filter_map(|k| self.bindings.get(k))
    }

    pub fn read_bindings(&self) -> impl Iterator<Item = &Binding> {
        self.read_index.iter().filter_map(|k| self.bindings.get(k))
    }

    pub fn write_bindings(&self) -> impl Iterator<Item = &Binding> {
        self.write_index.iter().filter_map(|k| self.bindings.get(k))
    }

    pub fn setup_bindings(&self) -> &[SetupBinding] {
        &self.setup
    }

    /// The write binding listening for `event` on `selector`
    pub fn find_write(&self, selector: &str, event: &str) -> Option<&Binding> {
        self.write_bindings()
            .find(|b| b.selector() == selector && b.event.as_deref() == Some(event))
    }

    /// JSON description of every binding keyed by template
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .iter()
            .map(|b| {
                (
                    b.template.clone(),
                    serde_json::json!({
                        "class": b.binding_class,
                        "register": b.register_name,
                        "direction": b.direction,
                        "event": b.event,
                    }),
                )
            })
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

fn format_setup_value(value: &Value, default_format: &str) -> String {
    match value {
        Value::Number(_) => sprintf(default_format, value).unwrap_or_else(|_| value.to_string()),
        Value::Text(s) => s.clone(),
    }
}

impl std::fmt::Debug for BindingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingRegistry")
            .field("bindings", &self.order)
            .field("read", &self.read_index.len())
            .field("write", &self.write_index.len())
            .field("setup", &self.setup.len())
            .finish()
    }
}
