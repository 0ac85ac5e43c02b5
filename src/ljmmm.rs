//! LJMMM register range patterns
//!
//! A pattern of the form `prefix#(start:end)suffix` names a contiguous group
//! of registers or UI elements. `AIN#(0:3)` expands to `AIN0`, `AIN1`, `AIN2`,
//! `AIN3`. Strings that do not match the grammar pass through unchanged.
//!
//! The grammar accepts an optional third group, `prefix#(start:end:step)`,
//! which is parsed but does not change the expansion: ranges always advance
//! by one.

use crate::error::{FrameworkError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static LJMMM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*)#\(([0-9]+):([0-9]+)(?::([0-9]+))?\)(.*)$").expect("Invalid LJMMM regex")
});

/// True if `name` contains a range pattern
pub fn is_pattern(name: &str) -> bool {
    LJMMM_PATTERN.is_match(name)
}

/// Expand a single name into the ordered list of concrete names it denotes.
///
/// Non-patterns yield a one-element list holding the input. A range whose
/// end precedes its start is rejected.
pub fn expand(name: &str) -> Result<Vec<String>> {
    let Some(caps) = LJMMM_PATTERN.captures(name) else {
        return Ok(vec![name.to_string()]);
    };

    let prefix = caps.get(1).map_or("", |m| m.as_str());
    let suffix = caps.get(5).map_or("", |m| m.as_str());
    let start = parse_bound(name, caps.get(2).map_or("", |m| m.as_str()))?;
    let end = parse_bound(name, caps.get(3).map_or("", |m| m.as_str()))?;

    if end < start {
        return Err(FrameworkError::Expansion {
            pattern: name.to_string(),
            message: format!("range end {} is before start {}", end, start),
        });
    }

    Ok((start..=end)
        .map(|n| format!("{}{}{}", prefix, n, suffix))
        .collect())
}

fn parse_bound(pattern: &str, digits: &str) -> Result<u64> {
    digits.parse().map_err(|_| FrameworkError::Expansion {
        pattern: pattern.to_string(),
        message: format!("range bound '{}' is out of range", digits),
    })
}

/// Expand every name in `names` and concatenate the results in order
pub fn expand_all<S: AsRef<str>>(names: &[S]) -> Result<Vec<String>> {
    let mut expanded = Vec::with_capacity(names.len());
    for name in names {
        expanded.extend(expand(name.as_ref())?);
    }
    Ok(expanded)
}

/// One concrete `(binding_class, register_name, template)` triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedNames {
    pub binding_class: String,
    pub register_name: String,
    pub template: String,
}

/// Expand the three name fields of a binding in lockstep.
///
/// Each field is expanded independently. A non-pattern binding class is
/// repeated for every expansion; the register name and template must expand
/// to lists of the same length. Any other length mismatch is an error and
/// nothing is returned.
pub fn expand_lockstep(
    binding_class: &str,
    register_name: &str,
    template: &str,
) -> Result<Vec<ExpandedNames>> {
    let classes = expand(binding_class)?;
    let registers = expand(register_name)?;
    let templates = expand(template)?;

    let n = registers.len().max(templates.len());
    let class_ok = classes.len() == n || classes.len() == 1;
    if registers.len() != templates.len() || !class_ok {
        return Err(FrameworkError::Expansion {
            pattern: format!("{} / {} / {}", binding_class, register_name, template),
            message: format!(
                "mismatched expansion lengths (class {}, register {}, template {})",
                classes.len(),
                registers.len(),
                templates.len()
            ),
        });
    }

    Ok(registers
        .into_iter()
        .zip(templates)
        .enumerate()
        .map(|(i, (register_name, template))| ExpandedNames {
            binding_class: if classes.len() == 1 {
                classes[0].clone()
            } else {
                classes[i].clone()
            },
            register_name,
            template,
        })
        .collect())
}

/// Size in 16-bit registers of a register data type, if known
pub fn data_type_size(data_type: &str) -> Option<u32> {
    match data_type {
        "UINT16" => Some(1),
        "UINT32" | "INT32" | "FLOAT32" | "STRING" => Some(2),
        "UINT64" => Some(4),
        _ => None,
    }
}

/// A register map entry whose name may be a range pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterEntry {
    pub name: String,
    pub address: u32,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// Expand a register entry into one entry per concrete name.
///
/// Consecutive entries are laid out back to back: each address advances by
/// the size of the entry's data type.
pub fn expand_entry(entry: &RegisterEntry) -> Result<Vec<RegisterEntry>> {
    let size = data_type_size(&entry.data_type).ok_or_else(|| FrameworkError::Expansion {
        pattern: entry.name.clone(),
        message: format!("unknown data type '{}'", entry.data_type),
    })?;

    let names = expand(&entry.name)?;
    let mut address = entry.address;
    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        entries.push(RegisterEntry {
            name,
            address,
            data_type: entry.data_type.clone(),
        });
        address = address.checked_add(size).ok_or_else(|| FrameworkError::Expansion {
            pattern: entry.name.clone(),
            message: "address overflow".to_string(),
        })?;
    }
    Ok(entries)
}
