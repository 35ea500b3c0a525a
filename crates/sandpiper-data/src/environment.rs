//! Environment variables and the two-tier store shape.

use serde::{Deserialize, Serialize};

/// A single environment variable.
///
/// `current_value` is what scripts read and write; `initial_value` is the
/// value the variable was created with and only changes through an explicit
/// `setInitial`. Duplicate keys are permitted within a list — lookups
/// resolve to the first match in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentVariable {
    /// Variable name.
    pub key: String,
    /// The live value, updated by script `set` calls.
    pub current_value: String,
    /// The value at creation time.
    pub initial_value: String,
    /// Whether the value should be masked in UIs. Carried through untouched.
    #[serde(default)]
    pub secret: bool,
}

impl EnvironmentVariable {
    /// Create a fresh variable where current and initial values coincide.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            key: key.into(),
            current_value: value.clone(),
            initial_value: value,
            secret: false,
        }
    }
}

/// The two-tier environment store a run operates on.
///
/// `selected` shadows `global`: scoped lookups that span both tiers check
/// `selected` first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environments {
    /// Variables from the globally-active environment.
    pub global: Vec<EnvironmentVariable>,
    /// Variables from the currently selected environment.
    pub selected: Vec<EnvironmentVariable>,
}

impl Environments {
    /// First match for `key` across both tiers, selected first.
    pub fn find(&self, key: &str) -> Option<&EnvironmentVariable> {
        self.selected
            .iter()
            .find(|v| v.key == key)
            .or_else(|| self.global.iter().find(|v| v.key == key))
    }
}
