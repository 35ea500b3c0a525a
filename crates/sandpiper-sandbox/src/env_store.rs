//! The two-tier environment store a single run mutates.
//!
//! Every adapter routes variable traffic through one [`EnvStore`], so a
//! write made through any namespace is immediately visible through the
//! others. Scoping follows the adapters' `source` option: `All` spans both
//! tiers with the selected environment shadowing the global one.

use sandpiper_data::{resolve_with, EnvironmentVariable, Environments};
use serde_json::{Map, Value};

/// Which tier(s) an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvScope {
    /// Selected first, then global.
    #[default]
    All,
    /// The selected environment only.
    Selected,
    /// The global environment only.
    Global,
}

impl EnvScope {
    /// Parse an adapter-supplied source string. Unknown strings read as
    /// the spanning scope, matching how the adapters default.
    pub fn parse(source: &str) -> Self {
        match source {
            "active" | "selected" => Self::Selected,
            "global" => Self::Global,
            _ => Self::All,
        }
    }

    fn includes_selected(self) -> bool {
        matches!(self, Self::All | Self::Selected)
    }

    fn includes_global(self) -> bool {
        matches!(self, Self::All | Self::Global)
    }
}

/// Live environment state for one run.
#[derive(Debug, Default)]
pub struct EnvStore {
    envs: Environments,
}

impl EnvStore {
    /// Take ownership of the caller's snapshot.
    pub fn new(envs: Environments) -> Self {
        Self { envs }
    }

    /// Hand the mutated environments back at finalization.
    pub fn into_envs(self) -> Environments {
        self.envs
    }

    fn find(&self, key: &str, scope: EnvScope) -> Option<&EnvironmentVariable> {
        let in_selected = scope
            .includes_selected()
            .then(|| self.envs.selected.iter().find(|v| v.key == key))
            .flatten();
        in_selected.or_else(|| {
            scope
                .includes_global()
                .then(|| self.envs.global.iter().find(|v| v.key == key))
                .flatten()
        })
    }

    /// `currentValue` verbatim, or `None` when the key is absent in scope.
    pub fn get(&self, key: &str, scope: EnvScope) -> Option<String> {
        self.find(key, scope).map(|v| v.current_value.clone())
    }

    /// `currentValue` with `<<name>>` references resolved against the
    /// variables visible in scope.
    pub fn get_resolve(&self, key: &str, scope: EnvScope) -> Option<String> {
        let raw = self.get(key, scope)?;
        Some(self.resolve_in_scope(&raw, scope))
    }

    /// `initialValue` verbatim.
    pub fn get_initial_raw(&self, key: &str, scope: EnvScope) -> Option<String> {
        self.find(key, scope).map(|v| v.initial_value.clone())
    }

    /// Whether the key exists in scope.
    pub fn has(&self, key: &str, scope: EnvScope) -> bool {
        self.find(key, scope).is_some()
    }

    /// Update `currentValue` of the first match (selected checked before
    /// global for the spanning scope), or create a fresh variable whose
    /// current and initial values coincide. Creation lands in the selected
    /// tier unless the scope is global-only.
    pub fn set(&mut self, key: &str, value: &str, scope: EnvScope) {
        self.set_property(key, value, scope, false)
    }

    /// Like [`set`](Self::set) but writes `initialValue`.
    pub fn set_initial(&mut self, key: &str, value: &str, scope: EnvScope) {
        self.set_property(key, value, scope, true)
    }

    fn set_property(&mut self, key: &str, value: &str, scope: EnvScope, initial: bool) {
        let slot = if scope.includes_selected() {
            self.envs.selected.iter_mut().find(|v| v.key == key)
        } else {
            None
        }
        .or_else(|| {
            if scope.includes_global() {
                self.envs.global.iter_mut().find(|v| v.key == key)
            } else {
                None
            }
        });

        match slot {
            Some(var) => {
                if initial {
                    var.initial_value = value.to_string();
                } else {
                    var.current_value = value.to_string();
                }
            }
            None => {
                let fresh = EnvironmentVariable::new(key, value);
                if scope.includes_selected() {
                    self.envs.selected.push(fresh);
                } else {
                    self.envs.global.push(fresh);
                }
            }
        }
    }

    /// Remove the first match, selected checked before global for the
    /// spanning scope. Absent keys are a no-op.
    pub fn unset(&mut self, key: &str, scope: EnvScope) {
        if scope.includes_selected() {
            if let Some(i) = self.envs.selected.iter().position(|v| v.key == key) {
                self.envs.selected.remove(i);
                return;
            }
        }
        if scope.includes_global() {
            if let Some(i) = self.envs.global.iter().position(|v| v.key == key) {
                self.envs.global.remove(i);
            }
        }
    }

    /// Restore `currentValue` to `initialValue` for the first match.
    pub fn reset(&mut self, key: &str, scope: EnvScope) {
        let slot = if scope.includes_selected() {
            self.envs.selected.iter_mut().find(|v| v.key == key)
        } else {
            None
        }
        .or_else(|| {
            if scope.includes_global() {
                self.envs.global.iter_mut().find(|v| v.key == key)
            } else {
                None
            }
        });
        if let Some(var) = slot {
            var.current_value = var.initial_value.clone();
        }
    }

    /// Drop every variable in the scoped tier(s).
    pub fn clear(&mut self, scope: EnvScope) {
        if scope.includes_selected() {
            self.envs.selected.clear();
        }
        if scope.includes_global() {
            self.envs.global.clear();
        }
    }

    /// Resolve `<<name>>` references in arbitrary text against both tiers.
    pub fn resolve(&self, text: &str) -> String {
        self.resolve_in_scope(text, EnvScope::All)
    }

    fn resolve_in_scope(&self, text: &str, scope: EnvScope) -> String {
        resolve_with(text, |key| self.get(key, scope))
    }

    /// Snapshot the scoped variables as a plain object, selected values
    /// winning over global ones on key collisions.
    pub fn to_object(&self, scope: EnvScope) -> Value {
        let mut map = Map::new();
        if scope.includes_global() {
            for var in &self.envs.global {
                map.insert(var.key.clone(), Value::String(var.current_value.clone()));
            }
        }
        if scope.includes_selected() {
            for var in &self.envs.selected {
                map.insert(var.key.clone(), Value::String(var.current_value.clone()));
            }
        }
        Value::Object(map)
    }

    /// Resolve `{{name}}` references (the compat adapter's interpolation
    /// syntax) against the scoped variables, one pass, unknown names kept.
    pub fn replace_in(&self, text: &str, scope: EnvScope) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("{{") {
            match rest[start + 2..].find("}}") {
                Some(len) => {
                    let name = &rest[start + 2..start + 2 + len];
                    out.push_str(&rest[..start]);
                    match self.get(name, scope) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push_str("{{");
                            out.push_str(name);
                            out.push_str("}}");
                        }
                    }
                    rest = &rest[start + 2 + len + 2..];
                }
                None => {
                    out.push_str(rest);
                    return out;
                }
            }
        }
        out.push_str(rest);
        out
    }
}
