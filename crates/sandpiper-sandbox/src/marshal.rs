//! Marker scheme for values that have no JSON representation.
//!
//! JSON cannot carry `undefined`, and a script storing `null` into a string
//! slot would otherwise be indistinguishable from the text "null". The
//! adapters encode these into marker strings on `set` and decode them back
//! on `get`, so a stored `undefined` reads back as a real `undefined`
//! inside the sandbox no matter which namespace wrote or read it.
//!
//! At finalization the markers become the literal strings `"undefined"`
//! and `"null"` in the harvested environments, which is what callers
//! render.

use sandpiper_data::Environments;

/// Marker stored for a JavaScript `undefined`.
pub const UNDEFINED_MARKER: &str = "__SANDPIPER_UNDEFINED__";

/// Marker stored for a JavaScript `null`.
pub const NULL_MARKER: &str = "__SANDPIPER_NULL__";

/// Convert a marker to its caller-facing display string.
fn demark(value: &mut String) {
    if value == UNDEFINED_MARKER {
        *value = "undefined".to_string();
    } else if value == NULL_MARKER {
        *value = "null".to_string();
    }
}

/// Rewrite marker values in both tiers for the harvested result.
pub fn finalize_envs(envs: &mut Environments) {
    for var in envs.global.iter_mut().chain(envs.selected.iter_mut()) {
        demark(&mut var.current_value);
        demark(&mut var.initial_value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandpiper_data::EnvironmentVariable;

    #[test]
    fn markers_become_literals() {
        let mut envs = Environments {
            global: vec![EnvironmentVariable::new("g", NULL_MARKER)],
            selected: vec![EnvironmentVariable::new("s", UNDEFINED_MARKER)],
        };
        finalize_envs(&mut envs);
        assert_eq!(envs.global[0].current_value, "null");
        assert_eq!(envs.global[0].initial_value, "null");
        assert_eq!(envs.selected[0].current_value, "undefined");
    }

    #[test]
    fn ordinary_values_untouched() {
        let mut envs = Environments {
            global: vec![],
            selected: vec![EnvironmentVariable::new("k", "undefined-ish")],
        };
        finalize_envs(&mut envs);
        assert_eq!(envs.selected[0].current_value, "undefined-ish");
    }
}
