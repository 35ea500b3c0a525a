//! `<<name>>` template resolution.

use crate::environment::Environments;

/// Expansion passes before giving up on nested references. A reference
/// chain deeper than this (including any cycle) is left literally in place.
const MAX_DEPTH: usize = 10;

/// Resolve `<<name>>` references in `text` against a lookup function.
///
/// References resolve recursively: a substituted value may itself contain
/// references. Unknown names stay literal. Self- and mutually-referential
/// variables terminate at the depth limit with the reference text intact,
/// never an error or an infinite loop.
pub fn resolve_with<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut current = text.to_string();
    for _ in 0..MAX_DEPTH {
        let (next, replaced) = expand_once(&current, &lookup);
        if !replaced {
            return next;
        }
        current = next;
    }
    current
}

/// Resolve `text` against both environment tiers, selected first.
pub fn resolve_template(text: &str, envs: &Environments) -> String {
    resolve_with(text, |key| {
        envs.find(key).map(|v| v.current_value.clone())
    })
}

/// One substitution pass. Returns the rewritten text and whether any
/// reference was replaced.
fn expand_once<F>(text: &str, lookup: &F) -> (String, bool)
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut replaced = false;

    while let Some(start) = rest.find("<<") {
        match rest[start + 2..].find(">>") {
            Some(len) => {
                let name = &rest[start + 2..start + 2 + len];
                out.push_str(&rest[..start]);
                match lookup(name) {
                    Some(value) => {
                        out.push_str(&value);
                        replaced = true;
                    }
                    None => {
                        out.push_str("<<");
                        out.push_str(name);
                        out.push_str(">>");
                    }
                }
                rest = &rest[start + 2 + len + 2..];
            }
            // Unterminated reference, keep the tail verbatim
            None => {
                out.push_str(rest);
                return (out, replaced);
            }
        }
    }

    out.push_str(rest);
    (out, replaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentVariable;

    fn envs(selected: &[(&str, &str)], global: &[(&str, &str)]) -> Environments {
        Environments {
            selected: selected
                .iter()
                .map(|(k, v)| EnvironmentVariable::new(*k, *v))
                .collect(),
            global: global
                .iter()
                .map(|(k, v)| EnvironmentVariable::new(*k, *v))
                .collect(),
        }
    }

    #[test]
    fn substitutes_simple_reference() {
        let e = envs(&[("host", "api.example.com")], &[]);
        assert_eq!(
            resolve_template("https://<<host>>/v1", &e),
            "https://api.example.com/v1"
        );
    }

    #[test]
    fn unknown_names_stay_literal() {
        let e = envs(&[], &[]);
        assert_eq!(resolve_template("<<missing>>/x", &e), "<<missing>>/x");
    }

    #[test]
    fn nested_references_resolve() {
        let e = envs(&[("url", "https://<<host>>"), ("host", "a.example")], &[]);
        assert_eq!(resolve_template("<<url>>/v1", &e), "https://a.example/v1");
    }

    #[test]
    fn selected_wins_over_global() {
        let e = envs(&[("host", "sel")], &[("host", "glob")]);
        assert_eq!(resolve_template("<<host>>", &e), "sel");
    }

    #[test]
    fn self_reference_terminates_with_literal() {
        let e = envs(&[("a", "<<a>>")], &[]);
        assert_eq!(resolve_template("<<a>>", &e), "<<a>>");
    }

    #[test]
    fn mutual_reference_terminates() {
        let e = envs(&[("a", "<<b>>"), ("b", "<<a>>")], &[]);
        let out = resolve_template("<<a>>", &e);
        assert!(out == "<<a>>" || out == "<<b>>", "got {out}");
    }

    #[test]
    fn unterminated_reference_kept_verbatim() {
        let e = envs(&[("a", "1")], &[]);
        assert_eq!(resolve_template("<<a>> and <<oops", &e), "1 and <<oops");
    }
}
