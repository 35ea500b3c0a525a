//! Pre-execution screening of request scripts.
//!
//! The V8 isolate is the real security boundary; the bootstrap already
//! removes `eval`, the `Function` constructors, and the runtime object
//! before user code runs. Screening here exists so a script author gets a
//! source-located explanation instead of an opaque failure deep inside the
//! hardened runtime.

use crate::error::SandboxError;

/// Maximum script size in bytes (64 KB).
const DEFAULT_MAX_CODE_SIZE: usize = 64 * 1024;

/// A class of rejected constructs and the reason reported for it.
struct BannedClass {
    reason: &'static str,
    needles: &'static [&'static str],
}

/// Constructs rejected before a script reaches V8, grouped by the reason
/// the author sees. Substring matching, same trade-off as the runtime
/// hardening it mirrors: cheap, and the isolate backstops any miss.
const BANNED_CLASSES: &[BannedClass] = &[
    BannedClass {
        reason: "dynamic code generation is disabled in the sandbox",
        needles: &["eval(", "Function(", "String.fromCharCode"],
    },
    BannedClass {
        reason: "request scripts cannot load modules",
        needles: &["import(", "require("],
    },
    BannedClass {
        reason: "the host runtime is removed before scripts run",
        needles: &[
            "Deno.",
            "process.env",
            "process.exit",
            "process.argv",
            "process.stdin",
            "process.stdout",
            "process.stderr",
            "process.kill",
            "process.binding",
        ],
    },
    BannedClass {
        reason: "prototype and reflection access is restricted",
        needles: &[
            "__proto__",
            "constructor[",
            "constructor.constructor",
            "Reflect.",
            "globalThis[",
        ],
    },
];

/// Screen a request script before sandbox execution: size cap, empty
/// check, then a line-by-line scan of the banned construct classes.
pub fn validate_code(code: &str, max_size: Option<usize>) -> Result<(), SandboxError> {
    let max = max_size.unwrap_or(DEFAULT_MAX_CODE_SIZE);

    if code.len() > max {
        return Err(SandboxError::CodeTooLarge {
            max,
            actual: code.len(),
        });
    }

    if code.trim().is_empty() {
        return Err(SandboxError::ValidationFailed {
            reason: "script is empty".into(),
        });
    }

    for (idx, line) in code.lines().enumerate() {
        for class in BANNED_CLASSES {
            if let Some(needle) = class.needles.iter().find(|n| line.contains(**n)) {
                return Err(SandboxError::BannedPattern {
                    pattern: (*needle).to_string(),
                    line: idx + 1,
                    reason: class.reason,
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_env_script() {
        let code = r#"pw.env.set("token", "abc"); pw.env.get("token");"#;
        assert!(validate_code(code, None).is_ok());
    }

    #[test]
    fn rejects_empty_script() {
        assert!(validate_code("", None).is_err());
        assert!(validate_code("   \n\t", None).is_err());
    }

    #[test]
    fn rejects_oversized_script() {
        let big = "x".repeat(100_000);
        let err = validate_code(&big, None).unwrap_err();
        assert!(matches!(err, SandboxError::CodeTooLarge { .. }));
    }

    #[test]
    fn locates_the_offending_line() {
        let code = "pw.env.set(\"a\", \"1\");\nconst x = eval(\"1+1\");\n";
        match validate_code(code, None).unwrap_err() {
            SandboxError::BannedPattern { pattern, line, .. } => {
                assert_eq!(pattern, "eval(");
                assert_eq!(line, 2);
            }
            other => panic!("expected BannedPattern, got {other:?}"),
        }
    }

    #[test]
    fn reason_names_the_construct_class() {
        let err = validate_code(r#"Deno.readFile("/etc/passwd")"#, None).unwrap_err();
        match err {
            SandboxError::BannedPattern { reason, .. } => {
                assert!(reason.contains("host runtime"), "{reason}");
            }
            other => panic!("expected BannedPattern, got {other:?}"),
        }
    }

    #[test]
    fn rejects_constructor_bypass() {
        let err =
            validate_code(r#""".constructor.constructor("return this")()"#, None).unwrap_err();
        assert!(matches!(err, SandboxError::BannedPattern { .. }));
    }

    #[test]
    fn accepts_process_as_data_field() {
        // "process." as a substring is fine; only process.env/exit/... are banned
        assert!(validate_code("const s = data.process.status;", None).is_ok());
    }

    #[test]
    fn rejects_process_env() {
        let err = validate_code("const t = process.env.SECRET;", None).unwrap_err();
        assert!(matches!(err, SandboxError::BannedPattern { .. }));
    }

    #[test]
    fn rejects_module_loading() {
        let err = validate_code(r#"const fs = require("fs");"#, None).unwrap_err();
        match err {
            SandboxError::BannedPattern { reason, .. } => {
                assert!(reason.contains("modules"), "{reason}");
            }
            other => panic!("expected BannedPattern, got {other:?}"),
        }
    }

    #[test]
    fn custom_max_size() {
        let code = "x".repeat(100);
        assert!(validate_code(&code, Some(50)).is_err());
        assert!(validate_code(&code, Some(200)).is_ok());
    }
}
