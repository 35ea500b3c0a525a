//! Error types for the sandpiper sandbox.

use thiserror::Error;

/// Errors that can abort a script run.
///
/// Only these cross the host boundary as `Err`. Assertion failures and
/// assertion argument errors never appear here — they are captured inside
/// the returned test tree, and a script error contained by a `test` block
/// does not fail the run at all.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Script failed validation checks.
    #[error("script validation failed: {reason}")]
    ValidationFailed {
        /// What went wrong.
        reason: String,
    },

    /// Script exceeds the configured maximum size.
    #[error("script exceeds maximum size of {max} bytes (got {actual})")]
    CodeTooLarge {
        /// Maximum allowed size.
        max: usize,
        /// Actual size.
        actual: usize,
    },

    /// The script uses a construct request scripts are not allowed.
    #[error("line {line}: `{pattern}` is not available to request scripts ({reason})")]
    BannedPattern {
        /// The offending source text.
        pattern: String,
        /// 1-based line the construct appeared on.
        line: usize,
        /// Why the construct is rejected.
        reason: &'static str,
    },

    /// The script source failed to parse.
    #[error("script compilation failed: {message}")]
    CompileError {
        /// The parse error from V8.
        message: String,
    },

    /// An uncontained JavaScript error was thrown at the top level.
    #[error("script error: {message}")]
    JsError {
        /// The error message from JavaScript.
        message: String,
    },

    /// Execution timed out (async event loop or CPU-bound watchdog).
    #[error("execution timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// V8 heap memory limit was exceeded.
    #[error("V8 heap limit exceeded")]
    HeapLimitExceeded,

    /// The run was cancelled from outside before it completed.
    #[error("execution aborted by caller")]
    Aborted,

    /// Too many concurrent sandbox executions.
    #[error("concurrency limit reached (max {max} concurrent executions)")]
    ConcurrencyLimit {
        /// Maximum allowed concurrent executions.
        max: usize,
    },

    /// Generic execution failure.
    #[error("sandbox execution failed: {0}")]
    Execution(#[from] anyhow::Error),

    /// Result serialization failed.
    #[error("result serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
