#![warn(missing_docs)]

//! # sandpiper-sandbox
//!
//! V8 sandbox for Sandpiper request scripts.
//!
//! Executes user-written pre-request and post-request (test) scripts in a
//! deno_core isolate with no filesystem, network, or environment access.
//! The only bridge to the host is the registered ops behind the script
//! namespaces (`pw`, `hopp`, `pm`), which all drive one shared per-run
//! state so the three surfaces stay mutually consistent.
//!
//! ## Security model
//!
//! - **V8 isolate**: Same process-level isolation as Chrome tabs
//! - **No ambient capabilities**: No fs, net, env, or child_process access
//! - **Fresh runtime per call**: No state leakage between executions
//! - **Pre-execution validation**: Banned patterns caught before reaching V8
//! - **Timeout enforcement**: Execution killed after configurable deadline
//! - **Heap limits**: Runaway allocation terminates the run
//! - **Hardened globals**: `Deno`, `eval`, and the `Function` constructors
//!   are removed before user code runs

pub mod env_store;
pub mod error;
pub mod executor;
pub mod expect;
pub mod marshal;
pub mod ops;
pub mod test_tree;
pub mod validator;

pub use error::SandboxError;
pub use executor::{CancelHandle, SandboxConfig, SandboxExecutor};
