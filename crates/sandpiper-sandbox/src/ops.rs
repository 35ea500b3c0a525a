//! deno_core op definitions for the sandpiper sandbox.
//!
//! The `#[op2]` macro generates additional public items (v8 function
//! pointers, metadata structs) that cannot carry doc comments. We suppress
//! `missing_docs` at the module level — all actual functions and types are
//! documented below.
#![allow(missing_docs)]

use deno_core::op2;
use deno_core::OpState;
use deno_error::JsErrorBox;
use sandpiper_data::{ExpectResult, RequestData};
use serde_json::Value;

use crate::env_store::{EnvScope, EnvStore};
use crate::expect::{ExpectEngine, ExpectPayload};
use crate::test_tree::TestStack;

/// Per-run script state, stored in OpState. All adapters share it, which
/// is what keeps the three namespaces mutually consistent.
pub struct ScriptState {
    /// The two-tier environment store.
    pub env: EnvStore,
    /// The test tree under construction.
    pub tests: TestStack,
    /// Assertion evaluation state.
    pub expect: ExpectEngine,
    /// The request object, mutable in pre-request runs.
    pub request: RequestData,
}

/// Top-level script failure captured by the bootstrap's outer catch.
pub struct ScriptFailure(pub String);

/// Log a console message from sandbox code.
#[op2(fast)]
pub fn op_console_log(#[string] level: &str, #[string] msg: &str) {
    match level {
        "error" => tracing::error!(target: "sandpiper::sandbox::js", "{}", msg),
        "warn" => tracing::warn!(target: "sandpiper::sandbox::js", "{}", msg),
        "debug" => tracing::debug!(target: "sandpiper::sandbox::js", "{}", msg),
        _ => tracing::info!(target: "sandpiper::sandbox::js", "{}", msg),
    }
}

/// Record an uncontained script error for the host to pick up.
#[op2(fast)]
pub fn op_script_error(state: &mut OpState, #[string] message: &str) {
    state.put(ScriptFailure(message.to_string()));
}

#[op2]
#[string]
pub fn op_env_get(
    state: &mut OpState,
    #[string] key: &str,
    #[string] source: &str,
) -> Option<String> {
    let st = state.borrow::<ScriptState>();
    st.env.get(key, EnvScope::parse(source))
}

#[op2]
#[string]
pub fn op_env_get_resolve(
    state: &mut OpState,
    #[string] key: &str,
    #[string] source: &str,
) -> Option<String> {
    let st = state.borrow::<ScriptState>();
    st.env.get_resolve(key, EnvScope::parse(source))
}

#[op2]
#[string]
pub fn op_env_get_initial_raw(
    state: &mut OpState,
    #[string] key: &str,
    #[string] source: &str,
) -> Option<String> {
    let st = state.borrow::<ScriptState>();
    st.env.get_initial_raw(key, EnvScope::parse(source))
}

#[op2(fast)]
pub fn op_env_has(state: &mut OpState, #[string] key: &str, #[string] source: &str) -> bool {
    let st = state.borrow::<ScriptState>();
    st.env.has(key, EnvScope::parse(source))
}

#[op2(fast)]
pub fn op_env_set(
    state: &mut OpState,
    #[string] key: &str,
    #[string] value: &str,
    #[string] source: &str,
) {
    let st = state.borrow_mut::<ScriptState>();
    st.env.set(key, value, EnvScope::parse(source));
}

#[op2(fast)]
pub fn op_env_set_initial(
    state: &mut OpState,
    #[string] key: &str,
    #[string] value: &str,
    #[string] source: &str,
) {
    let st = state.borrow_mut::<ScriptState>();
    st.env.set_initial(key, value, EnvScope::parse(source));
}

#[op2(fast)]
pub fn op_env_unset(state: &mut OpState, #[string] key: &str, #[string] source: &str) {
    let st = state.borrow_mut::<ScriptState>();
    st.env.unset(key, EnvScope::parse(source));
}

#[op2(fast)]
pub fn op_env_reset(state: &mut OpState, #[string] key: &str, #[string] source: &str) {
    let st = state.borrow_mut::<ScriptState>();
    st.env.reset(key, EnvScope::parse(source));
}

#[op2(fast)]
pub fn op_env_clear(state: &mut OpState, #[string] source: &str) {
    let st = state.borrow_mut::<ScriptState>();
    st.env.clear(EnvScope::parse(source));
}

#[op2]
#[string]
pub fn op_env_resolve(state: &mut OpState, #[string] text: &str) -> String {
    let st = state.borrow::<ScriptState>();
    st.env.resolve(text)
}

#[op2]
#[string]
pub fn op_env_replace_in(
    state: &mut OpState,
    #[string] text: &str,
    #[string] source: &str,
) -> String {
    let st = state.borrow::<ScriptState>();
    st.env.replace_in(text, EnvScope::parse(source))
}

/// Scoped variables as a JSON object, selected winning on collisions.
#[op2]
#[string]
pub fn op_env_to_object(
    state: &mut OpState,
    #[string] source: &str,
) -> Result<String, JsErrorBox> {
    let st = state.borrow::<ScriptState>();
    serde_json::to_string(&st.env.to_object(EnvScope::parse(source)))
        .map_err(|e| JsErrorBox::generic(format!("environment serialization failed: {e}")))
}

/// Open a test block.
#[op2(fast)]
pub fn op_test_enter(state: &mut OpState, #[string] descriptor: &str) {
    let st = state.borrow_mut::<ScriptState>();
    st.tests.enter(descriptor);
}

/// Close the innermost test block.
#[op2(fast)]
pub fn op_test_exit(state: &mut OpState) -> Result<(), JsErrorBox> {
    let st = state.borrow_mut::<ScriptState>();
    st.tests
        .exit()
        .map_err(|e| JsErrorBox::generic(e.to_string()))
}

/// Record an error thrown inside a test body. The error is contained: it
/// becomes part of the block's results and the run continues.
#[op2(fast)]
pub fn op_test_errored(state: &mut OpState, #[string] message: &str) -> Result<(), JsErrorBox> {
    let st = state.borrow_mut::<ScriptState>();
    st.tests
        .record(ExpectResult::error(message))
        .map_err(|e| JsErrorBox::generic(e.to_string()))
}

/// Evaluate one assertion payload.
///
/// Recording with no open test block is an error — thrown into the script,
/// which (outside any `test` body) surfaces as a top-level script error.
#[op2(fast)]
pub fn op_expect(state: &mut OpState, #[string] payload_json: &str) -> Result<(), JsErrorBox> {
    let payload: ExpectPayload = serde_json::from_str(payload_json)
        .map_err(|e| JsErrorBox::generic(format!("malformed assertion payload: {e}")))?;
    let st = state.borrow_mut::<ScriptState>();
    let ScriptState { tests, expect, .. } = st;
    expect
        .apply(tests, payload)
        .map_err(|e| JsErrorBox::generic(e.to_string()))
}

/// The request object as JSON, for the adapters' read-only getters.
#[op2]
#[string]
pub fn op_request_get(state: &mut OpState) -> Result<String, JsErrorBox> {
    let st = state.borrow::<ScriptState>();
    serde_json::to_string(&st.request)
        .map_err(|e| JsErrorBox::generic(format!("request serialization failed: {e}")))
}

/// Apply a pre-request mutation to one request field.
#[op2(fast)]
pub fn op_request_set(
    state: &mut OpState,
    #[string] field: &str,
    #[string] value_json: &str,
) -> Result<(), JsErrorBox> {
    let value: Value = serde_json::from_str(value_json)
        .map_err(|e| JsErrorBox::generic(format!("malformed request field: {e}")))?;
    let st = state.borrow_mut::<ScriptState>();

    let type_err = |want: &str| JsErrorBox::generic(format!("Expected {field} to be {want}"));

    match field {
        "url" => {
            st.request.url = value.as_str().ok_or_else(|| type_err("a string"))?.to_string();
        }
        "method" => {
            st.request.method = value.as_str().ok_or_else(|| type_err("a string"))?.to_string();
        }
        "params" => {
            st.request.params =
                serde_json::from_value(value).map_err(|_| type_err("a key/value list"))?;
        }
        "headers" => {
            st.request.headers =
                serde_json::from_value(value).map_err(|_| type_err("a key/value list"))?;
        }
        "body" => st.request.body = value,
        "auth" => st.request.auth = value,
        other => {
            return Err(JsErrorBox::generic(format!(
                "unknown request field: '{other}'"
            )));
        }
    }
    Ok(())
}

deno_core::extension!(
    sandpiper_ext,
    ops = [
        op_console_log,
        op_script_error,
        op_env_get,
        op_env_get_resolve,
        op_env_get_initial_raw,
        op_env_has,
        op_env_set,
        op_env_set_initial,
        op_env_unset,
        op_env_reset,
        op_env_clear,
        op_env_resolve,
        op_env_replace_in,
        op_env_to_object,
        op_test_enter,
        op_test_exit,
        op_test_errored,
        op_expect,
        op_request_get,
        op_request_set,
    ],
);
