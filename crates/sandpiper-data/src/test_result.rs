//! Test descriptors and expectation results.

use serde::{Deserialize, Serialize};

use crate::environment::Environments;
use crate::request::RequestData;

/// Outcome of a single expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectStatus {
    /// The assertion held.
    Pass,
    /// The assertion was evaluated and did not hold.
    Fail,
    /// The assertion could not be evaluated (bad argument, wrong type).
    Error,
}

/// One recorded expectation: a status plus its human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectResult {
    /// Pass, fail, or error.
    pub status: ExpectStatus,
    /// Message describing what was expected and what was seen.
    pub message: String,
}

impl ExpectResult {
    /// A passing result.
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            status: ExpectStatus::Pass,
            message: message.into(),
        }
    }

    /// A failing result.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: ExpectStatus::Fail,
            message: message.into(),
        }
    }

    /// An unevaluable result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ExpectStatus::Error,
            message: message.into(),
        }
    }
}

/// A node in the hierarchical test tree.
///
/// `descriptor` is the name passed to `test(name, fn)`. Nested `test`
/// calls become `children`; expectations recorded while this node is the
/// innermost open block land in `expect_results`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDescriptor {
    /// The test block's name.
    pub descriptor: String,
    /// Expectations recorded directly in this block.
    pub expect_results: Vec<ExpectResult>,
    /// Nested test blocks, in execution order.
    pub children: Vec<TestDescriptor>,
}

impl TestDescriptor {
    /// A fresh, empty descriptor.
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            expect_results: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// The harvested outcome of a post-request script run.
///
/// `tests` holds the root's children only — the synthetic root descriptor
/// itself never leaves the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Environments as mutated by the script, marker-converted.
    pub envs: Environments,
    /// Top-level test blocks.
    pub tests: Vec<TestDescriptor>,
}

/// The harvested outcome of a pre-request script run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreRequestResult {
    /// Environments as mutated by the script, marker-converted.
    pub updated_envs: Environments,
    /// The request object as mutated by the script.
    pub updated_request: RequestData,
}
