//! The expectation engine.
//!
//! Adapters never write to the test tree directly. Each assertion call in
//! the sandbox serializes a payload — the subject's display string plus
//! whatever facts only the isolate can see (`typeof`, strict-equality
//! outcomes, side-effect deltas) — and the engine turns it into exactly one
//! recorded [`ExpectResult`].
//!
//! Two message families exist on purpose. The legacy/target predicates
//! (`toBe`, `toBeLevel2xx`, ...) use the quoted `Expected '<v>' to be '<e>'`
//! wording; the compat chain (`pm.expect(...).to...`) uses the chai-style
//! wording with a modifiers string accumulated from the language chain.

use sandpiper_data::ExpectResult;
use serde::Deserialize;
use serde_json::Value;

use crate::test_tree::{TestStack, TestTreeError};

/// Accepted arguments for the runtime-type predicate.
const TYPE_NAMES: &[&str] = &[
    "string",
    "boolean",
    "number",
    "object",
    "undefined",
    "bigint",
    "symbol",
    "function",
];

/// Tolerance for delta comparisons in `.by(n)` refinements.
const DELTA_EPSILON: f64 = 0.0001;

/// One assertion, as serialized by the bootstrap code.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpectPayload {
    /// Strict equality. `eq` is the isolate-side `===` outcome, so object
    /// identity semantics survive serialization.
    ToBe {
        negated: bool,
        eq: bool,
        value: String,
        expected: String,
    },
    /// Status-class check. `parsed` is the isolate's `parseInt` result.
    ToBeLevel {
        negated: bool,
        level: String,
        parsed: Option<i64>,
        value: String,
    },
    /// Runtime type check. `expected_type` is `None` when the argument was
    /// not a string at all.
    ToBeType {
        negated: bool,
        value: String,
        value_type: String,
        expected_type: Option<String>,
    },
    /// Length check over arrays and strings.
    ToHaveLength {
        negated: bool,
        applicable: bool,
        length: Option<f64>,
        expected: Option<f64>,
    },
    /// Containment check over arrays and strings.
    ToInclude {
        negated: bool,
        applicable: bool,
        needle_null: bool,
        needle_undefined: bool,
        included: bool,
        value: String,
        needle: String,
    },
    /// Regular-expression match, evaluated host-side.
    ChaiMatch {
        negated: bool,
        value: String,
        source: String,
        flags: String,
    },
    /// Order-independent member-set equality over arrays.
    ChaiMembers {
        negated: bool,
        value: Value,
        members: Value,
        value_display: String,
        members_display: String,
        mods: String,
    },
    /// Membership of a value in a list.
    ChaiOneOf {
        negated: bool,
        value: Value,
        list: Value,
        value_display: String,
        list_display: String,
        mods: String,
    },
    /// Side-effect assertion over a zero-argument function: the isolate
    /// reads the property, invokes the function, reads it again.
    ChaiDelta {
        family: DeltaFamily,
        negated: bool,
        before: f64,
        after: f64,
        prop: String,
        mods: String,
    },
    /// `.by(n)` refinement of the previous delta assertion.
    ChaiBy { delta: f64 },
    /// Any compat-chain assertion whose outcome the isolate computed
    /// directly (equality, comparisons, truthiness, response helpers).
    ChaiSimple {
        negated: bool,
        pass: bool,
        value: String,
        mods: String,
        assertion: String,
        args: Vec<String>,
    },
    /// Explicit unconditional failure (`expect.fail`).
    Fail { message: String },
}

/// Which delta predicate a [`ExpectPayload::ChaiDelta`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaFamily {
    Change,
    Increase,
    Decrease,
}

impl DeltaFamily {
    fn word(self) -> &'static str {
        match self {
            Self::Change => "change",
            Self::Increase => "increase",
            Self::Decrease => "decrease",
        }
    }

    fn holds(self, before: f64, after: f64) -> bool {
        match self {
            Self::Change => before != after,
            Self::Increase => after > before,
            Self::Decrease => after < before,
        }
    }

    fn delta_matches(self, before: f64, after: f64, delta: f64) -> bool {
        let moved = after - before;
        let diff = match self {
            Self::Change => (moved.abs() - delta.abs()).abs(),
            Self::Increase => (moved - delta).abs(),
            Self::Decrease => ((before - after).abs() - delta).abs(),
        };
        diff < DELTA_EPSILON
    }
}

/// Context kept so `.by(n)` can rewrite the result just recorded.
#[derive(Debug, Clone)]
struct DeltaContext {
    family: DeltaFamily,
    negated: bool,
    before: f64,
    after: f64,
    prop: String,
    mods: String,
}

/// Per-run assertion state. Owns nothing but the `.by` context; results
/// land in the caller's [`TestStack`].
#[derive(Debug, Default)]
pub struct ExpectEngine {
    last_delta: Option<DeltaContext>,
}

fn not_str(negated: bool) -> &'static str {
    if negated {
        " not"
    } else {
        ""
    }
}

fn verdict(pass: bool, negated: bool) -> bool {
    if negated {
        !pass
    } else {
        pass
    }
}

fn pass_or_fail(holds: bool, message: String) -> ExpectResult {
    if holds {
        ExpectResult::pass(message)
    } else {
        ExpectResult::fail(message)
    }
}

impl ExpectEngine {
    /// Evaluate one payload and record (or amend) a result on the stack.
    pub fn apply(
        &mut self,
        stack: &mut TestStack,
        payload: ExpectPayload,
    ) -> Result<(), TestTreeError> {
        // `.by` rewrites in place; everything else records a fresh result.
        if let ExpectPayload::ChaiBy { delta } = payload {
            return stack.amend_last(self.refine_by(delta));
        }

        let result = self.evaluate(payload);
        stack.record(result)
    }

    fn evaluate(&mut self, payload: ExpectPayload) -> ExpectResult {
        match payload {
            ExpectPayload::ToBe {
                negated,
                eq,
                value,
                expected,
            } => pass_or_fail(
                verdict(eq, negated),
                format!("Expected '{value}' to{} be '{expected}'", not_str(negated)),
            ),

            ExpectPayload::ToBeLevel {
                negated,
                level,
                parsed,
                value,
            } => self.level_check(negated, &level, parsed, &value),

            ExpectPayload::ToBeType {
                negated,
                value,
                value_type,
                expected_type,
            } => match expected_type.as_deref() {
                Some(expected) if TYPE_NAMES.contains(&expected) => pass_or_fail(
                    verdict(value_type == expected, negated),
                    format!(
                        "Expected '{value}' to{} be type '{expected}'",
                        not_str(negated)
                    ),
                ),
                _ => ExpectResult::error(
                    "Argument for toBeType should be \"string\", \"boolean\", \"number\", \
                     \"object\", \"undefined\", \"bigint\", \"symbol\" or \"function\"",
                ),
            },

            ExpectPayload::ToHaveLength {
                negated,
                applicable,
                length,
                expected,
            } => {
                if !applicable {
                    return ExpectResult::error(
                        "Expected toHaveLength to be called for an array or string",
                    );
                }
                match expected {
                    Some(expected) => pass_or_fail(
                        verdict(length == Some(expected), negated),
                        format!(
                            "Expected the array to{} be of length '{expected}'",
                            not_str(negated)
                        ),
                    ),
                    None => ExpectResult::error("Argument for toHaveLength should be a number"),
                }
            }

            ExpectPayload::ToInclude {
                negated,
                applicable,
                needle_null,
                needle_undefined,
                included,
                value,
                needle,
            } => {
                if !applicable {
                    return ExpectResult::error(
                        "Expected toInclude to be called for an array or string",
                    );
                }
                if needle_null {
                    return ExpectResult::error("Argument for toInclude should not be null");
                }
                if needle_undefined {
                    return ExpectResult::error("Argument for toInclude should not be undefined");
                }
                pass_or_fail(
                    verdict(included, negated),
                    format!("Expected {value} to{} include {needle}", not_str(negated)),
                )
            }

            ExpectPayload::ChaiMatch {
                negated,
                value,
                source,
                flags,
            } => self.regex_check(negated, &value, &source, &flags),

            ExpectPayload::ChaiMembers {
                negated,
                value,
                members,
                value_display,
                members_display,
                mods,
            } => pass_or_fail(
                verdict(multiset_equal(&value, &members), negated),
                format!("Expected {value_display}{mods} members {members_display}"),
            ),

            ExpectPayload::ChaiOneOf {
                negated,
                value,
                list,
                value_display,
                list_display,
                mods,
            } => {
                let held = list
                    .as_array()
                    .map(|items| items.contains(&value))
                    .unwrap_or(false);
                pass_or_fail(
                    verdict(held, negated),
                    format!("Expected {value_display}{mods} oneOf {list_display}"),
                )
            }

            ExpectPayload::ChaiDelta {
                family,
                negated,
                before,
                after,
                prop,
                mods,
            } => {
                let message = format!(
                    "Expected [Function]{mods} {} {{}}.'{prop}'",
                    family.word()
                );
                self.last_delta = Some(DeltaContext {
                    family,
                    negated,
                    before,
                    after,
                    prop,
                    mods,
                });
                pass_or_fail(verdict(family.holds(before, after), negated), message)
            }

            // handled in apply()
            ExpectPayload::ChaiBy { delta } => self.refine_by(delta),

            ExpectPayload::ChaiSimple {
                negated,
                pass,
                value,
                mods,
                assertion,
                args,
            } => {
                let mut message = format!("Expected {value}{mods} {assertion}");
                if !args.is_empty() {
                    message.push(' ');
                    message.push_str(&args.join(", "));
                }
                pass_or_fail(verdict(pass, negated), message)
            }

            ExpectPayload::Fail { message } => ExpectResult::fail(message),
        }
    }

    fn level_check(
        &self,
        negated: bool,
        level: &str,
        parsed: Option<i64>,
        value: &str,
    ) -> ExpectResult {
        let start: i64 = level.parse().unwrap_or(0);
        match parsed {
            Some(n) => pass_or_fail(
                verdict(n >= start && n <= start + 99, negated),
                format!("Expected '{n}' to{} be {level}-level status", not_str(negated)),
            ),
            None => ExpectResult::error(format!(
                "Expected {level}-level status but could not parse value '{value}'"
            )),
        }
    }

    fn regex_check(&self, negated: bool, value: &str, source: &str, flags: &str) -> ExpectResult {
        let pattern = format!("/{source}/{flags}");
        let regex = regex::RegexBuilder::new(source)
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .build();
        match regex {
            Ok(re) => pass_or_fail(
                verdict(re.is_match(value), negated),
                format!("Expected '{value}' to{} match {pattern}", not_str(negated)),
            ),
            Err(_) => ExpectResult::error(format!("Invalid regular expression: {pattern}")),
        }
    }

    fn refine_by(&mut self, delta: f64) -> ExpectResult {
        match self.last_delta.take() {
            Some(ctx) => {
                let held = ctx.family.holds(ctx.before, ctx.after)
                    && ctx.family.delta_matches(ctx.before, ctx.after, delta);
                pass_or_fail(
                    verdict(held, ctx.negated),
                    format!(
                        "Expected [Function]{} {} {{}}.'{}' by {delta}",
                        ctx.mods,
                        ctx.family.word(),
                        ctx.prop
                    ),
                )
            }
            None => ExpectResult::error("by() called without a preceding change assertion"),
        }
    }
}

/// Order-independent equality of two JSON arrays, duplicates counted.
fn multiset_equal(a: &Value, b: &Value) -> bool {
    let (Some(a), Some(b)) = (a.as_array(), b.as_array()) else {
        return false;
    };
    if a.len() != b.len() {
        return false;
    }
    let mut remaining: Vec<&Value> = b.iter().collect();
    for item in a {
        match remaining.iter().position(|candidate| *candidate == item) {
            Some(i) => {
                remaining.swap_remove(i);
            }
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandpiper_data::ExpectStatus;

    fn run(payloads: Vec<ExpectPayload>) -> Vec<ExpectResult> {
        let mut engine = ExpectEngine::default();
        let mut stack = TestStack::new();
        stack.enter("t");
        for p in payloads {
            engine.apply(&mut stack, p).unwrap();
        }
        stack.exit().unwrap();
        stack.finish().remove(0).expect_results
    }

    #[test]
    fn to_be_formats_pass_and_fail() {
        let results = run(vec![
            ExpectPayload::ToBe {
                negated: false,
                eq: true,
                value: "1".into(),
                expected: "1".into(),
            },
            ExpectPayload::ToBe {
                negated: true,
                eq: true,
                value: "1".into(),
                expected: "1".into(),
            },
        ]);
        assert_eq!(results[0].status, ExpectStatus::Pass);
        assert_eq!(results[0].message, "Expected '1' to be '1'");
        assert_eq!(results[1].status, ExpectStatus::Fail);
        assert_eq!(results[1].message, "Expected '1' to not be '1'");
    }

    #[test]
    fn level_check_ranges_and_parse_errors() {
        let results = run(vec![
            ExpectPayload::ToBeLevel {
                negated: false,
                level: "200".into(),
                parsed: Some(204),
                value: "204".into(),
            },
            ExpectPayload::ToBeLevel {
                negated: false,
                level: "400".into(),
                parsed: Some(500),
                value: "500".into(),
            },
            ExpectPayload::ToBeLevel {
                negated: false,
                level: "200".into(),
                parsed: None,
                value: "unavailable".into(),
            },
        ]);
        assert_eq!(results[0].status, ExpectStatus::Pass);
        assert_eq!(results[0].message, "Expected '204' to be 200-level status");
        assert_eq!(results[1].status, ExpectStatus::Fail);
        assert_eq!(results[2].status, ExpectStatus::Error);
        assert_eq!(
            results[2].message,
            "Expected 200-level status but could not parse value 'unavailable'"
        );
    }

    #[test]
    fn type_check_rejects_unknown_names() {
        let results = run(vec![
            ExpectPayload::ToBeType {
                negated: false,
                value: "abc".into(),
                value_type: "string".into(),
                expected_type: Some("string".into()),
            },
            ExpectPayload::ToBeType {
                negated: false,
                value: "abc".into(),
                value_type: "string".into(),
                expected_type: Some("str".into()),
            },
            ExpectPayload::ToBeType {
                negated: false,
                value: "abc".into(),
                value_type: "string".into(),
                expected_type: None,
            },
        ]);
        assert_eq!(results[0].status, ExpectStatus::Pass);
        assert_eq!(results[0].message, "Expected 'abc' to be type 'string'");
        assert_eq!(results[1].status, ExpectStatus::Error);
        assert!(results[1].message.starts_with("Argument for toBeType"));
        assert_eq!(results[2].status, ExpectStatus::Error);
    }

    #[test]
    fn length_check_argument_errors() {
        let results = run(vec![
            ExpectPayload::ToHaveLength {
                negated: false,
                applicable: true,
                length: Some(3.0),
                expected: Some(3.0),
            },
            ExpectPayload::ToHaveLength {
                negated: false,
                applicable: false,
                length: None,
                expected: Some(3.0),
            },
            ExpectPayload::ToHaveLength {
                negated: false,
                applicable: true,
                length: Some(3.0),
                expected: None,
            },
        ]);
        assert_eq!(results[0].status, ExpectStatus::Pass);
        assert_eq!(results[0].message, "Expected the array to be of length '3'");
        assert_eq!(
            results[1].message,
            "Expected toHaveLength to be called for an array or string"
        );
        assert_eq!(
            results[2].message,
            "Argument for toHaveLength should be a number"
        );
    }

    #[test]
    fn include_renders_json_operands() {
        let results = run(vec![ExpectPayload::ToInclude {
            negated: true,
            applicable: true,
            needle_null: false,
            needle_undefined: false,
            included: false,
            value: "[1,2]".into(),
            needle: "3".into(),
        }]);
        assert_eq!(results[0].status, ExpectStatus::Pass);
        assert_eq!(results[0].message, "Expected [1,2] to not include 3");
    }

    #[test]
    fn include_rejects_null_needle() {
        let results = run(vec![ExpectPayload::ToInclude {
            negated: false,
            applicable: true,
            needle_null: true,
            needle_undefined: false,
            included: false,
            value: "[1]".into(),
            needle: "null".into(),
        }]);
        assert_eq!(results[0].status, ExpectStatus::Error);
        assert_eq!(results[0].message, "Argument for toInclude should not be null");
    }

    #[test]
    fn regex_match_evaluates_host_side() {
        let results = run(vec![
            ExpectPayload::ChaiMatch {
                negated: false,
                value: "Hello World".into(),
                source: "hello".into(),
                flags: "i".into(),
            },
            ExpectPayload::ChaiMatch {
                negated: false,
                value: "abc".into(),
                source: "^z".into(),
                flags: String::new(),
            },
        ]);
        assert_eq!(results[0].status, ExpectStatus::Pass);
        assert_eq!(
            results[0].message,
            "Expected 'Hello World' to match /hello/i"
        );
        assert_eq!(results[1].status, ExpectStatus::Fail);
    }

    #[test]
    fn members_ignore_order_but_count_duplicates() {
        let make = |value: Value, members: Value| ExpectPayload::ChaiMembers {
            negated: false,
            value,
            members,
            value_display: "[...]".into(),
            members_display: "[...]".into(),
            mods: " to have".into(),
        };
        let results = run(vec![
            make(serde_json::json!([1, 2, 3]), serde_json::json!([3, 1, 2])),
            make(serde_json::json!([1, 1, 2]), serde_json::json!([1, 2, 2])),
        ]);
        assert_eq!(results[0].status, ExpectStatus::Pass);
        assert_eq!(results[1].status, ExpectStatus::Fail);
    }

    #[test]
    fn delta_with_by_refines_last_result() {
        let results = run(vec![
            ExpectPayload::ChaiDelta {
                family: DeltaFamily::Increase,
                negated: false,
                before: 1.0,
                after: 3.0,
                prop: "count".into(),
                mods: " to".into(),
            },
            ExpectPayload::ChaiBy { delta: 2.0 },
        ]);
        // by() amends in place, one result total
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ExpectStatus::Pass);
        assert_eq!(
            results[0].message,
            "Expected [Function] to increase {}.'count' by 2"
        );
    }

    #[test]
    fn by_with_wrong_delta_fails() {
        let results = run(vec![
            ExpectPayload::ChaiDelta {
                family: DeltaFamily::Change,
                negated: false,
                before: 5.0,
                after: 6.0,
                prop: "n".into(),
                mods: " to".into(),
            },
            ExpectPayload::ChaiBy { delta: 3.0 },
        ]);
        assert_eq!(results[0].status, ExpectStatus::Fail);
    }

    #[test]
    fn chai_simple_builds_chain_message() {
        let results = run(vec![ExpectPayload::ChaiSimple {
            negated: false,
            pass: true,
            value: "5".into(),
            mods: " to be".into(),
            assertion: "above".into(),
            args: vec!["3".into()],
        }]);
        assert_eq!(results[0].status, ExpectStatus::Pass);
        assert_eq!(results[0].message, "Expected 5 to be above 3");
    }

    #[test]
    fn recording_outside_test_block_is_rejected() {
        let mut engine = ExpectEngine::default();
        let mut stack = TestStack::new();
        let err = engine
            .apply(
                &mut stack,
                ExpectPayload::Fail {
                    message: "boom".into(),
                },
            )
            .unwrap_err();
        assert_eq!(err, TestTreeError::OutsideTestBlock);
    }
}
