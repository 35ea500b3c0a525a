//! The per-run test tree builder.
//!
//! An explicit stack seeded with a synthetic root descriptor. `test`
//! blocks push on entry and pop on exit, attaching themselves to the new
//! top's children, so nesting falls out of call order. The stack lives in
//! the run's op state — never process-global.

use sandpiper_data::{ExpectResult, TestDescriptor};

/// Error cases the ops surface to the script as thrown exceptions.
#[derive(Debug, PartialEq, Eq)]
pub enum TestTreeError {
    /// An expectation was recorded with no open `test` block.
    OutsideTestBlock,
    /// `exit` with no matching `enter`.
    StackUnderflow,
}

impl std::fmt::Display for TestTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutsideTestBlock => {
                write!(f, "expectations can only run inside a test() block")
            }
            Self::StackUnderflow => write!(f, "test block exit without a matching entry"),
        }
    }
}

/// Stack of open test blocks, root at the bottom.
#[derive(Debug)]
pub struct TestStack {
    stack: Vec<TestDescriptor>,
}

impl Default for TestStack {
    fn default() -> Self {
        Self::new()
    }
}

impl TestStack {
    /// A fresh stack holding only the synthetic root.
    pub fn new() -> Self {
        Self {
            stack: vec![TestDescriptor::new("root")],
        }
    }

    /// Open a test block.
    pub fn enter(&mut self, descriptor: &str) {
        self.stack.push(TestDescriptor::new(descriptor));
    }

    /// Close the innermost block, attaching it to its parent's children.
    pub fn exit(&mut self) -> Result<(), TestTreeError> {
        if self.stack.len() < 2 {
            return Err(TestTreeError::StackUnderflow);
        }
        let child = self.stack.pop().ok_or(TestTreeError::StackUnderflow)?;
        match self.stack.last_mut() {
            Some(parent) => {
                parent.children.push(child);
                Ok(())
            }
            None => Err(TestTreeError::StackUnderflow),
        }
    }

    /// Record an expectation in the innermost open block.
    ///
    /// Recording directly on the root is rejected — the thrown error makes
    /// a bare assertion outside `test()` a top-level script error.
    pub fn record(&mut self, result: ExpectResult) -> Result<(), TestTreeError> {
        if self.stack.len() < 2 {
            return Err(TestTreeError::OutsideTestBlock);
        }
        match self.stack.last_mut() {
            Some(top) => {
                top.expect_results.push(result);
                Ok(())
            }
            None => Err(TestTreeError::StackUnderflow),
        }
    }

    /// Rewrite the most recently recorded expectation in the innermost
    /// block. Used by delta assertions whose `.by(n)` refines the result
    /// already pushed.
    pub fn amend_last(&mut self, result: ExpectResult) -> Result<(), TestTreeError> {
        if self.stack.len() < 2 {
            return Err(TestTreeError::OutsideTestBlock);
        }
        match self.stack.last_mut().and_then(|top| top.expect_results.last_mut()) {
            Some(last) => {
                *last = result;
                Ok(())
            }
            None => Err(TestTreeError::OutsideTestBlock),
        }
    }

    /// Consume the stack and return the root's children.
    ///
    /// Unbalanced blocks (an async body that never settled before
    /// termination) are attached to their parents so recorded results are
    /// not lost.
    pub fn finish(mut self) -> Vec<TestDescriptor> {
        while self.stack.len() > 1 {
            // exit() cannot fail while len > 1
            let _ = self.exit();
        }
        self.stack.pop().map(|root| root.children).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting_follows_call_order() {
        let mut stack = TestStack::new();
        stack.enter("outer");
        stack.record(ExpectResult::pass("p1")).unwrap();
        stack.enter("inner");
        stack.record(ExpectResult::fail("f1")).unwrap();
        stack.exit().unwrap();
        stack.exit().unwrap();

        let tests = stack.finish();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].descriptor, "outer");
        assert_eq!(tests[0].expect_results.len(), 1);
        assert_eq!(tests[0].children.len(), 1);
        assert_eq!(tests[0].children[0].descriptor, "inner");
        assert_eq!(tests[0].children[0].expect_results[0].message, "f1");
    }

    #[test]
    fn sibling_blocks_stay_ordered() {
        let mut stack = TestStack::new();
        for name in ["a", "b", "c"] {
            stack.enter(name);
            stack.exit().unwrap();
        }
        let tests = stack.finish();
        let names: Vec<_> = tests.iter().map(|t| t.descriptor.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn recording_on_root_is_rejected() {
        let mut stack = TestStack::new();
        assert_eq!(
            stack.record(ExpectResult::pass("p")),
            Err(TestTreeError::OutsideTestBlock)
        );
        // the root must stay clean
        assert!(stack.finish().is_empty());
    }

    #[test]
    fn exit_without_enter_is_rejected() {
        let mut stack = TestStack::new();
        assert_eq!(stack.exit(), Err(TestTreeError::StackUnderflow));
    }

    #[test]
    fn amend_rewrites_last_result() {
        let mut stack = TestStack::new();
        stack.enter("t");
        stack.record(ExpectResult::pass("before")).unwrap();
        stack.amend_last(ExpectResult::fail("after")).unwrap();
        stack.exit().unwrap();
        let tests = stack.finish();
        assert_eq!(tests[0].expect_results[0].message, "after");
    }

    #[test]
    fn finish_closes_dangling_blocks() {
        let mut stack = TestStack::new();
        stack.enter("open");
        stack.record(ExpectResult::pass("kept")).unwrap();
        let tests = stack.finish();
        assert_eq!(tests[0].descriptor, "open");
        assert_eq!(tests[0].expect_results.len(), 1);
    }
}
