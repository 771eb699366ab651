//! `MockHandler` — a test double for `BlockHandler`.
//!
//! Useful in engine and queue tests where a real handler implementation is
//! either unavailable or irrelevant.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::{BlockContext, BlockError, BlockHandler, BlockOutput};

/// Behaviour injected into `MockHandler` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Return a value and select an outgoing handle (branch double).
    SelectHandle(Value, String),
    /// Fail with a transient error.
    FailTransient(String),
    /// Fail with a permanent error.
    FailPermanent(String),
    /// Fail transiently for the first N calls, then return the value.
    FailNTimesThenReturn(usize, Value),
}

/// A mock handler that records every call it receives and returns a
/// programmer-specified result.
pub struct MockHandler {
    /// Label used in test assertions.
    pub name: String,
    /// What the handler will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// Resolved configs seen by this handler (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockHandler {
    /// Create a mock that always succeeds with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::ReturnValue(value),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that succeeds and selects a branch handle.
    pub fn selecting(name: impl Into<String>, value: Value, handle: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::SelectHandle(value, handle.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a transient error.
    pub fn failing_transient(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailTransient(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a permanent error.
    pub fn failing_permanent(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailPermanent(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that fails transiently `failures` times, then succeeds.
    pub fn flaky(name: impl Into<String>, failures: usize, value: Value) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailNTimesThenReturn(failures, value),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times this handler has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl BlockHandler for MockHandler {
    async fn execute(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockError> {
        self.calls.lock().unwrap().push(ctx.config.clone());

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(BlockOutput::value(v.clone())),
            MockBehaviour::SelectHandle(v, handle) => {
                Ok(BlockOutput::value(v.clone()).with_selected_handle(handle.clone()))
            }
            MockBehaviour::FailTransient(msg) => Err(BlockError::transient(msg.clone())),
            MockBehaviour::FailPermanent(msg) => Err(BlockError::permanent(msg.clone())),
            MockBehaviour::FailNTimesThenReturn(failures, v) => {
                let calls_so_far = self.calls.lock().unwrap().len();
                if calls_so_far <= *failures {
                    Err(BlockError::transient(format!(
                        "induced failure {calls_so_far}/{failures}"
                    )))
                } else {
                    Ok(BlockOutput::value(v.clone()))
                }
            }
        }
    }
}
