use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::trace;

use super::value::{Function, Value};
use crate::engine::Engine;
use crate::error::{panic_message, ScriptError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub(crate) u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStatus {
    Suspended,
    Running,
    Yielded,
    Finished,
    Failed,
}

/// Outcome of one resumption
#[derive(Debug)]
pub enum Resumption {
    Finished(Vec<Value>),
    /// The callable suspended itself; whoever holds the context may resume it again
    Yielded(Vec<Value>),
    Failed(ScriptError),
}

/// A coroutine created to run one callable.
///
/// A yielded context re-enters its callable with the next resume's arguments.
#[derive(Debug)]
pub struct ExecutionContext {
    id: ContextId,
    body: Function,
    status: ContextStatus,
}

impl ExecutionContext {
    pub(crate) fn new(id: ContextId, body: Function) -> Self {
        Self {
            id,
            body,
            status: ContextStatus::Suspended,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn status(&self) -> ContextStatus {
        self.status
    }

    /// Run the callable until it returns, fails or yields.
    ///
    /// Errors and panics raised by the callable are captured in the result and
    /// never unwind into the caller.
    pub fn resume(&mut self, engine: &mut Engine, args: Vec<Value>) -> Resumption {
        if !matches!(self.status, ContextStatus::Suspended | ContextStatus::Yielded) {
            return Resumption::Failed(ScriptError::runtime("cannot resume dead coroutine"));
        }

        trace!(target: "host", "resume {} ({})", self.id, self.body.name());
        self.status = ContextStatus::Running;
        engine.runtime_mut().enter(self.id);
        let body = &self.body;
        let outcome = catch_unwind(AssertUnwindSafe(|| body.call(engine, args)));
        let yielded = engine.runtime_mut().leave(self.id);

        match outcome {
            Ok(Ok(values)) if yielded => {
                self.status = ContextStatus::Yielded;
                Resumption::Yielded(values)
            }
            Ok(Ok(values)) => {
                self.status = ContextStatus::Finished;
                Resumption::Finished(values)
            }
            Ok(Err(e)) => {
                self.status = ContextStatus::Failed;
                Resumption::Failed(e)
            }
            Err(payload) => {
                self.status = ContextStatus::Failed;
                Resumption::Failed(ScriptError::Runtime(panic_message(payload.as_ref())))
            }
        }
    }
}
