//! Asynchronous resumption bridge for timers and network association.
//!
//! Scheduling registers the callable, hands a completion sink to the native
//! service and returns at once. Completions come back through the mailbox and
//! are run in a fresh execution context by the engine.
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::alloc::HeapBlock;
use crate::capabilities::{NativeTask, NetworkService, TimerService};
use crate::error::{ScheduleError, ScriptError, ScriptResult};
use crate::mailbox::{CompletionSink, Mailbox};
use crate::proxy::{Finalizer, FinalizerQueue};
use crate::runtime::{Function, RegistryKey, Runtime, Value};

/// Runtime memory charged for each completion handle
const OPERATION_RECORD_SIZE: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub(crate) u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    Timer { period: Duration, repeat: bool },
    Association { ssid: String },
}

impl OperationKind {
    fn one_shot(&self) -> bool {
        match self {
            OperationKind::Timer { repeat, .. } => !repeat,
            OperationKind::Association { .. } => true,
        }
    }

    fn describe(&self) -> String {
        match self {
            OperationKind::Timer { period, repeat } => format!(
                "{} timer ({} ms)",
                if *repeat { "periodic" } else { "one-shot" },
                period.as_millis()
            ),
            OperationKind::Association { ssid } => format!("association with '{}'", ssid),
        }
    }
}

#[derive(Debug)]
struct Operation {
    kind: OperationKind,
    callback: RegistryKey,
    record: HeapBlock,
    native: Option<NativeTask>,
    running: bool,
}

#[derive(Debug)]
struct OperationCell {
    id: OperationId,
    finalizers: FinalizerQueue,
}

impl Drop for OperationCell {
    fn drop(&mut self) {
        self.finalizers.defer(Finalizer::Operation(self.id));
    }
}

/// Script handle to a scheduled operation. Once every clone is gone the
/// operation is cancelled and its callable released.
#[derive(Debug, Clone)]
pub struct OperationHandle(Rc<OperationCell>);

impl OperationHandle {
    pub fn id(&self) -> OperationId {
        self.0.id
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation: {}", self.0.id)
    }
}

pub(crate) struct AsyncBridge {
    timers: Arc<dyn TimerService>,
    network: Arc<dyn NetworkService>,
    finalizers: FinalizerQueue,
    operations: HashMap<OperationId, Operation>,
    next_id: u64,
}

impl AsyncBridge {
    pub(crate) fn new(
        timers: Arc<dyn TimerService>,
        network: Arc<dyn NetworkService>,
        finalizers: FinalizerQueue,
    ) -> Self {
        Self {
            timers,
            network,
            finalizers,
            operations: HashMap::new(),
            next_id: 1,
        }
    }

    /// Register `callback` and start the native side of `kind`.
    ///
    /// A native start failure leaves nothing behind: the registry reference
    /// and the completion handle are released before the error is returned.
    pub(crate) fn schedule(
        &mut self,
        runtime: &mut Runtime,
        mailbox: &Mailbox,
        kind: OperationKind,
        password: &str,
        callback: Function,
    ) -> ScriptResult<OperationHandle> {
        let id = OperationId(self.next_id);
        self.next_id += 1;

        let record = runtime.reserve(OPERATION_RECORD_SIZE)?;
        let key = runtime.registry_mut().insert(Value::Function(callback));
        let sink = mailbox.completion_sink(id);

        match self.start_native(&kind, password, sink) {
            Ok(task) => {
                debug!(target: "timers", "Scheduled {} as {}", kind.describe(), id);
                self.operations.insert(
                    id,
                    Operation {
                        kind,
                        callback: key,
                        record,
                        native: Some(task),
                        running: true,
                    },
                );
                Ok(OperationHandle(Rc::new(OperationCell {
                    id,
                    finalizers: self.finalizers.clone(),
                })))
            }
            Err(source) => {
                runtime.registry_mut().release(key);
                runtime.free(record);
                error!(target: "timers", "Failed to schedule {}: {}", kind.describe(), source);
                Err(ScriptError::Schedule {
                    what: kind.describe(),
                    source,
                })
            }
        }
    }

    fn start_native(
        &self,
        kind: &OperationKind,
        password: &str,
        sink: CompletionSink,
    ) -> Result<NativeTask, ScheduleError> {
        match kind {
            OperationKind::Timer { period, repeat } => self.timers.start(*period, *repeat, sink),
            OperationKind::Association { ssid } => self.network.associate(ssid, password, sink),
        }
    }

    fn cancel_native(&self, kind: &OperationKind, task: NativeTask) {
        match kind {
            OperationKind::Timer { .. } => self.timers.cancel(task),
            OperationKind::Association { .. } => self.network.cancel(task),
        }
    }

    /// Look up the callable for a completion. Returns it with a flag telling
    /// whether this was the operation's last completion. Completions for
    /// stopped or torn-down operations yield `None`.
    pub(crate) fn begin_completion(
        &mut self,
        runtime: &Runtime,
        id: OperationId,
    ) -> Option<(Function, bool)> {
        let op = self.operations.get_mut(&id)?;
        if !op.running {
            debug!(target: "timers", "Late completion for stopped {}", id);
            return None;
        }
        let callable = runtime
            .registry()
            .get(&op.callback)
            .and_then(Value::as_function)
            .cloned()?;
        let one_shot = op.kind.one_shot();
        if one_shot {
            op.running = false;
        }
        Some((callable, one_shot))
    }

    /// Cancel the native side and release the registry reference.
    /// Returns false if the operation was already gone.
    pub(crate) fn teardown(&mut self, runtime: &mut Runtime, id: OperationId) -> bool {
        let Some(op) = self.operations.remove(&id) else {
            return false;
        };
        if op.running {
            if let Some(task) = op.native {
                self.cancel_native(&op.kind, task);
            }
        }
        runtime.registry_mut().release(op.callback);
        runtime.free(op.record);
        debug!(target: "timers", "Released {}", id);
        true
    }

    /// Stop a running operation but keep its callable registered
    pub(crate) fn stop(&mut self, id: OperationId) -> ScriptResult<()> {
        let op = match self.operations.get_mut(&id) {
            Some(op) if op.running => op,
            _ => return Err(ScriptError::runtime("timer is not running or invalid")),
        };
        op.running = false;
        if let Some(task) = op.native.take() {
            let kind = op.kind.clone();
            self.cancel_native(&kind, task);
        }
        debug!(target: "timers", "Stopped {}", id);
        Ok(())
    }

    pub(crate) fn is_running(&self, id: OperationId) -> bool {
        self.operations.get(&id).is_some_and(|op| op.running)
    }

    pub(crate) fn ids(&self) -> Vec<OperationId> {
        let mut ids: Vec<OperationId> = self.operations.keys().copied().collect();
        ids.sort();
        ids
    }

    pub(crate) fn len(&self) -> usize {
        self.operations.len()
    }
}
