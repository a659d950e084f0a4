use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use glint_config::GlintConfig;
use glint_events::ObjectPtr;
use tracing::{debug, error, info, warn};

use crate::alloc::{AllocStats, HeterogeneousAllocator};
use crate::callback::{BindingId, CallbackBridge, Dispatch};
use crate::capabilities::{Capabilities, ChunkCompiler, Storage};
use crate::error::{panic_message, ScriptError, ScriptResult};
use crate::mailbox::{Completion, Mailbox, NativeMessage};
use crate::proxy::{Finalizer, FinalizerQueue, ObjectHandle, ProxyBridge};
use crate::resolver::{ModuleResolver, StorageSearcher};
use crate::runtime::{Function, Resumption, Runtime, Value};
use crate::timer::{AsyncBridge, OperationHandle, OperationId, OperationKind};

/// The embedded script runtime together with its native bridges.
///
/// Single-threaded: native contexts reach it only through the mailbox, which
/// is drained by [`Engine::pump`] or [`Engine::pump_wait`].
pub struct Engine {
    runtime: Runtime,
    mailbox: Mailbox,
    finalizers: FinalizerQueue,
    proxies: ProxyBridge,
    callbacks: CallbackBridge,
    async_ops: AsyncBridge,
    resolver: ModuleResolver,
    storage: Arc<dyn Storage>,
    compiler: Rc<dyn ChunkCompiler>,
    entry: String,
    closed: bool,
}

impl Engine {
    pub fn new(config: &GlintConfig, capabilities: Capabilities) -> Self {
        let heap = HeterogeneousAllocator::from_config(&config.allocator);
        heap.log_stats("before init");

        let finalizers = FinalizerQueue::default();
        let Capabilities {
            toolkit,
            timers,
            network,
            storage,
            compiler,
        } = capabilities;

        let searcher = StorageSearcher::new(&config.modules, storage.clone(), compiler.clone());
        let mut engine = Self {
            runtime: Runtime::new(heap),
            mailbox: Mailbox::new(),
            proxies: ProxyBridge::new(toolkit.clone(), finalizers.clone()),
            callbacks: CallbackBridge::new(toolkit),
            async_ops: AsyncBridge::new(timers, network, finalizers.clone()),
            finalizers,
            resolver: ModuleResolver::new(searcher),
            storage,
            compiler,
            entry: config.modules.entry.clone(),
            closed: false,
        };
        engine.install_globals();

        engine.runtime.heap().log_stats("after init");
        info!(
            target: "host",
            "Engine started, modules from {} (*.{})",
            config.modules.mount_path.display(),
            config.modules.bare_extension()
        );
        engine
    }

    fn install_globals(&mut self) {
        self.set_global(
            "require",
            Value::from(Function::new("require", |engine, args| {
                let name = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| ScriptError::bad_argument(1, "require", "string expected"))?
                    .to_string();
                engine.require(&name).map(|value| vec![value])
            })),
        );
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub(crate) fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    /// Suspend the running coroutine once its callable returns
    pub fn yield_now(&mut self) -> ScriptResult<()> {
        self.runtime.request_yield()
    }

    // ------------------------------------------------------------------
    // Native objects
    // ------------------------------------------------------------------

    pub fn create_object(&mut self, parent: Option<&ObjectHandle>) -> ScriptResult<ObjectHandle> {
        self.proxies.create(parent)
    }

    /// Hand an existing native object to script code
    pub fn wrap_object(&self, ptr: ObjectPtr) -> ObjectHandle {
        self.proxies.wrap(ptr)
    }

    pub fn check_object(&self, handle: &ObjectHandle) -> ScriptResult<ObjectPtr> {
        self.proxies.check(handle)
    }

    pub fn is_valid(&self, handle: &ObjectHandle) -> bool {
        self.proxies.is_valid(handle)
    }

    pub fn delete_object(&mut self, handle: &ObjectHandle) {
        self.proxies.delete(handle);
    }

    /// Invoke `callback` for every event on the object behind `handle`
    pub fn attach_callback(
        &mut self,
        handle: &ObjectHandle,
        callback: Function,
    ) -> ScriptResult<BindingId> {
        let target = self.proxies.check(handle)?;
        self.callbacks
            .attach(&mut self.runtime, &self.mailbox, target, callback)
    }

    pub fn live_bindings(&self) -> usize {
        self.callbacks.len()
    }

    // ------------------------------------------------------------------
    // Asynchronous operations
    // ------------------------------------------------------------------

    pub fn create_timer(
        &mut self,
        period_ms: u64,
        repeat: bool,
        callback: Function,
    ) -> ScriptResult<OperationHandle> {
        let kind = OperationKind::Timer {
            period: Duration::from_millis(period_ms),
            repeat,
        };
        self.async_ops
            .schedule(&mut self.runtime, &self.mailbox, kind, "", callback)
    }

    /// Stop a running timer; its callable stays registered until the handle
    /// is dropped or the operation is cancelled
    pub fn stop_timer(&mut self, handle: &OperationHandle) -> ScriptResult<()> {
        self.async_ops.stop(handle.id())
    }

    pub fn is_running(&self, handle: &OperationHandle) -> bool {
        self.async_ops.is_running(handle.id())
    }

    /// Cancel and release an operation. Safe to repeat; returns whether
    /// anything was left to cancel.
    pub fn cancel_operation(&mut self, handle: &OperationHandle) -> bool {
        self.async_ops.teardown(&mut self.runtime, handle.id())
    }

    /// Associate with an access point; `callback` receives `(connected, message)`
    pub fn associate(
        &mut self,
        ssid: &str,
        password: &str,
        callback: Function,
    ) -> ScriptResult<OperationHandle> {
        let kind = OperationKind::Association {
            ssid: ssid.to_string(),
        };
        self.async_ops
            .schedule(&mut self.runtime, &self.mailbox, kind, password, callback)
    }

    pub fn pending_operations(&self) -> usize {
        self.async_ops.len()
    }

    // ------------------------------------------------------------------
    // Modules and execution
    // ------------------------------------------------------------------

    /// Register an in-memory loader consulted before removable storage
    pub fn preload(&mut self, name: &str, loader: Function) {
        self.resolver.preload_mut().insert(name, loader);
    }

    /// Resolve, load and run a module. Not cached: every call loads again.
    pub fn require(&mut self, name: &str) -> ScriptResult<Value> {
        let (loader, origin) = self.resolver.resolve(name)?;
        let results = loader.call(self, vec![Value::from(name), Value::from(origin)])?;
        Ok(results
            .into_iter()
            .next()
            .filter(|value| !value.is_nil())
            .unwrap_or(Value::Boolean(true)))
    }

    /// Load the configured entry module
    pub fn run_entry(&mut self) -> ScriptResult<Value> {
        let entry = self.entry.clone();
        info!(target: "host", "Running entry module '{}'", entry);
        let result = self.require(&entry);
        if let Err(e) = &result {
            error!(target: "host", "Entry module '{}' failed: {}", entry, e);
        }
        self.collect_garbage();
        result
    }

    /// Compile and run a chunk
    pub fn exec_source(&mut self, name: &str, source: &[u8]) -> ScriptResult<Vec<Value>> {
        // The chunk is staged in runtime memory while it is compiled
        let block = self.runtime.reserve(source.len())?;
        if let Some(buf) = self.runtime.heap_mut().bytes_mut(block.as_ptr(), source.len()) {
            buf.copy_from_slice(source);
        }
        let compiled = {
            let staged = self
                .runtime
                .heap()
                .bytes(block.as_ptr(), source.len())
                .unwrap_or(source);
            self.compiler.compile(staged, name)
        };
        self.runtime.free(block);

        let chunk = compiled.map_err(|e| {
            error!(target: "host", "Failed to load {}: {}", name, e.message);
            ScriptError::from(e)
        })?;

        let result = self.protected_call(&chunk, Vec::new());
        if let Err(e) = &result {
            error!(target: "host", "Error running {}: {}", name, e);
        }
        self.collect_garbage();
        result
    }

    /// Read a file from storage and run it
    pub fn exec_file(&mut self, path: &Path) -> ScriptResult<Vec<Value>> {
        let source = self.storage.read_file(path).map_err(|e| {
            error!(target: "host", "Failed to read {}: {}", path.display(), e);
            ScriptError::from(e)
        })?;
        self.exec_source(&format!("@{}", path.display()), &source)
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.runtime.set_global(name, value);
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.runtime.global(name)
    }

    /// Call a global function, logging any error it raises
    pub fn call_global(&mut self, name: &str, args: Vec<Value>) -> ScriptResult<Vec<Value>> {
        let callable = match self.runtime.global(name) {
            Some(Value::Function(f)) => f.clone(),
            other => {
                let type_name = other.map_or("nil", Value::type_name);
                let err = ScriptError::runtime(format!(
                    "attempt to call a {} value (global '{}')",
                    type_name, name
                ));
                error!(target: "host", "Error calling '{}': {}", name, err);
                return Err(err);
            }
        };

        let result = self.protected_call(&callable, args);
        if let Err(e) = &result {
            error!(target: "host", "Error calling '{}': {}", name, e);
        }
        self.collect_garbage();
        result
    }

    /// Call without letting a panic escape
    fn protected_call(&mut self, callable: &Function, args: Vec<Value>) -> ScriptResult<Vec<Value>> {
        match catch_unwind(AssertUnwindSafe(|| callable.call(self, args))) {
            Ok(result) => result,
            Err(payload) => Err(ScriptError::Runtime(panic_message(payload.as_ref()))),
        }
    }

    // ------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------

    /// Handle every message already in the mailbox. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        self.collect_garbage();
        let mut handled = 0;
        while let Some(message) = self.mailbox.try_next() {
            self.dispatch(message);
            self.collect_garbage();
            handled += 1;
        }
        handled
    }

    /// Wait for at least one message, then drain the mailbox
    pub async fn pump_wait(&mut self) -> usize {
        self.collect_garbage();
        match self.mailbox.next().await {
            Some(message) => {
                self.dispatch(message);
                self.collect_garbage();
                1 + self.pump()
            }
            None => 0,
        }
    }

    fn dispatch(&mut self, message: NativeMessage) {
        match message {
            NativeMessage::Event { binding, event } => {
                let Dispatch::Invoke(callable) = self.callbacks.route(&mut self.runtime, binding, &event)
                else {
                    return;
                };
                let category = event.category();
                let target = event.target();
                if let Err(e) = self.protected_call(&callable, vec![Value::Event(event)]) {
                    error!(
                        target: "callbacks",
                        "Callback '{}' failed on {} event for {}: {}",
                        callable.name(),
                        category,
                        target,
                        e
                    );
                }
            }
            NativeMessage::Completion { operation, payload } => self.complete(operation, payload),
        }
    }

    /// Run one completion in a fresh execution context
    fn complete(&mut self, operation: OperationId, payload: Completion) {
        let Some((callable, one_shot)) = self.async_ops.begin_completion(&self.runtime, operation)
        else {
            return;
        };

        let mut context = self.runtime.new_context(callable);
        match context.resume(self, payload.into_args()) {
            Resumption::Finished(_) => {}
            Resumption::Yielded(_) => {
                debug!(target: "timers", "{} yielded in {}, abandoning context", operation, context.id());
            }
            Resumption::Failed(e) => {
                error!(target: "timers", "Callback for {} failed: {}", operation, e);
            }
        }

        if one_shot {
            self.async_ops.teardown(&mut self.runtime, operation);
        }
    }

    /// Run deferred finalizers. Returns how many ran.
    pub fn collect_garbage(&mut self) -> usize {
        let mut ran = 0;
        loop {
            let batch = self.finalizers.take();
            if batch.is_empty() {
                break;
            }
            for finalizer in batch {
                match finalizer {
                    Finalizer::Object(ptr) => self.proxies.finalize(ptr),
                    Finalizer::Operation(id) => {
                        self.async_ops.teardown(&mut self.runtime, id);
                    }
                }
                ran += 1;
            }
        }
        ran
    }

    pub fn memory_stats(&self) -> AllocStats {
        self.runtime.heap().stats()
    }

    pub fn log_memory(&self, label: &str) {
        self.runtime.heap().log_stats(label);
    }

    /// Cancel outstanding operations, drop callbacks and globals, and run
    /// the resulting finalizers
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for id in self.async_ops.ids() {
            self.async_ops.teardown(&mut self.runtime, id);
        }
        self.callbacks.detach_all(&mut self.runtime);
        drop(self.runtime.take_globals());
        self.collect_garbage();

        let leftover = self.runtime.registry().len();
        if leftover > 0 {
            warn!(target: "host", "{} registry reference(s) still held at shutdown", leftover);
        }
        self.runtime.heap().log_stats("shutdown");
        info!(target: "host", "Engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
