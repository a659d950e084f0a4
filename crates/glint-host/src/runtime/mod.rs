//! Minimal script runtime state: values, the registry, coroutines and the heap
mod context;
mod registry;
mod value;

use std::collections::HashMap;

use crate::alloc::{HeapBlock, HeterogeneousAllocator};
use crate::error::{ScriptError, ScriptResult};

pub use context::{ContextId, ContextStatus, ExecutionContext, Resumption};
pub use registry::{Registry, RegistryKey};
pub use value::{Function, Value};

#[derive(Debug)]
struct RunningContext {
    id: ContextId,
    yield_requested: bool,
}

/// Everything owned by the script side of the bridge
#[derive(Debug)]
pub struct Runtime {
    registry: Registry,
    globals: HashMap<String, Value>,
    heap: HeterogeneousAllocator,
    running: Vec<RunningContext>,
    next_context_id: u64,
}

impl Runtime {
    pub fn new(heap: HeterogeneousAllocator) -> Self {
        Self {
            registry: Registry::new(),
            globals: HashMap::new(),
            heap,
            running: Vec::new(),
            next_context_id: 1,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn heap(&self) -> &HeterogeneousAllocator {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut HeterogeneousAllocator {
        &mut self.heap
    }

    /// Allocate runtime memory, surfacing exhaustion as a script error
    pub fn reserve(&mut self, size: usize) -> ScriptResult<HeapBlock> {
        self.heap
            .allocate_block(size.max(1))
            .ok_or(ScriptError::OutOfMemory { requested: size })
    }

    pub fn free(&mut self, block: HeapBlock) {
        self.heap.free_block(block);
    }

    pub fn set_global(&mut self, name: &str, value: Value) -> Option<Value> {
        if value.is_nil() {
            self.globals.remove(name)
        } else {
            self.globals.insert(name.to_string(), value)
        }
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub(crate) fn take_globals(&mut self) -> HashMap<String, Value> {
        std::mem::take(&mut self.globals)
    }

    /// Create a fresh coroutine running `body`
    pub fn new_context(&mut self, body: Function) -> ExecutionContext {
        let id = ContextId(self.next_context_id);
        self.next_context_id += 1;
        ExecutionContext::new(id, body)
    }

    /// The innermost running coroutine, if any
    pub fn current_context(&self) -> Option<ContextId> {
        self.running.last().map(|ctx| ctx.id)
    }

    /// Ask the running coroutine to suspend when its callable returns
    pub fn request_yield(&mut self) -> ScriptResult<()> {
        match self.running.last_mut() {
            Some(ctx) => {
                ctx.yield_requested = true;
                Ok(())
            }
            None => Err(ScriptError::runtime(
                "attempt to yield from outside a coroutine",
            )),
        }
    }

    pub(crate) fn enter(&mut self, id: ContextId) {
        self.running.push(RunningContext {
            id,
            yield_requested: false,
        });
    }

    /// Pop the context and report whether it asked to yield
    pub(crate) fn leave(&mut self, id: ContextId) -> bool {
        match self.running.iter().rposition(|ctx| ctx.id == id) {
            Some(pos) => self.running.remove(pos).yield_requested,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::PlacementPolicy;

    fn runtime() -> Runtime {
        Runtime::new(HeterogeneousAllocator::new(
            PlacementPolicy::default(),
            1024,
            1024,
        ))
    }

    #[test]
    fn test_yield_outside_coroutine_fails() {
        let mut rt = runtime();
        assert!(rt.request_yield().is_err());
        assert!(rt.current_context().is_none());
    }

    #[test]
    fn test_enter_leave() {
        let mut rt = runtime();
        let a = rt.new_context(Function::new("a", |_, _| Ok(vec![]))).id();
        let b = rt.new_context(Function::new("b", |_, _| Ok(vec![]))).id();
        assert_ne!(a, b);

        rt.enter(a);
        rt.enter(b);
        rt.request_yield().unwrap();
        assert_eq!(rt.current_context(), Some(b));
        assert!(rt.leave(b));
        assert!(!rt.leave(a));
        assert!(rt.current_context().is_none());
    }

    #[test]
    fn test_reserve_out_of_memory() {
        let mut rt = runtime();
        let err = rt.reserve(1 << 20).unwrap_err();
        assert!(matches!(err, ScriptError::OutOfMemory { requested } if requested == 1 << 20));

        let block = rt.reserve(0).unwrap();
        rt.free(block);
        assert_eq!(rt.heap().stats().total_allocated, 0);
    }

    #[test]
    fn test_nil_global_removes() {
        let mut rt = runtime();
        rt.set_global("x", Value::from(1i64));
        assert!(rt.global("x").is_some());
        rt.set_global("x", Value::Nil);
        assert!(rt.global("x").is_none());
    }
}
