//! Script callbacks attached to native objects' event streams
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use glint_events::{NativeEvent, ObjectPtr};
use tracing::{debug, trace};

use crate::alloc::HeapBlock;
use crate::capabilities::Toolkit;
use crate::error::{ScriptError, ScriptResult};
use crate::mailbox::Mailbox;
use crate::runtime::{Function, RegistryKey, Runtime, Value};

/// Runtime memory charged for each attachment record
const BINDING_RECORD_SIZE: usize = 32;

/// Identifies one attachment; carried by every event the toolkit posts for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(pub(crate) u64);

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding#{}", self.0)
    }
}

#[derive(Debug)]
struct Binding {
    target: ObjectPtr,
    callback: Option<RegistryKey>,
    record: HeapBlock,
}

/// What the runtime loop should do with an incoming event
#[derive(Debug)]
pub(crate) enum Dispatch {
    Invoke(Function),
    /// The delete notification arrived and the binding is gone
    TornDown,
    Ignored,
}

pub(crate) struct CallbackBridge {
    toolkit: Arc<dyn Toolkit>,
    bindings: HashMap<BindingId, Binding>,
    by_object: HashMap<ObjectPtr, BindingId>,
    next_id: u64,
}

impl CallbackBridge {
    pub(crate) fn new(toolkit: Arc<dyn Toolkit>) -> Self {
        Self {
            toolkit,
            bindings: HashMap::new(),
            by_object: HashMap::new(),
            next_id: 1,
        }
    }

    /// Attach `callback` to every event on `target`.
    ///
    /// An object holds at most one callable: attaching again releases the
    /// previous registry reference and keeps the existing subscription.
    pub(crate) fn attach(
        &mut self,
        runtime: &mut Runtime,
        mailbox: &Mailbox,
        target: ObjectPtr,
        callback: Function,
    ) -> ScriptResult<BindingId> {
        if let Some(&id) = self.by_object.get(&target) {
            if let Some(binding) = self.bindings.get_mut(&id) {
                if let Some(old) = binding.callback.take() {
                    runtime.registry_mut().release(old);
                }
                binding.callback = Some(runtime.registry_mut().insert(Value::Function(callback)));
                debug!(target: "callbacks", "Replaced callback on {} ({})", target, id);
                return Ok(id);
            }
        }

        let record = runtime.reserve(BINDING_RECORD_SIZE)?;
        let key = runtime.registry_mut().insert(Value::Function(callback));
        let id = BindingId(self.next_id);
        self.next_id += 1;

        if !self.toolkit.subscribe_all(target, mailbox.event_sink(id)) {
            runtime.registry_mut().release(key);
            runtime.free(record);
            return Err(ScriptError::runtime(format!(
                "cannot subscribe to events of {}",
                target
            )));
        }

        self.bindings.insert(
            id,
            Binding {
                target,
                callback: Some(key),
                record,
            },
        );
        self.by_object.insert(target, id);
        debug!(target: "callbacks", "Attached callback to {} ({})", target, id);
        Ok(id)
    }

    /// Route one event posted for `binding`
    pub(crate) fn route(
        &mut self,
        runtime: &mut Runtime,
        binding: BindingId,
        event: &NativeEvent,
    ) -> Dispatch {
        if event.category().is_delete() {
            return match self.bindings.remove(&binding) {
                Some(removed) => {
                    self.teardown(runtime, binding, removed);
                    Dispatch::TornDown
                }
                None => Dispatch::Ignored,
            };
        }

        let Some(entry) = self.bindings.get(&binding) else {
            trace!(target: "callbacks", "Event for unknown {} dropped", binding);
            return Dispatch::Ignored;
        };
        entry
            .callback
            .as_ref()
            .and_then(|key| runtime.registry().get(key))
            .and_then(Value::as_function)
            .cloned()
            .map(Dispatch::Invoke)
            .unwrap_or(Dispatch::Ignored)
    }

    fn teardown(&mut self, runtime: &mut Runtime, id: BindingId, binding: Binding) {
        if self.by_object.get(&binding.target) == Some(&id) {
            self.by_object.remove(&binding.target);
        }
        if let Some(key) = binding.callback {
            runtime.registry_mut().release(key);
        }
        runtime.free(binding.record);
        debug!(target: "callbacks", "Released callback of {} ({})", binding.target, id);
    }

    /// Drop every binding, e.g. when the runtime shuts down
    pub(crate) fn detach_all(&mut self, runtime: &mut Runtime) {
        let ids: Vec<BindingId> = self.bindings.keys().copied().collect();
        for id in ids {
            if let Some(binding) = self.bindings.remove(&id) {
                self.teardown(runtime, id, binding);
            }
        }
    }

    pub(crate) fn binding_for(&self, target: ObjectPtr) -> Option<BindingId> {
        self.by_object.get(&target).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.bindings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{HeterogeneousAllocator, PlacementPolicy};
    use crate::mailbox::NativeMessage;
    use crate::toolkit::HeadlessToolkit;
    use glint_events::EventCategory;

    struct Fixture {
        toolkit: Arc<HeadlessToolkit>,
        bridge: CallbackBridge,
        runtime: Runtime,
        mailbox: Mailbox,
    }

    fn fixture() -> Fixture {
        let toolkit = Arc::new(HeadlessToolkit::new());
        Fixture {
            bridge: CallbackBridge::new(toolkit.clone()),
            toolkit,
            runtime: Runtime::new(HeterogeneousAllocator::new(
                PlacementPolicy::default(),
                4096,
                4096,
            )),
            mailbox: Mailbox::new(),
        }
    }

    fn noop(name: &str) -> Function {
        Function::new(name, |_, _| Ok(vec![]))
    }

    fn next_event(mailbox: &mut Mailbox) -> (BindingId, NativeEvent) {
        match mailbox.try_next() {
            Some(NativeMessage::Event { binding, event }) => (binding, event),
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_second_attach_releases_first() {
        let mut fx = fixture();
        let obj = fx.toolkit.create_object(None).unwrap();

        let first = noop("first");
        let id = fx
            .bridge
            .attach(&mut fx.runtime, &fx.mailbox, obj, first.clone())
            .unwrap();
        let again = fx
            .bridge
            .attach(&mut fx.runtime, &fx.mailbox, obj, noop("second"))
            .unwrap();

        assert_eq!(id, again);
        assert_eq!(fx.runtime.registry().released_count(), 1);
        assert_eq!(fx.runtime.registry().len(), 1);
        assert_eq!(fx.toolkit.subscriber_count(obj), 1);

        fx.toolkit.send(obj, EventCategory::Clicked);
        let (binding, event) = next_event(&mut fx.mailbox);
        match fx.bridge.route(&mut fx.runtime, binding, &event) {
            Dispatch::Invoke(f) => {
                assert_eq!(f.name(), "second");
                assert!(!f.ptr_eq(&first));
            }
            other => panic!("unexpected dispatch {:?}", other),
        }
    }

    #[test]
    fn test_delete_notification_tears_down_once() {
        let mut fx = fixture();
        let obj = fx.toolkit.create_object(None).unwrap();
        fx.bridge
            .attach(&mut fx.runtime, &fx.mailbox, obj, noop("cb"))
            .unwrap();
        assert_eq!(fx.runtime.heap().stats().live_blocks(), 1);

        fx.toolkit.delete_object(obj);
        let (binding, event) = next_event(&mut fx.mailbox);
        assert!(event.category().is_delete());

        assert!(matches!(
            fx.bridge.route(&mut fx.runtime, binding, &event),
            Dispatch::TornDown
        ));
        assert!(matches!(
            fx.bridge.route(&mut fx.runtime, binding, &event),
            Dispatch::Ignored
        ));
        assert_eq!(fx.runtime.registry().released_count(), 1);
        assert!(fx.runtime.registry().is_empty());
        assert_eq!(fx.runtime.heap().stats().live_blocks(), 0);
        assert!(fx.bridge.binding_for(obj).is_none());
        assert_eq!(fx.bridge.len(), 0);
    }

    #[test]
    fn test_attach_to_dead_object_leaves_nothing() {
        let mut fx = fixture();
        let obj = fx.toolkit.create_object(None).unwrap();
        fx.toolkit.delete_object(obj);

        let result = fx
            .bridge
            .attach(&mut fx.runtime, &fx.mailbox, obj, noop("cb"));
        assert!(result.is_err());
        assert!(fx.runtime.registry().is_empty());
        assert_eq!(fx.runtime.heap().stats().live_blocks(), 0);
    }

    #[test]
    fn test_events_are_per_object() {
        let mut fx = fixture();
        let a = fx.toolkit.create_object(None).unwrap();
        let b = fx.toolkit.create_object(None).unwrap();
        let id_a = fx
            .bridge
            .attach(&mut fx.runtime, &fx.mailbox, a, noop("a"))
            .unwrap();
        let id_b = fx
            .bridge
            .attach(&mut fx.runtime, &fx.mailbox, b, noop("b"))
            .unwrap();
        assert_ne!(id_a, id_b);

        fx.toolkit.send(b, EventCategory::Pressed);
        let (binding, event) = next_event(&mut fx.mailbox);
        assert_eq!(binding, id_b);
        match fx.bridge.route(&mut fx.runtime, binding, &event) {
            Dispatch::Invoke(f) => assert_eq!(f.name(), "b"),
            other => panic!("unexpected dispatch {:?}", other),
        }
    }
}
