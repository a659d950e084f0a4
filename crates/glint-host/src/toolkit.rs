//! Headless GUI toolkit: an in-memory object tree with cascading delete.
//!
//! Used for desktop simulation and tests. Object addresses are handed out
//! monotonically and never reused.
use std::collections::HashMap;
use std::sync::Mutex;

use glint_events::{EventCategory, NativeEvent, ObjectPtr};
use tracing::{trace, warn};

use crate::capabilities::Toolkit;
use crate::mailbox::EventSink;

const ADDRESS_STRIDE: u64 = 0x40;
const SCREEN: ObjectPtr = match ObjectPtr::new(0x3fc8_0000) {
    Some(ptr) => ptr,
    None => panic!("screen address must be non-zero"),
};

#[derive(Debug, Default)]
struct Node {
    parent: Option<ObjectPtr>,
    children: Vec<ObjectPtr>,
    subscribers: Vec<EventSink>,
}

#[derive(Debug)]
struct TreeState {
    screen: ObjectPtr,
    objects: HashMap<ObjectPtr, Node>,
    next_address: u64,
    delete_calls: usize,
}

impl TreeState {
    fn allocate_address(&mut self) -> Option<ObjectPtr> {
        let ptr = ObjectPtr::new(self.next_address)?;
        self.next_address += ADDRESS_STRIDE;
        Some(ptr)
    }

    /// Post-order list of `root` and its descendants
    fn subtree(&self, root: ObjectPtr) -> Vec<ObjectPtr> {
        let mut order = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((ptr, expanded)) = stack.pop() {
            if expanded {
                order.push(ptr);
                continue;
            }
            stack.push((ptr, true));
            if let Some(node) = self.objects.get(&ptr) {
                for child in node.children.iter().rev() {
                    stack.push((*child, false));
                }
            }
        }
        order
    }
}

#[derive(Debug)]
pub struct HeadlessToolkit {
    state: Mutex<TreeState>,
}

impl HeadlessToolkit {
    pub fn new() -> Self {
        let mut objects = HashMap::new();
        objects.insert(SCREEN, Node::default());
        Self {
            state: Mutex::new(TreeState {
                screen: SCREEN,
                objects,
                next_address: SCREEN.get() + ADDRESS_STRIDE,
                delete_calls: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TreeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The active screen, root of every object tree
    pub fn screen(&self) -> ObjectPtr {
        self.lock().screen
    }

    /// Number of live objects, the screen included
    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn children(&self, obj: ObjectPtr) -> Vec<ObjectPtr> {
        self.lock()
            .objects
            .get(&obj)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    pub fn parent(&self, obj: ObjectPtr) -> Option<ObjectPtr> {
        self.lock().objects.get(&obj).and_then(|node| node.parent)
    }

    pub fn subscriber_count(&self, obj: ObjectPtr) -> usize {
        self.lock()
            .objects
            .get(&obj)
            .map_or(0, |node| node.subscribers.len())
    }

    /// Number of times `delete_object` was asked to delete a live object
    pub fn delete_calls(&self) -> usize {
        self.lock().delete_calls
    }

    /// Raise an event on an object. Returns how many subscribers received it.
    pub fn send_event(&self, event: NativeEvent) -> usize {
        let state = self.lock();
        let Some(node) = state.objects.get(&event.target()) else {
            return 0;
        };
        node.subscribers
            .iter()
            .filter(|sink| sink.deliver(event.clone()))
            .count()
    }

    pub fn send(&self, obj: ObjectPtr, category: EventCategory) -> usize {
        self.send_event(NativeEvent::new(category, obj))
    }
}

impl Default for HeadlessToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl Toolkit for HeadlessToolkit {
    fn create_object(&self, parent: Option<ObjectPtr>) -> Option<ObjectPtr> {
        let mut state = self.lock();
        let parent = parent.unwrap_or(state.screen);
        if !state.objects.contains_key(&parent) {
            return None;
        }
        let ptr = state.allocate_address()?;
        state.objects.insert(
            ptr,
            Node {
                parent: Some(parent),
                ..Node::default()
            },
        );
        if let Some(node) = state.objects.get_mut(&parent) {
            node.children.push(ptr);
        }
        trace!(target: "proxy", "toolkit created {} under {}", ptr, parent);
        Some(ptr)
    }

    fn delete_object(&self, obj: ObjectPtr) {
        let mut state = self.lock();
        if obj == state.screen {
            warn!(target: "proxy", "Refusing to delete the active screen");
            return;
        }
        if !state.objects.contains_key(&obj) {
            return;
        }
        state.delete_calls += 1;

        let parent = state.objects.get(&obj).and_then(|node| node.parent);
        if let Some(parent) = parent.and_then(|p| state.objects.get_mut(&p)) {
            parent.children.retain(|child| *child != obj);
        }

        // Children go first, each announcing its own deletion
        for ptr in state.subtree(obj) {
            if let Some(node) = state.objects.remove(&ptr) {
                let event = NativeEvent::new(EventCategory::Delete, ptr);
                for sink in &node.subscribers {
                    sink.deliver(event.clone());
                }
                trace!(target: "proxy", "toolkit deleted {}", ptr);
            }
        }
    }

    fn is_live(&self, obj: ObjectPtr) -> bool {
        self.lock().objects.contains_key(&obj)
    }

    fn subscribe_all(&self, obj: ObjectPtr, sink: EventSink) -> bool {
        match self.lock().objects.get_mut(&obj) {
            Some(node) => {
                node.subscribers.push(sink);
                true
            }
            None => false,
        }
    }
}
