//! Script-side proxies for natively-owned GUI objects.
//!
//! The toolkit may delete an object behind the script's back (a parent
//! delete cascades to its children without telling anyone), so a proxy's
//! cached pointer is never trusted: every use asks the toolkit whether the
//! object is still live.
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use glint_events::ObjectPtr;
use tracing::{debug, warn};

use crate::capabilities::Toolkit;
use crate::error::{ScriptError, ScriptResult};
use crate::timer::OperationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Live(ObjectPtr),
    Invalidated,
}

/// Cleanup owed to the native side once a script value became unreachable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Finalizer {
    Object(ObjectPtr),
    Operation(OperationId),
}

/// Finalizers queued by `Drop` and run later at a safe point
#[derive(Debug, Clone, Default)]
pub(crate) struct FinalizerQueue(Rc<RefCell<VecDeque<Finalizer>>>);

impl FinalizerQueue {
    pub(crate) fn defer(&self, finalizer: Finalizer) {
        self.0.borrow_mut().push_back(finalizer);
    }

    pub(crate) fn take(&self) -> VecDeque<Finalizer> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    pub(crate) fn len(&self) -> usize {
        self.0.borrow().len()
    }
}

#[derive(Debug)]
struct ProxyCell {
    state: Cell<ProxyState>,
    finalizers: FinalizerQueue,
}

impl Drop for ProxyCell {
    fn drop(&mut self) {
        if let ProxyState::Live(ptr) = self.state.get() {
            self.finalizers.defer(Finalizer::Object(ptr));
        }
    }
}

/// Script handle to one native object.
///
/// Clones share state; wrapping the same pointer twice yields independent handles.
#[derive(Debug, Clone)]
pub struct ObjectHandle(Rc<ProxyCell>);

impl ObjectHandle {
    pub fn state(&self) -> ProxyState {
        self.0.state.get()
    }

    /// The cached pointer, without any liveness check
    pub fn cached_pointer(&self) -> Option<ObjectPtr> {
        match self.state() {
            ProxyState::Live(ptr) => Some(ptr),
            ProxyState::Invalidated => None,
        }
    }

    /// Whether both values are the same handle
    pub fn ptr_eq(&self, other: &ObjectHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn invalidate(&self) {
        self.0.state.set(ProxyState::Invalidated);
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state() {
            ProxyState::Live(ptr) => write!(f, "object: {}", ptr),
            ProxyState::Invalidated => write!(f, "object: <deleted>"),
        }
    }
}

pub(crate) struct ProxyBridge {
    toolkit: Arc<dyn Toolkit>,
    finalizers: FinalizerQueue,
}

impl ProxyBridge {
    pub(crate) fn new(toolkit: Arc<dyn Toolkit>, finalizers: FinalizerQueue) -> Self {
        Self {
            toolkit,
            finalizers,
        }
    }

    pub(crate) fn wrap(&self, ptr: ObjectPtr) -> ObjectHandle {
        ObjectHandle(Rc::new(ProxyCell {
            state: Cell::new(ProxyState::Live(ptr)),
            finalizers: self.finalizers.clone(),
        }))
    }

    pub(crate) fn create(&self, parent: Option<&ObjectHandle>) -> ScriptResult<ObjectHandle> {
        let parent = parent.map(|handle| self.check(handle)).transpose()?;
        let ptr = self
            .toolkit
            .create_object(parent)
            .ok_or_else(|| ScriptError::runtime("failed to create object"))?;
        debug!(target: "proxy", "Created object {}", ptr);
        Ok(self.wrap(ptr))
    }

    /// Dereference with a liveness check
    pub(crate) fn check(&self, handle: &ObjectHandle) -> ScriptResult<ObjectPtr> {
        match handle.state() {
            ProxyState::Live(ptr) if self.toolkit.is_live(ptr) => Ok(ptr),
            ProxyState::Live(ptr) => {
                warn!(target: "proxy", "Use of deleted object {}", ptr);
                handle.invalidate();
                Err(ScriptError::StaleHandle)
            }
            ProxyState::Invalidated => {
                warn!(target: "proxy", "Use of invalidated object handle");
                Err(ScriptError::StaleHandle)
            }
        }
    }

    pub(crate) fn is_valid(&self, handle: &ObjectHandle) -> bool {
        match handle.state() {
            ProxyState::Live(ptr) => self.toolkit.is_live(ptr),
            ProxyState::Invalidated => false,
        }
    }

    /// Delete-then-invalidate. Later calls on the same handle do nothing.
    pub(crate) fn delete(&self, handle: &ObjectHandle) {
        if let ProxyState::Live(ptr) = handle.state() {
            if self.toolkit.is_live(ptr) {
                debug!(target: "proxy", "Deleting object {}", ptr);
                self.toolkit.delete_object(ptr);
            }
        }
        handle.invalidate();
    }

    /// Finalizer path for a collected handle whose object may already be gone
    pub(crate) fn finalize(&self, ptr: ObjectPtr) {
        if self.toolkit.is_live(ptr) {
            debug!(target: "proxy", "Finalizer deleting object {}", ptr);
            self.toolkit.delete_object(ptr);
        }
    }
}
