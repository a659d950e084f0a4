//! Narrow interfaces to the native collaborators of the bridge
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use glint_events::ObjectPtr;

use crate::error::{CompileError, ScheduleError, StorageError};
use crate::mailbox::{CompletionSink, EventSink};
use crate::runtime::{Function, Value};

/// Token for a native timer or background task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeTask(pub u64);

/// The native GUI toolkit
pub trait Toolkit: Send + Sync {
    /// Create an object under `parent`, or under the active screen when `None`
    fn create_object(&self, parent: Option<ObjectPtr>) -> Option<ObjectPtr>;

    /// Delete an object and, recursively, its children
    fn delete_object(&self, obj: ObjectPtr);

    fn is_live(&self, obj: ObjectPtr) -> bool;

    /// Deliver every event raised on `obj`, including the delete
    /// notification, to `sink`. Returns false if `obj` is not live.
    fn subscribe_all(&self, obj: ObjectPtr, sink: EventSink) -> bool;
}

/// OS timers
pub trait TimerService: Send + Sync {
    /// Start a timer that completes `sink` after `period`, and every `period`
    /// after that when `repeat` is set
    fn start(
        &self,
        period: Duration,
        repeat: bool,
        sink: CompletionSink,
    ) -> Result<NativeTask, ScheduleError>;

    /// Stop a timer. Must be a no-op for unknown or finished tasks.
    fn cancel(&self, task: NativeTask);
}

/// Background network association
pub trait NetworkService: Send + Sync {
    /// Start associating with an access point; the result arrives through `sink`.
    /// An empty password selects an open network.
    fn associate(
        &self,
        ssid: &str,
        password: &str,
        sink: CompletionSink,
    ) -> Result<NativeTask, ScheduleError>;

    fn cancel(&self, task: NativeTask);
}

/// Removable storage holding user scripts
pub trait Storage: Send + Sync {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, StorageError>;

    fn exists(&self, path: &Path) -> bool;
}

/// Turns script source into a callable chunk
pub trait ChunkCompiler {
    fn compile(&self, source: &[u8], chunk_name: &str) -> Result<Function, CompileError>;
}

/// Compiles data modules: any UTF-8 source becomes a chunk returning its text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextChunkCompiler;

impl ChunkCompiler for TextChunkCompiler {
    fn compile(&self, source: &[u8], chunk_name: &str) -> Result<Function, CompileError> {
        let text = std::str::from_utf8(source).map_err(|e| {
            CompileError::new(chunk_name, format!("invalid UTF-8 at byte {}", e.valid_up_to()))
        })?;
        let text: Rc<str> = text.into();
        Ok(Function::new(chunk_name, move |_, _| {
            Ok(vec![Value::String(text.clone())])
        }))
    }
}

/// The collaborators an [`Engine`](crate::Engine) is built on
pub struct Capabilities {
    pub toolkit: Arc<dyn Toolkit>,
    pub timers: Arc<dyn TimerService>,
    pub network: Arc<dyn NetworkService>,
    pub storage: Arc<dyn Storage>,
    pub compiler: Rc<dyn ChunkCompiler>,
}
