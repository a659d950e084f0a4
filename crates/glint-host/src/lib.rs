/// Runtime bridge between the glint scripting runtime and the native side
///
/// This crate provides the pieces that make embedding a garbage-collected
/// scripting runtime next to a manually-managed GUI toolkit safe: the script
/// heap, object proxies with liveness checks, event callbacks, resumption of
/// script code from asynchronous native operations, and `require` from
/// removable storage. Native-side collaborators are reached only through the
/// traits in [`capabilities`].
pub mod alloc;
pub mod callback;
pub mod capabilities;
pub mod engine;
pub mod error;
pub mod mailbox;
pub mod proxy;
pub mod resolver;
pub mod runtime;
pub mod scheduler;
pub mod storage;
pub mod timer;
pub mod toolkit;

pub use alloc::{AllocStats, HeapBlock, HeterogeneousAllocator, PlacementPolicy, PoolKind};
pub use callback::BindingId;
pub use capabilities::{
    Capabilities, ChunkCompiler, NativeTask, NetworkService, Storage, TextChunkCompiler,
    TimerService, Toolkit,
};
pub use engine::Engine;
pub use error::{CompileError, ScheduleError, ScriptError, ScriptResult, StorageError};
pub use mailbox::{Completion, CompletionSink, EventSink, Mailbox, NativeMessage};
pub use proxy::{ObjectHandle, ProxyState};
pub use resolver::{module_path, ModuleResolver, SearchOutcome, Searcher};
pub use runtime::{ContextId, Function, Registry, RegistryKey, Resumption, Value};
pub use scheduler::{SimulatedNetwork, TokioTimerService};
pub use storage::{DirStorage, MemoryStorage};
pub use timer::{OperationHandle, OperationId, OperationKind};
pub use toolkit::HeadlessToolkit;

pub use glint_events::{EventCategory, NativeEvent, ObjectPtr};
