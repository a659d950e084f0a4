#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use glint_config::GlintConfig;
use glint_host::{
    Capabilities, ChunkCompiler, CompileError, Completion, CompletionSink, Engine, Function,
    HeadlessToolkit, MemoryStorage, NativeTask, NetworkService, ScheduleError, TimerService,
};

/// A started native operation as seen by the scheduler
#[derive(Clone)]
pub struct Started {
    pub task: NativeTask,
    pub sink: CompletionSink,
    pub label: String,
}

/// Timer and network service whose operations only complete when a test
/// says so
#[derive(Default)]
pub struct ManualScheduler {
    started: Mutex<Vec<Started>>,
    cancelled: Mutex<Vec<NativeTask>>,
    fail_next: AtomicBool,
}

impl ManualScheduler {
    pub fn fail_next_start(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn record(&self, label: String, sink: CompletionSink) -> Result<NativeTask, ScheduleError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ScheduleError::Exhausted("no free timer slots".to_string()));
        }
        let mut started = self.started.lock().unwrap();
        let task = NativeTask(started.len() as u64 + 1);
        started.push(Started { task, sink, label });
        Ok(task)
    }

    pub fn started(&self) -> Vec<Started> {
        self.started.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<NativeTask> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn is_cancelled(&self, task: NativeTask) -> bool {
        self.cancelled.lock().unwrap().contains(&task)
    }

    /// Complete the `index`th started operation unless it was cancelled
    pub fn complete(&self, index: usize, payload: Completion) -> bool {
        let started = self.started.lock().unwrap()[index].clone();
        if self.is_cancelled(started.task) {
            return false;
        }
        started.sink.complete(payload)
    }

    pub fn fire(&self, index: usize) -> bool {
        self.complete(index, Completion::TimerExpired)
    }
}

impl TimerService for ManualScheduler {
    fn start(
        &self,
        period: Duration,
        repeat: bool,
        sink: CompletionSink,
    ) -> Result<NativeTask, ScheduleError> {
        self.record(format!("timer {:?} repeat={}", period, repeat), sink)
    }

    fn cancel(&self, task: NativeTask) {
        self.cancelled.lock().unwrap().push(task);
    }
}

impl NetworkService for ManualScheduler {
    fn associate(
        &self,
        ssid: &str,
        password: &str,
        sink: CompletionSink,
    ) -> Result<NativeTask, ScheduleError> {
        self.record(format!("associate {} {}", ssid, password), sink)
    }

    fn cancel(&self, task: NativeTask) {
        self.cancelled.lock().unwrap().push(task);
    }
}

/// Compiler that maps known source texts to prepared functions
#[derive(Default)]
pub struct ScriptedCompiler {
    chunks: RefCell<HashMap<String, Function>>,
    compiled: RefCell<Vec<String>>,
}

impl ScriptedCompiler {
    pub fn define(&self, source: &str, chunk: Function) {
        self.chunks.borrow_mut().insert(source.to_string(), chunk);
    }

    /// Chunk names compiled so far
    pub fn compiled(&self) -> Vec<String> {
        self.compiled.borrow().clone()
    }
}

impl ChunkCompiler for ScriptedCompiler {
    fn compile(&self, source: &[u8], chunk_name: &str) -> Result<Function, CompileError> {
        self.compiled.borrow_mut().push(chunk_name.to_string());
        let text = String::from_utf8_lossy(source);
        self.chunks
            .borrow()
            .get(text.as_ref())
            .cloned()
            .ok_or_else(|| CompileError::new(chunk_name, format!("unexpected symbol near '{}'", text)))
    }
}

pub struct Harness {
    pub engine: Engine,
    pub toolkit: Arc<HeadlessToolkit>,
    pub timers: Arc<ManualScheduler>,
    pub network: Arc<ManualScheduler>,
    pub storage: Arc<MemoryStorage>,
    pub compiler: Rc<ScriptedCompiler>,
}

pub fn test_config() -> GlintConfig {
    let mut config = GlintConfig::default();
    config.allocator.near_capacity = 16 * 1024;
    config.allocator.extended_capacity = 256 * 1024;
    config
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: GlintConfig) -> Harness {
    let toolkit = Arc::new(HeadlessToolkit::new());
    let timers = Arc::new(ManualScheduler::default());
    let network = Arc::new(ManualScheduler::default());
    let storage = Arc::new(MemoryStorage::new());
    let compiler = Rc::new(ScriptedCompiler::default());
    let engine = Engine::new(
        &config,
        Capabilities {
            toolkit: toolkit.clone(),
            timers: timers.clone(),
            network: network.clone(),
            storage: storage.clone(),
            compiler: compiler.clone(),
        },
    );
    Harness {
        engine,
        toolkit,
        timers,
        network,
        storage,
        compiler,
    }
}

/// A callable that counts its invocations
pub fn counter(name: &str) -> (Function, Rc<RefCell<u32>>) {
    let count = Rc::new(RefCell::new(0));
    let seen = count.clone();
    let f = Function::new(name, move |_, _| {
        *seen.borrow_mut() += 1;
        Ok(vec![])
    });
    (f, count)
}

pub fn path(p: &str) -> PathBuf {
    PathBuf::from(p)
}
