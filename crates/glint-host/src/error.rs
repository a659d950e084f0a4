use std::any::Any;
use std::path::PathBuf;

use thiserror::Error;

pub type ScriptResult<T> = Result<T, ScriptError>;

/// An error raised inside the script runtime
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error("{0}")]
    Runtime(String),

    #[error("bad argument #{position} to '{function}' ({message})")]
    BadArgument {
        position: usize,
        function: String,
        message: String,
    },

    /// A proxy handle whose native object is gone was used
    #[error("attempt to use an invalid or deleted object")]
    StaleHandle,

    #[error("not enough memory (requested {requested} bytes)")]
    OutOfMemory { requested: usize },

    /// `tried` already carries one "\n\t..." line per search strategy
    #[error("module '{name}' not found:{tried}")]
    ModuleNotFound { name: String, tried: String },

    #[error("failed to schedule {what}: {source}")]
    Schedule {
        what: String,
        #[source]
        source: ScheduleError,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ScriptError {
    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Runtime(message.into())
    }

    pub fn bad_argument(position: usize, function: &str, message: impl Into<String>) -> Self {
        ScriptError::BadArgument {
            position,
            function: function.to_string(),
            message: message.into(),
        }
    }
}

/// Native timer or background task creation failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("no executor available")]
    NoExecutor,
    #[error("native resources exhausted: {0}")]
    Exhausted(String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{chunk}: {message}")]
pub struct CompileError {
    pub chunk: String,
    pub message: String,
}

impl CompileError {
    pub fn new(chunk: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            chunk: chunk.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("cannot open {}", .0.display())]
    NotFound(PathBuf),
    #[error("cannot read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
