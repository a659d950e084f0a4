//! Serialization point between native execution contexts and the runtime.
//!
//! Toolkit event handlers, timer callbacks and background tasks never touch
//! the runtime directly: they post a [`NativeMessage`] through a sink, and the
//! runtime's own loop drains the mailbox.
use glint_events::NativeEvent;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::callback::BindingId;
use crate::runtime::Value;
use crate::timer::OperationId;

/// Result data of an asynchronous native operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    TimerExpired,
    Association { connected: bool, message: String },
}

impl Completion {
    /// Arguments passed to the resumed callable
    pub fn into_args(self) -> Vec<Value> {
        match self {
            Completion::TimerExpired => Vec::new(),
            Completion::Association { connected, message } => {
                vec![Value::from(connected), Value::from(message)]
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NativeMessage {
    Event {
        binding: BindingId,
        event: NativeEvent,
    },
    Completion {
        operation: OperationId,
        payload: Completion,
    },
}

/// Handed to the toolkit as the user data of one event subscription
#[derive(Debug, Clone)]
pub struct EventSink {
    binding: BindingId,
    tx: UnboundedSender<NativeMessage>,
}

impl EventSink {
    pub fn binding(&self) -> BindingId {
        self.binding
    }

    /// Post an event. Returns false once the runtime is gone.
    pub fn deliver(&self, event: NativeEvent) -> bool {
        self.tx
            .send(NativeMessage::Event {
                binding: self.binding,
                event,
            })
            .is_ok()
    }
}

/// Handed to a timer or background task to report its result
#[derive(Debug, Clone)]
pub struct CompletionSink {
    operation: OperationId,
    tx: UnboundedSender<NativeMessage>,
}

impl CompletionSink {
    pub fn operation(&self) -> OperationId {
        self.operation
    }

    pub fn complete(&self, payload: Completion) -> bool {
        self.tx
            .send(NativeMessage::Completion {
                operation: self.operation,
                payload,
            })
            .is_ok()
    }
}

pub struct Mailbox {
    tx: UnboundedSender<NativeMessage>,
    rx: UnboundedReceiver<NativeMessage>,
}

impl Mailbox {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn event_sink(&self, binding: BindingId) -> EventSink {
        EventSink {
            binding,
            tx: self.tx.clone(),
        }
    }

    pub fn completion_sink(&self, operation: OperationId) -> CompletionSink {
        CompletionSink {
            operation,
            tx: self.tx.clone(),
        }
    }

    pub fn try_next(&mut self) -> Option<NativeMessage> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next message
    pub async fn next(&mut self) -> Option<NativeMessage> {
        self.rx.recv().await
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}
