//! Timer and network services backed by tokio tasks.
//!
//! Each native operation runs as its own task on a tokio runtime and reports
//! back only through its completion sink, so it never touches the script
//! runtime directly.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use crate::capabilities::{NativeTask, NetworkService, TimerService};
use crate::error::ScheduleError;
use crate::mailbox::{Completion, CompletionSink};

/// Running tasks by id; finished tasks remove themselves
#[derive(Debug, Default, Clone)]
struct TaskTable {
    tasks: Arc<Mutex<HashMap<u64, AbortHandle>>>,
    next_id: Arc<AtomicU64>,
}

impl TaskTable {
    fn spawn<F>(&self, handle: &Handle, work: F) -> NativeTask
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let tasks = self.tasks.clone();
        // Held across spawn so the task cannot remove itself before it is inserted
        let mut table = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let join = handle.spawn(async move {
            work.await;
            tasks
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);
        });
        table.insert(id, join.abort_handle());
        NativeTask(id)
    }

    fn cancel(&self, task: NativeTask) {
        let removed = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&task.0);
        if let Some(abort) = removed {
            abort.abort();
            trace!(target: "timers", "aborted native task {}", task.0);
        }
    }

    fn active(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// OS timers as tokio sleep / interval tasks
#[derive(Debug, Clone)]
pub struct TokioTimerService {
    handle: Handle,
    table: TaskTable,
}

impl TokioTimerService {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            table: TaskTable::default(),
        }
    }

    /// Use the runtime the caller is running on
    pub fn current() -> Result<Self, ScheduleError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| ScheduleError::NoExecutor)
    }

    /// Timers that have neither finished nor been cancelled
    pub fn active(&self) -> usize {
        self.table.active()
    }
}

impl TimerService for TokioTimerService {
    fn start(
        &self,
        period: Duration,
        repeat: bool,
        sink: CompletionSink,
    ) -> Result<NativeTask, ScheduleError> {
        if period.is_zero() {
            return Err(ScheduleError::Rejected(
                "timer period must be non-zero".to_string(),
            ));
        }

        let task = self.table.spawn(&self.handle, async move {
            if repeat {
                let mut ticker = time::interval_at(Instant::now() + period, period);
                loop {
                    ticker.tick().await;
                    if !sink.complete(Completion::TimerExpired) {
                        break;
                    }
                }
            } else {
                time::sleep(period).await;
                sink.complete(Completion::TimerExpired);
            }
        });
        debug!(target: "timers", "Started native timer {} ({:?}, repeat={})", task.0, period, repeat);
        Ok(task)
    }

    fn cancel(&self, task: NativeTask) {
        self.table.cancel(task);
    }
}

/// Wi-Fi association against a fixed set of known access points
#[derive(Debug, Clone)]
pub struct SimulatedNetwork {
    handle: Handle,
    table: TaskTable,
    /// ssid -> password, empty for open networks
    access_points: Arc<Mutex<HashMap<String, String>>>,
    latency: Duration,
}

impl SimulatedNetwork {
    pub fn new(handle: Handle, latency: Duration) -> Self {
        Self {
            handle,
            table: TaskTable::default(),
            access_points: Arc::new(Mutex::new(HashMap::new())),
            latency,
        }
    }

    pub fn add_access_point(&self, ssid: &str, password: &str) {
        self.access_points
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(ssid.to_string(), password.to_string());
    }
}

impl NetworkService for SimulatedNetwork {
    fn associate(
        &self,
        ssid: &str,
        password: &str,
        sink: CompletionSink,
    ) -> Result<NativeTask, ScheduleError> {
        if ssid.is_empty() || ssid.len() > 32 {
            return Err(ScheduleError::Rejected(format!("invalid ssid '{}'", ssid)));
        }

        let connected = self
            .access_points
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(ssid)
            .is_some_and(|expected| expected == password);
        let latency = self.latency;
        let task = self.table.spawn(&self.handle, async move {
            time::sleep(latency).await;
            let message = if connected {
                "Connected to WiFi"
            } else {
                "Failed to connect to WiFi"
            };
            sink.complete(Completion::Association {
                connected,
                message: message.to_string(),
            });
        });
        debug!(target: "timers", "Associating with '{}' as task {}", ssid, task.0);
        Ok(task)
    }

    fn cancel(&self, task: NativeTask) {
        self.table.cancel(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{Mailbox, NativeMessage};
    use crate::timer::OperationId;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_timer_ticks() {
        let mut mailbox = Mailbox::new();
        let service = TokioTimerService::current().unwrap();
        let task = service
            .start(
                Duration::from_millis(100),
                true,
                mailbox.completion_sink(OperationId(1)),
            )
            .unwrap();

        for _ in 0..3 {
            let msg = mailbox.next().await.unwrap();
            assert_eq!(
                msg,
                NativeMessage::Completion {
                    operation: OperationId(1),
                    payload: Completion::TimerExpired,
                }
            );
        }

        service.cancel(task);
        service.cancel(task);
        assert_eq!(service.active(), 0);
        time::sleep(Duration::from_millis(500)).await;
        assert!(mailbox.try_next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_removes_itself() {
        let mut mailbox = Mailbox::new();
        let service = TokioTimerService::current().unwrap();
        service
            .start(
                Duration::from_millis(50),
                false,
                mailbox.completion_sink(OperationId(2)),
            )
            .unwrap();
        assert_eq!(service.active(), 1);

        assert!(mailbox.next().await.is_some());
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(service.active(), 0);
    }

    #[tokio::test]
    async fn test_zero_period_rejected() {
        let mailbox = Mailbox::new();
        let service = TokioTimerService::current().unwrap();
        let result = service.start(Duration::ZERO, true, mailbox.completion_sink(OperationId(3)));
        assert!(matches!(result, Err(ScheduleError::Rejected(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_association_outcomes() {
        let mut mailbox = Mailbox::new();
        let network = SimulatedNetwork::new(Handle::current(), Duration::from_millis(20));
        network.add_access_point("lab", "hunter22");
        network.add_access_point("cafe", "");

        network
            .associate("lab", "hunter22", mailbox.completion_sink(OperationId(1)))
            .unwrap();
        network
            .associate("cafe", "", mailbox.completion_sink(OperationId(2)))
            .unwrap();
        network
            .associate("lab", "wrong", mailbox.completion_sink(OperationId(3)))
            .unwrap();

        let mut results = HashMap::new();
        for _ in 0..3 {
            if let Some(NativeMessage::Completion {
                operation,
                payload: Completion::Association { connected, .. },
            }) = mailbox.next().await
            {
                results.insert(operation, connected);
            }
        }
        assert_eq!(results.get(&OperationId(1)), Some(&true));
        assert_eq!(results.get(&OperationId(2)), Some(&true));
        assert_eq!(results.get(&OperationId(3)), Some(&false));

        assert!(network
            .associate("", "", mailbox.completion_sink(OperationId(4)))
            .is_err());
    }
}
