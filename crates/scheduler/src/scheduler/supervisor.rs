//! Long-lived background tasks owned by the scheduler.
//!
//! Each task is a named OS thread ticking on a fixed interval. Its stop
//! channel doubles as the timer: `recv_timeout` returning `Timeout` is a
//! tick, anything else (a stop message or the sender being dropped) ends
//! the loop. The supervisor owns one slot per task kind, so asking for a
//! task that is already alive is a no-op.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

/// A running background thread and its stop channel.
pub(crate) struct BackgroundTask {
    name: String,
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Spawn a thread calling `tick` every `interval` until stopped or
    /// until `tick` returns `false`.
    pub(crate) fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        let thread_name = name.to_string();
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            debug!("{} started (interval {:?})", thread_name, interval);
            loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if !tick() {
                            break;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("{} stopped", thread_name);
        })?;
        Ok(Self {
            name: name.to_string(),
            stop,
            handle,
        })
    }

    pub(crate) fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the thread and wait for it, unless called from that thread.
    fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.thread().id() == thread::current().id() {
            return;
        }
        if self.handle.join().is_err() {
            warn!("Background task {} panicked", self.name);
        }
    }
}

/// Which background task a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskKind {
    /// Admits queued requests.
    Pump,
    /// Deletes expired history.
    Sweep,
}

impl TaskKind {
    fn thread_name(self) -> &'static str {
        match self {
            TaskKind::Pump => "report-pump",
            TaskKind::Sweep => "report-sweep",
        }
    }
}

/// Owner of the pump and sweep threads.
///
/// Dropping the supervisor drops the stop senders, which ends both loops
/// without blocking.
#[derive(Default)]
pub(crate) struct TaskSupervisor {
    pump: Mutex<Option<BackgroundTask>>,
    sweep: Mutex<Option<BackgroundTask>>,
}

impl TaskSupervisor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: TaskKind) -> &Mutex<Option<BackgroundTask>> {
        match kind {
            TaskKind::Pump => &self.pump,
            TaskKind::Sweep => &self.sweep,
        }
    }

    /// Start the task unless a live one already exists. Returns whether a
    /// thread was started. A task whose thread has exited is replaced.
    pub(crate) fn ensure<F>(&self, kind: TaskKind, interval: Duration, tick: F) -> std::io::Result<bool>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let mut slot = self.slot(kind).lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(BackgroundTask::is_alive) {
            return Ok(false);
        }
        if slot.take().is_some() {
            warn!("Background task {} had exited, restarting", kind.thread_name());
        }
        *slot = Some(BackgroundTask::spawn(kind.thread_name(), interval, tick)?);
        info!("Started {} every {:?}", kind.thread_name(), interval);
        Ok(true)
    }

    pub(crate) fn is_running(&self, kind: TaskKind) -> bool {
        let slot = self.slot(kind).lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().is_some_and(BackgroundTask::is_alive)
    }

    pub(crate) fn live_tasks(&self) -> usize {
        [TaskKind::Pump, TaskKind::Sweep]
            .into_iter()
            .filter(|kind| self.is_running(*kind))
            .count()
    }

    /// Stop both tasks and wait for them to exit.
    pub(crate) fn shutdown(&self) {
        for kind in [TaskKind::Pump, TaskKind::Sweep] {
            let task = self.slot(kind).lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(task) = task {
                task.stop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn counting_tick(counter: &Arc<AtomicUsize>) -> impl FnMut() -> bool + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn ensure_is_idempotent() {
        let supervisor = TaskSupervisor::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let interval = Duration::from_millis(20);

        assert!(supervisor.ensure(TaskKind::Pump, interval, counting_tick(&ticks)).unwrap());
        assert!(!supervisor.ensure(TaskKind::Pump, interval, counting_tick(&ticks)).unwrap());
        assert_eq!(supervisor.live_tasks(), 1);

        supervisor.shutdown();
        assert_eq!(supervisor.live_tasks(), 0);
    }

    #[test]
    fn exited_task_is_restarted() {
        let supervisor = TaskSupervisor::new();
        let interval = Duration::from_millis(5);
        assert!(supervisor.ensure(TaskKind::Sweep, interval, || false).unwrap());

        // The tick returning false ends the thread.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while supervisor.is_running(TaskKind::Sweep) && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!supervisor.is_running(TaskKind::Sweep));

        let ticks = Arc::new(AtomicUsize::new(0));
        assert!(supervisor.ensure(TaskKind::Sweep, interval, counting_tick(&ticks)).unwrap());
        assert!(supervisor.is_running(TaskKind::Sweep));
        supervisor.shutdown();
    }

    #[test]
    fn stop_ends_the_loop_promptly() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let task = BackgroundTask::spawn("test-task", Duration::from_secs(3600), counting_tick(&ticks)).unwrap();
        let started = std::time::Instant::now();
        task.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
