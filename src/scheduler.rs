//! Worker threads for turn orchestration and axis loops.
//!
//! Two lanes share one lifecycle:
//! - the orchestration lane has a single worker, so turn requests are
//!   processed strictly in submission order;
//! - the axis lane has a small fixed pool (two workers by default, one per
//!   axis) that runs the polling loops themselves.
//!
//! Axis loops block their worker while they sleep between polls. Anything
//! submitted beyond the pool size waits in the lane's queue.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::error::{CameraError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Commands sent to a worker thread.
enum WorkerCommand {
    /// Run a task
    Run(Job),
    /// Stop after everything queued ahead of this command
    Stop,
}

struct Completion<T> {
    /// `None` while pending, `Some(None)` if the task was dropped unrun
    result: Mutex<Option<Option<T>>>,
    done: Condvar,
}

impl<T> Completion<T> {
    fn resolve(&self, value: Option<T>) {
        let mut result = self.result.lock();
        if result.is_none() {
            *result = Some(value);
            self.done.notify_all();
        }
    }
}

/// Write side of a [`TaskHandle`].
///
/// Dropping a completer without calling [`Completer::complete`] resolves the
/// handle with no value, so waiters are never stranded by a task that panicked
/// or was discarded during shutdown.
pub struct Completer<T> {
    cell: Arc<Completion<T>>,
}

impl<T> Completer<T> {
    pub fn complete(self, value: T) {
        self.cell.resolve(Some(value));
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        self.cell.resolve(None);
    }
}

/// Read side of a task's completion. Cloneable; every clone observes the same
/// result.
pub struct TaskHandle<T> {
    cell: Arc<Completion<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Create a linked completer/handle pair.
pub fn completion<T>() -> (Completer<T>, TaskHandle<T>) {
    let cell = Arc::new(Completion {
        result: Mutex::new(None),
        done: Condvar::new(),
    });
    (
        Completer {
            cell: Arc::clone(&cell),
        },
        TaskHandle { cell },
    )
}

impl<T> TaskHandle<T> {
    pub fn is_finished(&self) -> bool {
        self.cell.result.lock().is_some()
    }
}

impl<T: Clone> TaskHandle<T> {
    /// The task's value, if it has finished with one.
    pub fn result(&self) -> Option<T> {
        self.cell.result.lock().clone().flatten()
    }

    /// Block until the task finishes. `None` means it never produced a value.
    pub fn wait(&self) -> Option<T> {
        let mut result = self.cell.result.lock();
        while result.is_none() {
            self.cell.done.wait(&mut result);
        }
        result.clone().flatten()
    }

    /// Block for at most `timeout`; returns whether the task finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut result = self.cell.result.lock();
        while result.is_none() {
            if self.cell.done.wait_until(&mut result, deadline).timed_out() {
                break;
            }
        }
        result.is_some()
    }
}

fn wrap<T, F>(completer: Completer<T>, job: F) -> Job
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    Box::new(move || completer.complete(job()))
}

/// A queue plus the threads draining it.
struct Lane {
    name: &'static str,
    tx: Sender<WorkerCommand>,
    workers: Vec<JoinHandle<()>>,
}

impl Lane {
    fn spawn(name: &'static str, count: usize) -> Result<Self> {
        let (tx, rx) = unbounded::<WorkerCommand>();
        let mut workers = Vec::with_capacity(count);

        for index in 0..count {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, index))
                .spawn(move || Self::worker_loop(name, rx))
                .map_err(|e| CameraError::WorkerSpawn(e.to_string()))?;
            workers.push(handle);
        }

        Ok(Self { name, tx, workers })
    }

    /// Worker thread main loop.
    fn worker_loop(name: &'static str, rx: Receiver<WorkerCommand>) {
        tracing::debug!(lane = name, "Worker started");
        loop {
            match rx.recv() {
                Ok(WorkerCommand::Run(job)) => {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::error!(lane = name, "Task panicked; worker continues");
                    }
                }
                Ok(WorkerCommand::Stop) | Err(_) => break,
            }
        }
        tracing::debug!(lane = name, "Worker exiting");
    }

    fn send(&self, job: Job) -> Result<()> {
        self.tx
            .send(WorkerCommand::Run(job))
            .map_err(|_| CameraError::SchedulerStopped)
    }

    /// Let queued work drain, then join every worker.
    fn shutdown(self) {
        for _ in &self.workers {
            let _ = self.tx.send(WorkerCommand::Stop);
        }
        let current = thread::current().id();
        for handle in self.workers {
            // A task stopping its own scheduler must not join itself.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!(lane = self.name, "Worker terminated abnormally");
            }
        }
    }
}

struct Lanes {
    orchestration: Lane,
    axis: Lane,
}

/// Submits work to the axis lane from inside an orchestration task.
///
/// Holding a spawner keeps the axis queue open but does not keep the
/// scheduler itself alive.
#[derive(Clone)]
pub struct AxisSpawner {
    tx: Sender<WorkerCommand>,
}

impl AxisSpawner {
    /// Queue `job` on the axis pool, resolving `completer` with its result.
    pub fn spawn<T, F>(&self, completer: Completer<T>, job: F) -> Result<()>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.tx
            .send(WorkerCommand::Run(wrap(completer, job)))
            .map_err(|_| CameraError::SchedulerStopped)
    }
}

/// Explicitly started and stopped pair of worker lanes.
pub struct TaskScheduler {
    axis_workers: usize,
    lanes: Mutex<Option<Lanes>>,
}

impl TaskScheduler {
    /// Number of axis workers when none is configured: one per axis.
    pub const DEFAULT_AXIS_WORKERS: usize = 2;

    /// Create a stopped scheduler.
    pub fn new(axis_workers: usize) -> Self {
        Self {
            axis_workers: axis_workers.max(1),
            lanes: Mutex::new(None),
        }
    }

    /// Create and start a scheduler in one step.
    pub fn started(axis_workers: usize) -> Result<Self> {
        let scheduler = Self::new(axis_workers);
        scheduler.start()?;
        Ok(scheduler)
    }

    pub fn axis_workers(&self) -> usize {
        self.axis_workers
    }

    pub fn is_running(&self) -> bool {
        self.lanes.lock().is_some()
    }

    /// Spawn the worker threads. Starting a running scheduler is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut lanes = self.lanes.lock();
        if lanes.is_some() {
            return Ok(());
        }

        let orchestration = Lane::spawn("camera-orchestrator", 1)?;
        let axis = Lane::spawn("camera-axis", self.axis_workers)?;
        *lanes = Some(Lanes {
            orchestration,
            axis,
        });

        tracing::info!(axis_workers = self.axis_workers, "Task scheduler started");
        Ok(())
    }

    /// Drain queued work and join all workers.
    ///
    /// Orchestration drains first so that any axis tasks it spawns are queued
    /// before the axis lane is told to stop. Running axis loops are waited
    /// for, not interrupted; cancel them first to stop promptly.
    pub fn stop(&self) {
        let Some(lanes) = self.lanes.lock().take() else {
            return;
        };
        lanes.orchestration.shutdown();
        lanes.axis.shutdown();
        tracing::info!("Task scheduler stopped");
    }

    /// Queue a task on the single orchestration worker.
    pub fn submit<T, F>(&self, job: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let lanes = self.lanes.lock();
        let lanes = lanes.as_ref().ok_or(CameraError::SchedulerStopped)?;
        let (completer, handle) = completion();
        lanes.orchestration.send(wrap(completer, job))?;
        Ok(handle)
    }

    /// Queue a task directly on the axis pool.
    pub fn spawn_axis<T, F>(&self, job: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let lanes = self.lanes.lock();
        let lanes = lanes.as_ref().ok_or(CameraError::SchedulerStopped)?;
        let (completer, handle) = completion();
        lanes.axis.send(wrap(completer, job))?;
        Ok(handle)
    }

    /// A handle orchestration tasks use to reach the axis pool.
    pub fn axis_spawner(&self) -> Result<AxisSpawner> {
        let lanes = self.lanes.lock();
        let lanes = lanes.as_ref().ok_or(CameraError::SchedulerStopped)?;
        Ok(AxisSpawner {
            tx: lanes.axis.tx.clone(),
        })
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_AXIS_WORKERS)
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
