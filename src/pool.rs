//! Bounded-concurrency task pool with caller-owned backpressure
//!
//! A fixed set of C worker threads executes file-inspection tasks. The
//! handoff point is a rendezvous channel (capacity 0), so admission can
//! only succeed when a worker is actually idle and waiting - the "at most
//! C in flight" bound holds structurally, with no pending-submission queue
//! to grow.
//!
//! The pool exposes two operations:
//! - [`TaskPool::wait_for_slot`]: advisory blocking wait until fewer than C
//!   tasks are executing; reserves nothing
//! - [`TaskPool::queue_task`]: non-blocking admission attempt that gives
//!   the task back when no worker is ready
//!
//! The retry protocol belongs to the caller, not the pool: a slot observed
//! free by `wait_for_slot` may be claimed by a concurrent submitter before
//! `queue_task` runs, so callers loop wait-then-attempt until admission
//! succeeds.
//!
//! A task body that panics is caught inside the worker, logged with the
//! task's diagnostic label (the last-known current file), and the slot is
//! released regardless - one bad task never takes down the pool or its
//! siblings.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// An immutable unit of deferred work bound to one diagnostic label
pub struct Task {
    label: String,
    body: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    /// Create a task; the label identifies the work in panic diagnostics
    pub fn new(label: impl Into<String>, body: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label: label.into(),
            body: Box::new(body),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("label", &self.label).finish()
    }
}

/// Shared slot accounting for the advisory wait
struct SlotState {
    active: Mutex<usize>,
    available: Condvar,
}

/// Fixed-capacity executor for file-inspection tasks
pub struct TaskPool {
    sender: Option<Sender<Task>>,
    slots: Arc<SlotState>,
    capacity: usize,
    handles: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Spawn a pool with `capacity` worker threads
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "pool capacity must be at least 1");

        // Rendezvous channel: try_send succeeds only when a worker is
        // blocked in recv, i.e. idle
        let (sender, receiver) = bounded::<Task>(0);
        let slots = Arc::new(SlotState {
            active: Mutex::new(0),
            available: Condvar::new(),
        });

        let mut handles = Vec::with_capacity(capacity);
        for id in 0..capacity {
            let receiver = receiver.clone();
            let slots = Arc::clone(&slots);
            let handle = thread::Builder::new()
                .name(format!("sniff-{}", id))
                .spawn(move || worker_loop(id, receiver, slots))
                .expect("Failed to spawn pool worker thread");
            handles.push(handle);
        }

        Self {
            sender: Some(sender),
            slots,
            capacity,
            handles,
        }
    }

    /// Pool capacity C
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of tasks currently executing (advisory snapshot)
    pub fn active(&self) -> usize {
        *self.slots.active.lock().expect("slot lock poisoned")
    }

    /// Block until fewer than C tasks are executing
    ///
    /// Advisory only: no slot is reserved, and a concurrent submitter may
    /// claim the observed capacity before the caller's next `queue_task`.
    pub fn wait_for_slot(&self) {
        let mut active = self.slots.active.lock().expect("slot lock poisoned");
        while *active >= self.capacity {
            active = self
                .slots
                .available
                .wait(active)
                .expect("slot lock poisoned");
        }
    }

    /// Non-blocking admission attempt
    ///
    /// Returns `Ok(())` when a worker accepted the task, or gives the task
    /// back as `Err` when every worker is busy (the caller retries after
    /// another `wait_for_slot`). Losing the race against other producers is
    /// expected and tolerated.
    pub fn queue_task(&self, task: Task) -> Result<(), Task> {
        let sender = self
            .sender
            .as_ref()
            .expect("queue_task called after join");
        match sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(task)) | Err(TrySendError::Disconnected(task)) => Err(task),
        }
    }

    /// Drain in-flight work and join the worker threads
    pub fn join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender ends each worker's recv loop
        self.sender.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, receiver: Receiver<Task>, slots: Arc<SlotState>) {
    debug!("Pool worker {} started", id);

    while let Ok(task) = receiver.recv() {
        {
            let mut active = slots.active.lock().expect("slot lock poisoned");
            *active += 1;
        }

        let Task { label, body } = task;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(body)) {
            error!(
                "Task panicked: {}; current file: {}",
                panic_message(&panic),
                label
            );
        }

        // Release the slot whether the body succeeded or panicked
        {
            let mut active = slots.active.lock().expect("slot lock poisoned");
            *active -= 1;
        }
        slots.available.notify_all();
    }

    debug!("Pool worker {} finished", id);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}
