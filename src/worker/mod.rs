//! Sequential worker threads
//!
//! Every preview session owns one [`Worker`]: a dedicated named thread with an
//! unbounded FIFO queue. The worker's state is constructed on the thread and
//! never leaves it, so native handles stored in it are only ever touched by
//! the thread that created them.
//!
//! # Shutdown
//!
//! - [`Worker::close`] stops accepting tasks, lets the queue drain, runs
//!   [`WorkerState::on_exit`] and ends the thread
//! - [`Worker::terminate`] abandons the thread: no further task runs and the
//!   state is leaked rather than dropped, because a thread stuck in a native
//!   call cannot be preempted

pub mod watchdog;

pub use watchdog::{SweepReport, UnloadEntry, UnloadRegistry, Watchdog};

use std::any::Any;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use tracing::{Span, debug, error};

type Task<S> = Box<dyn FnOnce(&mut S) + Send>;

/// State owned by a worker thread
pub trait WorkerState {
    /// A task panicked; the message is the panic payload
    fn on_panic(&mut self, message: String);

    /// Stop processing further tasks after the current one
    fn is_done(&self) -> bool {
        false
    }

    /// Runs on the worker thread after the last task
    fn on_exit(&mut self) {}
}

struct Control {
    abandoned: AtomicBool,
}

/// Dedicated thread running tasks strictly in submission order
pub struct Worker<S> {
    name: String,
    sender: Mutex<Option<Sender<Task<S>>>>,
    control: Arc<Control>,
    done: Receiver<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S: WorkerState + 'static> Worker<S> {
    /// Start a worker whose state is built by `init` on the new thread
    ///
    /// Every task runs inside `span`.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if the thread cannot be spawned.
    pub fn spawn<F>(name: impl Into<String>, span: Span, init: F) -> io::Result<Self>
    where
        F: FnOnce() -> S + Send + 'static,
    {
        let name = name.into();
        let (sender, tasks) = unbounded::<Task<S>>();
        let (done_tx, done) = unbounded::<()>();
        let control = Arc::new(Control {
            abandoned: AtomicBool::new(false),
        });

        let thread_control = Arc::clone(&control);
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let _done = done_tx;
            let _entered = span.enter();
            run(init(), &tasks, &thread_control);
        })?;

        debug!(worker = %name, "started");
        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            control,
            done,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue a task; returns `false` if the worker no longer accepts work
    pub fn submit(&self, task: impl FnOnce(&mut S) + Send + 'static) -> bool {
        self.sender
            .lock()
            .as_ref()
            .is_some_and(|sender| sender.send(Box::new(task)).is_ok())
    }

    /// Stop accepting tasks; queued tasks still run
    pub fn close(&self) {
        self.sender.lock().take();
    }

    /// Abandon the thread without running further tasks
    pub fn terminate(&self) {
        self.control.abandoned.store(true, Ordering::SeqCst);
        self.close();
        // detach
        self.handle.lock().take();
        debug!(worker = %self.name, "abandoned");
    }

    /// Whether the thread has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.done.try_recv(), Err(crossbeam_channel::TryRecvError::Disconnected))
    }

    /// Wait up to `timeout` for the thread to end
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> bool {
        matches!(
            self.done.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn run<S: WorkerState>(mut state: S, tasks: &Receiver<Task<S>>, control: &Control) {
    while let Ok(task) = tasks.recv() {
        if control.abandoned.load(Ordering::SeqCst) {
            break;
        }
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| task(&mut state))) {
            let message = panic_message(payload.as_ref());
            error!(%message, "worker task panicked");
            state.on_panic(message);
        }
        if state.is_done() {
            break;
        }
    }

    if control.abandoned.load(Ordering::SeqCst) {
        // handles of an abandoned worker are leaked
        std::mem::forget(state);
        return;
    }
    state.on_exit();
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
