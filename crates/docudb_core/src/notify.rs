//! Notification bus: executors and listener registries.
//!
//! Writers never run listener code themselves. Posting an event hands one
//! task per listener to that listener's [`Executor`]; the default
//! [`SerialExecutor`] runs tasks on its own thread in the order they were
//! posted, so events reach a listener in commit order and a slow listener
//! only delays other listeners sharing its executor.
//!
//! Writers that post while holding their own locks use
//! [`ListenerRegistry::enqueue`] under the lock and
//! [`ListenerRegistry::flush`] after releasing it. Events still go out in
//! enqueue order, and an inline listener is free to call back into the
//! writer.

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::warn;

/// A unit of work handed to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs listener callbacks.
pub trait Executor: Send + Sync {
    /// Schedules `task`. Tasks posted from one thread must run in order.
    fn execute(&self, task: Task);
}

/// Runs every task on one dedicated thread, in submission order.
pub struct SerialExecutor {
    queue: Mutex<Option<Sender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SerialExecutor {
    /// Starts the executor thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn the thread.
    pub fn new(name: impl Into<String>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Task>();
        let worker = thread::Builder::new().name(name.into()).spawn(move || {
            for task in rx {
                task();
            }
        })?;
        Ok(Self {
            queue: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Runs the remaining queued tasks, then stops the thread.
    ///
    /// Tasks submitted afterwards are dropped.
    pub fn shutdown(&self) {
        drop(self.queue.lock().take());
        if let Some(worker) = self.worker.lock().take() {
            if worker.thread().id() == thread::current().id() {
                // Called from a task: the loop ends once the queue drains.
                return;
            }
            if worker.join().is_err() {
                warn!("notification thread panicked");
            }
        }
    }
}

impl Executor for SerialExecutor {
    fn execute(&self, task: Task) {
        if let Some(queue) = self.queue.lock().as_ref() {
            // A send error means the thread is gone; the task is dropped.
            let _ = queue.send(task);
        }
    }
}

impl Drop for SerialExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs tasks immediately on the posting thread.
///
/// Only suitable for listeners that never block.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) {
        task();
    }
}

/// Handle returned when a listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

impl fmt::Display for ListenerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registration<E> {
    token: ListenerToken,
    executor: Arc<dyn Executor>,
    callback: Callback<E>,
}

/// A set of listeners for events of type `E`.
pub struct ListenerRegistry<E> {
    listeners: RwLock<Vec<Registration<E>>>,
    next_token: AtomicU64,
    pending: Mutex<VecDeque<E>>,
    dispatching: AtomicBool,
}

impl<E: Send + Sync + 'static> ListenerRegistry<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_token: AtomicU64::new(1),
            pending: Mutex::new(VecDeque::new()),
            dispatching: AtomicBool::new(false),
        }
    }

    /// Registers `callback` to run on `executor`.
    pub fn add(
        &self,
        executor: Arc<dyn Executor>,
        callback: impl Fn(&E) + Send + Sync + 'static,
    ) -> ListenerToken {
        let token = ListenerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Registration {
            token,
            executor,
            callback: Arc::new(callback),
        });
        token
    }

    /// Unregisters a listener. Returns false for an unknown token.
    ///
    /// Tasks already handed to the executor still run.
    pub fn remove(&self, token: ListenerToken) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|r| r.token != token);
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns true if nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Hands `event` to every listener's executor.
    pub fn post(&self, event: E) {
        self.enqueue(event);
        self.flush();
    }

    /// Queues `event` without delivering it.
    ///
    /// Nothing reaches a listener until the next [`ListenerRegistry::flush`].
    pub fn enqueue(&self, event: E) {
        self.pending.lock().push_back(event);
    }

    /// Delivers queued events in enqueue order.
    ///
    /// Only one thread dispatches at a time. A call made while another
    /// dispatch is running, including a nested call from an inline
    /// listener, returns at once and its events go out with that dispatch.
    pub fn flush(&self) {
        loop {
            if self
                .dispatching
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                return;
            }
            {
                let _dispatching = ClearOnDrop(&self.dispatching);
                loop {
                    let next = self.pending.lock().pop_front();
                    match next {
                        Some(event) => self.dispatch(event),
                        None => break,
                    }
                }
            }
            // An event queued after the last pop saw the flag still set.
            if self.pending.lock().is_empty() {
                return;
            }
        }
    }

    fn dispatch(&self, event: E) {
        let event = Arc::new(event);
        let targets: Vec<(Arc<dyn Executor>, Callback<E>)> = self
            .listeners
            .read()
            .iter()
            .map(|r| (Arc::clone(&r.executor), Arc::clone(&r.callback)))
            .collect();
        for (executor, callback) in targets {
            let event = Arc::clone(&event);
            executor.execute(Box::new(move || callback(&event)));
        }
    }
}

/// Clears the dispatch flag even if an inline listener panics.
struct ClearOnDrop<'a>(&'a AtomicBool);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<E: Send + Sync + 'static> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
