//! Isolate threads and the handles used to reach them.
//!
//! Each isolate owns one OS thread and a FIFO queue. Work from other threads
//! is message-passed onto that queue, never run against the isolate's state
//! from a foreign thread.

use std::ffi::c_void;
use std::fmt;
use std::mem::ManuallyDrop;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::context::ContextHandle;
use super::environment::{self, Environment};
use super::panic_message;
use super::three_phase_task::{ClosureTask, PendingTask, run_async, run_sync};
use crate::config::IsolateConfig;
use crate::error::{Error, Result};

static NEXT_ISOLATE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide isolate identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IsolateId(u64);

impl IsolateId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for IsolateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "isolate-{}", self.0)
    }
}

/// Unit of work run on an isolate thread.
pub(crate) type Task = Box<dyn FnOnce(&Environment) + Send + 'static>;

enum Message {
    Run(Task),
    Shutdown,
}

struct IsolateShared {
    id: IsolateId,
    name: String,
    sender: mpsc::UnboundedSender<Message>,
    disposed: AtomicBool,
}

/// Cloneable, thread-safe handle to an isolate.
#[derive(Clone)]
pub struct IsolateHolder {
    shared: Arc<IsolateShared>,
}

impl fmt::Debug for IsolateHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolateHolder")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl IsolateHolder {
    pub fn id(&self) -> IsolateId {
        self.shared.id
    }

    /// Name of the isolate thread.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Whether the calling thread is this isolate's thread.
    pub fn is_current(&self) -> bool {
        environment::current_isolate_id() == Some(self.id())
    }

    /// Pointer to the shared state, as handed to native modules.
    pub(crate) fn as_raw(&self) -> *const c_void {
        Arc::as_ptr(&self.shared) as *const c_void
    }

    /// Borrow the holder behind a pointer from [`as_raw`](Self::as_raw).
    ///
    /// # Safety
    /// The shared state behind `raw` must still be alive.
    pub(crate) unsafe fn with_raw<R>(raw: *const c_void, f: impl FnOnce(&IsolateHolder) -> R) -> R {
        let shared = unsafe { Arc::from_raw(raw as *const IsolateShared) };
        let holder = ManuallyDrop::new(IsolateHolder { shared });
        f(&holder)
    }

    /// Take a strong reference on the shared state behind `raw`.
    ///
    /// # Safety
    /// Same as [`with_raw`](Self::with_raw).
    pub(crate) unsafe fn retain_raw(raw: *const c_void) {
        unsafe { Arc::increment_strong_count(raw as *const IsolateShared) };
    }

    /// Give back a reference taken with [`retain_raw`](Self::retain_raw).
    ///
    /// # Safety
    /// Every call must pair with an earlier `retain_raw`.
    pub(crate) unsafe fn release_raw(raw: *const c_void) {
        unsafe { Arc::decrement_strong_count(raw as *const IsolateShared) };
    }

    /// Queue a task at the back of the isolate's queue.
    pub(crate) fn schedule(&self, task: Task) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::TargetDisposed);
        }
        self.shared
            .sender
            .send(Message::Run(task))
            .map_err(|_| Error::TargetDisposed)
    }

    /// Dispose the isolate.
    ///
    /// Tasks that have not started yet are dropped; their callers get
    /// [`Error::TargetDisposed`]. Does not wait for the thread to exit.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(isolate = %self.id(), "Disposing isolate");
        let _ = self.shared.sender.send(Message::Shutdown);
    }

    /// Run `f` on the isolate and wait for its result.
    pub fn execute_sync<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Environment) -> R + Send + 'static,
        R: Send + 'static,
    {
        run_sync(self, ClosureTask::new(f))
    }

    /// Run `f` on the isolate without blocking the caller.
    pub fn execute<F, R>(&self, f: F) -> PendingTask<ClosureTask<F, R>>
    where
        F: FnOnce(&Environment) -> R + Send + 'static,
        R: Send + 'static,
    {
        run_async(self, ClosureTask::new(f))
    }

    /// Create a new context in this isolate.
    pub fn create_context(&self) -> Result<ContextHandle> {
        let id = self.execute_sync(|env| env.heap_mut().create_context())?;
        debug!(isolate = %self.id(), context = %id, "Context created");
        Ok(ContextHandle::new(self.clone(), id))
    }
}

/// Owner of an isolate thread.
///
/// Dropping it disposes the isolate and joins its thread.
pub struct Isolate {
    holder: IsolateHolder,
    thread: Option<JoinHandle<()>>,
}

impl Isolate {
    /// Spawn a new isolate.
    pub fn new(config: IsolateConfig) -> Result<Self> {
        let id = IsolateId(NEXT_ISOLATE_ID.fetch_add(1, Ordering::Relaxed));
        let name = format!("{}-{}", config.name, id.0);
        let (sender, receiver) = mpsc::unbounded_channel();

        let holder = IsolateHolder {
            shared: Arc::new(IsolateShared {
                id,
                name: name.clone(),
                sender,
                disposed: AtomicBool::new(false),
            }),
        };

        let worker_holder = holder.clone();
        let thread = thread::Builder::new()
            .name(name)
            .stack_size(config.stack_size)
            .spawn(move || run_worker(worker_holder, receiver))?;

        info!(isolate = %id, stack_size = config.stack_size, "Isolate started");

        Ok(Self {
            holder,
            thread: Some(thread),
        })
    }

    pub fn id(&self) -> IsolateId {
        self.holder.id()
    }

    pub fn holder(&self) -> &IsolateHolder {
        &self.holder
    }

    pub fn is_disposed(&self) -> bool {
        self.holder.is_disposed()
    }

    /// See [`IsolateHolder::create_context`].
    pub fn create_context(&self) -> Result<ContextHandle> {
        self.holder.create_context()
    }

    /// See [`IsolateHolder::dispose`].
    pub fn dispose(&self) {
        self.holder.dispose();
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        self.holder.dispose();
        let Some(thread) = self.thread.take() else {
            return;
        };
        // Dropped from inside its own isolate: the thread exits on its own.
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            error!(isolate = %self.holder.id(), "Isolate thread terminated abnormally");
        }
    }
}

fn run_worker(holder: IsolateHolder, mut receiver: mpsc::UnboundedReceiver<Message>) {
    let id = holder.id();
    let env = Rc::new(Environment::new(holder.clone()));
    environment::enter(Rc::clone(&env));

    let mut dropped = 0usize;
    while let Some(message) = receiver.blocking_recv() {
        match message {
            Message::Run(task) => {
                if holder.is_disposed() {
                    dropped += 1;
                    drop(task);
                    continue;
                }
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task(&env))) {
                    error!(
                        isolate = %id,
                        panic = %panic_message(payload.as_ref()),
                        "Isolate task panicked"
                    );
                }
            }
            Message::Shutdown => break,
        }
    }

    receiver.close();
    while let Ok(message) = receiver.try_recv() {
        if matches!(message, Message::Run(_)) {
            dropped += 1;
        }
    }

    environment::exit();
    drop(env);
    info!(isolate = %id, dropped_tasks = dropped, "Isolate stopped");
}
