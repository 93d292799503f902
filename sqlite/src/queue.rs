//! Prioritized background execution of database work.
//!
//! A [`TransactionQueue`] owns one worker thread that drains a priority heap
//! of units against a shared [`Database`]. Every unit runs inside its own
//! savepoint, so a failing or panicking unit leaves no partial writes and the
//! worker moves on to the next one.
//!
//! Callbacks never assume a particular thread: they are handed to a
//! [`CallbackExecutor`], either [`WorkerExecutor`] (run on the worker right
//! after the unit) or [`ChannelExecutor`] (queued for whoever owns the
//! executor to drain).

use std::any::Any;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{self, AtomicU8};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::database::Database;
use crate::error::{Result, SqliteError};

/// Execution priority, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    /// Work a user is actively waiting on.
    Ui,
}

pub type Callback = Box<dyn FnOnce() + Send>;

/// Where success and error callbacks run.
pub trait CallbackExecutor: Send + Sync {
    fn execute(&self, callback: Callback);
}

/// Runs callbacks on the queue's worker thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerExecutor;

impl CallbackExecutor for WorkerExecutor {
    fn execute(&self, callback: Callback) {
        callback();
    }
}

/// Collects callbacks for the owning thread to run with
/// [`run_pending`](Self::run_pending).
pub struct ChannelExecutor {
    sender: mpsc::Sender<Callback>,
    receiver: Mutex<mpsc::Receiver<Callback>>,
}

impl ChannelExecutor {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Runs every callback delivered so far on the calling thread and
    /// returns how many ran.
    pub fn run_pending(&self) -> usize {
        let pending: Vec<Callback> = self.receiver.lock().try_iter().collect();
        let ran = pending.len();
        for callback in pending {
            callback();
        }
        ran
    }

    /// Waits up to `timeout` for one callback and runs it.
    pub fn run_next(&self, timeout: Duration) -> bool {
        let next = self.receiver.lock().recv_timeout(timeout);
        match next {
            Ok(callback) => {
                callback();
                true
            }
            Err(_) => false,
        }
    }
}

impl Default for ChannelExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackExecutor for ChannelExecutor {
    fn execute(&self, callback: Callback) {
        // The receiver lives as long as `self`, so sending cannot fail.
        let _ = self.sender.send(callback);
    }
}

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;

struct Completion<R> {
    state: AtomicU8,
    result: Mutex<Option<Result<R>>>,
    done: Condvar,
}

impl<R> Completion<R> {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, atomic::Ordering::AcqRel, atomic::Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self, result: Result<R>) {
        *self.result.lock() = Some(result);
        self.done.notify_all();
    }
}

/// A submitted unit of work.
pub struct TransactionHandle<R> {
    completion: Arc<Completion<R>>,
}

impl<R> TransactionHandle<R> {
    /// Cancels the unit if it has not started. Returns whether it was
    /// cancelled; a running unit always completes.
    pub fn cancel(&self) -> bool {
        let cancelled = self.completion.transition(CANCELLED);
        if cancelled {
            self.completion.finish(Err(SqliteError::Cancelled));
        }
        cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.completion.state.load(atomic::Ordering::Acquire) == CANCELLED
    }

    pub fn is_finished(&self) -> bool {
        self.completion.result.lock().is_some()
    }

    /// Blocks until the unit finishes.
    ///
    /// Cancelled, not-ready and discarded units return
    /// [`SqliteError::Cancelled`]; failures come back as
    /// [`SqliteError::Transaction`].
    pub fn wait(self) -> Result<R> {
        let mut slot = self.completion.result.lock();
        loop {
            if let Some(result) = slot.take() {
                return result;
            }
            self.completion.done.wait(&mut slot);
        }
    }
}

/// Runs against the database, or is discarded with `None`. Returns the
/// callback dispatch to run once the database lock is released.
type Unit = Box<dyn FnOnce(Option<&mut Database>) -> Option<Callback> + Send>;

struct Queued {
    priority: Priority,
    sequence: u64,
    unit: Unit,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier submission
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct QueueState {
    pending: BinaryHeap<Queued>,
    next_sequence: u64,
    running: bool,
}

struct QueueShared {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl QueueShared {
    fn next(&self) -> Option<Queued> {
        let mut state = self.state.lock();
        loop {
            if !state.running {
                return None;
            }
            if let Some(queued) = state.pending.pop() {
                return Some(queued);
            }
            self.available.wait(&mut state);
        }
    }
}

/// A single worker thread executing units in priority order.
///
/// Units of equal priority run in submission order. Nothing is ordered
/// across two different queues.
pub struct TransactionQueue {
    name: String,
    shared: Arc<QueueShared>,
    database: Arc<Mutex<Database>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TransactionQueue {
    /// Starts a queue whose worker thread is named `name`.
    pub fn new(name: impl Into<String>, database: Arc<Mutex<Database>>) -> Result<Self> {
        let name = name.into();
        let shared = Arc::new(QueueShared {
            state: Mutex::new(QueueState {
                pending: BinaryHeap::new(),
                next_sequence: 0,
                running: true,
            }),
            available: Condvar::new(),
        });

        let worker = {
            let worker_name = name.clone();
            let shared = Arc::clone(&shared);
            let database = Arc::clone(&database);
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || run_worker(&worker_name, &shared, &database))
                .map_err(|e| SqliteError::Queue(format!("failed to start worker '{name}': {e}")))?
        };
        tracing::debug!(queue = %name, "transaction queue started");

        Ok(Self {
            name,
            shared,
            database,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &Arc<Mutex<Database>> {
        &self.database
    }

    /// Units waiting to run.
    pub fn len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts describing a unit of work; nothing is queued until
    /// [`TransactionBuilder::submit`].
    pub fn transaction<R, F>(&self, work: F) -> TransactionBuilder<'_, R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Database) -> Result<R> + Send + 'static,
    {
        TransactionBuilder {
            queue: self,
            work: Box::new(work),
            priority: Priority::default(),
            ready: None,
            on_success: None,
            on_error: None,
            executor: Arc::new(WorkerExecutor),
        }
    }

    fn enqueue(&self, priority: Priority, unit: Unit) {
        let mut state = self.shared.state.lock();
        if !state.running {
            drop(state);
            tracing::warn!(queue = %self.name, "queue has quit, transaction discarded");
            if let Some(post) = unit(None) {
                post();
            }
            return;
        }
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.pending.push(Queued {
            priority,
            sequence,
            unit,
        });
        drop(state);
        self.shared.available.notify_one();
    }

    /// Stops the worker after its current unit. Units still queued are
    /// discarded and report [`SqliteError::Cancelled`].
    pub fn quit(&self) {
        let discarded = {
            let mut state = self.shared.state.lock();
            state.running = false;
            std::mem::take(&mut state.pending)
        };
        self.shared.available.notify_all();
        for queued in discarded.into_vec() {
            if let Some(post) = (queued.unit)(None) {
                post();
            }
        }

        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            tracing::error!(queue = %self.name, "transaction worker panicked");
        }
    }
}

impl Drop for TransactionQueue {
    fn drop(&mut self) {
        self.quit();
    }
}

fn run_worker(name: &str, shared: &QueueShared, database: &Mutex<Database>) {
    while let Some(queued) = shared.next() {
        let post = {
            let mut db = database.lock();
            (queued.unit)(Some(&mut *db))
        };
        if let Some(post) = post {
            if catch_unwind(AssertUnwindSafe(post)).is_err() {
                tracing::error!(queue = name, "transaction callback panicked");
            }
        }
    }
    tracing::debug!(queue = name, "transaction queue stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// A unit of work being configured for submission.
///
/// Success and error callbacks go through a [`CallbackExecutor`]. The default
/// [`WorkerExecutor`] runs them on the queue's worker thread before the
/// handle completes, so they must not block on the same queue. Pass a
/// [`ChannelExecutor`] to [`callback_executor`](Self::callback_executor) to
/// run them on the thread that drains it instead.
pub struct TransactionBuilder<'q, R> {
    queue: &'q TransactionQueue,
    work: Box<dyn FnOnce(&mut Database) -> Result<R> + Send>,
    priority: Priority,
    ready: Option<Box<dyn FnOnce() -> bool + Send>>,
    on_success: Option<Box<dyn FnOnce(&R) -> Callback + Send>>,
    on_error: Option<Box<dyn FnOnce(SqliteError) + Send>>,
    executor: Arc<dyn CallbackExecutor>,
}

impl<R: Send + 'static> TransactionBuilder<'_, R> {
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Checked on the worker just before running. A unit that is not ready
    /// is dropped without running or calling back.
    pub fn ready_when(mut self, ready: impl FnOnce() -> bool + Send + 'static) -> Self {
        self.ready = Some(Box::new(ready));
        self
    }

    /// Receives a copy of the result through the callback executor.
    pub fn on_success(mut self, callback: impl FnOnce(R) + Send + 'static) -> Self
    where
        R: Clone,
    {
        self.on_success = Some(Box::new(move |result: &R| {
            let result = result.clone();
            Box::new(move || callback(result)) as Callback
        }));
        self
    }

    pub fn on_error(mut self, callback: impl FnOnce(SqliteError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Replaces the default [`WorkerExecutor`] for this unit's callbacks.
    pub fn callback_executor(mut self, executor: Arc<dyn CallbackExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn submit(self) -> TransactionHandle<R> {
        let Self {
            queue,
            work,
            priority,
            ready,
            on_success,
            on_error,
            executor,
        } = self;
        let completion = Arc::new(Completion::new());
        let handle = TransactionHandle {
            completion: Arc::clone(&completion),
        };
        let name = queue.name.clone();

        let unit: Unit = Box::new(move |db| {
            let Some(db) = db else {
                if completion.transition(CANCELLED) {
                    completion.finish(Err(SqliteError::Cancelled));
                }
                return None;
            };
            if !completion.transition(RUNNING) {
                return None;
            }
            if ready.is_some_and(|ready| !ready()) {
                tracing::debug!(queue = %name, "transaction not ready, dropped");
                completion.finish(Err(SqliteError::Cancelled));
                return None;
            }

            let depth = db.savepoint_depth();
            let outcome = match catch_unwind(AssertUnwindSafe(|| db.transaction(work))) {
                Ok(outcome) => outcome,
                Err(panic) => {
                    if let Err(err) = db.unwind_to(depth) {
                        tracing::error!(queue = %name, error = %err, "rollback after panic failed");
                    }
                    Err(SqliteError::Queue(format!(
                        "transaction panicked: {}",
                        panic_message(&*panic)
                    )))
                }
            };

            Some(Box::new(move || match outcome {
                Ok(value) => {
                    if let Some(success) = on_success {
                        executor.execute(success(&value));
                    }
                    completion.finish(Ok(value));
                }
                Err(err) => {
                    tracing::warn!(queue = %name, error = %err, "transaction failed");
                    let err = Arc::new(err);
                    if let Some(on_error) = on_error {
                        let reported = SqliteError::Transaction(Arc::clone(&err));
                        executor.execute(Box::new(move || on_error(reported)));
                    }
                    completion.finish(Err(SqliteError::Transaction(err)));
                }
            }) as Callback)
        });

        queue.enqueue(priority, unit);
        handle
    }
}

/// One shared queue plus dedicated per-table queues over the same database.
pub struct QueueManager {
    database: Arc<Mutex<Database>>,
    shared: Arc<TransactionQueue>,
    dedicated: Mutex<HashMap<String, Arc<TransactionQueue>>>,
}

impl QueueManager {
    pub const SHARED_QUEUE: &'static str = "sqlweave-shared";

    pub fn new(database: Arc<Mutex<Database>>) -> Result<Self> {
        let shared = Arc::new(TransactionQueue::new(
            Self::SHARED_QUEUE,
            Arc::clone(&database),
        )?);
        Ok(Self {
            database,
            shared,
            dedicated: Mutex::new(HashMap::new()),
        })
    }

    pub fn database(&self) -> &Arc<Mutex<Database>> {
        &self.database
    }

    pub fn shared(&self) -> Arc<TransactionQueue> {
        Arc::clone(&self.shared)
    }

    /// The dedicated queue for `table`, started on first use.
    pub fn for_table(&self, table: &str) -> Result<Arc<TransactionQueue>> {
        let mut dedicated = self.dedicated.lock();
        if let Some(queue) = dedicated.get(table) {
            return Ok(Arc::clone(queue));
        }
        let queue = Arc::new(TransactionQueue::new(
            format!("sqlweave-{table}"),
            Arc::clone(&self.database),
        )?);
        dedicated.insert(table.to_string(), Arc::clone(&queue));
        Ok(queue)
    }

    /// Stops every queue.
    pub fn quit(&self) {
        self.shared.quit();
        for queue in self.dedicated.lock().values() {
            queue.quit();
        }
    }
}
