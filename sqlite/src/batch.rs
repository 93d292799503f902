//! Coalesces individual model saves into batched transactions.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use sqlweave_core::Model;
use sqlweave_db::QueueConfig;

use crate::error::{Result, SqliteError};
use crate::model::ModelAdapter;
use crate::queue::{Priority, TransactionHandle, TransactionQueue};

type SavedListener = Box<dyn Fn(usize) + Send + Sync>;
type ErrorListener = Box<dyn Fn(&SqliteError) + Send + Sync>;

struct BatchState<T> {
    pending: Vec<T>,
    running: bool,
}

struct BatchShared<T: Model> {
    state: Mutex<BatchState<T>>,
    signal: Condvar,
    queue: Arc<TransactionQueue>,
    adapter: Arc<Mutex<ModelAdapter<T>>>,
    batch_size: usize,
    idle_timeout: Duration,
    on_saved: Option<SavedListener>,
    on_error: Option<ErrorListener>,
}

impl<T: Model> BatchShared<T> {
    fn save(&self, batch: Vec<T>) -> TransactionHandle<usize> {
        let adapter = Arc::clone(&self.adapter);
        self.queue
            .transaction(move |db| {
                let mut models = batch;
                adapter.lock().save_all(db, &mut models, |_, _, _| {})?;
                Ok(models.len())
            })
            .priority(Priority::Low)
            .submit()
    }

    fn report(&self, outcome: Result<usize>) {
        match outcome {
            Ok(saved) => {
                tracing::debug!(queue = %self.queue.name(), saved, "batch saved");
                if let Some(listener) = &self.on_saved {
                    listener(saved);
                }
            }
            Err(err) => {
                tracing::warn!(queue = %self.queue.name(), error = %err, "batch save failed");
                if let Some(listener) = &self.on_error {
                    listener(&err);
                }
            }
        }
    }

    /// Blocks until the buffer should be flushed and swaps it out.
    fn next_batch(&self) -> (Vec<T>, bool) {
        let mut state = self.state.lock();
        while state.running && state.pending.len() < self.batch_size {
            let idle = self.signal.wait_for(&mut state, self.idle_timeout).timed_out();
            if idle && !state.pending.is_empty() {
                break;
            }
        }
        (std::mem::take(&mut state.pending), state.running)
    }
}

/// Buffers models and saves them in one transaction once `batch_size` are
/// pending or nothing has been added for `idle_timeout`.
///
/// Producers and the flush share one mutex, and a flush swaps the whole
/// buffer out, so a concurrent `add` lands either in the batch being saved or
/// in the next one.
pub struct BatchSaveQueue<T: Model> {
    shared: Arc<BatchShared<T>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Model> BatchSaveQueue<T> {
    pub fn builder(
        queue: Arc<TransactionQueue>,
        adapter: Arc<Mutex<ModelAdapter<T>>>,
    ) -> BatchSaveQueueBuilder<T> {
        BatchSaveQueueBuilder {
            queue,
            adapter,
            config: QueueConfig::default(),
            on_saved: None,
            on_error: None,
        }
    }

    pub fn add(&self, model: T) {
        self.shared.state.lock().pending.push(model);
        self.shared.signal.notify_one();
    }

    pub fn add_all(&self, models: impl IntoIterator<Item = T>) {
        self.shared.state.lock().pending.extend(models);
        self.shared.signal.notify_one();
    }

    /// Drops a pending model that has not been flushed yet.
    pub fn remove(&self, model: &T) -> bool
    where
        T: PartialEq,
    {
        let mut state = self.shared.state.lock();
        match state.pending.iter().position(|m| m == model) {
            Some(i) => {
                state.pending.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Saves everything pending now and waits for it. Returns how many
    /// models were saved.
    pub fn purge(&self) -> Result<usize> {
        let batch = std::mem::take(&mut self.shared.state.lock().pending);
        if batch.is_empty() {
            return Ok(0);
        }
        self.shared.save(batch).wait()
    }

    /// Flushes what is pending and stops the worker.
    pub fn quit(&self) {
        self.shared.state.lock().running = false;
        self.shared.signal.notify_all();
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if worker.join().is_err() {
            tracing::error!(queue = %self.shared.queue.name(), "batch worker panicked");
        }
    }
}

impl<T: Model> Drop for BatchSaveQueue<T> {
    fn drop(&mut self) {
        self.quit();
    }
}

pub struct BatchSaveQueueBuilder<T: Model> {
    queue: Arc<TransactionQueue>,
    adapter: Arc<Mutex<ModelAdapter<T>>>,
    config: QueueConfig,
    on_saved: Option<SavedListener>,
    on_error: Option<ErrorListener>,
}

impl<T: Model> BatchSaveQueueBuilder<T> {
    /// Batch size and idle timeout.
    pub fn config(mut self, config: &QueueConfig) -> Self {
        self.config = *config;
        self
    }

    /// Called with the number of models in each saved batch.
    pub fn on_saved(mut self, listener: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_saved = Some(Box::new(listener));
        self
    }

    pub fn on_error(mut self, listener: impl Fn(&SqliteError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(listener));
        self
    }

    pub fn start(self) -> Result<BatchSaveQueue<T>> {
        let shared = Arc::new(BatchShared {
            state: Mutex::new(BatchState {
                pending: Vec::new(),
                running: true,
            }),
            signal: Condvar::new(),
            batch_size: self.config.batch_size.max(1),
            idle_timeout: self.config.idle_timeout(),
            queue: self.queue,
            adapter: self.adapter,
            on_saved: self.on_saved,
            on_error: self.on_error,
        });

        let name = format!("{}-batch", shared.queue.name());
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    loop {
                        let (batch, running) = shared.next_batch();
                        if !batch.is_empty() {
                            shared.report(shared.save(batch).wait());
                        }
                        if !running {
                            break;
                        }
                    }
                })
                .map_err(|e| SqliteError::Queue(format!("failed to start worker '{name}': {e}")))?
        };

        Ok(BatchSaveQueue {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use sqlweave_core::{Column, FieldMap, Registry, SqlType, Table};
    use std::sync::mpsc;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Note {
        id: i64,
        body: String,
    }

    impl Model for Note {
        const TABLE: &'static str = "Note";

        fn fields() -> FieldMap<Self> {
            FieldMap::new()
                .column("id", |m: &Self| m.id, |m, v| m.id = v)
                .column("body", |m: &Self| m.body.clone(), |m, v| m.body = v)
        }
    }

    fn note(body: &str) -> Note {
        Note {
            id: 0,
            body: body.into(),
        }
    }

    struct Fixture {
        queue: Arc<TransactionQueue>,
        adapter: Arc<Mutex<ModelAdapter<Note>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = Registry::default()
                .with_table(
                    Table::new("Note")
                        .column(Column::new("id", SqlType::Integer).auto_increment())
                        .column(Column::new("body", SqlType::Text)),
                )
                .unwrap();
            let db = Database::builder(Arc::new(registry))
                .open_in_memory()
                .unwrap();
            let adapter = ModelAdapter::new(db.registry()).unwrap();
            let queue =
                TransactionQueue::new("notes", Arc::new(Mutex::new(db))).unwrap();
            Self {
                queue: Arc::new(queue),
                adapter: Arc::new(Mutex::new(adapter)),
            }
        }

        fn batch(&self, batch_size: usize, idle_ms: u64) -> BatchSaveQueueBuilder<Note> {
            BatchSaveQueue::builder(Arc::clone(&self.queue), Arc::clone(&self.adapter)).config(
                &QueueConfig {
                    batch_size,
                    idle_timeout_ms: idle_ms,
                },
            )
        }

        fn count(&self) -> i64 {
            self.queue
                .database()
                .lock()
                .count("SELECT COUNT(*) FROM `Note`", &[])
                .unwrap()
        }
    }

    #[test]
    fn test_flushes_at_threshold() {
        let fixture = Fixture::new();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let batch = fixture
            .batch(3, 60_000)
            .on_saved(move |n| {
                tx.lock().send(n).ok();
            })
            .start()
            .unwrap();

        batch.add(note("a"));
        batch.add_all([note("b"), note("c")]);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 3);
        assert_eq!(fixture.count(), 3);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_flushes_when_idle() {
        let fixture = Fixture::new();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let batch = fixture
            .batch(50, 20)
            .on_saved(move |n| {
                tx.lock().send(n).ok();
            })
            .start()
            .unwrap();

        batch.add_all([note("a"), note("b")]);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);
        assert_eq!(fixture.count(), 2);
    }

    #[test]
    fn test_purge_and_remove() {
        let fixture = Fixture::new();
        let batch = fixture.batch(50, 60_000).start().unwrap();

        batch.add_all([note("keep"), note("drop"), note("keep-too")]);
        assert!(batch.remove(&note("drop")));
        assert!(!batch.remove(&note("never-added")));
        assert_eq!(batch.len(), 2);

        assert_eq!(batch.purge().unwrap(), 2);
        assert_eq!(batch.purge().unwrap(), 0);
        assert_eq!(fixture.count(), 2);
        assert_eq!(fixture.adapter.lock().cache_len(), 0);
    }

    #[test]
    fn test_quit_flushes_pending() {
        let fixture = Fixture::new();
        let batch = fixture.batch(50, 60_000).start().unwrap();
        batch.add(note("last"));
        batch.quit();
        assert_eq!(fixture.count(), 1);
    }
}
