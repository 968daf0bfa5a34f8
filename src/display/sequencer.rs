//! Single-threaded job runner.
//!
//! Jobs run one at a time on a dedicated thread, ordered by due time and
//! then by posting order. Delayed jobs can carry a token so a whole group
//! can be cancelled or queried at once; the controller uses this for its
//! balance animation and its transition re-evaluation.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crate::logger::Log;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Job {
    token: Option<&'static str>,
    task: Task,
}

#[derive(Default)]
struct Queue {
    jobs: BTreeMap<(Instant, u64), Job>,
    next_seq: u64,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    wakeup: Condvar,
    worker: Mutex<Option<ThreadId>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cloneable handle for posting work to a [`Sequencer`].
#[derive(Clone)]
pub struct SequencerHandle {
    shared: Arc<Shared>,
}

impl SequencerHandle {
    fn enqueue(&self, token: Option<&'static str>, delay: Duration, task: Task) {
        let mut queue = self.shared.lock();
        if queue.shutdown {
            return;
        }
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue
            .jobs
            .insert((Instant::now() + delay, seq), Job { token, task });
        drop(queue);
        self.shared.wakeup.notify_one();
    }

    /// Run `task` as soon as everything already due has run.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(None, Duration::ZERO, Box::new(task));
    }

    /// Run `task` after `delay`, tagged with `token`.
    pub fn post_delayed<F>(&self, token: &'static str, delay: Duration, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Some(token), delay, Box::new(task));
    }

    /// Drop every pending job tagged with `token`.
    pub fn remove_callbacks(&self, token: &'static str) {
        self.shared
            .lock()
            .jobs
            .retain(|_, job| job.token != Some(token));
    }

    pub fn has_callbacks(&self, token: &'static str) -> bool {
        self.shared
            .lock()
            .jobs
            .values()
            .any(|job| job.token == Some(token))
    }

    /// Time left before the earliest job tagged with `token` is due.
    pub fn time_until(&self, token: &'static str) -> Option<Duration> {
        let now = Instant::now();
        self.shared
            .lock()
            .jobs
            .iter()
            .find(|(_, job)| job.token == Some(token))
            .map(|((due, _), _)| due.saturating_duration_since(now))
    }

    pub fn pending(&self) -> usize {
        self.shared.lock().jobs.len()
    }

    /// Block until every job that is already due has run.
    ///
    /// Returns immediately when called from the sequencer thread itself or
    /// after shutdown.
    pub fn flush(&self) {
        if self.is_current() {
            return;
        }
        let (done_tx, done_rx) = mpsc::channel();
        self.post(move || {
            let _ = done_tx.send(());
        });
        // A closed channel means the marker was dropped by shutdown
        let _ = done_rx.recv();
    }

    fn is_current(&self) -> bool {
        let worker = self
            .shared
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *worker == Some(thread::current().id())
    }
}

/// Owns the worker thread. Dropping it stops the thread and discards
/// any pending jobs.
pub struct Sequencer {
    handle: SequencerHandle,
    thread: Option<JoinHandle<()>>,
}

impl Sequencer {
    pub fn new(name: &str) -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            wakeup: Condvar::new(),
            worker: Mutex::new(None),
        });

        let worker_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(worker_shared))
            .with_context(|| format!("Failed to spawn {} thread", name))?;

        *shared
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(thread.thread().id());

        Ok(Self {
            handle: SequencerHandle { shared },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> SequencerHandle {
        self.handle.clone()
    }

    /// Stop the worker after the job it is running, dropping the rest.
    pub fn shutdown(&mut self) {
        {
            let mut queue = self.handle.shared.lock();
            queue.shutdown = true;
            queue.jobs.clear();
        }
        self.handle.shared.wakeup.notify_all();

        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                Log::log_error("Sequencer thread panicked");
            }
        }
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut queue = shared.lock();
            loop {
                if queue.shutdown {
                    return;
                }
                let now = Instant::now();
                let next_due = queue.jobs.keys().next().map(|(due, _)| *due);
                match next_due {
                    Some(due) if due <= now => {
                        if let Some((_, job)) = queue.jobs.pop_first() {
                            break job;
                        }
                    }
                    Some(due) => {
                        queue = shared
                            .wakeup
                            .wait_timeout(queue, due - now)
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .0;
                    }
                    None => {
                        queue = shared
                            .wakeup
                            .wait(queue)
                            .unwrap_or_else(|poisoned| poisoned.into_inner());
                    }
                }
            }
        };

        (job.task)();
    }
}
