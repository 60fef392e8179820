//! Deferred Action Scheduler
//!
//! Cancellable one-shot tasks (lockdown auto-expiry, quarantine release)
//! with generation fencing: every key carries a generation counter, a
//! scheduled task captures the generation it was created under, and the
//! worker only runs a task whose generation still matches. Superseding or
//! cancelling a key bumps the counter, so a stale task is a no-op even if
//! it is already past the queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

// ============================================================================
// STATE
// ============================================================================

struct Task {
    key: String,
    generation: u64,
    due_at: Instant,
    action: Box<dyn FnOnce() + Send>,
}

struct SchedState {
    tasks: Vec<Task>,
    generations: HashMap<String, u64>,
    shutdown: bool,
}

struct Inner {
    state: Mutex<SchedState>,
    condvar: Condvar,
}

// ============================================================================
// SCHEDULER
// ============================================================================

pub struct Scheduler {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Start the scheduler and its worker thread.
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(SchedState {
                tasks: Vec::new(),
                generations: HashMap::new(),
                shutdown: false,
            }),
            condvar: Condvar::new(),
        });

        let worker_inner = inner.clone();
        let handle = std::thread::Builder::new()
            .name("deferred-actions".to_string())
            .spawn(move || run_worker(worker_inner))
            .expect("failed to spawn scheduler thread");

        Self {
            inner,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Schedule an action for `key`, superseding any pending action on the
    /// same key. Returns the fencing generation the task runs under.
    pub fn schedule<F>(&self, key: &str, delay: Duration, action: F) -> u64
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        let generation = bump(&mut state.generations, key);
        state.tasks.push(Task {
            key: key.to_string(),
            generation,
            due_at: Instant::now() + delay,
            action: Box::new(action),
        });
        drop(state);
        self.inner.condvar.notify_one();
        generation
    }

    /// Invalidate any pending action for `key`. Race-free: a task already
    /// dequeued by the worker still re-checks its generation before
    /// running.
    pub fn cancel(&self, key: &str) {
        let mut state = self.inner.state.lock();
        bump(&mut state.generations, key);
        state.tasks.retain(|t| t.key != key);
    }

    /// Current fencing generation for a key.
    pub fn generation(&self, key: &str) -> u64 {
        self.inner
            .state
            .lock()
            .generations
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    pub fn pending(&self) -> usize {
        self.inner.state.lock().tasks.len()
    }

    /// Stop the worker. Pending tasks are dropped without running.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            state.shutdown = true;
            state.tasks.clear();
        }
        self.inner.condvar.notify_all();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn bump(generations: &mut HashMap<String, u64>, key: &str) -> u64 {
    let entry = generations.entry(key.to_string()).or_insert(0);
    *entry += 1;
    *entry
}

// ============================================================================
// WORKER
// ============================================================================

fn run_worker(inner: Arc<Inner>) {
    let mut state = inner.state.lock();
    loop {
        if state.shutdown {
            return;
        }

        let now = Instant::now();
        let due_idx = state
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due_at <= now)
            .min_by_key(|(_, t)| t.due_at)
            .map(|(i, _)| i);

        if let Some(idx) = due_idx {
            let task = state.tasks.swap_remove(idx);
            let current = state.generations.get(&task.key).copied().unwrap_or(0);
            if current == task.generation {
                // Run outside the lock; the action may re-schedule
                drop(state);
                (task.action)();
                state = inner.state.lock();
            } else {
                log::debug!(
                    "dropping superseded task '{}' (gen {} != {})",
                    task.key,
                    task.generation,
                    current
                );
            }
            continue;
        }

        match state.tasks.iter().map(|t| t.due_at).min() {
            Some(next) => {
                let wait = next.saturating_duration_since(Instant::now());
                inner.condvar.wait_for(&mut state, wait);
            }
            None => {
                inner.condvar.wait(&mut state);
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
