//! Background execution of map write jobs.
//!
//! Writes are submitted as [`DetachedTask`]s: the submitter never waits for
//! them and never sees their result. A failing task is logged with its label
//! and otherwise dropped; nothing retries it.

use std::sync::{Arc, Condvar, Mutex, PoisonError};

use log::{debug, error};

use super::error::MapError;

type Job = Box<dyn FnOnce() -> Result<(), MapError> + Send + 'static>;

/// A fire-and-forget unit of work.
pub struct DetachedTask {
    label: String,
    job: Job,
}

impl DetachedTask {
    pub fn new(
        label: impl Into<String>,
        job: impl FnOnce() -> Result<(), MapError> + Send + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            job: Box::new(job),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run the job, logging a failure instead of returning it.
    pub fn run(self) {
        match (self.job)() {
            Ok(()) => debug!("Finished map task {}", self.label),
            Err(e) => error!("Failed to write map dimension {}: {}", self.label, e),
        }
    }
}

/// Accepts detached tasks for execution off the calling thread.
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, task: DetachedTask);
}

/// Runs every task immediately on the submitting thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;

impl TaskExecutor for InlineExecutor {
    fn execute(&self, task: DetachedTask) {
        task.run();
    }
}

/// Count of tasks submitted but not yet finished.
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn increment(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn decrement(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Decrements the pending count even if the task panics.
struct PendingGuard(Arc<Pending>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Executor backed by a dedicated rayon thread pool.
pub struct RayonExecutor {
    pool: rayon::ThreadPool,
    pending: Arc<Pending>,
}

impl RayonExecutor {
    pub fn new(threads: usize, thread_name: &str) -> Result<Self, rayon::ThreadPoolBuildError> {
        let name = thread_name.to_string();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(move |i| format!("{}-{}", name, i))
            .panic_handler(|_| error!("Map writer task panicked"))
            .build()?;

        Ok(Self {
            pool,
            pending: Arc::new(Pending::default()),
        })
    }

    /// Number of submitted tasks that have not finished yet
    pub fn pending(&self) -> usize {
        *self.pending.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until every submitted task has finished.
    pub fn wait_idle(&self) {
        let mut count = self.pending.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self
                .pending
                .idle
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl TaskExecutor for RayonExecutor {
    fn execute(&self, task: DetachedTask) {
        self.pending.increment();
        let guard = PendingGuard(self.pending.clone());
        self.pool.spawn(move || {
            let _guard = guard;
            task.run();
        });
    }
}
