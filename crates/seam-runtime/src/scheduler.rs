//! Named, cancellable interval tasks.
//!
//! One scheduler owns every recurring task of a runtime, so ordering and
//! teardown are auditable in one place instead of scattered across
//! independent timer registrations.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

#[derive(Default)]
pub struct TaskScheduler {
    tasks: Mutex<HashMap<&'static str, JoinHandle<()>>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a recurring task. The first run happens after one full period.
    /// Respawning under an existing name aborts the previous task.
    pub fn spawn_interval<F, Fut>(&self, name: &'static str, period: Duration, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; the first tick is the spawn point.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                job().await;
            }
        });

        let mut tasks = self.tasks.lock().expect("scheduler poisoned");
        if let Some(old) = tasks.insert(name, handle) {
            warn!(task = name, "replacing task already registered under this name");
            old.abort();
        } else {
            debug!(task = name, period_ms = period.as_millis() as u64, "task scheduled");
        }
    }

    /// Cancel one task. Returns false when no task is registered under the
    /// name.
    pub fn cancel(&self, name: &str) -> bool {
        match self.tasks.lock().expect("scheduler poisoned").remove(name) {
            Some(handle) => {
                handle.abort();
                debug!(task = name, "task cancelled");
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .tasks
            .lock()
            .expect("scheduler poisoned")
            .keys()
            .copied()
            .collect();
        names.sort_unstable();
        names
    }

    /// Abort everything. Called on teardown.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().expect("scheduler poisoned");
        for (name, handle) in tasks.drain() {
            handle.abort();
            debug!(task = name, "task aborted at shutdown");
        }
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
