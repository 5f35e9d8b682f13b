//! Bookkeeping of spawned step processes, used for cancellation.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::debug;

struct TrackedProcess {
    id: u64,
    build_name: String,
    kill: Arc<Notify>,
}

#[derive(Default)]
struct TrackerInner {
    next_id: u64,
    processes: Vec<TrackedProcess>,
}

/// Records every spawned step process tagged with its owning build.
///
/// Termination is advisory: `kill_all` signals each matching process's
/// executor, which performs the actual kill and finalizes bookkeeping when
/// the process exits.
#[derive(Clone, Default)]
pub struct ProcessTracker {
    inner: Arc<Mutex<TrackerInner>>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly spawned process for the named build. The returned
    /// handle unregisters the entry on drop.
    pub fn register(&self, build_name: &str) -> ProcessHandle {
        let kill = Arc::new(Notify::new());
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.processes.push(TrackedProcess {
            id,
            build_name: build_name.to_string(),
            kill: kill.clone(),
        });
        ProcessHandle {
            id,
            kill,
            tracker: self.clone(),
        }
    }

    /// Signal termination of every tracked process owned by the named
    /// build. Returns how many processes were signalled.
    pub fn kill_all(&self, build_name: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        let mut signalled = 0;
        for process in &inner.processes {
            if process.build_name == build_name {
                process.kill.notify_one();
                signalled += 1;
            }
        }
        if signalled > 0 {
            debug!(build = %build_name, count = signalled, "signalled processes for termination");
        }
        signalled
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().processes.len()
    }

    fn unregister(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.processes.retain(|process| process.id != id);
    }
}

/// One tracked process; dropping it removes the tracker entry.
pub struct ProcessHandle {
    id: u64,
    kill: Arc<Notify>,
    tracker: ProcessTracker,
}

impl ProcessHandle {
    /// Resolves when this process has been asked to terminate.
    pub async fn killed(&self) {
        self.kill.notified().await;
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.tracker.unregister(self.id);
    }
}
