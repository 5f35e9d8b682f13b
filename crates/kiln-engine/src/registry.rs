//! Definition registry, admission control, and reload.
//!
//! One orchestrator object owns all mutable state (definition table,
//! queue, flags) behind a single mutex that is never held across an
//! await; every mutating entry point funnels through it, which is what
//! keeps the single-running-result and queue-dedup invariants intact
//! under interleaved triggers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use kiln_core::{
    BuildDefinition, BuildInfo, BuildResult, BuildStatus, ChangeDetector, EngineEvent, LogMessage,
    Notifier,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::EventBus;
use crate::executor::{self, LOG_SEPARATOR, SharedResult};
use crate::logstore::LogStore;
use crate::procs::ProcessTracker;
use crate::queue::BuildQueue;
use crate::schedule;

/// Result of a `start_build` call.
#[derive(Debug)]
pub enum StartOutcome {
    /// A new run was admitted and is executing.
    Started(BuildInfo),
    /// The build's latest run is still in flight; the call was a no-op.
    AlreadyRunning(BuildInfo),
    /// Admission is blocked (reload or ceiling); the build was queued.
    Queued,
    /// The change gate reported nothing to build.
    Skipped,
    /// Starts are paused; the request was dropped.
    Paused,
    /// No definition with that name is registered.
    NotFound,
}

/// Result of a `reload` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Completed,
    /// Builds are running (or a reload is already applying); the reload
    /// will run when the last active build finalizes.
    Deferred,
}

struct BuildEntry {
    definition: BuildDefinition,
    file_name: String,
    latest: Option<SharedResult>,
}

impl BuildEntry {
    fn snapshot(&self) -> BuildInfo {
        BuildInfo {
            definition: self.definition.clone(),
            latest: self
                .latest
                .as_ref()
                .map(|result| result.lock().unwrap().clone()),
        }
    }

    fn is_running(&self) -> bool {
        self.latest
            .as_ref()
            .is_some_and(|result| result.lock().unwrap().result == BuildStatus::Running)
    }
}

#[derive(Default)]
struct RegistryInner {
    builds: Vec<BuildEntry>,
    queue: BuildQueue,
    paused: bool,
    reloading: bool,
    reload_pending: bool,
    triggers: Vec<JoinHandle<()>>,
}

impl RegistryInner {
    fn running_count(&self) -> usize {
        self.builds.iter().filter(|entry| entry.is_running()).count()
    }

    fn entry(&self, name: &str) -> Option<&BuildEntry> {
        self.builds.iter().find(|entry| entry.definition.name == name)
    }

    fn entry_mut(&mut self, name: &str) -> Option<&mut BuildEntry> {
        self.builds
            .iter_mut()
            .find(|entry| entry.definition.name == name)
    }

    fn infos(&self) -> Vec<BuildInfo> {
        self.builds.iter().map(BuildEntry::snapshot).collect()
    }
}

/// Owns the definition set and each build's latest result; admits builds
/// under the concurrency ceiling and recovers state from the log store.
pub struct BuildRegistry {
    definitions_dir: PathBuf,
    max_concurrent_builds: usize,
    store: LogStore,
    tracker: ProcessTracker,
    events: EventBus,
    changes: Arc<dyn ChangeDetector>,
    notifier: Arc<dyn Notifier>,
    inner: Mutex<RegistryInner>,
}

impl BuildRegistry {
    pub fn new(
        definitions_dir: impl Into<PathBuf>,
        store: LogStore,
        max_concurrent_builds: usize,
        changes: Arc<dyn ChangeDetector>,
        notifier: Arc<dyn Notifier>,
        events: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            definitions_dir: definitions_dir.into(),
            max_concurrent_builds,
            store,
            tracker: ProcessTracker::new(),
            events,
            changes,
            notifier,
            inner: Mutex::new(RegistryInner::default()),
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub(crate) fn tracker(&self) -> &ProcessTracker {
        &self.tracker
    }

    pub fn all_builds(&self) -> Vec<BuildInfo> {
        self.inner.lock().unwrap().infos()
    }

    pub fn build_info(&self, name: &str) -> Option<BuildInfo> {
        self.inner.lock().unwrap().entry(name).map(BuildEntry::snapshot)
    }

    pub fn queued_build_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().queue.names()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().unwrap().paused
    }

    pub fn has_running_builds(&self) -> bool {
        self.inner.lock().unwrap().running_count() > 0
    }

    /// Stop admitting new builds. Start requests while paused are dropped
    /// silently; running builds are unaffected.
    pub fn pause(&self) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.paused {
            inner.paused = true;
            self.events.publish(EngineEvent::Paused);
        }
    }

    pub fn resume(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.paused {
            inner.paused = false;
            self.events.publish(EngineEvent::Resumed);
        }
    }

    /// Re-read the definitions directory, replacing changed definitions,
    /// registering new ones (seeded with their most recent persisted
    /// result), and dropping definitions whose file disappeared.
    ///
    /// Deferred while any build is running; the deferred reload runs as
    /// soon as the last active build finalizes. While a reload is in
    /// progress every start request is queued, so no build can start
    /// against a definition that is about to be replaced.
    pub async fn reload(self: &Arc<Self>) -> ReloadOutcome {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.running_count() > 0 {
                inner.reload_pending = true;
                debug!("reload deferred until running builds finish");
                return ReloadOutcome::Deferred;
            }
            if inner.reloading {
                return ReloadOutcome::Deferred;
            }
            inner.reloading = true;
            for trigger in inner.triggers.drain(..) {
                trigger.abort();
            }
        }
        self.events.publish(EngineEvent::ReloadStarted);
        info!(dir = %self.definitions_dir.display(), "reloading build definitions");

        if let Err(err) = self.store.ensure_directory().await {
            warn!(error = %err, "could not create logs directory");
        }
        if let Err(err) = tokio::fs::create_dir_all(&self.definitions_dir).await {
            warn!(error = %err, "could not create definitions directory");
        }

        let loaded = self.read_definition_files().await;

        // Seed the latest result for builds we have not seen before. Done
        // outside the lock; reconciliation below re-checks entry presence.
        let mut seeded: HashMap<String, BuildResult> = HashMap::new();
        for (_, definition) in &loaded {
            let known = {
                let inner = self.inner.lock().unwrap();
                inner.entry(&definition.name).is_some()
            };
            if !known && !seeded.contains_key(&definition.name) {
                if let Some(latest) = self.store.most_recent(&definition.name).await {
                    seeded.insert(definition.name.clone(), latest);
                }
            }
        }

        let (infos, scheduled) = {
            let mut inner = self.inner.lock().unwrap();
            let kept: Vec<String> = loaded.iter().map(|(_, d)| d.name.clone()).collect();

            for (file_name, definition) in loaded {
                match inner.entry_mut(&definition.name) {
                    Some(entry) => {
                        entry.definition = definition;
                        entry.file_name = file_name;
                    }
                    None => {
                        let latest = seeded
                            .remove(&definition.name)
                            .map(|result| Arc::new(Mutex::new(result)));
                        inner.builds.push(BuildEntry {
                            definition,
                            file_name,
                            latest,
                        });
                    }
                }
            }
            inner
                .builds
                .retain(|entry| kept.contains(&entry.definition.name));

            inner.reloading = false;
            inner.reload_pending = false;

            let scheduled: Vec<(String, String)> = inner
                .builds
                .iter()
                .filter_map(|entry| {
                    entry
                        .definition
                        .schedule
                        .clone()
                        .map(|expr| (entry.definition.name.clone(), expr))
                })
                .collect();
            (inner.infos(), scheduled)
        };

        if infos.is_empty() {
            info!("no build definitions found");
        } else {
            info!(count = infos.len(), scheduled = scheduled.len(), "build definitions loaded");
        }

        let mut triggers = Vec::new();
        for (name, expression) in scheduled {
            if let Some(handle) = schedule::bind(self.clone(), name, &expression) {
                triggers.push(handle);
            }
        }
        self.inner.lock().unwrap().triggers.extend(triggers);

        self.events.publish(EngineEvent::ReloadEnded(infos));
        self.start_next_queued().await;
        ReloadOutcome::Completed
    }

    async fn read_definition_files(&self) -> Vec<(String, BuildDefinition)> {
        let mut loaded = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.definitions_dir).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %self.definitions_dir.display(), error = %err, "error listing definitions directory");
                return loaded;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if !file_name.ends_with(".json") {
                continue;
            }
            match kiln_config::load_definition(&entry.path()).await {
                Ok(definition) => loaded.push((file_name.to_string(), definition)),
                Err(err) => {
                    warn!(file = %file_name, error = %err, "skipping build definition");
                }
            }
        }
        loaded
    }

    /// Start (or queue, or skip) a build. See `StartOutcome` for the
    /// possible results; none of them is an error.
    ///
    /// `force` bypasses the change gate — used for explicit start
    /// commands and queue promotion, not for schedule firings.
    pub async fn start_build(self: &Arc<Self>, name: &str, force: bool) -> StartOutcome {
        // First admission check. Definition re-read and the change gate
        // need awaits, so admission is re-checked before the run is
        // created below.
        let (mut definition, file_name) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.entry(name).is_none() {
                return StartOutcome::NotFound;
            }
            if inner.paused {
                return StartOutcome::Paused;
            }
            if inner.reloading
                || inner.reload_pending
                || inner.running_count() >= self.max_concurrent_builds
            {
                if inner.queue.enqueue(name) {
                    self.events
                        .publish(EngineEvent::QueueChanged(inner.queue.names()));
                }
                return StartOutcome::Queued;
            }
            let Some(entry) = inner.entry(name) else {
                return StartOutcome::NotFound;
            };
            if entry.is_running() {
                return StartOutcome::AlreadyRunning(entry.snapshot());
            }
            (entry.definition.clone(), entry.file_name.clone())
        };

        // Re-read the definition from its file: steps may have changed
        // since the last reload. A file that no longer parses leaves the
        // in-memory definition in effect.
        let path = self.definitions_dir.join(&file_name);
        match kiln_config::load_definition(&path).await {
            Ok(reloaded) => {
                if let Some(entry) = self.inner.lock().unwrap().entry_mut(name) {
                    entry.definition = reloaded.clone();
                }
                definition = reloaded;
            }
            Err(err) => {
                warn!(build = %name, error = %err, "could not re-read definition file, using registered definition");
            }
        }

        if !force && definition.only_run_for_changes {
            let changed = match self.changes.has_unbuilt_changes(&definition).await {
                Ok(changed) => changed,
                Err(err) => {
                    warn!(build = %name, error = %err, "change check failed, assuming changes are present");
                    true
                }
            };
            if !changed {
                debug!(build = %name, "no unbuilt changes, skipping build");
                return StartOutcome::Skipped;
            }
        }

        // Admit: re-check every gate, then create the run while still
        // holding the lock so two concurrent starts cannot both pass.
        let (snapshot, result, started) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.paused {
                return StartOutcome::Paused;
            }
            if inner.reloading
                || inner.reload_pending
                || inner.running_count() >= self.max_concurrent_builds
            {
                if inner.queue.enqueue(name) {
                    self.events
                        .publish(EngineEvent::QueueChanged(inner.queue.names()));
                }
                return StartOutcome::Queued;
            }
            let Some(entry) = inner.entry_mut(name) else {
                return StartOutcome::NotFound;
            };
            if entry.is_running() {
                return StartOutcome::AlreadyRunning(entry.snapshot());
            }

            let mut result = BuildResult::started(&definition);
            result.push(LogMessage::new(format!("Starting build '{name}'...")));
            let started = result.clone();
            let result = Arc::new(Mutex::new(result));
            entry.latest = Some(result.clone());
            (entry.snapshot(), result, started)
        };

        info!(build = %name, "starting build");
        self.events.publish(EngineEvent::BuildStarted(started));
        tokio::spawn(executor::run_build(self.clone(), definition, result));
        StartOutcome::Started(snapshot)
    }

    /// Cancel the named build's running result and signal termination of
    /// all its tracked processes. Finalization (persisting, events, queue
    /// promotion) happens in the executor once the processes exit. A
    /// build with no running result is left untouched.
    pub fn cancel(&self, name: &str) -> Option<BuildInfo> {
        let info = {
            let inner = self.inner.lock().unwrap();
            let entry = inner.entry(name)?;
            if let Some(latest) = &entry.latest {
                let mut result = latest.lock().unwrap();
                if result.result == BuildStatus::Running {
                    result.set_status(BuildStatus::Cancelled);
                    result.push(LogMessage::new(LOG_SEPARATOR));
                    result.push(LogMessage::new("Build was cancelled"));
                    info!(build = %name, "build cancelled");
                }
            }
            entry.snapshot()
        };
        self.tracker.kill_all(name);
        Some(info)
    }

    /// End of a run: persist the result, announce it, report failures,
    /// then resume a deferred reload or promote the oldest queued build
    /// (reload takes priority).
    pub(crate) async fn finalize_build(
        self: &Arc<Self>,
        definition: &BuildDefinition,
        result: &SharedResult,
    ) {
        let snapshot = result.lock().unwrap().clone();
        self.store.write(&snapshot).await;
        info!(build = %snapshot.name, status = %snapshot.result, "build finished");
        self.events.publish(EngineEvent::BuildEnded(snapshot.clone()));

        if matches!(snapshot.result, BuildStatus::Failed | BuildStatus::Unstable) {
            let subject = format!("{} Build {}", definition.name, snapshot.result);
            let html_body = format!(
                "<h3>Result: {}</h3><h4>See the attachment for a full build log.</h4>",
                snapshot.result
            );
            self.notifier
                .notify(definition, &snapshot, &subject, &html_body)
                .await;
        }

        let reload_pending = self.inner.lock().unwrap().reload_pending;
        if reload_pending {
            self.reload().await;
        } else {
            self.start_next_queued().await;
        }
    }

    /// Try to start the single oldest queued build. It leaves the queue
    /// only once starting it is no longer meaningful (started, already
    /// running, or its definition is gone); otherwise it stays queued for
    /// the next opportunity.
    // Returns a boxed future rather than `async fn` to anchor `Send`
    // inference: the admission cycle (run_build → finalize_build →
    // start_next_queued → start_build → spawn(run_build)) is otherwise
    // self-referential for the auto-trait solver, which then conservatively
    // reports the spawned future as non-`Send`. Giving one link in the cycle
    // a concrete `Send` future type breaks the recursion.
    fn start_next_queued<'a>(
        self: &'a Arc<Self>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let Some(name) = ({
                let inner = self.inner.lock().unwrap();
                inner.queue.peek().map(str::to_string)
            }) else {
                return;
            };

            match self.start_build(&name, true).await {
                StartOutcome::Started(_)
                | StartOutcome::AlreadyRunning(_)
                | StartOutcome::Skipped
                | StartOutcome::NotFound => {
                    let mut inner = self.inner.lock().unwrap();
                    inner.queue.remove(&name);
                    self.events
                        .publish(EngineEvent::QueueChanged(inner.queue.names()));
                }
                StartOutcome::Queued | StartOutcome::Paused => {}
            }
        })
    }
}
