//! Tag-keyed registry of supervised processes

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::find::{ProcessEnumerator, SystemEnumerator};
use crate::handle::ProcessHandle;
use crate::settings::MonitorSettings;
use crate::signals::{default_strategy, SignalStrategy};
use crate::spec::ProcessSpec;

#[derive(Default)]
struct MonitorState {
    procs: HashMap<String, Arc<ProcessHandle>>,
    next_tag_index: u64,
}

/// Supervises many processes by tag
///
/// The registry lock only guards map access; starts and stops run with
/// it released.
///
/// # Examples
/// ```no_run
/// use procvisor_process::{ProcessMonitor, ProcessSpec};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let monitor = ProcessMonitor::new();
/// let spec = ProcessSpec::new("sleep")
///     .args(["100"])
///     .on_stopped(|| println!("sleep ended"));
///
/// monitor.spawn_with_tag(spec, "t1").await?;
/// assert!(monitor.get_process("t1").is_running());
///
/// monitor.stop("t1").await?;
/// # Ok(())
/// # }
/// ```
pub struct ProcessMonitor {
    state: Mutex<MonitorState>,
    settings: MonitorSettings,
    signals: Arc<dyn SignalStrategy>,
    enumerator: Arc<dyn ProcessEnumerator>,
}

impl ProcessMonitor {
    pub fn new() -> Self {
        Self::with_settings(MonitorSettings::default())
    }

    /// Monitor using `settings` for stop defaults and generated tags
    pub fn with_settings(settings: MonitorSettings) -> Self {
        Self {
            state: Mutex::new(MonitorState::default()),
            settings,
            signals: default_strategy(),
            enumerator: Arc::new(SystemEnumerator),
        }
    }

    /// Signal strategy handed to every handle spawned from now on
    pub fn with_signal_strategy(mut self, signals: Arc<dyn SignalStrategy>) -> Self {
        self.signals = signals;
        self
    }

    /// Process table handed to every handle spawned from now on
    pub fn with_enumerator(mut self, enumerator: Arc<dyn ProcessEnumerator>) -> Self {
        self.enumerator = enumerator;
        self
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    fn next_tag(&self) -> String {
        let mut state = self.state.lock();
        let tag = format!("{}{}", self.settings.tag_prefix, state.next_tag_index);
        state.next_tag_index += 1;
        tag
    }

    /// Spawn under a generated tag and return it
    ///
    /// If the start fails the entry is removed again and the error returned.
    pub async fn spawn(&self, spec: ProcessSpec) -> Result<String> {
        let tag = self.next_tag();
        match self.spawn_with_tag(spec, &tag).await {
            Ok(()) => Ok(tag),
            Err(e) => {
                self.remove(&tag);
                Err(e)
            }
        }
    }

    /// Register `spec` under `tag` and start it
    ///
    /// An existing entry for `tag` is replaced (without being stopped). On
    /// a start failure the entry stays registered, inert, so the caller can
    /// retry [`start`](Self::start) or [`remove`](Self::remove) it.
    pub async fn spawn_with_tag(&self, spec: ProcessSpec, tag: &str) -> Result<()> {
        debug!(tag = %tag, spec = %spec.to_log_string(), "Spawning process");

        let handle = ProcessHandle::new(spec)
            .with_signal_strategy(self.signals.clone())
            .with_enumerator(self.enumerator.clone())
            .with_max_stop_cycles(self.settings.max_stop_cycles);

        let handle = Arc::new(handle);
        let previous = self
            .state
            .lock()
            .procs
            .insert(tag.to_string(), handle.clone());
        if let Some(previous) = previous {
            if previous.is_running() {
                warn!(tag = %tag, pid = ?previous.pid(), "Replaced a running process; it keeps running");
            }
        }

        // Start the handle just registered, even if the tag is removed meanwhile
        handle.start().await
    }

    /// Start the process for `tag` unless it is already running
    pub async fn start(&self, tag: &str) -> Result<()> {
        let handle = self.get_process(tag);
        if handle.is_running() {
            return Ok(());
        }

        debug!(tag = %tag, "Starting process");
        handle.start().await
    }

    /// Stop with the configured attempts and wait interval
    pub async fn stop(&self, tag: &str) -> Result<()> {
        self.stop_with_timeout(
            tag,
            self.settings.stop_attempts,
            self.settings.stop_wait_interval(),
        )
        .await
    }

    /// Stop with explicit attempts per phase and pause between tries
    pub async fn stop_with_timeout(
        &self,
        tag: &str,
        attempts: u32,
        wait_interval: Duration,
    ) -> Result<()> {
        self.get_process(tag).stop(tag, attempts, wait_interval).await
    }

    /// Stop, then start again; a failed stop skips the start
    pub async fn restart(&self, tag: &str) -> Result<()> {
        info!(tag = %tag, "Restarting process");
        self.stop(tag).await?;
        self.start(tag).await
    }

    /// Handle for `tag`, or an inert placeholder when unknown
    pub fn get_process(&self, tag: &str) -> Arc<ProcessHandle> {
        self.state
            .lock()
            .procs
            .get(tag)
            .cloned()
            .unwrap_or_else(|| Arc::new(ProcessHandle::empty()))
    }

    /// Forget `tag` without stopping its process
    pub fn remove(&self, tag: &str) -> Option<Arc<ProcessHandle>> {
        let removed = self.state.lock().procs.remove(tag);
        if removed.is_some() {
            debug!(tag = %tag, "Removed from monitor");
        }
        removed
    }

    /// Fire a stop for every registered tag without waiting
    ///
    /// Each stop runs on its own task; failures are logged. The returned
    /// handles may be awaited or dropped.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, since each stop is
    /// handed to `tokio::spawn`.
    pub fn stop_all_in_parallel(&self) -> Vec<JoinHandle<Result<()>>> {
        let snapshot: Vec<(String, Arc<ProcessHandle>)> = self
            .state
            .lock()
            .procs
            .iter()
            .map(|(tag, handle)| (tag.clone(), handle.clone()))
            .collect();

        let attempts = self.settings.stop_attempts;
        let wait_interval = self.settings.stop_wait_interval();

        info!(count = snapshot.len(), "Stopping all processes");
        snapshot
            .into_iter()
            .map(|(tag, handle)| {
                tokio::spawn(async move {
                    let result = handle.stop(&tag, attempts, wait_interval).await;
                    if let Err(e) = &result {
                        warn!(tag = %tag, error = %e, "Parallel stop failed");
                    }
                    result
                })
            })
            .collect()
    }

    /// Snapshot of registered tags, in no particular order
    pub fn get_all_tags(&self) -> Vec<String> {
        self.state.lock().procs.keys().cloned().collect()
    }
}

impl Default for ProcessMonitor {
    fn default() -> Self {
        Self::new()
    }
}
