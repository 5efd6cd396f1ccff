//! Lifecycle handle for one supervised process

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::capture::{join_readers, OutputCapture};
use crate::error::{ProcessError, Result, SignalError, SpawnErrorKind, StreamKind};
use crate::find::{ProcessEnumerator, RuntimeProcessInfo, SystemEnumerator};
use crate::signals::{default_strategy, SignalStrategy};
use crate::spec::ProcessSpec;
use crate::stop::{StopProtocol, StopTarget, DEFAULT_MAX_STOP_CYCLES};

/// How the handle came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Placeholder for an unknown tag
    Empty,
    /// Launched from its spec by this handle
    Spawned,
    /// Wraps a pid someone else launched
    Adopted,
}

enum ProcessRef {
    Child { child: Child, pid: u32 },
    Foreign { pid: u32, name: String },
}

impl ProcessRef {
    fn pid(&self) -> u32 {
        match self {
            ProcessRef::Child { pid, .. } | ProcessRef::Foreign { pid, .. } => *pid,
        }
    }
}

#[derive(Default)]
struct HandleState {
    process: Option<ProcessRef>,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    exit_status: Option<ExitStatus>,
    capture: Option<OutputCapture>,
}

/// One spawned, adopted or placeholder process
///
/// Every query answers from the live process table. A handle without an
/// OS process (an empty placeholder, or one whose start failed) reports
/// `NonExistent`, exit code 0 and epoch timestamps instead of failing.
pub struct ProcessHandle {
    spec: ProcessSpec,
    origin: Origin,
    state: Mutex<HandleState>,
    /// Serializes start and stop; held across the whole escalation
    lifecycle: tokio::sync::Mutex<()>,
    signals: Arc<dyn SignalStrategy>,
    enumerator: Arc<dyn ProcessEnumerator>,
    max_stop_cycles: u32,
}

impl ProcessHandle {
    /// Handle for `spec`; nothing runs until [`start`](Self::start)
    pub fn new(spec: ProcessSpec) -> Self {
        Self::with_origin(spec, Origin::Spawned, HandleState::default())
    }

    /// Inert placeholder that answers every query with sentinel values
    pub fn empty() -> Self {
        Self::with_origin(ProcessSpec::default(), Origin::Empty, HandleState::default())
    }

    /// Wrap a process this supervisor did not launch
    ///
    /// Status queries and stop work on it. Its exit status belongs to its
    /// real parent, so [`exit_code`](Self::exit_code) stays 0.
    pub fn adopt(pid: u32) -> Result<Self> {
        let info = crate::find::process_by_pid(pid)?;
        debug!(pid, executable = %info.executable, "Adopting process");

        let state = HandleState {
            process: Some(ProcessRef::Foreign {
                pid,
                name: info.executable.clone(),
            }),
            started_at: Some(Utc::now()),
            ..HandleState::default()
        };
        Ok(Self::with_origin(
            ProcessSpec::new(info.executable),
            Origin::Adopted,
            state,
        ))
    }

    fn with_origin(spec: ProcessSpec, origin: Origin, state: HandleState) -> Self {
        Self {
            spec,
            origin,
            state: Mutex::new(state),
            lifecycle: tokio::sync::Mutex::new(()),
            signals: default_strategy(),
            enumerator: Arc::new(SystemEnumerator),
            max_stop_cycles: DEFAULT_MAX_STOP_CYCLES,
        }
    }

    /// Deliver stop signals through `signals` instead of the platform default
    pub fn with_signal_strategy(mut self, signals: Arc<dyn SignalStrategy>) -> Self {
        self.signals = signals;
        self
    }

    /// Answer status queries from `enumerator`
    pub fn with_enumerator(mut self, enumerator: Arc<dyn ProcessEnumerator>) -> Self {
        self.enumerator = enumerator;
        self
    }

    /// Outer bound on five-phase stop cycles
    pub fn with_max_stop_cycles(mut self, cycles: u32) -> Self {
        self.max_stop_cycles = cycles.max(1);
        self
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub fn is_empty(&self) -> bool {
        self.origin == Origin::Empty
    }

    pub fn is_adopted(&self) -> bool {
        self.origin == Origin::Adopted
    }

    /// Launch the process and wire up output capture
    ///
    /// No-op for placeholders, adopted handles and a process that is still
    /// running. Starting a handle whose process has exited begins a new
    /// lifetime with fresh timestamps and a re-armed on-stopped callback.
    pub async fn start(&self) -> Result<()> {
        if self.origin != Origin::Spawned {
            return Ok(());
        }

        let _lifecycle = self.lifecycle.lock().await;

        if self.has_live_child() {
            debug!(executable = %self.spec.executable, "Process already running");
            return Ok(());
        }

        self.spec.validate()?;
        let mut child = self.command()?.spawn().map_err(|e| {
            let err = ProcessError::spawn(&self.spec.executable, e);
            error!(executable = %self.spec.executable, error = %err, "Failed to spawn process");
            err
        })?;

        // A freshly spawned child always has an id; it is cleared only once reaped
        let pid = child.id().unwrap_or(0);

        let mut capture = OutputCapture::new(self.spec.stopped_callback());
        if let Some(stdout) = child.stdout.take() {
            capture.attach(stdout, StreamKind::Stdout, self.spec.stdout_callback());
        }
        if let Some(stderr) = child.stderr.take() {
            capture.attach(stderr, StreamKind::Stderr, self.spec.stderr_callback());
        }

        let mut state = self.state.lock();
        if let Some(previous) = state.capture.take() {
            previous.close();
        }
        *state = HandleState {
            process: Some(ProcessRef::Child { child, pid }),
            started_at: Some(Utc::now()),
            stopped_at: None,
            exit_status: None,
            capture: Some(capture),
        };

        info!(
            pid = %pid,
            executable = %self.spec.executable,
            args = ?self.spec.args,
            "Process started"
        );
        Ok(())
    }

    fn command(&self) -> Result<Command> {
        let spec = &self.spec;
        let mut cmd = Command::new(&spec.executable);
        cmd.args(&spec.args);

        if !spec.working_directory.is_empty() {
            let dir = Path::new(&spec.working_directory);
            if !dir.is_dir() {
                let err = ProcessError::Spawn {
                    executable: spec.executable.clone(),
                    kind: SpawnErrorKind::InvalidWorkingDirectory,
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("`{}` is not a directory", spec.working_directory),
                    ),
                };
                error!(executable = %spec.executable, error = %err, "Failed to spawn process");
                return Err(err);
            }
            cmd.current_dir(dir);
        }

        if let Some(pairs) = spec.env_pairs() {
            cmd.env_clear();
            cmd.envs(pairs);
        }

        // Own process group, so aggressive kill reaches descendants too
        #[cfg(unix)]
        cmd.process_group(0);

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(if spec.captures_stderr() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        Ok(cmd)
    }

    fn has_live_child(&self) -> bool {
        let has_child = matches!(self.state.lock().process, Some(ProcessRef::Child { .. }));
        has_child && !self.observe_exit()
    }

    /// Reap an exited child; returns whether the child has exited
    ///
    /// Also stamps `stopped_at` the first time the exit is seen.
    fn observe_exit(&self) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(ProcessRef::Child { child, pid }) = state.process.as_mut() else {
            return false;
        };
        if state.exit_status.is_some() {
            return true;
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(pid = %pid, status = %status, "Process exited");
                state.exit_status = Some(status);
                state.stopped_at.get_or_insert_with(Utc::now);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(pid = %pid, error = %e, "Failed to poll process exit");
                false
            }
        }
    }

    /// Live process-table entry for this handle's pid
    ///
    /// A pid seen again after its child was reaped, or an adopted pid now
    /// running a different executable, is reported as `Obsolete`.
    pub fn details(&self) -> RuntimeProcessInfo {
        let reaped = self.observe_exit();

        let (pid, adopted_name) = {
            let state = self.state.lock();
            match &state.process {
                None => return RuntimeProcessInfo::non_existent(),
                Some(ProcessRef::Child { pid, .. }) => (*pid, None),
                Some(ProcessRef::Foreign { pid, name }) => (*pid, Some(name.clone())),
            }
        };
        if pid == 0 {
            return RuntimeProcessInfo::non_existent();
        }

        match self.enumerator.by_pid(pid) {
            Ok(Some(mut info)) => {
                let recycled = reaped
                    || adopted_name.is_some_and(|name| name != info.executable);
                if recycled {
                    info.state = crate::find::ProcessState::Obsolete;
                }
                info
            }
            Ok(None) => RuntimeProcessInfo::non_existent(),
            Err(e) => {
                debug!(pid, error = %e, "Process lookup failed");
                RuntimeProcessInfo::non_existent()
            }
        }
    }

    /// Live check against the process table
    pub fn is_running(&self) -> bool {
        self.details().state.is_alive()
    }

    pub fn pid(&self) -> Option<u32> {
        self.state.lock().process.as_ref().map(ProcessRef::pid)
    }

    /// 0 until the exit is observed; -1 for a signal-terminated child
    pub fn exit_code(&self) -> i32 {
        self.observe_exit();
        self.state
            .lock()
            .exit_status
            .map(|status| status.code().unwrap_or(-1))
            .unwrap_or(0)
    }

    /// Raw exit status once the child has been reaped
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.observe_exit();
        self.state.lock().exit_status
    }

    /// Start time, or the Unix epoch before the first start
    pub fn started_at(&self) -> DateTime<Utc> {
        self.state.lock().started_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Stop time, or the Unix epoch while the process has not stopped
    pub fn stopped_at(&self) -> DateTime<Utc> {
        self.observe_exit();
        self.state.lock().stopped_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Stop the process, escalating through every phase if needed
    ///
    /// Concurrent calls queue on the lifecycle lock. A process that has
    /// already exited is not signalled again.
    pub async fn stop(&self, tag: &str, attempts: u32, wait_interval: Duration) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let (pid, readers, notifier) = {
            let mut state = self.state.lock();
            let Some(process) = state.process.as_ref() else {
                return Ok(());
            };
            let pid = process.pid();

            match state.capture.as_mut() {
                Some(capture) => {
                    capture.close();
                    (pid, capture.take_readers(), Some(capture.notifier()))
                }
                None => (pid, Vec::new(), None),
            }
        };

        let mut target = HandleTarget { handle: self, pid };
        let result = if target.has_exited() {
            debug!(tag = %tag, pid, "Process already exited");
            Ok(())
        } else {
            info!(tag = %tag, pid, attempts, wait_interval = ?wait_interval, "Stopping process");
            StopProtocol::new(attempts, wait_interval)
                .max_cycles(self.max_stop_cycles)
                .run(tag, &mut target, self.signals.as_ref())
                .await
                .map(|_| ())
        };

        join_readers(readers).await;

        if result.is_ok() {
            self.state.lock().stopped_at.get_or_insert_with(Utc::now);
            if let Some(notifier) = notifier {
                notifier.fire();
            }
        }
        result
    }
}

impl Default for ProcessHandle {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("spec", &self.spec)
            .field("origin", &self.origin)
            .field("pid", &self.pid())
            .finish()
    }
}

/// Stop target view over a handle
struct HandleTarget<'a> {
    handle: &'a ProcessHandle,
    pid: u32,
}

impl StopTarget for HandleTarget<'_> {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn force_kill(&mut self) -> std::result::Result<(), SignalError> {
        let foreign = {
            let mut state = self.handle.state.lock();
            match state.process.as_mut() {
                Some(ProcessRef::Child { child, .. }) => {
                    return child
                        .start_kill()
                        .map_err(|e| SignalError::new("force-kill", self.pid, e));
                }
                Some(ProcessRef::Foreign { .. }) => true,
                None => false,
            }
        };

        // No owned child to kill through; fall back to a plain kill signal
        if foreign {
            self.handle.signals.kill(self.pid)
        } else {
            Ok(())
        }
    }

    fn has_exited(&mut self) -> bool {
        if self.handle.origin == Origin::Spawned {
            self.handle.observe_exit()
        } else {
            !self.handle.is_running()
        }
    }
}
