//! # procvisor-process
//!
//! **Purpose**: Tag-keyed supervision of external processes
//!
//! Spawns executables, tees their output line by line to callbacks, answers
//! "is it still running" from the live OS process table, and stops them
//! through an escalating, retryable signal protocol.
//!
//! ## Features
//!
//! - **Registry**: [`ProcessMonitor`] maps caller-chosen or generated tags to
//!   handles; unknown tags yield an inert placeholder, never an error
//! - **Live Status**: [`ProcessHandle::is_running`] and
//!   [`ProcessHandle::details`] re-query the process table on every call
//! - **Output Capture**: one reader task per captured stream; the on-stopped
//!   callback fires exactly once per process lifetime
//! - **Stop Escalation**: interrupt → terminate → kill → group kill → forced
//!   kill, each retried, the whole cycle bounded ([`stop::StopProtocol`])
//! - **Platform Strategies**: injectable [`SignalStrategy`] and
//!   [`ProcessEnumerator`] implementations
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use procvisor_process::{ProcessMonitor, ProcessSpec};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let monitor = ProcessMonitor::new();
//!
//! let spec = ProcessSpec::new("ping")
//!     .args(["-c", "100", "localhost"])
//!     .on_stdout(|line| println!("{}", String::from_utf8_lossy(line)));
//!
//! let tag = monitor.spawn(spec).await?;
//! assert!(monitor.get_process(&tag).is_running());
//!
//! monitor
//!     .stop_with_timeout(&tag, 1, Duration::from_millis(50))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod error;
pub mod find;
pub mod handle;
pub mod logging;
pub mod monitor;
pub mod settings;
pub mod signals;
pub mod spec;
pub mod stop;

pub use capture::StopNotifier;
pub use error::{ProcessError, Result, SignalError, SpawnErrorKind, StreamKind};
pub use find::{
    all_processes, process_by_pid, ProcessEnumerator, ProcessState, RuntimeProcessInfo,
    SystemEnumerator,
};
pub use handle::ProcessHandle;
pub use logging::init_tracing;
pub use monitor::ProcessMonitor;
pub use settings::{LoggingSettings, MonitorSettings, SettingsLoader};
pub use signals::{default_strategy, SignalStrategy};
pub use spec::{LineCallback, ProcessSpec, StoppedCallback};
pub use stop::{StopOutcome, StopPhase, StopProtocol, StopTarget};
