//! Process template: what to launch and where its output goes

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ProcessError, Result};

/// Receives one line of child output, without the trailing newline
pub type LineCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Invoked once when a process lifetime ends
pub type StoppedCallback = Arc<dyn Fn() + Send + Sync>;

/// Immutable description of a process to supervise
///
/// Callbacks are not serialized; a spec loaded from configuration starts
/// with none and the host attaches them with the builder methods.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    /// Executable path or name resolved through `PATH`
    pub executable: String,
    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory (empty = inherit the caller's)
    #[serde(default)]
    pub working_directory: String,
    /// `KEY=VALUE` entries (None = inherit, Some = full replacement)
    #[serde(default)]
    pub environment: Option<Vec<String>>,
    #[serde(skip)]
    on_stdout: Option<LineCallback>,
    #[serde(skip)]
    on_stderr: Option<LineCallback>,
    #[serde(skip)]
    on_stopped: Option<StoppedCallback>,
}

impl ProcessSpec {
    /// Create a spec for an executable with no arguments
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            ..Self::default()
        }
    }

    /// Set command arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set working directory
    pub fn working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = dir.into();
        self
    }

    /// Replace the child's environment with exactly these `KEY=VALUE` entries
    pub fn environment<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.environment = Some(entries.into_iter().map(Into::into).collect());
        self
    }

    /// Add one variable to the replacement environment
    ///
    /// Switches an inheriting spec to full replacement.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.environment
            .get_or_insert_with(Vec::new)
            .push(format!("{}={}", key.as_ref(), value.as_ref()));
        self
    }

    /// Deliver stdout lines to `callback`
    pub fn on_stdout<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.on_stdout = Some(Arc::new(callback));
        self
    }

    /// Deliver stdout lines to `callback` along with a caller parameter
    pub fn on_stdout_with<P, F>(self, params: P, callback: F) -> Self
    where
        P: Send + Sync + 'static,
        F: Fn(&P, &[u8]) + Send + Sync + 'static,
    {
        self.on_stdout(move |line| callback(&params, line))
    }

    /// Deliver stderr lines to `callback`
    ///
    /// Without a stderr callback the stream is not captured at all.
    pub fn on_stderr<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.on_stderr = Some(Arc::new(callback));
        self
    }

    /// Deliver stderr lines to `callback` along with a caller parameter
    pub fn on_stderr_with<P, F>(self, params: P, callback: F) -> Self
    where
        P: Send + Sync + 'static,
        F: Fn(&P, &[u8]) + Send + Sync + 'static,
    {
        self.on_stderr(move |line| callback(&params, line))
    }

    /// Notify once when the process lifetime ends
    pub fn on_stopped<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_stopped = Some(Arc::new(callback));
        self
    }

    /// Notify once when the process lifetime ends, with a caller parameter
    pub fn on_stopped_with<P, F>(self, params: P, callback: F) -> Self
    where
        P: Send + Sync + 'static,
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.on_stopped(move || callback(&params))
    }

    pub(crate) fn stdout_callback(&self) -> Option<LineCallback> {
        self.on_stdout.clone()
    }

    pub(crate) fn stderr_callback(&self) -> Option<LineCallback> {
        self.on_stderr.clone()
    }

    pub(crate) fn stopped_callback(&self) -> Option<StoppedCallback> {
        self.on_stopped.clone()
    }

    /// Whether stderr will be captured
    pub fn captures_stderr(&self) -> bool {
        self.on_stderr.is_some()
    }

    /// Parsed replacement environment, if any
    pub fn env_pairs(&self) -> Option<Vec<(&str, &str)>> {
        self.environment.as_ref().map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.split_once('='))
                .collect()
        })
    }

    /// Check the spec before launching
    pub fn validate(&self) -> Result<()> {
        if self.executable.trim().is_empty() {
            return Err(ProcessError::InvalidConfig(
                "executable must not be empty".to_string(),
            ));
        }

        if let Some(entries) = &self.environment {
            if let Some(bad) = entries.iter().find(|e| !e.contains('=') || e.starts_with('=')) {
                return Err(ProcessError::InvalidConfig(format!(
                    "environment entry `{bad}` is not KEY=VALUE"
                )));
            }
        }

        Ok(())
    }

    /// JSON rendering for log lines
    pub fn to_log_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

impl fmt::Debug for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSpec")
            .field("executable", &self.executable)
            .field("args", &self.args)
            .field("working_directory", &self.working_directory)
            .field("environment", &self.environment)
            .field("on_stdout", &self.on_stdout.is_some())
            .field("on_stderr", &self.on_stderr.is_some())
            .field("on_stopped", &self.on_stopped.is_some())
            .finish()
    }
}
