//! Error types for process supervision

use std::fmt;
use std::io;

use thiserror::Error;

/// Which output stream of a child a capture error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// Why a process could not be launched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnErrorKind {
    ExecutableNotFound,
    PermissionDenied,
    InvalidWorkingDirectory,
    Other,
}

impl SpawnErrorKind {
    /// Classify an I/O error returned by the OS launcher
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => SpawnErrorKind::ExecutableNotFound,
            io::ErrorKind::PermissionDenied => SpawnErrorKind::PermissionDenied,
            _ => SpawnErrorKind::Other,
        }
    }
}

impl fmt::Display for SpawnErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SpawnErrorKind::ExecutableNotFound => "executable not found",
            SpawnErrorKind::PermissionDenied => "permission denied",
            SpawnErrorKind::InvalidWorkingDirectory => "invalid working directory",
            SpawnErrorKind::Other => "launch failed",
        };
        f.write_str(text)
    }
}

/// Failure to deliver one escalation signal
#[derive(Debug, Error)]
#[error("failed to deliver {signal} to pid {pid}: {source}")]
pub struct SignalError {
    pub signal: &'static str,
    pub pid: u32,
    #[source]
    pub source: io::Error,
}

impl SignalError {
    pub fn new(signal: &'static str, pid: u32, source: io::Error) -> Self {
        Self {
            signal,
            pid,
            source,
        }
    }
}

/// Process supervision errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The OS refused to launch the executable
    #[error("failed to spawn `{executable}` ({kind}): {source}")]
    Spawn {
        executable: String,
        kind: SpawnErrorKind,
        #[source]
        source: io::Error,
    },

    /// Reading a child's output stream failed before end-of-stream
    #[error("failed to read {stream}: {source}")]
    Capture {
        stream: StreamKind,
        #[source]
        source: io::Error,
    },

    /// The platform process-table query failed
    #[error("process table query failed: {0}")]
    Enumeration(String),

    /// No process with this pid exists
    #[error("process not found (PID: {pid})")]
    NotFound { pid: u32 },

    /// Every escalation phase and cycle was exhausted
    #[error("failed to stop process {pid} after {cycles} escalation cycles")]
    StopFailed {
        pid: u32,
        cycles: u32,
        #[source]
        last_error: Option<SignalError>,
    },

    /// Invalid process or monitor configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Settings could not be loaded
    #[error("settings error: {0}")]
    Settings(#[from] config::ConfigError),

    /// Logging or runtime initialisation failed
    #[error("initialization error: {0}")]
    Initialization(String),
}

impl ProcessError {
    /// Stable short code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            ProcessError::Spawn { .. } => "PROC001",
            ProcessError::Capture { .. } => "PROC002",
            ProcessError::Enumeration(_) => "PROC003",
            ProcessError::NotFound { .. } => "PROC004",
            ProcessError::StopFailed { .. } => "PROC005",
            ProcessError::InvalidConfig(_) => "PROC006",
            ProcessError::Settings(_) => "PROC007",
            ProcessError::Initialization(_) => "PROC008",
        }
    }

    pub(crate) fn spawn(executable: &str, source: io::Error) -> Self {
        ProcessError::Spawn {
            executable: executable.to_string(),
            kind: SpawnErrorKind::from_io(&source),
            source,
        }
    }

    pub(crate) fn enumeration(context: &str, err: impl fmt::Display) -> Self {
        ProcessError::Enumeration(format!("{context}: {err}"))
    }
}

/// Result type for process operations
pub type Result<T> = std::result::Result<T, ProcessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_kind_classification() {
        let not_found = io::Error::from(io::ErrorKind::NotFound);
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        let other = io::Error::from(io::ErrorKind::Interrupted);

        assert_eq!(
            SpawnErrorKind::from_io(&not_found),
            SpawnErrorKind::ExecutableNotFound
        );
        assert_eq!(
            SpawnErrorKind::from_io(&denied),
            SpawnErrorKind::PermissionDenied
        );
        assert_eq!(SpawnErrorKind::from_io(&other), SpawnErrorKind::Other);
    }

    #[test]
    fn test_error_codes() {
        let err = ProcessError::spawn("nope", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.code(), "PROC001");
        assert_eq!(ProcessError::NotFound { pid: 7 }.code(), "PROC004");
        assert_eq!(
            ProcessError::StopFailed {
                pid: 1,
                cycles: 20,
                last_error: None
            }
            .code(),
            "PROC005"
        );
    }

    #[test]
    fn test_error_display() {
        let err = ProcessError::spawn("missing-bin", io::Error::from(io::ErrorKind::NotFound));
        let text = err.to_string();
        assert!(text.contains("missing-bin"));
        assert!(text.contains("executable not found"));

        let capture = ProcessError::Capture {
            stream: StreamKind::Stderr,
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        };
        assert!(capture.to_string().starts_with("failed to read stderr"));
    }

    #[test]
    fn test_stop_failed_keeps_signal_source() {
        use std::error::Error as _;

        let err = ProcessError::StopFailed {
            pid: 42,
            cycles: 20,
            last_error: Some(SignalError::new(
                "SIGKILL",
                42,
                io::Error::from(io::ErrorKind::PermissionDenied),
            )),
        };
        let source = err.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(source.contains("SIGKILL"));
    }
}
