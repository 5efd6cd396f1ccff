//! Line-oriented capture of a child's output streams
//!
//! Each captured stream gets its own reader task. Lines are handed to the
//! spec's callback as raw bytes with the line ending removed; a final line
//! without a newline is still delivered when the stream ends.
//!
//! The first reader that sees its stream end fires the on-stopped
//! notification. Readers closed by their owner (see [`OutputCapture::close`])
//! exit quietly and leave the notification to the stop path.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ProcessError, StreamKind};
use crate::spec::{LineCallback, StoppedCallback};

/// Fires a stop callback at most once, whoever asks first
pub struct StopNotifier {
    fired: AtomicBool,
    callback: Mutex<Option<StoppedCallback>>,
}

impl StopNotifier {
    pub fn new(callback: Option<StoppedCallback>) -> Self {
        Self {
            fired: AtomicBool::new(false),
            callback: Mutex::new(callback),
        }
    }

    /// Run the callback if nobody has yet; returns whether this call fired
    ///
    /// The callback reference is dropped after it runs.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }

        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback();
        }
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Reader tasks and stop notification for one process lifetime
pub(crate) struct OutputCapture {
    notifier: Arc<StopNotifier>,
    shutdown: CancellationToken,
    readers: Vec<JoinHandle<()>>,
}

impl OutputCapture {
    pub(crate) fn new(on_stopped: Option<StoppedCallback>) -> Self {
        Self {
            notifier: Arc::new(StopNotifier::new(on_stopped)),
            shutdown: CancellationToken::new(),
            readers: Vec::new(),
        }
    }

    pub(crate) fn notifier(&self) -> Arc<StopNotifier> {
        self.notifier.clone()
    }

    /// Start a reader task for `stream`
    pub(crate) fn attach<R>(&mut self, stream: R, kind: StreamKind, on_line: Option<LineCallback>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let handle = attach(
            stream,
            kind,
            on_line,
            self.notifier.clone(),
            self.shutdown.clone(),
        );
        self.readers.push(handle);
    }

    /// Close every stream so blocked readers return
    pub(crate) fn close(&self) {
        self.shutdown.cancel();
    }

    pub(crate) fn take_readers(&mut self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut self.readers)
    }
}

/// Wait for reader tasks handed out by [`OutputCapture::take_readers`]
pub(crate) async fn join_readers(readers: Vec<JoinHandle<()>>) {
    for reader in readers {
        if let Err(e) = reader.await {
            if e.is_panic() {
                warn!(error = %e, "Output reader panicked");
            }
        }
    }
}

enum ReadOutcome {
    Eof,
    Closed,
    Failed(io::Error),
}

/// Spawn a reader that feeds `on_line` until the stream ends or is closed
pub fn attach<R>(
    stream: R,
    kind: StreamKind,
    on_line: Option<LineCallback>,
    notifier: Arc<StopNotifier>,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);

        let outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => ReadOutcome::Closed,
            result = pump_lines(&mut reader, on_line.as_deref()) => match result {
                Ok(()) => ReadOutcome::Eof,
                Err(e) => ReadOutcome::Failed(e),
            },
        };

        match outcome {
            ReadOutcome::Eof => {
                debug!(stream = %kind, "Output stream ended");
                notifier.fire();
            }
            ReadOutcome::Failed(source) => {
                let err = ProcessError::Capture { stream: kind, source };
                warn!(stream = %kind, error = %err, "Output capture failed");
                notifier.fire();
            }
            ReadOutcome::Closed => {
                debug!(stream = %kind, "Output stream closed by owner");
            }
        }
    })
}

/// Deliver every line of `reader` to `on_line`
///
/// Lines are drained even without a callback so the child never blocks on
/// a full pipe.
pub async fn pump_lines<R>(
    reader: &mut R,
    on_line: Option<&(dyn Fn(&[u8]) + Send + Sync)>,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }

        if let Some(on_line) = on_line {
            on_line(trim_line_ending(&buf));
        }
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
