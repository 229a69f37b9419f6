//! Persistent Worker Channel
//!
//! Keeps one metadata worker (exiftool in `-stay_open` mode) alive across
//! requests instead of paying its startup cost on every call.
//!
//! A request is a block of command lines followed by an `-execute` line.
//! The worker answers with its output followed by `{ready}`. Requests are
//! strictly serialised: request N+1 is never written before response N has
//! been read, because nothing in the output stream says which request a
//! response belongs to.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use super::framing::{FrameError, RawRecord, ResponseFramer};

/// Line that makes the worker run the batch it has received so far
pub const EXECUTE_MARKER: &str = "-execute";

/// Tells the worker to leave keep-open mode and exit
pub const STOP_COMMAND: &[u8] = b"-stay_open\nFalse\n";

const READ_CHUNK_SIZE: usize = 4096;
const STDERR_LINES_KEPT: usize = 32;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How to launch and supervise the worker
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Worker binary name (looked up in PATH) or path
    pub program: PathBuf,
    /// Arguments that put the worker in keep-open mode reading from stdin
    pub args: Vec<String>,
    /// Upper bound on waiting for one response; `None` blocks indefinitely
    pub response_timeout: Option<Duration>,
    /// How long to wait for a clean exit before killing the worker
    pub shutdown_timeout: Duration,
    /// Capture and log the worker's stderr instead of discarding it
    pub capture_stderr: bool,
}

impl ChannelOptions {
    pub fn exiftool() -> Self {
        Self {
            program: PathBuf::from("exiftool"),
            args: ["-stay_open", "True", "-@", "-"]
                .into_iter()
                .map(String::from)
                .collect(),
            response_timeout: Some(Duration::from_secs(30)),
            shutdown_timeout: Duration::from_secs(5),
            capture_stderr: true,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::exiftool()
    }
}

/// What the caller expects back from a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Fire-and-forget: return as soon as the request is flushed
    None,
    /// JSON array of flat records
    Structured,
    /// Raw bytes, e.g. an embedded preview image
    Binary,
}

/// A decoded worker response
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Structured(Vec<RawRecord>),
    Binary(Vec<u8>),
}

impl Response {
    pub fn into_records(self) -> Option<Vec<RawRecord>> {
        match self {
            Response::Structured(records) => Some(records),
            Response::Binary(_) => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Response::Binary(bytes) => Some(bytes),
            Response::Structured(_) => None,
        }
    }
}

/// Lifecycle of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Running,
    /// A response was lost (timeout or worker death); only restart or shutdown are allowed
    Desynchronized,
    Stopped,
}

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Binary '{0}' not found. Install it or add to PATH.")]
    BinaryNotFound(String),

    #[error("Failed to launch worker '{program}': {source}")]
    LaunchFailed {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Worker did not answer within {waited:?}")]
    Timeout { waited: Duration, stderr: String },

    #[error("Worker exited before completing its response")]
    WorkerExited { stderr: String },

    #[error("Channel lost track of the worker's responses; restart it")]
    Desynchronized,

    #[error("Channel has been shut down")]
    Stopped,

    #[error("Channel is attached to external streams and cannot be restarted")]
    NotRestartable,

    #[error("Failed to decode worker response: {0}")]
    Decode(#[from] FrameError),

    #[error("IO error talking to worker: {0}")]
    Io(#[from] io::Error),
}

impl ChannelError {
    /// Worker diagnostics captured around the failure, if any
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ChannelError::Timeout { stderr, .. } | ChannelError::WorkerExited { stderr } => {
                Some(stderr.as_str()).filter(|s| !s.is_empty())
            }
            _ => None,
        }
    }

    /// Whether the channel needs a restart before it can be used again
    pub fn requires_restart(&self) -> bool {
        matches!(
            self,
            ChannelError::Timeout { .. }
                | ChannelError::WorkerExited { .. }
                | ChannelError::Desynchronized
                | ChannelError::Io(_)
        )
    }
}

enum ReaderEvent {
    Chunk(Vec<u8>),
    Eof,
    Failed(io::Error),
}

type StderrTail = Arc<Mutex<VecDeque<String>>>;

struct Worker {
    stdin: Option<Box<dyn Write + Send>>,
    stdout: Receiver<ReaderEvent>,
    child: Option<Child>,
}

struct Inner {
    worker: Worker,
    state: ChannelState,
    /// Responses to fire-and-forget requests that have not been read yet
    owed_responses: usize,
}

impl Inner {
    fn ensure_running(&self) -> Result<(), ChannelError> {
        match self.state {
            ChannelState::Running => Ok(()),
            ChannelState::Desynchronized => Err(ChannelError::Desynchronized),
            ChannelState::Stopped => {
                tracing::error!("Request submitted to a channel that was already shut down");
                Err(ChannelError::Stopped)
            }
        }
    }
}

/// Owns one long-lived worker process and serialises requests to it
pub struct ProcessChannel {
    options: ChannelOptions,
    launchable: bool,
    stderr_tail: StderrTail,
    inner: Mutex<Inner>,
}

impl ProcessChannel {
    /// Launch the worker in keep-open mode
    pub fn spawn(options: ChannelOptions) -> Result<Self, ChannelError> {
        let stderr_tail = StderrTail::default();
        let worker = launch(&options, &stderr_tail)?;

        Ok(Self {
            options,
            launchable: true,
            stderr_tail,
            inner: Mutex::new(Inner {
                worker,
                state: ChannelState::Running,
                owed_responses: 0,
            }),
        })
    }

    /// Attach to streams of a worker that is already running elsewhere
    pub fn from_streams<W, R>(writer: W, reader: R, options: ChannelOptions) -> Result<Self, ChannelError>
    where
        W: Write + Send + 'static,
        R: Read + Send + 'static,
    {
        let worker = Worker {
            stdin: Some(Box::new(writer)),
            stdout: spawn_reader(reader)?,
            child: None,
        };

        Ok(Self {
            options,
            launchable: false,
            stderr_tail: StderrTail::default(),
            inner: Mutex::new(Inner {
                worker,
                state: ChannelState::Running,
                owed_responses: 0,
            }),
        })
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    pub fn state(&self) -> ChannelState {
        self.lock().state
    }

    /// OS process id of the current worker, if this channel launched one
    pub fn pid(&self) -> Option<u32> {
        self.lock().worker.child.as_ref().map(Child::id)
    }

    /// Most recent stderr lines from the worker, oldest first
    pub fn recent_stderr(&self) -> String {
        recent_lines(&self.stderr_tail)
    }

    /// Send one batch of command lines and optionally wait for the answer
    ///
    /// `command_text` must not include the `-execute` marker; it is appended
    /// here. With [`ResponseKind::None`] the call returns right after the
    /// flush and the worker's answer is read (and logged) before the next
    /// request goes out, so worker-side failures of such calls are only
    /// visible in the log.
    pub fn submit(&self, command_text: &str, kind: ResponseKind) -> Result<Option<Response>, ChannelError> {
        let mut inner = self.lock();
        inner.ensure_running()?;
        self.drain_owed(&mut inner)?;

        let mut request = String::with_capacity(command_text.len() + EXECUTE_MARKER.len() + 2);
        request.push_str(command_text);
        if !request.is_empty() && !request.ends_with('\n') {
            request.push('\n');
        }
        request.push_str(EXECUTE_MARKER);
        request.push('\n');

        tracing::debug!(?kind, request = %command_text.trim_end(), "Submitting worker request");
        self.write(&mut inner, request.as_bytes())?;

        match kind {
            ResponseKind::None => {
                inner.owed_responses += 1;
                Ok(None)
            }
            ResponseKind::Structured => {
                let framer = self.read_response(&mut inner)?;
                Ok(Some(Response::Structured(framer.into_records()?)))
            }
            ResponseKind::Binary => {
                let framer = self.read_response(&mut inner)?;
                Ok(Some(Response::Binary(framer.into_binary()?)))
            }
        }
    }

    /// Submit a request and decode the JSON records it returns
    pub fn query_records(&self, command_text: &str) -> Result<Vec<RawRecord>, ChannelError> {
        let response = self.submit(command_text, ResponseKind::Structured)?;
        Ok(response.and_then(Response::into_records).unwrap_or_default())
    }

    /// Submit a request and return its raw output bytes
    pub fn query_bytes(&self, command_text: &str) -> Result<Vec<u8>, ChannelError> {
        let response = self.submit(command_text, ResponseKind::Binary)?;
        Ok(response.and_then(Response::into_bytes).unwrap_or_default())
    }

    /// Kill the current worker and start a fresh one with the same options
    pub fn restart(&self) -> Result<(), ChannelError> {
        if !self.launchable {
            return Err(ChannelError::NotRestartable);
        }

        let mut inner = self.lock();
        if inner.state == ChannelState::Stopped {
            return Err(ChannelError::Stopped);
        }

        inner.state = ChannelState::Desynchronized;
        inner.worker.stdin = None;
        if let Some(mut child) = inner.worker.child.take() {
            tracing::info!(pid = child.id(), "Killing worker for restart");
            kill_and_reap(&mut child)?;
        }

        inner.worker = launch(&self.options, &self.stderr_tail)?;
        inner.owed_responses = 0;
        inner.state = ChannelState::Running;
        Ok(())
    }

    /// Ask the worker to leave keep-open mode and wait for it to exit
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn shutdown(&self) -> Result<(), ChannelError> {
        let mut inner = self.lock();
        if inner.state == ChannelState::Stopped {
            return Ok(());
        }

        if inner.state == ChannelState::Running {
            if let Err(err) = self.drain_owed(&mut inner) {
                tracing::warn!(error = %err, "Lost pending worker acknowledgements during shutdown");
            }
        }

        let result = self.stop_worker(&mut inner);
        inner.state = ChannelState::Stopped;
        result
    }

    fn stop_worker(&self, inner: &mut Inner) -> Result<(), ChannelError> {
        if let Some(mut stdin) = inner.worker.stdin.take() {
            let sent = stdin.write_all(STOP_COMMAND).and_then(|_| stdin.flush());
            if let Err(err) = sent {
                tracing::debug!(error = %err, "Worker input already closed");
            }
        }

        match inner.worker.child.take() {
            Some(child) => wait_or_kill(child, self.options.shutdown_timeout),
            None => Ok(()),
        }
    }

    fn write(&self, inner: &mut Inner, bytes: &[u8]) -> Result<(), ChannelError> {
        let Some(stdin) = inner.worker.stdin.as_mut() else {
            inner.state = ChannelState::Desynchronized;
            return Err(ChannelError::Desynchronized);
        };

        match stdin.write_all(bytes).and_then(|_| stdin.flush()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                inner.state = ChannelState::Desynchronized;
                Err(ChannelError::WorkerExited {
                    stderr: self.recent_stderr(),
                })
            }
            Err(err) => {
                inner.state = ChannelState::Desynchronized;
                Err(err.into())
            }
        }
    }

    fn drain_owed(&self, inner: &mut Inner) -> Result<(), ChannelError> {
        while inner.owed_responses > 0 {
            let framer = self.read_response(inner)?;
            inner.owed_responses -= 1;
            let ack = framer.into_text()?;
            if ack_reports_failure(&ack) {
                tracing::warn!(ack = %ack.trim(), "Worker did not apply fire-and-forget request");
            } else {
                tracing::debug!(ack = %ack.trim(), "Worker finished fire-and-forget request");
            }
        }
        Ok(())
    }

    fn read_response(&self, inner: &mut Inner) -> Result<ResponseFramer, ChannelError> {
        let deadline = self
            .options
            .response_timeout
            .map(|timeout| (timeout, Instant::now() + timeout));
        let mut framer = ResponseFramer::new();

        loop {
            let event = match deadline {
                Some((timeout, at)) => match inner.worker.stdout.recv_deadline(at) {
                    Ok(event) => event,
                    Err(RecvTimeoutError::Disconnected) => ReaderEvent::Eof,
                    Err(RecvTimeoutError::Timeout) => {
                        inner.state = ChannelState::Desynchronized;
                        tracing::warn!(?timeout, received = framer.len(), "Worker response timed out");
                        return Err(ChannelError::Timeout {
                            waited: timeout,
                            stderr: self.recent_stderr(),
                        });
                    }
                },
                None => inner.worker.stdout.recv().unwrap_or(ReaderEvent::Eof),
            };

            match event {
                ReaderEvent::Chunk(bytes) => {
                    if framer.push(&bytes) {
                        return Ok(framer);
                    }
                }
                ReaderEvent::Eof => {
                    inner.state = ChannelState::Desynchronized;
                    return Err(ChannelError::WorkerExited {
                        stderr: self.recent_stderr(),
                    });
                }
                ReaderEvent::Failed(err) => {
                    inner.state = ChannelState::Desynchronized;
                    return Err(err.into());
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::warn!(error = %err, "Failed to shut down worker cleanly");
        }
    }
}

impl std::fmt::Debug for ProcessChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessChannel")
            .field("program", &self.options.program)
            .field("state", &self.state())
            .finish()
    }
}

/// Find the worker binary, either as given or in PATH
fn resolve_program(program: &Path) -> Result<PathBuf, ChannelError> {
    if program.exists() {
        return Ok(program.to_path_buf());
    }
    which::which(program).map_err(|_| ChannelError::BinaryNotFound(program.display().to_string()))
}

fn launch(options: &ChannelOptions, stderr_tail: &StderrTail) -> Result<Worker, ChannelError> {
    let program = resolve_program(&options.program)?;

    let mut cmd = Command::new(&program);
    cmd.args(&options.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(if options.capture_stderr {
            Stdio::piped()
        } else {
            Stdio::null()
        });

    let mut child = cmd.spawn().map_err(|source| ChannelError::LaunchFailed {
        program: program.display().to_string(),
        source,
    })?;

    match attach(&mut child, stderr_tail) {
        Ok((stdin, stdout)) => {
            tracing::info!(program = %program.display(), pid = child.id(), "Worker started");
            Ok(Worker {
                stdin: Some(stdin),
                stdout,
                child: Some(child),
            })
        }
        Err(err) => {
            let _ = kill_and_reap(&mut child);
            Err(err)
        }
    }
}

fn attach(
    child: &mut Child,
    stderr_tail: &StderrTail,
) -> Result<(Box<dyn Write + Send>, Receiver<ReaderEvent>), ChannelError> {
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::other("worker stdin was not captured"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("worker stdout was not captured"))?;

    if let Some(stderr) = child.stderr.take() {
        spawn_stderr_logger(stderr, Arc::clone(stderr_tail))?;
    }

    Ok((Box::new(stdin), spawn_reader(stdout)?))
}

/// Forward stdout chunks to the channel so reads can be bounded by a deadline
fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> io::Result<Receiver<ReaderEvent>> {
    let (tx, rx) = crossbeam_channel::unbounded();

    thread::Builder::new()
        .name("chhobi-worker-stdout".to_string())
        .spawn(move || {
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        let _ = tx.send(ReaderEvent::Eof);
                        break;
                    }
                    Ok(n) => {
                        if tx.send(ReaderEvent::Chunk(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        let _ = tx.send(ReaderEvent::Failed(err));
                        break;
                    }
                }
            }
        })?;

    Ok(rx)
}

fn spawn_stderr_logger<R: Read + Send + 'static>(stream: R, tail: StderrTail) -> io::Result<()> {
    thread::Builder::new()
        .name("chhobi-worker-stderr".to_string())
        .spawn(move || {
            for line in BufReader::new(stream).split(b'\n') {
                let Ok(line) = line else { break };
                let text = String::from_utf8_lossy(&line).trim_end().to_string();
                if text.is_empty() {
                    continue;
                }
                tracing::warn!(target: "chhobi::worker", "{}", text);

                let mut lines = tail.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if lines.len() == STDERR_LINES_KEPT {
                    lines.pop_front();
                }
                lines.push_back(text);
            }
        })?;

    Ok(())
}

/// A write acknowledgement with no "N files updated" count, or one
/// that reports files left untouched because of errors
fn ack_reports_failure(ack: &str) -> bool {
    let updated = ack.lines().map(str::trim).any(|line| {
        line.ends_with("files updated") && line.split_whitespace().next().is_some_and(|count| count != "0")
    });
    !updated || ack.contains("weren't updated")
}

fn recent_lines(tail: &StderrTail) -> String {
    let lines = tail.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
}

fn wait_or_kill(mut child: Child, timeout: Duration) -> Result<(), ChannelError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            tracing::info!(pid = child.id(), %status, "Worker exited");
            return Ok(());
        }
        if Instant::now() >= deadline {
            tracing::warn!(pid = child.id(), ?timeout, "Worker ignored stop command, killing it");
            return kill_and_reap(&mut child);
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

fn kill_and_reap(child: &mut Child) -> Result<(), ChannelError> {
    let _ = child.kill();
    child.wait()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{ScriptedReader, SharedWriter};
    use crossbeam_channel::Sender;
    use serde_json::json;

    fn scripted(chunks: &[&[u8]]) -> (ProcessChannel, SharedWriter, Sender<Vec<u8>>) {
        crate::host::testing::scripted(chunks, Duration::from_secs(5))
    }

    #[test]
    fn test_structured_response_in_order() {
        let (channel, writer, _tx) = scripted(&[b"[{\"Model\":\"X\"}, {\"Model\":\"Y\"}]\n{ready}\n"]);

        let records = channel.query_records("-j\na.jpg\nb.jpg\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["Model"], json!("X"));
        assert_eq!(records[1]["Model"], json!("Y"));
        assert_eq!(writer.text(), "-j\na.jpg\nb.jpg\n-execute\n");
    }

    #[test]
    fn test_execute_marker_added_without_trailing_newline() {
        let (channel, writer, _tx) = scripted(&[b"[]{ready}\n"]);
        channel.query_records("-j\na.jpg").unwrap();
        assert_eq!(writer.text(), "-j\na.jpg\n-execute\n");
    }

    #[test]
    fn test_split_sentinel_across_reads() {
        let (channel, _writer, _tx) = scripted(&[b"[{\"Model\":\"X\"}]\n{rea", b"dy}\n"]);
        let records = channel.query_records("a.jpg").unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_empty_structured_response() {
        let (channel, _writer, _tx) = scripted(&[b"{ready}\n"]);
        let response = channel.submit("a.jpg", ResponseKind::Structured).unwrap();
        assert_eq!(response, Some(Response::Structured(Vec::new())));
    }

    #[test]
    fn test_binary_response() {
        let payload: &[u8] = b"\x00\x01\xff\xd8 jpeg";
        let (channel, _writer, _tx) = scripted(&[payload, b"{ready}\n"]);
        assert_eq!(channel.query_bytes("-b\na.jpg").unwrap(), payload);
    }

    #[test]
    fn test_empty_binary_response() {
        let (channel, _writer, _tx) = scripted(&[b"{ready}\n"]);
        let response = channel.submit("-ThumbnailImage\n-b\na.jpg", ResponseKind::Binary).unwrap();
        assert_eq!(response, Some(Response::Binary(Vec::new())));
    }

    #[test]
    fn test_ack_reports_failure() {
        assert!(!ack_reports_failure("    2 image files updated\n"));
        assert!(!ack_reports_failure("    1 image files updated\n    1 image files unchanged\n"));
        assert!(ack_reports_failure(
            "Error: File not found - missing.jpg\n    0 image files updated\n    1 files weren't updated due to errors\n"
        ));
        assert!(ack_reports_failure(
            "    1 image files updated\n    1 files weren't updated due to errors\n"
        ));
        assert!(ack_reports_failure("    0 image files updated\n    1 image files unchanged\n"));
        assert!(ack_reports_failure(""));
    }

    #[test]
    fn test_fire_and_forget_ack_is_drained_before_next_request() {
        let (channel, writer, _tx) = scripted(&[
            b"    1 image files updated\n{ready}\n",
            b"[{\"Keywords\":\"keeper\"}]{ready}\n",
        ]);

        let response = channel.submit("-Keywords+=keeper\na.jpg", ResponseKind::None).unwrap();
        assert!(response.is_none());

        let records = channel.query_records("-j\na.jpg").unwrap();
        assert_eq!(records[0]["Keywords"], json!("keeper"));
        assert_eq!(
            writer.text(),
            "-Keywords+=keeper\na.jpg\n-execute\n-j\na.jpg\n-execute\n"
        );
    }

    #[test]
    fn test_decode_error_keeps_channel_usable() {
        let (channel, _writer, _tx) = scripted(&[b"not json{ready}\n", b"[]{ready}\n"]);

        let err = channel.query_records("a.jpg").unwrap_err();
        assert!(matches!(err, ChannelError::Decode(_)));
        assert_eq!(channel.state(), ChannelState::Running);
        assert!(channel.query_records("a.jpg").unwrap().is_empty());
    }

    #[test]
    fn test_shutdown_twice_writes_stop_once() {
        let (channel, writer, _tx) = scripted(&[]);
        channel.shutdown().unwrap();
        channel.shutdown().unwrap();

        assert_eq!(channel.state(), ChannelState::Stopped);
        assert_eq!(writer.text().matches("-stay_open").count(), 1);
        assert_eq!(writer.text(), "-stay_open\nFalse\n");
    }

    #[test]
    fn test_shutdown_drains_pending_ack() {
        let (channel, writer, _tx) = scripted(&[b"1 image files updated\n{ready}\n"]);
        channel.submit("-Caption-Abstract=hi\na.jpg", ResponseKind::None).unwrap();
        channel.shutdown().unwrap();
        assert!(writer.text().ends_with("-execute\n-stay_open\nFalse\n"));
    }

    #[test]
    fn test_submit_after_shutdown() {
        let (channel, _writer, _tx) = scripted(&[]);
        channel.shutdown().unwrap();
        let err = channel.submit("a.jpg", ResponseKind::Structured).unwrap_err();
        assert!(matches!(err, ChannelError::Stopped));
    }

    #[test]
    fn test_eof_mid_response() {
        let (channel, _writer, tx) = scripted(&[b"[{\"Model\":"]);
        drop(tx);

        let err = channel.query_records("a.jpg").unwrap_err();
        assert!(matches!(err, ChannelError::WorkerExited { .. }));
        assert!(err.requires_restart());
        assert_eq!(channel.state(), ChannelState::Desynchronized);

        let err = channel.query_records("a.jpg").unwrap_err();
        assert!(matches!(err, ChannelError::Desynchronized));
        assert!(matches!(channel.restart(), Err(ChannelError::NotRestartable)));
        channel.shutdown().unwrap();
        assert_eq!(channel.state(), ChannelState::Stopped);
    }

    #[test]
    fn test_timeout_desynchronizes() {
        let (tx, rx) = crossbeam_channel::unbounded::<Vec<u8>>();
        let reader = ScriptedReader::new(rx);
        let options = ChannelOptions::exiftool().with_response_timeout(Some(Duration::from_millis(50)));
        let channel = ProcessChannel::from_streams(SharedWriter::default(), reader, options).unwrap();

        let err = channel.query_records("a.jpg").unwrap_err();
        match err {
            ChannelError::Timeout { waited, .. } => assert_eq!(waited, Duration::from_millis(50)),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(channel.state(), ChannelState::Desynchronized);
        drop(tx);
    }

    #[test]
    fn test_serialised_across_threads() {
        let (channel, _writer, _tx) = scripted(&[
            b"[{\"n\":1}]{ready}\n",
            b"[{\"n\":2}]{ready}\n",
            b"[{\"n\":3}]{ready}\n",
            b"[{\"n\":4}]{ready}\n",
        ]);
        let channel = Arc::new(channel);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let channel = Arc::clone(&channel);
                thread::spawn(move || channel.query_records("a.jpg").unwrap())
            })
            .collect();

        let mut seen: Vec<i64> = handles
            .into_iter()
            .map(|h| h.join().unwrap()[0]["n"].as_i64().unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_missing_binary() {
        let options = ChannelOptions::exiftool().with_program("definitely-not-a-real-worker-binary");
        let err = ProcessChannel::spawn(options).unwrap_err();
        assert!(matches!(err, ChannelError::BinaryNotFound(ref name) if name.contains("definitely")));
    }

    #[test]
    fn test_error_display() {
        let err = ChannelError::BinaryNotFound("exiftool".to_string());
        assert!(err.to_string().contains("exiftool"));

        let err = ChannelError::Timeout {
            waited: Duration::from_secs(1),
            stderr: String::new(),
        };
        assert!(err.to_string().contains("did not answer"));
        assert!(err.stderr().is_none());
    }

    #[cfg(unix)]
    mod worker {
        use super::*;

        const ANSWERING_WORKER: &str = r#"
while IFS= read -r line; do
  case "$line" in
    -execute) printf '[{"SourceFile":"a.jpg","Model":"X"}]\n{ready}\n' ;;
    -stay_open) exit 0 ;;
  esac
done
"#;

        const SILENT_WORKER: &str = r#"while IFS= read -r line; do :; done"#;

        const COMPLAINING_WORKER: &str = r#"
while IFS= read -r line; do
  case "$line" in
    -execute) echo "Warning: nothing to do" >&2; printf '{ready}\n' ;;
    -stay_open) exit 0 ;;
  esac
done
"#;

        const DYING_WORKER: &str = r#"
while IFS= read -r line; do
  case "$line" in
    -execute) printf '[{"Model":'; exit 3 ;;
  esac
done
"#;

        const STUBBORN_WORKER: &str = r#"while true; do sleep 0.05; done"#;

        fn sh(script: &str) -> ChannelOptions {
            ChannelOptions::exiftool()
                .with_program("sh")
                .with_args(["-c", script])
                .with_response_timeout(Some(Duration::from_secs(5)))
                .with_shutdown_timeout(Duration::from_secs(2))
        }

        #[test]
        fn test_spawned_worker_round_trip() {
            let channel = ProcessChannel::spawn(sh(ANSWERING_WORKER)).unwrap();
            assert!(channel.pid().is_some());

            for _ in 0..3 {
                let records = channel.query_records("-j\na.jpg").unwrap();
                assert_eq!(records.len(), 1);
                assert_eq!(records[0]["Model"], json!("X"));
            }

            channel.shutdown().unwrap();
            assert!(channel.pid().is_none());
            channel.shutdown().unwrap();
        }

        #[test]
        fn test_spawned_worker_timeout_and_restart() {
            let options = sh(SILENT_WORKER).with_response_timeout(Some(Duration::from_millis(100)));
            let channel = ProcessChannel::spawn(options).unwrap();
            let first_pid = channel.pid();

            let err = channel.query_records("a.jpg").unwrap_err();
            assert!(matches!(err, ChannelError::Timeout { .. }));
            assert_eq!(channel.state(), ChannelState::Desynchronized);

            channel.restart().unwrap();
            assert_eq!(channel.state(), ChannelState::Running);
            assert_ne!(channel.pid(), first_pid);
            channel.shutdown().unwrap();
        }

        #[test]
        fn test_stderr_is_captured() {
            let channel = ProcessChannel::spawn(sh(COMPLAINING_WORKER)).unwrap();
            assert!(channel.query_records("a.jpg").unwrap().is_empty());

            let deadline = Instant::now() + Duration::from_secs(2);
            while channel.recent_stderr().is_empty() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            assert!(channel.recent_stderr().contains("nothing to do"));
            channel.shutdown().unwrap();
        }

        #[test]
        fn test_worker_death_mid_response() {
            let channel = ProcessChannel::spawn(sh(DYING_WORKER)).unwrap();
            let err = channel.query_records("a.jpg").unwrap_err();
            assert!(matches!(err, ChannelError::WorkerExited { .. }));
            channel.shutdown().unwrap();
        }

        #[test]
        fn test_stubborn_worker_is_killed_on_shutdown() {
            let options = sh(STUBBORN_WORKER).with_shutdown_timeout(Duration::from_millis(200));
            let channel = ProcessChannel::spawn(options).unwrap();

            let started = Instant::now();
            channel.shutdown().unwrap();
            assert!(started.elapsed() < Duration::from_secs(5));
            assert_eq!(channel.state(), ChannelState::Stopped);
        }
    }
}
