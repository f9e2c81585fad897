//! Child process execution
//!
//! Spawns a resolved command, feeds it stdin, captures its output streams,
//! and enforces a wall-clock limit by killing the whole process tree.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

pub use crate::process::tree::{ProcessTree, platform_tree};

pub mod tree;

/// Grace period for draining pipes after a timeout kill
const DRAIN_GRACE: Duration = Duration::from_millis(200);

const READ_CHUNK: usize = 8 * 1024;

const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Errors that occur while running a child process
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("failed to terminate process tree rooted at {pid}: {source}")]
    Terminate {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid process id {0}")]
    InvalidPid(u32),

    #[error("process id unavailable after spawn")]
    MissingPid,
}

impl ProcessError {
    /// Whether the program to spawn does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProcessError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// A resolved command ready for spawning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl RunSpec {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Captured outcome of one child process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub exit_status: Option<i32>,
    pub signal: Option<i32>,
    pub duration: Duration,
}

impl RunOutput {
    /// Check if the process exited with code 0 before the deadline
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.exit_status == Some(0)
    }
}

/// Message reported on stderr when a program exceeds its time limit
pub fn timeout_message(limit: Duration) -> String {
    format!(
        "Execution timed out ({} seconds). Your program may have an infinite loop or is taking too long to process.",
        format_seconds(limit)
    )
}

pub(crate) fn format_seconds(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        return duration.as_secs().to_string();
    }
    let s = format!("{:.3}", duration.as_secs_f64());
    s.trim_end_matches('0').trim_end_matches('.').to_owned()
}

/// Bounded buffer for one output stream
#[derive(Debug)]
struct Capture {
    bytes: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl Capture {
    fn new(limit: usize) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            bytes: Vec::new(),
            limit,
            truncated: false,
        }))
    }

    fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn take_text(capture: &Mutex<Self>) -> String {
        let mut capture = capture.lock().unwrap_or_else(|e| e.into_inner());
        let bytes = std::mem::take(&mut capture.bytes);
        let mut text = String::from_utf8_lossy(&bytes).into_owned();
        if capture.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}

/// Read a stream to EOF into `capture`, chunk by chunk
fn spawn_capture<R>(reader: Option<R>, capture: Arc<Mutex<Capture>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return;
        };
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => capture
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(&buf[..n]),
                Err(e) => {
                    debug!(error = %e, "output stream read failed");
                    break;
                }
            }
        }
    })
}

/// Spawns programs and supervises them until exit or timeout
#[derive(Debug)]
pub struct ProcessRunner {
    tree: Box<dyn ProcessTree>,
    max_output_bytes: usize,
}

impl ProcessRunner {
    /// Create a runner capturing at most `max_output_bytes` per stream
    pub fn new(max_output_bytes: usize) -> Self {
        Self {
            tree: platform_tree(),
            max_output_bytes,
        }
    }

    /// Replace the process tree termination strategy
    pub fn with_tree(mut self, tree: Box<dyn ProcessTree>) -> Self {
        self.tree = tree;
        self
    }

    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }

    /// Run `spec` to completion or until `timeout` elapses
    ///
    /// The full `stdin` is written and the stream closed right after spawn.
    /// The deadline covers the program itself: once it exits, whatever it
    /// left running in its process group is killed and the pipes are drained.
    /// On timeout the process tree is killed, output captured so far is kept,
    /// and stderr is replaced by [`timeout_message`].
    #[instrument(skip(self, spec, stdin), fields(program = %spec.program.display()))]
    pub async fn run(
        &self,
        spec: &RunSpec,
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<RunOutput, ProcessError> {
        let started = Instant::now();

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: spec.program.display().to_string(),
            source,
        })?;
        let pid = child.id().ok_or(ProcessError::MissingPid)?;
        debug!(pid, ?timeout, "process spawned");

        let stdin_task = match (child.stdin.take(), stdin) {
            (Some(mut pipe), Some(data)) => {
                let data = data.to_vec();
                Some(tokio::spawn(async move {
                    if let Err(e) = pipe.write_all(&data).await
                        && e.kind() != std::io::ErrorKind::BrokenPipe
                    {
                        debug!(error = %e, "failed to write stdin");
                    }
                    // dropping the pipe closes the child's stdin
                }))
            }
            _ => None,
        };

        let stdout = Capture::new(self.max_output_bytes);
        let stderr = Capture::new(self.max_output_bytes);
        let mut stdout_task = spawn_capture(child.stdout.take(), stdout.clone());
        let mut stderr_task = spawn_capture(child.stderr.take(), stderr.clone());

        let outcome = tokio::time::timeout(timeout, child.wait()).await;

        let mut output = RunOutput::default();
        match outcome {
            Ok(Ok(status)) => {
                // Descendants left in the group may still hold the output pipes
                self.terminate(pid);
                drain_captures(&mut stdout_task, &mut stderr_task).await;
                let (code, signal) = exit_parts(status);
                output.exit_status = code;
                output.signal = signal;
                output.stdout = Capture::take_text(&stdout);
                output.stderr = Capture::take_text(&stderr);
            }
            Ok(Err(e)) => {
                self.terminate(pid);
                stdout_task.abort();
                stderr_task.abort();
                if let Some(task) = stdin_task {
                    task.abort();
                }
                return Err(ProcessError::Wait(e));
            }
            Err(_) => {
                debug!(pid, "deadline reached, terminating process tree");
                self.terminate(pid);
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "direct kill after tree termination failed");
                }
                drain_captures(&mut stdout_task, &mut stderr_task).await;

                output.timed_out = true;
                output.stdout = Capture::take_text(&stdout);
                output.stderr = timeout_message(timeout);
            }
        }

        if let Some(task) = stdin_task {
            task.abort();
        }
        output.duration = started.elapsed();

        debug!(
            exit_status = ?output.exit_status,
            signal = ?output.signal,
            timed_out = output.timed_out,
            duration = ?output.duration,
            "process finished"
        );

        Ok(output)
    }

    fn terminate(&self, pid: u32) {
        if let Err(e) = self.tree.terminate_tree(pid) {
            warn!(pid, error = %e, "failed to terminate process tree");
        }
    }
}

/// Wait briefly for both readers to reach EOF, then stop them
async fn drain_captures(stdout: &mut JoinHandle<()>, stderr: &mut JoinHandle<()>) {
    let drain = async {
        let _ = (&mut *stdout).await;
        let _ = (&mut *stderr).await;
    };
    let _ = tokio::time::timeout(DRAIN_GRACE, drain).await;
    stdout.abort();
    stderr.abort();
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

fn exit_parts(status: ExitStatus) -> (Option<i32>, Option<i32>) {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        (status.code(), status.signal())
    }
    #[cfg(not(unix))]
    {
        (status.code(), None)
    }
}

/// Resolve a binary name on PATH; paths containing a separator are checked as-is
pub fn resolve_binary(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    if path.components().count() > 1 || path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }
    which::which(name).ok()
}
