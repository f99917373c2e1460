//! Process execution layer: run one [`Invocation`] under a deadline and capture its output.
//! No shell is used; arguments are passed as a list to avoid injection.
//!
//! stdout and stderr share a single pipe, so the captured text keeps the interleaving the
//! process produced. The child runs in its own process group; when the deadline expires the
//! whole group gets SIGTERM, then SIGKILL after a grace period, and is reaped before returning.
//! After the leader exits, reading continues until EOF or the rest of the deadline, since a
//! descendant may still be writing to the inherited pipe.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::Read;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::command::Invocation;

/// How long to keep reading after the group was killed on timeout.
const DRAIN_AFTER_KILL: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 8 * 1024;

/// How the process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitState {
    Success,
    /// Non-zero exit or killed by a signal. `code` is None for signals.
    Failed {
        code: Option<i32>,
        description: String,
    },
    /// The deadline expired and the process group was terminated.
    TimedOut { after: Duration },
}

/// One finished execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit: ExitState,
    /// Combined stdout+stderr, lossily decoded as UTF-8.
    pub output: String,
    pub elapsed: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("creating output pipe: {0}")]
    Pipe(#[source] std::io::Error),
    #[error("failed to start {program}: {source}")]
    Start {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// Produced by [`ScriptedRunner`].
    #[error("{0}")]
    Scripted(String),
}

/// Runs an invocation to completion or deadline. Exactly one spawn per call; never retries.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &Invocation,
        deadline: Duration,
    ) -> Result<ExecutionResult, SpawnError>;
}

/// Output accumulator with a byte cap.
struct OutputBuffer {
    bytes: Vec<u8>,
    limit: usize,
    dropped: usize,
    incomplete: bool,
}

impl OutputBuffer {
    fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            dropped: 0,
            incomplete: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.bytes.len());
        let take = room.min(chunk.len());
        self.bytes.extend_from_slice(&chunk[..take]);
        self.dropped += chunk.len() - take;
    }

    fn into_string(self) -> String {
        let mut s = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.dropped > 0 {
            s.push_str(&format!(
                "\n[output truncated: {} bytes dropped]",
                self.dropped
            ));
        }
        if self.incomplete {
            s.push_str("\n[output incomplete: pipe still open at deadline]");
        }
        s
    }
}

/// Production runner: spawns the program directly.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    max_output_bytes: usize,
    kill_grace: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(4 * 1024 * 1024, Duration::from_secs(2))
    }
}

impl ProcessRunner {
    pub fn new(max_output_bytes: usize, kill_grace: Duration) -> Self {
        Self {
            max_output_bytes,
            kill_grace,
        }
    }

    pub fn from_config(execution: &crate::config::ExecutionConfig) -> Self {
        Self::new(execution.max_output_bytes, execution.kill_grace)
    }
}

/// Blocking reader: forward pipe chunks until EOF or the receiver goes away.
fn pump(mut reader: std::io::PipeReader, tx: mpsc::UnboundedSender<Vec<u8>>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

/// Collect whatever arrives within `window`. Returns true if EOF was reached.
async fn drain(
    rx: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    output: &mut OutputBuffer,
    window: Duration,
) -> bool {
    tokio::time::timeout(window, async {
        while let Some(chunk) = rx.recv().await {
            output.push(&chunk);
        }
    })
    .await
    .is_ok()
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        deadline: Duration,
    ) -> Result<ExecutionResult, SpawnError> {
        let started = Instant::now();
        let (reader, writer) = std::io::pipe().map_err(SpawnError::Pipe)?;
        let writer_err = writer.try_clone().map_err(SpawnError::Pipe)?;

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(writer_err)
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let spawned = cmd.spawn();
        // Command still owns the write ends; drop it so EOF arrives when the child's copies close.
        drop(cmd);
        let mut child = spawned.map_err(|source| SpawnError::Start {
            program: invocation.program.clone(),
            source,
        })?;
        let pid = child.id();
        log::debug!(
            "spawned pid {:?}: {} (deadline {:?})",
            pid,
            invocation,
            deadline
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::task::spawn_blocking(move || pump(reader, tx));
        let mut output = OutputBuffer::new(self.max_output_bytes);

        let waited = tokio::time::timeout(deadline, async {
            let mut open = true;
            loop {
                tokio::select! {
                    chunk = rx.recv(), if open => match chunk {
                        Some(c) => output.push(&c),
                        None => open = false,
                    },
                    status = child.wait() => break status,
                }
            }
        })
        .await;

        let exit = match waited {
            Ok(Ok(status)) if status.success() => ExitState::Success,
            Ok(Ok(status)) => ExitState::Failed {
                code: status.code(),
                description: status.to_string(),
            },
            Ok(Err(e)) => ExitState::Failed {
                code: None,
                description: format!("waiting for process: {}", e),
            },
            Err(_) => {
                log::warn!(
                    "deadline of {:?} expired, terminating process group: {}",
                    deadline,
                    invocation
                );
                terminate_process_group(&mut child, self.kill_grace).await;
                ExitState::TimedOut { after: deadline }
            }
        };

        let timed_out = matches!(exit, ExitState::TimedOut { .. });
        let window = if timed_out {
            DRAIN_AFTER_KILL
        } else {
            deadline.saturating_sub(started.elapsed())
        };
        if !drain(&mut rx, &mut output, window).await {
            output.incomplete = true;
            if !timed_out {
                log::warn!(
                    "output pipe still open at deadline of {:?}, killing leftover processes: {}",
                    deadline,
                    invocation
                );
                if let Some(pid) = pid {
                    kill_leftover_group(pid);
                }
            }
        }

        Ok(ExecutionResult {
            exit,
            output: output.into_string(),
            elapsed: started.elapsed(),
        })
    }
}

/// SIGTERM the group, wait up to `grace` for the leader, then SIGKILL whatever is left and reap.
#[cfg(unix)]
async fn terminate_process_group(child: &mut Child, grace: Duration) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return; // already reaped
    };
    let pgid = Pid::from_raw(pid as i32);

    match killpg(pgid, Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => log::warn!("SIGTERM to process group {} failed: {}", pid, e),
    }
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        log::warn!("process group {} ignored SIGTERM for {:?}, sending SIGKILL", pid, grace);
    }
    // descendants may outlive the leader; the group id stays valid while any member exists
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => log::warn!("SIGKILL to process group {} failed: {}", pid, e),
    }
    let _ = child.wait().await;
}

#[cfg(not(unix))]
async fn terminate_process_group(child: &mut Child, _grace: Duration) {
    let _ = child.kill().await;
    let _ = child.wait().await;
}

/// SIGKILL what remains of a group whose leader has already been reaped.
#[cfg(unix)]
fn kill_leftover_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => log::warn!("SIGKILL to process group {} failed: {}", pid, e),
    }
}

#[cfg(not(unix))]
fn kill_leftover_group(_pid: u32) {}

/// Response queued on a [`ScriptedRunner`].
#[derive(Debug, Clone)]
pub enum Scripted {
    Finished(ExecutionResult),
    SpawnFailure(String),
}

/// Runner that replays queued results and records what it was asked to run.
/// When the queue is empty it reports a successful run with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    queue: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<(Invocation, Duration)>>,
    delay: Duration,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each run sleeps this long before answering (useful to observe serialization).
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn push(&self, response: Scripted) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(response);
        }
    }

    /// Queue a finished run with the given exit state and output.
    pub fn push_result(&self, exit: ExitState, output: impl Into<String>) {
        self.push(Scripted::Finished(ExecutionResult {
            exit,
            output: output.into(),
            elapsed: Duration::ZERO,
        }));
    }

    /// Invocations received so far, with the deadline each was given.
    pub fn calls(&self) -> Vec<(Invocation, Duration)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        deadline: Duration,
    ) -> Result<ExecutionResult, SpawnError> {
        if let Ok(mut c) = self.calls.lock() {
            c.push((invocation.clone(), deadline));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(Scripted::Finished(result)) => Ok(result),
            Some(Scripted::SpawnFailure(msg)) => Err(SpawnError::Scripted(msg)),
            None => Ok(ExecutionResult {
                exit: ExitState::Success,
                output: String::new(),
                elapsed: Duration::ZERO,
            }),
        }
    }
}
