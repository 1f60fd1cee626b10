//! Subprocess execution
//!
//! Every command runs with stdout and stderr piped into two reader tasks that
//! drain them concurrently, so a chatty child never blocks on a full pipe.
//! Each reader hands its buffer back through its join handle.
//!
//! On unix the child gets its own process group. Timeouts and Ctrl-C kill the
//! whole group, which takes down the tools `xcodebuild` spawns as well.

use crate::console::Console;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Timeout for general purpose commands
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for shallow clones
pub const CLONE_TIMEOUT: Duration = Duration::from_secs(15);

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Process groups of children that are still running
static LIVE_GROUPS: Mutex<Vec<u32>> = Mutex::new(Vec::new());

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {}s", .after.as_secs())]
    TimedOut { command: String, after: Duration },

    #[error("Failed waiting for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// A command line plus the way it should be run
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub verbose: bool,
    /// `None` means no limit (archiving)
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: PathBuf::from("."),
            verbose: false,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.working_dir = dir.to_path_buf();
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code was zero
    pub succeeded: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Command execution capability consumed by the resolver and the measurer
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        invocation: Invocation,
    ) -> impl Future<Output = Result<ProcessOutput, ProcessError>> + Send;

    /// `git clone --branch <ref> --depth 1 <url>` inside `working_dir`
    fn shallow_clone(
        &self,
        url: &str,
        branch_or_tag: &str,
        working_dir: &Path,
        timeout: Duration,
        verbose: bool,
    ) -> impl Future<Output = Result<ProcessOutput, ProcessError>> + Send {
        let invocation = Invocation::new(
            "git",
            ["clone", "--branch", branch_or_tag, "--depth", "1", url],
        )
        .current_dir(working_dir)
        .verbose(verbose)
        .timeout(Some(timeout));
        self.run(invocation)
    }
}

/// Runs real subprocesses with tokio
pub struct ProcessRunner {
    console: Arc<Console>,
}

impl ProcessRunner {
    pub fn new(console: Arc<Console>) -> Self {
        Self { console }
    }
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: Invocation) -> Result<ProcessOutput, ProcessError> {
        let command_line = invocation.to_string();
        debug!(
            command = %command_line,
            dir = %invocation.working_dir.display(),
            "Running command"
        );

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| ProcessError::Launch {
            command: command_line.clone(),
            source,
        })?;
        let group = ProcessGroup::register(child.id());

        let forward = invocation.verbose.then(|| Arc::clone(&self.console));
        let stdout_task = spawn_reader(child.stdout.take(), forward.clone(), Stream::Stdout);
        let stderr_task = spawn_reader(child.stderr.take(), forward, Stream::Stderr);
        let stdout_abort = stdout_task.abort_handle();
        let stderr_abort = stderr_task.abort_handle();

        let completion = async {
            let status = child.wait().await?;
            let stdout = join_reader(stdout_task).await;
            let stderr = join_reader(stderr_task).await;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        };

        let outcome = match invocation.timeout {
            Some(limit) => {
                let timed = tokio::time::timeout(limit, completion).await;
                match timed {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(command = %command_line, "Command timed out, killing it");
                        group.kill();
                        let _ = child.kill().await;
                        stdout_abort.abort();
                        stderr_abort.abort();
                        return Err(ProcessError::TimedOut {
                            command: command_line,
                            after: limit,
                        });
                    }
                }
            }
            None => completion.await,
        };
        drop(group);

        let (status, stdout, stderr) = outcome.map_err(|source| ProcessError::Wait {
            command: command_line.clone(),
            source,
        })?;
        debug!(command = %command_line, status = ?status.code(), "Command finished");

        Ok(ProcessOutput {
            succeeded: status.success(),
            stdout,
            stderr,
        })
    }
}

fn spawn_reader<R>(
    pipe: Option<R>,
    console: Option<Arc<Console>>,
    stream: Stream,
) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        let Some(mut pipe) = pipe else {
            return buffer;
        };

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Some(console) = &console {
                        match stream {
                            Stream::Stdout => console.stream_stdout(&chunk[..n]),
                            Stream::Stderr => console.stream_stderr(&chunk[..n]),
                        }
                    }
                    buffer.extend_from_slice(&chunk[..n]);
                }
                Err(e) => {
                    debug!("Pipe read failed: {}", e);
                    break;
                }
            }
        }
        buffer
    })
}

async fn join_reader(handle: JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.await.unwrap_or_default()
}

/// Kill every process group that is still running.
///
/// Used by the Ctrl-C handler before the tool exits.
pub fn terminate_all() {
    let groups = match LIVE_GROUPS.lock() {
        Ok(groups) => groups.clone(),
        Err(_) => return,
    };
    for pid in groups {
        kill_group(pid);
    }
}

/// Registration of one child's process group, removed on drop
struct ProcessGroup(Option<u32>);

impl ProcessGroup {
    fn register(pid: Option<u32>) -> Self {
        if let Some(pid) = pid
            && let Ok(mut groups) = LIVE_GROUPS.lock()
        {
            groups.push(pid);
        }
        Self(pid)
    }

    fn kill(&self) {
        if let Some(pid) = self.0 {
            kill_group(pid);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if let Some(pid) = self.0
            && let Ok(mut groups) = LIVE_GROUPS.lock()
        {
            groups.retain(|p| *p != pid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    // The child was spawned with process_group(0), so its pid is the group id
    // SAFETY: killpg only sends a signal; the group id comes from a child this
    // process spawned and is deregistered when that run finishes
    unsafe {
        libc::killpg(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}
