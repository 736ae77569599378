//! Shell command execution with graceful, escalating termination

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{Runner, RunnerError};

/// The one process the runner owns
struct RunningProcess {
    child: Child,
    pid: u32,
    started_at: Instant,
}

/// Runs command lines through a shell, one at a time
///
/// Each command gets its own process group so that stopping it also
/// reaches anything the shell started.
pub struct CommandRunner {
    shell: PathBuf,
    grace: Duration,
    current: Option<RunningProcess>,
}

impl CommandRunner {
    /// Create a runner using `shell -c` and the given kill grace window
    pub fn new(shell: impl Into<PathBuf>, grace: Duration) -> Self {
        Self {
            shell: shell.into(),
            grace,
            current: None,
        }
    }

    /// Pid of the current command, if any
    #[cfg(test)]
    pub fn current_pid(&self) -> Option<u32> {
        self.current.as_ref().map(|p| p.pid)
    }

    fn shell_command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

/// Hand a child's pipes to log drains and return its pid
fn watch_output(child: &mut Child, command: &str) -> Result<u32, RunnerError> {
    let pid = child
        .id()
        .ok_or_else(|| RunnerError::ExitedImmediately(command.to_string()))?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(drain_output(stdout, pid, "stdout"));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(drain_output(stderr, pid, "stderr"));
    }
    Ok(pid)
}

impl Runner for CommandRunner {
    fn start(&mut self, command: &str) -> Result<u32, RunnerError> {
        self.stop();

        let mut cmd = self.shell_command(command);
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            command: command.to_string(),
            source,
        })?;
        let pid = watch_output(&mut child, command)?;

        info!(pid, command, "command started");
        self.current = Some(RunningProcess {
            child,
            pid,
            started_at: Instant::now(),
        });
        Ok(pid)
    }

    fn stop(&mut self) {
        // The slot is cleared here, before the process has actually gone
        let Some(RunningProcess {
            mut child,
            pid,
            started_at,
        }) = self.current.take()
        else {
            return;
        };

        let ran_ms = started_at.elapsed().as_millis() as u64;
        let shell_exited = matches!(child.try_wait(), Ok(Some(_)));

        // The shell may be gone while its background jobs live on in the
        // group, so the group is always signalled
        info!(pid, ran_ms, shell_exited, "stopping command");
        terminate(pid, &mut child);

        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(pid, ?status, "shell exited within grace window");
                }
                Ok(None) => {
                    warn!(pid, grace_ms = grace.as_millis() as u64, "command still running, killing");
                }
                Err(e) => {
                    warn!(pid, ?e, "failed to poll command, killing");
                }
            }
            // Sweeps stragglers in the group even when the shell is done
            force_kill(pid, &mut child);
            if let Err(e) = child.wait().await {
                warn!(pid, ?e, "failed to reap command");
            }
        });
    }

    fn is_running(&self) -> bool {
        self.current.is_some()
    }

    fn launch(&mut self, command: &str) -> Result<u32, RunnerError> {
        let mut child = self
            .shell_command(command)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                command: command.to_string(),
                source,
            })?;
        let pid = watch_output(&mut child, command)?;

        info!(pid, command, "one-off command launched");
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(pid, ?status, "one-off command finished"),
                Err(e) => warn!(pid, ?e, "failed to reap one-off command"),
            }
        });
        Ok(pid)
    }
}

impl Drop for CommandRunner {
    fn drop(&mut self) {
        if let Some(mut process) = self.current.take() {
            force_kill(process.pid, &mut process.child);
        }
    }
}

/// Forward a command's output to the log, line by line
async fn drain_output<R: AsyncRead + Unpin>(reader: R, pid: u32, stream: &'static str) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(pid, stream, %line, "command output"),
            Ok(None) => break,
            Err(e) => {
                debug!(pid, stream, ?e, "command output closed");
                break;
            }
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> nix::Result<()> {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    killpg(Pid::from_raw(pid as i32), signal)
}

#[cfg(unix)]
fn terminate(pid: u32, child: &mut Child) {
    use nix::errno::Errno;
    use nix::sys::signal::Signal;

    match signal_group(pid, Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => debug!(pid, "process group already gone"),
        Err(e) => {
            debug!(pid, ?e, "SIGTERM to process group failed, killing shell");
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn terminate(_pid: u32, child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(unix)]
fn force_kill(pid: u32, child: &mut Child) {
    use nix::sys::signal::Signal;

    match signal_group(pid, Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => debug!(pid, ?e, "SIGKILL to process group failed"),
    }
    if matches!(child.try_wait(), Ok(None)) {
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn force_kill(_pid: u32, child: &mut Child) {
    let _ = child.start_kill();
}
