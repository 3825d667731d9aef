//! Process management - running one-shot builds and long-running watchers

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use cssbuild_common::mode::{OutputMode, OXIDE_ENV};
use cssbuild_common::HarnessConfig;

use crate::error::{E2eError, E2eResult};

/// Spawns build commands inside a project directory
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    cwd: PathBuf,
    prefix: Option<String>,
    env: BTreeMap<String, String>,
    mode: OutputMode,
    stop_timeout: Duration,
}

/// Outcome of a command that ran to completion
#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub command: String,
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessRunner {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            prefix: None,
            env: BTreeMap::new(),
            mode: OutputMode::default(),
            stop_timeout: Duration::from_secs(5),
        }
    }

    /// Runner for a project directory using the harness configuration
    pub fn from_config(cwd: impl Into<PathBuf>, config: &HarnessConfig, mode: OutputMode) -> Self {
        Self::new(cwd)
            .with_prefix(config.command_prefix.clone())
            .with_envs(config.env.clone())
            .with_output_mode(mode)
            .with_stop_timeout(config.timeouts.stop())
    }

    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_envs(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// The shell command line actually executed
    pub fn command_line(&self, line: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{} {}", prefix.trim(), line),
            None => line.to_string(),
        }
    }

    /// Run a command to completion.
    ///
    /// A nonzero exit (or death by signal) is an error carrying the captured
    /// output.
    pub async fn run(&self, line: &str) -> E2eResult<CompletionResult> {
        let command = self.command_line(line);
        info!("Running `{}` in {}", command, self.cwd.display());

        let start = Instant::now();
        let child = self
            .command(&command)
            .spawn()
            .map_err(|source| E2eError::Spawn {
                command: command.clone(),
                source,
            })?;
        // Cancelling this future must not leave the pipeline running.
        let guard = GroupGuard::new(child.id());
        let output = child.wait_with_output().await?;
        drop(guard);
        let duration = start.elapsed();

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            warn!("`{}` failed with {} after {:?}", command, output.status, duration);
            return Err(E2eError::NonZeroExit {
                command,
                status: output.status.to_string(),
                stdout,
                stderr,
            });
        }

        debug!("`{}` finished in {:?}", command, duration);
        Ok(CompletionResult {
            command,
            status: output.status,
            stdout,
            stderr,
            duration,
        })
    }

    /// Spawn a command without waiting for it, e.g. a watcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn run_background(&self, line: &str) -> E2eResult<ProcessHandle> {
        let command = self.command_line(line);
        info!("Spawning `{}` in {}", command, self.cwd.display());

        let mut child = self
            .command(&command)
            .spawn()
            .map_err(|source| E2eError::Spawn {
                command: command.clone(),
                source,
            })?;

        let output = Arc::new(CapturedOutput::default());
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(capture_lines(stdout, output.clone(), Stream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(capture_lines(stderr, output.clone(), Stream::Stderr));
        }

        let pid = child.id();
        debug!("`{}` started (pid: {:?})", command, pid);

        Ok(ProcessHandle {
            command,
            child,
            pid,
            output,
            stop_timeout: self.stop_timeout,
            exit_status: None,
            group_reaped: false,
        })
    }

    fn command(&self, command_line: &str) -> Command {
        let mut std_cmd = std::process::Command::new("sh");
        std_cmd
            .arg("-c")
            .arg(command_line)
            .current_dir(&self.cwd)
            .envs(&self.env);

        match self.mode {
            OutputMode::Oxide => {
                std_cmd.env(OXIDE_ENV, "1");
            }
            OutputMode::Legacy => {
                std_cmd.env_remove(OXIDE_ENV);
            }
        }

        // Own process group, so signals reach the whole pipeline and not
        // just the shell.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            std_cmd.process_group(0);
        }

        let mut cmd = Command::from(std_cmd);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Lines captured from a background process
#[derive(Default)]
struct CapturedOutput {
    stdout: Mutex<Vec<String>>,
    stderr: Mutex<Vec<String>>,
    changed: Notify,
}

impl CapturedOutput {
    fn push(&self, stream: Stream, line: String) {
        match stream {
            Stream::Stdout => self.stdout.lock().push(line),
            Stream::Stderr => self.stderr.lock().push(line),
        }
        self.changed.notify_waiters();
    }

    fn find(&self, stream: Stream, predicate: &dyn Fn(&str) -> bool) -> Option<String> {
        let lines = match stream {
            Stream::Stdout => self.stdout.lock(),
            Stream::Stderr => self.stderr.lock(),
        };
        lines.iter().find(|line| predicate(line)).cloned()
    }

    fn joined(&self, stream: Stream) -> String {
        let lines = match stream {
            Stream::Stdout => self.stdout.lock(),
            Stream::Stderr => self.stderr.lock(),
        };
        lines.join("\n")
    }
}

async fn capture_lines<R>(reader: R, output: Arc<CapturedOutput>, stream: Stream)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!("[{:?}] {}", stream, line);
                output.push(stream, line);
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed reading {:?}: {}", stream, e);
                break;
            }
        }
    }
}

/// Handle to a background build process.
///
/// Dropping the handle without calling [`ProcessHandle::stop`] kills the
/// whole process group.
pub struct ProcessHandle {
    command: String,
    child: Child,
    pid: Option<u32>,
    output: Arc<CapturedOutput>,
    stop_timeout: Duration,
    exit_status: Option<ExitStatus>,
    group_reaped: bool,
}

impl ProcessHandle {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the direct child is still alive
    pub fn is_running(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                false
            }
            Ok(None) => true,
            Err(_) => false,
        }
    }

    /// Everything printed to stdout so far
    pub fn stdout(&self) -> String {
        self.output.joined(Stream::Stdout)
    }

    /// Everything printed to stderr so far
    pub fn stderr(&self) -> String {
        self.output.joined(Stream::Stderr)
    }

    /// Wait until a stdout line (already printed or future) satisfies `predicate`
    pub async fn wait_for_stdout(
        &self,
        predicate: impl Fn(&str) -> bool + Sync,
        timeout: Duration,
    ) -> E2eResult<String> {
        self.wait_for_line(Stream::Stdout, &predicate, timeout).await
    }

    /// Wait until a stderr line (already printed or future) satisfies `predicate`
    pub async fn wait_for_stderr(
        &self,
        predicate: impl Fn(&str) -> bool + Sync,
        timeout: Duration,
    ) -> E2eResult<String> {
        self.wait_for_line(Stream::Stderr, &predicate, timeout).await
    }

    async fn wait_for_line(
        &self,
        stream: Stream,
        predicate: &(dyn Fn(&str) -> bool + Sync),
        timeout: Duration,
    ) -> E2eResult<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before looking, so a line arriving in between
            // still wakes us.
            let notified = self.output.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(line) = self.output.find(stream, predicate) {
                return Ok(line);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(E2eError::Timeout {
                    what: format!("{:?} line from `{}`", stream, self.command),
                    timeout,
                });
            }
        }
    }

    /// Stop the process: SIGTERM to the group, then SIGKILL once the stop
    /// timeout elapses. Stopping an exited process is a no-op.
    pub async fn stop(&mut self) -> E2eResult<Option<ExitStatus>> {
        if self.exit_status.is_none() {
            self.exit_status = self.child.try_wait()?;
        }
        if let Some(status) = self.exit_status {
            // The shell may be gone while the rest of its group is not.
            if !self.group_reaped {
                debug!("`{}` already exited with {}", self.command, status);
                self.reap_group(Duration::ZERO).await;
                self.group_reaped = true;
            }
            return Ok(Some(status));
        }

        info!("Stopping `{}` (pid: {:?})", self.command, self.pid);
        let started = Instant::now();

        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;
            self.signal_group(Some(Signal::SIGTERM));
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }

        let status = match tokio::time::timeout(self.stop_timeout, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    "`{}` did not exit within {:?}, killing",
                    self.command, self.stop_timeout
                );
                self.force_kill();
                self.child.wait().await?
            }
        };
        self.exit_status = Some(status);

        let remaining = self.stop_timeout.saturating_sub(started.elapsed());
        self.reap_group(remaining).await;
        self.group_reaped = true;

        info!("`{}` stopped ({})", self.command, status);
        Ok(Some(status))
    }

    /// Wait for the rest of the process group to go away, killing stragglers
    async fn reap_group(&self, grace: Duration) {
        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;

            let deadline = Instant::now() + grace;
            while self.signal_group(None) {
                if Instant::now() >= deadline {
                    debug!("Killing leftover processes of `{}`", self.command);
                    self.signal_group(Some(Signal::SIGKILL));
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
        #[cfg(not(unix))]
        {
            let _ = grace;
        }
    }

    /// Send `signal` to the process group; `None` only checks for existence.
    /// Returns whether the group still had members.
    #[cfg(unix)]
    fn signal_group(&self, signal: Option<nix::sys::signal::Signal>) -> bool {
        signal_group(self.pid, signal)
    }

    fn force_kill(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;
            self.signal_group(Some(Signal::SIGKILL));
        }
        let _ = self.child.start_kill();
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.group_reaped {
            warn!("`{}` dropped without stop(), killing", self.command);
            self.force_kill();
        }
    }
}

/// Send `signal` to the process group led by `pid`; `None` only checks.
/// Returns whether the group still had members.
#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: Option<nix::sys::signal::Signal>) -> bool {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    match pid {
        Some(pid) => killpg(Pid::from_raw(pid as i32), signal).is_ok(),
        None => false,
    }
}

/// SIGKILLs whatever is left of a process group when dropped
struct GroupGuard {
    pid: Option<u32>,
}

impl GroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;
            if signal_group(self.pid, Some(Signal::SIGKILL)) {
                debug!("Killed leftover process group {:?}", self.pid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_prefix() {
        let runner = ProcessRunner::new(".").with_prefix(Some("npx".into()));
        assert_eq!(runner.command_line("webpack --watch"), "npx webpack --watch");

        let runner = ProcessRunner::new(".").with_prefix(Some("  ".into()));
        assert_eq!(runner.command_line("webpack"), "webpack");
    }

    #[tokio::test]
    async fn captured_lines_are_searchable() {
        let output = CapturedOutput::default();
        output.push(Stream::Stdout, "compiling".into());
        output.push(Stream::Stdout, "compiled successfully".into());
        output.push(Stream::Stderr, "warning".into());

        assert_eq!(
            output.find(Stream::Stdout, &|l: &str| l.contains("success")),
            Some("compiled successfully".to_string())
        );
        assert_eq!(output.find(Stream::Stderr, &|l: &str| l.contains("success")), None);
        assert_eq!(output.joined(Stream::Stdout), "compiling\ncompiled successfully");
    }
}
