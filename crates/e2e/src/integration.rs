//! The per-scenario integration context

use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use cssbuild_common::{HarnessConfig, OutputMode, SandboxMode, TimeoutConfig};

use crate::assertions::assert_includes_css;
use crate::error::E2eResult;
use crate::fixture::Fixtures;
use crate::process::{CompletionResult, ProcessHandle, ProcessRunner};
use crate::sandbox::Sandbox;
use crate::waiter::OutputWaiter;

/// Everything a scenario needs: its own project directory, fixture I/O, a
/// process runner and an output waiter, all rooted in the same sandbox.
pub struct Integration {
    sandbox: Sandbox,
    fixtures: Fixtures,
    runner: ProcessRunner,
    waiter: OutputWaiter,
    mode: OutputMode,
    timeouts: TimeoutConfig,
}

impl Integration {
    /// Prepare a sandbox from `config.project_root`.
    ///
    /// An in-place project starts without build output, so a stale file never
    /// satisfies a creation wait.
    pub async fn setup(config: &HarnessConfig, mode: OutputMode) -> E2eResult<Self> {
        let sandbox = Sandbox::prepare(&config.project_root, config.sandbox, &config.output_dir)?;
        let integration = Self::with_sandbox(sandbox, config, mode);
        if integration.sandbox.mode() == SandboxMode::InPlace {
            integration.fixtures.clean_output().await?;
        }
        Ok(integration)
    }

    /// Build a context around an existing sandbox
    pub fn with_sandbox(sandbox: Sandbox, config: &HarnessConfig, mode: OutputMode) -> Self {
        let root = sandbox.root().to_path_buf();
        let fixtures = Fixtures::new(&root, &config.input_dir, &config.output_dir);
        let waiter = OutputWaiter::from_config(fixtures.output_root(), &config.timeouts);
        let runner = ProcessRunner::from_config(&root, config, mode);

        debug!("Integration rooted at {} ({:?})", root.display(), mode);
        Self {
            sandbox,
            fixtures,
            runner,
            waiter,
            mode,
            timeouts: config.timeouts.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        self.sandbox.root()
    }

    pub fn fixtures(&self) -> &Fixtures {
        &self.fixtures
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    pub fn waiter(&self) -> &OutputWaiter {
        &self.waiter
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    pub async fn write_input_file(&self, path: impl AsRef<Path>, content: &str) -> E2eResult<()> {
        self.fixtures.write(path, content).await
    }

    pub async fn append_to_input_file(&self, path: impl AsRef<Path>, content: &str) -> E2eResult<()> {
        self.fixtures.append(path, content).await
    }

    pub async fn remove_file(&self, path: impl AsRef<Path>) -> E2eResult<()> {
        self.fixtures.remove(path).await
    }

    pub async fn read_output_file(&self, path: impl AsRef<Path>) -> E2eResult<String> {
        self.fixtures.read_output(path).await
    }

    /// Run a build to completion
    pub async fn run(&self, command: &str) -> E2eResult<CompletionResult> {
        self.runner.run(command).await
    }

    /// Start a long-running build such as a watcher
    pub fn spawn(&self, command: &str) -> E2eResult<ProcessHandle> {
        self.runner.run_background(command)
    }

    pub async fn wait_for_output_file_creation(&self, path: impl AsRef<Path>) -> E2eResult<()> {
        self.waiter
            .wait_for_creation(path, self.timeouts.creation())
            .await
            .map(|_| ())
    }

    /// Run `trigger` and wait for it to cause a rewrite of an output file
    pub async fn wait_for_output_file_change<F, Fut>(&self, path: impl AsRef<Path>, trigger: F) -> E2eResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = E2eResult<()>>,
    {
        self.waiter
            .wait_for_change(path, trigger, self.timeouts.change())
            .await
            .map(|_| ())
    }

    /// Read an output file and require it to include `expected`
    pub async fn expect_output_css(&self, path: impl AsRef<Path>, expected: &str) -> E2eResult<()> {
        let full: PathBuf = self.fixtures.output_path(path.as_ref());
        let actual = self.fixtures.read_output(path).await?;
        assert_includes_css(&full.display().to_string(), &actual, expected)
    }

    /// Undo fixture changes and build output of an in-place sandbox; a copied
    /// sandbox is simply deleted.
    pub async fn teardown(self) -> E2eResult<()> {
        if self.sandbox.mode() == SandboxMode::InPlace {
            self.fixtures.restore().await?;
            self.fixtures.clean_output().await?;
            info!("Restored project {}", self.root().display());
        }
        Ok(())
    }
}
