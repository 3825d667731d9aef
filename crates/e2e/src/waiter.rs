//! Waiting for build output to appear or change.
//!
//! Polling is the source of truth; filesystem events from `notify` only cut
//! the sleep between polls short. Every wait is bounded by a deadline.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Notify;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use cssbuild_common::TimeoutConfig;

use crate::error::{E2eError, E2eResult};
use crate::fixture::join_lexical;

/// Observed state of an output path at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSnapshot {
    pub path: PathBuf,
    pub state: Option<FileState>,
}

/// Content and identity of an existing file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    pub content: Vec<u8>,
    pub len: u64,
    pub modified: Option<SystemTime>,
    pub inode: Option<u64>,
}

impl OutputSnapshot {
    /// Capture the current state of `path`; a missing file is a valid state
    pub async fn capture(path: &Path) -> E2eResult<Self> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::absent(path)),
            Err(e) => return Err(e.into()),
        };
        // The file can vanish between stat and read while a build rewrites it.
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::absent(path)),
            Err(e) => return Err(e.into()),
        };

        #[cfg(unix)]
        let inode = {
            use std::os::unix::fs::MetadataExt;
            Some(metadata.ino())
        };
        #[cfg(not(unix))]
        let inode = None;

        Ok(Self {
            path: path.to_path_buf(),
            state: Some(FileState {
                content,
                len: metadata.len(),
                modified: metadata.modified().ok(),
                inode,
            }),
        })
    }

    fn absent(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            state: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.state.is_some()
    }

    pub fn content(&self) -> Option<&[u8]> {
        self.state.as_ref().map(|s| s.content.as_slice())
    }

    /// Content as text, lossily decoded
    pub fn text(&self) -> Option<String> {
        self.content()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Waits on files below a build-output root
#[derive(Debug, Clone)]
pub struct OutputWaiter {
    root: PathBuf,
    poll_interval: Duration,
    settle: Duration,
}

impl OutputWaiter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let defaults = TimeoutConfig::default();
        Self {
            root: root.into(),
            poll_interval: defaults.poll_interval(),
            settle: defaults.settle(),
        }
    }

    pub fn from_config(root: impl Into<PathBuf>, timeouts: &TimeoutConfig) -> Self {
        Self::new(root)
            .with_poll_interval(timeouts.poll_interval())
            .with_settle(timeouts.settle())
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// How long a file must stay unchanged before a wait resolves
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        join_lexical(&self.root, rel.as_ref())
    }

    /// Wait until `path` exists and has settled
    pub async fn wait_for_creation(
        &self,
        path: impl AsRef<Path>,
        timeout: Duration,
    ) -> E2eResult<OutputSnapshot> {
        let full = self.path(path);
        let events = subscribe(&full);
        let deadline = Instant::now() + timeout;

        info!("Waiting for {} to be created", full.display());
        let snapshot = self
            .wait_until(&full, events.as_ref(), deadline, |s| s.exists())
            .await
            .map_err(|e| timeout_for(e, format!("creation of {}", full.display()), timeout))?;
        debug!("{} created", full.display());
        Ok(snapshot)
    }

    /// Snapshot `path`, run `trigger`, then wait until the file differs from
    /// the snapshot and has settled.
    ///
    /// The snapshot is taken strictly before the trigger runs, so an output
    /// rewrite that lands while the trigger is still returning is not missed.
    /// The timeout starts once the trigger has completed.
    pub async fn wait_for_change<F, Fut>(
        &self,
        path: impl AsRef<Path>,
        trigger: F,
        timeout: Duration,
    ) -> E2eResult<OutputSnapshot>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = E2eResult<()>>,
    {
        let full = self.path(path);
        let events = subscribe(&full);

        let before = OutputSnapshot::capture(&full).await?;
        trigger().await?;

        info!("Waiting for {} to change", full.display());
        let deadline = Instant::now() + timeout;
        let snapshot = self
            .wait_until(&full, events.as_ref(), deadline, |s| *s != before)
            .await
            .map_err(|e| timeout_for(e, format!("change of {}", full.display()), timeout))?;
        debug!("{} changed", full.display());
        Ok(snapshot)
    }

    /// Poll until `done` holds for a settled snapshot or the deadline passes
    async fn wait_until(
        &self,
        path: &Path,
        events: Option<&EventSubscription>,
        deadline: Instant,
        done: impl Fn(&OutputSnapshot) -> bool,
    ) -> E2eResult<OutputSnapshot> {
        loop {
            let current = OutputSnapshot::capture(path).await?;
            if done(&current) {
                if let Some(settled) = self.settle(path, current, deadline).await? {
                    if done(&settled) {
                        return Ok(settled);
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(E2eError::Timeout {
                    what: path.display().to_string(),
                    timeout: Duration::ZERO,
                });
            }

            let nap = self.poll_interval.min(deadline - now);
            match events {
                Some(events) => {
                    tokio::select! {
                        _ = sleep(nap) => {}
                        _ = events.wake.notified() => {}
                    }
                }
                None => sleep(nap).await,
            }
        }
    }

    /// Wait until two captures `settle` apart agree. `None` if the file is
    /// still changing at the deadline.
    async fn settle(
        &self,
        path: &Path,
        mut last: OutputSnapshot,
        deadline: Instant,
    ) -> E2eResult<Option<OutputSnapshot>> {
        loop {
            sleep(self.settle).await;
            let next = OutputSnapshot::capture(path).await?;
            if next == last {
                return Ok(Some(next));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            last = next;
        }
    }
}

/// Rewrite the generic deadline error with what was awaited and the timeout
fn timeout_for(err: E2eError, what: String, timeout: Duration) -> E2eError {
    match err {
        E2eError::Timeout { .. } => E2eError::Timeout { what, timeout },
        other => other,
    }
}

/// Keeps a filesystem watcher alive and exposes its wakeups
struct EventSubscription {
    _watcher: RecommendedWatcher,
    wake: Arc<Notify>,
}

/// Watch the closest existing ancestor directory of `path`.
///
/// Failure to watch is not an error; the waiter then relies on polling alone.
fn subscribe(path: &Path) -> Option<EventSubscription> {
    let dir = path.ancestors().skip(1).find(|dir| dir.is_dir())?;

    let wake = Arc::new(Notify::new());
    let sender = wake.clone();
    let mut watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if res.is_ok() {
            sender.notify_one();
        }
    }) {
        Ok(watcher) => watcher,
        Err(e) => {
            debug!("Filesystem events unavailable, polling only: {}", e);
            return None;
        }
    };

    if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
        debug!("Cannot watch {}, polling only: {}", dir.display(), e);
        return None;
    }

    Some(EventSubscription {
        _watcher: watcher,
        wake,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_waiter(root: &Path) -> OutputWaiter {
        OutputWaiter::new(root)
            .with_poll_interval(Duration::from_millis(10))
            .with_settle(Duration::from_millis(30))
    }

    #[tokio::test]
    async fn snapshot_of_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let snapshot = OutputSnapshot::capture(&dir.path().join("main.css")).await.unwrap();
        assert!(!snapshot.exists());
        assert_eq!(snapshot.content(), None);
    }

    #[tokio::test]
    async fn creation_of_existing_file_resolves() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.css"), ".a{}").unwrap();

        let snapshot = fast_waiter(dir.path())
            .wait_for_creation("main.css", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(snapshot.text().as_deref(), Some(".a{}"));
    }

    #[tokio::test]
    async fn creation_times_out() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = fast_waiter(dir.path())
            .wait_for_creation("dist/main.css", Duration::from_millis(150))
            .await
            .unwrap_err();

        match err {
            E2eError::Timeout { what, timeout } => {
                assert!(what.contains("creation of"));
                assert_eq!(timeout, Duration::from_millis(150));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn change_made_by_trigger_is_seen() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("main.css");
        std::fs::write(&output, ".a{}").unwrap();

        let snapshot = fast_waiter(dir.path())
            .wait_for_change(
                "main.css",
                || async {
                    tokio::fs::write(&output, ".a{}.b{}").await?;
                    Ok::<(), E2eError>(())
                },
                Duration::from_secs(2),
            )
            .await
            .unwrap();
        assert_eq!(snapshot.text().as_deref(), Some(".a{}.b{}"));
    }

    #[tokio::test]
    async fn trigger_without_effect_times_out() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.css"), ".a{}").unwrap();
        let unrelated = dir.path().join("other.txt");

        let err = fast_waiter(dir.path())
            .wait_for_change(
                "main.css",
                || async {
                    tokio::fs::write(&unrelated, "noise").await?;
                    Ok::<(), E2eError>(())
                },
                Duration::from_millis(200),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::Timeout { .. }));
    }

    #[tokio::test]
    async fn trigger_errors_propagate() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = fast_waiter(dir.path())
            .wait_for_change(
                "main.css",
                || async { Err::<(), _>(E2eError::NotFound("index.html".into())) },
                Duration::from_millis(200),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::NotFound(_)));
    }
}
