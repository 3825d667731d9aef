//! Fixture I/O: input files under the source root, output files under the
//! build-output root.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};

/// Reads and writes fixture files for one scenario.
///
/// Every mutated path is journaled with its original content the first time
/// it is touched, so [`Fixtures::restore`] can put an in-place project back
/// the way it was.
pub struct Fixtures {
    input_root: PathBuf,
    output_root: PathBuf,
    journal: Mutex<BTreeMap<PathBuf, Option<Vec<u8>>>>,
}

impl Fixtures {
    /// Create fixtures for a project with the given input and output dirs
    pub fn new(project_root: &Path, input_dir: &Path, output_dir: &Path) -> Self {
        Self {
            input_root: join_lexical(project_root, input_dir),
            output_root: join_lexical(project_root, output_dir),
            journal: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn input_root(&self) -> &Path {
        &self.input_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Resolve a path relative to the source root.
    ///
    /// `..` segments are folded, so `../tailwind.config.js` names the file
    /// next to the source root.
    pub fn input_path(&self, path: impl AsRef<Path>) -> PathBuf {
        join_lexical(&self.input_root, path.as_ref())
    }

    /// Resolve a path relative to the output root
    pub fn output_path(&self, path: impl AsRef<Path>) -> PathBuf {
        join_lexical(&self.output_root, path.as_ref())
    }

    /// Create or overwrite an input file, creating parent directories
    pub async fn write(&self, path: impl AsRef<Path>, content: &str) -> E2eResult<()> {
        let full = self.input_path(path);
        self.remember(&full).await?;

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, content).await?;

        info!("Wrote fixture {} ({} bytes)", full.display(), content.len());
        Ok(())
    }

    /// Append to an existing input file
    pub async fn append(&self, path: impl AsRef<Path>, content: &str) -> E2eResult<()> {
        let full = self.input_path(path);
        self.remember(&full).await?;

        let mut file = match fs::OpenOptions::new().append(true).open(&full).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(E2eError::NotFound(full.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        info!("Appended {} bytes to fixture {}", content.len(), full.display());
        Ok(())
    }

    /// Delete an input file; absent files are fine
    pub async fn remove(&self, path: impl AsRef<Path>) -> E2eResult<()> {
        let full = self.input_path(path);
        self.remember(&full).await?;

        match fs::remove_file(&full).await {
            Ok(()) => {
                info!("Removed fixture {}", full.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Fixture {} already absent", full.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read an input file
    pub async fn read(&self, path: impl AsRef<Path>) -> E2eResult<String> {
        read_existing(&self.input_path(path)).await
    }

    /// Read a build output file
    pub async fn read_output(&self, path: impl AsRef<Path>) -> E2eResult<String> {
        read_existing(&self.output_path(path)).await
    }

    pub async fn exists(&self, path: impl AsRef<Path>) -> bool {
        fs::try_exists(self.input_path(path)).await.unwrap_or(false)
    }

    pub async fn output_exists(&self, path: impl AsRef<Path>) -> bool {
        fs::try_exists(self.output_path(path)).await.unwrap_or(false)
    }

    /// Delete the whole output root
    pub async fn clean_output(&self) -> E2eResult<()> {
        match fs::remove_dir_all(&self.output_root).await {
            Ok(()) => {
                debug!("Removed output root {}", self.output_root.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Put every touched file back to its original state.
    ///
    /// Returns the number of paths restored.
    pub async fn restore(&self) -> E2eResult<usize> {
        let journal = std::mem::take(&mut *self.journal.lock());
        let count = journal.len();

        for (path, original) in journal {
            match original {
                Some(content) => {
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent).await?;
                    }
                    fs::write(&path, content).await?;
                }
                None => match fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                },
            }
            debug!("Restored {}", path.display());
        }

        if count > 0 {
            info!("Restored {} fixture file(s)", count);
        }
        Ok(count)
    }

    /// Journal the original content of `path` before its first mutation
    async fn remember(&self, path: &Path) -> E2eResult<()> {
        if self.journal.lock().contains_key(path) {
            return Ok(());
        }

        let original = match fs::read(path).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        self.journal
            .lock()
            .entry(path.to_path_buf())
            .or_insert(original);
        Ok(())
    }
}

async fn read_existing(path: &Path) -> E2eResult<String> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(E2eError::NotFound(path.display().to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Join `rel` onto `base`, folding `.` and `..` without touching the filesystem
pub(crate) fn join_lexical(base: &Path, rel: &Path) -> PathBuf {
    let mut out = base.to_path_buf();
    for component in rel.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            Component::RootDir | Component::Prefix(_) => out = PathBuf::from(component.as_os_str()),
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexical_join() {
        let base = Path::new("/work/project/src");
        assert_eq!(
            join_lexical(base, Path::new("../tailwind.config.js")),
            PathBuf::from("/work/project/tailwind.config.js")
        );
        assert_eq!(
            join_lexical(base, Path::new("./glob/index.html")),
            PathBuf::from("/work/project/src/glob/index.html")
        );
    }

    #[tokio::test]
    async fn write_creates_parents_and_overwrites() {
        let dir = tempfile::TempDir::new().unwrap();
        let fixtures = Fixtures::new(dir.path(), Path::new("src"), Path::new("dist"));

        fixtures.write("glob/index.html", "<div></div>").await.unwrap();
        fixtures.write("glob/index.html", "<p></p>").await.unwrap();

        assert_eq!(fixtures.read("glob/index.html").await.unwrap(), "<p></p>");
        assert!(dir.path().join("src/glob/index.html").exists());
    }

    #[tokio::test]
    async fn append_requires_existing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let fixtures = Fixtures::new(dir.path(), Path::new("src"), Path::new("dist"));

        let err = fixtures.append("index.html", "<div></div>").await.unwrap_err();
        assert!(matches!(err, E2eError::NotFound(_)));

        fixtures.write("index.html", "a").await.unwrap();
        fixtures.append("index.html", "b").await.unwrap();
        assert_eq!(fixtures.read("index.html").await.unwrap(), "ab");
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let fixtures = Fixtures::new(dir.path(), Path::new("src"), Path::new("dist"));

        fixtures.remove("missing.html").await.unwrap();
        fixtures.write("index.html", "x").await.unwrap();
        fixtures.remove("index.html").await.unwrap();
        fixtures.remove("index.html").await.unwrap();
        assert!(!fixtures.exists("index.html").await);
    }

    #[tokio::test]
    async fn restore_puts_originals_back() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/index.css"), "original").unwrap();
        std::fs::write(dir.path().join("tailwind.config.js"), "module.exports = {}").unwrap();

        let fixtures = Fixtures::new(dir.path(), Path::new("src"), Path::new("dist"));
        fixtures.write("index.css", "changed").await.unwrap();
        fixtures.append("index.css", " twice").await.unwrap();
        fixtures.write("new.html", "<div></div>").await.unwrap();
        fixtures.remove("../tailwind.config.js").await.unwrap();

        assert_eq!(fixtures.restore().await.unwrap(), 3);

        assert_eq!(std::fs::read_to_string(dir.path().join("src/index.css")).unwrap(), "original");
        assert!(!dir.path().join("src/new.html").exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("tailwind.config.js")).unwrap(),
            "module.exports = {}"
        );
        assert_eq!(fixtures.restore().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn output_reads_and_cleanup() {
        let dir = tempfile::TempDir::new().unwrap();
        let fixtures = Fixtures::new(dir.path(), Path::new("src"), Path::new("dist"));

        assert!(matches!(
            fixtures.read_output("main.css").await,
            Err(E2eError::NotFound(_))
        ));

        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("dist/main.css"), ".a{}").unwrap();
        assert!(fixtures.output_exists("main.css").await);
        assert_eq!(fixtures.read_output("main.css").await.unwrap(), ".a{}");

        fixtures.clean_output().await.unwrap();
        fixtures.clean_output().await.unwrap();
        assert!(!dir.path().join("dist").exists());
    }
}
