//! Per-scenario project directories

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};
use walkdir::WalkDir;

use cssbuild_common::SandboxMode;

use crate::error::{E2eError, E2eResult};

/// Directories that are never copied into a sandbox
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git"];

/// The project directory a scenario mutates.
///
/// In copy mode it is a temporary copy of the template, removed on drop.
/// `node_modules` is linked rather than copied. In place mode it is the
/// template itself.
pub struct Sandbox {
    root: PathBuf,
    mode: SandboxMode,
    _temp: Option<TempDir>,
}

impl Sandbox {
    /// Prepare a sandbox from a template project.
    ///
    /// `output_dir` (relative to the template) is left out of the copy so a
    /// stale build never satisfies a wait.
    pub fn prepare(template: &Path, mode: SandboxMode, output_dir: &Path) -> E2eResult<Self> {
        if !template.is_dir() {
            return Err(E2eError::ProjectNotFound(template.display().to_string()));
        }

        match mode {
            SandboxMode::InPlace => {
                info!("Using project {} in place", template.display());
                Ok(Self {
                    root: template.to_path_buf(),
                    mode,
                    _temp: None,
                })
            }
            SandboxMode::Copy => {
                let temp = TempDir::new()?;
                let root = temp.path().join("project");
                copy_project(template, &root, output_dir)?;
                info!("Copied project {} to {}", template.display(), root.display());
                Ok(Self {
                    root,
                    mode,
                    _temp: Some(temp),
                })
            }
        }
    }

    /// An empty temporary project
    pub fn empty() -> E2eResult<Self> {
        let temp = TempDir::new()?;
        let root = temp.path().join("project");
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            mode: SandboxMode::Copy,
            _temp: Some(temp),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> SandboxMode {
        self.mode
    }
}

fn copy_project(template: &Path, dest: &Path, output_dir: &Path) -> E2eResult<()> {
    fs::create_dir_all(dest)?;
    let output_root = template.join(output_dir);

    let walker = WalkDir::new(template).min_depth(1).into_iter().filter_entry(|entry| {
        let skipped = entry.depth() == 1
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| SKIPPED_DIRS.contains(&name));
        !skipped && entry.path() != output_root.as_path()
    });

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(template)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    link_dependencies(template, dest)?;
    Ok(())
}

/// Make the template's installed packages visible inside the copy
fn link_dependencies(template: &Path, dest: &Path) -> E2eResult<()> {
    let modules = template.join(OsStr::new("node_modules"));
    if !modules.is_dir() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        let source = modules.canonicalize()?;
        std::os::unix::fs::symlink(&source, dest.join("node_modules"))?;
        debug!("Linked {} into sandbox", source.display());
    }
    #[cfg(not(unix))]
    {
        debug!("Not linking {} on this platform", modules.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/glob")).unwrap();
        fs::create_dir_all(root.join("dist")).unwrap();
        fs::create_dir_all(root.join("node_modules/webpack")).unwrap();
        fs::write(root.join("tailwind.config.js"), "module.exports = {}").unwrap();
        fs::write(root.join("src/index.css"), "@tailwind utilities;").unwrap();
        fs::write(root.join("src/glob/index.html"), "<div></div>").unwrap();
        fs::write(root.join("dist/main.css"), ".stale{}").unwrap();
        dir
    }

    #[test]
    fn copy_mode_copies_sources_but_not_output() {
        let template = template();
        let sandbox = Sandbox::prepare(template.path(), SandboxMode::Copy, Path::new("dist")).unwrap();
        let root = sandbox.root();

        assert_ne!(root, template.path());
        assert!(root.join("tailwind.config.js").is_file());
        assert!(root.join("src/glob/index.html").is_file());
        assert!(!root.join("dist").exists());

        #[cfg(unix)]
        assert!(root.join("node_modules").symlink_metadata().unwrap().file_type().is_symlink());

        // Mutations stay inside the sandbox.
        fs::write(root.join("src/index.css"), "changed").unwrap();
        assert_eq!(
            fs::read_to_string(template.path().join("src/index.css")).unwrap(),
            "@tailwind utilities;"
        );
    }

    #[test]
    fn copy_is_removed_on_drop() {
        let template = template();
        let sandbox = Sandbox::prepare(template.path(), SandboxMode::Copy, Path::new("dist")).unwrap();
        let root = sandbox.root().to_path_buf();
        drop(sandbox);
        assert!(!root.exists());
        assert!(template.path().join("src/index.css").exists());
    }

    #[test]
    fn in_place_uses_template() {
        let template = template();
        let sandbox = Sandbox::prepare(template.path(), SandboxMode::InPlace, Path::new("dist")).unwrap();
        assert_eq!(sandbox.root(), template.path());
        assert_eq!(sandbox.mode(), SandboxMode::InPlace);
    }

    #[test]
    fn missing_template_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = Sandbox::prepare(&dir.path().join("nope"), SandboxMode::Copy, Path::new("dist"))
            .err()
            .unwrap();
        assert!(matches!(err, E2eError::ProjectNotFound(_)));
    }
}
