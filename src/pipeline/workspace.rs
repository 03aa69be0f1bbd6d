use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use crate::Result;

/// Scratch directories owned by one pipeline run.
///
/// Every directory is removed when the workspace is dropped, whichever way
/// the run ends.
pub struct Workspace {
    extract: TempDir,
    transform: TempDir,
    staging: TempDir,
}

impl Workspace {
    /// Create the workspace under `base`, or under the system temp dir.
    pub fn new(base: Option<&Path>) -> Result<Self> {
        let make = |prefix: &str| -> io::Result<TempDir> {
            let mut builder = tempfile::Builder::new();
            builder.prefix(prefix);
            match base {
                Some(base) => builder.tempdir_in(base),
                None => builder.tempdir(),
            }
        };
        let workspace = Self {
            extract: make("hybridpack-extract-")?,
            transform: make("hybridpack-transform-")?,
            staging: make("hybridpack-staging-")?,
        };
        debug!(
            "Workspace: extract={} transform={}",
            workspace.extract.path().display(),
            workspace.transform.path().display()
        );
        Ok(workspace)
    }

    /// Where the input package is unpacked
    pub fn extract_root(&self) -> &Path {
        self.extract.path()
    }

    /// Where the external transform writes
    pub fn transform_root(&self) -> &Path {
        self.transform.path()
    }

    /// Intermediate archives and helper tool scratch space
    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    /// Remove every directory now, reporting failures instead of ignoring them.
    pub fn close(self) -> Result<()> {
        self.extract.close()?;
        self.transform.close()?;
        self.staging.close()?;
        Ok(())
    }
}

/// Recursively copy the contents of `from` into `to`, creating `to`.
///
/// Symbolic links are not followed and not copied.
pub fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in WalkDir::new(from).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| io::Error::other(format!("walking {}: {e}", from.display())))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|_| io::Error::other("walked outside the source directory"))?;
        let target: PathBuf = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_are_removed_on_drop() {
        let base = tempfile::tempdir().unwrap();
        let paths = {
            let ws = Workspace::new(Some(base.path())).unwrap();
            std::fs::write(ws.extract_root().join("a"), b"x").unwrap();
            [
                ws.extract_root().to_path_buf(),
                ws.transform_root().to_path_buf(),
                ws.staging_dir().to_path_buf(),
            ]
        };
        for path in paths {
            assert!(!path.exists());
        }
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[test]
    fn close_removes_everything() {
        let base = tempfile::tempdir().unwrap();
        let ws = Workspace::new(Some(base.path())).unwrap();
        ws.close().unwrap();
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[test]
    fn copies_nested_trees() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("base/manifest")).unwrap();
        std::fs::create_dir_all(src.path().join("empty")).unwrap();
        std::fs::write(src.path().join("base/manifest/AndroidManifest.xml"), b"m").unwrap();
        std::fs::write(src.path().join("BundleConfig.pb"), b"c").unwrap();

        let dst = tempfile::tempdir().unwrap();
        let to = dst.path().join("copy");
        copy_tree(src.path(), &to).unwrap();

        assert_eq!(std::fs::read(to.join("base/manifest/AndroidManifest.xml")).unwrap(), b"m");
        assert_eq!(std::fs::read(to.join("BundleConfig.pb")).unwrap(), b"c");
        assert!(to.join("empty").is_dir());
    }
}
