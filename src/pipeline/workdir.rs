use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::Result;

const PREFIX: &str = "chapter-trimmer-";

/// Scratch directory for intermediate segment files.
///
/// Removed when dropped, on success and on error alike, unless it was
/// created with `keep` set.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    guard: Option<TempDir>,
}

impl WorkDir {
    /// Create a fresh directory under `parent` (the system temp dir if `None`)
    pub fn create(parent: Option<&Path>, keep: bool) -> Result<Self> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix(PREFIX);
            builder
        };
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        // Concat lists are resolved relative to their own location, so every
        // path handed to the engine must be absolute
        let path = std::fs::canonicalize(dir.path())?;

        let guard = if keep {
            let kept = dir.keep();
            info!("📁 Intermediate files will be kept in {}", kept.display());
            None
        } else {
            debug!("Working directory: {}", path.display());
            Some(dir)
        };

        Ok(Self { path, guard })
    }

    /// Where a directory would be created, without touching the filesystem
    pub fn planned(parent: Option<&Path>) -> PathBuf {
        let parent = parent.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
        parent.join(format!("{}dry-run", PREFIX))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_kept(&self) -> bool {
        self.guard.is_none()
    }
}

/// Intermediate file for the segment at `position` in the output
pub fn artifact_path(dir: &Path, position: usize, extension: &str) -> PathBuf {
    dir.join(format!("segment_{:03}.{}", position, extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_removed_on_drop() {
        let parent = tempdir().unwrap();
        let path = {
            let work = WorkDir::create(Some(parent.path()), false).unwrap();
            std::fs::write(work.path().join("segment_000.mp4"), b"x").unwrap();
            assert!(work.path().is_absolute());
            work.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_kept_when_requested() {
        let parent = tempdir().unwrap();
        let path = {
            let work = WorkDir::create(Some(parent.path()), true).unwrap();
            assert!(work.is_kept());
            work.path().to_path_buf()
        };
        assert!(path.exists());
    }

    #[test]
    fn test_creates_missing_parent() {
        let parent = tempdir().unwrap();
        let nested = parent.path().join("a/b");
        let work = WorkDir::create(Some(&nested), false).unwrap();
        assert!(work.path().starts_with(std::fs::canonicalize(&nested).unwrap()));
    }

    #[test]
    fn test_artifact_naming() {
        assert_eq!(
            artifact_path(Path::new("/scratch"), 7, "mkv"),
            PathBuf::from("/scratch/segment_007.mkv")
        );
    }
}
