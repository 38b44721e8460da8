//! Filesystem access used by the pipeline

use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// The filesystem operations the pipeline relies on
pub trait Filesystem {
    /// Create `path` and any missing parents
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Remove `path` and everything below it
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Allocate a fresh, uniquely named directory that outlives this call.
    ///
    /// Created inside `parent`, or the system temp directory when `None`.
    fn unique_dir(&self, prefix: &str, suffix: &str, parent: Option<&Path>) -> io::Result<PathBuf>;

    /// Whether anything exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Size of the file at `path` in bytes
    fn file_size(&self, path: &Path) -> io::Result<u64>;

    /// Read a UTF-8 file
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// The local disk
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl Filesystem for LocalFilesystem {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }

    fn unique_dir(&self, prefix: &str, suffix: &str, parent: Option<&Path>) -> io::Result<PathBuf> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix).suffix(suffix);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        Ok(dir.keep())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Reads the local disk but only logs changes; pairs with
/// [`DryRunner`](crate::runner::DryRunner)
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunFilesystem;

impl Filesystem for DryRunFilesystem {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        info!("[dry-run] create {}", path.display());
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        info!("[dry-run] remove {}", path.display());
        Ok(())
    }

    /// A path that is never created
    fn unique_dir(&self, prefix: &str, suffix: &str, parent: Option<&Path>) -> io::Result<PathBuf> {
        let parent = parent.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
        let dir = parent.join(format!("{}-dry-run-{}", prefix, suffix));
        info!("[dry-run] allocate {}", dir.display());
        Ok(dir)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        LocalFilesystem.file_size(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        LocalFilesystem.read_to_string(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_dir_is_kept_and_distinct() {
        let root = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem;

        let a = fs.unique_dir("native-image", "bench-fib", Some(root.path())).unwrap();
        let b = fs.unique_dir("native-image", "bench-fib", Some(root.path())).unwrap();

        assert_ne!(a, b);
        assert!(a.is_dir() && b.is_dir());
        assert!(a.starts_with(root.path()));
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("native-image"));
        assert!(name.ends_with("bench-fib"));
    }

    #[test]
    fn test_file_size() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("image");
        std::fs::write(&file, [0u8; 42]).unwrap();

        let fs = LocalFilesystem;
        assert_eq!(fs.file_size(&file).unwrap(), 42);
        assert!(fs.file_size(&root.path().join("missing")).is_err());
    }

    #[test]
    fn test_dry_run_leaves_disk_untouched() {
        let root = tempfile::tempdir().unwrap();
        let prepared = root.path().join("prepared");
        std::fs::create_dir_all(&prepared).unwrap();
        std::fs::write(prepared.join("image"), "x").unwrap();

        let fs = DryRunFilesystem;
        fs.remove_dir_all(&prepared).unwrap();
        fs.create_dir_all(&root.path().join("new")).unwrap();
        let dir = fs.unique_dir("native-image", "bench-fib", Some(root.path())).unwrap();

        assert!(prepared.join("image").exists());
        assert!(!root.path().join("new").exists());
        assert!(dir.starts_with(root.path()));
        assert!(!dir.exists());
        assert_eq!(fs.file_size(&prepared.join("image")).unwrap(), 1);
    }
}
