//! Filesystem seam for transactions.

use std::io::{self, Write};
use std::path::Path;

/// The primitives a transaction composes into one atomic unit.
///
/// Each call is expected to be atomic on its own; the transaction layer
/// takes care of ordering and restoring. `write` creates missing parent
/// directories.
pub trait FileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    fn delete(&self, path: &Path) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
    /// Remove the directory at `path` if it is empty. Returns false (and
    /// leaves it alone) when it still has entries.
    fn remove_empty_dir(&self, path: &Path) -> io::Result<bool>;
}

impl<F: FileSystem + ?Sized> FileSystem for &F {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        (**self).read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        (**self).write(path, contents)
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        (**self).delete(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }

    fn remove_empty_dir(&self, path: &Path) -> io::Result<bool> {
        (**self).remove_empty_dir(path)
    }
}

/// The real filesystem, with atomic replace-on-write.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        atomic_write(path, contents)?;

        // Bump mtime so file watchers and build tools notice the change.
        let now = filetime::FileTime::now();
        filetime::set_file_mtime(path, now)
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn remove_empty_dir(&self, path: &Path) -> io::Result<bool> {
        if std::fs::read_dir(path)?.next().is_some() {
            return Ok(false);
        }
        std::fs::remove_dir(path)?;
        Ok(true)
    }
}

/// Write via a tempfile in the target directory, fsync, then rename.
fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
