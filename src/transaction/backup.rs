use super::fs::FileSystem;
use std::io;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

/// A path's state when it was first staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    Present(Vec<u8>),
    /// The file did not exist. `created_root` is the outermost ancestor
    /// directory that was missing too, so writing the file would create it.
    Absent { created_root: Option<PathBuf> },
}

impl Snapshot {
    pub fn capture(fs: &impl FileSystem, path: &Path) -> io::Result<Self> {
        match fs.read(path) {
            Ok(bytes) => Ok(Snapshot::Present(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Snapshot::Absent {
                created_root: missing_root(fs, path),
            }),
            Err(err) => Err(err),
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Snapshot::Present(bytes) => Some(bytes),
            Snapshot::Absent { .. } => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Snapshot::Absent { .. })
    }

    fn fingerprint(&self) -> Option<u64> {
        self.bytes().map(xxh3_64)
    }

    /// Does `current` (as read now) still equal the snapshot?
    pub fn matches(&self, current: Option<&[u8]>) -> bool {
        self.fingerprint() == current.map(xxh3_64)
    }

    /// Is `path` back the way it was, including directories created for it?
    pub fn is_current(&self, fs: &impl FileSystem, path: &Path) -> io::Result<bool> {
        let current = Snapshot::capture(fs, path)?;
        let dirs_gone = match self {
            Snapshot::Absent {
                created_root: Some(root),
            } => !fs.exists(root),
            _ => true,
        };
        Ok(self.matches(current.bytes()) && dirs_gone)
    }

    /// Put `path` back the way it was.
    pub fn restore(&self, fs: &impl FileSystem, path: &Path) -> io::Result<()> {
        match self {
            Snapshot::Present(bytes) => fs.write(path, bytes),
            Snapshot::Absent { created_root } => {
                if fs.exists(path) {
                    fs.delete(path)?;
                }
                match created_root {
                    Some(root) => remove_created_dirs(fs, path, root),
                    None => Ok(()),
                }
            }
        }
    }
}

/// Outermost missing ancestor directory of `path`, if any.
fn missing_root(fs: &impl FileSystem, path: &Path) -> Option<PathBuf> {
    let mut root = None;
    let mut dir = path.parent();
    while let Some(candidate) = dir.filter(|d| !d.as_os_str().is_empty()) {
        if fs.exists(candidate) {
            break;
        }
        root = Some(candidate.to_path_buf());
        dir = candidate.parent();
    }
    root
}

/// Remove the directories between `path` and `root` (inclusive), deepest
/// first, stopping at the first one that still has entries.
fn remove_created_dirs(fs: &impl FileSystem, path: &Path, root: &Path) -> io::Result<()> {
    let mut dir = path.parent();
    while let Some(current) = dir {
        if fs.exists(current) && !fs.remove_empty_dir(current)? {
            break;
        }
        if current == root {
            break;
        }
        dir = current.parent();
    }
    Ok(())
}

/// Original state of every path a transaction touches, in staging order.
///
/// Private to one transaction and dropped with it.
#[derive(Debug, Default)]
pub struct BackupStore {
    entries: Vec<(PathBuf, Snapshot)>,
}

impl BackupStore {
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|(p, _)| p == path)
    }

    /// Record `snapshot` for `path`; false if the path already has one.
    pub fn record(&mut self, path: PathBuf, snapshot: Snapshot) -> bool {
        if self.contains(&path) {
            return false;
        }
        self.entries.push((path, snapshot));
        true
    }

    pub fn get(&self, path: &Path) -> Option<&Snapshot> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, snapshot)| snapshot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Snapshot)> {
        self.entries.iter().map(|(p, s)| (p.as_path(), s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
