//! File system port.

use dashmap::DashSet;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// File system operations used by the record store and backup manager.
///
/// Locks are advisory and in-process: a path is locked while a store handle
/// over it is alive.
pub trait FileSystem: Send + Sync + std::fmt::Debug {
    /// Read a whole file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Atomically replace a file's contents.
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Append to a file, creating it if missing.
    fn append(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Truncate a file to `len` bytes.
    fn truncate(&self, path: &Path, len: u64) -> io::Result<()>;

    /// Check whether a file exists.
    fn exists(&self, path: &Path) -> bool;

    /// Length of a file in bytes.
    fn len(&self, path: &Path) -> io::Result<u64>;

    /// Remove a file.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Copy a file, replacing the destination.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Create a directory and all missing parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// List the files directly inside a directory, sorted by path.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Try to take the lock on a path. Returns false if already held.
    fn try_lock(&self, path: &Path) -> bool;

    /// Release the lock on a path.
    fn unlock(&self, path: &Path);

    /// Check whether a path is locked.
    fn is_locked(&self, path: &Path) -> bool;
}

/// Remove a file if it exists.
pub fn remove_if_exists(fs: &dyn FileSystem, path: &Path) -> io::Result<bool> {
    if fs.exists(path) {
        fs.remove_file(path)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

fn process_locks() -> &'static DashSet<PathBuf> {
    static LOCKS: OnceLock<DashSet<PathBuf>> = OnceLock::new();
    LOCKS.get_or_init(DashSet::new)
}

/// File system backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl OsFileSystem {
    /// Create a new OS file system handle.
    pub fn new() -> Self {
        Self
    }

    fn lock_key(path: &Path) -> PathBuf {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    }
}

impl FileSystem for OsFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn append(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(data)?;
        file.sync_data()
    }

    fn truncate(&self, path: &Path, len: u64) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(len)?;
        file.sync_data()
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn len(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        std::fs::copy(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn try_lock(&self, path: &Path) -> bool {
        process_locks().insert(Self::lock_key(path))
    }

    fn unlock(&self, path: &Path) {
        process_locks().remove(&Self::lock_key(path));
    }

    fn is_locked(&self, path: &Path) -> bool {
        process_locks().contains(&Self::lock_key(path))
    }
}

/// In-memory file system for tests and previews.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    dirs: Mutex<BTreeSet<PathBuf>>,
    locks: DashSet<PathBuf>,
    failing: Mutex<BTreeSet<PathBuf>>,
}

impl MemoryFileSystem {
    /// Create an empty in-memory file system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write, append or copy targeting `path` fail.
    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.failing.lock().insert(path.into());
    }

    /// Undo [`MemoryFileSystem::fail_writes_to`] for every path.
    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// All file paths currently stored.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.lock().keys().cloned().collect()
    }

    fn check_writable(&self, path: &Path) -> io::Result<()> {
        if self.failing.lock().contains(path) {
            return Err(io::Error::other(format!(
                "injected write failure: {}",
                path.display()
            )));
        }
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && parent != Path::new("/") => {
                if self.dirs.lock().contains(parent) {
                    Ok(())
                } else {
                    Err(not_found(parent))
                }
            }
            _ => Ok(()),
        }
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

impl FileSystem for MemoryFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.check_writable(path)?;
        self.files.lock().insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn append(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.check_writable(path)?;
        self.files
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn truncate(&self, path: &Path, len: u64) -> io::Result<()> {
        let mut files = self.files.lock();
        let file = files.get_mut(path).ok_or_else(|| not_found(path))?;
        file.resize(len as usize, 0);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    fn len(&self, path: &Path) -> io::Result<u64> {
        self.files
            .lock()
            .get(path)
            .map(|f| f.len() as u64)
            .ok_or_else(|| not_found(path))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.files
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let data = self.read(from)?;
        let len = data.len() as u64;
        self.write(to, &data)?;
        Ok(len)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut dirs = self.dirs.lock();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.dirs.lock().contains(path) {
            return Err(not_found(path));
        }
        Ok(self
            .files
            .lock()
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect())
    }

    fn try_lock(&self, path: &Path) -> bool {
        self.locks.insert(path.to_path_buf())
    }

    fn unlock(&self, path: &Path) {
        self.locks.remove(path);
    }

    fn is_locked(&self, path: &Path) -> bool {
        self.locks.contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(fs: &dyn FileSystem, root: &Path) {
        let dir = root.join("store");
        fs.create_dir_all(&dir).unwrap();

        let file = dir.join("a.store");
        fs.write(&file, b"hello").unwrap();
        fs.append(&file, b" world").unwrap();
        assert_eq!(fs.read(&file).unwrap(), b"hello world");
        assert_eq!(fs.len(&file).unwrap(), 11);

        fs.truncate(&file, 5).unwrap();
        assert_eq!(fs.read(&file).unwrap(), b"hello");

        let copy = dir.join("b.store");
        fs.copy(&file, &copy).unwrap();
        assert_eq!(fs.list_dir(&dir).unwrap(), vec![file.clone(), copy.clone()]);

        assert!(remove_if_exists(fs, &copy).unwrap());
        assert!(!remove_if_exists(fs, &copy).unwrap());
        assert!(!fs.exists(&copy));

        assert!(fs.try_lock(&file));
        assert!(!fs.try_lock(&file));
        assert!(fs.is_locked(&file));
        fs.unlock(&file);
        assert!(!fs.is_locked(&file));
    }

    #[test]
    fn test_os_file_system() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&OsFileSystem::new(), dir.path());
    }

    #[test]
    fn test_memory_file_system() {
        exercise(&MemoryFileSystem::new(), Path::new("/data"));
    }

    #[test]
    fn test_memory_write_requires_parent() {
        let fs = MemoryFileSystem::new();
        let err = fs.write(Path::new("/missing/a.store"), b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_injected_failure() {
        let fs = MemoryFileSystem::new();
        fs.create_dir_all(Path::new("/data")).unwrap();
        fs.fail_writes_to("/data/a.store");

        assert!(fs.write(Path::new("/data/a.store"), b"x").is_err());
        assert!(fs.write(Path::new("/data/b.store"), b"x").is_ok());

        fs.clear_failures();
        assert!(fs.write(Path::new("/data/a.store"), b"x").is_ok());
    }
}
