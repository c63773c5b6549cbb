//! On-disk location of a record store.

use std::path::{Path, PathBuf};

/// Extension of a store's primary file.
pub const STORE_EXTENSION: &str = "store";

/// Suffixes appended to the primary file name for companion files.
pub const COMPANION_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

/// A store's directory and name.
///
/// The primary file is `<directory>/<name>.store`; the write-ahead log and
/// shared-memory index sit next to it as `<name>.store-wal` and
/// `<name>.store-shm`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreLocation {
    directory: PathBuf,
    name: String,
}

impl StoreLocation {
    /// Create a store location.
    pub fn new(directory: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            name: name.into(),
        }
    }

    /// Directory holding the store.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary file path.
    pub fn primary_path(&self) -> PathBuf {
        self.directory
            .join(format!("{}.{}", self.name, STORE_EXTENSION))
    }

    /// Write-ahead log path.
    pub fn wal_path(&self) -> PathBuf {
        companion_of(&self.primary_path(), COMPANION_SUFFIXES[0])
    }

    /// Shared-memory index path.
    pub fn shm_path(&self) -> PathBuf {
        companion_of(&self.primary_path(), COMPANION_SUFFIXES[1])
    }

    /// Companion file paths in suffix order.
    pub fn companion_paths(&self) -> Vec<PathBuf> {
        let primary = self.primary_path();
        COMPANION_SUFFIXES
            .iter()
            .map(|s| companion_of(&primary, s))
            .collect()
    }
}

/// Append a companion suffix to a file path.
pub fn companion_of(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let location = StoreLocation::new("/data", "Ritualist");
        assert_eq!(location.primary_path(), PathBuf::from("/data/Ritualist.store"));
        assert_eq!(location.wal_path(), PathBuf::from("/data/Ritualist.store-wal"));
        assert_eq!(location.shm_path(), PathBuf::from("/data/Ritualist.store-shm"));
        assert_eq!(
            location.companion_paths(),
            vec![location.wal_path(), location.shm_path()]
        );
    }
}
