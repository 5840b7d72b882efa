//! Unique temporary files and directories.
//!
//! Paths are created atomically: a name is only returned once the file or directory exists, so
//! concurrent callers in this process or in sibling processes never receive the same path. The
//! created entries are kept after return and belong to the caller.

use std::io;
use std::path::{Path, PathBuf};

use log::error;
use tempfile::Builder;

/// Prefix of every path created by [SystemTempPaths::new].
pub const TEMP_PREFIX: &str = "datum_test.";

/// Source of unique temporary paths.
pub trait UniquePathProvider {
    /// Create an empty file and return its path.
    fn temp_file(&self) -> io::Result<PathBuf>;

    /// Create an empty directory and return its path.
    fn temp_dir(&self) -> io::Result<PathBuf>;
}

/// [UniquePathProvider] creating entries under the platform temp directory, or a chosen root.
#[derive(Debug, Clone)]
pub struct SystemTempPaths {
    root: Option<PathBuf>,
    prefix: String,
}

impl Default for SystemTempPaths {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemTempPaths {
    /// Entries under the platform temp directory, named with [TEMP_PREFIX].
    pub fn new() -> Self {
        Self {
            root: None,
            prefix: TEMP_PREFIX.to_string(),
        }
    }

    /// Create entries under `root` instead.
    pub fn with_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.root = Some(root.as_ref().to_path_buf());
        self
    }

    /// Use another name prefix.
    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = prefix.into();
        self
    }
}

impl UniquePathProvider for SystemTempPaths {
    fn temp_file(&self) -> io::Result<PathBuf> {
        let mut builder = Builder::new();
        builder.prefix(&self.prefix);
        let file = match &self.root {
            Some(root) => builder.tempfile_in(root)?,
            None => builder.tempfile()?,
        };
        let (_, path) = file.keep().map_err(|err| err.error)?;

        Ok(path)
    }

    fn temp_dir(&self) -> io::Result<PathBuf> {
        let mut builder = Builder::new();
        builder.prefix(&self.prefix);
        let dir = match &self.root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        Ok(dir.keep())
    }
}

/// Create a unique temporary file, panicking on failure.
pub fn make_temp_filename() -> PathBuf {
    SystemTempPaths::new().temp_file().unwrap_or_else(|err| {
        error!("Failed to create a temporary file: {err}");
        panic!("Failed to create a temporary file: {err}");
    })
}

/// Create a unique temporary directory, panicking on failure.
pub fn make_temp_dir() -> PathBuf {
    SystemTempPaths::new().temp_dir().unwrap_or_else(|err| {
        error!("Failed to create a temporary directory: {err}");
        panic!("Failed to create a temporary directory: {err}");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn creates_file_and_dir() {
        let root = tempfile::tempdir().unwrap();
        let paths = SystemTempPaths::new().with_root(root.path());

        let file = paths.temp_file().unwrap();
        assert!(file.is_file());
        assert!(file.starts_with(root.path()));
        assert!(file
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(TEMP_PREFIX));

        let dir = paths.temp_dir().unwrap();
        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn default_helpers_create_entries() {
        let file = make_temp_filename();
        let dir = make_temp_dir();
        assert!(file.is_file());
        assert!(dir.is_dir());

        std::fs::remove_file(file).unwrap();
        std::fs::remove_dir(dir).unwrap();
    }

    #[test]
    fn concurrent_calls_never_collide() {
        let root = tempfile::tempdir().unwrap();
        let paths = SystemTempPaths::new()
            .with_root(root.path())
            .with_prefix("collide.");

        let handles = (0..8)
            .map(|_| {
                let paths = paths.clone();
                thread::spawn(move || {
                    (0..16)
                        .flat_map(|_| [paths.temp_file().unwrap(), paths.temp_dir().unwrap()])
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();

        let created = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();
        let unique = created.iter().collect::<HashSet<_>>();
        assert_eq!(created.len(), 8 * 16 * 2);
        assert_eq!(unique.len(), created.len());
    }

    #[test]
    fn missing_root_is_an_error() {
        let paths = SystemTempPaths::new().with_root("does/not/exist");
        assert!(paths.temp_file().is_err());
        assert!(paths.temp_dir().is_err());
    }
}
