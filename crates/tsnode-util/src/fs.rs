//! Filesystem seam for the resolvers.
//!
//! Every probe the resolvers make goes through [`FileSystem`] so that tests
//! (and hosts with virtual filesystems) can inject their own implementation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// What a path points at, as far as resolution cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

/// Synchronous filesystem operations needed by module resolution.
pub trait FileSystem: std::fmt::Debug {
    /// Stat a path, following symlinks. Returns `None` if nothing exists there.
    fn stat(&self, path: &Path) -> Option<FileKind>;

    /// Read a file to string.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Resolve symlinks and return the canonical path.
    ///
    /// # Errors
    /// Returns an error if the path does not exist.
    fn realpath(&self, path: &Path) -> io::Result<PathBuf>;

    /// Whether `path` is an existing regular file.
    fn file_exists(&self, path: &Path) -> bool {
        self.stat(path) == Some(FileKind::File)
    }

    /// Whether `path` is an existing directory.
    fn dir_exists(&self, path: &Path) -> bool {
        self.stat(path) == Some(FileKind::Directory)
    }
}

/// The real filesystem, via `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFs;

impl FileSystem for RealFs {
    fn stat(&self, path: &Path) -> Option<FileKind> {
        let meta = fs::metadata(path).ok()?;
        if meta.is_dir() {
            Some(FileKind::Directory)
        } else if meta.is_file() {
            Some(FileKind::File)
        } else {
            None
        }
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        read_to_string_lossy(path)
    }

    fn realpath(&self, path: &Path) -> io::Result<PathBuf> {
        // dunce keeps Windows paths free of the `\\?\` prefix
        dunce::canonicalize(path)
    }
}

/// Read a file to string, replacing invalid UTF-8 sequences with the replacement character.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_to_string_lossy(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
