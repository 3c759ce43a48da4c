//! Temporary file management module
//!
//! This module provides RAII-based temporary file handling with automatic cleanup.

use std::fs::{self, File};
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// Guard for temporary resources that automatically cleans up on drop
#[derive(Debug)]
pub(crate) enum TempGuard {
    /// Temporary file that will be deleted when dropped
    File(PathBuf),
    /// File that was moved to its final place and must be left alone
    Persisted,
}

impl TempGuard {
    /// Get the path to the temporary resource
    pub(crate) fn path(&self) -> &Path {
        match self {
            TempGuard::File(path) => path,
            TempGuard::Persisted => Path::new(""),
        }
    }

    /// Moves the temporary file to `destination` and disarms the cleanup
    ///
    /// When the rename fails the guard is dropped and the file removed.
    pub(crate) fn persist(mut self, destination: &Path) -> io::Result<()> {
        if let TempGuard::File(ref path) = self {
            fs::rename(path, destination)?;
        }
        // The old path is gone, so the replaced guard's cleanup finds nothing
        let _ = std::mem::replace(&mut self, TempGuard::Persisted);
        Ok(())
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        match self {
            TempGuard::File(path) => {
                // Silently ignore errors during cleanup
                let _ = fs::remove_file(path);
            }
            TempGuard::Persisted => {}
        }
    }
}

impl Deref for TempGuard {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.path()
    }
}

/// Creates a temporary file in `dir` and returns a guard that will clean it up on drop
///
/// The file name is made unique with a ULID. Creating it next to the final
/// destination keeps [`TempGuard::persist`] a same-filesystem rename.
///
/// # Examples
///
/// ```ignore
/// let temp = create_temp_file(&output_dir, "stream", "ts")?;
/// // write to temp.path(), then
/// temp.persist(&output_dir.join("Episode 01.mp4"))?;
/// ```
pub(crate) fn create_temp_file(dir: &Path, prefix: &str, extension: &str) -> io::Result<TempGuard> {
    // Create a unique filename using ULID (monotonic and sortable)
    let ulid = ulid::Ulid::new();
    let filename = format!(".{}_{}.{}", prefix, ulid, extension);

    let path = dir.join(filename);

    // Create the file
    File::create(&path)?;

    Ok(TempGuard::File(path))
}
