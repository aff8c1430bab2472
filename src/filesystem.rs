//! File system capability seam.
//!
//! Components that touch the disk go through the [`FileSystem`] trait so the
//! precedence and orchestration logic can be tested with deterministic fakes.
//! The standard implementation retries transient failures a few times with a
//! short pause, since build-machine file operations are routinely interrupted
//! by external scanners.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Result;

/// Windows device names that are never valid file names, regardless of
/// extension or directory.
pub const RESERVED_FILE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Whether `name` (a bare file name, not a path) is a reserved device name.
#[must_use]
pub fn is_reserved_file_name(name: &str) -> bool {
    RESERVED_FILE_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Resolves `path` to an absolute path, rejecting reserved device names.
///
/// Returns `None` when the path has no file name component or names a
/// reserved device. The file does not have to exist.
#[must_use]
pub fn validated_full_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;

    if is_reserved_file_name(name) {
        return None;
    }

    std::path::absolute(path).ok()
}

/// Abstracts basic file system operations.
pub trait FileSystem: Send + Sync {
    /// Copies a file, overwriting the destination if it exists.
    fn copy_file(&self, source: &Path, destination: &Path) -> Result<()>;

    /// Moves a file, overwriting the destination if it exists.
    fn move_file(&self, source: &Path, destination: &Path) -> Result<()>;

    /// Deletes a file.
    ///
    /// When `must_succeed` is `false` the delete is best effort and failures
    /// are swallowed; otherwise the operation is retried up to `max_retries`
    /// times before the last error is returned.
    fn delete_file(&self, path: &Path, must_succeed: bool, max_retries: u32) -> Result<()>;

    /// Removes the read-only attribute from a file, if it is set.
    fn clear_readonly(&self, path: &Path) -> Result<()>;
}

/// [`FileSystem`] implementation backed by [`std::fs`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileSystem;

impl StdFileSystem {
    /// Default retry count for file operations.
    pub const DEFAULT_RETRIES: u32 = 4;

    /// Executes `operation`, retrying on any failure with a short pause
    /// between attempts.
    fn with_retries<T>(
        max_retries: u32,
        mut operation: impl FnMut() -> std::io::Result<T>,
    ) -> std::io::Result<T> {
        let mut attempt = 0;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempt += 1;
                    if attempt > max_retries {
                        return Err(error);
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }
}

impl FileSystem for StdFileSystem {
    fn copy_file(&self, source: &Path, destination: &Path) -> Result<()> {
        Self::with_retries(Self::DEFAULT_RETRIES, || {
            std::fs::copy(source, destination).map(|_| ())
        })?;
        Ok(())
    }

    fn move_file(&self, source: &Path, destination: &Path) -> Result<()> {
        Self::with_retries(Self::DEFAULT_RETRIES, || {
            // Rename is atomic within a volume; fall back to copy + delete
            // when the destination is on a different volume.
            match std::fs::rename(source, destination) {
                Ok(()) => Ok(()),
                Err(_) => {
                    std::fs::copy(source, destination)?;
                    std::fs::remove_file(source)
                }
            }
        })?;
        Ok(())
    }

    fn delete_file(&self, path: &Path, must_succeed: bool, max_retries: u32) -> Result<()> {
        let outcome = Self::with_retries(max_retries, || match std::fs::remove_file(path) {
            Err(error) if error.kind() != std::io::ErrorKind::NotFound => Err(error),
            _ => Ok(()),
        });

        match outcome {
            Ok(()) => Ok(()),
            Err(_) if !must_succeed => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    fn clear_readonly(&self, path: &Path) -> Result<()> {
        let metadata = std::fs::metadata(path)?;
        let mut permissions = metadata.permissions();

        if permissions.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            std::fs::set_permissions(path, permissions)?;
        }

        Ok(())
    }
}
