//! File transfers and tracked build outputs.

use std::path::{Path, PathBuf};

use crate::filesystem::validated_full_path;
use crate::messaging::{Message, Messaging, SourcePosition};

/// An instruction for the file-system collaborator to copy or move a file
/// into the final layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransfer {
    /// Validated absolute source path.
    pub source: PathBuf,
    /// Validated absolute destination path.
    pub destination: PathBuf,
    /// Move instead of copy.
    pub move_file: bool,
    /// Whether source and destination are the same file; redundant transfers
    /// can be skipped by the executor.
    pub redundant: bool,
    /// Position in the authored source this transfer traces back to.
    pub source_position: Option<SourcePosition>,
}

/// Why a build artifact is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum TrackedFileKind {
    /// A working artifact that can be cleaned up after the build.
    Temporary,
    /// Built content delivered as part of the output layout.
    BuiltContentOutput,
}

/// A file the build created or is about to create, tracked for cleanup and
/// incremental-build bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    /// Path of the tracked artifact.
    pub path: PathBuf,
    /// Why the artifact is tracked.
    pub kind: TrackedFileKind,
    /// Position in the authored source this artifact traces back to.
    pub source_position: Option<SourcePosition>,
}

impl TrackedFile {
    /// Tracks a file.
    #[must_use]
    pub fn new(
        path: impl Into<PathBuf>,
        kind: TrackedFileKind,
        source_position: Option<SourcePosition>,
    ) -> Self {
        Self {
            path: path.into(),
            kind,
            source_position,
        }
    }
}

/// Creates a validated file transfer.
///
/// Both endpoints are resolved to absolute paths; a path that is not a usable
/// file name (syntax, reserved device names) is reported through `messaging`
/// and yields `None`. A transfer whose source equals its destination is
/// marked redundant.
#[must_use]
pub fn create_file_transfer(
    messaging: &dyn Messaging,
    source: &Path,
    destination: &Path,
    move_file: bool,
    source_position: Option<SourcePosition>,
) -> Option<FileTransfer> {
    let resolved_source = validate(messaging, source, source_position.as_ref())?;
    let resolved_destination = validate(messaging, destination, source_position.as_ref())?;

    let redundant = resolved_source
        .to_string_lossy()
        .eq_ignore_ascii_case(&resolved_destination.to_string_lossy());

    Some(FileTransfer {
        source: resolved_source,
        destination: resolved_destination,
        move_file,
        redundant,
        source_position,
    })
}

fn validate(
    messaging: &dyn Messaging,
    path: &Path,
    source_position: Option<&SourcePosition>,
) -> Option<PathBuf> {
    match validated_full_path(path) {
        Some(resolved) => Some(resolved),
        None => {
            messaging.write(Message::invalid_file_name(
                source_position.cloned(),
                &path.display().to_string(),
            ));
            None
        }
    }
}
