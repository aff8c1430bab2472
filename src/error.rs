use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type covering every fatal condition this library can return.
///
/// Only build-fatal conditions are represented here. Per-item recoverable
/// conditions (bad file names, missing files, missing manifests, identity
/// read failures, empty containers, duplicate primary keys) are reported
/// through the [`crate::messaging::Messaging`] collaborator and never abort
/// a run on their own.
///
/// # Error Categories
///
/// ## Document Errors
/// - [`Error::Malformed`] - Corrupted or out-of-order serialized database document
/// - [`Error::VersionMismatch`] - Serialized document written by a different format version
///
/// ## Binder Errors
/// - [`Error::FileTooLarge`] - Staged file exceeds the 32-bit size limit of the table format
/// - [`Error::ContainerWrite`] - I/O failure while packing a bundle container
/// - [`Error::UnknownValidationMessageKind`] - Validation engine emitted an out-of-protocol finding
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::PeError`] - PE parsing errors from the goblin crate
#[derive(Error, Debug)]
pub enum Error {
    /// The serialized document is damaged and could not be parsed.
    ///
    /// Raised for unknown elements, a `table` element appearing before any
    /// `tableDefinitions` element, unterminated documents and any other
    /// structural violation. The error includes the source location where
    /// the malformation was detected for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The serialized document was written by an incompatible format version.
    ///
    /// Raised when loading a document whose `version` attribute differs from
    /// the current format version and the version check was not suppressed.
    #[error("The document format version '{found}' does not match the expected version '{expected}'")]
    VersionMismatch {
        /// Version recorded in the document.
        found: String,
        /// Version this library writes and expects.
        expected: String,
    },

    /// A staged file is larger than the table format can describe.
    ///
    /// File sizes are persisted as 32-bit signed integers; a larger file
    /// would corrupt every size-dependent field downstream, so this aborts
    /// the whole build.
    #[error("The file '{path}' is too large; file sizes must fit a 32-bit signed integer")]
    FileTooLarge {
        /// Source path of the oversized file.
        path: String,
    },

    /// Writing a packed container failed.
    ///
    /// A partially written container is a broken deliverable, not a
    /// recoverable per-item condition.
    #[error("Failed to write container '{path}': {source}")]
    ContainerWrite {
        /// Working path of the container being written.
        path: String,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The validation engine reported a finding with an unknown message kind.
    ///
    /// The validator protocol is closed; an unrecognized kind indicates an
    /// internal-consistency failure rather than a database problem.
    #[error("Unknown validation message kind '{0}'")]
    UnknownValidationMessageKind(u32),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during file operations
    /// such as reading from disk, permission issues, or filesystem errors.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    ///
    /// Used for errors that don't fit into other categories or for
    /// wrapping external library errors with additional context.
    #[error("{0}")]
    Error(String),

    /// Error from the goblin crate during PE parsing.
    ///
    /// The goblin crate is used for low-level PE format parsing when probing
    /// file metadata. This error wraps any failures from that parsing layer.
    #[error("{0}")]
    PeError(#[from] goblin::error::Error),
}
