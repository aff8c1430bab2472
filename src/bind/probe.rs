//! Capability seam for reading physical file metadata.
//!
//! The resolver's precedence logic only ever sees this trait, so it can be
//! tested with deterministic fakes instead of real files. The production
//! implementation is [`PeMetadataProbe`](crate::bind::PeMetadataProbe).

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::bind::FileHash;
use crate::Result;

/// Version and language discovered in a file's embedded version resource.
///
/// Absence of a version implies no language is meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    /// Four-part file version, e.g. `1.2.3.4`.
    pub version: Option<String>,
    /// Decimal language id list, e.g. `1033`.
    pub language: Option<String>,
}

/// Identity read from a managed assembly's embedded metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedIdentity {
    /// Simple assembly name.
    pub name: Option<String>,
    /// Culture, `neutral` for culture-neutral assemblies.
    pub culture: Option<String>,
    /// Four-part assembly version.
    pub version: Option<String>,
    /// Processor architecture, e.g. `MSIL`, `x86`, `amd64`.
    pub architecture: Option<String>,
    /// Lowercase hex public-key token, when strong-named.
    pub public_key_token: Option<String>,
    /// Whether the assembly carries a strong-name signature.
    pub strong_named: bool,
    /// File version from the version resource, when present.
    pub file_version: Option<String>,
}

impl ManagedIdentity {
    /// The display full name: `Name, Version=..., Culture=..., PublicKeyToken=...`.
    #[must_use]
    pub fn full_name(&self) -> String {
        let mut result = String::with_capacity(64);
        result.push_str(self.name.as_deref().unwrap_or_default());

        if let Some(version) = &self.version {
            let _ = write!(result, ", Version={version}");
        }

        let _ = write!(
            result,
            ", Culture={}",
            self.culture.as_deref().unwrap_or("neutral")
        );

        let _ = write!(
            result,
            ", PublicKeyToken={}",
            self.public_key_token.as_deref().unwrap_or("null")
        );

        result
    }
}

/// Identity read from a native assembly's companion manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestIdentity {
    /// Assembly name.
    pub name: Option<String>,
    /// Assembly version.
    pub version: Option<String>,
    /// Assembly type, e.g. `win32`.
    pub kind: Option<String>,
    /// Processor architecture.
    pub architecture: Option<String>,
    /// Public-key token.
    pub public_key_token: Option<String>,
}

/// Reads physical metadata from files on the build machine.
///
/// Implementations must be shareable across the resolver's parallel workers.
pub trait FileMetadataProbe: Send + Sync {
    /// Resolves `path` to an absolute path, or `None` when the path is not a
    /// usable file name (syntax, reserved device names).
    fn canonicalize(&self, path: &Path) -> Option<PathBuf>;

    /// Whether the file exists on disk.
    fn exists(&self, path: &Path) -> bool;

    /// The file's size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read.
    fn file_size(&self, path: &Path) -> Result<u64>;

    /// The file's embedded version and language, when it has any.
    ///
    /// A file without a version resource yields the default (all-`None`)
    /// info; that is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read.
    fn version_info(&self, path: &Path) -> Result<VersionInfo>;

    /// The 4-part content hash of the file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read.
    fn file_hash(&self, path: &Path) -> Result<FileHash>;

    /// The identity of a managed assembly.
    ///
    /// `file_version` is the already-discovered version-resource version,
    /// recorded on the identity for the installer's assembly-name table.
    ///
    /// # Errors
    ///
    /// Returns an error when the file is not a readable managed assembly.
    fn managed_identity(&self, path: &Path, file_version: Option<&str>)
        -> Result<ManagedIdentity>;

    /// The identity declared in a native assembly's manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error when the manifest cannot be read or parsed.
    fn manifest_identity(&self, path: &Path) -> Result<ManifestIdentity>;
}
