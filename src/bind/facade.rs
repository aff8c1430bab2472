//! Working records for files to be installed.

use std::path::PathBuf;

use crate::messaging::SourcePosition;

/// The 4-part content hash recorded for unversioned files.
///
/// The installer engine compares hashes as four little-endian 32-bit signed
/// integers carved out of a 128-bit content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHash {
    /// First 32 bits of the digest.
    pub part1: i32,
    /// Second 32 bits of the digest.
    pub part2: i32,
    /// Third 32 bits of the digest.
    pub part3: i32,
    /// Fourth 32 bits of the digest.
    pub part4: i32,
}

impl FileHash {
    /// Splits a 128-bit digest into its four little-endian parts.
    #[must_use]
    pub fn from_digest(digest: [u8; 16]) -> Self {
        let part = |chunk: &[u8]| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        Self {
            part1: part(&digest[0..4]),
            part2: part(&digest[4..8]),
            part3: part(&digest[8..12]),
            part4: part(&digest[12..16]),
        }
    }
}

/// What kind of assembly a file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssemblyKind {
    /// A managed assembly whose identity is embedded in the file itself.
    Managed,
    /// A native side-by-side assembly whose identity lives in a companion
    /// manifest file.
    Native,
}

/// Assembly participation of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyInfo {
    /// Managed or native.
    pub kind: AssemblyKind,
    /// When set, the assembly is scoped to a private application directory
    /// instead of being registered machine-global.
    pub application_ref: Option<String>,
    /// For native assemblies, the facade id of the companion manifest file.
    pub manifest_ref: Option<String>,
}

/// One resolved assembly-identity attribute, scoped to the owning component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyName {
    /// Id of the component owning the assembly.
    pub component_id: String,
    /// Attribute name, e.g. `name`, `version`, `culture`, `publicKeyToken`.
    pub name: String,
    /// Attribute value.
    pub value: String,
}

/// The working record of one file to be installed.
///
/// Created during compilation, enriched in place by the resolver, reordered
/// (not mutated) by the optimizer and consumed by table writing. Facades
/// without a [`source_path`](Self::source_path) are never resolved.
#[derive(Debug, Clone)]
pub struct FileFacade {
    /// Stable identifier of the file.
    pub id: String,
    /// Id of the owning component.
    pub component_id: String,
    /// Disk/media identifier the file ships on.
    pub disk_id: u32,
    /// Logical name the file installs as.
    pub file_name: String,
    /// Path of the file on the build machine, when known.
    pub source_path: Option<PathBuf>,
    /// Position in the authored source that produced this facade.
    pub source: Option<SourcePosition>,
    /// Resolved size in bytes; fits the table format's 32-bit signed field.
    pub file_size: Option<i32>,
    /// Version string: authored, discovered, or a companion-file reference.
    pub version: Option<String>,
    /// Language string, a decimal language id list.
    pub language: Option<String>,
    /// Content hash, recorded for unversioned files.
    pub hash: Option<FileHash>,
    /// Assembly participation, when the file is an assembly.
    pub assembly: Option<AssemblyInfo>,
    /// Resolved assembly-identity attributes.
    pub assembly_names: Vec<AssemblyName>,
}

impl FileFacade {
    /// Creates a facade with no physical metadata resolved yet.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        component_id: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            component_id: component_id.into(),
            disk_id: 1,
            file_name: file_name.into(),
            source_path: None,
            source: None,
            file_size: None,
            version: None,
            language: None,
            hash: None,
            assembly: None,
            assembly_names: Vec::new(),
        }
    }

    /// Sets the source path on the build machine.
    #[must_use]
    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Sets the disk/media identifier.
    #[must_use]
    pub fn with_disk_id(mut self, disk_id: u32) -> Self {
        self.disk_id = disk_id;
        self
    }

    /// Sets the authored version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the authored language.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Marks the file as an assembly.
    #[must_use]
    pub fn with_assembly(mut self, assembly: AssemblyInfo) -> Self {
        self.assembly = Some(assembly);
        self
    }

    /// Sets the authored source position.
    #[must_use]
    pub fn with_source(mut self, source: SourcePosition) -> Self {
        self.source = Some(source);
        self
    }

    /// The file name without its final extension, compared against resolved
    /// assembly names for machine-global assemblies.
    #[must_use]
    pub fn file_stem(&self) -> &str {
        match self.file_name.rsplit_once('.') {
            Some((stem, _)) => stem,
            None => &self.file_name,
        }
    }
}
