//! # packbind Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! and traits from the packbind library. Import this module to get quick
//! access to the essential types for binding installer packages.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all packbind operations
pub use crate::Error;

/// The result type used throughout packbind
pub use crate::Result;

// ================================================================================================
// Diagnostics and Capability Seams
// ================================================================================================

/// Diagnostic messages and the injected messaging collaborator
pub use crate::messaging::{Message, MessageCollector, Messaging, Severity, SourcePosition};

/// File system capability seam
pub use crate::filesystem::{FileSystem, StdFileSystem};

// ================================================================================================
// Relational Table Model
// ================================================================================================

/// The installer database and its building blocks
pub use crate::data::{
    ColumnDefinition, ColumnKind, FieldValue, InstallerData, OutputType, Row, SubStorage, Table,
    TableDefinition, FORMAT_VERSION,
};

// ================================================================================================
// File Binding
// ================================================================================================

/// File facades and their metadata
pub use crate::bind::{AssemblyInfo, AssemblyKind, AssemblyName, FileFacade, FileHash};

/// Metadata resolution and install ordering
pub use crate::bind::{
    FileMetadataProbe, ManagedIdentity, ManifestIdentity, OptimizeFileOrder, PeMetadataProbe,
    ResolveFileMetadata, ResolvedDirectory, VersionInfo,
};

// ================================================================================================
// Bundle Packaging
// ================================================================================================

/// Containers, payloads and packing
pub use crate::bundle::{
    CompressionLevel, Container, ContainerKind, FileTransfer, PackageContainers,
    PackagedContainers, Payload, TrackedFile, TrackedFileKind, DEFAULT_ATTACHED_CONTAINER_ID,
    PRIMARY_CONTAINER_ID,
};

// ================================================================================================
// Validation
// ================================================================================================

/// Database validation orchestration
pub use crate::validate::{
    ValidateDatabase, ValidationEngine, ValidationFinding, ValidationMessageKind, ValidationState,
    BUILT_IN_SUPPRESSED_RULES,
};
