//! File binding: facades, the metadata resolver and the order optimizer.
//!
//! A [`FileFacade`] is the working record of one file to be installed,
//! bridging the symbolic component/file entity and its physical source on the
//! build machine. Facades are created during compilation, enriched in place
//! by [`ResolveFileMetadata`], reordered by [`OptimizeFileOrder`] and finally
//! consumed by table writing.
//!
//! # Key Components
//!
//! - [`FileFacade`] / [`FileHash`] / [`AssemblyInfo`] - The per-file records
//! - [`FileMetadataProbe`] - Capability seam for reading physical metadata
//! - [`PeMetadataProbe`] - Production probe reading PE version resources,
//!   CLR assembly identity and native-assembly manifests
//! - [`ResolveFileMetadata`] - Fills in size, version, language, hash and
//!   assembly identity with authored-versus-discovered precedence rules
//! - [`OptimizeFileOrder`] - Imposes the deterministic installation order

mod facade;
mod optimize;
mod pe;
mod probe;
mod resolve;

pub use facade::{AssemblyInfo, AssemblyKind, AssemblyName, FileFacade, FileHash};
pub use optimize::{
    component_target_paths, resolve_directory_paths, OptimizeFileOrder, ResolvedDirectory,
};
pub use pe::PeMetadataProbe;
pub use probe::{FileMetadataProbe, ManagedIdentity, ManifestIdentity, VersionInfo};
pub use resolve::ResolveFileMetadata;
