//! Bundle container packaging.
//!
//! Groups payload entries into named containers, assigns the deterministic
//! container addressing an installation-time reader uses to locate byte
//! ranges, and packs each container into a compressed, content-hashed
//! artifact.
//!
//! # Key Components
//!
//! - [`Container`] / [`Payload`] - The declared containers and their payloads
//! - [`PackageContainers`] - Addressing, packing, hashing
//! - [`FileTransfer`] / [`TrackedFile`] - Instructions for the file-system
//!   collaborator and build-output tracking

mod container;
mod packager;
mod transfer;

pub use container::{
    CompressionLevel, Container, ContainerKind, Payload, DEFAULT_ATTACHED_CONTAINER_ID,
    PRIMARY_CONTAINER_ID,
};
pub use packager::{PackageContainers, PackagedContainers};
pub use transfer::{create_file_transfer, FileTransfer, TrackedFile, TrackedFileKind};
