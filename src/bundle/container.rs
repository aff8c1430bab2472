//! Containers and payloads.

use std::path::PathBuf;

use crate::messaging::SourcePosition;

/// Id of the distinguished primary container holding the bootstrapper
/// application payloads. It is always logically index 0 and is packaged by a
/// separate bootstrap-loader path, never by [`PackageContainers`](crate::bundle::PackageContainers).
pub const PRIMARY_CONTAINER_ID: &str = "BundleUxContainer";

/// Id of the default attached container. Unlike every other container it is
/// silently allowed to be empty.
pub const DEFAULT_ATTACHED_CONTAINER_ID: &str = "BundleAttachedContainer";

/// How a container ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum ContainerKind {
    /// Embedded inside the combined self-extracting artifact, addressed by
    /// integer index.
    Attached,
    /// Shipped as a separate file alongside the deliverable.
    Detached,
}

/// Compression applied to payloads when packing a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum CompressionLevel {
    /// Store uncompressed.
    None,
    /// Fast compression.
    Low,
    /// Balanced compression.
    Medium,
    /// Thorough compression.
    High,
    /// Maximum compression.
    Max,
}

impl CompressionLevel {
    /// The deflate level this compression level maps to.
    #[must_use]
    pub fn deflate(self) -> flate2::Compression {
        match self {
            Self::None => flate2::Compression::none(),
            Self::Low => flate2::Compression::new(3),
            Self::Medium => flate2::Compression::new(6),
            Self::High | Self::Max => flate2::Compression::new(9),
        }
    }
}

/// A declared bundle container.
#[derive(Debug, Clone)]
pub struct Container {
    /// Stable identifier of the container.
    pub id: String,
    /// File name the packed container is written as.
    pub name: String,
    /// How the container ships.
    pub kind: ContainerKind,
    /// Addressing index for attached containers; the primary container is
    /// always 0 and other attached containers count up from 1 in declaration
    /// order. Detached and dropped containers have none.
    pub attached_index: Option<u32>,
    /// Build-time path the container is packed to.
    pub working_path: Option<PathBuf>,
    /// Content hash of the packed container, lowercase hex.
    pub hash: Option<String>,
    /// Exact byte size of the packed container.
    pub size: Option<u64>,
    /// Position in the authored source that declared this container.
    pub source: Option<SourcePosition>,
}

impl Container {
    /// Declares a container.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ContainerKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            attached_index: None,
            working_path: None,
            hash: None,
            size: None,
            source: None,
        }
    }
}

/// A payload carried by exactly one container.
#[derive(Debug, Clone)]
pub struct Payload {
    /// Stable identifier of the payload.
    pub id: String,
    /// Name of the payload within its container.
    pub name: String,
    /// Id of the container carrying this payload.
    pub container_ref: String,
    /// Path of the payload's bytes on the build machine.
    pub source_path: PathBuf,
    /// Per-payload compression override; the packager's default applies
    /// when absent.
    pub compression: Option<CompressionLevel>,
    /// Position in the authored source that declared this payload.
    pub source: Option<SourcePosition>,
}

impl Payload {
    /// Declares a payload.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        container_ref: impl Into<String>,
        source_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            container_ref: container_ref.into(),
            source_path: source_path.into(),
            compression: None,
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_levels_map_to_deflate() {
        assert_eq!(CompressionLevel::None.deflate().level(), 0);
        assert_eq!(CompressionLevel::Low.deflate().level(), 3);
        assert_eq!(CompressionLevel::Medium.deflate().level(), 6);
        assert_eq!(CompressionLevel::High.deflate().level(), 9);
        assert_eq!(CompressionLevel::Max.deflate().level(), 9);
    }

    #[test]
    fn container_kind_round_trips() {
        use std::str::FromStr;
        assert_eq!(
            ContainerKind::from_str("Attached").unwrap(),
            ContainerKind::Attached
        );
        assert_eq!(ContainerKind::Detached.to_string(), "Detached");
    }
}
