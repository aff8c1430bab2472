//! Container addressing and packing.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use flate2::write::DeflateEncoder;
use memmap2::Mmap;
use sha1::{Digest, Sha1};

use crate::bundle::{
    create_file_transfer, CompressionLevel, Container, ContainerKind, FileTransfer, Payload,
    TrackedFile, TrackedFileKind, DEFAULT_ATTACHED_CONTAINER_ID, PRIMARY_CONTAINER_ID,
};
use crate::messaging::{Message, Messaging};
use crate::{Error, Result};

const CONTAINER_MAGIC: &[u8; 4] = b"PBCN";
const CONTAINER_FORMAT_VERSION: u16 = 1;

/// Everything the packager hands back to the caller.
#[derive(Debug, Default)]
pub struct PackagedContainers {
    /// Payloads of the primary container, which is packaged by the separate
    /// bootstrap-loader path rather than by this stage.
    pub primary_payloads: Vec<Payload>,
    /// Move/copy instructions for detached containers.
    pub file_transfers: Vec<FileTransfer>,
    /// Artifacts this stage created or scheduled.
    pub tracked_files: Vec<TrackedFile>,
}

/// Command that assigns container addressing and packs payloads.
///
/// Containers are processed in declaration order: empty containers are
/// dropped with a warning (except the default attached container, which may
/// be empty silently), the primary container's payloads are returned to the
/// caller, detached containers are scheduled for transfer into the layout
/// folder, and attached containers receive sequential addressing indexes
/// starting at 1. Packing is skipped entirely once any upstream error has
/// been recorded, so no partial containers are written for a failing run.
pub struct PackageContainers<'a> {
    messaging: &'a dyn Messaging,
    intermediate_folder: &'a Path,
    layout_folder: &'a Path,
    default_compression: CompressionLevel,
}

impl<'a> PackageContainers<'a> {
    /// Creates the command.
    #[must_use]
    pub fn new(
        messaging: &'a dyn Messaging,
        intermediate_folder: &'a Path,
        layout_folder: &'a Path,
        default_compression: CompressionLevel,
    ) -> Self {
        Self {
            messaging,
            intermediate_folder,
            layout_folder,
            default_compression,
        }
    }

    /// Assigns addressing and packs every non-primary, non-empty container.
    ///
    /// # Errors
    ///
    /// Returns an error when writing a packed container fails; a partially
    /// written container is a broken deliverable.
    pub fn execute(
        &self,
        containers: &mut [Container],
        payloads: &[Payload],
    ) -> Result<PackagedContainers> {
        let mut result = PackagedContainers::default();

        let mut payloads_by_container: HashMap<&str, Vec<&Payload>> = HashMap::new();
        for payload in payloads {
            payloads_by_container
                .entry(payload.container_ref.as_str())
                .or_default()
                .push(payload);
        }

        // The primary container is always index 0, so attached addressing
        // counts up from 1.
        let mut attached_index = 1u32;

        for container in containers.iter_mut() {
            let container_payloads = payloads_by_container
                .get(container.id.as_str())
                .map_or(&[][..], Vec::as_slice);

            if container_payloads.is_empty() {
                if container.id != DEFAULT_ATTACHED_CONTAINER_ID {
                    self.messaging
                        .write(Message::empty_container(container.source.clone(), &container.id));
                }
            } else if container.id == PRIMARY_CONTAINER_ID {
                container.attached_index = Some(0);
                container.working_path = Some(self.intermediate_folder.join(&container.name));

                result
                    .primary_payloads
                    .extend(container_payloads.iter().map(|payload| (*payload).clone()));
            } else {
                let working_path = self.intermediate_folder.join(&container.name);
                container.working_path = Some(working_path.clone());

                match container.kind {
                    ContainerKind::Detached => {
                        // Detached containers are packed to the build
                        // location and then moved into the output layout.
                        let output_path = self.layout_folder.join(&container.name);
                        if let Some(transfer) = create_file_transfer(
                            self.messaging,
                            &working_path,
                            &output_path,
                            true,
                            container.source.clone(),
                        ) {
                            result.file_transfers.push(transfer);
                        }

                        result.tracked_files.push(TrackedFile::new(
                            output_path,
                            TrackedFileKind::BuiltContentOutput,
                            container.source.clone(),
                        ));
                    }
                    ContainerKind::Attached => {
                        container.attached_index = Some(attached_index);
                        attached_index += 1;

                        result.tracked_files.push(TrackedFile::new(
                            working_path,
                            TrackedFileKind::Temporary,
                            container.source.clone(),
                        ));
                    }
                }
            }
        }

        if !self.messaging.encountered_error() {
            for container in containers
                .iter_mut()
                .filter(|c| c.working_path.is_some() && c.id != PRIMARY_CONTAINER_ID)
            {
                let container_payloads = payloads_by_container
                    .get(container.id.as_str())
                    .map_or(&[][..], Vec::as_slice);
                self.pack_container(container, container_payloads)?;
            }
        }

        Ok(result)
    }

    /// Packs one container: concatenated, optionally compressed payload
    /// records behind a fixed header, with the content hash and exact byte
    /// size recorded back onto the container.
    fn pack_container(&self, container: &mut Container, payloads: &[&Payload]) -> Result<()> {
        let Some(working_path) = container.working_path.clone() else {
            return Ok(());
        };

        let wrap = |error: std::io::Error| Error::ContainerWrite {
            path: working_path.display().to_string(),
            source: error,
        };

        let file = std::fs::File::create(&working_path).map_err(wrap)?;
        let mut writer = HashingWriter::new(std::io::BufWriter::new(file));

        writer.write_all(CONTAINER_MAGIC).map_err(wrap)?;
        writer
            .write_all(&CONTAINER_FORMAT_VERSION.to_le_bytes())
            .map_err(wrap)?;
        writer
            .write_all(&(payloads.len() as u32).to_le_bytes())
            .map_err(wrap)?;

        for payload in payloads {
            let bytes = read_payload(&payload.source_path).map_err(wrap)?;
            let level = payload.compression.unwrap_or(self.default_compression);

            let mut encoder = DeflateEncoder::new(Vec::new(), level.deflate());
            encoder.write_all(&bytes).map_err(wrap)?;
            let packed = encoder.finish().map_err(wrap)?;

            writer
                .write_all(&(payload.name.len() as u32).to_le_bytes())
                .map_err(wrap)?;
            writer.write_all(payload.name.as_bytes()).map_err(wrap)?;
            writer
                .write_all(&(bytes.len() as u64).to_le_bytes())
                .map_err(wrap)?;
            writer
                .write_all(&(packed.len() as u64).to_le_bytes())
                .map_err(wrap)?;
            writer.write_all(&packed).map_err(wrap)?;
        }

        writer.flush().map_err(wrap)?;

        container.hash = Some(writer.hex_digest());
        container.size = Some(writer.written());
        Ok(())
    }
}

fn read_payload(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(Vec::new());
    }

    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap.to_vec())
}

/// Writer that hashes and counts everything passing through it, so the
/// container hash and size describe exactly the bytes on disk.
struct HashingWriter<W: Write> {
    inner: W,
    sha: Sha1,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            sha: Sha1::new(),
            written: 0,
        }
    }

    fn written(&self) -> u64 {
        self.written
    }

    fn hex_digest(&self) -> String {
        use std::fmt::Write as _;

        let digest = self.sha.clone().finalize();
        let mut result = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(result, "{byte:02x}");
        }
        result
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let count = self.inner.write(buf)?;
        self.sha.update(&buf[..count]);
        self.written += count as u64;
        Ok(count)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::MessageCollector;
    use std::path::PathBuf;

    fn write_payload(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn containers_and_payloads(dir: &Path) -> (Vec<Container>, Vec<Payload>) {
        let ux_payload = write_payload(dir, "ba.dll", b"bootstrapper application");
        let a_payload = write_payload(dir, "a.msi", b"package a");
        let d_payload = write_payload(dir, "d.msi", b"package d");
        let b_payload = write_payload(dir, "b.msi", b"package b");

        let containers = vec![
            Container::new(PRIMARY_CONTAINER_ID, "bundle-ux", ContainerKind::Attached),
            Container::new("ContainerA", "a.container", ContainerKind::Attached),
            Container::new("ContainerD", "d.container", ContainerKind::Detached),
            Container::new("ContainerB", "b.container", ContainerKind::Attached),
        ];

        let payloads = vec![
            Payload::new("PayUx", "ba.dll", PRIMARY_CONTAINER_ID, ux_payload),
            Payload::new("PayA", "a.msi", "ContainerA", a_payload),
            Payload::new("PayD", "d.msi", "ContainerD", d_payload),
            Payload::new("PayB", "b.msi", "ContainerB", b_payload),
        ];

        (containers, payloads)
    }

    #[test]
    fn addressing_and_transfers() {
        let temp = tempfile::tempdir().unwrap();
        let intermediate = temp.path().join("obj");
        let layout = temp.path().join("bin");
        std::fs::create_dir_all(&intermediate).unwrap();
        std::fs::create_dir_all(&layout).unwrap();

        let (mut containers, payloads) = containers_and_payloads(temp.path());

        let messaging = MessageCollector::new();
        let command = PackageContainers::new(
            &messaging,
            &intermediate,
            &layout,
            CompressionLevel::Medium,
        );
        let packaged = command.execute(&mut containers, &payloads).unwrap();

        // Primary is index 0 and never packed by this stage; attached
        // containers count up in declaration order skipping the detached one.
        assert_eq!(containers[0].attached_index, Some(0));
        assert_eq!(containers[1].attached_index, Some(1));
        assert_eq!(containers[2].attached_index, None);
        assert_eq!(containers[3].attached_index, Some(2));

        assert_eq!(packaged.primary_payloads.len(), 1);
        assert_eq!(packaged.primary_payloads[0].id, "PayUx");
        assert!(containers[0].hash.is_none());

        // The detached container produced exactly one move transfer.
        assert_eq!(packaged.file_transfers.len(), 1);
        assert!(packaged.file_transfers[0].move_file);
        assert_eq!(
            packaged.tracked_files[0].kind,
            TrackedFileKind::BuiltContentOutput
        );

        // Packed containers carry hash and size matching the artifact.
        for container in &containers[1..] {
            let hash = container.hash.as_ref().unwrap();
            assert_eq!(hash.len(), 40);
            let on_disk = std::fs::metadata(container.working_path.as_ref().unwrap())
                .unwrap()
                .len();
            assert_eq!(container.size, Some(on_disk));
        }
    }

    #[test]
    fn packing_is_deterministic() {
        let temp = tempfile::tempdir().unwrap();
        let intermediate_one = temp.path().join("one");
        let intermediate_two = temp.path().join("two");
        std::fs::create_dir_all(&intermediate_one).unwrap();
        std::fs::create_dir_all(&intermediate_two).unwrap();
        let payload = write_payload(temp.path(), "data.bin", &[7u8; 4096]);

        let messaging = MessageCollector::new();
        let mut hashes = Vec::new();
        for intermediate in [&intermediate_one, &intermediate_two] {
            let mut containers =
                vec![Container::new("C1", "c1.container", ContainerKind::Attached)];
            let payloads = vec![Payload::new("P1", "data.bin", "C1", payload.clone())];

            let command = PackageContainers::new(
                &messaging,
                intermediate,
                temp.path(),
                CompressionLevel::High,
            );
            command.execute(&mut containers, &payloads).unwrap();
            hashes.push(containers[0].hash.clone().unwrap());
        }

        assert_eq!(hashes[0], hashes[1]);
    }

    #[test]
    fn empty_container_warns_unless_default_attached() {
        let temp = tempfile::tempdir().unwrap();

        let mut containers = vec![
            Container::new("Empty", "empty.container", ContainerKind::Attached),
            Container::new(
                DEFAULT_ATTACHED_CONTAINER_ID,
                "default.container",
                ContainerKind::Attached,
            ),
        ];

        let messaging = MessageCollector::new();
        let command =
            PackageContainers::new(&messaging, temp.path(), temp.path(), CompressionLevel::Medium);
        command.execute(&mut containers, &[]).unwrap();

        let warnings: Vec<String> = messaging
            .messages()
            .iter()
            .filter(|m| m.id == 8502)
            .map(|m| m.text.clone())
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Empty"));

        // Neither container was packed.
        assert!(containers.iter().all(|c| c.working_path.is_none()));
        assert!(containers.iter().all(|c| c.hash.is_none()));
    }

    #[test]
    fn upstream_error_short_circuits_packing() {
        let temp = tempfile::tempdir().unwrap();
        let payload = write_payload(temp.path(), "data.bin", b"payload");

        let mut containers = vec![Container::new("C1", "c1.container", ContainerKind::Attached)];
        let payloads = vec![Payload::new("P1", "data.bin", "C1", payload)];

        let messaging = MessageCollector::new();
        messaging.write(Message::invalid_file_name(None, "earlier failure"));

        let command =
            PackageContainers::new(&messaging, temp.path(), temp.path(), CompressionLevel::Medium);
        command.execute(&mut containers, &payloads).unwrap();

        // Addressing still happened, but nothing was written to disk.
        assert_eq!(containers[0].attached_index, Some(1));
        assert!(containers[0].hash.is_none());
        assert!(!containers[0].working_path.as_ref().unwrap().exists());
    }

    #[test]
    fn unwritable_container_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let payload = write_payload(temp.path(), "data.bin", b"payload");

        let missing = temp.path().join("does-not-exist");
        let mut containers = vec![Container::new("C1", "c1.container", ContainerKind::Attached)];
        let payloads = vec![Payload::new("P1", "data.bin", "C1", payload)];

        let messaging = MessageCollector::new();
        let command =
            PackageContainers::new(&messaging, &missing, temp.path(), CompressionLevel::Medium);
        let result = command.execute(&mut containers, &payloads);

        assert!(matches!(result, Err(Error::ContainerWrite { .. })));
    }

    #[test]
    fn compression_level_changes_artifact_size() {
        let temp = tempfile::tempdir().unwrap();
        let payload = write_payload(temp.path(), "data.bin", &[42u8; 16384]);

        let mut sizes = Vec::new();
        for (folder, level) in [("stored", CompressionLevel::None), ("packed", CompressionLevel::Max)] {
            let intermediate = temp.path().join(folder);
            std::fs::create_dir_all(&intermediate).unwrap();

            let mut containers =
                vec![Container::new("C1", "c1.container", ContainerKind::Attached)];
            let payloads = vec![Payload::new("P1", "data.bin", "C1", payload.clone())];

            let messaging = MessageCollector::new();
            let command =
                PackageContainers::new(&messaging, &intermediate, temp.path(), level);
            command.execute(&mut containers, &payloads).unwrap();
            sizes.push(containers[0].size.unwrap());
        }

        assert!(sizes[1] < sizes[0]);
    }
}
