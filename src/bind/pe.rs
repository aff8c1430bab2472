//! Production metadata probe backed by PE parsing.
//!
//! Reads the three kinds of physical metadata the resolver needs straight
//! from the staged files:
//!
//! - **Version resources**: walks the PE resource directory to the
//!   `VS_FIXEDFILEINFO` block for the four-part file version, and to the
//!   `VarFileInfo\Translation` block for the language id list.
//! - **Managed assembly identity**: follows the CLR runtime header to the
//!   metadata root, sizes the metadata tables, and reads the assembly row
//!   (name, version, culture, public key) plus the strong-name flag.
//! - **Native assembly identity**: parses the `assemblyIdentity` element of
//!   a side-by-side manifest document.
//!
//! Files that are not PE images simply have no version and no identity; that
//! is a normal outcome for payload files, not an error.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use md5::Md5;
use memmap2::Mmap;
use quick_xml::events::Event;
use quick_xml::Reader;
use sha1::{Digest, Sha1};

use crate::bind::{FileHash, FileMetadataProbe, ManagedIdentity, ManifestIdentity, VersionInfo};
use crate::filesystem::validated_full_path;
use crate::Result;

bitflags::bitflags! {
    /// Flags of the CLR runtime header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct CorFlags: u32 {
        /// Image contains only IL code.
        const IL_ONLY = 0x0000_0001;
        /// Image requires a 32-bit process.
        const REQUIRES_32BIT = 0x0000_0002;
        /// Image has a strong-name signature.
        const STRONG_NAME_SIGNED = 0x0000_0008;
        /// Image prefers to run 32-bit when possible.
        const PREFERS_32BIT = 0x0002_0000;
    }
}

const RT_VERSION: u32 = 16;
const FIXED_FILE_INFO_SIGNATURE: u32 = 0xFEEF_04BD;
const METADATA_SIGNATURE: u32 = 0x424A_5342;
const ASSEMBLY_TABLE: usize = 0x20;

/// [`FileMetadataProbe`] implementation reading real files on the build
/// machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct PeMetadataProbe;

impl PeMetadataProbe {
    /// Creates a probe.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl FileMetadataProbe for PeMetadataProbe {
    fn canonicalize(&self, path: &Path) -> Option<PathBuf> {
        validated_full_path(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn version_info(&self, path: &Path) -> Result<VersionInfo> {
        let file = std::fs::File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(VersionInfo::default());
        }

        let mmap = unsafe { Mmap::map(&file)? };

        // Non-PE files and files without a version resource have no version;
        // that is the common case for plain payload files.
        Ok(read_version_info(&mmap).unwrap_or_default())
    }

    fn file_hash(&self, path: &Path) -> Result<FileHash> {
        let file = std::fs::File::open(path)?;
        let digest = if file.metadata()?.len() == 0 {
            Md5::new().finalize()
        } else {
            let mmap = unsafe { Mmap::map(&file)? };
            Md5::digest(&mmap[..])
        };

        Ok(FileHash::from_digest(digest.into()))
    }

    fn managed_identity(
        &self,
        path: &Path,
        file_version: Option<&str>,
    ) -> Result<ManagedIdentity> {
        let file = std::fs::File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        read_managed_identity(&mmap, file_version)
    }

    fn manifest_identity(&self, path: &Path) -> Result<ManifestIdentity> {
        let text = std::fs::read_to_string(path)?;
        parse_manifest(&text)
    }
}

// ------------------------------------------------------------------------
// Bounds-checked little-endian reads
// ------------------------------------------------------------------------

fn read_u16(data: &[u8], offset: usize) -> Result<u16> {
    match data.get(offset..offset + 2) {
        Some(bytes) => Ok(u16::from_le_bytes([bytes[0], bytes[1]])),
        None => Err(malformed_error!("Read past the end of the image data")),
    }
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    match data.get(offset..offset + 4) {
        Some(bytes) => Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        None => Err(malformed_error!("Read past the end of the image data")),
    }
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64> {
    let low = u64::from(read_u32(data, offset)?);
    let high = u64::from(read_u32(data, offset + 4)?);
    Ok(low | (high << 32))
}

fn align4(value: usize) -> usize {
    (value + 3) & !3
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut result = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(result, "{byte:02x}");
    }
    result
}

// ------------------------------------------------------------------------
// Version resources
// ------------------------------------------------------------------------

fn rva_to_offset(rva: u32, sections: &[goblin::pe::section_table::SectionTable]) -> Option<usize> {
    for section in sections {
        let span = section.virtual_size.max(section.size_of_raw_data);
        if rva >= section.virtual_address && rva < section.virtual_address.checked_add(span)? {
            let delta = rva - section.virtual_address;
            if delta < section.size_of_raw_data {
                return Some(section.pointer_to_raw_data as usize + delta as usize);
            }
            return None;
        }
    }

    None
}

fn read_version_info(data: &[u8]) -> Option<VersionInfo> {
    let pe = goblin::pe::PE::parse(data).ok()?;
    let directory = *pe.header.optional_header?.data_directories.get_resource_table()?;
    let resource_base = rva_to_offset(directory.virtual_address, &pe.sections)?;

    let (rva, size) = find_version_data(data, resource_base)?;
    let offset = rva_to_offset(rva, &pe.sections)?;
    let block = data.get(offset..offset + size as usize)?;

    parse_version_block(block)
}

/// Finds one resource directory entry, either by id or the first available.
fn resource_entry(data: &[u8], dir_offset: usize, want_id: Option<u32>) -> Option<u32> {
    let named = read_u16(data, dir_offset + 12).ok()? as usize;
    let ids = read_u16(data, dir_offset + 14).ok()? as usize;

    for index in 0..named + ids {
        let entry = dir_offset + 16 + index * 8;
        let name = read_u32(data, entry).ok()?;
        let offset = read_u32(data, entry + 4).ok()?;

        match want_id {
            Some(id) => {
                if name & 0x8000_0000 == 0 && name == id {
                    return Some(offset);
                }
            }
            None => return Some(offset),
        }
    }

    None
}

/// Walks type -> name -> language to the version resource's data entry.
fn find_version_data(data: &[u8], resource_base: usize) -> Option<(u32, u32)> {
    let by_type = resource_entry(data, resource_base, Some(RT_VERSION))?;
    if by_type & 0x8000_0000 == 0 {
        return None;
    }

    let by_name = resource_entry(data, resource_base + (by_type & 0x7FFF_FFFF) as usize, None)?;
    if by_name & 0x8000_0000 == 0 {
        return None;
    }

    let by_language =
        resource_entry(data, resource_base + (by_name & 0x7FFF_FFFF) as usize, None)?;
    if by_language & 0x8000_0000 != 0 {
        return None;
    }

    let entry = resource_base + by_language as usize;
    let rva = read_u32(data, entry).ok()?;
    let size = read_u32(data, entry + 4).ok()?;
    Some((rva, size))
}

fn read_utf16_key(data: &[u8], offset: &mut usize) -> Option<String> {
    let mut units = Vec::new();

    loop {
        let unit = read_u16(data, *offset).ok()?;
        *offset += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }

    Some(widestring::U16Str::from_slice(&units).to_string_lossy())
}

/// Parses a `VS_VERSIONINFO` block into version and language.
pub(crate) fn parse_version_block(block: &[u8]) -> Option<VersionInfo> {
    let total = (read_u16(block, 0).ok()? as usize).min(block.len());
    let value_length = read_u16(block, 2).ok()? as usize;

    let mut offset = 6;
    let key = read_utf16_key(block, &mut offset)?;
    if key != "VS_VERSION_INFO" {
        return None;
    }
    offset = align4(offset);

    let mut version = None;
    if value_length >= 52 && read_u32(block, offset).ok()? == FIXED_FILE_INFO_SIGNATURE {
        let version_ms = read_u32(block, offset + 8).ok()?;
        let version_ls = read_u32(block, offset + 12).ok()?;
        version = Some(format!(
            "{}.{}.{}.{}",
            version_ms >> 16,
            version_ms & 0xFFFF,
            version_ls >> 16,
            version_ls & 0xFFFF
        ));
    }
    offset = align4(offset + value_length);

    let mut languages = Vec::new();
    while offset + 6 <= total {
        let child_length = read_u16(block, offset).ok()? as usize;
        if child_length == 0 {
            break;
        }

        let child_end = (offset + child_length).min(total);
        let mut cursor = offset + 6;
        if let Some(child_key) = read_utf16_key(block, &mut cursor) {
            if child_key == "VarFileInfo" {
                collect_translations(block, align4(cursor), child_end, &mut languages);
            }
        }

        offset = align4(offset + child_length);
    }

    let language = if languages.is_empty() {
        None
    } else {
        Some(languages.join(","))
    };

    // Without a version there is no meaningful language.
    if version.is_none() {
        return Some(VersionInfo::default());
    }

    Some(VersionInfo { version, language })
}

fn collect_translations(block: &[u8], mut offset: usize, end: usize, languages: &mut Vec<String>) {
    while offset + 6 <= end {
        let length = match read_u16(block, offset) {
            Ok(length) => length as usize,
            Err(_) => return,
        };
        if length == 0 {
            return;
        }

        let value_length = match read_u16(block, offset + 2) {
            Ok(value_length) => value_length as usize,
            Err(_) => return,
        };

        let mut cursor = offset + 6;
        let key = read_utf16_key(block, &mut cursor);
        if key.as_deref() == Some("Translation") {
            let mut value = align4(cursor);
            let value_end = (value + value_length).min(end);
            while value + 4 <= value_end {
                if let Ok(language_id) = read_u16(block, value) {
                    languages.push(language_id.to_string());
                }
                value += 4;
            }
        }

        offset = align4(offset + length);
    }
}

// ------------------------------------------------------------------------
// Managed assembly identity
// ------------------------------------------------------------------------

struct MetadataRoot {
    tables: usize,
    strings: usize,
    blobs: usize,
}

fn read_managed_identity(data: &[u8], file_version: Option<&str>) -> Result<ManagedIdentity> {
    let pe = goblin::pe::PE::parse(data)?;
    let optional_header = pe
        .header
        .optional_header
        .ok_or_else(|| malformed_error!("Image has no optional header"))?;
    let clr_directory = optional_header
        .data_directories
        .get_clr_runtime_header()
        .ok_or_else(|| malformed_error!("Image has no CLR runtime header"))?;
    let clr_offset = rva_to_offset(clr_directory.virtual_address, &pe.sections)
        .ok_or_else(|| malformed_error!("CLR runtime header points outside the image"))?;

    let metadata_rva = read_u32(data, clr_offset + 8)?;
    let flags = CorFlags::from_bits_truncate(read_u32(data, clr_offset + 16)?);
    let metadata_offset = rva_to_offset(metadata_rva, &pe.sections)
        .ok_or_else(|| malformed_error!("Metadata root points outside the image"))?;

    let root = read_metadata_root(data, metadata_offset)?;
    let (version, name, culture, public_key) = read_assembly_row(data, &root)?;

    let public_key_token = if public_key.is_empty() {
        None
    } else {
        Some(public_key_token(&public_key))
    };

    Ok(ManagedIdentity {
        name: Some(name),
        culture: Some(if culture.is_empty() {
            "neutral".to_string()
        } else {
            culture
        }),
        version: Some(version),
        architecture: architecture(pe.header.coff_header.machine, flags),
        strong_named: flags.contains(CorFlags::STRONG_NAME_SIGNED) && public_key_token.is_some(),
        public_key_token,
        file_version: file_version.map(ToString::to_string),
    })
}

fn read_metadata_root(data: &[u8], offset: usize) -> Result<MetadataRoot> {
    if read_u32(data, offset)? != METADATA_SIGNATURE {
        return Err(malformed_error!("Invalid metadata root signature"));
    }

    let version_length = read_u32(data, offset + 12)? as usize;
    let streams_offset = offset + 16 + version_length;
    let stream_count = read_u16(data, streams_offset + 2)? as usize;

    let mut tables = None;
    let mut strings = None;
    let mut blobs = None;

    let mut cursor = streams_offset + 4;
    for _ in 0..stream_count {
        let stream_offset = read_u32(data, cursor)? as usize;
        let _stream_size = read_u32(data, cursor + 4)?;
        cursor += 8;

        // Stream names are ASCII, null terminated, padded to four bytes.
        let name_start = cursor;
        let mut name_end = cursor;
        while *data
            .get(name_end)
            .ok_or_else(|| malformed_error!("Read past the end of the image data"))?
            != 0
        {
            name_end += 1;
        }
        let name = String::from_utf8_lossy(&data[name_start..name_end]);
        cursor = name_start + align4(name_end - name_start + 1);

        match name.as_ref() {
            "#~" | "#-" => tables = Some(offset + stream_offset),
            "#Strings" => strings = Some(offset + stream_offset),
            "#Blob" => blobs = Some(offset + stream_offset),
            _ => {}
        }
    }

    Ok(MetadataRoot {
        tables: tables.ok_or_else(|| malformed_error!("Metadata has no tables stream"))?,
        strings: strings.ok_or_else(|| malformed_error!("Metadata has no strings heap"))?,
        blobs: blobs.ok_or_else(|| malformed_error!("Metadata has no blob heap"))?,
    })
}

struct HeapSizes {
    large_strings: bool,
    large_guids: bool,
    large_blobs: bool,
}

fn index_size(rows: &[u32; 64], table: usize) -> usize {
    if rows[table] > 0xFFFF {
        4
    } else {
        2
    }
}

fn coded_size(rows: &[u32; 64], bits: u32, tables: &[usize]) -> usize {
    let limit = 1u32 << (16 - bits);
    if tables.iter().any(|&table| rows[table] >= limit) {
        4
    } else {
        2
    }
}

const TYPE_DEF_OR_REF: &[usize] = &[0x02, 0x01, 0x1B];
const HAS_CUSTOM_ATTRIBUTE: &[usize] = &[
    0x06, 0x04, 0x01, 0x02, 0x08, 0x09, 0x0A, 0x00, 0x0E, 0x17, 0x14, 0x11, 0x1A, 0x1B, 0x20,
    0x23, 0x26, 0x27, 0x28, 0x2A, 0x2C, 0x2B,
];

/// Size in bytes of one row of table `id`, given the row counts and heap
/// index sizes of the image.
fn row_size(id: usize, rows: &[u32; 64], heaps: &HeapSizes) -> usize {
    let s = if heaps.large_strings { 4 } else { 2 };
    let g = if heaps.large_guids { 4 } else { 2 };
    let b = if heaps.large_blobs { 4 } else { 2 };
    let t = |table: usize| index_size(rows, table);
    let c = |bits: u32, tables: &[usize]| coded_size(rows, bits, tables);

    match id {
        0x00 => 2 + s + 3 * g,                                          // Module
        0x01 => c(2, &[0x00, 0x1A, 0x23, 0x01]) + 2 * s,                // TypeRef
        0x02 => 4 + 2 * s + c(2, TYPE_DEF_OR_REF) + t(0x04) + t(0x06),  // TypeDef
        0x03 => t(0x04),                                                // FieldPtr
        0x04 => 2 + s + b,                                              // Field
        0x05 => t(0x06),                                                // MethodPtr
        0x06 => 8 + s + b + t(0x08),                                    // MethodDef
        0x07 => t(0x08),                                                // ParamPtr
        0x08 => 4 + s,                                                  // Param
        0x09 => t(0x02) + c(2, TYPE_DEF_OR_REF),                        // InterfaceImpl
        0x0A => c(3, &[0x02, 0x01, 0x1A, 0x06, 0x1B]) + s + b,          // MemberRef
        0x0B => 2 + c(2, &[0x04, 0x08, 0x17]) + b,                      // Constant
        0x0C => c(5, HAS_CUSTOM_ATTRIBUTE) + c(3, &[0x06, 0x0A]) + b,   // CustomAttribute
        0x0D => c(1, &[0x04, 0x08]) + b,                                // FieldMarshal
        0x0E => 2 + c(2, &[0x02, 0x06, 0x20]) + b,                      // DeclSecurity
        0x0F => 6 + t(0x02),                                            // ClassLayout
        0x10 => 4 + t(0x04),                                            // FieldLayout
        0x11 => b,                                                      // StandAloneSig
        0x12 => t(0x02) + t(0x14),                                      // EventMap
        0x13 => t(0x14),                                                // EventPtr
        0x14 => 2 + s + c(2, TYPE_DEF_OR_REF),                          // Event
        0x15 => t(0x02) + t(0x17),                                      // PropertyMap
        0x16 => t(0x17),                                                // PropertyPtr
        0x17 => 2 + s + b,                                              // Property
        0x18 => 2 + t(0x06) + c(1, &[0x14, 0x17]),                      // MethodSemantics
        0x19 => t(0x02) + c(1, &[0x06, 0x0A]) + c(1, &[0x06, 0x0A]),    // MethodImpl
        0x1A => s,                                                      // ModuleRef
        0x1B => b,                                                      // TypeSpec
        0x1C => 2 + c(1, &[0x04, 0x06]) + s + t(0x1A),                  // ImplMap
        0x1D => 4 + t(0x04),                                            // FieldRVA
        0x1E => 8,                                                      // EncLog
        0x1F => 4,                                                      // EncMap
        0x20 => 16 + b + 2 * s,                                         // Assembly
        _ => 0,
    }
}

fn read_assembly_row(data: &[u8], root: &MetadataRoot) -> Result<(String, String, String, Vec<u8>)> {
    let heap_sizes = data
        .get(root.tables + 6)
        .copied()
        .ok_or_else(|| malformed_error!("Read past the end of the image data"))?;
    let heaps = HeapSizes {
        large_strings: heap_sizes & 0x01 != 0,
        large_guids: heap_sizes & 0x02 != 0,
        large_blobs: heap_sizes & 0x04 != 0,
    };

    let valid = read_u64(data, root.tables + 8)?;
    if valid & (1u64 << ASSEMBLY_TABLE) == 0 {
        return Err(malformed_error!("Image has no assembly table"));
    }

    let mut rows = [0u32; 64];
    let mut cursor = root.tables + 24;
    for (id, count) in rows.iter_mut().enumerate() {
        if valid & (1u64 << id) != 0 {
            *count = read_u32(data, cursor)?;
            cursor += 4;
        }
    }

    // The assembly row follows every earlier table's rows.
    for id in 0..ASSEMBLY_TABLE {
        cursor += rows[id] as usize * row_size(id, &rows, &heaps);
    }

    let _hash_algorithm = read_u32(data, cursor)?;
    let major = read_u16(data, cursor + 4)?;
    let minor = read_u16(data, cursor + 6)?;
    let build = read_u16(data, cursor + 8)?;
    let revision = read_u16(data, cursor + 10)?;
    let _flags = read_u32(data, cursor + 12)?;
    let mut cursor = cursor + 16;

    let public_key_index = read_heap_index(data, &mut cursor, heaps.large_blobs)?;
    let name_index = read_heap_index(data, &mut cursor, heaps.large_strings)?;
    let culture_index = read_heap_index(data, &mut cursor, heaps.large_strings)?;

    let version = format!("{major}.{minor}.{build}.{revision}");
    let name = read_string(data, root.strings + name_index)?;
    let culture = read_string(data, root.strings + culture_index)?;
    let public_key = read_blob(data, root.blobs + public_key_index)?;

    Ok((version, name, culture, public_key))
}

fn read_heap_index(data: &[u8], offset: &mut usize, large: bool) -> Result<usize> {
    let value = if large {
        let value = read_u32(data, *offset)? as usize;
        *offset += 4;
        value
    } else {
        let value = read_u16(data, *offset)? as usize;
        *offset += 2;
        value
    };

    Ok(value)
}

fn read_string(data: &[u8], offset: usize) -> Result<String> {
    let mut end = offset;
    while *data
        .get(end)
        .ok_or_else(|| malformed_error!("Read past the end of the image data"))?
        != 0
    {
        end += 1;
    }

    Ok(String::from_utf8_lossy(&data[offset..end]).into_owned())
}

/// Decodes a blob-heap entry: a compressed length prefix followed by bytes.
pub(crate) fn read_blob(data: &[u8], offset: usize) -> Result<Vec<u8>> {
    let first = *data
        .get(offset)
        .ok_or_else(|| malformed_error!("Read past the end of the image data"))?;

    let (length, header) = if first & 0x80 == 0 {
        (first as usize, 1)
    } else if first & 0xC0 == 0x80 {
        let second = *data
            .get(offset + 1)
            .ok_or_else(|| malformed_error!("Read past the end of the image data"))?;
        ((((first & 0x3F) as usize) << 8) | second as usize, 2)
    } else if first & 0xE0 == 0xC0 {
        let value = read_u32(data, offset)?.swap_bytes();
        ((value & 0x1FFF_FFFF) as usize, 4)
    } else {
        return Err(malformed_error!("Invalid blob length prefix"));
    };

    data.get(offset + header..offset + header + length)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| malformed_error!("Blob extends past the end of the image data"))
}

/// Derives the strong-name token from a public key: the low eight bytes of
/// its SHA1 digest, reversed, as lowercase hex.
pub(crate) fn public_key_token(public_key: &[u8]) -> String {
    let digest = Sha1::digest(public_key);
    let mut token: Vec<u8> = digest[digest.len() - 8..].to_vec();
    token.reverse();
    hex_lower(&token)
}

fn architecture(machine: u16, flags: CorFlags) -> Option<String> {
    let name = match machine {
        0x8664 => "amd64",
        0xAA64 => "arm64",
        0x01C0 | 0x01C4 => "arm",
        0x014C => {
            if flags.contains(CorFlags::IL_ONLY) && !flags.contains(CorFlags::REQUIRES_32BIT) {
                "MSIL"
            } else {
                "x86"
            }
        }
        _ => return None,
    };

    Some(name.to_string())
}

// ------------------------------------------------------------------------
// Native assembly manifests
// ------------------------------------------------------------------------

/// Parses the first `assemblyIdentity` element of a side-by-side manifest.
pub(crate) fn parse_manifest(text: &str) -> Result<ManifestIdentity> {
    let mut reader = Reader::from_str(text);

    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed_error!("Invalid manifest document: {}", e))?;

        match event {
            Event::Start(element) | Event::Empty(element)
                if element.local_name().as_ref() == b"assemblyIdentity" =>
            {
                let mut identity = ManifestIdentity::default();

                for attr in element.attributes() {
                    let attr =
                        attr.map_err(|e| malformed_error!("Invalid manifest attribute: {}", e))?;
                    let value = attr
                        .unescape_value()
                        .map_err(|e| malformed_error!("Invalid manifest attribute value: {}", e))?
                        .into_owned();

                    match attr.key.local_name().as_ref() {
                        b"name" => identity.name = Some(value),
                        b"version" => identity.version = Some(value),
                        b"type" => identity.kind = Some(value),
                        b"processorArchitecture" => identity.architecture = Some(value),
                        b"publicKeyToken" => identity.public_key_token = Some(value),
                        _ => {}
                    }
                }

                return Ok(identity);
            }
            Event::Eof => {
                return Err(malformed_error!(
                    "Manifest document has no assemblyIdentity element"
                ))
            }
            _ => {}
        }
    }
}
