//! On-disk record parsing for GGPK archives.
//!
//! A GGPK file is a flat sequence of length-prefixed records addressed by
//! absolute offset: one `GGPK` header record at offset 0, `PDIR` directory
//! records, `FILE` records carrying their data inline, and `FREE` records
//! marking reclaimed space. All integers are little-endian; names are
//! UTF-16LE (UTF-32LE for version 4 archives) with a trailing NUL.

use std::io::Read;

use byteorder::{ReadBytesExt, LE};

use super::ext::ReadExt;
use super::Error;

pub const GGPK_TAG: [u8; 4] = *b"GGPK";
pub const DIRECTORY_TAG: [u8; 4] = *b"PDIR";
pub const FILE_TAG: [u8; 4] = *b"FILE";
pub const FREE_TAG: [u8; 4] = *b"FREE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTag {
    Ggpk,
    Directory,
    File,
    Free,
}

impl RecordTag {
    pub fn from_bytes(tag: [u8; 4]) -> Option<Self> {
        match tag {
            GGPK_TAG => Some(RecordTag::Ggpk),
            DIRECTORY_TAG => Some(RecordTag::Directory),
            FILE_TAG => Some(RecordTag::File),
            FREE_TAG => Some(RecordTag::Free),
            _ => None,
        }
    }
}

/// The `length | tag` prefix every record starts with.
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    pub length: u32,
    pub tag: RecordTag,
}

impl RecordHeader {
    pub const SIZE: u64 = 8;

    pub fn read<R: Read>(reader: &mut R, offset: u64) -> Result<Self, Error> {
        let length = reader.read_u32::<LE>()?;
        let mut tag = [0; 4];
        reader.read_exact(&mut tag)?;
        let tag = RecordTag::from_bytes(tag).ok_or(Error::UnexpectedTag { offset, tag })?;
        Ok(Self { length, tag })
    }
}

/// Payload of the `GGPK` record at offset 0.
#[derive(Debug, Clone, Copy)]
pub struct GgpkHeader {
    pub version: u32,
    pub root_offset: u64,
    pub free_offset: u64,
}

impl GgpkHeader {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, Error> {
        Ok(Self {
            version: reader.read_u32::<LE>()?,
            root_offset: reader.read_u64::<LE>()?,
            free_offset: reader.read_u64::<LE>()?,
        })
    }
}

/// SHA-256 of a record's name plus content, stored opaque.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Sha256Hash(pub [u8; 32]);

impl std::fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sha256Hash({})", hex::encode(self.0))
    }
}

/// One `(name_hash, child_offset)` pair inside a directory record.
///
/// Entries are stored sorted by `name_hash` ascending. The hash algorithm is
/// internal to the archive writer and not reproduced here; lookups compare
/// child names instead.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryEntry {
    pub name_hash: u32,
    pub offset: u64,
}

#[derive(Debug)]
pub struct DirectoryRecord {
    pub name: String,
    pub hash: Sha256Hash,
    pub entries: Vec<DirectoryEntry>,
}

impl DirectoryRecord {
    /// Parse the payload following the record header. `offset` and `length`
    /// are those of the whole record and are used for bounds checks only.
    pub fn read<R: Read>(
        reader: &mut R,
        offset: u64,
        length: u32,
        version: u32,
    ) -> Result<Self, Error> {
        let name_units = reader.read_u32::<LE>()?;
        let entry_count = reader.read_u32::<LE>()?;
        let hash = Sha256Hash(reader.read_sha256()?);

        let fixed = RecordHeader::SIZE + 4 + 4 + 32;
        let name_bytes = name_units as u64 * name_unit_size(version);
        let entry_bytes = entry_count as u64 * 12;
        if fixed + name_bytes + entry_bytes > length as u64 {
            return Err(Error::CorruptRecord {
                offset,
                reason: "directory name and entries exceed record length",
            });
        }

        let name = read_name(reader, name_units, version)?;
        let mut entries = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            entries.push(DirectoryEntry {
                name_hash: reader.read_u32::<LE>()?,
                offset: reader.read_u64::<LE>()?,
            });
        }
        Ok(Self { name, hash, entries })
    }
}

#[derive(Debug)]
pub struct FileRecord {
    pub name: String,
    pub hash: Sha256Hash,
    /// Absolute offset of the file's data within the archive.
    pub data_offset: u64,
    pub data_size: u64,
}

impl FileRecord {
    pub fn read<R: Read>(
        reader: &mut R,
        offset: u64,
        length: u32,
        version: u32,
    ) -> Result<Self, Error> {
        let name_units = reader.read_u32::<LE>()?;
        let hash = Sha256Hash(reader.read_sha256()?);

        let header_len = RecordHeader::SIZE + 4 + 32 + name_units as u64 * name_unit_size(version);
        if header_len > length as u64 {
            return Err(Error::CorruptRecord {
                offset,
                reason: "file name exceeds record length",
            });
        }

        let name = read_name(reader, name_units, version)?;
        Ok(Self {
            name,
            hash,
            data_offset: offset + header_len,
            data_size: length as u64 - header_len,
        })
    }
}

fn name_unit_size(version: u32) -> u64 {
    if version == 4 {
        4
    } else {
        2
    }
}

fn read_name<R: Read>(reader: &mut R, units: u32, version: u32) -> Result<String, Error> {
    if version == 4 {
        reader.read_utf32(units)
    } else {
        reader.read_utf16(units)
    }
}
