//! The bundle codec: chunked, Oodle-compressed blobs with a 60-byte header.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use log::debug;

use super::ext::ReadExt;
use super::index::BundleRecord;
use super::{oodle, Compressor, Error};

pub const HEADER_SIZE: u64 = 60;
const MAX_CHUNK_COUNT: i32 = 1_000_000;
const DEFAULT_CHUNK_SIZE: i32 = 262_144;

/// The fixed 60-byte header at the start of every `.bundle.bin` file.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundleHeader {
    pub uncompressed_size: i32,
    pub compressed_size: i32,
    /// `48 + chunk_count * 4`; the offset of the first chunk payload
    /// relative to the end of the size fields.
    pub head_size: i32,
    pub compressor: i32,
    pub unknown1: i32,
    pub uncompressed_size_long: i64,
    pub compressed_size_long: i64,
    pub chunk_count: i32,
    /// Uncompressed granularity of every chunk but the last.
    pub chunk_size: i32,
    pub unknown2: [i32; 4],
}

impl BundleHeader {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, Error> {
        let mut header = Self {
            uncompressed_size: reader.read_i32::<LE>()?,
            compressed_size: reader.read_i32::<LE>()?,
            head_size: reader.read_i32::<LE>()?,
            compressor: reader.read_i32::<LE>()?,
            unknown1: reader.read_i32::<LE>()?,
            uncompressed_size_long: reader.read_i64::<LE>()?,
            compressed_size_long: reader.read_i64::<LE>()?,
            chunk_count: reader.read_i32::<LE>()?,
            chunk_size: reader.read_i32::<LE>()?,
            unknown2: [0; 4],
        };
        for slot in &mut header.unknown2 {
            *slot = reader.read_i32::<LE>()?;
        }
        Ok(header)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        writer.write_i32::<LE>(self.uncompressed_size)?;
        writer.write_i32::<LE>(self.compressed_size)?;
        writer.write_i32::<LE>(self.head_size)?;
        writer.write_i32::<LE>(self.compressor)?;
        writer.write_i32::<LE>(self.unknown1)?;
        writer.write_i64::<LE>(self.uncompressed_size_long)?;
        writer.write_i64::<LE>(self.compressed_size_long)?;
        writer.write_i32::<LE>(self.chunk_count)?;
        writer.write_i32::<LE>(self.chunk_size)?;
        for slot in &self.unknown2 {
            writer.write_i32::<LE>(*slot)?;
        }
        Ok(())
    }

    /// The known compressor selector, if any. Unknown selectors are legal
    /// and handed to the decompressor as-is.
    pub fn compressor(&self) -> Option<Compressor> {
        Compressor::from_repr(self.compressor)
    }

    fn validate(&self) -> Result<(), Error> {
        if !(0..=MAX_CHUNK_COUNT).contains(&self.chunk_count) {
            return Err(Error::InvalidHeaderField {
                field: "chunk_count",
                value: self.chunk_count as i64,
            });
        }
        if self.uncompressed_size < 0 {
            return Err(Error::InvalidHeaderField {
                field: "uncompressed_size",
                value: self.uncompressed_size as i64,
            });
        }
        if self.head_size != 48 + self.chunk_count * 4 {
            return Err(Error::InvalidHeaderField {
                field: "head_size",
                value: self.head_size as i64,
            });
        }
        if self.uncompressed_size_long != self.uncompressed_size as i64 {
            return Err(Error::InvalidHeaderField {
                field: "uncompressed_size_long",
                value: self.uncompressed_size_long,
            });
        }
        Ok(())
    }

    fn last_chunk_uncompressed_size(&self) -> i64 {
        if self.chunk_count == 0 {
            return 0;
        }
        self.uncompressed_size as i64 - self.chunk_size as i64 * (self.chunk_count as i64 - 1)
    }
}

/// An opened bundle. Decompression happens once, on the first `read_full`
/// or `read_at`, into a memoized whole-body buffer.
#[derive(Debug)]
pub struct Bundle<R> {
    reader: Option<R>,
    header: BundleHeader,
    compressed_chunk_sizes: Vec<i32>,
    data_offset: u64,
    cache: Option<Vec<u8>>,
}

pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Type-erased bundle, the shape [`BundleFactory`] deals in.
pub type DynBundle = Bundle<Box<dyn ReadSeek>>;

impl Bundle<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek> Bundle<R> {
    /// Parse the header and chunk-size table; no chunk data is read yet.
    pub fn from_reader(mut reader: R) -> Result<Self, Error> {
        let header = BundleHeader::read(&mut reader)?;
        header.validate()?;
        match header.compressor() {
            Some(compressor) => debug!(
                "bundle: {} chunks, {} -> {} bytes, {compressor}",
                header.chunk_count, header.compressed_size, header.uncompressed_size,
            ),
            None => debug!(
                "bundle: {} chunks, unrecognized compressor {}",
                header.chunk_count, header.compressor,
            ),
        }

        let mut compressed_chunk_sizes = Vec::with_capacity(header.chunk_count as usize);
        for _ in 0..header.chunk_count {
            let size = reader.read_i32::<LE>()?;
            if size < 0 {
                return Err(Error::InvalidHeaderField {
                    field: "compressed chunk size",
                    value: size as i64,
                });
            }
            compressed_chunk_sizes.push(size);
        }
        let data_offset = reader.stream_position()?;

        Ok(Self {
            reader: Some(reader),
            header,
            compressed_chunk_sizes,
            data_offset,
            cache: None,
        })
    }

    pub fn header(&self) -> &BundleHeader {
        &self.header
    }

    pub fn compressed_chunk_sizes(&self) -> &[i32] {
        &self.compressed_chunk_sizes
    }

    /// Decompress the whole bundle body. The result is memoized; later
    /// calls return the cached buffer without touching the source.
    pub fn read_full(&mut self) -> Result<&[u8], Error> {
        if self.cache.is_none() {
            let data = self.decompress_all()?;
            self.cache = Some(data);
        }
        Ok(self.cache.as_deref().unwrap_or_default())
    }

    /// A window of the uncompressed body.
    pub fn read_at(&mut self, offset: u64, size: u64) -> Result<Vec<u8>, Error> {
        let uncompressed = self.header.uncompressed_size as u64;
        let end = offset
            .checked_add(size)
            .filter(|&end| end <= uncompressed)
            .ok_or(Error::OutOfBounds {
                offset,
                size,
                len: uncompressed,
            })?;
        if size == 0 {
            return Ok(Vec::new());
        }
        let full = self.read_full()?;
        Ok(full[offset as usize..end as usize].to_vec())
    }

    /// Drop the byte source and the decompressed cache. Further reads fail
    /// with [`Error::AlreadyClosed`].
    pub fn close(&mut self) {
        self.reader = None;
        self.cache = None;
    }

    fn decompress_all(&mut self) -> Result<Vec<u8>, Error> {
        let header = self.header;
        if header.uncompressed_size == 0 {
            return Ok(Vec::new());
        }
        if header.chunk_count == 0 {
            // nonzero body with no chunks to produce it
            return Err(Error::InvalidHeaderField {
                field: "chunk_count",
                value: 0,
            });
        }
        let last_target = header.last_chunk_uncompressed_size();
        if last_target <= 0 {
            return Err(Error::InvalidHeaderField {
                field: "chunk_size",
                value: header.chunk_size as i64,
            });
        }

        let reader = self.reader.as_mut().ok_or(Error::AlreadyClosed)?;
        let compressor = header.compressor();
        let mut out = Vec::with_capacity(header.uncompressed_size as usize);
        let mut chunk_offset = self.data_offset;

        for (i, &compressed_size) in self.compressed_chunk_sizes.iter().enumerate() {
            let target = if i + 1 == self.compressed_chunk_sizes.len() {
                last_target as usize
            } else {
                header.chunk_size as usize
            };

            if target == 0 {
                if compressed_size != 0 {
                    return Err(Error::DecompressedSizeMismatch {
                        expected: 0,
                        got: compressed_size as u64,
                    });
                }
                continue;
            }
            if compressed_size == 0 {
                return Err(Error::DecompressedSizeMismatch {
                    expected: target as u64,
                    got: 0,
                });
            }

            reader.seek(SeekFrom::Start(chunk_offset))?;
            let chunk = reader.read_len(compressed_size as usize)?;

            match compressor {
                Some(Compressor::None) => {
                    if compressed_size as usize != target {
                        return Err(Error::DecompressedSizeMismatch {
                            expected: target as u64,
                            got: compressed_size as u64,
                        });
                    }
                    out.extend_from_slice(&chunk);
                }
                _ => {
                    let raw = oodle::decompress(&chunk, target)?;
                    if raw.len() != target {
                        return Err(Error::DecompressedSizeMismatch {
                            expected: target as u64,
                            got: raw.len() as u64,
                        });
                    }
                    out.extend_from_slice(&raw);
                }
            }
            chunk_offset += compressed_size as u64;
        }
        Ok(out)
    }
}

/// Policy for locating the data bundles an index refers to.
///
/// A single bundle instance is not reentrant; callers wanting parallel
/// reads obtain fresh instances here instead of sharing one.
pub trait BundleFactory {
    fn get_bundle(&self, record: &BundleRecord) -> Result<DynBundle, Error>;
    /// Writer path: create an empty, head-only bundle.
    fn create_bundle(&self, name: &str) -> Result<DynBundle, Error>;
    fn delete_bundle(&self, name: &str) -> Result<(), Error>;
}

/// Resolves `<base_dir>/<record.path>.bundle.bin` on the filesystem and
/// opens a fresh bundle per request.
pub struct DriveBundleFactory {
    base_dir: PathBuf,
}

impl DriveBundleFactory {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn bundle_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{name}.bundle.bin"))
    }
}

impl BundleFactory for DriveBundleFactory {
    fn get_bundle(&self, record: &BundleRecord) -> Result<DynBundle, Error> {
        let file = File::open(self.bundle_path(&record.path))?;
        Bundle::from_reader(Box::new(BufReader::new(file)) as Box<dyn ReadSeek>)
    }

    fn create_bundle(&self, name: &str) -> Result<DynBundle, Error> {
        let path = self.bundle_path(name);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let header = BundleHeader {
            head_size: 48,
            compressor: Compressor::Leviathan as i32,
            unknown1: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
            ..Default::default()
        };
        header.write(&mut File::create(&path)?)?;
        let file = File::open(&path)?;
        Bundle::from_reader(Box::new(BufReader::new(file)) as Box<dyn ReadSeek>)
    }

    fn delete_bundle(&self, name: &str) -> Result<(), Error> {
        Ok(std::fs::remove_file(self.bundle_path(name))?)
    }
}
