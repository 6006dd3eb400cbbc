//! The index reader: parses the `_.index.bin` manifest bundle into bundle,
//! file and directory tables and reconstructs file paths out of the
//! shared-prefix path dictionary at its tail.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use byteorder::{ReadBytesExt, LE};
use log::debug;

use super::bundle::{Bundle, BundleFactory, DriveBundleFactory};
use super::ext::ReadExt;
use super::hash;
use super::tree::DirectoryTree;
use super::Error;

const MURMUR64A_MAGIC: u64 = 0xF42A94E69CFF42FE;
const FNV1A64_MAGIC: u64 = 0x07E47507B4A92E53;
const MURMUR_SEED: u64 = 0x1337B33F;

/// Which path hash algorithm an index uses, decided by the first directory
/// record's `path_hash` at open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Murmur64A,
    CustomFnv1a64,
}

/// A data bundle listed in the index. `path` has no `.bundle.bin` suffix.
#[derive(Debug, Clone)]
pub struct BundleRecord {
    pub path: String,
    pub uncompressed_size: i32,
}

/// A file entry: where its bytes live inside which data bundle. The bundle
/// is referred to by index into [`Index::bundles`], never owned.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path_hash: u64,
    pub bundle_index: usize,
    pub offset: u32,
    pub size: u32,
    /// Derived by [`Index::parse_paths`]; `None` until then, and for the
    /// rare entries the dictionary does not cover.
    pub path: Option<String>,
}

/// A directory entry: a window into the trailing path-dictionary blob.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryRecord {
    pub path_hash: u64,
    pub offset: u32,
    pub size: u32,
    pub recursive_size: u32,
}

/// Parsed manifest bundle.
pub struct Index {
    bundles: Vec<BundleRecord>,
    files: HashMap<u64, FileRecord>,
    directories: Vec<DirectoryRecord>,
    directory_bundle_data: Vec<u8>,
    hash_algorithm: Option<HashAlgorithm>,
    paths_parsed: bool,
    factory: Box<dyn BundleFactory>,
}

impl Index {
    /// Open an index file, locating data bundles next to it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let base = path.parent().unwrap_or(Path::new("."));
        Self::open_with_factory(path, Box::new(DriveBundleFactory::new(base)))
    }

    pub fn open_with_factory<P: AsRef<Path>>(
        path: P,
        factory: Box<dyn BundleFactory>,
    ) -> Result<Self, Error> {
        let mut bundle = Bundle::open(path)?;
        Self::from_bundle(&mut bundle, factory)
    }

    /// Parse an index out of an already-opened manifest bundle.
    pub fn from_bundle<R: Read + Seek>(
        bundle: &mut Bundle<R>,
        factory: Box<dyn BundleFactory>,
    ) -> Result<Self, Error> {
        let data = bundle.read_full()?;
        let mut reader = Cursor::new(data);

        let bundle_count = read_count(&mut reader, "bundle count", 8)?;
        let mut bundles = Vec::with_capacity(bundle_count);
        for _ in 0..bundle_count {
            let path_len = reader.read_i32::<LE>()?;
            if !(0..=1024).contains(&path_len) {
                return Err(Error::InvalidHeaderField {
                    field: "bundle path length",
                    value: path_len as i64,
                });
            }
            let path_bytes = reader.read_len(path_len as usize)?;
            bundles.push(BundleRecord {
                path: String::from_utf8_lossy(&path_bytes).into_owned(),
                uncompressed_size: reader.read_i32::<LE>()?,
            });
        }

        let file_count = read_count(&mut reader, "file count", 20)?;
        let mut files = HashMap::with_capacity(file_count);
        for _ in 0..file_count {
            let path_hash = reader.read_u64::<LE>()?;
            let bundle_index = reader.read_i32::<LE>()?;
            if bundle_index < 0 || bundle_index as usize >= bundles.len() {
                return Err(Error::InvalidHeaderField {
                    field: "bundle index",
                    value: bundle_index as i64,
                });
            }
            let offset = read_size_field(&mut reader, "file offset")?;
            let size = read_size_field(&mut reader, "file size")?;
            files.insert(
                path_hash,
                FileRecord {
                    path_hash,
                    bundle_index: bundle_index as usize,
                    offset,
                    size,
                    path: None,
                },
            );
        }

        let dir_count = read_count(&mut reader, "directory count", 20)?;
        let mut directories = Vec::with_capacity(dir_count);
        for _ in 0..dir_count {
            directories.push(DirectoryRecord {
                path_hash: reader.read_u64::<LE>()?,
                offset: read_size_field(&mut reader, "directory offset")?,
                size: read_size_field(&mut reader, "directory size")?,
                recursive_size: read_size_field(&mut reader, "directory recursive size")?,
            });
        }

        let directory_bundle_data = data[reader.position() as usize..].to_vec();
        let hash_algorithm = directories.first().and_then(|d| match d.path_hash {
            MURMUR64A_MAGIC => Some(HashAlgorithm::Murmur64A),
            FNV1A64_MAGIC => Some(HashAlgorithm::CustomFnv1a64),
            _ => None,
        });
        debug!(
            "index: {} bundles, {} files, {} directories, {:?} hashing",
            bundles.len(),
            files.len(),
            directories.len(),
            hash_algorithm,
        );

        Ok(Self {
            bundles,
            files,
            directories,
            directory_bundle_data,
            hash_algorithm,
            paths_parsed: false,
            factory,
        })
    }

    pub fn bundles(&self) -> &[BundleRecord] {
        &self.bundles
    }

    pub fn files(&self) -> &HashMap<u64, FileRecord> {
        &self.files
    }

    pub fn directories(&self) -> &[DirectoryRecord] {
        &self.directories
    }

    /// Files stored in the data bundle at `bundle_index`.
    pub fn files_for_bundle(&self, bundle_index: usize) -> impl Iterator<Item = &FileRecord> {
        self.files
            .values()
            .filter(move |record| record.bundle_index == bundle_index)
    }

    pub fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        self.hash_algorithm
    }

    pub fn is_path_parsed(&self) -> bool {
        self.paths_parsed
    }

    /// Hash a path the way this index does. A trailing `/` never changes
    /// the result.
    pub fn name_hash(&self, path: &str) -> Result<u64, Error> {
        let algorithm = self.hash_algorithm.ok_or_else(|| {
            Error::UnknownHashAlgorithm(
                self.directories.first().map(|d| d.path_hash).unwrap_or(0),
            )
        })?;
        let path = path.strip_suffix('/').unwrap_or(path);
        Ok(match algorithm {
            HashAlgorithm::Murmur64A => {
                hash::murmur64a(path.to_ascii_lowercase().as_bytes(), MURMUR_SEED)
            }
            HashAlgorithm::CustomFnv1a64 => hash::fnv1a64_path(path.as_bytes()),
        })
    }

    /// Decode the path dictionary and attach the derived path to every file
    /// record it resolves. Idempotent; once parsed, returns `Ok(0)`.
    ///
    /// The return value counts dictionary paths that matched no file
    /// record. Structural decode errors (truncated stream, hashing failure)
    /// abort instead.
    pub fn parse_paths(&mut self) -> Result<usize, Error> {
        if self.paths_parsed {
            return Ok(0);
        }
        let blob = std::mem::take(&mut self.directory_bundle_data);
        let result = self.parse_paths_inner(&blob);
        self.directory_bundle_data = blob;
        if result.is_ok() {
            self.paths_parsed = true;
        }
        result
    }

    fn parse_paths_inner(&mut self, blob: &[u8]) -> Result<usize, Error> {
        let mut unresolved = 0;
        for i in 0..self.directories.len() {
            let record = self.directories[i];
            let start = record.offset as usize;
            let block = match start
                .checked_add(record.size as usize)
                .and_then(|end| blob.get(start..end))
            {
                Some(block) => block,
                None => continue,
            };

            // Two alternating phases separated by zero sentinels: base
            // phase accumulates shared prefixes, leaf phase emits candidate
            // file paths. Concatenation writes back into the segment table.
            let mut reader = Cursor::new(block);
            let mut segments: Vec<Vec<u8>> = Vec::new();
            let mut base = false;
            while block.len() - reader.position() as usize >= 4 {
                let index = reader.read_i32::<LE>()?;
                if index == 0 {
                    base = !base;
                    if base {
                        segments.clear();
                    }
                    continue;
                }
                let index = index.wrapping_sub(1) as usize;
                let segment = reader.read_cstring()?;
                if index < segments.len() {
                    segments[index].extend_from_slice(&segment);
                    if !base {
                        let path = segments[index].clone();
                        if !self.assign_path(&path)? {
                            unresolved += 1;
                        }
                    }
                } else if base {
                    segments.push(segment);
                } else if !self.assign_path(&segment)? {
                    unresolved += 1;
                }
            }
        }
        if unresolved > 0 {
            debug!("parse_paths: {unresolved} dictionary paths match no file record");
        }
        Ok(unresolved)
    }

    fn assign_path(&mut self, path_bytes: &[u8]) -> Result<bool, Error> {
        let path = String::from_utf8_lossy(path_bytes).into_owned();
        let hash = self.name_hash(&path)?;
        match self.files.get_mut(&hash) {
            Some(record) => {
                record.path = Some(path);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Look up a file record by its full string path, parsing paths first
    /// if that has not happened yet.
    pub fn get_file_by_path(&mut self, path: &str) -> Result<FileRecord, Error> {
        if !self.paths_parsed {
            self.parse_paths()?;
        }
        let hash = self.name_hash(path)?;
        let key = if self.files.contains_key(&hash) {
            hash
        } else {
            // the dictionary occasionally derives a path whose hash differs
            match self
                .files
                .iter()
                .find(|(_, record)| record.path.as_deref() == Some(path))
            {
                Some((&key, _)) => key,
                None => return Err(Error::NotFound(path.to_owned())),
            }
        };
        let record = self
            .files
            .get_mut(&key)
            .ok_or_else(|| Error::NotFound(path.to_owned()))?;
        if record.path.is_none() {
            record.path = Some(path.to_owned());
        }
        Ok(record.clone())
    }

    /// Read a file's bytes out of its data bundle. The bundle is obtained
    /// from the factory, read once and closed again; at most one bundle is
    /// held open per call.
    pub fn read_file_data(&self, record: &FileRecord) -> Result<Vec<u8>, Error> {
        let bundle_record = self
            .bundles
            .get(record.bundle_index)
            .ok_or(Error::InvalidHeaderField {
                field: "bundle index",
                value: record.bundle_index as i64,
            })?;
        let mut bundle = self.factory.get_bundle(bundle_record)?;
        let data = bundle.read_at(record.offset as u64, record.size as u64)?;
        bundle.close();
        Ok(data)
    }

    /// Materialize the directory trie over all files with derived paths.
    /// Files without one are skipped when `ignore_null_path` is set and
    /// fail the build otherwise.
    pub fn build_tree(&mut self, ignore_null_path: bool) -> Result<DirectoryTree, Error> {
        if !self.paths_parsed && !ignore_null_path {
            self.parse_paths()?;
        }
        let mut records: Vec<&FileRecord> = self.files.values().collect();
        records.sort_by(|a, b| a.path.cmp(&b.path).then(a.path_hash.cmp(&b.path_hash)));

        let mut tree = DirectoryTree::new();
        for record in records {
            match &record.path {
                Some(path) => tree.insert_file(path, record.path_hash),
                None if ignore_null_path => {}
                None => {
                    return Err(Error::NotFound(format!(
                        "no path for file {:016x}",
                        record.path_hash
                    )))
                }
            }
        }
        Ok(tree)
    }
}

fn read_count(
    reader: &mut Cursor<&[u8]>,
    field: &'static str,
    min_record_size: u64,
) -> Result<usize, Error> {
    let count = reader.read_i32::<LE>()?;
    let remaining = reader.get_ref().len() as u64 - reader.position();
    if count < 0 || count as u64 * min_record_size > remaining {
        return Err(Error::InvalidHeaderField {
            field,
            value: count as i64,
        });
    }
    Ok(count as usize)
}

fn read_size_field(reader: &mut impl Read, field: &'static str) -> Result<u32, Error> {
    let value = reader.read_i32::<LE>()?;
    if value < 0 {
        return Err(Error::InvalidHeaderField {
            field,
            value: value as i64,
        });
    }
    Ok(value as u32)
}
