//! The GGPK reader: lazy record-graph traversal over a random-access source.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{ReadBytesExt, LE};

use super::ext::ReadExt;
use super::record::{
    self, DirectoryEntry, DirectoryRecord, FileRecord, GgpkHeader, RecordHeader, Sha256Hash,
};
use super::tree::TreeNode;
use super::Error;

/// Handle to a node in a reader's arena. Only valid for the reader that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug)]
pub struct Node {
    name: String,
    offset: u64,
    hash: Sha256Hash,
    parent: Option<NodeId>,
    kind: NodeKind,
}

#[derive(Debug)]
enum NodeKind {
    Directory {
        entries: Vec<DirectoryEntry>,
        children: Option<Vec<NodeId>>,
    },
    File {
        data_offset: u64,
        data_size: u64,
    },
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute offset of the node's record in the archive.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn hash(&self) -> &[u8; 32] {
        &self.hash.0
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    /// Size of the file's data; `None` for directories.
    pub fn data_size(&self) -> Option<u64> {
        match self.kind {
            NodeKind::File { data_size, .. } => Some(data_size),
            NodeKind::Directory { .. } => None,
        }
    }

    /// Absolute offset of the file's data; `None` for directories.
    pub fn data_offset(&self) -> Option<u64> {
        match self.kind {
            NodeKind::File { data_offset, .. } => Some(data_offset),
            NodeKind::Directory { .. } => None,
        }
    }
}

impl TreeNode for Node {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_dir(&self) -> bool {
        self.is_dir()
    }
}

/// Reader over a GGPK archive.
///
/// The reader exclusively owns its byte source. Directory children are read
/// on first access and memoized; nothing beyond the header and the root
/// directory record is touched at open.
pub struct Ggpk<R> {
    reader: R,
    len: u64,
    version: u32,
    root_offset: u64,
    free_offset: u64,
    nodes: Vec<Node>,
    root: NodeId,
}

impl Ggpk<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Self::from_reader(BufReader::new(file), len)
    }
}

impl Ggpk<Cursor<Vec<u8>>> {
    /// Open over an in-memory buffer, e.g. one extracted out of a bundle.
    /// The reader owns the buffer for the rest of its lifetime.
    pub fn open_from_memory(buf: Vec<u8>) -> Result<Self, Error> {
        let len = buf.len() as u64;
        Self::from_reader(Cursor::new(buf), len)
    }
}

impl<R: Read + Seek> Ggpk<R> {
    pub fn from_reader(mut reader: R, len: u64) -> Result<Self, Error> {
        reader.seek(SeekFrom::Start(0))?;
        let _length = reader.read_u32::<LE>()?;
        let mut tag = [0; 4];
        reader.read_exact(&mut tag)?;
        if tag != record::GGPK_TAG {
            return Err(Error::BadMagic(tag));
        }
        let header = GgpkHeader::read(&mut reader)?;
        if !(2..=4).contains(&header.version) {
            return Err(Error::InvalidHeaderField {
                field: "version",
                value: header.version as i64,
            });
        }

        let mut ggpk = Self {
            reader,
            len,
            version: header.version,
            root_offset: header.root_offset,
            free_offset: header.free_offset,
            nodes: Vec::new(),
            root: NodeId(0),
        };
        let root = ggpk
            .load_node(header.root_offset, None)?
            .ok_or(Error::CorruptRecord {
                offset: header.root_offset,
                reason: "root offset points at a free record",
            })?;
        if !ggpk.nodes[root.0].is_dir() {
            return Err(Error::CorruptRecord {
                offset: header.root_offset,
                reason: "root record is not a directory",
            });
        }
        ggpk.root = root;
        Ok(ggpk)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Offset of the root directory record.
    pub fn root_offset(&self) -> u64 {
        self.root_offset
    }

    /// Offset of the first record in the free list, 0 if none.
    pub fn free_offset(&self) -> u64 {
        self.free_offset
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Full path of a node from the archive root, `/`-separated.
    pub fn path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current.map(|id| &self.nodes[id.0]) {
            // the root directory's own (empty) name is not part of any path
            if node.parent.is_some() {
                parts.push(node.name.as_str());
            }
            current = node.parent;
        }
        parts.reverse();
        parts.join("/")
    }

    /// Children of a directory, loading and memoizing them on first access.
    /// Free records among the entries are skipped. Files have no children.
    pub fn children(&mut self, id: NodeId) -> Result<Vec<NodeId>, Error> {
        let entries = match &self.nodes[id.0].kind {
            NodeKind::Directory {
                children: Some(children),
                ..
            } => return Ok(children.clone()),
            NodeKind::Directory { entries, .. } => entries.clone(),
            NodeKind::File { .. } => return Ok(Vec::new()),
        };

        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(child) = self.load_node(entry.offset, Some(id))? {
                children.push(child);
            }
        }
        if let NodeKind::Directory {
            children: loaded, ..
        } = &mut self.nodes[id.0].kind
        {
            *loaded = Some(children.clone());
        }
        Ok(children)
    }

    /// Resolve a `/`-separated path from the root. Name comparison is
    /// linear and ASCII-case-insensitive.
    pub fn get_node_by_path(&mut self, path: &str) -> Result<NodeId, Error> {
        let mut current = self.root;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = self
                .children(current)?
                .into_iter()
                .find(|&child| self.nodes[child.0].name.eq_ignore_ascii_case(part))
                .ok_or_else(|| Error::NotFound(path.to_owned()))?;
        }
        Ok(current)
    }

    /// Read a file node's data out of the archive.
    pub fn read_file_data(&mut self, id: NodeId) -> Result<Vec<u8>, Error> {
        let (data_offset, data_size) = match self.nodes[id.0].kind {
            NodeKind::File {
                data_offset,
                data_size,
            } => (data_offset, data_size),
            NodeKind::Directory { .. } => return Err(Error::NotAFile(self.path(id))),
        };
        self.check_bounds(data_offset, data_size)?;
        self.reader.seek(SeekFrom::Start(data_offset))?;
        self.reader.read_len(data_size as usize)
    }

    /// Read the record at `offset` into the arena. `Ok(None)` for a free
    /// record; an error for anything that is not a record at all.
    fn load_node(&mut self, offset: u64, parent: Option<NodeId>) -> Result<Option<NodeId>, Error> {
        self.check_bounds(offset, RecordHeader::SIZE)?;
        self.reader.seek(SeekFrom::Start(offset))?;
        let header = RecordHeader::read(&mut self.reader, offset)?;
        self.check_bounds(offset, header.length as u64)?;

        let node = match header.tag {
            record::RecordTag::Directory => {
                let dir = DirectoryRecord::read(&mut self.reader, offset, header.length, self.version)?;
                Node {
                    name: dir.name,
                    offset,
                    hash: dir.hash,
                    parent,
                    kind: NodeKind::Directory {
                        entries: dir.entries,
                        children: None,
                    },
                }
            }
            record::RecordTag::File => {
                let file = FileRecord::read(&mut self.reader, offset, header.length, self.version)?;
                Node {
                    name: file.name,
                    offset,
                    hash: file.hash,
                    parent,
                    kind: NodeKind::File {
                        data_offset: file.data_offset,
                        data_size: file.data_size,
                    },
                }
            }
            record::RecordTag::Free => return Ok(None),
            record::RecordTag::Ggpk => {
                return Err(Error::UnexpectedTag {
                    offset,
                    tag: record::GGPK_TAG,
                })
            }
        };
        self.nodes.push(node);
        Ok(Some(NodeId(self.nodes.len() - 1)))
    }

    fn check_bounds(&self, offset: u64, size: u64) -> Result<(), Error> {
        match offset.checked_add(size) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(Error::OutOfBounds {
                offset,
                size,
                len: self.len,
            }),
        }
    }
}
