//! Materialized directory tree over index file paths.
//!
//! Nodes live in an arena keyed by stable indices; children point back at
//! their parent by index, so no reference cycles exist to break at drop.

/// Accessors common to file and directory nodes, whichever tree they
/// belong to.
pub trait TreeNode {
    fn name(&self) -> &str;
    fn is_dir(&self) -> bool;
}

/// Handle to a node in a [`DirectoryTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeNodeId(pub(crate) usize);

#[derive(Debug)]
pub struct TreeEntry {
    name: String,
    parent: Option<TreeNodeId>,
    kind: TreeEntryKind,
}

#[derive(Debug)]
enum TreeEntryKind {
    Directory { children: Vec<TreeNodeId> },
    File { path_hash: u64 },
}

impl TreeEntry {
    /// The file's index path hash; `None` for directories.
    pub fn path_hash(&self) -> Option<u64> {
        match self.kind {
            TreeEntryKind::File { path_hash } => Some(path_hash),
            TreeEntryKind::Directory { .. } => None,
        }
    }
}

impl TreeNode for TreeEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, TreeEntryKind::Directory { .. })
    }
}

#[derive(Debug)]
pub struct DirectoryTree {
    nodes: Vec<TreeEntry>,
}

impl DirectoryTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![TreeEntry {
                name: String::new(),
                parent: None,
                kind: TreeEntryKind::Directory {
                    children: Vec::new(),
                },
            }],
        }
    }

    pub fn root(&self) -> TreeNodeId {
        TreeNodeId(0)
    }

    pub fn node(&self, id: TreeNodeId) -> &TreeEntry {
        &self.nodes[id.0]
    }

    pub fn parent(&self, id: TreeNodeId) -> Option<TreeNodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: TreeNodeId) -> &[TreeNodeId] {
        match &self.nodes[id.0].kind {
            TreeEntryKind::Directory { children } => children,
            TreeEntryKind::File { .. } => &[],
        }
    }

    /// Full `/`-separated path of a node; empty for the root.
    pub fn path(&self, id: TreeNodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current.map(|id| &self.nodes[id.0]) {
            if node.parent.is_some() {
                parts.push(node.name.as_str());
            }
            current = node.parent;
        }
        parts.reverse();
        parts.join("/")
    }

    /// Resolve a `/`-separated path from the root.
    pub fn get(&self, path: &str) -> Option<TreeNodeId> {
        let mut current = self.root();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = *self
                .children(current)
                .iter()
                .find(|&&child| self.nodes[child.0].name == part)?;
        }
        Some(current)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // the root is always present
        self.nodes.len() == 1
    }

    /// Insert a file path, creating missing directories along the way.
    /// Directories are deduplicated by name under their parent.
    pub(crate) fn insert_file(&mut self, path: &str, path_hash: u64) {
        let mut parts = path.split('/').filter(|p| !p.is_empty()).peekable();
        let mut current = self.root();
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = self.child_directory(current, part);
            } else {
                let id = TreeNodeId(self.nodes.len());
                self.nodes.push(TreeEntry {
                    name: part.to_owned(),
                    parent: Some(current),
                    kind: TreeEntryKind::File { path_hash },
                });
                self.push_child(current, id);
            }
        }
    }

    fn child_directory(&mut self, parent: TreeNodeId, name: &str) -> TreeNodeId {
        if let TreeEntryKind::Directory { children } = &self.nodes[parent.0].kind {
            for &child in children {
                let node = &self.nodes[child.0];
                if node.is_dir() && node.name == name {
                    return child;
                }
            }
        }
        let id = TreeNodeId(self.nodes.len());
        self.nodes.push(TreeEntry {
            name: name.to_owned(),
            parent: Some(parent),
            kind: TreeEntryKind::Directory {
                children: Vec::new(),
            },
        });
        self.push_child(parent, id);
        id
    }

    fn push_child(&mut self, parent: TreeNodeId, child: TreeNodeId) {
        if let TreeEntryKind::Directory { children } = &mut self.nodes[parent.0].kind {
            children.push(child);
        }
    }
}

impl Default for DirectoryTree {
    fn default() -> Self {
        Self::new()
    }
}
