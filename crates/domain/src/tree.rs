//! Folder tree read model over the vault and its index cache.

use crate::{DocumentPath, IndexedEntry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node of the index tree; the variant is fixed when the tree is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexTreeNode {
    /// Directory with sorted children (folders first).
    Folder {
        /// Segment name (empty for the vault root).
        name: Box<str>,
        /// Child nodes.
        children: Vec<Self>,
    },
    /// Document with a cache entry.
    Entry {
        /// File name.
        name: Box<str>,
        /// Cache entry for the document.
        entry: IndexedEntry,
    },
    /// Document known to the vault but not indexed.
    Leaf {
        /// File name.
        name: Box<str>,
    },
}

#[derive(Default)]
struct FolderBuilder {
    folders: BTreeMap<Box<str>, Self>,
    files: BTreeMap<Box<str>, Option<IndexedEntry>>,
}

impl FolderBuilder {
    fn insert(&mut self, path: &DocumentPath, entry: Option<IndexedEntry>) {
        let mut folder = self;
        let mut segments = path.segments().peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                let slot = folder.files.entry(segment.into()).or_default();
                if entry.is_some() {
                    *slot = entry;
                }
                return;
            }
            folder = folder.folders.entry(segment.into()).or_default();
        }
    }

    fn build(self, name: Box<str>) -> IndexTreeNode {
        let mut children: Vec<IndexTreeNode> = self
            .folders
            .into_iter()
            .map(|(name, folder)| folder.build(name))
            .collect();
        children.extend(self.files.into_iter().map(|(name, entry)| match entry {
            Some(entry) => IndexTreeNode::Entry { name, entry },
            None => IndexTreeNode::Leaf { name },
        }));
        IndexTreeNode::Folder { name, children }
    }
}

impl IndexTreeNode {
    /// Build the tree from vault paths plus cache entries.
    ///
    /// Cached paths missing from `paths` still appear, as `Entry` nodes.
    #[must_use]
    pub fn build<'a>(
        paths: impl IntoIterator<Item = &'a DocumentPath>,
        entries: &BTreeMap<DocumentPath, IndexedEntry>,
    ) -> Self {
        let mut root = FolderBuilder::default();
        for path in paths {
            root.insert(path, entries.get(path).cloned());
        }
        for (path, entry) in entries {
            root.insert(path, Some(entry.clone()));
        }
        root.build("".into())
    }

    /// Node name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Folder { name, .. } | Self::Entry { name, .. } | Self::Leaf { name } => name,
        }
    }

    /// `(indexed, not_indexed)` document counts below this node.
    #[must_use]
    pub fn counts(&self) -> (u64, u64) {
        match self {
            Self::Entry { .. } => (1, 0),
            Self::Leaf { .. } => (0, 1),
            Self::Folder { children, .. } => children.iter().fold((0, 0), |acc, child| {
                let (indexed, missing) = child.counts();
                (acc.0 + indexed, acc.1 + missing)
            }),
        }
    }
}
