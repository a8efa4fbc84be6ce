//! Conversions between the flat index and nested tree objects.

use std::collections::BTreeMap;

use bstr::{BString, ByteSlice, ByteVec};
use tracing::debug;
use vcs_hash::ObjectId;
use vcs_object::{FileMode, Object, Tree, TreeEntry};
use vcs_odb::ObjectDatabase;

use crate::{IndexError, Result};

/// A non-directory leaf of a flattened tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeItem {
    pub oid: ObjectId,
    pub mode: FileMode,
}

/// Every leaf under `tree`, keyed by full `/`-separated path.
///
/// Gitlinks are leaves; their commits live in another repository.
pub fn flatten_tree(odb: &ObjectDatabase, tree: &ObjectId) -> Result<BTreeMap<BString, TreeItem>> {
    let mut out = BTreeMap::new();
    flatten_into(odb, tree, &mut BString::default(), &mut out)?;
    Ok(out)
}

fn flatten_into(
    odb: &ObjectDatabase,
    tree: &ObjectId,
    prefix: &mut BString,
    out: &mut BTreeMap<BString, TreeItem>,
) -> Result<()> {
    let tree = odb.read_tree(tree)?;
    for entry in tree.entries {
        let base = prefix.len();
        if base > 0 {
            prefix.push_byte(b'/');
        }
        prefix.push_str(&entry.name);
        if entry.mode.is_tree() {
            flatten_into(odb, &entry.oid, prefix, out)?;
        } else {
            out.insert(
                prefix.clone(),
                TreeItem {
                    oid: entry.oid,
                    mode: entry.mode,
                },
            );
        }
        prefix.truncate(base);
    }
    Ok(())
}

enum Node {
    Leaf(TreeItem),
    Dir(BTreeMap<BString, Node>),
}

/// Write nested tree objects for a flat path map and return the root id.
pub fn build_tree<'a, I>(odb: &ObjectDatabase, items: I) -> Result<ObjectId>
where
    I: IntoIterator<Item = (&'a BString, &'a TreeItem)>,
{
    let mut root = BTreeMap::new();
    for (path, item) in items {
        insert(&mut root, path, *item)?;
    }
    write_dir(odb, root)
}

fn insert(root: &mut BTreeMap<BString, Node>, path: &BString, item: TreeItem) -> Result<()> {
    let mut dir = root;
    let mut parts = path.split_str("/").peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            if dir.contains_key(part.as_bstr()) {
                return Err(IndexError::PathConflict(path.clone()));
            }
            dir.insert(BString::from(part), Node::Leaf(item));
            return Ok(());
        }
        let node = dir
            .entry(BString::from(part))
            .or_insert_with(|| Node::Dir(BTreeMap::new()));
        dir = match node {
            Node::Dir(children) => children,
            Node::Leaf(_) => return Err(IndexError::PathConflict(path.clone())),
        };
    }
    Ok(())
}

fn write_dir(odb: &ObjectDatabase, dir: BTreeMap<BString, Node>) -> Result<ObjectId> {
    let mut entries = Vec::with_capacity(dir.len());
    for (name, node) in dir {
        let entry = match node {
            Node::Leaf(item) => TreeEntry::new(item.mode, name, item.oid),
            Node::Dir(children) => TreeEntry::new(FileMode::Tree, name, write_dir(odb, children)?),
        };
        entries.push(entry);
    }
    let tree = Tree::from_entries(entries)?;
    let oid = odb.write(&Object::Tree(tree))?;
    debug!(%oid, "wrote tree");
    Ok(oid)
}
