// Copyright 2025 The GitStore Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Builds tree objects from the flat index, and flattens them back.

use std::collections::BTreeMap;

use futures::future::BoxFuture;

use crate::backend::Backend;
use crate::error::StoreResult;
use crate::index::Index;
use crate::object::TreeEntry;
use crate::object::serialize_tree;
use crate::object_codec::ObjectType;
use crate::object_id::Oid;
use crate::odb;
use crate::odb::ObjectForm;

#[derive(Debug)]
enum Inode {
    Tree(BTreeMap<String, Inode>),
    Leaf { mode: u32, oid: Oid },
}

/// Orders sibling entries the way git orders tree entries: byte comparison
/// with an implicit trailing `/` on tree names, so `dir` sorts after
/// `dir-file` but before `dir0`.
fn canonical_key(name: &str, is_tree: bool) -> Vec<u8> {
    let mut key = name.as_bytes().to_vec();
    if is_tree {
        key.push(b'/');
    }
    key
}

fn write_inode<'a>(
    backend: &'a dyn Backend,
    children: &'a BTreeMap<String, Inode>,
    dry_run: bool,
) -> BoxFuture<'a, StoreResult<Oid>> {
    Box::pin(async move {
        let mut entries = Vec::with_capacity(children.len());
        for (name, inode) in children {
            match inode {
                Inode::Tree(grandchildren) => {
                    let oid = write_inode(backend, grandchildren, dry_run).await?;
                    entries.push(TreeEntry {
                        mode: 0o040000,
                        name: name.clone(),
                        oid,
                    });
                }
                Inode::Leaf { mode, oid } => {
                    entries.push(TreeEntry {
                        mode: *mode,
                        name: name.clone(),
                        oid: oid.clone(),
                    });
                }
            }
        }
        entries.sort_by_key(|entry| canonical_key(&entry.name, entry.is_tree()));
        let body = serialize_tree(&entries);
        odb::write_object(backend, ObjectType::Tree, &body, ObjectForm::Content, dry_run).await
    })
}

/// Computes (and unless `dry_run`, persists) the tree of the index's stage-0
/// entries. An empty index yields the empty tree.
pub async fn write_tree_from_index(
    backend: &dyn Backend,
    index: &Index,
    dry_run: bool,
) -> StoreResult<Oid> {
    write_tree_from_entries(
        backend,
        index
            .entries()
            .iter()
            .filter(|entry| entry.stage == 0)
            .map(|entry| (entry.path.as_str(), entry.mode, entry.oid.clone())),
        dry_run,
    )
    .await
}

/// Like [`write_tree_from_index`] but over bare `(path, mode, oid)` triples.
pub async fn write_tree_from_entries(
    backend: &dyn Backend,
    entries: impl IntoIterator<Item = (&str, u32, Oid)>,
    dry_run: bool,
) -> StoreResult<Oid> {
    let mut root = BTreeMap::new();
    for (path, mode, oid) in entries {
        let mut node = &mut root;
        let mut segments = path.split('/').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                node.insert(segment.to_string(), Inode::Leaf { mode, oid: oid.clone() });
                break;
            }
            let child = node
                .entry(segment.to_string())
                .or_insert_with(|| Inode::Tree(BTreeMap::new()));
            node = match child {
                Inode::Tree(children) => children,
                // A file shadowed by a directory of the same name; the
                // directory wins and the stale leaf is replaced.
                Inode::Leaf { .. } => {
                    *child = Inode::Tree(BTreeMap::new());
                    match child {
                        Inode::Tree(children) => children,
                        Inode::Leaf { .. } => unreachable!(),
                    }
                }
            };
        }
    }
    write_inode(backend, &root, dry_run).await
}

/// Depth-first flattening of a stored tree into `(path, mode, oid)` triples,
/// non-tree entries only.
pub fn flatten_tree<'a>(
    backend: &'a dyn Backend,
    tree: &'a Oid,
    prefix: &'a str,
) -> BoxFuture<'a, StoreResult<Vec<(String, u32, Oid)>>> {
    Box::pin(async move {
        let mut out = Vec::new();
        for entry in odb::read_tree(backend, tree).await? {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{prefix}/{}", entry.name)
            };
            if entry.is_tree() {
                out.extend(flatten_tree(backend, &entry.oid, &path).await?);
            } else {
                out.push((path, entry.mode, entry.oid));
            }
        }
        Ok(out)
    })
}
