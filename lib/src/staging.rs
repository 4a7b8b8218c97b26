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

//! Staging operations: `add`, `remove`, `update_index`.
//!
//! `add` fans blob hashing and writing out across its file list; object
//! writes are content-addressed and idempotent, so the fan-out is safe. The
//! index mutation is deferred until every blob landed and then applied
//! serially under the index lock.

use futures::future::BoxFuture;
use futures::future::join_all;

use crate::backend::Backend;
use crate::error::GitError;
use crate::error::StoreError;
use crate::error::StoreResult;
use crate::index::Index;
use crate::index::IndexEntry;
use crate::index::IndexStat;
use crate::index::normalize_path;
use crate::object_codec::ObjectType;
use crate::object_id::Oid;
use crate::odb;
use crate::odb::ObjectForm;
use crate::working_copy::FileMetadata;
use crate::working_copy::WorktreeBackend;

#[derive(Debug, Clone)]
pub struct AddOptions {
    /// Fan out blob writes across the file list.
    pub parallel: bool,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self { parallel: true }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateIndexOptions {
    /// Allow staging a path the index doesn't know yet.
    pub add: bool,
    /// Drop the entry when the file is gone from the worktree.
    pub remove: bool,
}

fn metadata_to_stat(meta: &FileMetadata) -> IndexStat {
    IndexStat {
        ctime_secs: meta.ctime_secs.clamp(0, i64::from(u32::MAX)) as u32,
        ctime_nanos: meta.ctime_nanos,
        mtime_secs: meta.mtime_secs.clamp(0, i64::from(u32::MAX)) as u32,
        mtime_nanos: meta.mtime_nanos,
        dev: meta.dev as u32,
        ino: meta.ino as u32,
        uid: meta.uid,
        gid: meta.gid,
        size: meta.size.min(u64::from(u32::MAX)) as u32,
    }
}

fn entry_mode(meta: &FileMetadata) -> u32 {
    if meta.is_symlink {
        0o120000
    } else {
        crate::index::normalize_mode(meta.mode)
    }
}

/// Expands directories into the regular files beneath them. `.git` entries
/// are skipped.
fn collect_files<'a>(
    worktree: &'a dyn WorktreeBackend,
    path: String,
) -> BoxFuture<'a, StoreResult<Vec<String>>> {
    Box::pin(async move {
        let Some(meta) = worktree.lstat(&path).await? else {
            return Err(StoreError::NotFound {
                what: format!("worktree path {path}"),
            });
        };
        if !meta.is_dir {
            return Ok(vec![path]);
        }
        let mut files = Vec::new();
        for name in worktree.readdir(&path).await? {
            if name == ".git" {
                continue;
            }
            let child = if path.is_empty() {
                name
            } else {
                format!("{path}/{name}")
            };
            files.extend(collect_files(worktree, child).await?);
        }
        Ok(files)
    })
}

/// Hashes one worktree file into a blob and returns the entry to stage.
async fn stage_one(
    backend: &dyn Backend,
    worktree: &dyn WorktreeBackend,
    path: &str,
) -> StoreResult<IndexEntry> {
    let meta = worktree
        .lstat(path)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            what: format!("worktree path {path}"),
        })?;
    let content = if meta.is_symlink {
        // The link target is the blob's content, normalized like any path.
        normalize_path(&worktree.readlink(path).await?).into_bytes()
    } else {
        worktree
            .read(path)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                what: format!("worktree path {path}"),
            })?
    };
    let oid = odb::write_object(backend, ObjectType::Blob, &content, ObjectForm::Content, false)
        .await?;
    let mut entry = IndexEntry::new(path, oid, entry_mode(&meta), 0);
    entry.stat = metadata_to_stat(&meta);
    Ok(entry)
}

/// Stages `paths` (files or directories): writes their blobs, then upserts
/// the index entries. Per-path failures are collected; the paths that
/// succeeded are still staged before the collection is raised.
pub async fn add(
    backend: &dyn Backend,
    worktree: &dyn WorktreeBackend,
    paths: &[String],
    options: &AddOptions,
) -> StoreResult<Vec<(String, Oid)>> {
    let mut files = Vec::new();
    let mut failures: Vec<GitError> = Vec::new();
    for path in paths {
        match collect_files(worktree, normalize_path(path)).await {
            Ok(found) => files.extend(found),
            Err(err) => failures.push(err.at("git.add")),
        }
    }

    let mut staged: Vec<IndexEntry> = Vec::new();
    if options.parallel {
        let results = join_all(
            files
                .iter()
                .map(|path| async move { stage_one(backend, worktree, path).await }),
        )
        .await;
        for result in results {
            match result {
                Ok(entry) => staged.push(entry),
                Err(err) => failures.push(err.at("git.add")),
            }
        }
    } else {
        for path in &files {
            match stage_one(backend, worktree, path).await {
                Ok(entry) => staged.push(entry),
                Err(err) => failures.push(err.at("git.add")),
            }
        }
    }

    let _lock = backend.lock_index().await?;
    let mut index = load_index(backend).await?;
    let mut added = Vec::with_capacity(staged.len());
    for entry in staged {
        added.push((entry.path.clone(), entry.oid.clone()));
        index.insert(entry);
    }
    backend
        .write_index(&index.to_bytes(backend.hash_family()))
        .await?;

    if !failures.is_empty() {
        return Err(StoreError::Multiple(failures));
    }
    Ok(added)
}

/// Unstages `paths`. The worktree side of a removal belongs to the worktree
/// backend's owner; only the index is touched here.
pub async fn remove(backend: &dyn Backend, paths: &[String]) -> StoreResult<()> {
    let _lock = backend.lock_index().await?;
    let mut index = load_index(backend).await?;
    let mut failures = Vec::new();
    for path in paths {
        if !index.remove(path, None) {
            failures.push(
                StoreError::NotFound {
                    what: format!("index entry {path}"),
                }
                .at("git.remove"),
            );
        }
    }
    backend
        .write_index(&index.to_bytes(backend.hash_family()))
        .await?;
    if !failures.is_empty() {
        return Err(StoreError::Multiple(failures));
    }
    Ok(())
}

/// Refreshes a single path: restages it when present, drops it when gone
/// (with `remove`), and returns the staged blob id if any.
pub async fn update_index(
    backend: &dyn Backend,
    worktree: &dyn WorktreeBackend,
    path: &str,
    options: &UpdateIndexOptions,
) -> StoreResult<Option<Oid>> {
    let path = normalize_path(path);
    let present = worktree.lstat(&path).await?.is_some();
    let _lock = backend.lock_index().await?;
    let mut index = load_index(backend).await?;
    let result = if present {
        if !index.has(&path, None) && !options.add {
            return Err(StoreError::NotFound {
                what: format!("index entry {path} (pass add to create it)"),
            });
        }
        let entry = stage_one(backend, worktree, &path).await?;
        let oid = entry.oid.clone();
        index.insert(entry);
        Some(oid)
    } else if options.remove {
        index.remove(&path, None);
        None
    } else {
        return Err(StoreError::NotFound {
            what: format!("worktree path {path}"),
        });
    };
    backend
        .write_index(&index.to_bytes(backend.hash_family()))
        .await?;
    Ok(result)
}

/// The current index, or a fresh one when the file doesn't exist yet.
pub async fn load_index(backend: &dyn Backend) -> StoreResult<Index> {
    match backend.read_index().await? {
        Some(bytes) => Index::parse(&bytes, backend.hash_family()),
        None => Ok(Index::new()),
    }
}
