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

//! Checkout and reset: materializing a commit's tree into the worktree and
//! the index, and moving `HEAD`.
//!
//! The worktree backend owns deletions; files that left the tree stay on
//! disk until their owner removes them. Symlinks are written as plain files
//! holding the target (`core.symlinks` defaults to false).

use tracing::warn;

use crate::backend::Backend;
use crate::error::StoreResult;
use crate::hooks;
use crate::hooks::HookContext;
use crate::hooks::HookExecutor;
use crate::index::Index;
use crate::index::IndexEntry;
use crate::object_id::Oid;
use crate::odb;
use crate::odb::ObjectForm;
use crate::refs;
use crate::reflog;
use crate::reflog::ReflogEntry;
use crate::tree_builder;
use crate::working_copy::WorktreeBackend;

#[derive(Debug, Clone)]
pub struct CheckoutOptions {
    /// Move `HEAD` to the checked-out ref (symbolic for branches, detached
    /// otherwise).
    pub update_head: bool,
}

impl Default for CheckoutOptions {
    fn default() -> Self {
        Self { update_head: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Move the ref only.
    Soft,
    /// Move the ref and reset the index.
    Mixed,
    /// Move the ref, reset the index and rewrite the worktree.
    Hard,
}

/// Writes every blob of `tree` into the worktree and returns the fresh
/// index entries, stats filled from the files just written.
async fn materialize_tree(
    backend: &dyn Backend,
    worktree: &dyn WorktreeBackend,
    tree: &Oid,
) -> StoreResult<Vec<IndexEntry>> {
    let mut entries = Vec::new();
    for (path, mode, oid) in tree_builder::flatten_tree(backend, tree, "").await? {
        if mode == 0o160000 {
            // A gitlink materializes as an empty directory; populating the
            // submodule is its own repository's business.
            worktree.mkdir(&path, true).await?;
            entries.push(IndexEntry::new(&path, oid, mode, 0));
            continue;
        }
        let raw = odb::read_object(backend, &oid, ObjectForm::Content).await?;
        worktree.write(&path, &raw.bytes).await?;
        let mut entry = IndexEntry::new(&path, oid, mode, 0);
        if let Some(meta) = worktree.lstat(&path).await? {
            entry.stat.mtime_secs = meta.mtime_secs.clamp(0, i64::from(u32::MAX)) as u32;
            entry.stat.mtime_nanos = meta.mtime_nanos;
            entry.stat.ctime_secs = meta.ctime_secs.clamp(0, i64::from(u32::MAX)) as u32;
            entry.stat.ctime_nanos = meta.ctime_nanos;
            entry.stat.size = meta.size.min(u64::from(u32::MAX)) as u32;
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// Index entries for `tree` without touching the worktree (stats zeroed).
async fn index_entries_for_tree(
    backend: &dyn Backend,
    tree: &Oid,
) -> StoreResult<Vec<IndexEntry>> {
    Ok(tree_builder::flatten_tree(backend, tree, "")
        .await?
        .into_iter()
        .map(|(path, mode, oid)| IndexEntry::new(path, oid, mode, 0))
        .collect())
}

async fn write_index_entries(
    backend: &dyn Backend,
    entries: Vec<IndexEntry>,
) -> StoreResult<()> {
    let mut index = Index::new();
    for entry in entries {
        index.insert(entry);
    }
    backend
        .write_index(&index.to_bytes(backend.hash_family()))
        .await
}

/// What `HEAD` currently says, for reflog prose: the short branch name when
/// on a branch, the id when detached, `(unborn)` otherwise.
async fn head_description(backend: &dyn Backend) -> String {
    match backend.read_head().await {
        Ok(Some(head)) => match head.strip_prefix(refs::SYMREF_PREFIX) {
            Some(target) => target
                .trim()
                .strip_prefix("refs/heads/")
                .unwrap_or(target.trim())
                .to_string(),
            None => head,
        },
        _ => "(unborn)".to_string(),
    }
}

/// Checks a commit out into the worktree and the index, then moves `HEAD`.
pub async fn checkout(
    backend: &dyn Backend,
    worktree: &dyn WorktreeBackend,
    executor: Option<&dyn HookExecutor>,
    refname: &str,
    options: &CheckoutOptions,
) -> StoreResult<Oid> {
    let previous = head_description(backend).await;
    let previous_oid = refs::resolve_ref(backend, "HEAD").await.ok();

    let target_oid = refs::resolve_ref(backend, refname).await?;
    let commit = odb::read_commit(backend, &target_oid).await?;

    {
        let _index_lock = backend.lock_index().await?;
        let entries = materialize_tree(backend, worktree, &commit.tree).await?;
        write_index_entries(backend, entries).await?;
    }

    let branch_name = refs::expand_ref(backend, refname)
        .await
        .ok()
        .filter(|full| full.starts_with("refs/heads/"));
    if options.update_head {
        match &branch_name {
            Some(full) => {
                backend
                    .write_head(&format!("{}{full}", refs::SYMREF_PREFIX))
                    .await?;
            }
            None => backend.write_head(&target_oid.hex()).await?,
        }
        let entry = ReflogEntry::new(
            previous_oid
                .clone()
                .unwrap_or_else(|| backend.hash_family().zero_oid()),
            target_oid.clone(),
            &reflog::identity(backend).await,
            &reflog::checkout_message(&previous, refname),
        );
        if let Err(err) = reflog::append(backend, "HEAD", &entry).await {
            warn!(?err, "HEAD reflog append failed, continuing");
        }
    }

    let ctx = HookContext {
        work_tree: worktree
            .directory()
            .map(|dir| dir.to_string_lossy().into_owned()),
        previous_head: previous_oid.as_ref().map(Oid::hex),
        head: Some(target_oid.hex()),
        ..HookContext::default()
    };
    let branch_flag = if branch_name.is_some() { "1" } else { "0" };
    if let Err(err) = hooks::run_hook(
        backend,
        executor,
        "post-checkout",
        &ctx,
        None,
        &[
            previous_oid
                .map(|oid| oid.hex())
                .unwrap_or_else(|| backend.hash_family().zero_oid().hex()),
            target_oid.hex(),
            branch_flag.to_string(),
        ],
    )
    .await
    {
        warn!(?err, "post-checkout hook failed, ignoring");
    }

    Ok(target_oid)
}

/// Moves the current branch (or detached `HEAD`) to `refname`, recording
/// `ORIG_HEAD`, with index/worktree effects per `mode`.
pub async fn reset(
    backend: &dyn Backend,
    worktree: Option<&dyn WorktreeBackend>,
    refname: &str,
    mode: ResetMode,
) -> StoreResult<Oid> {
    let target_oid = refs::resolve_ref(backend, refname).await?;
    let commit = odb::read_commit(backend, &target_oid).await?;

    let current_ref = match backend.read_head().await? {
        Some(head) => match head.strip_prefix(refs::SYMREF_PREFIX) {
            Some(target) => target.trim().to_string(),
            None => "HEAD".to_string(),
        },
        None => "HEAD".to_string(),
    };
    let old_oid = refs::resolve_ref(backend, "HEAD")
        .await
        .unwrap_or_else(|_| backend.hash_family().zero_oid());

    if !old_oid.is_zero() {
        backend
            .write_state("ORIG_HEAD", format!("{}\n", old_oid.hex()).as_bytes())
            .await?;
    }

    refs::write_ref(backend, &current_ref, &target_oid, true).await?;
    let entry = ReflogEntry::new(
        old_oid,
        target_oid.clone(),
        &reflog::identity(backend).await,
        &reflog::reset_message(refname),
    );
    if let Err(err) = reflog::append(backend, &current_ref, &entry).await {
        warn!(ref_name = %current_ref, ?err, "reflog append failed, continuing");
    }
    if current_ref != "HEAD" {
        if let Err(err) = reflog::append(backend, "HEAD", &entry).await {
            warn!(?err, "HEAD reflog append failed, continuing");
        }
    }

    if matches!(mode, ResetMode::Mixed | ResetMode::Hard) {
        let _index_lock = backend.lock_index().await?;
        let entries = match (mode, worktree) {
            (ResetMode::Hard, Some(worktree)) => {
                materialize_tree(backend, worktree, &commit.tree).await?
            }
            _ => index_entries_for_tree(backend, &commit.tree).await?,
        };
        write_index_entries(backend, entries).await?;
    }

    Ok(target_oid)
}
