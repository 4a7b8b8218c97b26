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

//! The merge engine: base finding, fast-forward classification, three-way
//! tree merge, conflict staging, merge commit.
//!
//! Content-level merging is out of scope (diff algorithms are an external
//! collaborator): two sides touching the same blob differently is a
//! conflict. A conflict is always raised; `abort_on_conflict = false` only
//! means the index is persisted with stages 1/2/3 first.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::collections::VecDeque;

use tracing::warn;

use crate::backend::Backend;
use crate::error::MergeConflictInfo;
use crate::error::StoreError;
use crate::error::StoreResult;
use crate::hooks;
use crate::hooks::HookContext;
use crate::hooks::HookExecutor;
use crate::object;
use crate::object::Commit;
use crate::object::Signature;
use crate::object_codec::ObjectType;
use crate::object_id::Oid;
use crate::odb;
use crate::odb::ObjectForm;
use crate::refs;
use crate::reflog;
use crate::reflog::ReflogEntry;
use crate::staging;
use crate::tree_builder;
use crate::working_copy::WorktreeBackend;

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Allow the fast-forward shortcut when the base equals ours.
    pub fast_forward: bool,
    /// Fail with `FastForwardError` unless the merge is a fast-forward.
    pub ff_only: bool,
    pub message: Option<String>,
    pub author: Option<Signature>,
    pub committer: Option<Signature>,
    /// Classify and compute without mutating the repository.
    pub dry_run: bool,
    /// With `false`, conflict stages are persisted to the index before the
    /// conflict error propagates. The error is raised either way.
    pub abort_on_conflict: bool,
    /// Substitute the empty tree for the base when the histories share no
    /// commit.
    pub allow_unrelated_histories: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            fast_forward: true,
            ff_only: false,
            message: None,
            author: None,
            committer: None,
            dry_run: false,
            abort_on_conflict: true,
            allow_unrelated_histories: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The tip `ours_ref` points at after the merge. Unchanged on dry runs
    /// and when the histories were already merged.
    pub oid: Oid,
    pub tree: Oid,
    pub fast_forward: bool,
    pub already_merged: bool,
}

/// One conflicted path with whichever sides exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictEntry {
    pub path: String,
    pub base: Option<(u32, Oid)>,
    pub ours: Option<(u32, Oid)>,
    pub theirs: Option<(u32, Oid)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeMergeOutcome {
    Merged(Oid),
    Conflicts(Vec<ConflictEntry>),
}

/// All commits reachable from `start`, itself included.
async fn ancestors(backend: &dyn Backend, start: &Oid) -> StoreResult<HashSet<Oid>> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start.clone()]);
    while let Some(oid) = queue.pop_front() {
        if !seen.insert(oid.clone()) {
            continue;
        }
        let commit = odb::read_commit(backend, &oid).await?;
        queue.extend(commit.parents);
    }
    Ok(seen)
}

/// Merge bases of `a` and `b`: a breadth-first walk from `b` collects the
/// first commits already reachable from `a`, without expanding past them.
/// Criss-cross histories yield more than one base.
pub async fn merge_base(backend: &dyn Backend, a: &Oid, b: &Oid) -> StoreResult<Vec<Oid>> {
    let reachable_from_a = ancestors(backend, a).await?;
    let mut bases = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([b.clone()]);
    while let Some(oid) = queue.pop_front() {
        if !seen.insert(oid.clone()) {
            continue;
        }
        if reachable_from_a.contains(&oid) {
            if !bases.contains(&oid) {
                bases.push(oid);
            }
            continue;
        }
        let commit = odb::read_commit(backend, &oid).await?;
        queue.extend(commit.parents);
    }
    Ok(bases)
}

async fn flatten(
    backend: &dyn Backend,
    tree: Option<&Oid>,
) -> StoreResult<BTreeMap<String, (u32, Oid)>> {
    let mut map = BTreeMap::new();
    if let Some(tree) = tree {
        for (path, mode, oid) in tree_builder::flatten_tree(backend, tree, "").await? {
            map.insert(path, (mode, oid));
        }
    }
    Ok(map)
}

/// Three-way merge of whole trees. `base = None` means an empty base (the
/// unrelated-histories case).
pub async fn merge_trees(
    backend: &dyn Backend,
    base: Option<&Oid>,
    ours: &Oid,
    theirs: &Oid,
    dry_run: bool,
) -> StoreResult<TreeMergeOutcome> {
    let base_map = flatten(backend, base).await?;
    let ours_map = flatten(backend, Some(ours)).await?;
    let theirs_map = flatten(backend, Some(theirs)).await?;

    let mut paths: Vec<&String> = base_map
        .keys()
        .chain(ours_map.keys())
        .chain(theirs_map.keys())
        .collect();
    paths.sort();
    paths.dedup();

    let mut merged: Vec<(String, u32, Oid)> = Vec::new();
    let mut conflicts: Vec<ConflictEntry> = Vec::new();
    for path in paths {
        let b = base_map.get(path);
        let o = ours_map.get(path);
        let t = theirs_map.get(path);
        let winner = if o == t {
            o
        } else if b == o {
            t
        } else if b == t {
            o
        } else {
            conflicts.push(ConflictEntry {
                path: path.clone(),
                base: b.cloned(),
                ours: o.cloned(),
                theirs: t.cloned(),
            });
            continue;
        };
        if let Some((mode, oid)) = winner {
            merged.push((path.clone(), *mode, oid.clone()));
        }
    }

    if !conflicts.is_empty() {
        return Ok(TreeMergeOutcome::Conflicts(conflicts));
    }
    let tree = tree_builder::write_tree_from_entries(
        backend,
        merged.iter().map(|(path, mode, oid)| (path.as_str(), *mode, oid.clone())),
        dry_run,
    )
    .await?;
    Ok(TreeMergeOutcome::Merged(tree))
}

fn conflict_info(conflicts: &[ConflictEntry]) -> MergeConflictInfo {
    let mut info = MergeConflictInfo::default();
    for conflict in conflicts {
        info.filepaths.push(conflict.path.clone());
        match (&conflict.ours, &conflict.theirs) {
            (None, _) => info.delete_by_us.push(conflict.path.clone()),
            (_, None) => info.delete_by_them.push(conflict.path.clone()),
            _ => info.both_modified.push(conflict.path.clone()),
        }
    }
    info
}

fn short_ref(name: &str) -> &str {
    name.strip_prefix("refs/heads/").unwrap_or(name)
}

async fn merge_identity(
    backend: &dyn Backend,
    explicit: Option<Signature>,
) -> StoreResult<Signature> {
    if let Some(signature) = explicit {
        return Ok(signature);
    }
    let layers = {
        let mut layers = crate::config::ConfigLayers::default();
        if let Ok(Some(text)) = backend.read_config().await {
            layers.local = crate::config::ConfigFile::parse(&text);
        }
        layers
    };
    match (layers.get("user.name"), layers.get("user.email")) {
        (Some(name), Some(email)) => Ok(Signature {
            name,
            email,
            timestamp: object::Timestamp::now(),
        }),
        _ => Err(StoreError::MissingName { name: "author" }),
    }
}

pub async fn merge(
    backend: &dyn Backend,
    worktree: Option<&dyn WorktreeBackend>,
    executor: Option<&dyn HookExecutor>,
    ours_ref: &str,
    theirs_ref: &str,
    options: MergeOptions,
) -> StoreResult<MergeOutcome> {
    let ours_name = refs::expand_ref(backend, ours_ref).await?;
    let ours_oid = refs::resolve_ref(backend, ours_ref).await?;
    let theirs_oid = refs::resolve_ref(backend, theirs_ref).await?;

    let ours_commit = odb::read_commit(backend, &ours_oid).await?;
    let theirs_commit = odb::read_commit(backend, &theirs_oid).await?;

    if ours_oid == theirs_oid {
        return Ok(MergeOutcome {
            oid: ours_oid,
            tree: ours_commit.tree,
            fast_forward: false,
            already_merged: true,
        });
    }

    let bases = merge_base(backend, &ours_oid, &theirs_oid).await?;

    if bases.len() == 1 && bases[0] == theirs_oid {
        return Ok(MergeOutcome {
            oid: ours_oid,
            tree: ours_commit.tree,
            fast_forward: false,
            already_merged: true,
        });
    }

    if bases.len() == 1 && bases[0] == ours_oid && options.fast_forward {
        if !options.dry_run {
            refs::write_ref(backend, &ours_name, &theirs_oid, true).await?;
            let entry = ReflogEntry::new(
                ours_oid.clone(),
                theirs_oid.clone(),
                &reflog::identity(backend).await,
                &reflog::fast_forward_message(short_ref(theirs_ref)),
            );
            if let Err(err) = reflog::append(backend, &ours_name, &entry).await {
                warn!(ref_name = %ours_name, ?err, "reflog append failed, continuing");
            }
        }
        return Ok(MergeOutcome {
            oid: theirs_oid,
            tree: theirs_commit.tree,
            fast_forward: true,
            already_merged: false,
        });
    }

    let base = if bases.is_empty() {
        if !options.allow_unrelated_histories {
            return Err(StoreError::MergeNotSupported {
                reason: "refusing to merge unrelated histories".to_string(),
            });
        }
        None
    } else if bases.len() > 1 {
        // Recursive merge-base construction is out of scope; callers must
        // supply a base themselves.
        return Err(StoreError::MergeNotSupported {
            reason: format!("{} merge bases, recursive merge is not supported", bases.len()),
        });
    } else {
        Some(bases[0].clone())
    };

    if options.ff_only {
        return Err(StoreError::FastForwardError {
            ours: ours_name,
            theirs: theirs_ref.to_string(),
        });
    }

    let message = options.message.clone().unwrap_or_else(|| {
        format!(
            "Merge {} into {}",
            short_ref(theirs_ref),
            short_ref(&ours_name)
        )
    });

    if !options.dry_run {
        backend
            .write_state("MERGE_HEAD", format!("{}\n", theirs_oid.hex()).as_bytes())
            .await?;
        backend.write_state("MERGE_MODE", b"").await?;
        backend
            .write_state("MERGE_MSG", format!("{message}\n").as_bytes())
            .await?;
    }

    let _index_lock = backend.lock_index().await?;
    let mut index = staging::load_index(backend).await?;
    let unmerged = index.unmerged_paths();
    if !unmerged.is_empty() {
        return Err(StoreError::UnmergedPaths { paths: unmerged });
    }

    let base_tree = match &base {
        Some(oid) => Some(odb::read_commit(backend, oid).await?.tree),
        None => None,
    };
    let outcome = merge_trees(
        backend,
        base_tree.as_ref(),
        &ours_commit.tree,
        &theirs_commit.tree,
        options.dry_run,
    )
    .await?;

    let merged_tree = match outcome {
        TreeMergeOutcome::Conflicts(conflicts) => {
            if !options.abort_on_conflict && !options.dry_run {
                for conflict in &conflicts {
                    index.set_conflict(
                        &conflict.path,
                        conflict.base.clone(),
                        conflict.ours.clone(),
                        conflict.theirs.clone(),
                    );
                }
                backend
                    .write_index(&index.to_bytes(backend.hash_family()))
                    .await?;
            }
            // Conflict files in the working tree are the worktree backend
            // owner's side of the boundary.
            return Err(StoreError::MergeConflict(conflict_info(&conflicts)));
        }
        TreeMergeOutcome::Merged(tree) => tree,
    };

    if options.dry_run {
        return Ok(MergeOutcome {
            oid: ours_oid,
            tree: merged_tree,
            fast_forward: false,
            already_merged: false,
        });
    }

    let author = merge_identity(backend, options.author.clone()).await?;
    let committer = options.committer.clone().unwrap_or_else(|| author.clone());
    let record = Commit {
        tree: merged_tree.clone(),
        parents: vec![ours_oid.clone(), theirs_oid.clone()],
        author,
        committer: committer.clone(),
        message,
        gpgsig: None,
    };
    let oid = odb::write_object(
        backend,
        ObjectType::Commit,
        &object::serialize_commit(&record),
        ObjectForm::Content,
        false,
    )
    .await?;

    refs::write_ref(backend, &ours_name, &oid, true).await?;
    let entry = ReflogEntry::new(
        ours_oid,
        oid.clone(),
        &committer,
        &reflog::merge_message(short_ref(theirs_ref)),
    );
    if let Err(err) = reflog::append(backend, &ours_name, &entry).await {
        warn!(ref_name = %ours_name, ?err, "reflog append failed, continuing");
    }

    for state in ["MERGE_HEAD", "MERGE_MODE", "MERGE_MSG"] {
        backend.delete_state(state).await?;
    }

    let ctx = HookContext {
        work_tree: worktree
            .and_then(|wt| wt.directory())
            .map(|dir| dir.to_string_lossy().into_owned()),
        head: Some(oid.hex()),
        ..HookContext::default()
    };
    if let Err(err) = hooks::run_hook(
        backend,
        executor,
        "post-merge",
        &ctx,
        None,
        &["0".to_string()],
    )
    .await
    {
        warn!(?err, "post-merge hook failed, ignoring");
    }

    Ok(MergeOutcome {
        oid,
        tree: merged_tree,
        fast_forward: false,
        already_merged: false,
    })
}
