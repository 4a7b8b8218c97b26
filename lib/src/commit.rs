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

//! The commit pipeline: index to commit object to ref update, hook-gated.
//!
//! The index lock is held from load through the reflog append, so commits
//! on one repository serialize and a later commit's parent chain includes
//! the earlier one.

use std::io::Read as _;
use std::io::Write as _;

use tracing::warn;

use crate::backend::Backend;
use crate::config::ConfigFile;
use crate::config::ConfigLayers;
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

/// Signs the serialized commit payload, returning the signature bytes to
/// embed as the `gpgsig` header.
pub type SigningFn<'a> = dyn FnMut(&[u8]) -> StoreResult<Vec<u8>> + Send + 'a;

#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Required unless `amend` inherits the previous message.
    pub message: Option<String>,
    pub author: Option<Signature>,
    /// Defaults to the author.
    pub committer: Option<Signature>,
    /// Target ref; defaults to the `HEAD` resolution described below.
    pub target_ref: Option<String>,
    /// Explicit parents win over every other parent source.
    pub parents: Option<Vec<Oid>>,
    pub amend: bool,
    pub allow_empty: bool,
    /// Skip the verifying `pre-commit` hook.
    pub no_verify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub oid: Oid,
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub target_ref: String,
}

async fn config_layers(backend: &dyn Backend) -> ConfigLayers {
    let mut layers = ConfigLayers::default();
    if let Ok(Some(text)) = backend.read_config().await {
        layers.local = ConfigFile::parse(&text);
    }
    if let Ok(Some(text)) = backend.read_worktree_config().await {
        layers.worktree = Some(ConfigFile::parse(&text));
    }
    layers
}

/// The ref a ref-less commit lands on. `HEAD` symref target when present,
/// the literal `HEAD` when detached, and the unborn default branch when
/// `HEAD` doesn't exist yet.
async fn resolve_target_ref(backend: &dyn Backend) -> StoreResult<String> {
    match backend.read_head().await? {
        Some(head) => match head.strip_prefix(refs::SYMREF_PREFIX) {
            Some(target) => Ok(target.trim().to_string()),
            None => Ok("HEAD".to_string()),
        },
        None => {
            let branch = config_layers(backend)
                .await
                .get("init.defaultBranch")
                .unwrap_or_else(|| "master".to_string());
            Ok(format!("refs/heads/{branch}"))
        }
    }
}

async fn author_from_config(backend: &dyn Backend) -> Option<Signature> {
    let layers = config_layers(backend).await;
    Some(Signature {
        name: layers.get("user.name")?,
        email: layers.get("user.email")?,
        timestamp: object::Timestamp::now(),
    })
}

/// Runs a message-mutating hook (`prepare-commit-msg`, `commit-msg`) over a
/// temp file and returns the possibly-edited message. A host without a
/// temp-file substrate degrades by skipping the hook.
async fn run_message_hook(
    backend: &dyn Backend,
    executor: Option<&dyn HookExecutor>,
    name: &str,
    ctx: &HookContext,
    message: &str,
) -> StoreResult<String> {
    if executor.is_none() || !hooks::has_hook(backend, name).await? {
        return Ok(message.to_string());
    }
    let Ok(mut temp_file) = tempfile::NamedTempFile::new() else {
        return Ok(message.to_string());
    };
    if temp_file.write_all(message.as_bytes()).is_err() {
        return Ok(message.to_string());
    }
    let file_arg = temp_file.path().to_string_lossy().into_owned();
    hooks::run_hook(
        backend,
        executor,
        name,
        ctx,
        Some(message.as_bytes()),
        &[file_arg],
    )
    .await?;
    let mut edited = String::new();
    let mut file = temp_file.reopen().map_err(StoreError::other)?;
    file.read_to_string(&mut edited).map_err(StoreError::other)?;
    Ok(edited)
}

pub async fn commit(
    backend: &dyn Backend,
    executor: Option<&dyn HookExecutor>,
    worktree: Option<&dyn WorktreeBackend>,
    options: CommitOptions,
    mut sign_with: Option<&mut SigningFn<'_>>,
) -> StoreResult<CommitOutcome> {
    let target_ref = match &options.target_ref {
        Some(target) => target.clone(),
        None => resolve_target_ref(backend).await?,
    };

    // One concurrent commit per index.
    let _index_lock = backend.lock_index().await?;

    let current_oid = match refs::read_ref(backend, &target_ref, refs::DEFAULT_DEPTH).await? {
        Some(value) if backend.hash_family().is_valid_hex(&value) => {
            Some(Oid::try_from_hex(&value).unwrap())
        }
        _ => None,
    };
    let initial = current_oid.is_none();

    let index = staging::load_index(backend).await?;
    let unmerged = index.unmerged_paths();
    if !unmerged.is_empty() {
        return Err(StoreError::UnmergedPaths { paths: unmerged });
    }
    if index.is_empty() && !initial && !options.amend && !options.allow_empty {
        return Err(StoreError::Unsupported(
            "refusing to commit an empty index on top of existing history".to_string(),
        ));
    }

    let ctx = HookContext {
        gitdir: None,
        work_tree: worktree
            .and_then(|wt| wt.directory())
            .map(|dir| dir.to_string_lossy().into_owned()),
        index_file: Some("index".to_string()),
        branch: Some(target_ref.clone()),
        head: current_oid.as_ref().map(Oid::hex),
        ..HookContext::default()
    };

    if !options.no_verify {
        hooks::run_hook(backend, executor, "pre-commit", &ctx, None, &[]).await?;
    }

    let current_commit = match (&current_oid, options.amend || options.message.is_none()) {
        (Some(oid), true) => Some(odb::read_commit(backend, oid).await?),
        _ => None,
    };
    if options.amend && current_oid.is_none() {
        return Err(StoreError::NoCommit);
    }

    let parents = if let Some(parents) = options.parents.clone() {
        parents
    } else if options.amend {
        current_commit.as_ref().map(|c| c.parents.clone()).unwrap_or_default()
    } else {
        current_oid.iter().cloned().collect()
    };

    let mut message = match options.message.clone() {
        Some(message) => message,
        None if options.amend => {
            current_commit
                .as_ref()
                .map(|c| c.message.clone())
                .ok_or(StoreError::NoCommit)?
        }
        None => return Err(StoreError::MissingParameter { name: "message" }),
    };

    message = run_message_hook(backend, executor, "prepare-commit-msg", &ctx, &message).await?;

    let author = match options.author.clone() {
        Some(author) => author,
        None => author_from_config(backend)
            .await
            .ok_or(StoreError::MissingName { name: "author" })?,
    };
    let committer = options.committer.clone().unwrap_or_else(|| author.clone());

    let tree = tree_builder::write_tree_from_index(backend, &index, false).await?;

    let mut record = Commit {
        tree,
        parents: parents.clone(),
        author,
        committer: committer.clone(),
        message: message.clone(),
        gpgsig: None,
    };
    if let Some(sign) = sign_with.as_deref_mut() {
        let payload = object::serialize_commit(&record);
        let sig = sign(&payload)?;
        record.gpgsig = Some(String::from_utf8_lossy(&sig).into_owned());
    }

    let edited = run_message_hook(backend, executor, "commit-msg", &ctx, &record.message).await?;
    if edited != record.message {
        record.message = edited;
        // The payload changed, so a signature over the old bytes is stale.
        if let Some(sign) = sign_with.as_deref_mut() {
            record.gpgsig = None;
            let payload = object::serialize_commit(&record);
            let sig = sign(&payload)?;
            record.gpgsig = Some(String::from_utf8_lossy(&sig).into_owned());
        }
    }

    let oid = odb::write_object(
        backend,
        ObjectType::Commit,
        &object::serialize_commit(&record),
        ObjectForm::Content,
        false,
    )
    .await?;

    refs::write_ref(backend, &target_ref, &oid, true).await?;
    if initial && backend.read_head().await?.is_none() {
        backend
            .write_head(&format!("{}{target_ref}", refs::SYMREF_PREFIX))
            .await?;
    }

    let entry = ReflogEntry::new(
        current_oid.clone().unwrap_or_else(|| backend.hash_family().zero_oid()),
        oid.clone(),
        &committer,
        &reflog::commit_message(record.summary(), options.amend, initial),
    );
    if let Err(err) = reflog::append(backend, &target_ref, &entry).await {
        warn!(ref_name = %target_ref, ?err, "reflog append failed, continuing");
    }
    if target_ref != "HEAD" {
        let head_points_here = matches!(
            backend.read_head().await,
            Ok(Some(head)) if head.strip_prefix(refs::SYMREF_PREFIX).map(str::trim) == Some(target_ref.as_str())
        );
        if head_points_here {
            if let Err(err) = reflog::append(backend, "HEAD", &entry).await {
                warn!(?err, "HEAD reflog append failed, continuing");
            }
        }
    }

    if let Err(err) = hooks::run_hook(backend, executor, "post-commit", &ctx, None, &[]).await {
        warn!(?err, "post-commit hook failed, ignoring");
    }

    Ok(CommitOutcome {
        oid,
        tree: record.tree,
        parents,
        target_ref,
    })
}
