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

//! The substrate contract every repository realization implements.
//!
//! The trait covers the primitive operations on a gitdir-shaped store:
//! metadata files, the loose/packed object substrate, raw ref files, the
//! reflog, hooks, state files, worktrees and locks. Everything above it
//! (ref resolution, the index codec, the commit pipeline, the merge engine)
//! is plain functions parameterized over `&dyn Backend`, so the filesystem,
//! SQL and in-memory realizations share one semantics.

use std::any::Any;
use std::fmt::Debug;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::object_codec::ObjectType;
use crate::object_id::HashFamily;
use crate::object_id::Oid;

/// Options for creating a repository. Always produces a bare layout.
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub default_branch: String,
    pub object_format: HashFamily,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            default_branch: "master".to_string(),
            object_format: HashFamily::Sha1,
        }
    }
}

/// Resolves objects that live in pack files. Pack parsing and delta
/// reconstruction are outside this crate; a backend may be handed an
/// implementation of this capability at construction.
#[async_trait]
pub trait PackResolver: Send + Sync + Debug {
    /// Returns the object in content form, or `None` if no pack holds it.
    async fn read(&self, oid: &Oid) -> StoreResult<Option<(ObjectType, Vec<u8>)>>;
}

/// An acquired exclusive lock. Dropping the value releases it.
pub struct BackendLock {
    _guard: Option<Box<dyn Any + Send>>,
}

impl BackendLock {
    pub fn new(guard: impl Any + Send + 'static) -> Self {
        Self {
            _guard: Some(Box::new(guard)),
        }
    }

    /// A lock with nothing to release. Used by realizations whose substrate
    /// already serializes access.
    pub fn noop() -> Self {
        Self { _guard: None }
    }
}

impl Debug for BackendLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendLock").finish_non_exhaustive()
    }
}

/// The kind of blob stored next to a pack: the pack itself, its index, a
/// reachability bitmap or the multi-pack index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackKind {
    Pack,
    Idx,
    Bitmap,
    Midx,
}

impl PackKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pack => "pack",
            Self::Idx => "idx",
            Self::Bitmap => "bitmap",
            Self::Midx => "midx",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pack" => Some(Self::Pack),
            "idx" => Some(Self::Idx),
            "bitmap" => Some(Self::Bitmap),
            "midx" => Some(Self::Midx),
            _ => None,
        }
    }
}

/// Defines the storage substrate of one repository.
///
/// All paths are forward-slash relative names inside the gitdir. Values
/// passed to the line-oriented writers (`write_head`, `write_ref_file`) are
/// logical values; the realization owns the trailing newline.
#[async_trait]
pub trait Backend: Any + Send + Sync + Debug {
    /// A unique name identifying this realization, as used by the registry.
    fn name(&self) -> &str;

    /// The repository-wide hash family. Locked by `init`.
    fn hash_family(&self) -> HashFamily;

    /// The pack resolver capability, if one was supplied.
    fn pack_resolver(&self) -> Option<&dyn PackResolver> {
        None
    }

    // Lifecycle

    async fn init(&self, options: &InitOptions) -> StoreResult<()>;
    async fn is_initialized(&self) -> StoreResult<bool>;
    /// Whether `relpath` names an existing file inside the gitdir.
    async fn exists(&self, relpath: &str) -> StoreResult<bool>;
    async fn close(&self) -> StoreResult<()>;

    // Core metadata

    async fn read_head(&self) -> StoreResult<Option<String>>;
    async fn write_head(&self, value: &str) -> StoreResult<()>;
    async fn read_config(&self) -> StoreResult<Option<String>>;
    async fn write_config(&self, text: &str) -> StoreResult<()>;
    async fn read_worktree_config(&self) -> StoreResult<Option<String>>;
    async fn write_worktree_config(&self, text: &str) -> StoreResult<()>;
    async fn read_index(&self) -> StoreResult<Option<Vec<u8>>>;
    async fn write_index(&self, data: &[u8]) -> StoreResult<()>;
    async fn read_description(&self) -> StoreResult<Option<String>>;
    async fn write_description(&self, text: &str) -> StoreResult<()>;

    // State files (`MERGE_HEAD`, `ORIG_HEAD`, `sequencer/todo`, `shallow`,
    // `info/sparse-checkout`, `lfs/...`, `git-daemon-export-ok`, ...)

    async fn read_state(&self, name: &str) -> StoreResult<Option<Vec<u8>>>;
    async fn write_state(&self, name: &str, value: &[u8]) -> StoreResult<()>;
    async fn delete_state(&self, name: &str) -> StoreResult<()>;
    async fn list_state(&self) -> StoreResult<Vec<String>>;

    // Object store

    /// Returns the raw deflated bytes of a loose object, or `None`.
    async fn read_loose(&self, oid: &Oid) -> StoreResult<Option<Vec<u8>>>;
    /// Stores a loose object. Write-once: when the object already exists the
    /// call is a silent no-op that leaves the stored bytes untouched.
    async fn write_loose(&self, oid: &Oid, deflated: &[u8]) -> StoreResult<()>;
    async fn list_loose(&self) -> StoreResult<Vec<Oid>>;

    async fn read_pack(&self, name: &str, kind: PackKind) -> StoreResult<Option<Vec<u8>>>;
    async fn write_pack(&self, name: &str, kind: PackKind, data: &[u8]) -> StoreResult<()>;
    async fn list_packs(&self) -> StoreResult<Vec<String>>;

    // Refs, raw substrate: resolution lives in `refs`

    async fn read_ref_file(&self, name: &str) -> StoreResult<Option<String>>;
    async fn write_ref_file(&self, name: &str, value: &str) -> StoreResult<()>;
    async fn delete_ref_file(&self, name: &str) -> StoreResult<()>;
    /// Full names of loose refs under `prefix` (e.g. `refs/heads`).
    async fn list_ref_files(&self, prefix: &str) -> StoreResult<Vec<String>>;
    async fn read_packed_refs_text(&self) -> StoreResult<Option<String>>;
    async fn write_packed_refs_text(&self, text: &str) -> StoreResult<()>;

    // Reflog

    async fn read_reflog_raw(&self, name: &str) -> StoreResult<Option<String>>;
    async fn append_reflog_raw(&self, name: &str, line: &str) -> StoreResult<()>;
    async fn delete_reflog(&self, name: &str) -> StoreResult<()>;
    async fn list_reflogs(&self) -> StoreResult<Vec<String>>;

    // Hooks

    /// Executable path of the named hook, if this substrate exposes hooks as
    /// files and the hook exists. `hooks_dir` overrides the default location
    /// (`core.hooksPath`).
    async fn hook_path(&self, name: &str, hooks_dir: Option<&str>) -> StoreResult<Option<PathBuf>>;
    /// The hook's content for substrates that store hooks as blobs.
    async fn hook_blob(&self, name: &str) -> StoreResult<Option<Vec<u8>>>;
    async fn write_hook(&self, name: &str, data: &[u8]) -> StoreResult<()>;

    // Worktrees

    async fn list_worktrees(&self) -> StoreResult<Vec<String>>;
    async fn add_worktree(&self, name: &str, workdir: &str) -> StoreResult<()>;
    async fn remove_worktree(&self, name: &str) -> StoreResult<()>;

    // Locks

    /// The index lock, held across a whole commit critical section.
    async fn lock_index(&self) -> StoreResult<BackendLock>;
    /// A per-ref lock around the read-modify-write cycle of ref updates.
    async fn lock_ref(&self, name: &str) -> StoreResult<BackendLock>;
}

impl dyn Backend {
    /// Returns reference of the implementation type.
    pub fn downcast_ref<T: Backend>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref()
    }
}

/// The config text `init` writes. Always a bare repository.
pub fn initial_config(options: &InitOptions) -> String {
    let mut file = crate::config::ConfigFile::default();
    let format_version = match options.object_format {
        HashFamily::Sha1 => "0",
        HashFamily::Sha256 => "1",
    };
    file.set("core.repositoryformatversion", format_version);
    file.set("core.filemode", "false");
    file.set("core.bare", "true");
    file.set("core.symlinks", "false");
    file.set("core.ignorecase", "true");
    file.set("core.logallrefupdates", "true");
    if options.object_format == HashFamily::Sha256 {
        file.set("extensions.objectformat", "sha256");
    }
    file.serialize()
}

/// The `HEAD` value `init` writes.
pub fn initial_head(options: &InitOptions) -> String {
    format!("ref: refs/heads/{}", options.default_branch)
}

/// The hash family recorded in an existing config text, defaulting to sha1.
pub fn config_hash_family(config_text: &str) -> HashFamily {
    crate::config::ConfigFile::parse(config_text)
        .get("extensions.objectformat")
        .and_then(HashFamily::from_name)
        .unwrap_or(HashFamily::Sha1)
}

/// Re-initialization is a no-op, except that it refuses to flip an
/// already-recorded `extensions.objectformat`.
pub fn check_reinit(existing_config: &str, options: &InitOptions) -> StoreResult<()> {
    let existing = config_hash_family(existing_config);
    if existing != options.object_format {
        return Err(crate::error::StoreError::Unsupported(format!(
            "repository object format is already {}, refusing to switch to {}",
            existing.name(),
            options.object_format.name()
        )));
    }
    Ok(())
}
