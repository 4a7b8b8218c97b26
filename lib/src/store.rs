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

//! The façade: one operation surface over any backend realization.
//!
//! Wraps the low-level backend, adds a content-addressed object cache, and
//! tags every escaping error with the public operation it came from.

use std::fmt::Debug;
use std::fmt::Formatter;
use std::sync::Arc;
use std::sync::Mutex;

use clru::CLruCache;

use crate::backend::Backend;
use crate::backend::InitOptions;
use crate::backend::PackKind;
use crate::checkout;
use crate::checkout::CheckoutOptions;
use crate::checkout::ResetMode;
use crate::commit;
use crate::commit::CommitOptions;
use crate::commit::CommitOutcome;
use crate::commit::SigningFn;
use crate::error::GitResult;
use crate::error::StoreResult;
use crate::hooks;
use crate::hooks::HookContext;
use crate::hooks::HookExecutor;
use crate::hooks::HookResult;
use crate::index::Index;
use crate::merge;
use crate::merge::MergeOptions;
use crate::merge::MergeOutcome;
use crate::merge::TreeMergeOutcome;
use crate::object_codec::ObjectType;
use crate::object_id::HashFamily;
use crate::object_id::Oid;
use crate::odb;
use crate::odb::ObjectForm;
use crate::odb::RawObject;
use crate::refs;
use crate::refs::PackedRefs;
use crate::reflog;
use crate::reflog::ReflogEntry;
use crate::staging;
use crate::staging::AddOptions;
use crate::staging::UpdateIndexOptions;
use crate::submodule;
use crate::submodule::SubmoduleDescriptor;
use crate::working_copy::WorktreeBackend;

// Objects are immutable and content-addressed, so the cache never goes
// stale; the bound only limits memory.
const OBJECT_CACHE_CAPACITY: usize = 1000;

/// Wraps the low-level backend and makes it return more convenient types.
/// Also adds caching.
pub struct Store {
    backend: Box<dyn Backend>,
    hook_executor: Option<Box<dyn HookExecutor>>,
    object_cache: Mutex<CLruCache<Oid, Arc<(ObjectType, Vec<u8>)>>>,
}

impl Debug for Store {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.debug_struct("Store")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl Store {
    pub fn new(backend: Box<dyn Backend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            hook_executor: None,
            object_cache: Mutex::new(CLruCache::new(OBJECT_CACHE_CAPACITY.try_into().unwrap())),
        })
    }

    pub fn with_hook_executor(
        backend: Box<dyn Backend>,
        hook_executor: Box<dyn HookExecutor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            hook_executor: Some(hook_executor),
            object_cache: Mutex::new(CLruCache::new(OBJECT_CACHE_CAPACITY.try_into().unwrap())),
        })
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Returns backend as the implementation type.
    pub fn backend_impl<T: Backend>(&self) -> Option<&T> {
        self.backend.downcast_ref()
    }

    pub fn hash_family(&self) -> HashFamily {
        self.backend.hash_family()
    }

    fn executor(&self) -> Option<&dyn HookExecutor> {
        self.hook_executor.as_deref()
    }

    // Lifecycle

    pub async fn init(&self, options: &InitOptions) -> GitResult<()> {
        self.backend
            .init(options)
            .await
            .map_err(|err| err.at("git.init"))
    }

    /// `init` with default options.
    pub async fn initialize(&self) -> GitResult<()> {
        self.init(&InitOptions::default()).await
    }

    pub async fn is_initialized(&self) -> GitResult<bool> {
        self.backend
            .is_initialized()
            .await
            .map_err(|err| err.at("git.is_initialized"))
    }

    pub async fn exists(&self, relpath: &str) -> GitResult<bool> {
        self.backend
            .exists(relpath)
            .await
            .map_err(|err| err.at("git.exists"))
    }

    pub async fn close(&self) -> GitResult<()> {
        self.object_cache.lock().unwrap().clear();
        self.backend
            .close()
            .await
            .map_err(|err| err.at("git.close"))
    }

    // Core metadata

    pub async fn read_head(&self) -> GitResult<Option<String>> {
        self.backend
            .read_head()
            .await
            .map_err(|err| err.at("git.read_head"))
    }

    pub async fn write_head(&self, value: &str) -> GitResult<()> {
        self.backend
            .write_head(value)
            .await
            .map_err(|err| err.at("git.write_head"))
    }

    pub async fn read_config(&self) -> GitResult<Option<String>> {
        self.backend
            .read_config()
            .await
            .map_err(|err| err.at("git.read_config"))
    }

    pub async fn write_config(&self, text: &str) -> GitResult<()> {
        self.backend
            .write_config(text)
            .await
            .map_err(|err| err.at("git.write_config"))
    }

    pub async fn read_index(&self) -> GitResult<Index> {
        staging::load_index(self.backend())
            .await
            .map_err(|err| err.at("git.read_index"))
    }

    pub async fn write_index(&self, index: &Index) -> GitResult<()> {
        self.backend
            .write_index(&index.to_bytes(self.hash_family()))
            .await
            .map_err(|err| err.at("git.write_index"))
    }

    pub async fn read_description(&self) -> GitResult<Option<String>> {
        self.backend
            .read_description()
            .await
            .map_err(|err| err.at("git.read_description"))
    }

    pub async fn write_description(&self, text: &str) -> GitResult<()> {
        self.backend
            .write_description(text)
            .await
            .map_err(|err| err.at("git.write_description"))
    }

    pub async fn read_state(&self, name: &str) -> GitResult<Option<Vec<u8>>> {
        self.backend
            .read_state(name)
            .await
            .map_err(|err| err.at("git.read_state"))
    }

    pub async fn write_state(&self, name: &str, value: &[u8]) -> GitResult<()> {
        self.backend
            .write_state(name, value)
            .await
            .map_err(|err| err.at("git.write_state"))
    }

    pub async fn delete_state(&self, name: &str) -> GitResult<()> {
        self.backend
            .delete_state(name)
            .await
            .map_err(|err| err.at("git.delete_state"))
    }

    pub async fn list_state(&self) -> GitResult<Vec<String>> {
        self.backend
            .list_state()
            .await
            .map_err(|err| err.at("git.list_state"))
    }

    // Object store

    pub async fn read_object(&self, oid: &Oid, form: ObjectForm) -> GitResult<RawObject> {
        if form == ObjectForm::Content {
            if let Some(cached) = self.object_cache.lock().unwrap().get(oid) {
                return Ok(RawObject {
                    otype: cached.0,
                    bytes: cached.1.clone(),
                    form,
                });
            }
        }
        let raw = odb::read_object(self.backend(), oid, form)
            .await
            .map_err(|err| err.at("git.read_object"))?;
        if raw.form == ObjectForm::Content {
            self.object_cache
                .lock()
                .unwrap()
                .put(oid.clone(), Arc::new((raw.otype, raw.bytes.clone())));
        }
        Ok(raw)
    }

    pub async fn write_object(
        &self,
        otype: ObjectType,
        bytes: &[u8],
        form: ObjectForm,
        dry_run: bool,
    ) -> GitResult<Oid> {
        odb::write_object(self.backend(), otype, bytes, form, dry_run)
            .await
            .map_err(|err| err.at("git.write_object"))
    }

    pub async fn read_loose(&self, oid: &Oid) -> GitResult<Option<Vec<u8>>> {
        self.backend
            .read_loose(oid)
            .await
            .map_err(|err| err.at("git.read_loose"))
    }

    pub async fn write_loose(&self, oid: &Oid, deflated: &[u8]) -> GitResult<()> {
        self.backend
            .write_loose(oid, deflated)
            .await
            .map_err(|err| err.at("git.write_loose"))
    }

    pub async fn list_loose(&self) -> GitResult<Vec<Oid>> {
        self.backend
            .list_loose()
            .await
            .map_err(|err| err.at("git.list_loose"))
    }

    pub async fn read_pack(&self, name: &str) -> GitResult<Option<Vec<u8>>> {
        self.backend
            .read_pack(name, PackKind::Pack)
            .await
            .map_err(|err| err.at("git.read_pack"))
    }

    pub async fn write_pack(&self, name: &str, data: &[u8]) -> GitResult<()> {
        self.backend
            .write_pack(name, PackKind::Pack, data)
            .await
            .map_err(|err| err.at("git.write_pack"))
    }

    pub async fn read_pack_index(&self, name: &str) -> GitResult<Option<Vec<u8>>> {
        self.backend
            .read_pack(name, PackKind::Idx)
            .await
            .map_err(|err| err.at("git.read_pack_index"))
    }

    pub async fn write_pack_index(&self, name: &str, data: &[u8]) -> GitResult<()> {
        self.backend
            .write_pack(name, PackKind::Idx, data)
            .await
            .map_err(|err| err.at("git.write_pack_index"))
    }

    pub async fn list_packs(&self) -> GitResult<Vec<String>> {
        self.backend
            .list_packs()
            .await
            .map_err(|err| err.at("git.list_packs"))
    }

    // Refs

    pub async fn read_ref(&self, name: &str, depth: u32) -> GitResult<Option<String>> {
        refs::read_ref(self.backend(), name, depth)
            .await
            .map_err(|err| err.at("git.read_ref"))
    }

    pub async fn resolve_ref(&self, name: &str) -> GitResult<Oid> {
        refs::resolve_ref(self.backend(), name)
            .await
            .map_err(|err| err.at("git.read_ref"))
    }

    pub async fn write_ref(&self, name: &str, oid: &Oid, skip_reflog: bool) -> GitResult<()> {
        refs::write_ref(self.backend(), name, oid, skip_reflog)
            .await
            .map_err(|err| err.at("git.write_ref"))
    }

    pub async fn write_symref(
        &self,
        name: &str,
        target: &str,
        expected_old: Option<&str>,
    ) -> GitResult<()> {
        refs::write_symref(self.backend(), name, target, expected_old)
            .await
            .map_err(|err| err.at("git.write_symref"))
    }

    pub async fn read_symref(&self, name: &str) -> GitResult<Option<String>> {
        refs::read_symref(self.backend(), name)
            .await
            .map_err(|err| err.at("git.read_symref"))
    }

    pub async fn delete_ref(&self, name: &str) -> GitResult<()> {
        refs::delete_ref(self.backend(), name)
            .await
            .map_err(|err| err.at("git.delete_ref"))
    }

    pub async fn list_refs(&self, prefix: &str) -> GitResult<Vec<String>> {
        refs::list_refs(self.backend(), prefix)
            .await
            .map_err(|err| err.at("git.list_refs"))
    }

    pub async fn expand_ref(&self, name: &str) -> GitResult<String> {
        refs::expand_ref(self.backend(), name)
            .await
            .map_err(|err| err.at("git.expand_ref"))
    }

    pub async fn read_packed_refs(&self) -> GitResult<Option<PackedRefs>> {
        let text = self
            .backend
            .read_packed_refs_text()
            .await
            .map_err(|err| err.at("git.read_packed_refs"))?;
        text.map(|text| PackedRefs::parse(&text))
            .transpose()
            .map_err(|err| err.at("git.read_packed_refs"))
    }

    pub async fn write_packed_refs(&self, text: &str) -> GitResult<()> {
        self.backend
            .write_packed_refs_text(text)
            .await
            .map_err(|err| err.at("git.write_packed_refs"))
    }

    // Reflog

    pub async fn read_reflog(&self, name: &str) -> GitResult<Vec<ReflogEntry>> {
        reflog::read(self.backend(), name)
            .await
            .map_err(|err| err.at("git.read_reflog"))
    }

    pub async fn append_reflog(&self, name: &str, entry: &ReflogEntry) -> GitResult<()> {
        reflog::append(self.backend(), name, entry)
            .await
            .map_err(|err| err.at("git.append_reflog"))
    }

    pub async fn delete_reflog(&self, name: &str) -> GitResult<()> {
        self.backend
            .delete_reflog(name)
            .await
            .map_err(|err| err.at("git.delete_reflog"))
    }

    pub async fn list_reflogs(&self) -> GitResult<Vec<String>> {
        self.backend
            .list_reflogs()
            .await
            .map_err(|err| err.at("git.list_reflogs"))
    }

    // Hooks

    pub async fn has_hook(&self, name: &str) -> GitResult<bool> {
        hooks::has_hook(self.backend(), name)
            .await
            .map_err(|err| err.at("git.has_hook"))
    }

    pub async fn run_hook(
        &self,
        name: &str,
        ctx: &HookContext,
        stdin: Option<&[u8]>,
        args: &[String],
    ) -> GitResult<HookResult> {
        hooks::run_hook(self.backend(), self.executor(), name, ctx, stdin, args)
            .await
            .map_err(|err| err.at("git.run_hook"))
    }

    // High-level operations

    pub async fn add(
        &self,
        worktree: &dyn WorktreeBackend,
        paths: &[String],
        options: &AddOptions,
    ) -> GitResult<Vec<(String, Oid)>> {
        staging::add(self.backend(), worktree, paths, options)
            .await
            .map_err(|err| err.at("git.add"))
    }

    pub async fn remove(&self, paths: &[String]) -> GitResult<()> {
        staging::remove(self.backend(), paths)
            .await
            .map_err(|err| err.at("git.remove"))
    }

    pub async fn update_index(
        &self,
        worktree: &dyn WorktreeBackend,
        path: &str,
        options: &UpdateIndexOptions,
    ) -> GitResult<Option<Oid>> {
        staging::update_index(self.backend(), worktree, path, options)
            .await
            .map_err(|err| err.at("git.update_index"))
    }

    pub async fn commit(
        &self,
        worktree: Option<&dyn WorktreeBackend>,
        options: CommitOptions,
        sign_with: Option<&mut SigningFn<'_>>,
    ) -> GitResult<CommitOutcome> {
        commit::commit(self.backend(), self.executor(), worktree, options, sign_with)
            .await
            .map_err(|err| err.at("git.commit"))
    }

    pub async fn checkout(
        &self,
        worktree: &dyn WorktreeBackend,
        refname: &str,
        options: &CheckoutOptions,
    ) -> GitResult<Oid> {
        checkout::checkout(self.backend(), worktree, self.executor(), refname, options)
            .await
            .map_err(|err| err.at("git.checkout"))
    }

    pub async fn reset(
        &self,
        worktree: Option<&dyn WorktreeBackend>,
        refname: &str,
        mode: ResetMode,
    ) -> GitResult<Oid> {
        checkout::reset(self.backend(), worktree, refname, mode)
            .await
            .map_err(|err| err.at("git.reset"))
    }

    pub async fn merge(
        &self,
        ours_ref: &str,
        theirs_ref: &str,
        options: MergeOptions,
    ) -> GitResult<MergeOutcome> {
        merge::merge(self.backend(), None, self.executor(), ours_ref, theirs_ref, options)
            .await
            .map_err(|err| err.at("git.merge"))
    }

    /// Tree-level three-way merge without ref or state effects.
    pub async fn merge_tree(
        &self,
        ours: &Oid,
        base: Option<&Oid>,
        theirs: &Oid,
        dry_run: bool,
    ) -> GitResult<TreeMergeOutcome> {
        merge::merge_trees(self.backend(), base, ours, theirs, dry_run)
            .await
            .map_err(|err| err.at("git.merge_tree"))
    }

    // Worktrees

    pub async fn list_worktrees(&self) -> GitResult<Vec<String>> {
        self.backend
            .list_worktrees()
            .await
            .map_err(|err| err.at("git.list_worktrees"))
    }

    pub async fn add_worktree(&self, name: &str, workdir: &str) -> GitResult<()> {
        self.backend
            .add_worktree(name, workdir)
            .await
            .map_err(|err| err.at("git.add_worktree"))
    }

    pub async fn remove_worktree(&self, name: &str) -> GitResult<()> {
        self.backend
            .remove_worktree(name)
            .await
            .map_err(|err| err.at("git.remove_worktree"))
    }

    // Submodules

    pub async fn list_submodules(
        &self,
        worktree: &dyn WorktreeBackend,
    ) -> GitResult<Vec<SubmoduleDescriptor>> {
        submodule::list_submodules(worktree)
            .await
            .map_err(|err| err.at("git.list_submodules"))
    }

    pub async fn get_submodule(
        &self,
        worktree: &dyn WorktreeBackend,
        path: &str,
    ) -> GitResult<SubmoduleDescriptor> {
        submodule::get_submodule(worktree, path)
            .await
            .map_err(|err| err.at("git.get_submodule"))
    }

    pub async fn set_submodule(
        &self,
        worktree: &dyn WorktreeBackend,
        descriptor: SubmoduleDescriptor,
    ) -> GitResult<()> {
        submodule::set_submodule(worktree, descriptor)
            .await
            .map_err(|err| err.at("git.set_submodule"))
    }

    // Sparse checkout

    pub async fn read_sparse_checkout(&self) -> GitResult<Vec<String>> {
        let patterns: StoreResult<Vec<String>> = async {
            Ok(match self.backend.read_state("info/sparse-checkout").await? {
                Some(bytes) => String::from_utf8_lossy(&bytes)
                    .lines()
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect(),
                None => Vec::new(),
            })
        }
        .await;
        patterns.map_err(|err| err.at("git.read_sparse_checkout"))
    }

    pub async fn write_sparse_checkout(&self, patterns: &[String]) -> GitResult<()> {
        let mut text = patterns.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        self.backend
            .write_state("info/sparse-checkout", text.as_bytes())
            .await
            .map_err(|err| err.at("git.write_sparse_checkout"))
    }
}
