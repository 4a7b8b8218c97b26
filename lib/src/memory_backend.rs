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

//! The ephemeral realization: the whole gitdir in process memory.
//!
//! Mirrors the SQL schema in `BTreeMap`s. Because there is no ambient file
//! presence, a `written_files` set backs `exists`; every write records the
//! relpath a filesystem realization would have touched. `close()` clears
//! everything.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::backend;
use crate::backend::Backend;
use crate::backend::BackendLock;
use crate::backend::InitOptions;
use crate::backend::PackKind;
use crate::error::StoreError;
use crate::error::StoreResult;
use crate::object_id::HashFamily;
use crate::object_id::Oid;

#[derive(Debug, Default)]
struct Inner {
    initialized: bool,
    metadata: BTreeMap<String, Vec<u8>>,
    loose: BTreeMap<String, Vec<u8>>,
    packs: BTreeMap<(String, String), Vec<u8>>,
    refs: BTreeMap<String, String>,
    packed_refs: Option<String>,
    reflogs: BTreeMap<String, String>,
    hooks: BTreeMap<String, Vec<u8>>,
    state: BTreeMap<String, Vec<u8>>,
    worktrees: BTreeMap<String, String>,
    written_files: BTreeSet<String>,
}

/// An advisory lock table shared by the in-memory and SQL realizations.
#[derive(Debug, Default, Clone)]
pub(crate) struct LockTable {
    claimed: Arc<Mutex<BTreeSet<String>>>,
}

pub(crate) struct LockClaim {
    key: String,
    table: Arc<Mutex<BTreeSet<String>>>,
}

impl Drop for LockClaim {
    fn drop(&mut self) {
        self.table.lock().unwrap().remove(&self.key);
    }
}

impl LockTable {
    pub(crate) fn claim(&self, key: &str) -> StoreResult<BackendLock> {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        loop {
            if self.claimed.lock().unwrap().insert(key.to_string()) {
                return Ok(BackendLock::new(LockClaim {
                    key: key.to_string(),
                    table: self.claimed.clone(),
                }));
            }
            if std::time::Instant::now() >= deadline {
                return Err(StoreError::Conflict {
                    name: key.to_string(),
                });
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }
}

#[derive(Debug)]
pub struct MemoryBackend {
    family: RwLock<HashFamily>,
    inner: Mutex<Inner>,
    locks: LockTable,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(HashFamily::Sha1)
    }
}

impl MemoryBackend {
    pub fn name() -> &'static str {
        "memory"
    }

    pub fn new(family: HashFamily) -> Self {
        Self {
            family: RwLock::new(family),
            inner: Mutex::new(Inner::default()),
            locks: LockTable::default(),
        }
    }

    fn loose_relpath(oid: &Oid) -> String {
        let hex = oid.hex();
        format!("objects/{}/{}", &hex[..2], &hex[2..])
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        Self::name()
    }

    fn hash_family(&self) -> HashFamily {
        *self.family.read().unwrap()
    }

    async fn init(&self, options: &InitOptions) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.metadata.get("config") {
            let text = String::from_utf8_lossy(existing).into_owned();
            return backend::check_reinit(&text, options);
        }
        inner
            .metadata
            .insert("config".to_string(), backend::initial_config(options).into_bytes());
        inner
            .metadata
            .insert("HEAD".to_string(), backend::initial_head(options).into_bytes());
        inner.written_files.insert("config".to_string());
        inner.written_files.insert("HEAD".to_string());
        inner.initialized = true;
        *self.family.write().unwrap() = options.object_format;
        Ok(())
    }

    async fn is_initialized(&self) -> StoreResult<bool> {
        Ok(self.inner.lock().unwrap().initialized)
    }

    async fn exists(&self, relpath: &str) -> StoreResult<bool> {
        Ok(self.inner.lock().unwrap().written_files.contains(relpath))
    }

    async fn close(&self) -> StoreResult<()> {
        *self.inner.lock().unwrap() = Inner::default();
        Ok(())
    }

    async fn read_head(&self) -> StoreResult<Option<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .metadata
            .get("HEAD")
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string()))
    }

    async fn write_head(&self, value: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .metadata
            .insert("HEAD".to_string(), value.as_bytes().to_vec());
        inner.written_files.insert("HEAD".to_string());
        Ok(())
    }

    async fn read_config(&self) -> StoreResult<Option<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .metadata
            .get("config")
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
    }

    async fn write_config(&self, text: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .metadata
            .insert("config".to_string(), text.as_bytes().to_vec());
        inner.written_files.insert("config".to_string());
        Ok(())
    }

    async fn read_worktree_config(&self) -> StoreResult<Option<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .metadata
            .get("config.worktree")
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
    }

    async fn write_worktree_config(&self, text: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .metadata
            .insert("config.worktree".to_string(), text.as_bytes().to_vec());
        inner.written_files.insert("config.worktree".to_string());
        Ok(())
    }

    async fn read_index(&self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.inner.lock().unwrap().metadata.get("index").cloned())
    }

    async fn write_index(&self, data: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.metadata.insert("index".to_string(), data.to_vec());
        inner.written_files.insert("index".to_string());
        Ok(())
    }

    async fn read_description(&self) -> StoreResult<Option<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .metadata
            .get("description")
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
    }

    async fn write_description(&self, text: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .metadata
            .insert("description".to_string(), text.as_bytes().to_vec());
        inner.written_files.insert("description".to_string());
        Ok(())
    }

    async fn read_state(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.inner.lock().unwrap().state.get(name).cloned())
    }

    async fn write_state(&self, name: &str, value: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.state.insert(name.to_string(), value.to_vec());
        inner.written_files.insert(name.to_string());
        Ok(())
    }

    async fn delete_state(&self, name: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.state.remove(name);
        inner.written_files.remove(name);
        Ok(())
    }

    async fn list_state(&self) -> StoreResult<Vec<String>> {
        Ok(self.inner.lock().unwrap().state.keys().cloned().collect())
    }

    async fn read_loose(&self, oid: &Oid) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.inner.lock().unwrap().loose.get(&oid.hex()).cloned())
    }

    async fn write_loose(&self, oid: &Oid, deflated: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        // Write-once: a second write of the same id is a no-op.
        inner
            .loose
            .entry(oid.hex())
            .or_insert_with(|| deflated.to_vec());
        inner.written_files.insert(Self::loose_relpath(oid));
        Ok(())
    }

    async fn list_loose(&self) -> StoreResult<Vec<Oid>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .loose
            .keys()
            .filter_map(Oid::try_from_hex)
            .collect())
    }

    async fn read_pack(&self, name: &str, kind: PackKind) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .packs
            .get(&(name.to_string(), kind.as_str().to_string()))
            .cloned())
    }

    async fn write_pack(&self, name: &str, kind: PackKind, data: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .packs
            .insert((name.to_string(), kind.as_str().to_string()), data.to_vec());
        inner
            .written_files
            .insert(format!("objects/pack/{name}.{}", kind.as_str()));
        Ok(())
    }

    async fn list_packs(&self) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let mut names: Vec<String> = inner
            .packs
            .keys()
            .filter(|(_, kind)| kind == "pack")
            .map(|(name, _)| name.clone())
            .collect();
        names.dedup();
        Ok(names)
    }

    async fn read_ref_file(&self, name: &str) -> StoreResult<Option<String>> {
        Ok(self.inner.lock().unwrap().refs.get(name).cloned())
    }

    async fn write_ref_file(&self, name: &str, value: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.refs.insert(name.to_string(), value.to_string());
        inner.written_files.insert(name.to_string());
        Ok(())
    }

    async fn delete_ref_file(&self, name: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.refs.remove(name);
        inner.written_files.remove(name);
        Ok(())
    }

    async fn list_ref_files(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .refs
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn read_packed_refs_text(&self) -> StoreResult<Option<String>> {
        Ok(self.inner.lock().unwrap().packed_refs.clone())
    }

    async fn write_packed_refs_text(&self, text: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.packed_refs = Some(text.to_string());
        inner.written_files.insert("packed-refs".to_string());
        Ok(())
    }

    async fn read_reflog_raw(&self, name: &str) -> StoreResult<Option<String>> {
        Ok(self.inner.lock().unwrap().reflogs.get(name).cloned())
    }

    async fn append_reflog_raw(&self, name: &str, line: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .reflogs
            .entry(name.to_string())
            .or_default()
            .push_str(line);
        inner.written_files.insert(format!("logs/{name}"));
        Ok(())
    }

    async fn delete_reflog(&self, name: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.reflogs.remove(name);
        inner.written_files.remove(&format!("logs/{name}"));
        Ok(())
    }

    async fn list_reflogs(&self) -> StoreResult<Vec<String>> {
        Ok(self.inner.lock().unwrap().reflogs.keys().cloned().collect())
    }

    async fn hook_path(&self, _name: &str, _hooks_dir: Option<&str>) -> StoreResult<Option<PathBuf>> {
        Ok(None)
    }

    async fn hook_blob(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.inner.lock().unwrap().hooks.get(name).cloned())
    }

    async fn write_hook(&self, name: &str, data: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.hooks.insert(name.to_string(), data.to_vec());
        inner.written_files.insert(format!("hooks/{name}"));
        Ok(())
    }

    async fn list_worktrees(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .worktrees
            .keys()
            .cloned()
            .collect())
    }

    async fn add_worktree(&self, name: &str, workdir: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .worktrees
            .insert(name.to_string(), workdir.to_string());
        inner
            .written_files
            .insert(format!("worktrees/{name}/gitdir"));
        Ok(())
    }

    async fn remove_worktree(&self, name: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.worktrees.remove(name);
        inner
            .written_files
            .remove(&format!("worktrees/{name}/gitdir"));
        Ok(())
    }

    async fn lock_index(&self) -> StoreResult<BackendLock> {
        self.locks.claim("index")
    }

    async fn lock_ref(&self, name: &str) -> StoreResult<BackendLock> {
        self.locks.claim(&format!("ref:{name}"))
    }
}

#[cfg(test)]
mod tests {
    use pollster::FutureExt as _;

    use super::*;

    #[test]
    fn test_exists_tracks_writes() {
        let backend = MemoryBackend::new(HashFamily::Sha1);
        assert!(!backend.exists("HEAD").block_on().unwrap());
        backend.write_head("ref: refs/heads/main").block_on().unwrap();
        assert!(backend.exists("HEAD").block_on().unwrap());

        let oid = Oid::new(vec![0xab; 20]);
        backend.write_loose(&oid, b"x").block_on().unwrap();
        assert!(
            backend
                .exists(&format!("objects/ab/{}", &oid.hex()[2..]))
                .block_on()
                .unwrap()
        );
    }

    #[test]
    fn test_close_clears() {
        let backend = MemoryBackend::new(HashFamily::Sha1);
        backend.init(&InitOptions::default()).block_on().unwrap();
        assert!(backend.is_initialized().block_on().unwrap());
        backend.close().block_on().unwrap();
        assert!(!backend.is_initialized().block_on().unwrap());
        assert!(!backend.exists("HEAD").block_on().unwrap());
    }

    #[test]
    fn test_write_once_loose() {
        let backend = MemoryBackend::new(HashFamily::Sha1);
        let oid = Oid::new(vec![1; 20]);
        backend.write_loose(&oid, b"first").block_on().unwrap();
        backend.write_loose(&oid, b"second").block_on().unwrap();
        assert_eq!(
            backend.read_loose(&oid).block_on().unwrap(),
            Some(b"first".to_vec())
        );
        assert_eq!(backend.list_loose().block_on().unwrap().len(), 1);
    }

    #[test]
    fn test_reinit_refuses_format_change() {
        let backend = MemoryBackend::new(HashFamily::Sha1);
        backend.init(&InitOptions::default()).block_on().unwrap();
        // Same format: no-op.
        backend.init(&InitOptions::default()).block_on().unwrap();
        let err = backend
            .init(&InitOptions {
                object_format: HashFamily::Sha256,
                ..InitOptions::default()
            })
            .block_on()
            .unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));
    }
}
