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

//! Integration test utilities for the gitstore crate.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use gitstore::Store;
use gitstore::backend::InitOptions;
use gitstore::error::StoreResult;
use gitstore::fs_backend::FsBackend;
use gitstore::hooks::HookExecutor;
use gitstore::hooks::HookInvocation;
use gitstore::hooks::HookResult;
use gitstore::memory_backend::MemoryBackend;
use gitstore::object::Signature;
use gitstore::object::Timestamp;
use gitstore::object_id::HashFamily;
use gitstore::sql_backend::SqlBackend;
use gitstore::working_copy::LocalWorktree;
use pollster::FutureExt as _;
use tempfile::TempDir;

pub fn new_temp_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("gitstore-test-")
        .tempdir()
        .unwrap()
}

/// The three backend realizations integration tests parameterize over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestBackendKind {
    Fs,
    Sql,
    Memory,
}

/// An initialized store plus a scratch worktree, on temp storage that lives
/// as long as this value.
pub struct TestStore {
    pub store: Arc<Store>,
    pub worktree: LocalWorktree,
    temp_dir: TempDir,
    kind: TestBackendKind,
}

impl TestStore {
    /// Initializes a bare repository with `main` as the default branch.
    pub fn init(kind: TestBackendKind) -> Self {
        Self::init_with_options(
            kind,
            &InitOptions {
                default_branch: "main".to_string(),
                object_format: HashFamily::Sha1,
            },
            None,
        )
    }

    pub fn init_with_executor(kind: TestBackendKind, executor: Box<dyn HookExecutor>) -> Self {
        Self::init_with_options(
            kind,
            &InitOptions {
                default_branch: "main".to_string(),
                object_format: HashFamily::Sha1,
            },
            Some(executor),
        )
    }

    pub fn init_with_options(
        kind: TestBackendKind,
        options: &InitOptions,
        executor: Option<Box<dyn HookExecutor>>,
    ) -> Self {
        let temp_dir = new_temp_dir();
        let backend: Box<dyn gitstore::backend::Backend> = match kind {
            TestBackendKind::Fs => Box::new(FsBackend::load(temp_dir.path().join("repo.git"))),
            TestBackendKind::Sql => {
                Box::new(SqlBackend::load(temp_dir.path().join("repo.db")).unwrap())
            }
            TestBackendKind::Memory => Box::new(MemoryBackend::new(options.object_format)),
        };
        let store = match executor {
            Some(executor) => Store::with_hook_executor(backend, executor),
            None => Store::new(backend),
        };
        store.init(options).block_on().unwrap();
        let workdir = temp_dir.path().join("work");
        std::fs::create_dir_all(&workdir).unwrap();
        Self {
            store,
            worktree: LocalWorktree::new(workdir),
            temp_dir,
            kind,
        }
    }

    pub fn kind(&self) -> TestBackendKind {
        self.kind
    }

    /// The on-disk gitdir (filesystem backend only).
    pub fn gitdir(&self) -> PathBuf {
        assert_eq!(self.kind, TestBackendKind::Fs);
        self.temp_dir.path().join("repo.git")
    }

    pub fn workdir(&self) -> PathBuf {
        self.temp_dir.path().join("work")
    }

    /// Writes a file under the scratch worktree.
    pub fn write_worktree_file(&self, path: &str, content: &[u8]) {
        let host = self.workdir().join(path);
        std::fs::create_dir_all(host.parent().unwrap()).unwrap();
        std::fs::write(host, content).unwrap();
    }
}

/// A deterministic identity for commit assertions.
pub fn signature(name: &str, email: &str, seconds: i64) -> Signature {
    Signature {
        name: name.to_string(),
        email: email.to_string(),
        timestamp: Timestamp {
            seconds,
            tz_offset_minutes: 0,
        },
    }
}

/// A [`HookExecutor`] driven by per-hook scripts: canned exit codes,
/// optional message rewrites, and a record of every invocation.
#[derive(Debug, Default)]
pub struct ScriptedHookExecutor {
    exits: Mutex<HashMap<String, i32>>,
    rewrites: Mutex<HashMap<String, String>>,
    invocations: Mutex<Vec<HookInvocation>>,
}

impl ScriptedHookExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the named hook exit with `code`.
    pub fn set_exit(&self, hook: &str, code: i32) {
        self.exits.lock().unwrap().insert(hook.to_string(), code);
    }

    /// Makes a message-mutating hook replace the message file content.
    pub fn set_rewrite(&self, hook: &str, message: &str) {
        self.rewrites
            .lock()
            .unwrap()
            .insert(hook.to_string(), message.to_string());
    }

    pub fn invoked_hooks(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|invocation| invocation.name.clone())
            .collect()
    }

    pub fn invocations(&self) -> Vec<HookInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl HookExecutor for ScriptedHookExecutor {
    async fn execute(&self, invocation: &HookInvocation) -> StoreResult<HookResult> {
        self.invocations.lock().unwrap().push(invocation.clone());
        if let Some(message) = self.rewrites.lock().unwrap().get(&invocation.name) {
            if let Some(file) = invocation.args.first() {
                std::fs::write(file, message).unwrap();
            }
        }
        let exit = self
            .exits
            .lock()
            .unwrap()
            .get(&invocation.name)
            .copied()
            .unwrap_or(0);
        Ok(HookResult {
            exit,
            stdout: String::new(),
            stderr: if exit == 0 {
                String::new()
            } else {
                format!("{} rejected", invocation.name)
            },
        })
    }
}
