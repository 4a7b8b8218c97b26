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

//! A storage-backend layer for a Git repository implementation.
//!
//! One operation surface — objects, refs, the staging index, reflogs,
//! hooks, worktrees, submodules, config — with three interchangeable
//! realizations: a filesystem backend laid out bit-compatibly with stock
//! git, an embedded-SQL backend (one SQLite file per repository), and an
//! ephemeral in-memory backend.
//!
//! The substrate contract is [`backend::Backend`]; everything above it (ref
//! resolution, the index codec, the commit pipeline, the merge engine) is
//! plain functions over that contract, wired together by [`store::Store`].
//! Every public operation is an `async fn` that may suspend at substrate
//! boundaries; nothing here multiplexes CPU work across threads.

#![deny(unused_must_use)]

pub mod backend;
pub mod checkout;
pub mod commit;
pub mod config;
pub mod error;
pub mod file_util;
pub mod fs_backend;
pub mod hex_util;
pub mod hooks;
pub mod index;
pub mod lock;
pub mod memory_backend;
pub mod merge;
pub mod object;
pub mod object_codec;
pub mod object_id;
pub mod odb;
pub mod reflog;
pub mod refs;
pub mod registry;
pub mod sql_backend;
pub mod staging;
pub mod store;
pub mod submodule;
pub mod tree_builder;
pub mod working_copy;
pub mod worktree;

pub use crate::error::GitError;
pub use crate::error::StoreError;
pub use crate::store::Store;
