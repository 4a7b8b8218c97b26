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

//! The failure model shared by every backend and every operation built on
//! top of one.

use thiserror::Error;

use crate::file_util::PathError;

/// Paths involved in a three-way merge conflict, bucketed by how each path
/// conflicted. `filepaths` is the union of the other three lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeConflictInfo {
    pub filepaths: Vec<String>,
    pub both_modified: Vec<String>,
    pub delete_by_us: Vec<String>,
    pub delete_by_them: Vec<String>,
}

/// Error raised by backend operations after the backend is loaded.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("corrupt data: {reason}")]
    Corrupt { reason: String },
    #[error("invalid object id for the repository hash family: {value}")]
    InvalidOid { value: String },
    #[error("unmerged paths in the index: {}", .paths.join(", "))]
    UnmergedPaths { paths: Vec<String> },
    #[error("cannot fast-forward {ours} to {theirs}")]
    FastForwardError { ours: String, theirs: String },
    #[error("merge not supported: {reason}")]
    MergeNotSupported { reason: String },
    #[error("merge conflict in {}", .0.filepaths.join(", "))]
    MergeConflict(MergeConflictInfo),
    #[error("hook `{name}` exited with status {exit}")]
    HookFailed {
        name: String,
        exit: i32,
        stdout: String,
        stderr: String,
    },
    #[error("missing required parameter `{name}`")]
    MissingParameter { name: &'static str },
    #[error("missing identity: {name}")]
    MissingName { name: &'static str },
    #[error("no commit to amend")]
    NoCommit,
    #[error("ref {name} did not match the expected value")]
    Conflict { name: String },
    #[error("unknown backend `{name}`")]
    UnknownBackend { name: String },
    /// A valid operation attempted, but failed because it isn't supported by
    /// the particular backend or repository state.
    #[error("{0}")]
    Unsupported(String),
    #[error("{} independent failures, first: {}", .0.len(), .0[0])]
    Multiple(Vec<GitError>),
    #[error(transparent)]
    Io(#[from] PathError),
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(err.into())
    }

    /// Tags this error with the public operation that raised it.
    pub fn at(self, caller: &'static str) -> GitError {
        GitError {
            caller,
            source: self,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::other(err)
    }
}

/// A [`StoreError`] tagged with the public operation (e.g. `git.add`) it
/// escaped from. This is the error type of the façade surface.
#[derive(Debug, Error)]
#[error("{caller}: {source}")]
pub struct GitError {
    pub caller: &'static str,
    #[source]
    pub source: StoreError,
}

pub type GitResult<T> = Result<T, GitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_tag() {
        let err = StoreError::NotFound {
            what: "ref refs/heads/gone".to_string(),
        }
        .at("git.readRef");
        assert_eq!(err.caller, "git.readRef");
        assert_eq!(
            err.to_string(),
            "git.readRef: ref refs/heads/gone not found"
        );
    }

    #[test]
    fn test_multiple_display() {
        let errs = vec![
            StoreError::NotFound {
                what: "object a1".to_string(),
            }
            .at("git.add"),
            StoreError::NoCommit.at("git.add"),
        ];
        let err = StoreError::Multiple(errs);
        assert!(err.to_string().starts_with("2 independent failures"));
    }
}
