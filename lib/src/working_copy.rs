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

//! The working-directory side of the boundary.
//!
//! The store owns everything under the gitdir; the worktree backend owns
//! everything under the working directory. Operations that need both (add,
//! commit hooks, checkout, merge) take a [`WorktreeBackend`] explicitly.
//! All paths are forward-slash names relative to the working-tree root.

use std::fmt::Debug;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::file_util::IoPathExt as _;
use crate::file_util::PathError;

/// lstat-shaped metadata. Fields a host can't supply are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileMetadata {
    pub is_dir: bool,
    pub is_file: bool,
    pub is_symlink: bool,
    pub mode: u32,
    pub size: u64,
    pub ctime_secs: i64,
    pub ctime_nanos: u32,
    pub mtime_secs: i64,
    pub mtime_nanos: u32,
    pub dev: u64,
    pub ino: u64,
    pub uid: u32,
    pub gid: u32,
}

/// The minimum working-directory interface the store consumes.
#[async_trait]
pub trait WorktreeBackend: Send + Sync + Debug {
    async fn read(&self, path: &str) -> StoreResult<Option<Vec<u8>>>;
    async fn write(&self, path: &str, data: &[u8]) -> StoreResult<()>;
    async fn readlink(&self, path: &str) -> StoreResult<String>;
    async fn lstat(&self, path: &str) -> StoreResult<Option<FileMetadata>>;
    async fn readdir(&self, path: &str) -> StoreResult<Vec<String>>;
    async fn mkdir(&self, path: &str, recursive: bool) -> StoreResult<()>;
    /// Absolute working-tree root, if this backend is rooted on a host path.
    fn directory(&self) -> Option<&Path>;
}

/// A [`WorktreeBackend`] over a local directory.
#[derive(Debug)]
pub struct LocalWorktree {
    root: PathBuf,
}

impl LocalWorktree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn host_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl WorktreeBackend for LocalWorktree {
    async fn read(&self, path: &str) -> StoreResult<Option<Vec<u8>>> {
        let host = self.host_path(path);
        match fs::read(&host) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PathError::new(host, err).into()),
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        let host = self.host_path(path);
        if let Some(parent) = host.parent() {
            fs::create_dir_all(parent).at_path(parent)?;
        }
        fs::write(&host, data).at_path(&host)?;
        Ok(())
    }

    async fn readlink(&self, path: &str) -> StoreResult<String> {
        let host = self.host_path(path);
        let target = fs::read_link(&host).at_path(&host)?;
        Ok(target.to_string_lossy().replace('\\', "/"))
    }

    async fn lstat(&self, path: &str) -> StoreResult<Option<FileMetadata>> {
        let host = self.host_path(path);
        let metadata = match fs::symlink_metadata(&host) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(PathError::new(host, err).into()),
        };
        let (ctime_secs, ctime_nanos) = metadata
            .created()
            .or_else(|_| metadata.modified())
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map_or((0, 0), |d| (d.as_secs() as i64, d.subsec_nanos()));
        let (mtime_secs, mtime_nanos) = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map_or((0, 0), |d| (d.as_secs() as i64, d.subsec_nanos()));
        Ok(Some(FileMetadata {
            is_dir: metadata.is_dir(),
            is_file: metadata.is_file(),
            is_symlink: metadata.file_type().is_symlink(),
            mode: host_mode(&metadata),
            size: metadata.len(),
            ctime_secs,
            ctime_nanos,
            mtime_secs,
            mtime_nanos,
            dev: 0,
            ino: 0,
            uid: 0,
            gid: 0,
        }))
    }

    async fn readdir(&self, path: &str) -> StoreResult<Vec<String>> {
        let host = self.host_path(path);
        let mut names = Vec::new();
        for entry in fs::read_dir(&host).at_path(&host)? {
            let entry = entry.at_path(&host)?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> StoreResult<()> {
        let host = self.host_path(path);
        if recursive {
            fs::create_dir_all(&host).at_path(&host)?;
        } else {
            fs::create_dir(&host).at_path(&host)?;
        }
        Ok(())
    }

    fn directory(&self) -> Option<&Path> {
        Some(&self.root)
    }
}

#[cfg(unix)]
fn host_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt as _;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn host_mode(_metadata: &fs::Metadata) -> u32 {
    0o100644
}

#[cfg(test)]
mod tests {
    use pollster::FutureExt as _;

    use super::*;
    use crate::tests::new_temp_dir;

    #[test]
    fn test_read_write_roundtrip() {
        let temp_dir = new_temp_dir();
        let worktree = LocalWorktree::new(temp_dir.path());
        assert_eq!(worktree.read("missing.txt").block_on().unwrap(), None);
        worktree
            .write("dir/file.txt", b"payload")
            .block_on()
            .unwrap();
        assert_eq!(
            worktree.read("dir/file.txt").block_on().unwrap(),
            Some(b"payload".to_vec())
        );
        let meta = worktree
            .lstat("dir/file.txt")
            .block_on()
            .unwrap()
            .unwrap();
        assert!(meta.is_file);
        assert_eq!(meta.size, 7);
    }

    #[test]
    fn test_readdir_sorted() {
        let temp_dir = new_temp_dir();
        let worktree = LocalWorktree::new(temp_dir.path());
        worktree.write("b.txt", b"").block_on().unwrap();
        worktree.write("a.txt", b"").block_on().unwrap();
        assert_eq!(
            worktree.readdir("").block_on().unwrap(),
            vec!["a.txt", "b.txt"]
        );
    }
}
