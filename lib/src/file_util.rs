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

//! Small filesystem helpers for the file-backed stores: path-carrying I/O
//! errors and the two write shapes the gitdir needs (replace-atomically,
//! write-once).

use std::fs::File;
use std::io;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tempfile::PersistError;
use thiserror::Error;

/// An I/O error tied to the path it happened on.
#[derive(Debug, Error)]
#[error("I/O error on {}", .path.display())]
pub struct PathError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl PathError {
    pub fn new(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Attaches the offending path to a raw I/O result.
pub trait IoPathExt<T> {
    fn at_path(self, path: impl AsRef<Path>) -> Result<T, PathError>;
}

impl<T> IoPathExt<T> for io::Result<T> {
    fn at_path(self, path: impl AsRef<Path>) -> Result<T, PathError> {
        self.map_err(|source| PathError::new(path.as_ref(), source))
    }
}

/// Replaces `target_file` with `to_write` through a sibling temp file and a
/// rename, so readers observe either the old content or the new, never a
/// torn write. Used for refs, the index and the other mutable gitdir files.
pub fn write_file_atomically(target_file: &Path, to_write: &[u8]) -> Result<(), PathError> {
    let dir = target_file.parent().expect("target file has no parent");
    let mut temp_file = NamedTempFile::new_in(dir).at_path(dir)?;
    temp_file.write_all(to_write).at_path(temp_file.path())?;
    temp_file
        .persist(target_file)
        .map_err(|PersistError { error, file: _ }| error)
        .at_path(target_file)?;
    Ok(())
}

/// Moves a finished temp file into its content-addressed location.
///
/// The target name is a hash of the content, so every writer of that name
/// carries the same bytes. Losing a rename race is therefore success: the
/// file already sitting there is the one this call meant to create, and
/// leaving it untouched also keeps its timestamps stable.
pub fn persist_content_addressed(temp_file: NamedTempFile, target: &Path) -> io::Result<()> {
    // Flush to disk first so a crash can't leave a named-but-empty object.
    temp_file.as_file().sync_data()?;
    match temp_file.persist_noclobber(target) {
        Ok(_file) => Ok(()),
        Err(PersistError { error, file: _ }) => {
            if File::open(target).is_ok() {
                Ok(())
            } else {
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::tests::new_temp_dir;

    #[test]
    fn test_persist_no_existing_file() {
        let temp_dir = new_temp_dir();
        let target = temp_dir.path().join("file");
        let mut temp_file = NamedTempFile::new_in(temp_dir.path()).unwrap();
        temp_file.write_all(b"contents").unwrap();
        assert!(persist_content_addressed(temp_file, &target).is_ok());
        assert_eq!(fs::read(&target).unwrap(), b"contents");
    }

    #[test]
    fn test_persist_target_exists() {
        let temp_dir = new_temp_dir();
        let target = temp_dir.path().join("file");
        let mut temp_file = NamedTempFile::new_in(temp_dir.path()).unwrap();
        temp_file.write_all(b"contents").unwrap();
        fs::write(&target, "contents").unwrap();
        assert!(persist_content_addressed(temp_file, &target).is_ok());
        assert_eq!(fs::read(&target).unwrap(), b"contents");
    }

    #[test]
    fn test_write_file_atomically() {
        let temp_dir = new_temp_dir();
        let target = temp_dir.path().join("file");
        write_file_atomically(&target, b"one").unwrap();
        write_file_atomically(&target, b"two").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"two");
    }

    #[test]
    fn test_at_path_names_the_file() {
        let temp_dir = new_temp_dir();
        let missing = temp_dir.path().join("gone");
        let err = fs::read(&missing).at_path(&missing).unwrap_err();
        assert_eq!(err.path, missing);
        assert!(err.to_string().contains("gone"));
    }
}
