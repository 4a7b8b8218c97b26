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

//! Exclusive lock files, released on drop.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use std::time::Instant;

use tracing::warn;

const TOTAL_WAIT: Duration = Duration::from_secs(10);
const BACKOFF: Duration = Duration::from_millis(10);

/// An exclusive lock backed by a `*.lock` file next to the protected
/// resource. Acquisition spins until the file can be created; dropping the
/// guard unlinks it.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    pub fn lock(path: PathBuf) -> io::Result<Self> {
        let deadline = Instant::now() + TOTAL_WAIT;
        loop {
            match OpenOptions::new().create_new(true).write(true).open(&path) {
                Ok(_file) => return Ok(Self { path }),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("timed out waiting for lock file {}", path.display()),
                        ));
                    }
                    std::thread::sleep(BACKOFF);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), ?err, "failed to remove lock file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::new_temp_dir;

    #[test]
    fn test_lock_released_on_drop() {
        let temp_dir = new_temp_dir();
        let lock_path = temp_dir.path().join("index.lock");
        {
            let _lock = FileLock::lock(lock_path.clone()).unwrap();
            assert!(lock_path.exists());
        }
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_lock_is_exclusive() {
        let temp_dir = new_temp_dir();
        let lock_path = temp_dir.path().join("refs.lock");
        let held = FileLock::lock(lock_path.clone()).unwrap();
        // A second holder can acquire only after the first releases.
        let contender = std::thread::spawn({
            let lock_path = lock_path.clone();
            move || FileLock::lock(lock_path).unwrap()
        });
        std::thread::sleep(Duration::from_millis(50));
        drop(held);
        let _second = contender.join().unwrap();
        drop(_second);
        assert!(!lock_path.exists());
    }
}
