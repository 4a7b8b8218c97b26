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

//! Linked-worktree gitdir routing.
//!
//! A linked worktree's gitdir lives at `<main>/worktrees/<name>/` and holds
//! the refs and state that are per-worktree (`HEAD`, `MERGE_HEAD`, ...);
//! everything else belongs to the main gitdir. Only names are stored;
//! absolute paths are recomputed on demand, never cached in both
//! directions.

use std::path::Path;
use std::path::PathBuf;

/// Whether a ref (or state file) name belongs to the active worktree rather
/// than the repository.
pub fn is_worktree_specific_ref(name: &str) -> bool {
    matches!(
        name,
        "HEAD" | "ORIG_HEAD" | "FETCH_HEAD" | "MERGE_HEAD" | "CHERRY_PICK_HEAD" | "REVERT_HEAD"
    ) || name.starts_with("BISECT_")
}

/// Whether `gitdir` is a linked worktree gitdir: it has a `gitdir` file and
/// sits directly under a `worktrees/` directory.
pub fn is_linked_gitdir(gitdir: &Path) -> bool {
    main_gitdir_of(gitdir).is_some()
}

/// The main gitdir a linked gitdir belongs to: two levels up, provided the
/// level between is `worktrees/` and a `gitdir` backlink file exists.
pub fn main_gitdir_of(gitdir: &Path) -> Option<PathBuf> {
    if !gitdir.join("gitdir").is_file() {
        return None;
    }
    let parent = gitdir.parent()?;
    if parent.file_name()? != "worktrees" {
        return None;
    }
    Some(parent.parent()?.to_path_buf())
}

/// The gitdir of the named linked worktree inside `main_gitdir`.
pub fn linked_gitdir(main_gitdir: &Path, name: &str) -> PathBuf {
    main_gitdir.join("worktrees").join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::new_temp_dir;

    #[test]
    fn test_worktree_specific_refs() {
        for name in [
            "HEAD",
            "ORIG_HEAD",
            "FETCH_HEAD",
            "MERGE_HEAD",
            "CHERRY_PICK_HEAD",
            "REVERT_HEAD",
            "BISECT_LOG",
            "BISECT_EXPECTED_REV",
        ] {
            assert!(is_worktree_specific_ref(name), "{name}");
        }
        for name in ["refs/heads/main", "refs/tags/v1", "MERGE_MSG", "config"] {
            assert!(!is_worktree_specific_ref(name), "{name}");
        }
    }

    #[test]
    fn test_main_gitdir_discovery() {
        let temp_dir = new_temp_dir();
        let main = temp_dir.path().join("repo.git");
        let linked = main.join("worktrees").join("wt1");
        std::fs::create_dir_all(&linked).unwrap();
        // No backlink file yet: not a linked gitdir.
        assert_eq!(main_gitdir_of(&linked), None);
        std::fs::write(linked.join("gitdir"), "/work/wt1/.git\n").unwrap();
        assert_eq!(main_gitdir_of(&linked), Some(main.clone()));
        assert!(is_linked_gitdir(&linked));
        assert!(!is_linked_gitdir(&main));

        // A `gitdir` file outside a worktrees/ parent doesn't count.
        let decoy = temp_dir.path().join("elsewhere").join("wt1");
        std::fs::create_dir_all(&decoy).unwrap();
        std::fs::write(decoy.join("gitdir"), "/work/wt1/.git\n").unwrap();
        assert_eq!(main_gitdir_of(&decoy), None);
    }
}
