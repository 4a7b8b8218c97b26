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

//! `.gitmodules` descriptors. The file lives in the worktree and shares the
//! gitconfig dialect.

use crate::config::ConfigFile;
use crate::error::StoreError;
use crate::error::StoreResult;
use crate::working_copy::WorktreeBackend;

pub const GITMODULES: &str = ".gitmodules";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmoduleDescriptor {
    pub name: String,
    pub path: String,
    pub url: String,
    pub branch: Option<String>,
}

/// Every descriptor in a `.gitmodules` text, in file order. Entries missing
/// a path or url are skipped.
pub fn parse_gitmodules(text: &str) -> Vec<SubmoduleDescriptor> {
    let file = ConfigFile::parse(text);
    let mut names: Vec<String> = Vec::new();
    for entry in file.entries() {
        if entry.section == "submodule" {
            if let Some(name) = &entry.subsection {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
    }
    names
        .into_iter()
        .filter_map(|name| {
            let get = |key: &str| {
                file.get(&format!("submodule.{name}.{key}"))
                    .map(str::to_string)
            };
            Some(SubmoduleDescriptor {
                path: get("path")?,
                url: get("url")?,
                branch: get("branch"),
                name,
            })
        })
        .collect()
}

pub fn serialize_gitmodules(descriptors: &[SubmoduleDescriptor]) -> String {
    let mut file = ConfigFile::default();
    for desc in descriptors {
        file.set(&format!("submodule.{}.path", desc.name), &desc.path);
        file.set(&format!("submodule.{}.url", desc.name), &desc.url);
        if let Some(branch) = &desc.branch {
            file.set(&format!("submodule.{}.branch", desc.name), branch);
        }
    }
    file.serialize()
}

/// Descriptors from the worktree's `.gitmodules`, empty when the file is
/// absent.
pub async fn list_submodules(
    worktree: &dyn WorktreeBackend,
) -> StoreResult<Vec<SubmoduleDescriptor>> {
    let Some(bytes) = worktree.read(GITMODULES).await? else {
        return Ok(Vec::new());
    };
    let text = String::from_utf8(bytes).map_err(|_| StoreError::Corrupt {
        reason: format!("{GITMODULES} is not UTF-8"),
    })?;
    Ok(parse_gitmodules(&text))
}

/// The descriptor whose `path` equals `path`.
pub async fn get_submodule(
    worktree: &dyn WorktreeBackend,
    path: &str,
) -> StoreResult<SubmoduleDescriptor> {
    list_submodules(worktree)
        .await?
        .into_iter()
        .find(|desc| desc.path == path)
        .ok_or_else(|| StoreError::NotFound {
            what: format!("submodule at {path}"),
        })
}

/// Adds or replaces the descriptor for `descriptor.path` and writes the file
/// back.
pub async fn set_submodule(
    worktree: &dyn WorktreeBackend,
    descriptor: SubmoduleDescriptor,
) -> StoreResult<()> {
    let mut descriptors = list_submodules(worktree).await?;
    descriptors.retain(|desc| desc.path != descriptor.path);
    descriptors.push(descriptor);
    worktree
        .write(GITMODULES, serialize_gitmodules(&descriptors).as_bytes())
        .await
}
