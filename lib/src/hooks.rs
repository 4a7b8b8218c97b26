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

//! Hook triggering: which hook fires, with what environment and arguments,
//! and how its exit status is interpreted.
//!
//! Hooks are never executed here. An injected [`HookExecutor`] capability
//! runs them; this module only assembles the invocation and turns a
//! non-zero exit into `HookFailed`. A missing hook (or a missing executor)
//! synthesizes success.

use std::fmt::Debug;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::backend::Backend;
use crate::config::ConfigFile;
use crate::error::StoreError;
use crate::error::StoreResult;

/// Outcome of running one hook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookResult {
    pub exit: i32,
    pub stdout: String,
    pub stderr: String,
}

/// The caller-supplied context layered into the hook environment.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub gitdir: Option<String>,
    pub work_tree: Option<String>,
    pub index_file: Option<String>,
    pub branch: Option<String>,
    pub previous_head: Option<String>,
    pub head: Option<String>,
    pub commit: Option<String>,
    pub remote: Option<String>,
    pub remote_url: Option<String>,
}

/// Everything an executor needs to run one hook. `path` is set when the
/// substrate exposes hooks as files; `content` when it stores them as
/// blobs. Dispatch (shebang handling and the like) is the executor's
/// concern.
#[derive(Debug, Clone)]
pub struct HookInvocation {
    pub name: String,
    pub path: Option<PathBuf>,
    pub content: Option<Vec<u8>>,
    pub env: Vec<(String, String)>,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
}

/// Runs hook processes on behalf of the store.
#[async_trait]
pub trait HookExecutor: Send + Sync + Debug {
    async fn execute(&self, invocation: &HookInvocation) -> StoreResult<HookResult>;
}

/// Whether the named hook exists on this backend.
pub async fn has_hook(backend: &dyn Backend, name: &str) -> StoreResult<bool> {
    let hooks_dir = hooks_dir_override(backend).await;
    Ok(backend.hook_path(name, hooks_dir.as_deref()).await?.is_some()
        || backend.hook_blob(name).await?.is_some())
}

async fn hooks_dir_override(backend: &dyn Backend) -> Option<String> {
    let text = backend.read_config().await.ok()??;
    ConfigFile::parse(&text)
        .get("core.hookspath")
        .map(str::to_string)
}

/// Per-hook positional arguments, from the fixed table. `extra` supplies the
/// values that only the call site knows (the message file path, the previous
/// and new head, ...).
fn hook_args(name: &str, extra: &[String]) -> Vec<String> {
    match name {
        // post-checkout <prev> <new> <branch_flag>
        // post-merge <squash_flag>
        // pre-push <remote> <remote_url>
        // commit-msg <file>
        "post-checkout" | "post-merge" | "pre-push" | "commit-msg" => extra.to_vec(),
        // prepare-commit-msg <file> message
        "prepare-commit-msg" => {
            let mut args = extra.to_vec();
            args.push("message".to_string());
            args
        }
        _ => Vec::new(),
    }
}

fn context_env(ctx: &HookContext, config: Option<&ConfigFile>) -> Vec<(String, String)> {
    let mut env = Vec::new();
    let mut push = |key: &str, value: &Option<String>| {
        if let Some(value) = value {
            env.push((key.to_string(), value.clone()));
        }
    };
    push("GIT_DIR", &ctx.gitdir);
    push("GIT_WORK_TREE", &ctx.work_tree);
    push("GIT_INDEX_FILE", &ctx.index_file);
    push("GIT_BRANCH", &ctx.branch);
    push("GIT_PREVIOUS_HEAD", &ctx.previous_head);
    push("GIT_HEAD", &ctx.head);
    push("GIT_COMMIT", &ctx.commit);
    push("GIT_REMOTE", &ctx.remote);
    push("GIT_REMOTE_URL", &ctx.remote_url);
    if let Some(config) = config {
        push(
            "GIT_AUTHOR_NAME",
            &config.get("user.name").map(str::to_string),
        );
        push(
            "GIT_AUTHOR_EMAIL",
            &config.get("user.email").map(str::to_string),
        );
    }
    env
}

/// Triggers the named hook. Returns a synthesized success when the hook (or
/// the executor) is absent; raises `HookFailed` on a non-zero exit. Callers
/// that swallow post-* failures do so at their site.
pub async fn run_hook(
    backend: &dyn Backend,
    executor: Option<&dyn HookExecutor>,
    name: &str,
    ctx: &HookContext,
    stdin: Option<&[u8]>,
    extra_args: &[String],
) -> StoreResult<HookResult> {
    let Some(executor) = executor else {
        return Ok(HookResult::default());
    };
    let hooks_dir = hooks_dir_override(backend).await;
    let path = backend.hook_path(name, hooks_dir.as_deref()).await?;
    let content = if path.is_none() {
        backend.hook_blob(name).await?
    } else {
        None
    };
    if path.is_none() && content.is_none() {
        return Ok(HookResult::default());
    }
    let config = match backend.read_config().await {
        Ok(Some(text)) => Some(ConfigFile::parse(&text)),
        _ => None,
    };
    let invocation = HookInvocation {
        name: name.to_string(),
        path,
        content,
        env: context_env(ctx, config.as_ref()),
        args: hook_args(name, extra_args),
        stdin: stdin.map(<[u8]>::to_vec),
    };
    let result = executor.execute(&invocation).await?;
    if result.exit != 0 {
        return Err(StoreError::HookFailed {
            name: name.to_string(),
            exit: result.exit,
            stdout: result.stdout,
            stderr: result.stderr,
        });
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_table() {
        assert_eq!(
            hook_args(
                "post-checkout",
                &["old".to_string(), "new".to_string(), "1".to_string()]
            ),
            vec!["old", "new", "1"]
        );
        assert_eq!(
            hook_args("prepare-commit-msg", &["/tmp/MSG".to_string()]),
            vec!["/tmp/MSG", "message"]
        );
        assert_eq!(
            hook_args("commit-msg", &["/tmp/MSG".to_string()]),
            vec!["/tmp/MSG"]
        );
        assert!(hook_args("pre-commit", &["ignored".to_string()]).is_empty());
    }
}
