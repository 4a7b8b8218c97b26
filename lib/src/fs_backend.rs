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

//! The filesystem realization: a gitdir laid out bit-compatibly with stock
//! git.
//!
//! Loose objects, refs, packed-refs, the reflog and hooks live in the main
//! gitdir; worktree-specific refs and state route to the active linked
//! gitdir when this backend was opened on one.

use std::fs;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use tempfile::NamedTempFile;

use crate::backend;
use crate::backend::Backend;
use crate::backend::BackendLock;
use crate::backend::InitOptions;
use crate::backend::PackKind;
use crate::backend::PackResolver;
use crate::error::StoreError;
use crate::error::StoreResult;
use crate::file_util::IoPathExt as _;
use crate::file_util::PathError;
use crate::file_util::persist_content_addressed;
use crate::file_util::write_file_atomically;
use crate::lock::FileLock;
use crate::object_id::HashFamily;
use crate::object_id::Oid;
use crate::worktree;

/// Top-level state files `list_state` reports when present.
const KNOWN_STATE_FILES: &[&str] = &[
    "MERGE_HEAD",
    "MERGE_MODE",
    "MERGE_MSG",
    "ORIG_HEAD",
    "FETCH_HEAD",
    "CHERRY_PICK_HEAD",
    "REVERT_HEAD",
    "BISECT_LOG",
    "BISECT_EXPECTED_REV",
    "BISECT_START",
    "shallow",
    "git-daemon-export-ok",
];

const STATE_DIRS: &[&str] = &["sequencer", "info", "lfs"];

#[derive(Debug)]
pub struct FsBackend {
    /// The gitdir this backend was opened on; a linked worktree gitdir when
    /// opened from a worktree.
    gitdir: PathBuf,
    /// The repository's main gitdir; equals `gitdir` unless linked.
    main_gitdir: PathBuf,
    family: RwLock<HashFamily>,
    pack_resolver: Option<Box<dyn PackResolver>>,
}

impl FsBackend {
    pub fn name() -> &'static str {
        "filesystem"
    }

    /// Opens a backend on `gitdir`, resolving the main gitdir and the hash
    /// family recorded in config.
    pub fn load(gitdir: impl Into<PathBuf>) -> Self {
        let gitdir = gitdir.into();
        let main_gitdir = worktree::main_gitdir_of(&gitdir).unwrap_or_else(|| gitdir.clone());
        let family = fs::read_to_string(main_gitdir.join("config"))
            .map(|text| backend::config_hash_family(&text))
            .unwrap_or(HashFamily::Sha1);
        Self {
            gitdir,
            main_gitdir,
            family: RwLock::new(family),
            pack_resolver: None,
        }
    }

    pub fn with_pack_resolver(mut self, resolver: Box<dyn PackResolver>) -> Self {
        self.pack_resolver = Some(resolver);
        self
    }

    pub fn gitdir(&self) -> &Path {
        &self.gitdir
    }

    pub fn main_gitdir(&self) -> &Path {
        &self.main_gitdir
    }

    fn is_linked(&self) -> bool {
        self.gitdir != self.main_gitdir
    }

    /// The gitdir a worktree-routed name belongs to.
    fn routed_dir(&self, name: &str) -> &Path {
        if self.is_linked() && worktree::is_worktree_specific_ref(name) {
            &self.gitdir
        } else {
            &self.main_gitdir
        }
    }

    /// Joins a forward-slash relative name onto `dir`, refusing traversal.
    fn safe_join(dir: &Path, name: &str) -> StoreResult<PathBuf> {
        if name.is_empty()
            || name.starts_with('/')
            || name
                .split('/')
                .any(|part| part.is_empty() || part == "." || part == "..")
        {
            return Err(StoreError::Corrupt {
                reason: format!("unsafe relative path {name:?}"),
            });
        }
        Ok(dir.join(name))
    }

    fn ref_path(&self, name: &str) -> StoreResult<PathBuf> {
        Self::safe_join(self.routed_dir(name), name)
    }

    fn state_path(&self, name: &str) -> StoreResult<PathBuf> {
        Self::safe_join(self.routed_dir(name), name)
    }

    fn reflog_path(&self, name: &str) -> StoreResult<PathBuf> {
        Self::safe_join(&self.routed_dir(name).join("logs"), name)
    }

    fn objects_dir(&self) -> PathBuf {
        self.main_gitdir.join("objects")
    }

    fn loose_path(&self, oid: &Oid) -> PathBuf {
        let hex = oid.hex();
        self.objects_dir().join(&hex[..2]).join(&hex[2..])
    }

    fn pack_path(&self, name: &str, kind: PackKind) -> StoreResult<PathBuf> {
        match kind {
            PackKind::Midx => Ok(self.objects_dir().join("info").join("multi-pack-index")),
            _ => Self::safe_join(
                &self.objects_dir().join("pack"),
                &format!("{name}.{}", kind.as_str()),
            ),
        }
    }

    fn read_optional(path: &Path) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PathError::new(path, err).into()),
        }
    }

    fn read_optional_string(path: &Path) -> StoreResult<Option<String>> {
        Ok(Self::read_optional(path)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn write_with_parents(path: &Path, data: &[u8]) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).at_path(parent)?;
        }
        write_file_atomically(path, data)?;
        Ok(())
    }

    fn remove_if_present(path: &Path) -> StoreResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(PathError::new(path, err).into()),
        }
    }

    /// Recursively collects forward-slash relative file names under `dir`.
    fn walk_files(dir: &Path, prefix: &str, out: &mut Vec<String>) -> StoreResult<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(PathError::new(dir, err).into()),
        };
        for entry in entries {
            let entry = entry.at_path(dir)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let child = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            let file_type = entry.file_type().at_path(entry.path())?;
            if file_type.is_dir() {
                Self::walk_files(&entry.path(), &child, out)?;
            } else if file_type.is_file() {
                out.push(child);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for FsBackend {
    fn name(&self) -> &str {
        Self::name()
    }

    fn hash_family(&self) -> HashFamily {
        *self.family.read().unwrap()
    }

    fn pack_resolver(&self) -> Option<&dyn PackResolver> {
        self.pack_resolver.as_deref()
    }

    async fn init(&self, options: &InitOptions) -> StoreResult<()> {
        let config_path = self.main_gitdir.join("config");
        if let Some(existing) = Self::read_optional_string(&config_path)? {
            return backend::check_reinit(&existing, options);
        }
        fs::create_dir_all(&self.main_gitdir).at_path(&self.main_gitdir)?;
        for dir in [
            "objects",
            "objects/info",
            "objects/pack",
            "refs",
            "refs/heads",
            "refs/tags",
            "hooks",
            "info",
        ] {
            fs::create_dir_all(self.main_gitdir.join(dir)).at_path(self.main_gitdir.join(dir))?;
        }
        write_file_atomically(
            &config_path,
            backend::initial_config(options).as_bytes(),
        )?;
        write_file_atomically(
            &self.main_gitdir.join("HEAD"),
            format!("{}\n", backend::initial_head(options)).as_bytes(),
        )?;
        write_file_atomically(
            &self.main_gitdir.join("description"),
            b"Unnamed repository; edit this file 'description' to name the repository.\n",
        )?;
        *self.family.write().unwrap() = options.object_format;
        Ok(())
    }

    async fn is_initialized(&self) -> StoreResult<bool> {
        Ok(self.main_gitdir.join("config").is_file()
            && self.main_gitdir.join("objects").is_dir())
    }

    async fn exists(&self, relpath: &str) -> StoreResult<bool> {
        let in_active = Self::safe_join(&self.gitdir, relpath)?.exists();
        Ok(in_active || Self::safe_join(&self.main_gitdir, relpath)?.exists())
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn read_head(&self) -> StoreResult<Option<String>> {
        Ok(Self::read_optional_string(&self.ref_path("HEAD")?)?
            .map(|text| text.trim().to_string()))
    }

    async fn write_head(&self, value: &str) -> StoreResult<()> {
        Self::write_with_parents(&self.ref_path("HEAD")?, format!("{value}\n").as_bytes())
    }

    async fn read_config(&self) -> StoreResult<Option<String>> {
        Self::read_optional_string(&self.main_gitdir.join("config"))
    }

    async fn write_config(&self, text: &str) -> StoreResult<()> {
        write_file_atomically(&self.main_gitdir.join("config"), text.as_bytes())?;
        Ok(())
    }

    async fn read_worktree_config(&self) -> StoreResult<Option<String>> {
        Self::read_optional_string(&self.gitdir.join("config.worktree"))
    }

    async fn write_worktree_config(&self, text: &str) -> StoreResult<()> {
        write_file_atomically(&self.gitdir.join("config.worktree"), text.as_bytes())?;
        Ok(())
    }

    async fn read_index(&self) -> StoreResult<Option<Vec<u8>>> {
        Self::read_optional(&self.gitdir.join("index"))
    }

    async fn write_index(&self, data: &[u8]) -> StoreResult<()> {
        write_file_atomically(&self.gitdir.join("index"), data)?;
        Ok(())
    }

    async fn read_description(&self) -> StoreResult<Option<String>> {
        Self::read_optional_string(&self.main_gitdir.join("description"))
    }

    async fn write_description(&self, text: &str) -> StoreResult<()> {
        write_file_atomically(&self.main_gitdir.join("description"), text.as_bytes())?;
        Ok(())
    }

    async fn read_state(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        Self::read_optional(&self.state_path(name)?)
    }

    async fn write_state(&self, name: &str, value: &[u8]) -> StoreResult<()> {
        Self::write_with_parents(&self.state_path(name)?, value)
    }

    async fn delete_state(&self, name: &str) -> StoreResult<()> {
        Self::remove_if_present(&self.state_path(name)?)
    }

    async fn list_state(&self) -> StoreResult<Vec<String>> {
        let mut names = Vec::new();
        for name in KNOWN_STATE_FILES {
            if self.state_path(name)?.is_file() {
                names.push((*name).to_string());
            }
        }
        for dir in STATE_DIRS {
            Self::walk_files(&self.main_gitdir.join(dir), dir, &mut names)?;
        }
        names.sort();
        Ok(names)
    }

    async fn read_loose(&self, oid: &Oid) -> StoreResult<Option<Vec<u8>>> {
        Self::read_optional(&self.loose_path(oid))
    }

    async fn write_loose(&self, oid: &Oid, deflated: &[u8]) -> StoreResult<()> {
        let path = self.loose_path(oid);
        // Write-once: content addressing guarantees an existing file holds
        // the same bytes, and skipping keeps its mtime stable.
        if path.exists() {
            return Ok(());
        }
        let fan_out = path.parent().expect("loose path has a fan-out dir");
        fs::create_dir_all(fan_out).at_path(fan_out)?;
        let mut temp_file = NamedTempFile::new_in(fan_out).at_path(fan_out)?;
        temp_file.write_all(deflated).at_path(temp_file.path())?;
        persist_content_addressed(temp_file, &path).at_path(&path)?;
        Ok(())
    }

    async fn list_loose(&self) -> StoreResult<Vec<Oid>> {
        let objects_dir = self.objects_dir();
        let rest_len = self.hash_family().hex_len() - 2;
        let mut oids = Vec::new();
        let entries = match fs::read_dir(&objects_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(oids),
            Err(err) => return Err(PathError::new(objects_dir, err).into()),
        };
        for entry in entries {
            let entry = entry.at_path(&objects_dir)?;
            let fan_out = entry.file_name().to_string_lossy().into_owned();
            if fan_out.len() != 2 || !crate::hex_util::is_hex(&fan_out) {
                continue;
            }
            for file in fs::read_dir(entry.path()).at_path(entry.path())? {
                let file = file.at_path(entry.path())?;
                if !file.file_type().at_path(file.path())?.is_file() {
                    continue;
                }
                let rest = file.file_name().to_string_lossy().into_owned();
                if rest.len() == rest_len && crate::hex_util::is_hex(&rest) {
                    if let Some(oid) = Oid::try_from_hex(format!("{fan_out}{rest}")) {
                        oids.push(oid);
                    }
                }
            }
        }
        oids.sort();
        Ok(oids)
    }

    async fn read_pack(&self, name: &str, kind: PackKind) -> StoreResult<Option<Vec<u8>>> {
        Self::read_optional(&self.pack_path(name, kind)?)
    }

    async fn write_pack(&self, name: &str, kind: PackKind, data: &[u8]) -> StoreResult<()> {
        Self::write_with_parents(&self.pack_path(name, kind)?, data)
    }

    async fn list_packs(&self) -> StoreResult<Vec<String>> {
        let pack_dir = self.objects_dir().join("pack");
        let mut names = Vec::new();
        Self::walk_files(&pack_dir, "", &mut names)?;
        let mut packs: Vec<String> = names
            .into_iter()
            .filter_map(|name| name.strip_suffix(".pack").map(str::to_string))
            .collect();
        packs.sort();
        Ok(packs)
    }

    async fn read_ref_file(&self, name: &str) -> StoreResult<Option<String>> {
        Ok(Self::read_optional_string(&self.ref_path(name)?)?
            .map(|text| text.trim().to_string()))
    }

    async fn write_ref_file(&self, name: &str, value: &str) -> StoreResult<()> {
        Self::write_with_parents(&self.ref_path(name)?, format!("{value}\n").as_bytes())
    }

    async fn delete_ref_file(&self, name: &str) -> StoreResult<()> {
        Self::remove_if_present(&self.ref_path(name)?)
    }

    async fn list_ref_files(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut names = Vec::new();
        Self::walk_files(&self.main_gitdir.join("refs"), "refs", &mut names)?;
        names.retain(|name| name.starts_with(prefix));
        names.sort();
        Ok(names)
    }

    async fn read_packed_refs_text(&self) -> StoreResult<Option<String>> {
        Self::read_optional_string(&self.main_gitdir.join("packed-refs"))
    }

    async fn write_packed_refs_text(&self, text: &str) -> StoreResult<()> {
        write_file_atomically(&self.main_gitdir.join("packed-refs"), text.as_bytes())?;
        Ok(())
    }

    async fn read_reflog_raw(&self, name: &str) -> StoreResult<Option<String>> {
        Self::read_optional_string(&self.reflog_path(name)?)
    }

    async fn append_reflog_raw(&self, name: &str, line: &str) -> StoreResult<()> {
        let path = self.reflog_path(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).at_path(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .at_path(&path)?;
        file.write_all(line.as_bytes()).at_path(&path)?;
        Ok(())
    }

    async fn delete_reflog(&self, name: &str) -> StoreResult<()> {
        Self::remove_if_present(&self.reflog_path(name)?)
    }

    async fn list_reflogs(&self) -> StoreResult<Vec<String>> {
        let mut names = Vec::new();
        Self::walk_files(&self.main_gitdir.join("logs"), "", &mut names)?;
        if self.is_linked() {
            Self::walk_files(&self.gitdir.join("logs"), "", &mut names)?;
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn hook_path(&self, name: &str, hooks_dir: Option<&str>) -> StoreResult<Option<PathBuf>> {
        let dir = match hooks_dir {
            Some(dir) => {
                let dir = Path::new(dir);
                if dir.is_absolute() {
                    dir.to_path_buf()
                } else {
                    self.main_gitdir.join(dir)
                }
            }
            None => self.main_gitdir.join("hooks"),
        };
        let path = dir.join(name);
        Ok(path.is_file().then_some(path))
    }

    async fn hook_blob(&self, _name: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn write_hook(&self, name: &str, data: &[u8]) -> StoreResult<()> {
        let path = Self::safe_join(&self.main_gitdir.join("hooks"), name)?;
        Self::write_with_parents(&path, data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).at_path(&path)?;
        }
        Ok(())
    }

    async fn list_worktrees(&self) -> StoreResult<Vec<String>> {
        let worktrees_dir = self.main_gitdir.join("worktrees");
        let entries = match fs::read_dir(&worktrees_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(PathError::new(worktrees_dir, err).into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.at_path(&worktrees_dir)?;
            if entry.file_type().at_path(entry.path())?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn add_worktree(&self, name: &str, workdir: &str) -> StoreResult<()> {
        let dir = worktree::linked_gitdir(&self.main_gitdir, name);
        fs::create_dir_all(&dir).at_path(&dir)?;
        write_file_atomically(&dir.join("gitdir"), format!("{workdir}\n").as_bytes())?;
        write_file_atomically(&dir.join("commondir"), b"../..\n")?;
        let head = self
            .read_head()
            .await?
            .unwrap_or_else(|| "ref: refs/heads/master".to_string());
        write_file_atomically(&dir.join("HEAD"), format!("{head}\n").as_bytes())?;
        Ok(())
    }

    async fn remove_worktree(&self, name: &str) -> StoreResult<()> {
        let dir = worktree::linked_gitdir(&self.main_gitdir, name);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(PathError::new(dir, err).into()),
        }
    }

    async fn lock_index(&self) -> StoreResult<BackendLock> {
        let lock = FileLock::lock(self.gitdir.join("index.lock")).at_path(self.gitdir.join("index.lock"))?;
        Ok(BackendLock::new(lock))
    }

    async fn lock_ref(&self, name: &str) -> StoreResult<BackendLock> {
        let ref_path = self.ref_path(name)?;
        if let Some(parent) = ref_path.parent() {
            fs::create_dir_all(parent).at_path(parent)?;
        }
        // `with_extension` would mangle dotted ref names like refs/tags/v1.0.
        let mut lock_path = ref_path.into_os_string();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);
        let lock = FileLock::lock(lock_path.clone()).at_path(lock_path)?;
        Ok(BackendLock::new(lock))
    }
}
