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

//! The embedded-SQL realization: one SQLite file per repository.
//!
//! The schema mirrors the gitdir: singleton rows carry `CHECK(id = 1)`,
//! and object inserts use `INSERT OR IGNORE` so write-once semantics
//! survive. The connection runs in WAL mode. Index/ref locks are advisory
//! in-process claims; the cooperative scheduling model already serializes
//! operations on one repository.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::RwLock;

use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::OptionalExtension as _;
use rusqlite::params;

use crate::backend;
use crate::backend::Backend;
use crate::backend::BackendLock;
use crate::backend::InitOptions;
use crate::backend::PackKind;
use crate::error::StoreResult;
use crate::memory_backend::LockTable;
use crate::object_id::HashFamily;
use crate::object_id::Oid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS core_metadata (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS loose_objects (
    oid TEXT PRIMARY KEY,
    blob BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS packfiles (
    name TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('pack', 'idx', 'bitmap', 'midx')),
    blob BLOB NOT NULL,
    PRIMARY KEY (name, kind)
);
CREATE TABLE IF NOT EXISTS refs (
    ref TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS packed_refs (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS reflogs (
    ref TEXT PRIMARY KEY,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS hooks (
    name TEXT PRIMARY KEY,
    blob BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS state (
    name TEXT PRIMARY KEY,
    val BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS sequencer (
    name TEXT PRIMARY KEY,
    val BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS info (
    name TEXT PRIMARY KEY,
    val BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS lfs (
    name TEXT PRIMARY KEY,
    val BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS submodules (
    path TEXT PRIMARY KEY,
    val BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS worktrees (
    name TEXT PRIMARY KEY,
    workdir TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS shallow (
    oid TEXT PRIMARY KEY
);
CREATE TABLE IF NOT EXISTS daemon (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    exported INTEGER NOT NULL
);
";

/// Where a state name is stored: its own table or the catch-all.
enum StateSlot<'a> {
    Shallow,
    DaemonFlag,
    Table(&'static str, &'a str),
}

fn state_slot(name: &str) -> StateSlot<'_> {
    if name == "shallow" {
        StateSlot::Shallow
    } else if name == "git-daemon-export-ok" {
        StateSlot::DaemonFlag
    } else if let Some(rest) = name.strip_prefix("sequencer/") {
        StateSlot::Table("sequencer", rest)
    } else if let Some(rest) = name.strip_prefix("info/") {
        StateSlot::Table("info", rest)
    } else if let Some(rest) = name.strip_prefix("lfs/") {
        StateSlot::Table("lfs", rest)
    } else if let Some(rest) = name.strip_prefix("modules/") {
        StateSlot::Table("submodules", rest)
    } else {
        StateSlot::Table("state", name)
    }
}

#[derive(Debug)]
pub struct SqlBackend {
    path: PathBuf,
    conn: Mutex<Connection>,
    family: RwLock<HashFamily>,
    locks: LockTable,
}

impl SqlBackend {
    pub fn name() -> &'static str {
        "sql"
    }

    pub fn load(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        let family = conn
            .query_row(
                "SELECT value FROM core_metadata WHERE key = 'config'",
                [],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?
            .map(|bytes| backend::config_hash_family(&String::from_utf8_lossy(&bytes)))
            .unwrap_or(HashFamily::Sha1);
        Ok(Self {
            path,
            conn: Mutex::new(conn),
            family: RwLock::new(family),
            locks: LockTable::default(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.path
    }

    fn metadata(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT value FROM core_metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn metadata_text(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .metadata(key)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn put_metadata(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO core_metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

#[async_trait]
impl Backend for SqlBackend {
    fn name(&self) -> &str {
        Self::name()
    }

    fn hash_family(&self) -> HashFamily {
        *self.family.read().unwrap()
    }

    async fn init(&self, options: &InitOptions) -> StoreResult<()> {
        if let Some(existing) = self.metadata_text("config")? {
            return backend::check_reinit(&existing, options);
        }
        self.put_metadata("config", backend::initial_config(options).as_bytes())?;
        self.put_metadata("HEAD", backend::initial_head(options).as_bytes())?;
        *self.family.write().unwrap() = options.object_format;
        Ok(())
    }

    async fn is_initialized(&self) -> StoreResult<bool> {
        Ok(self.metadata("config")?.is_some())
    }

    async fn exists(&self, relpath: &str) -> StoreResult<bool> {
        // Map the gitdir-relative name back onto the schema.
        match relpath {
            "HEAD" | "config" | "config.worktree" | "index" | "description" => {
                Ok(self.metadata(relpath)?.is_some())
            }
            "packed-refs" => {
                let conn = self.conn.lock().unwrap();
                Ok(conn
                    .query_row("SELECT data FROM packed_refs WHERE id = 1", [], |_row| {
                        Ok(())
                    })
                    .optional()?
                    .is_some())
            }
            _ => {
                if let Some(rest) = relpath.strip_prefix("objects/") {
                    let oid: String = rest.replacen('/', "", 1);
                    let conn = self.conn.lock().unwrap();
                    return Ok(conn
                        .query_row(
                            "SELECT oid FROM loose_objects WHERE oid = ?1",
                            params![oid],
                            |_row| Ok(()),
                        )
                        .optional()?
                        .is_some());
                }
                if let Some(rest) = relpath.strip_prefix("logs/") {
                    return Ok(self.read_reflog_raw(rest).await?.is_some());
                }
                if let Some(rest) = relpath.strip_prefix("hooks/") {
                    return Ok(self.hook_blob(rest).await?.is_some());
                }
                if relpath.starts_with("refs/") || crate::worktree::is_worktree_specific_ref(relpath) {
                    if self.read_ref_file(relpath).await?.is_some() {
                        return Ok(true);
                    }
                }
                Ok(self.read_state(relpath).await?.is_some())
            }
        }
    }

    async fn close(&self) -> StoreResult<()> {
        // The connection closes with the value; nothing persistent to clear.
        Ok(())
    }

    async fn read_head(&self) -> StoreResult<Option<String>> {
        Ok(self.metadata_text("HEAD")?.map(|text| text.trim().to_string()))
    }

    async fn write_head(&self, value: &str) -> StoreResult<()> {
        self.put_metadata("HEAD", value.as_bytes())
    }

    async fn read_config(&self) -> StoreResult<Option<String>> {
        self.metadata_text("config")
    }

    async fn write_config(&self, text: &str) -> StoreResult<()> {
        self.put_metadata("config", text.as_bytes())
    }

    async fn read_worktree_config(&self) -> StoreResult<Option<String>> {
        self.metadata_text("config.worktree")
    }

    async fn write_worktree_config(&self, text: &str) -> StoreResult<()> {
        self.put_metadata("config.worktree", text.as_bytes())
    }

    async fn read_index(&self) -> StoreResult<Option<Vec<u8>>> {
        self.metadata("index")
    }

    async fn write_index(&self, data: &[u8]) -> StoreResult<()> {
        self.put_metadata("index", data)
    }

    async fn read_description(&self) -> StoreResult<Option<String>> {
        self.metadata_text("description")
    }

    async fn write_description(&self, text: &str) -> StoreResult<()> {
        self.put_metadata("description", text.as_bytes())
    }

    async fn read_state(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        match state_slot(name) {
            StateSlot::Shallow => {
                let mut stmt = conn.prepare("SELECT oid FROM shallow ORDER BY oid")?;
                let oids: Vec<String> = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<_, _>>()?;
                if oids.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(format!("{}\n", oids.join("\n")).into_bytes()))
                }
            }
            StateSlot::DaemonFlag => {
                let exported: Option<i64> = conn
                    .query_row("SELECT exported FROM daemon WHERE id = 1", [], |row| {
                        row.get(0)
                    })
                    .optional()?;
                Ok((exported == Some(1)).then(Vec::new))
            }
            StateSlot::Table(table, key) => {
                let column = if table == "submodules" { "path" } else { "name" };
                Ok(conn
                    .query_row(
                        &format!("SELECT val FROM {table} WHERE {column} = ?1"),
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?)
            }
        }
    }

    async fn write_state(&self, name: &str, value: &[u8]) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        match state_slot(name) {
            StateSlot::Shallow => {
                conn.execute("DELETE FROM shallow", [])?;
                for line in String::from_utf8_lossy(value).lines() {
                    if !line.is_empty() {
                        conn.execute(
                            "INSERT OR IGNORE INTO shallow (oid) VALUES (?1)",
                            params![line],
                        )?;
                    }
                }
                Ok(())
            }
            StateSlot::DaemonFlag => {
                conn.execute(
                    "INSERT INTO daemon (id, exported) VALUES (1, 1)
                     ON CONFLICT (id) DO UPDATE SET exported = 1",
                    [],
                )?;
                Ok(())
            }
            StateSlot::Table(table, key) => {
                let column = if table == "submodules" { "path" } else { "name" };
                conn.execute(
                    &format!(
                        "INSERT INTO {table} ({column}, val) VALUES (?1, ?2)
                         ON CONFLICT ({column}) DO UPDATE SET val = excluded.val"
                    ),
                    params![key, value],
                )?;
                Ok(())
            }
        }
    }

    async fn delete_state(&self, name: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        match state_slot(name) {
            StateSlot::Shallow => {
                conn.execute("DELETE FROM shallow", [])?;
            }
            StateSlot::DaemonFlag => {
                conn.execute("DELETE FROM daemon WHERE id = 1", [])?;
            }
            StateSlot::Table(table, key) => {
                let column = if table == "submodules" { "path" } else { "name" };
                conn.execute(
                    &format!("DELETE FROM {table} WHERE {column} = ?1"),
                    params![key],
                )?;
            }
        }
        Ok(())
    }

    async fn list_state(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut names: Vec<String> = Vec::new();
        let mut stmt = conn.prepare("SELECT name FROM state")?;
        names.extend(
            stmt.query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?,
        );
        for table in ["sequencer", "info", "lfs"] {
            let mut stmt = conn.prepare(&format!("SELECT name FROM {table}"))?;
            names.extend(
                stmt.query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?
                    .into_iter()
                    .map(|name| format!("{table}/{name}")),
            );
        }
        let shallow: i64 = conn.query_row("SELECT COUNT(*) FROM shallow", [], |row| row.get(0))?;
        if shallow > 0 {
            names.push("shallow".to_string());
        }
        let exported: Option<i64> = conn
            .query_row("SELECT exported FROM daemon WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        if exported == Some(1) {
            names.push("git-daemon-export-ok".to_string());
        }
        names.sort();
        Ok(names)
    }

    async fn read_loose(&self, oid: &Oid) -> StoreResult<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT blob FROM loose_objects WHERE oid = ?1",
                params![oid.hex()],
                |row| row.get(0),
            )
            .optional()?)
    }

    async fn write_loose(&self, oid: &Oid, deflated: &[u8]) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        // Write-once via INSERT OR IGNORE.
        conn.execute(
            "INSERT OR IGNORE INTO loose_objects (oid, blob) VALUES (?1, ?2)",
            params![oid.hex(), deflated],
        )?;
        Ok(())
    }

    async fn list_loose(&self) -> StoreResult<Vec<Oid>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT oid FROM loose_objects ORDER BY oid")?;
        let hexes: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        Ok(hexes.iter().filter_map(Oid::try_from_hex).collect())
    }

    async fn read_pack(&self, name: &str, kind: PackKind) -> StoreResult<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT blob FROM packfiles WHERE name = ?1 AND kind = ?2",
                params![name, kind.as_str()],
                |row| row.get(0),
            )
            .optional()?)
    }

    async fn write_pack(&self, name: &str, kind: PackKind, data: &[u8]) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO packfiles (name, kind, blob) VALUES (?1, ?2, ?3)
             ON CONFLICT (name, kind) DO UPDATE SET blob = excluded.blob",
            params![name, kind.as_str(), data],
        )?;
        Ok(())
    }

    async fn list_packs(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT DISTINCT name FROM packfiles WHERE kind = 'pack' ORDER BY name")?;
        Ok(stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?)
    }

    async fn read_ref_file(&self, name: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT value FROM refs WHERE ref = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    async fn write_ref_file(&self, name: &str, value: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO refs (ref, value) VALUES (?1, ?2)
             ON CONFLICT (ref) DO UPDATE SET value = excluded.value",
            params![name, value],
        )?;
        Ok(())
    }

    async fn delete_ref_file(&self, name: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM refs WHERE ref = ?1", params![name])?;
        Ok(())
    }

    async fn list_ref_files(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT ref FROM refs ORDER BY ref")?;
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        Ok(names
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect())
    }

    async fn read_packed_refs_text(&self) -> StoreResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row("SELECT data FROM packed_refs WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?)
    }

    async fn write_packed_refs_text(&self, text: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO packed_refs (id, data) VALUES (1, ?1)
             ON CONFLICT (id) DO UPDATE SET data = excluded.data",
            params![text],
        )?;
        Ok(())
    }

    async fn read_reflog_raw(&self, name: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT data FROM reflogs WHERE ref = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    async fn append_reflog_raw(&self, name: &str, line: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO reflogs (ref, data) VALUES (?1, ?2)
             ON CONFLICT (ref) DO UPDATE SET data = data || excluded.data",
            params![name, line],
        )?;
        Ok(())
    }

    async fn delete_reflog(&self, name: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM reflogs WHERE ref = ?1", params![name])?;
        Ok(())
    }

    async fn list_reflogs(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT ref FROM reflogs ORDER BY ref")?;
        Ok(stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?)
    }

    async fn hook_path(&self, _name: &str, _hooks_dir: Option<&str>) -> StoreResult<Option<PathBuf>> {
        Ok(None)
    }

    async fn hook_blob(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT blob FROM hooks WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    async fn write_hook(&self, name: &str, data: &[u8]) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO hooks (name, blob) VALUES (?1, ?2)
             ON CONFLICT (name) DO UPDATE SET blob = excluded.blob",
            params![name, data],
        )?;
        Ok(())
    }

    async fn list_worktrees(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name FROM worktrees ORDER BY name")?;
        Ok(stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?)
    }

    async fn add_worktree(&self, name: &str, workdir: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO worktrees (name, workdir) VALUES (?1, ?2)
             ON CONFLICT (name) DO UPDATE SET workdir = excluded.workdir",
            params![name, workdir],
        )?;
        Ok(())
    }

    async fn remove_worktree(&self, name: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM worktrees WHERE name = ?1", params![name])?;
        Ok(())
    }

    async fn lock_index(&self) -> StoreResult<BackendLock> {
        self.locks.claim("index")
    }

    async fn lock_ref(&self, name: &str) -> StoreResult<BackendLock> {
        self.locks.claim(&format!("ref:{name}"))
    }
}

#[cfg(test)]
mod tests {
    use pollster::FutureExt as _;

    use super::*;
    use crate::tests::new_temp_dir;

    fn open(temp_dir: &tempfile::TempDir) -> SqlBackend {
        SqlBackend::load(temp_dir.path().join("repo.db")).unwrap()
    }

    #[test]
    fn test_init_and_reload_family() {
        let temp_dir = new_temp_dir();
        let backend = open(&temp_dir);
        backend
            .init(&InitOptions {
                default_branch: "main".to_string(),
                object_format: HashFamily::Sha256,
            })
            .block_on()
            .unwrap();
        assert!(backend.is_initialized().block_on().unwrap());
        assert_eq!(
            backend.read_head().block_on().unwrap().as_deref(),
            Some("ref: refs/heads/main")
        );
        drop(backend);
        let reloaded = open(&temp_dir);
        assert_eq!(reloaded.hash_family(), HashFamily::Sha256);
    }

    #[test]
    fn test_write_once_row_count() {
        let temp_dir = new_temp_dir();
        let backend = open(&temp_dir);
        let oid = Oid::new(vec![7; 20]);
        backend.write_loose(&oid, b"first").block_on().unwrap();
        backend.write_loose(&oid, b"second").block_on().unwrap();
        assert_eq!(backend.list_loose().block_on().unwrap().len(), 1);
        assert_eq!(
            backend.read_loose(&oid).block_on().unwrap(),
            Some(b"first".to_vec())
        );
    }

    #[test]
    fn test_state_routing() {
        let temp_dir = new_temp_dir();
        let backend = open(&temp_dir);
        backend
            .write_state("sequencer/todo", b"pick abc\n")
            .block_on()
            .unwrap();
        backend
            .write_state(
                "shallow",
                b"1111111111111111111111111111111111111111\n",
            )
            .block_on()
            .unwrap();
        backend
            .write_state("git-daemon-export-ok", b"")
            .block_on()
            .unwrap();
        let names = backend.list_state().block_on().unwrap();
        assert!(names.contains(&"sequencer/todo".to_string()));
        assert!(names.contains(&"shallow".to_string()));
        assert!(names.contains(&"git-daemon-export-ok".to_string()));
        assert_eq!(
            backend.read_state("shallow").block_on().unwrap(),
            Some(b"1111111111111111111111111111111111111111\n".to_vec())
        );
        backend
            .delete_state("git-daemon-export-ok")
            .block_on()
            .unwrap();
        assert_eq!(
            backend
                .read_state("git-daemon-export-ok")
                .block_on()
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_reflog_append_concatenates() {
        let temp_dir = new_temp_dir();
        let backend = open(&temp_dir);
        backend
            .append_reflog_raw("refs/heads/main", "one\n")
            .block_on()
            .unwrap();
        backend
            .append_reflog_raw("refs/heads/main", "two\n")
            .block_on()
            .unwrap();
        assert_eq!(
            backend
                .read_reflog_raw("refs/heads/main")
                .block_on()
                .unwrap()
                .as_deref(),
            Some("one\ntwo\n")
        );
    }

    #[test]
    fn test_exists_mapping() {
        let temp_dir = new_temp_dir();
        let backend = open(&temp_dir);
        backend.init(&InitOptions::default()).block_on().unwrap();
        assert!(backend.exists("HEAD").block_on().unwrap());
        assert!(backend.exists("config").block_on().unwrap());
        assert!(!backend.exists("index").block_on().unwrap());
        let oid = Oid::new(vec![0xab; 20]);
        backend.write_loose(&oid, b"x").block_on().unwrap();
        let hex = oid.hex();
        assert!(
            backend
                .exists(&format!("objects/{}/{}", &hex[..2], &hex[2..]))
                .block_on()
                .unwrap()
        );
    }
}
