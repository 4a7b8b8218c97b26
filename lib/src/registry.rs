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

//! The process-wide backend registry: named factories producing backends.
//!
//! Registration is one-shot per name; re-registering an existing name fails
//! instead of silently reconfiguring the process. Unknown names fail hard.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::backend::Backend;
use crate::error::StoreError;
use crate::error::StoreResult;
use crate::fs_backend::FsBackend;
use crate::memory_backend::MemoryBackend;
use crate::object_id::HashFamily;
use crate::sql_backend::SqlBackend;

/// Construction options, one variant per realization family.
#[derive(Debug, Clone)]
pub enum BackendOptions {
    Filesystem {
        gitdir: PathBuf,
    },
    Sql {
        db_path: PathBuf,
    },
    InMemory,
    Custom {
        kind: String,
        params: HashMap<String, String>,
    },
}

pub type BackendFactory =
    Box<dyn Fn(&BackendOptions) -> StoreResult<Box<dyn Backend>> + Send + Sync>;

fn unsupported_options(name: &str, options: &BackendOptions) -> StoreError {
    StoreError::Unsupported(format!(
        "backend `{name}` cannot be built from {options:?}"
    ))
}

static REGISTRY: Lazy<Mutex<HashMap<String, BackendFactory>>> = Lazy::new(|| {
    let mut table: HashMap<String, BackendFactory> = HashMap::new();
    table.insert(
        FsBackend::name().to_string(),
        Box::new(|options| match options {
            BackendOptions::Filesystem { gitdir } => Ok(Box::new(FsBackend::load(gitdir))),
            _ => Err(unsupported_options(FsBackend::name(), options)),
        }),
    );
    table.insert(
        SqlBackend::name().to_string(),
        Box::new(|options| match options {
            BackendOptions::Sql { db_path } => Ok(Box::new(SqlBackend::load(db_path)?)),
            _ => Err(unsupported_options(SqlBackend::name(), options)),
        }),
    );
    table.insert(
        MemoryBackend::name().to_string(),
        Box::new(|options| match options {
            BackendOptions::InMemory => Ok(Box::new(MemoryBackend::new(HashFamily::Sha1))),
            _ => Err(unsupported_options(MemoryBackend::name(), options)),
        }),
    );
    Mutex::new(table)
});

/// Registers a custom factory. Fails if the name is already taken, built-ins
/// included.
pub fn register(name: &str, factory: BackendFactory) -> StoreResult<()> {
    let mut table = REGISTRY.lock().unwrap();
    if table.contains_key(name) {
        return Err(StoreError::Unsupported(format!(
            "backend `{name}` is already registered"
        )));
    }
    table.insert(name.to_string(), factory);
    Ok(())
}

/// Builds a backend by registered name.
pub fn create(name: &str, options: &BackendOptions) -> StoreResult<Box<dyn Backend>> {
    let table = REGISTRY.lock().unwrap();
    let factory = table.get(name).ok_or_else(|| StoreError::UnknownBackend {
        name: name.to_string(),
    })?;
    factory(options)
}

/// Picks a backend name from a path: SQLite-looking suffixes go to `sql`,
/// everything else to `filesystem`.
pub fn detect(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("db" | "sqlite" | "sqlite3") => SqlBackend::name(),
        _ => FsBackend::name(),
    }
}

/// Convenience: detect + create from a path.
pub fn open_path(path: &Path) -> StoreResult<Box<dyn Backend>> {
    let name = detect(path);
    let options = if name == SqlBackend::name() {
        BackendOptions::Sql {
            db_path: path.to_path_buf(),
        }
    } else {
        BackendOptions::Filesystem {
            gitdir: path.to_path_buf(),
        }
    };
    create(name, &options)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_detect_suffixes() {
        assert_eq!(detect(Path::new("/repos/a.db")), "sql");
        assert_eq!(detect(Path::new("/repos/a.sqlite")), "sql");
        assert_eq!(detect(Path::new("/repos/a.sqlite3")), "sql");
        assert_eq!(detect(Path::new("/repos/a.git")), "filesystem");
        assert_eq!(detect(Path::new("/repos/bare")), "filesystem");
    }

    #[test]
    fn test_unknown_backend() {
        assert_matches!(
            create("carrier-pigeon", &BackendOptions::InMemory),
            Err(StoreError::UnknownBackend { .. })
        );
    }

    #[test]
    fn test_builtin_memory() {
        let backend = create("memory", &BackendOptions::InMemory).unwrap();
        assert_eq!(backend.name(), "memory");
    }

    #[test]
    fn test_mismatched_options() {
        assert_matches!(
            create("sql", &BackendOptions::InMemory),
            Err(StoreError::Unsupported(_))
        );
    }

    #[test]
    fn test_one_shot_registration() {
        assert_matches!(
            register("memory", Box::new(|_| unreachable!())),
            Err(StoreError::Unsupported(_))
        );
    }
}
