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

//! Reference resolution and updates.
//!
//! A ref lives loose (one file per ref) or inside the packed-refs table;
//! when both exist the loose one wins. Resolution follows symbolic refs
//! (`"ref: <name>"`) up to a depth cap, canonicalizes short names through a
//! fixed probe order, and never errors on a too-deep chain: it returns the
//! name it stopped at.

use futures::future::BoxFuture;
use itertools::Itertools as _;
use tracing::warn;

use crate::backend::Backend;
use crate::error::StoreError;
use crate::error::StoreResult;
use crate::object_id::Oid;
use crate::reflog;
use crate::reflog::ReflogEntry;

pub const SYMREF_PREFIX: &str = "ref: ";

/// Default number of symbolic hops `read_ref` follows.
pub const DEFAULT_DEPTH: u32 = 5;

/// Candidate full names for a possibly-short ref name, in probe order.
pub fn probe_candidates(name: &str) -> Vec<String> {
    vec![
        name.to_string(),
        format!("refs/{name}"),
        format!("refs/tags/{name}"),
        format!("refs/heads/{name}"),
        format!("refs/remotes/{name}"),
        format!("refs/remotes/{name}/HEAD"),
    ]
}

/// Rejects ref names that would escape the gitdir or corrupt the layout.
pub fn validate_ref_name(name: &str) -> StoreResult<()> {
    let bad = name.is_empty()
        || name.starts_with('/')
        || name.ends_with('/')
        || name.ends_with(".lock")
        || name.split('/').any(|part| {
            part.is_empty() || part == "." || part == ".." || part.starts_with('.')
        })
        || name
            .bytes()
            .any(|b| b.is_ascii_control() || matches!(b, b' ' | b'~' | b'^' | b':' | b'?' | b'[' | b'*' | b'\\'));
    // One-level names like HEAD or MERGE_HEAD are allowed; git's
    // all-caps-pseudo-ref convention covers them.
    if bad {
        Err(StoreError::Corrupt {
            reason: format!("invalid ref name {name:?}"),
        })
    } else {
        Ok(())
    }
}

/// One line of the packed-refs table, optionally pinned to a peeled tag
/// target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedRef {
    pub oid: Oid,
    pub name: String,
    pub peeled: Option<Oid>,
}

/// The parsed packed-refs table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedRefs {
    pub entries: Vec<PackedRef>,
}

impl PackedRefs {
    pub fn parse(text: &str) -> StoreResult<Self> {
        let mut entries: Vec<PackedRef> = Vec::new();
        for line in text.lines() {
            if line.starts_with('#') || line.is_empty() {
                continue;
            }
            if let Some(peeled) = line.strip_prefix('^') {
                let entry = entries.last_mut().ok_or_else(|| StoreError::Corrupt {
                    reason: "packed-refs peel line before any ref line".to_string(),
                })?;
                entry.peeled = Oid::try_from_hex(peeled).map(Some).ok_or_else(|| {
                    StoreError::Corrupt {
                        reason: format!("packed-refs peel line is not hex: {line:?}"),
                    }
                })?;
                continue;
            }
            let (oid_hex, name) = line.split_once(' ').ok_or_else(|| StoreError::Corrupt {
                reason: format!("malformed packed-refs line {line:?}"),
            })?;
            let oid = Oid::try_from_hex(oid_hex).ok_or_else(|| StoreError::Corrupt {
                reason: format!("packed-refs id is not hex: {line:?}"),
            })?;
            entries.push(PackedRef {
                oid,
                name: name.to_string(),
                peeled: None,
            });
        }
        Ok(Self { entries })
    }

    pub fn serialize(&self) -> String {
        let mut out = String::from("# pack-refs with: peeled fully-peeled sorted \n");
        for entry in &self.entries {
            out.push_str(&format!("{} {}\n", entry.oid.hex(), entry.name));
            if let Some(peeled) = &entry.peeled {
                out.push_str(&format!("^{}\n", peeled.hex()));
            }
        }
        out
    }

    pub fn find(&self, name: &str) -> Option<&PackedRef> {
        self.entries.iter().find(|entry| entry.name == name)
    }
}

async fn load_packed_refs(backend: &dyn Backend) -> StoreResult<PackedRefs> {
    match backend.read_packed_refs_text().await? {
        Some(text) => PackedRefs::parse(&text),
        None => Ok(PackedRefs::default()),
    }
}

/// The stored value of `name`: the loose file if present, the packed entry
/// otherwise. Returns the canonicalized full name together with the value.
async fn probe(backend: &dyn Backend, name: &str) -> StoreResult<Option<(String, String)>> {
    let packed = load_packed_refs(backend).await?;
    for candidate in probe_candidates(name) {
        if let Some(value) = backend.read_ref_file(&candidate).await? {
            return Ok(Some((candidate, value)));
        }
        if let Some(entry) = packed.find(&candidate) {
            return Ok(Some((candidate, entry.oid.hex())));
        }
    }
    Ok(None)
}

/// Resolves `name` to an object id, following at most `depth` symbolic hops.
///
/// Returns `Ok(None)` when the ref doesn't exist. When the depth budget runs
/// out while another hop remains, the (canonicalized) name resolution
/// stopped at is returned as-is — no error; callers that require an id must
/// check with [`HashFamily::is_valid_hex`].
///
/// [`HashFamily::is_valid_hex`]: crate::object_id::HashFamily::is_valid_hex
pub fn read_ref<'a>(
    backend: &'a dyn Backend,
    name: &'a str,
    depth: u32,
) -> BoxFuture<'a, StoreResult<Option<String>>> {
    Box::pin(async move {
        if backend.hash_family().is_valid_hex(name) {
            return Ok(Some(name.to_string()));
        }
        if let Some(target) = name.strip_prefix(SYMREF_PREFIX) {
            return read_ref(backend, target.trim(), depth.saturating_sub(1)).await;
        }
        let Some((full_name, value)) = probe(backend, name).await? else {
            return Ok(None);
        };
        if let Some(target) = value.strip_prefix(SYMREF_PREFIX) {
            // The budget pays per follow, so a direct ref still resolves at
            // depth zero while one more symbolic hop stops here.
            if depth == 0 {
                return Ok(Some(full_name));
            }
            return read_ref(backend, target.trim(), depth - 1).await;
        }
        Ok(Some(value))
    })
}

/// Resolves `name` all the way to an [`Oid`], failing with `NotFound` when
/// the ref is absent or stops at an unresolved symbolic name.
pub async fn resolve_ref(backend: &dyn Backend, name: &str) -> StoreResult<Oid> {
    let not_found = || StoreError::NotFound {
        what: format!("ref {name}"),
    };
    let value = read_ref(backend, name, DEFAULT_DEPTH)
        .await?
        .ok_or_else(not_found)?;
    if backend.hash_family().is_valid_hex(&value) {
        Ok(Oid::try_from_hex(&value).unwrap())
    } else {
        Err(not_found())
    }
}

/// Expands a short name to the first full probe path that exists.
pub async fn expand_ref(backend: &dyn Backend, name: &str) -> StoreResult<String> {
    match probe(backend, name).await? {
        Some((full_name, _)) => Ok(full_name),
        None => Err(StoreError::NotFound {
            what: format!("ref {name}"),
        }),
    }
}

/// Points `name` at `oid`, replacing the loose file atomically and (unless
/// `skip_reflog`) appending a reflog entry. The ref lock is held across the
/// read-modify-write; the reflog append happens after release and its
/// failure never propagates.
pub async fn write_ref(
    backend: &dyn Backend,
    name: &str,
    oid: &Oid,
    skip_reflog: bool,
) -> StoreResult<()> {
    write_ref_with_message(backend, name, oid, skip_reflog, "").await
}

pub async fn write_ref_with_message(
    backend: &dyn Backend,
    name: &str,
    oid: &Oid,
    skip_reflog: bool,
    message: &str,
) -> StoreResult<()> {
    validate_ref_name(name)?;
    if oid.family() != Some(backend.hash_family()) {
        return Err(StoreError::InvalidOid { value: oid.hex() });
    }
    let old = {
        let _lock = backend.lock_ref(name).await?;
        let old = match read_ref(backend, name, DEFAULT_DEPTH).await? {
            Some(value) if backend.hash_family().is_valid_hex(&value) => {
                Oid::try_from_hex(&value).unwrap()
            }
            _ => backend.hash_family().zero_oid(),
        };
        backend.write_ref_file(name, &oid.hex()).await?;
        old
    };
    if !skip_reflog {
        let entry = ReflogEntry::new(old, oid.clone(), &reflog::identity(backend).await, message);
        if let Err(err) = reflog::append(backend, name, &entry).await {
            warn!(ref_name = name, ?err, "reflog append failed, continuing");
        }
    }
    Ok(())
}

/// Makes `name` a symbolic ref to `target`. When `expected_old` is given the
/// write only happens if the current value (raw target or resolved id)
/// matches; otherwise the update fails with `Conflict` and has no effect.
pub async fn write_symref(
    backend: &dyn Backend,
    name: &str,
    target: &str,
    expected_old: Option<&str>,
) -> StoreResult<()> {
    validate_ref_name(name)?;
    validate_ref_name(target)?;
    let _lock = backend.lock_ref(name).await?;
    if let Some(expected) = expected_old {
        let raw = backend.read_ref_file(name).await?;
        let raw_target = raw
            .as_deref()
            .map(|value| value.strip_prefix(SYMREF_PREFIX).unwrap_or(value).trim());
        let resolved = read_ref(backend, name, DEFAULT_DEPTH).await?;
        let matches = raw_target == Some(expected) || resolved.as_deref() == Some(expected);
        if !matches {
            return Err(StoreError::Conflict {
                name: name.to_string(),
            });
        }
    }
    backend
        .write_ref_file(name, &format!("{SYMREF_PREFIX}{target}"))
        .await
}

/// The raw symbolic target of `name`, if it is a symbolic ref.
pub async fn read_symref(backend: &dyn Backend, name: &str) -> StoreResult<Option<String>> {
    let Some(value) = backend.read_ref_file(name).await? else {
        return Ok(None);
    };
    Ok(value
        .strip_prefix(SYMREF_PREFIX)
        .map(|target| target.trim().to_string()))
}

/// Removes the loose ref and its reflog. The packed-refs table is left
/// untouched.
pub async fn delete_ref(backend: &dyn Backend, name: &str) -> StoreResult<()> {
    validate_ref_name(name)?;
    backend.delete_ref_file(name).await?;
    backend.delete_reflog(name).await
}

/// Full names of all refs under `prefix`, loose and packed, sorted and
/// deduplicated.
pub async fn list_refs(backend: &dyn Backend, prefix: &str) -> StoreResult<Vec<String>> {
    let loose = backend.list_ref_files(prefix).await?;
    let packed = load_packed_refs(backend).await?;
    Ok(loose
        .into_iter()
        .chain(
            packed
                .entries
                .into_iter()
                .map(|entry| entry.name)
                .filter(|name| name.starts_with(prefix)),
        )
        .sorted()
        .dedup()
        .collect())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_packed_refs_roundtrip() {
        let text = "# pack-refs with: peeled fully-peeled sorted \n\
                    1111111111111111111111111111111111111111 refs/heads/main\n\
                    2222222222222222222222222222222222222222 refs/tags/v1\n\
                    ^3333333333333333333333333333333333333333\n";
        let packed = PackedRefs::parse(text).unwrap();
        assert_eq!(packed.entries.len(), 2);
        assert_eq!(
            packed.find("refs/tags/v1").unwrap().peeled,
            Some(Oid::from_hex("3333333333333333333333333333333333333333"))
        );
        assert!(packed.find("refs/heads/gone").is_none());
        let reparsed = PackedRefs::parse(&packed.serialize()).unwrap();
        assert_eq!(reparsed, packed);
    }

    #[test]
    fn test_packed_refs_rejects_dangling_peel() {
        assert_matches!(
            PackedRefs::parse("^1111111111111111111111111111111111111111\n"),
            Err(StoreError::Corrupt { .. })
        );
    }

    #[test]
    fn test_probe_order() {
        let candidates = probe_candidates("main");
        assert_eq!(
            candidates,
            vec![
                "main",
                "refs/main",
                "refs/tags/main",
                "refs/heads/main",
                "refs/remotes/main",
                "refs/remotes/main/HEAD",
            ]
        );
    }

    #[test]
    fn test_validate_ref_name() {
        assert!(validate_ref_name("refs/heads/main").is_ok());
        assert!(validate_ref_name("HEAD").is_ok());
        assert!(validate_ref_name("refs/heads/feature/x-1").is_ok());
        assert_matches!(
            validate_ref_name("refs/../escape"),
            Err(StoreError::Corrupt { .. })
        );
        assert_matches!(validate_ref_name(""), Err(StoreError::Corrupt { .. }));
        assert_matches!(
            validate_ref_name("refs/heads/sp ace"),
            Err(StoreError::Corrupt { .. })
        );
        assert_matches!(
            validate_ref_name("refs/heads/main.lock"),
            Err(StoreError::Corrupt { .. })
        );
        assert_matches!(
            validate_ref_name("refs/heads/.hidden"),
            Err(StoreError::Corrupt { .. })
        );
    }
}
