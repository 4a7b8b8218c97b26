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

//! The staging area: the binary `DIRC` index file, versions 2 and 3.
//!
//! Entries stay sorted by `(path, stage)`; paths use forward slashes on
//! every host. Stage 0 is a normal entry, stages 1/2/3 are the
//! base/ours/theirs slots of a conflicted path.

use bstr::ByteSlice as _;

use crate::error::StoreError;
use crate::error::StoreResult;
use crate::object_codec;
use crate::object_id::HashFamily;
use crate::object_id::Oid;

const SIGNATURE: &[u8; 4] = b"DIRC";

const FLAG_ASSUME_VALID: u16 = 0x8000;
const FLAG_EXTENDED: u16 = 0x4000;
const NAME_LEN_MASK: u16 = 0x0fff;

const EXT_FLAG_SKIP_WORKTREE: u16 = 0x4000;
const EXT_FLAG_INTENT_TO_ADD: u16 = 0x2000;

/// Cached stat fields. Substrates without POSIX stat record zeros, at the
/// cost of more false-positive dirty detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStat {
    pub ctime_secs: u32,
    pub ctime_nanos: u32,
    pub mtime_secs: u32,
    pub mtime_nanos: u32,
    pub dev: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub path: String,
    pub oid: Oid,
    pub mode: u32,
    pub stage: u8,
    pub stat: IndexStat,
    pub assume_valid: bool,
    pub intent_to_add: bool,
    pub skip_worktree: bool,
}

impl IndexEntry {
    pub fn new(path: impl Into<String>, oid: Oid, mode: u32, stage: u8) -> Self {
        Self {
            path: normalize_path(&path.into()),
            oid,
            mode: normalize_mode(mode),
            stage,
            stat: IndexStat::default(),
            assume_valid: false,
            intent_to_add: false,
            skip_worktree: false,
        }
    }

    fn has_extended_flags(&self) -> bool {
        self.intent_to_add || self.skip_worktree
    }
}

/// Collapses a host file mode to the four shapes git stores: regular file,
/// executable file, symlink, gitlink.
pub fn normalize_mode(mode: u32) -> u32 {
    match mode & 0o170000 {
        0o120000 => 0o120000,
        0o160000 => 0o160000,
        _ => {
            if mode & 0o111 != 0 {
                0o100755
            } else {
                0o100644
            }
        }
    }
}

/// Forward slashes, no `./` prefix, no trailing slash.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = path.strip_prefix("./").unwrap_or(&path);
    path.trim_end_matches('/').to_string()
}

/// The in-memory index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    version: u32,
    entries: Vec<IndexEntry>,
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Index {
    pub fn new() -> Self {
        Self {
            version: 2,
            entries: Vec::new(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Paths with any stage above 0, each listed once.
    pub fn unmerged_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.stage > 0)
            .map(|entry| entry.path.clone())
            .collect();
        paths.dedup();
        paths
    }

    fn position(&self, path: &str, stage: u8) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|entry| (entry.path.as_str(), entry.stage).cmp(&(path, stage)))
    }

    /// Upserts an entry, keeping the `(path, stage)` order.
    pub fn insert(&mut self, entry: IndexEntry) {
        match self.position(&entry.path, entry.stage) {
            Ok(at) => self.entries[at] = entry,
            Err(at) => self.entries.insert(at, entry),
        }
    }

    /// Removes one stage of `path`, or every stage when `stage` is `None`.
    /// Returns whether anything was removed.
    pub fn remove(&mut self, path: &str, stage: Option<u8>) -> bool {
        let path = normalize_path(path);
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.path != path || stage.is_some_and(|s| s != entry.stage));
        before != self.entries.len()
    }

    pub fn get(&self, path: &str, stage: u8) -> Option<&IndexEntry> {
        let path = normalize_path(path);
        self.position(&path, stage)
            .ok()
            .map(|at| &self.entries[at])
    }

    pub fn has(&self, path: &str, stage: Option<u8>) -> bool {
        let path = normalize_path(path);
        match stage {
            Some(stage) => self.position(&path, stage).is_ok(),
            None => self.entries.iter().any(|entry| entry.path == path),
        }
    }

    /// Replaces all stages of `path` with conflict stages 1/2/3. A missing
    /// side (e.g. no common ancestor) simply leaves its stage out.
    pub fn set_conflict(
        &mut self,
        path: &str,
        base: Option<(u32, Oid)>,
        ours: Option<(u32, Oid)>,
        theirs: Option<(u32, Oid)>,
    ) {
        self.remove(path, None);
        for (stage, side) in [(1, base), (2, ours), (3, theirs)] {
            if let Some((mode, oid)) = side {
                self.insert(IndexEntry::new(path, oid, mode, stage));
            }
        }
    }

    pub fn parse(data: &[u8], family: HashFamily) -> StoreResult<Self> {
        let corrupt = |reason: &str| StoreError::Corrupt {
            reason: format!("index: {reason}"),
        };
        let hash_len = family.byte_len();
        if data.len() < 12 + hash_len {
            return Err(corrupt("truncated header"));
        }
        if &data[..4] != SIGNATURE {
            return Err(corrupt("bad signature"));
        }
        let version = read_u32(data, 4);
        if version != 2 && version != 3 {
            return Err(corrupt(&format!("unsupported version {version}")));
        }
        let count = read_u32(data, 8) as usize;

        let (content, checksum) = data.split_at(data.len() - hash_len);
        if object_codec::hash_bytes(family, content) != checksum {
            return Err(corrupt("checksum mismatch"));
        }

        let mut entries = Vec::with_capacity(count);
        let mut at = 12;
        for _ in 0..count {
            let fixed = 40 + hash_len + 2;
            if content.len() < at + fixed {
                return Err(corrupt("truncated entry"));
            }
            let stat = IndexStat {
                ctime_secs: read_u32(content, at),
                ctime_nanos: read_u32(content, at + 4),
                mtime_secs: read_u32(content, at + 8),
                mtime_nanos: read_u32(content, at + 12),
                dev: read_u32(content, at + 16),
                ino: read_u32(content, at + 20),
                uid: read_u32(content, at + 28),
                gid: read_u32(content, at + 32),
                size: read_u32(content, at + 36),
            };
            let mode = read_u32(content, at + 24);
            let oid = Oid::from_bytes(&content[at + 40..at + 40 + hash_len]);
            let flags = read_u16(content, at + 40 + hash_len);
            let mut entry_len = fixed;
            let mut intent_to_add = false;
            let mut skip_worktree = false;
            if flags & FLAG_EXTENDED != 0 {
                if version < 3 {
                    return Err(corrupt("extended flags in a v2 index"));
                }
                let extended = read_u16(content, at + entry_len);
                intent_to_add = extended & EXT_FLAG_INTENT_TO_ADD != 0;
                skip_worktree = extended & EXT_FLAG_SKIP_WORKTREE != 0;
                entry_len += 2;
            }
            let name_at = at + entry_len;
            let nul = content[name_at..]
                .find_byte(0)
                .ok_or_else(|| corrupt("unterminated entry path"))?;
            let stored_len = usize::from(flags & NAME_LEN_MASK);
            if stored_len != usize::from(NAME_LEN_MASK) && stored_len != nul {
                return Err(corrupt("entry path length disagrees with flags"));
            }
            let path = content[name_at..name_at + nul]
                .to_str()
                .map_err(|_| corrupt("entry path is not UTF-8"))?
                .to_string();
            entries.push(IndexEntry {
                path,
                oid,
                mode,
                stage: ((flags >> 12) & 0x3) as u8,
                stat,
                assume_valid: flags & FLAG_ASSUME_VALID != 0,
                intent_to_add,
                skip_worktree,
            });
            entry_len += nul;
            // Entries are NUL-padded to a multiple of eight bytes.
            entry_len += 8 - (entry_len % 8);
            at += entry_len;
        }

        if !entries.is_sorted_by(|a, b| (&a.path, a.stage) < (&b.path, b.stage)) {
            return Err(corrupt("entries out of (path, stage) order"));
        }

        // Extension chunks between the entries and the checksum are skipped;
        // this codec does not interpret or preserve them.
        while at + 8 <= content.len() {
            let size = read_u32(content, at + 4) as usize;
            at = at
                .checked_add(8 + size)
                .filter(|&end| end <= content.len())
                .ok_or_else(|| corrupt("extension overruns file"))?;
        }

        Ok(Self { version, entries })
    }

    /// Canonical serialization with the trailing content hash.
    pub fn to_bytes(&self, family: HashFamily) -> Vec<u8> {
        let version = if self.entries.iter().any(IndexEntry::has_extended_flags) {
            self.version.max(3)
        } else {
            self.version
        };
        let mut out = Vec::new();
        out.extend_from_slice(SIGNATURE);
        out.extend_from_slice(&version.to_be_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        for entry in &self.entries {
            let start = out.len();
            for field in [
                entry.stat.ctime_secs,
                entry.stat.ctime_nanos,
                entry.stat.mtime_secs,
                entry.stat.mtime_nanos,
                entry.stat.dev,
                entry.stat.ino,
                entry.mode,
                entry.stat.uid,
                entry.stat.gid,
                entry.stat.size,
            ] {
                out.extend_from_slice(&field.to_be_bytes());
            }
            out.extend_from_slice(entry.oid.as_bytes());
            let name_len = entry.path.len().min(usize::from(NAME_LEN_MASK)) as u16;
            let mut flags = name_len | (u16::from(entry.stage) << 12);
            if entry.assume_valid {
                flags |= FLAG_ASSUME_VALID;
            }
            if entry.has_extended_flags() {
                flags |= FLAG_EXTENDED;
            }
            out.extend_from_slice(&flags.to_be_bytes());
            if entry.has_extended_flags() {
                let mut extended = 0u16;
                if entry.intent_to_add {
                    extended |= EXT_FLAG_INTENT_TO_ADD;
                }
                if entry.skip_worktree {
                    extended |= EXT_FLAG_SKIP_WORKTREE;
                }
                out.extend_from_slice(&extended.to_be_bytes());
            }
            out.extend_from_slice(entry.path.as_bytes());
            let entry_len = out.len() - start;
            let padding = 8 - (entry_len % 8);
            out.extend_from_slice(&vec![0; padding]);
        }
        let checksum = object_codec::hash_bytes(family, &out);
        out.extend_from_slice(&checksum);
        out
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes(data[at..at + 4].try_into().unwrap())
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes(data[at..at + 2].try_into().unwrap())
}
