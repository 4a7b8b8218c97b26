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

//! The append-only per-ref log under `logs/`.
//!
//! A reflog is an aid to humans, not a transactional dependency: callers
//! swallow append failures so the primary ref update always wins.

use crate::backend::Backend;
use crate::config;
use crate::error::StoreError;
use crate::error::StoreResult;
use crate::object::Signature;
use crate::object::Timestamp;
use crate::object_id::Oid;

/// One reflog line:
/// `<old> <new> <name> <<email>> <unix_ts> <tz>\t<message>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflogEntry {
    pub old: Oid,
    pub new: Oid,
    pub who: Signature,
    pub message: String,
}

impl ReflogEntry {
    pub fn new(old: Oid, new: Oid, who: &Signature, message: &str) -> Self {
        Self {
            old,
            new,
            who: who.clone(),
            message: message.to_string(),
        }
    }

    pub fn serialize(&self) -> String {
        format!(
            "{} {} {}\t{}\n",
            self.old.hex(),
            self.new.hex(),
            self.who.serialize(),
            self.message
        )
    }

    pub fn parse(line: &str) -> StoreResult<Self> {
        let corrupt = || StoreError::Corrupt {
            reason: format!("malformed reflog line {line:?}"),
        };
        let line = line.strip_suffix('\n').unwrap_or(line);
        let (left, message) = line.split_once('\t').ok_or_else(corrupt)?;
        let (old_hex, rest) = left.split_once(' ').ok_or_else(corrupt)?;
        let (new_hex, who) = rest.split_once(' ').ok_or_else(corrupt)?;
        let old = Oid::try_from_hex(old_hex).ok_or_else(corrupt)?;
        let new = Oid::try_from_hex(new_hex).ok_or_else(corrupt)?;
        Ok(Self {
            old,
            new,
            who: Signature::parse(who)?,
            message: message.to_string(),
        })
    }
}

/// Appends one entry, creating intermediate directories lazily.
pub async fn append(backend: &dyn Backend, name: &str, entry: &ReflogEntry) -> StoreResult<()> {
    backend.append_reflog_raw(name, &entry.serialize()).await
}

/// Parses the whole log of `name`, oldest entry first.
pub async fn read(backend: &dyn Backend, name: &str) -> StoreResult<Vec<ReflogEntry>> {
    let Some(raw) = backend.read_reflog_raw(name).await? else {
        return Ok(Vec::new());
    };
    raw.lines().map(ReflogEntry::parse).collect()
}

/// The identity recorded in reflog entries: `user.name` / `user.email` from
/// config when set, a neutral fallback otherwise.
pub async fn identity(backend: &dyn Backend) -> Signature {
    let (name, email) = match backend.read_config().await {
        Ok(Some(text)) => {
            let file = config::ConfigFile::parse(&text);
            (
                file.get("user.name").map(str::to_string),
                file.get("user.email").map(str::to_string),
            )
        }
        _ => (None, None),
    };
    Signature {
        name: name.unwrap_or_else(|| "unknown".to_string()),
        email: email.unwrap_or_else(|| "unknown@localhost".to_string()),
        timestamp: Timestamp::now(),
    }
}

// Fixed message strings for the common events.

pub fn commit_message(summary: &str, amend: bool, initial: bool) -> String {
    if amend {
        format!("commit (amend): {summary}")
    } else if initial {
        format!("commit (initial): {summary}")
    } else {
        format!("commit: {summary}")
    }
}

pub fn fast_forward_message(theirs: &str) -> String {
    format!("merge {theirs}: Fast-forward")
}

pub fn merge_message(theirs: &str) -> String {
    format!("merge {theirs}: Merge made by the 'recursive' strategy.")
}

pub fn checkout_message(from: &str, to: &str) -> String {
    format!("checkout: moving from {from} to {to}")
}

pub fn reset_message(target: &str) -> String {
    format!("reset: moving to {target}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_roundtrip() {
        let entry = ReflogEntry {
            old: Oid::from_hex("0000000000000000000000000000000000000000"),
            new: Oid::from_hex("d670460b4b4aece5915caf5c68d12f560a9fe3e4"),
            who: Signature {
                name: "A".to_string(),
                email: "a@x".to_string(),
                timestamp: Timestamp {
                    seconds: 1700000000,
                    tz_offset_minutes: 0,
                },
            },
            message: "commit (initial): first".to_string(),
        };
        let line = entry.serialize();
        assert_eq!(
            line,
            "0000000000000000000000000000000000000000 \
             d670460b4b4aece5915caf5c68d12f560a9fe3e4 \
             A <a@x> 1700000000 +0000\tcommit (initial): first\n"
        );
        assert_eq!(ReflogEntry::parse(&line).unwrap(), entry);
    }

    #[test]
    fn test_fixed_messages() {
        assert_eq!(commit_message("subj", false, false), "commit: subj");
        assert_eq!(commit_message("subj", true, false), "commit (amend): subj");
        assert_eq!(
            commit_message("subj", false, true),
            "commit (initial): subj"
        );
        assert_eq!(
            fast_forward_message("refs/heads/feat"),
            "merge refs/heads/feat: Fast-forward"
        );
    }
}
