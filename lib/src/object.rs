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

//! Commit, tree and tag records and their canonical byte forms.

use bstr::ByteSlice as _;

use crate::error::StoreError;
use crate::error::StoreResult;
use crate::object_codec::ObjectType;
use crate::object_id::HashFamily;
use crate::object_id::Oid;

/// A point in time at git's second precision, with the recording clock's UTC
/// offset in minutes.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
pub struct Timestamp {
    pub seconds: i64,
    pub tz_offset_minutes: i32,
}

impl Timestamp {
    pub fn now() -> Self {
        let now = chrono::Local::now();
        Self {
            seconds: now.timestamp(),
            tz_offset_minutes: now.offset().local_minus_utc() / 60,
        }
    }

    /// Formats the offset as git's `+HHMM` / `-HHMM`.
    pub fn format_tz(&self) -> String {
        let sign = if self.tz_offset_minutes < 0 { '-' } else { '+' };
        let abs = self.tz_offset_minutes.unsigned_abs();
        format!("{sign}{:02}{:02}", abs / 60, abs % 60)
    }

    /// Parses a `+HHMM` / `-HHMM` offset into minutes.
    pub fn parse_tz(s: &str) -> Option<i32> {
        let (sign, digits) = match s.split_at_checked(1)? {
            ("+", rest) => (1, rest),
            ("-", rest) => (-1, rest),
            _ => return None,
        };
        if digits.len() != 4 {
            return None;
        }
        let hours: i32 = digits[..2].parse().ok()?;
        let minutes: i32 = digits[2..].parse().ok()?;
        Some(sign * (hours * 60 + minutes))
    }
}

/// An author or committer identity attached to a point in time.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp: Timestamp,
}

impl Signature {
    /// The canonical header payload: `Name <email> 1700000000 +0000`.
    pub fn serialize(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.timestamp.seconds,
            self.timestamp.format_tz()
        )
    }

    pub fn parse(s: &str) -> StoreResult<Self> {
        let corrupt = || StoreError::Corrupt {
            reason: format!("malformed signature {s:?}"),
        };
        let lt = s.find('<').ok_or_else(corrupt)?;
        let gt = s[lt..].find('>').ok_or_else(corrupt)? + lt;
        let name = s[..lt].trim_end().to_string();
        let email = s[lt + 1..gt].to_string();
        let mut rest = s[gt + 1..].split_whitespace();
        let seconds = rest
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(corrupt)?;
        let tz_offset_minutes = rest
            .next()
            .and_then(Timestamp::parse_tz)
            .ok_or_else(corrupt)?;
        Ok(Self {
            name,
            email,
            timestamp: Timestamp {
                seconds,
                tz_offset_minutes,
            },
        })
    }
}

/// A commit record. Parents are ordered; the first parent is "ours" when the
/// commit is a merge.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Commit {
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
    pub gpgsig: Option<String>,
}

impl Commit {
    /// First line of the message, for reflogs and summaries.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

pub fn serialize_commit(commit: &Commit) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&format!("tree {}\n", commit.tree.hex()));
    for parent in &commit.parents {
        out.push_str(&format!("parent {}\n", parent.hex()));
    }
    out.push_str(&format!("author {}\n", commit.author.serialize()));
    out.push_str(&format!("committer {}\n", commit.committer.serialize()));
    if let Some(sig) = &commit.gpgsig {
        out.push_str("gpgsig");
        for line in sig.lines() {
            out.push(' ');
            out.push_str(line);
            out.push('\n');
        }
    }
    out.push('\n');
    out.push_str(&commit.message);
    out.into_bytes()
}

pub fn parse_commit(body: &[u8]) -> StoreResult<Commit> {
    let (headers, message) = split_headers(body)?;
    let mut tree = None;
    let mut parents = Vec::new();
    let mut author = None;
    let mut committer = None;
    let mut gpgsig = None;
    for (key, value) in headers {
        match key.as_str() {
            "tree" => tree = Some(parse_header_oid("tree", &value)?),
            "parent" => parents.push(parse_header_oid("parent", &value)?),
            "author" => author = Some(Signature::parse(&value)?),
            "committer" => committer = Some(Signature::parse(&value)?),
            "gpgsig" => gpgsig = Some(value),
            _ => {} // tolerate unknown headers (e.g. mergetag, encoding)
        }
    }
    let missing = |what| StoreError::Corrupt {
        reason: format!("commit object lacks a {what} header"),
    };
    Ok(Commit {
        tree: tree.ok_or_else(|| missing("tree"))?,
        parents,
        author: author.ok_or_else(|| missing("author"))?,
        committer: committer.ok_or_else(|| missing("committer"))?,
        message,
        gpgsig,
    })
}

/// One entry of a tree object: `(mode, name, child id)`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TreeEntry {
    pub mode: u32,
    pub name: String,
    pub oid: Oid,
}

impl TreeEntry {
    pub fn is_tree(&self) -> bool {
        self.mode & 0o170000 == 0o040000
    }
}

/// Serializes tree entries, which must already be in canonical order. Modes
/// are six octal digits; `040000` keeps its leading zero.
pub fn serialize_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in entries {
        out.extend_from_slice(format!("{:06o} ", entry.mode).as_bytes());
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
        out.extend_from_slice(entry.oid.as_bytes());
    }
    out
}

/// Parses a tree object body. Accepts both the six-digit and the
/// zero-stripped mode spellings.
pub fn parse_tree(body: &[u8], family: HashFamily) -> StoreResult<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        let corrupt = |reason: &str| StoreError::Corrupt {
            reason: format!("tree entry: {reason}"),
        };
        let space = rest
            .find_byte(b' ')
            .ok_or_else(|| corrupt("missing mode separator"))?;
        let mode = std::str::from_utf8(&rest[..space])
            .ok()
            .and_then(|s| u32::from_str_radix(s, 8).ok())
            .ok_or_else(|| corrupt("mode is not octal"))?;
        rest = &rest[space + 1..];
        let nul = rest
            .find_byte(0)
            .ok_or_else(|| corrupt("missing name terminator"))?;
        let name = rest[..nul]
            .to_str()
            .map_err(|_| corrupt("name is not UTF-8"))?
            .to_string();
        rest = &rest[nul + 1..];
        if rest.len() < family.byte_len() {
            return Err(corrupt("truncated object id"));
        }
        let (id, tail) = rest.split_at(family.byte_len());
        entries.push(TreeEntry {
            mode,
            name,
            oid: Oid::from_bytes(id),
        });
        rest = tail;
    }
    Ok(entries)
}

/// An annotated tag record.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Tag {
    pub object: Oid,
    pub target_type: ObjectType,
    pub name: String,
    pub tagger: Option<Signature>,
    pub message: String,
}

pub fn serialize_tag(tag: &Tag) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&format!("object {}\n", tag.object.hex()));
    out.push_str(&format!("type {}\n", tag.target_type));
    out.push_str(&format!("tag {}\n", tag.name));
    if let Some(tagger) = &tag.tagger {
        out.push_str(&format!("tagger {}\n", tagger.serialize()));
    }
    out.push('\n');
    out.push_str(&tag.message);
    out.into_bytes()
}

pub fn parse_tag(body: &[u8]) -> StoreResult<Tag> {
    let (headers, message) = split_headers(body)?;
    let mut object = None;
    let mut target_type = None;
    let mut name = None;
    let mut tagger = None;
    for (key, value) in headers {
        match key.as_str() {
            "object" => object = Some(parse_header_oid("object", &value)?),
            "type" => {
                target_type = ObjectType::from_bytes(value.as_bytes());
            }
            "tag" => name = Some(value),
            "tagger" => tagger = Some(Signature::parse(&value)?),
            _ => {}
        }
    }
    let missing = |what| StoreError::Corrupt {
        reason: format!("tag object lacks a {what} header"),
    };
    Ok(Tag {
        object: object.ok_or_else(|| missing("object"))?,
        target_type: target_type.ok_or_else(|| missing("type"))?,
        name: name.ok_or_else(|| missing("tag"))?,
        tagger,
        message,
    })
}

/// Splits a commit/tag body into `(headers, message)`. A header value
/// continues across lines that start with a space (gpgsig).
fn split_headers(body: &[u8]) -> StoreResult<(Vec<(String, String)>, String)> {
    let text = body.to_str().map_err(|_| StoreError::Corrupt {
        reason: "object body is not UTF-8".to_string(),
    })?;
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut lines = text.split_inclusive('\n');
    let mut consumed = 0;
    for line in &mut lines {
        consumed += line.len();
        let trimmed = line.strip_suffix('\n').unwrap_or(line);
        if trimmed.is_empty() {
            break;
        }
        if let Some(continuation) = trimmed.strip_prefix(' ') {
            let (_, value) = headers.last_mut().ok_or_else(|| StoreError::Corrupt {
                reason: "continuation line before any header".to_string(),
            })?;
            value.push('\n');
            value.push_str(continuation);
        } else {
            let (key, value) = trimmed.split_once(' ').ok_or_else(|| StoreError::Corrupt {
                reason: format!("malformed object header line {trimmed:?}"),
            })?;
            headers.push((key.to_string(), value.to_string()));
        }
    }
    Ok((headers, text[consumed..].to_string()))
}

fn parse_header_oid(header: &str, value: &str) -> StoreResult<Oid> {
    Oid::try_from_hex(value).ok_or_else(|| StoreError::Corrupt {
        reason: format!("{header} header is not a hex id: {value:?}"),
    })
}
