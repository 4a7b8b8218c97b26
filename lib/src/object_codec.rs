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

//! The object wire codec: `"<type> <len>\0" ++ body`, zlib compression, and
//! content hashing.

use std::io::Read as _;
use std::io::Write as _;

use bstr::ByteSlice as _;
use digest::Digest as _;
use flate2::Compression;
use flate2::bufread::ZlibDecoder;
use flate2::write::ZlibEncoder;
use sha1::Sha1;
use sha2::Sha256;

use crate::error::StoreError;
use crate::error::StoreResult;
use crate::object_id::HashFamily;
use crate::object_id::Oid;

/// The four git object kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"blob" => Some(Self::Blob),
            b"tree" => Some(Self::Tree),
            b"commit" => Some(Self::Commit),
            b"tag" => Some(Self::Tag),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produces the wrapped form whose hash is the object's id.
pub fn wrap(otype: ObjectType, body: &[u8]) -> Vec<u8> {
    let header = format!("{} {}\0", otype.as_str(), body.len());
    let mut wrapped = Vec::with_capacity(header.len() + body.len());
    wrapped.extend_from_slice(header.as_bytes());
    wrapped.extend_from_slice(body);
    wrapped
}

/// Splits a wrapped object back into its type and body.
pub fn unwrap(wrapped: &[u8]) -> StoreResult<(ObjectType, &[u8])> {
    let nul = wrapped.find_byte(0).ok_or_else(|| StoreError::Corrupt {
        reason: "object header has no NUL terminator".to_string(),
    })?;
    let header = &wrapped[..nul];
    let body = &wrapped[nul + 1..];
    let space = header.find_byte(b' ').ok_or_else(|| StoreError::Corrupt {
        reason: "object header has no type/length separator".to_string(),
    })?;
    let otype = ObjectType::from_bytes(&header[..space]).ok_or_else(|| StoreError::Corrupt {
        reason: format!(
            "unknown object type {:?}",
            header[..space].as_bstr().to_string()
        ),
    })?;
    let len: usize = std::str::from_utf8(&header[space + 1..])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StoreError::Corrupt {
            reason: "object header length is not a number".to_string(),
        })?;
    if len != body.len() {
        return Err(StoreError::Corrupt {
            reason: format!(
                "object header declares {len} bytes but body has {}",
                body.len()
            ),
        });
    }
    Ok((otype, body))
}

/// Hashes a wrapped object with the given family, yielding its id.
pub fn hash_wrapped(family: HashFamily, wrapped: &[u8]) -> Oid {
    match family {
        HashFamily::Sha1 => {
            let mut hasher = Sha1::new();
            hasher.update(wrapped);
            Oid::new(hasher.finalize().to_vec())
        }
        HashFamily::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(wrapped);
            Oid::new(hasher.finalize().to_vec())
        }
    }
}

/// Hashes arbitrary bytes with the given family. Used for index checksums.
pub fn hash_bytes(family: HashFamily, data: &[u8]) -> Vec<u8> {
    match family {
        HashFamily::Sha1 => Sha1::digest(data).to_vec(),
        HashFamily::Sha256 => Sha256::digest(data).to_vec(),
    }
}

pub fn deflate(data: &[u8]) -> StoreResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(StoreError::other)?;
    encoder.finish().map_err(StoreError::other)
}

pub fn inflate(data: &[u8]) -> StoreResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|err| StoreError::Corrupt {
            reason: format!("zlib stream: {err}"),
        })?;
    Ok(out)
}
