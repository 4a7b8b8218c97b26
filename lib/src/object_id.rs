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

//! Object identifiers and the repository-wide hash family.

use std::fmt;
use std::fmt::Debug;

use crate::hex_util;

/// The content-hash family of a repository. Chosen at `init` time, recorded
/// in `extensions.objectformat`, and locked once the first object is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HashFamily {
    Sha1,
    Sha256,
}

impl HashFamily {
    /// The config value under `extensions.objectformat`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }

    /// Length of a raw hash in bytes (20 or 32).
    pub fn byte_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Length of a hex-encoded id (40 or 64).
    pub fn hex_len(self) -> usize {
        self.byte_len() * 2
    }

    /// Whether `s` is a full hex id of this family.
    pub fn is_valid_hex(self, s: &str) -> bool {
        s.len() == self.hex_len() && hex_util::is_hex(s)
    }

    /// The all-zeros id used as the "absent" side of a ref update.
    pub fn zero_oid(self) -> Oid {
        Oid(vec![0; self.byte_len()])
    }

    /// The id of the empty tree object in this family.
    pub fn empty_tree_oid(self) -> Oid {
        match self {
            Self::Sha1 => Oid::from_hex("4b825dc642cb6eb9a060e54bf8d69288fbee4904"),
            Self::Sha256 => Oid::from_hex(
                "6ef19b41225c5369f1c104d45d8d85efa9b057b53b14b4b9b939dd74decc5321",
            ),
        }
    }
}

/// A content-addressed object id: the hash of an object's wrapped form.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid(Vec<u8>);

impl Oid {
    pub fn new(value: Vec<u8>) -> Self {
        Self(value)
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// Parses the given hex string into an `Oid`.
    ///
    /// The given string must be valid. A static str is required to prevent
    /// API misuse.
    pub fn from_hex(hex: &'static str) -> Self {
        Self::try_from_hex(hex).unwrap()
    }

    /// Parses the given hex string into an `Oid`.
    pub fn try_from_hex(hex: impl AsRef<[u8]>) -> Option<Self> {
        hex_util::decode_hex(hex).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.clone()
    }

    pub fn hex(&self) -> String {
        hex_util::encode_hex(&self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// The family this id belongs to, judging by its length.
    pub fn family(&self) -> Option<HashFamily> {
        match self.0.len() {
            20 => Some(HashFamily::Sha1),
            32 => Some(HashFamily::Sha256),
            _ => None,
        }
    }
}

impl Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_tuple("Oid").field(&self.hex()).finish()
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.pad(&self.hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_oid() {
        let oid = Oid::from_hex("deadbeef0123");
        assert_eq!(format!("{oid}"), "deadbeef0123");
        assert_eq!(format!("{oid:.6}"), "deadbe");
    }

    #[test]
    fn test_family_lengths() {
        assert_eq!(HashFamily::Sha1.hex_len(), 40);
        assert_eq!(HashFamily::Sha256.hex_len(), 64);
        assert!(HashFamily::Sha1.is_valid_hex(&"a".repeat(40)));
        assert!(!HashFamily::Sha1.is_valid_hex(&"a".repeat(64)));
        assert!(HashFamily::Sha256.is_valid_hex(&"a".repeat(64)));
        assert!(!HashFamily::Sha1.is_valid_hex(&"g".repeat(40)));
    }

    #[test]
    fn test_zero_oid() {
        let zero = HashFamily::Sha1.zero_oid();
        assert!(zero.is_zero());
        assert_eq!(zero.hex(), "0".repeat(40));
        assert_eq!(zero.family(), Some(HashFamily::Sha1));
    }

    #[test]
    fn test_empty_tree_sentinel() {
        assert_eq!(
            HashFamily::Sha1.empty_tree_oid().hex(),
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
    }
}
