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

use assert_matches::assert_matches;
use gitstore::StoreError;
use gitstore::object_id::Oid;
use pollster::FutureExt as _;
use test_case::test_case;
use testutils::TestBackendKind;
use testutils::TestStore;

fn oid(n: u8) -> Oid {
    Oid::new(vec![n; 20])
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_write_read_delete(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    store
        .write_ref("refs/heads/topic", &oid(1), false)
        .block_on()
        .unwrap();
    assert_eq!(
        store.resolve_ref("refs/heads/topic").block_on().unwrap(),
        oid(1)
    );
    // The update left a reflog entry with a zero old side.
    let log = store.read_reflog("refs/heads/topic").block_on().unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].old.is_zero());
    assert_eq!(log[0].new, oid(1));

    store.delete_ref("refs/heads/topic").block_on().unwrap();
    assert_matches!(
        store.resolve_ref("refs/heads/topic").block_on().unwrap_err().source,
        StoreError::NotFound { .. }
    );
    assert!(store.read_reflog("refs/heads/topic").block_on().unwrap().is_empty());
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_skip_reflog(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    store
        .write_ref("refs/heads/quiet", &oid(2), true)
        .block_on()
        .unwrap();
    assert!(store.read_reflog("refs/heads/quiet").block_on().unwrap().is_empty());
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_expand_ref_probe_order(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    store
        .write_ref("refs/heads/v1", &oid(1), true)
        .block_on()
        .unwrap();
    store
        .write_ref("refs/tags/v1", &oid(2), true)
        .block_on()
        .unwrap();
    // Tags probe before heads.
    assert_eq!(store.expand_ref("v1").block_on().unwrap(), "refs/tags/v1");
    assert_eq!(
        store.expand_ref("heads/v1").block_on().unwrap(),
        "refs/heads/v1"
    );
    assert_matches!(
        store.expand_ref("nonexistent").block_on().unwrap_err().source,
        StoreError::NotFound { .. }
    );
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_symref_chain_depth(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    let target = oid(9);
    store.write_ref("refs/heads/F", &target, true).block_on().unwrap();
    for (from, to) in [
        ("refs/heads/A", "refs/heads/B"),
        ("refs/heads/B", "refs/heads/C"),
        ("refs/heads/C", "refs/heads/D"),
        ("refs/heads/D", "refs/heads/E"),
        ("refs/heads/E", "refs/heads/F"),
    ] {
        store.write_symref(from, to, None).block_on().unwrap();
    }

    // Five hops resolve all the way to the id.
    assert_eq!(
        store.read_ref("refs/heads/A", 5).block_on().unwrap(),
        Some(target.hex())
    );
    // A depth of three stops at D, unresolved but not an error.
    assert_eq!(
        store.read_ref("refs/heads/A", 3).block_on().unwrap(),
        Some("refs/heads/D".to_string())
    );
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_symref_loop_terminates(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    store
        .write_symref("refs/heads/ping", "refs/heads/pong", None)
        .block_on()
        .unwrap();
    store
        .write_symref("refs/heads/pong", "refs/heads/ping", None)
        .block_on()
        .unwrap();
    // Resolution gives up after the depth budget instead of spinning.
    let result = store.read_ref("refs/heads/ping", 5).block_on().unwrap();
    assert_matches!(result.as_deref(), Some("refs/heads/ping" | "refs/heads/pong"));
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_expected_old_mismatch(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    store
        .write_ref("refs/heads/x", &oid(1), true)
        .block_on()
        .unwrap();
    store
        .write_symref("HEAD", "refs/heads/x", None)
        .block_on()
        .unwrap();

    let err = store
        .write_symref("HEAD", "refs/heads/y", Some("refs/heads/z"))
        .block_on()
        .unwrap_err();
    assert_matches!(err.source, StoreError::Conflict { .. });
    // No side effects on mismatch.
    assert_eq!(
        store.read_symref("HEAD").block_on().unwrap(),
        Some("refs/heads/x".to_string())
    );

    // A matching expectation goes through, by raw target or resolved id.
    store
        .write_symref("HEAD", "refs/heads/y", Some("refs/heads/x"))
        .block_on()
        .unwrap();
    assert_eq!(
        store.read_symref("HEAD").block_on().unwrap(),
        Some("refs/heads/y".to_string())
    );
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_loose_wins_over_packed(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    let packed_text = format!(
        "# pack-refs with: peeled fully-peeled sorted \n{} refs/heads/main\n",
        oid(1).hex()
    );
    store.write_packed_refs(&packed_text).block_on().unwrap();
    assert_eq!(
        store.resolve_ref("refs/heads/main").block_on().unwrap(),
        oid(1)
    );

    store
        .write_ref("refs/heads/main", &oid(2), true)
        .block_on()
        .unwrap();
    assert_eq!(
        store.resolve_ref("refs/heads/main").block_on().unwrap(),
        oid(2)
    );

    // Deleting the loose ref does not touch the packed table.
    store.delete_ref("refs/heads/main").block_on().unwrap();
    assert_eq!(
        store.resolve_ref("refs/heads/main").block_on().unwrap(),
        oid(1)
    );
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_list_refs_merges_loose_and_packed(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    store
        .write_ref("refs/heads/a", &oid(1), true)
        .block_on()
        .unwrap();
    let packed_text = format!(
        "# pack-refs with: peeled fully-peeled sorted \n{} refs/heads/a\n{} refs/heads/b\n",
        oid(3).hex(),
        oid(4).hex()
    );
    store.write_packed_refs(&packed_text).block_on().unwrap();
    assert_eq!(
        store.list_refs("refs/heads").block_on().unwrap(),
        vec!["refs/heads/a", "refs/heads/b"]
    );
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_invalid_oid_for_family(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    let wide = Oid::new(vec![5; 32]);
    let err = store
        .write_ref("refs/heads/bad", &wide, true)
        .block_on()
        .unwrap_err();
    assert_matches!(err.source, StoreError::InvalidOid { .. });
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_full_oid_resolves_to_itself(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    let id = oid(7);
    assert_eq!(
        store.read_ref(&id.hex(), 5).block_on().unwrap(),
        Some(id.hex())
    );
}
