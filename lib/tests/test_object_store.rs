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
use gitstore::object_codec::ObjectType;
use gitstore::object_id::HashFamily;
use gitstore::object_id::Oid;
use gitstore::odb::ObjectForm;
use pollster::FutureExt as _;
use test_case::test_case;
use testutils::TestBackendKind;
use testutils::TestStore;

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_content_roundtrip(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    let body = b"test content\n";
    let oid = store
        .write_object(ObjectType::Blob, body, ObjectForm::Content, false)
        .block_on()
        .unwrap();
    assert_eq!(oid.hex(), "d670460b4b4aece5915caf5c68d12f560a9fe3e4");
    let raw = store
        .read_object(&oid, ObjectForm::Content)
        .block_on()
        .unwrap();
    assert_eq!(raw.otype, ObjectType::Blob);
    assert_eq!(raw.bytes, body);
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_forms(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    let body = b"form checks";
    let oid = store
        .write_object(ObjectType::Blob, body, ObjectForm::Content, false)
        .block_on()
        .unwrap();

    let wrapped = store
        .read_object(&oid, ObjectForm::Wrapped)
        .block_on()
        .unwrap();
    assert!(wrapped.bytes.starts_with(b"blob 11\0"));

    let deflated = store
        .read_object(&oid, ObjectForm::Deflated)
        .block_on()
        .unwrap();
    assert_eq!(deflated.otype, ObjectType::Blob);
    assert_ne!(deflated.bytes, wrapped.bytes);

    // Writing back the deflated form yields the same id.
    let again = store
        .write_object(ObjectType::Blob, &deflated.bytes, ObjectForm::Deflated, false)
        .block_on()
        .unwrap();
    assert_eq!(again, oid);
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_write_twice_is_idempotent(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    let body = b"idempotent";
    let first = store
        .write_object(ObjectType::Blob, body, ObjectForm::Content, false)
        .block_on()
        .unwrap();
    let count = store.list_loose().block_on().unwrap().len();
    let second = store
        .write_object(ObjectType::Blob, body, ObjectForm::Content, false)
        .block_on()
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(store.list_loose().block_on().unwrap().len(), count);
}

#[test]
fn test_write_once_preserves_mtime_on_disk() {
    let test_store = TestStore::init(TestBackendKind::Fs);
    let store = &test_store.store;
    let oid = store
        .write_object(ObjectType::Blob, b"stable", ObjectForm::Content, false)
        .block_on()
        .unwrap();
    let hex = oid.hex();
    let path = test_store
        .gitdir()
        .join("objects")
        .join(&hex[..2])
        .join(&hex[2..]);
    let bytes_before = std::fs::read(&path).unwrap();
    let mtime_before = std::fs::metadata(&path).unwrap().modified().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));
    store
        .write_object(ObjectType::Blob, b"stable", ObjectForm::Content, false)
        .block_on()
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), bytes_before);
    assert_eq!(
        std::fs::metadata(&path).unwrap().modified().unwrap(),
        mtime_before
    );
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_dry_run_writes_nothing(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    let oid = store
        .write_object(ObjectType::Blob, b"phantom", ObjectForm::Content, true)
        .block_on()
        .unwrap();
    let err = store
        .read_object(&oid, ObjectForm::Content)
        .block_on()
        .unwrap_err();
    assert_matches!(err.source, StoreError::NotFound { .. });
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_family_boundary_rejected(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    // A sha256-length id against a sha1 repository.
    let foreign = Oid::new(vec![0xaa; 32]);
    let err = store
        .read_object(&foreign, ObjectForm::Content)
        .block_on()
        .unwrap_err();
    assert_matches!(err.source, StoreError::InvalidOid { .. });
    assert_eq!(err.caller, "git.read_object");
}

#[test]
fn test_sha256_repository() {
    let test_store = TestStore::init_with_options(
        TestBackendKind::Memory,
        &gitstore::backend::InitOptions {
            default_branch: "main".to_string(),
            object_format: HashFamily::Sha256,
        },
        None,
    );
    let store = &test_store.store;
    let oid = store
        .write_object(ObjectType::Blob, b"wide", ObjectForm::Content, false)
        .block_on()
        .unwrap();
    assert_eq!(oid.hex().len(), 64);
    // sha1-length ids are now the foreign ones.
    let foreign = Oid::new(vec![0xaa; 20]);
    let err = store
        .read_object(&foreign, ObjectForm::Content)
        .block_on()
        .unwrap_err();
    assert_matches!(err.source, StoreError::InvalidOid { .. });
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_list_loose(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    assert!(store.list_loose().block_on().unwrap().is_empty());
    let a = store
        .write_object(ObjectType::Blob, b"a", ObjectForm::Content, false)
        .block_on()
        .unwrap();
    let b = store
        .write_object(ObjectType::Blob, b"b", ObjectForm::Content, false)
        .block_on()
        .unwrap();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(store.list_loose().block_on().unwrap(), expected);
}
