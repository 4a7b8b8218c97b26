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

use gitstore::Store;
use gitstore::fs_backend::FsBackend;
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
fn test_add_list_remove(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    assert!(store.list_worktrees().block_on().unwrap().is_empty());
    store
        .add_worktree("wt1", "/work/wt1")
        .block_on()
        .unwrap();
    store
        .add_worktree("wt2", "/work/wt2")
        .block_on()
        .unwrap();
    assert_eq!(
        store.list_worktrees().block_on().unwrap(),
        vec!["wt1", "wt2"]
    );
    store.remove_worktree("wt1").block_on().unwrap();
    assert_eq!(store.list_worktrees().block_on().unwrap(), vec!["wt2"]);
}

#[test]
fn test_linked_gitdir_layout() {
    let test_store = TestStore::init(TestBackendKind::Fs);
    let store = &test_store.store;
    store
        .add_worktree("wt1", "/work/wt1")
        .block_on()
        .unwrap();
    let gitdir = test_store.gitdir();
    assert_eq!(
        std::fs::read_to_string(gitdir.join("worktrees/wt1/gitdir")).unwrap(),
        "/work/wt1\n"
    );
    assert_eq!(
        std::fs::read_to_string(gitdir.join("worktrees/wt1/commondir")).unwrap(),
        "../..\n"
    );
    assert!(gitdir.join("worktrees/wt1/HEAD").is_file());
}

#[test]
fn test_worktree_specific_ref_routing() {
    let test_store = TestStore::init(TestBackendKind::Fs);
    let main_store = &test_store.store;
    main_store
        .add_worktree("wt1", "/work/wt1")
        .block_on()
        .unwrap();
    let main_gitdir = test_store.gitdir();

    // A store opened on the linked gitdir routes worktree-specific refs
    // there and everything else to the main gitdir.
    let linked = Store::new(Box::new(FsBackend::load(
        main_gitdir.join("worktrees/wt1"),
    )));
    linked.write_head(&oid(1).hex()).block_on().unwrap();
    assert_eq!(
        std::fs::read_to_string(main_gitdir.join("worktrees/wt1/HEAD")).unwrap(),
        format!("{}\n", oid(1).hex())
    );

    linked
        .write_ref("refs/heads/x", &oid(2), true)
        .block_on()
        .unwrap();
    assert!(main_gitdir.join("refs/heads/x").is_file());
    assert!(!main_gitdir.join("worktrees/wt1/refs").exists());

    // Both stores see the shared ref; HEAD stays per-worktree.
    assert_eq!(
        main_store.resolve_ref("refs/heads/x").block_on().unwrap(),
        oid(2)
    );
    assert_eq!(
        main_store.read_head().block_on().unwrap().as_deref(),
        Some("ref: refs/heads/main")
    );

    // Worktree-specific state routes the same way as refs.
    linked
        .write_state("MERGE_HEAD", format!("{}\n", oid(3).hex()).as_bytes())
        .block_on()
        .unwrap();
    assert!(main_gitdir.join("worktrees/wt1/MERGE_HEAD").is_file());
    assert!(!main_gitdir.join("MERGE_HEAD").exists());
}

#[test]
fn test_per_worktree_index() {
    let test_store = TestStore::init(TestBackendKind::Fs);
    test_store
        .store
        .add_worktree("wt1", "/work/wt1")
        .block_on()
        .unwrap();
    let main_gitdir = test_store.gitdir();
    let linked = Store::new(Box::new(FsBackend::load(
        main_gitdir.join("worktrees/wt1"),
    )));

    let mut index = gitstore::index::Index::new();
    index.insert(gitstore::index::IndexEntry::new(
        "only-in-worktree",
        oid(4),
        0o100644,
        0,
    ));
    linked.write_index(&index).block_on().unwrap();
    assert!(main_gitdir.join("worktrees/wt1/index").is_file());
    assert!(!main_gitdir.join("index").exists());
    // The main store's index is still empty.
    assert!(test_store.store.read_index().block_on().unwrap().is_empty());
}
