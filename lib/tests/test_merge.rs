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
use gitstore::commit::CommitOptions;
use gitstore::merge::MergeOptions;
use gitstore::merge::merge_base;
use gitstore::object_id::Oid;
use gitstore::staging::AddOptions;
use pollster::FutureExt as _;
use test_case::test_case;
use testutils::TestBackendKind;
use testutils::TestStore;
use testutils::signature;

/// Stages `files` and commits them on `branch`.
fn commit_on(test_store: &TestStore, branch: &str, files: &[(&str, &str)], message: &str) -> Oid {
    for (path, content) in files {
        test_store.write_worktree_file(path, content.as_bytes());
    }
    let paths: Vec<String> = files.iter().map(|(path, _)| (*path).to_string()).collect();
    test_store
        .store
        .add(&test_store.worktree, &paths, &AddOptions::default())
        .block_on()
        .unwrap();
    test_store
        .store
        .commit(
            None,
            CommitOptions {
                message: Some(message.to_string()),
                author: Some(signature("A", "a@x", 1700000000)),
                committer: Some(signature("A", "a@x", 1700000000)),
                target_ref: Some(branch.to_string()),
                ..CommitOptions::default()
            },
            None,
        )
        .block_on()
        .unwrap()
        .oid
}

/// Commits on `branch` with explicit parents, for shaping histories.
fn commit_with_parents(
    test_store: &TestStore,
    branch: &str,
    files: &[(&str, &str)],
    parents: Vec<Oid>,
    message: &str,
) -> Oid {
    for (path, content) in files {
        test_store.write_worktree_file(path, content.as_bytes());
    }
    let paths: Vec<String> = files.iter().map(|(path, _)| (*path).to_string()).collect();
    if !paths.is_empty() {
        test_store
            .store
            .add(&test_store.worktree, &paths, &AddOptions::default())
            .block_on()
            .unwrap();
    }
    test_store
        .store
        .commit(
            None,
            CommitOptions {
                message: Some(message.to_string()),
                author: Some(signature("A", "a@x", 1700000000)),
                committer: Some(signature("A", "a@x", 1700000000)),
                target_ref: Some(branch.to_string()),
                parents: Some(parents),
                allow_empty: true,
                ..CommitOptions::default()
            },
            None,
        )
        .block_on()
        .unwrap()
        .oid
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_fast_forward(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    let base = commit_on(&test_store, "refs/heads/main", &[("f", "a\n")], "base");
    // feat is one commit ahead of main.
    store
        .write_ref("refs/heads/feat", &base, true)
        .block_on()
        .unwrap();
    let feat_tip = commit_on(&test_store, "refs/heads/feat", &[("g", "b\n")], "feature");

    // The base of (main, feat) is main itself.
    assert_eq!(
        merge_base(store.backend(), &base, &feat_tip).block_on().unwrap(),
        vec![base.clone()]
    );

    let outcome = store
        .merge("refs/heads/main", "refs/heads/feat", MergeOptions::default())
        .block_on()
        .unwrap();
    assert!(outcome.fast_forward);
    assert_eq!(outcome.oid, feat_tip);
    assert_eq!(
        store.resolve_ref("refs/heads/main").block_on().unwrap(),
        feat_tip
    );
    let log = store.read_reflog("refs/heads/main").block_on().unwrap();
    assert_eq!(log.last().unwrap().message, "merge feat: Fast-forward");
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Sql ; "sql backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_conflict_stages_and_raises(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    let base = commit_on(&test_store, "refs/heads/main", &[("f", "a\n")], "base");
    store
        .write_ref("refs/heads/feat", &base, true)
        .block_on()
        .unwrap();
    let feat_tip = commit_on(&test_store, "refs/heads/feat", &[("f", "c\n")], "theirs");
    let main_tip = commit_on(&test_store, "refs/heads/main", &[("f", "b\n")], "ours");

    let err = store
        .merge(
            "refs/heads/main",
            "refs/heads/feat",
            MergeOptions {
                abort_on_conflict: false,
                ..MergeOptions::default()
            },
        )
        .block_on()
        .unwrap_err();
    let info = match err.source {
        StoreError::MergeConflict(info) => info,
        other => panic!("expected a merge conflict, got {other:?}"),
    };
    assert_eq!(info.filepaths, vec!["f"]);
    assert_eq!(info.both_modified, vec!["f"]);

    // Stages 1/2/3 landed in the index before the error propagated.
    let index = store.read_index().block_on().unwrap();
    assert_eq!(index.unmerged_paths(), vec!["f"]);
    assert!(index.has("f", Some(1)));
    assert!(index.has("f", Some(2)));
    assert!(index.has("f", Some(3)));

    // MERGE_HEAD names theirs; main did not move.
    let merge_head = store.read_state("MERGE_HEAD").block_on().unwrap().unwrap();
    assert_eq!(
        String::from_utf8(merge_head).unwrap().trim(),
        feat_tip.hex()
    );
    assert_eq!(
        store.resolve_ref("refs/heads/main").block_on().unwrap(),
        main_tip
    );
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_conflict_with_abort_leaves_index_alone(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    let base = commit_on(&test_store, "refs/heads/main", &[("f", "a\n")], "base");
    store
        .write_ref("refs/heads/feat", &base, true)
        .block_on()
        .unwrap();
    commit_on(&test_store, "refs/heads/feat", &[("f", "c\n")], "theirs");
    commit_on(&test_store, "refs/heads/main", &[("f", "b\n")], "ours");

    let err = store
        .merge("refs/heads/main", "refs/heads/feat", MergeOptions::default())
        .block_on()
        .unwrap_err();
    assert_matches!(err.source, StoreError::MergeConflict(_));
    let index = store.read_index().block_on().unwrap();
    assert!(index.unmerged_paths().is_empty());
}

#[test_case(TestBackendKind::Fs ; "filesystem backend")]
#[test_case(TestBackendKind::Memory ; "memory backend")]
fn test_three_way_merge_commit(kind: TestBackendKind) {
    let test_store = TestStore::init(kind);
    let store = &test_store.store;
    let base = commit_on(&test_store, "refs/heads/main", &[("f", "a\n")], "base");
    store
        .write_ref("refs/heads/feat", &base, true)
        .block_on()
        .unwrap();
    let feat_tip = commit_on(&test_store, "refs/heads/feat", &[("g", "c\n")], "theirs");
    let main_tip = commit_on(&test_store, "refs/heads/main", &[("h", "b\n")], "ours");

    let outcome = store
        .merge(
            "refs/heads/main",
            "refs/heads/feat",
            MergeOptions {
                author: Some(signature("A", "a@x", 1700000000)),
                ..MergeOptions::default()
            },
        )
        .block_on()
        .unwrap();
    assert!(!outcome.fast_forward);

    // First parent is ours, second is theirs.
    let raw = store
        .read_object(&outcome.oid, gitstore::odb::ObjectForm::Content)
        .block_on()
        .unwrap();
    let record = gitstore::object::parse_commit(&raw.bytes).unwrap();
    assert_eq!(record.parents, vec![main_tip, feat_tip]);

    // All three files are in the merged tree.
    let files = gitstore::tree_builder::flatten_tree(store.backend(), &outcome.tree, "")
        .block_on()
        .unwrap();
    let names: Vec<&str> = files.iter().map(|(path, _, _)| path.as_str()).collect();
    assert_eq!(names, vec!["f", "g", "h"]);

    // The merge state files were cleaned up.
    assert_eq!(store.read_state("MERGE_HEAD").block_on().unwrap(), None);
    assert_eq!(store.read_state("MERGE_MSG").block_on().unwrap(), None);
}

#[test]
fn test_already_merged() {
    let test_store = TestStore::init(TestBackendKind::Memory);
    let store = &test_store.store;
    let base = commit_on(&test_store, "refs/heads/main", &[("f", "a\n")], "base");
    store
        .write_ref("refs/heads/feat", &base, true)
        .block_on()
        .unwrap();
    let main_tip = commit_on(&test_store, "refs/heads/main", &[("g", "b\n")], "ahead");

    // theirs is an ancestor of ours: nothing to do.
    let outcome = store
        .merge("refs/heads/main", "refs/heads/feat", MergeOptions::default())
        .block_on()
        .unwrap();
    assert!(outcome.already_merged);
    assert_eq!(outcome.oid, main_tip);
    assert_eq!(
        store.resolve_ref("refs/heads/main").block_on().unwrap(),
        main_tip
    );
}

#[test]
fn test_ff_only_refuses_real_merge() {
    let test_store = TestStore::init(TestBackendKind::Memory);
    let store = &test_store.store;
    let base = commit_on(&test_store, "refs/heads/main", &[("f", "a\n")], "base");
    store
        .write_ref("refs/heads/feat", &base, true)
        .block_on()
        .unwrap();
    commit_on(&test_store, "refs/heads/feat", &[("g", "c\n")], "theirs");
    commit_on(&test_store, "refs/heads/main", &[("h", "b\n")], "ours");

    let err = store
        .merge(
            "refs/heads/main",
            "refs/heads/feat",
            MergeOptions {
                ff_only: true,
                ..MergeOptions::default()
            },
        )
        .block_on()
        .unwrap_err();
    assert_matches!(err.source, StoreError::FastForwardError { .. });
}

#[test]
fn test_no_ff_creates_merge_commit() {
    let test_store = TestStore::init(TestBackendKind::Memory);
    let store = &test_store.store;
    let base = commit_on(&test_store, "refs/heads/main", &[("f", "a\n")], "base");
    store
        .write_ref("refs/heads/feat", &base, true)
        .block_on()
        .unwrap();
    let feat_tip = commit_on(&test_store, "refs/heads/feat", &[("g", "c\n")], "theirs");

    let outcome = store
        .merge(
            "refs/heads/main",
            "refs/heads/feat",
            MergeOptions {
                fast_forward: false,
                author: Some(signature("A", "a@x", 1700000000)),
                ..MergeOptions::default()
            },
        )
        .block_on()
        .unwrap();
    assert!(!outcome.fast_forward);
    let raw = store
        .read_object(&outcome.oid, gitstore::odb::ObjectForm::Content)
        .block_on()
        .unwrap();
    let record = gitstore::object::parse_commit(&raw.bytes).unwrap();
    assert_eq!(record.parents, vec![base, feat_tip]);
}

#[test]
fn test_unrelated_histories() {
    let test_store = TestStore::init(TestBackendKind::Memory);
    let store = &test_store.store;
    commit_on(&test_store, "refs/heads/main", &[("f", "a\n")], "root a");
    commit_with_parents(
        &test_store,
        "refs/heads/other",
        &[("g", "b\n")],
        vec![],
        "root b",
    );

    let err = store
        .merge("refs/heads/main", "refs/heads/other", MergeOptions::default())
        .block_on()
        .unwrap_err();
    assert_matches!(err.source, StoreError::MergeNotSupported { .. });

    let outcome = store
        .merge(
            "refs/heads/main",
            "refs/heads/other",
            MergeOptions {
                allow_unrelated_histories: true,
                author: Some(signature("A", "a@x", 1700000000)),
                ..MergeOptions::default()
            },
        )
        .block_on()
        .unwrap();
    let files = gitstore::tree_builder::flatten_tree(store.backend(), &outcome.tree, "")
        .block_on()
        .unwrap();
    assert_eq!(files.len(), 2);
}

#[test]
fn test_criss_cross_refused() {
    let test_store = TestStore::init(TestBackendKind::Memory);
    let store = &test_store.store;
    // Build a criss-cross: two roots-merge commits each reachable from both
    // tips, giving two merge bases.
    let a = commit_on(&test_store, "refs/heads/main", &[("f", "a\n")], "a");
    let b = commit_with_parents(
        &test_store,
        "refs/heads/feat",
        &[("g", "b\n")],
        vec![a.clone()],
        "b",
    );
    let x = commit_with_parents(
        &test_store,
        "refs/heads/main",
        &[],
        vec![a.clone(), b.clone()],
        "x",
    );
    let y = commit_with_parents(
        &test_store,
        "refs/heads/feat",
        &[],
        vec![b.clone(), a.clone()],
        "y",
    );
    let tip_main =
        commit_with_parents(&test_store, "refs/heads/main", &[], vec![x.clone()], "tip main");
    let tip_feat =
        commit_with_parents(&test_store, "refs/heads/feat", &[], vec![y.clone()], "tip feat");

    let bases = merge_base(store.backend(), &tip_main, &tip_feat)
        .block_on()
        .unwrap();
    assert_eq!(bases.len(), 2);

    let err = store
        .merge("refs/heads/main", "refs/heads/feat", MergeOptions::default())
        .block_on()
        .unwrap_err();
    assert_matches!(err.source, StoreError::MergeNotSupported { .. });
}

#[test]
fn test_dry_run_mutates_nothing() {
    let test_store = TestStore::init(TestBackendKind::Memory);
    let store = &test_store.store;
    let base = commit_on(&test_store, "refs/heads/main", &[("f", "a\n")], "base");
    store
        .write_ref("refs/heads/feat", &base, true)
        .block_on()
        .unwrap();
    commit_on(&test_store, "refs/heads/feat", &[("g", "c\n")], "theirs");
    let main_tip = commit_on(&test_store, "refs/heads/main", &[("h", "b\n")], "ours");

    let outcome = store
        .merge(
            "refs/heads/main",
            "refs/heads/feat",
            MergeOptions {
                dry_run: true,
                ..MergeOptions::default()
            },
        )
        .block_on()
        .unwrap();
    assert_eq!(outcome.oid, main_tip);
    assert_eq!(
        store.resolve_ref("refs/heads/main").block_on().unwrap(),
        main_tip
    );
    assert_eq!(store.read_state("MERGE_HEAD").block_on().unwrap(), None);
}
