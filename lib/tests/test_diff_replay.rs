// Copyright 2024 The Mover Authors
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

use mover_lib::diff::DiffStatus;
use mover_lib::diff::display_order;
use mover_lib::diff::element_differences;
use mover_lib::element::Payload;
use mover_lib::replay::replay;
use mover_lib::txn::BranchTxn;
use pretty_assertions::assert_eq;
use testutils::add_dir;
use testutils::add_file;
use testutils::b0;
use testutils::write_file;

#[test]
fn diff_classifies_changes_per_attribute() {
    let mut left = BranchTxn::initial();
    let root = left.branch(&b0()).unwrap().root_eid();
    let dir = add_dir(&mut left, &b0(), "D");
    let renamed = add_file(&mut left, &b0(), "old-name", "same\n");
    let moved = add_file(&mut left, &b0(), "movee", "same\n");
    let edited = add_file(&mut left, &b0(), "edited", "one\n");

    let mut right = left.clone();
    {
        let branch = right.branch_mut(&b0()).unwrap();
        branch
            .alter(renamed, Some(root), "new-name", Payload::file("same\n"))
            .unwrap();
        branch
            .alter(moved, Some(dir), "movee", Payload::file("same\n"))
            .unwrap();
    }
    write_file(&mut right, &b0(), "edited", "two\n");
    let added = add_file(&mut right, &b0(), "added", "fresh\n");

    let diffs = element_differences(
        Some(left.branch(&b0()).unwrap().tree()),
        Some(right.branch(&b0()).unwrap().tree()),
    );
    assert_eq!(diffs.len(), 4);

    let renamed_diff = &diffs[&renamed];
    assert!(renamed_diff.renamed() && !renamed_diff.reparented() && !renamed_diff.modified());
    assert_eq!(renamed_diff.status(), DiffStatus::Moved);

    let moved_diff = &diffs[&moved];
    assert!(moved_diff.reparented() && !moved_diff.renamed());
    assert_eq!(moved_diff.status(), DiffStatus::Moved);

    let edited_diff = &diffs[&edited];
    assert!(edited_diff.modified() && !edited_diff.renamed() && !edited_diff.reparented());
    assert_eq!(edited_diff.status(), DiffStatus::Modified);

    assert!(diffs[&added].is_add());
    assert_eq!(diffs[&added].status(), DiffStatus::Added);
}

#[test]
fn diff_is_deterministic() {
    let mut left = BranchTxn::initial();
    add_file(&mut left, &b0(), "f", "a\n");
    let mut right = left.clone();
    write_file(&mut right, &b0(), "f", "b\n");

    let once = element_differences(
        Some(left.branch(&b0()).unwrap().tree()),
        Some(right.branch(&b0()).unwrap().tree()),
    );
    let twice = element_differences(
        Some(left.branch(&b0()).unwrap().tree()),
        Some(right.branch(&b0()).unwrap().tree()),
    );
    assert_eq!(once, twice);
}

#[test]
fn display_order_groups_deletions_first() {
    let mut left = BranchTxn::initial();
    let dir = add_dir(&mut left, &b0(), "gone");
    let child = add_file(&mut left, &b0(), "gone/file", "x\n");
    let renamed = add_file(&mut left, &b0(), "a-name", "x\n");
    let root = left.branch(&b0()).unwrap().root_eid();

    let mut right = left.clone();
    {
        let branch = right.branch_mut(&b0()).unwrap();
        branch.delete(child).unwrap();
        branch.delete(dir).unwrap();
        branch
            .alter(renamed, Some(root), "z-name", Payload::file("x\n"))
            .unwrap();
    }
    add_file(&mut right, &b0(), "b-added", "y\n");

    let left_tree = left.branch(&b0()).unwrap().tree();
    let right_tree = right.branch(&b0()).unwrap().tree();
    let diffs = element_differences(Some(left_tree), Some(right_tree));
    let items = display_order(&diffs, Some(left_tree), Some(right_tree));

    let paths: Vec<&str> = items.iter().map(|item| item.major_path.as_str()).collect();
    assert_eq!(paths, ["gone", "gone/file", "b-added", "z-name"]);

    // The child's deletion is subsumed by its parent's.
    assert!(!items[0].subsumed);
    assert!(items[1].subsumed);
    // The rename carries its origin path.
    assert_eq!(items[3].from_path.as_deref(), Some("a-name"));
    assert_eq!(items[2].from_path, None);
}

/// Builds a txn with a nested branch, plus an edited variant of it.
fn replay_fixture() -> (BranchTxn, BranchTxn, mover_lib::branch::BranchId) {
    let mut left = BranchTxn::initial();
    let root = left.branch(&b0()).unwrap().root_eid();
    let host = left.new_eid();
    left.branch_mut(&b0())
        .unwrap()
        .alter(host, Some(root), "P", Payload::SubbranchRoot)
        .unwrap();
    let inner_root = left.new_eid();
    let sub_bid = b0().nested(host, 0);
    left.open_branch(None, sub_bid.clone(), inner_root);
    add_file(&mut left, &sub_bid, "inner", "1\n");
    add_file(&mut left, &b0(), "outer", "keep\n");

    let mut right = left.clone();
    write_file(&mut right, &sub_bid, "inner", "2\n");
    add_dir(&mut right, &b0(), "added-dir");
    (left, right, sub_bid)
}

#[test]
fn replay_reaches_the_right_side_and_inverts() {
    let (left, right, sub_bid) = replay_fixture();

    let mut dst = left.clone();
    replay(&mut dst, &b0(), Some((&left, &b0())), Some((&right, &b0()))).unwrap();
    assert_eq!(
        dst.branch(&b0()).unwrap().tree(),
        right.branch(&b0()).unwrap().tree()
    );
    assert_eq!(
        dst.branch(&sub_bid).unwrap().tree(),
        right.branch(&sub_bid).unwrap().tree()
    );

    // Replaying the same delta again changes nothing.
    let settled = dst.clone();
    replay(&mut dst, &b0(), Some((&left, &b0())), Some((&right, &b0()))).unwrap();
    assert_eq!(dst, settled);

    // The inverse delta restores the original txn exactly.
    replay(&mut dst, &b0(), Some((&right, &b0())), Some((&left, &b0()))).unwrap();
    assert_eq!(dst, left);
}

#[test]
fn replay_drops_subbranches_deleted_on_the_left() {
    let (left, _, sub_bid) = replay_fixture();

    // The right side removes the hosting element and its branch.
    let mut right = left.clone();
    let (_, host) = sub_bid.outer().unwrap();
    right.branch_mut(&b0()).unwrap().delete(host).unwrap();
    right.remove_branch_recursive(&sub_bid);

    let mut dst = left.clone();
    replay(&mut dst, &b0(), Some((&left, &b0())), Some((&right, &b0()))).unwrap();
    assert!(!dst.has_branch(&sub_bid));
    assert!(!dst.branch(&b0()).unwrap().tree().contains(host));
}

#[test]
fn replay_against_an_absent_left_instantiates_everything() {
    let (left, _, _) = replay_fixture();

    let mut dst = BranchTxn::new(None, left.eids().clone());
    let root = left.branch(&b0()).unwrap().root_eid();
    dst.open_branch(None, b0(), root);
    replay(&mut dst, &b0(), None, Some((&left, &b0()))).unwrap();

    assert_eq!(
        dst.branch(&b0()).unwrap().tree(),
        left.branch(&b0()).unwrap().tree()
    );
    assert_eq!(dst.subbranches(&b0()).len(), 1);
}
