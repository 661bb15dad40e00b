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

use assert_matches::assert_matches;
use mover_lib::branch::BranchId;
use mover_lib::diff::element_differences;
use mover_lib::element::Payload;
use mover_lib::error::MoverError;
use mover_lib::remote::MemoryRemote;
use mover_lib::repos::Revision;
use mover_lib::store::RevpropBranchingStore;
use mover_lib::working_copy::WcState;
use mover_lib::working_copy::WorkingCopy;
use testutils::add_dir;
use testutils::add_file;
use testutils::b0;
use testutils::checked_out;
use testutils::commit;
use testutils::empty_remote;
use testutils::log_props;
use testutils::write_file;

#[test]
fn mkdir_commit_produces_fresh_persistent_eids() {
    let mut wc = checked_out(empty_remote());
    let a = add_dir(wc.edit_txn_mut(), &b0(), "A");
    let b = add_dir(wc.edit_txn_mut(), &b0(), "A/B");
    assert_eq!(wc.state(), WcState::Dirty);

    let rev = commit(&mut wc, "mkdir A; mkdir A/B");
    assert_eq!(rev, Revision::new(1));
    assert_eq!(wc.state(), WcState::Clean);

    let tree = wc.working_branch().unwrap().tree().clone();
    assert_eq!(tree.eid_at_path("A"), Some(a));
    assert_eq!(tree.eid_at_path("A/B"), Some(b));
    assert_ne!(a, b);
    assert!(a.is_persistent() && b.is_persistent());
}

#[test]
fn move_keeps_the_eid_and_diffs_as_one_change() {
    let mut wc = checked_out(empty_remote());
    let a = add_dir(wc.edit_txn_mut(), &b0(), "A");
    let r1 = commit(&mut wc, "mkdir A");

    // mv A X
    let root = wc.working_branch().unwrap().root_eid();
    wc.working_branch_mut()
        .unwrap()
        .alter(a, Some(root), "X", Payload::dir())
        .unwrap();
    let r2 = commit(&mut wc, "mv A X");

    let repos = wc.remote().repos();
    let old_tree = repos.get_branch_by_id(r1, &b0()).unwrap().tree();
    let new_tree = repos.get_branch_by_id(r2, &b0()).unwrap().tree();
    let diffs = element_differences(Some(old_tree), Some(new_tree));
    assert_eq!(diffs.len(), 1);
    let diff = &diffs[&a];
    assert!(diff.renamed() && !diff.reparented() && !diff.modified());
    assert_eq!(new_tree.eid_at_path("X"), Some(a));
    assert_eq!(old_tree.eid_at_path("A"), Some(a));
}

#[test]
fn unchanged_commit_is_a_no_op_and_head_stays() {
    let mut wc = checked_out(empty_remote());
    let head_before = wc.head();
    assert_eq!(wc.commit(log_props("nothing")).unwrap(), None);
    assert_eq!(wc.head(), head_before);
    assert_eq!(wc.remote().repos().head(), head_before);

    // An edit that is then reverted also commits as a no-op.
    add_dir(wc.edit_txn_mut(), &b0(), "tmp");
    wc.revert().unwrap();
    assert_eq!(wc.commit(log_props("still nothing")).unwrap(), None);
    assert_eq!(wc.remote().repos().head(), head_before);
}

#[test]
fn revert_leaves_an_empty_diff_against_base() {
    let mut wc = checked_out(empty_remote());
    add_file(wc.edit_txn_mut(), &b0(), "f", "v1\n");
    commit(&mut wc, "put f");

    write_file(wc.edit_txn_mut(), &b0(), "f", "v2\n");
    add_dir(wc.edit_txn_mut(), &b0(), "junk");
    assert_eq!(wc.state(), WcState::Dirty);

    wc.revert().unwrap();
    assert_eq!(wc.state(), WcState::Clean);
    assert!(!wc.txn_is_changed());
}

#[test]
fn new_top_level_branch_is_created_on_commit() {
    let mut wc = checked_out(empty_remote());
    add_dir(wc.edit_txn_mut(), &b0(), "P");
    add_file(wc.edit_txn_mut(), &b0(), "P/f", "payload\n");
    let r1 = commit(&mut wc, "setup");

    // tbranch: a new top-level branch whose root is P's inner element.
    let p = wc.working_branch().unwrap().eid_at_path("P").unwrap();
    let subtree = wc.edit_txn().subtree(&b0(), p).unwrap();
    let new_bid = BranchId::top(wc.edit_txn().next_top_level_index());
    wc.edit_txn_mut()
        .instantiate_branch(new_bid.clone(), &subtree, Some((r1, b0())))
        .unwrap();
    wc.set_working_bid(new_bid.clone()).unwrap();

    let r2 = commit(&mut wc, "tbranch P");
    let repos = wc.remote().repos();
    let branch = repos.get_branch_by_id(r2, &new_bid).unwrap();
    assert_eq!(branch.root_eid(), p);
    assert_eq!(branch.predecessor(), Some(&(r1, b0())));
    // Both branches exist at the new revision.
    assert!(repos.txn(r2).unwrap().has_branch(&b0()));
    assert_eq!(wc.working_bid(), &new_bid);
}

#[test]
fn switch_without_local_changes_is_a_plain_checkout() {
    let mut wc = checked_out(empty_remote());
    add_file(wc.edit_txn_mut(), &b0(), "f", "base\n");
    let r1 = commit(&mut wc, "setup");

    let report = wc.switch(r1, b0()).unwrap();
    assert!(!report.carried_changes);
    assert!(!report.different_root_warning);
    assert_eq!(wc.state(), WcState::Clean);
}

#[test]
fn switch_carries_local_changes_by_merge() {
    let mut wc = checked_out(empty_remote());
    add_file(wc.edit_txn_mut(), &b0(), "f", "base\n");
    add_file(wc.edit_txn_mut(), &b0(), "other", "keep\n");
    let r1 = commit(&mut wc, "setup");

    // A second top-level branch of the same content.
    let root = wc.working_branch().unwrap().root_eid();
    let subtree = wc.edit_txn().subtree(&b0(), root).unwrap();
    let b1 = BranchId::top(1);
    wc.edit_txn_mut()
        .instantiate_branch(b1.clone(), &subtree, Some((r1, b0())))
        .unwrap();
    wc.set_working_bid(b1.clone()).unwrap();
    let r2 = commit(&mut wc, "tbranch .");

    // Local, uncommitted edit on B1, then switch back to B0.
    write_file(wc.edit_txn_mut(), &b1, "f", "local\n");
    let report = wc.switch(r2, b0()).unwrap();
    assert!(report.carried_changes);
    assert_eq!(wc.working_bid(), &b0());
    assert_eq!(wc.state(), WcState::Dirty);
    let f = wc.working_branch().unwrap().eid_at_path("f").unwrap();
    let tree = wc.working_branch().unwrap().tree();
    assert_eq!(tree.get(f).unwrap().payload.text().unwrap(), "local\n");
}

#[test]
fn conflicting_switch_is_terminal() {
    let mut wc = checked_out(empty_remote());
    add_file(wc.edit_txn_mut(), &b0(), "f", "base\n");
    let r1 = commit(&mut wc, "setup");

    let root = wc.working_branch().unwrap().root_eid();
    let subtree = wc.edit_txn().subtree(&b0(), root).unwrap();
    let b1 = BranchId::top(1);
    wc.edit_txn_mut()
        .instantiate_branch(b1.clone(), &subtree, Some((r1, b0())))
        .unwrap();
    wc.set_working_bid(b1.clone()).unwrap();
    commit(&mut wc, "tbranch .");

    // B1 diverges at f, then the working copy also edits f and switches.
    write_file(wc.edit_txn_mut(), &b1, "f", "committed-on-b1\n");
    let r3 = commit(&mut wc, "edit f on B1");
    write_file(wc.edit_txn_mut(), &b1, "f", "local\n");

    // YCA is B1@r3, SRC the local edit, TGT is B0 at "base": the same
    // payload attribute changed on both sides.
    let err = wc.switch(r3, b0()).unwrap_err();
    assert_matches!(err, MoverError::Branching(_));
    assert_eq!(wc.state(), WcState::Conflicted);
    let report = wc.conflicts().unwrap();
    assert_eq!(report.single_element.len(), 1);

    // Conflicted is terminal: committing and reverting are both refused.
    let err = wc.commit(log_props("doomed")).unwrap_err();
    assert_eq!(err.taxonomy(), "BRANCHING");
    let err = wc.revert().unwrap_err();
    assert_eq!(err.taxonomy(), "BRANCHING");
    assert_eq!(wc.state(), WcState::Conflicted);
}

#[test]
fn update_refuses_a_revision_missing_the_branch() {
    let mut wc = checked_out(empty_remote());
    add_file(wc.edit_txn_mut(), &b0(), "f", "x\n");
    let r1 = commit(&mut wc, "setup");

    let root = wc.working_branch().unwrap().root_eid();
    let subtree = wc.edit_txn().subtree(&b0(), root).unwrap();
    let b1 = BranchId::top(1);
    wc.edit_txn_mut()
        .instantiate_branch(b1.clone(), &subtree, Some((r1, b0())))
        .unwrap();
    wc.set_working_bid(b1.clone()).unwrap();
    commit(&mut wc, "tbranch .");

    // B1 does not exist at r1.
    let err = wc.update(r1).unwrap_err();
    assert_eq!(err.taxonomy(), "BRANCHING");
}

#[test]
fn committed_state_survives_a_store_reload() {
    let store = RevpropBranchingStore::new();
    let remote =
        MemoryRemote::with_store("mem://persisted", Box::new(store.handle())).unwrap();
    let mut wc = checked_out(remote);
    let a = add_dir(wc.edit_txn_mut(), &b0(), "A");
    add_file(wc.edit_txn_mut(), &b0(), "A/f", "kept\n");
    let r1 = commit(&mut wc, "setup");

    // A fresh session over the same store sees the committed revision.
    let reloaded =
        MemoryRemote::with_store("mem://persisted", Box::new(store.handle())).unwrap();
    assert_eq!(reloaded.repos().head(), r1);
    let wc2 = WorkingCopy::open(reloaded, None, None).unwrap();
    let tree = wc2.working_branch().unwrap().tree();
    assert_eq!(tree.eid_at_path("A"), Some(a));
    assert_eq!(
        tree.get(tree.eid_at_path("A/f").unwrap())
            .unwrap()
            .payload
            .text()
            .unwrap(),
        "kept\n"
    );
}
