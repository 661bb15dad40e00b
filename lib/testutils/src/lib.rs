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

//! Fixtures shared by the mover-lib and mover-cli test suites.

use bstr::BString;
use mover_lib::branch::BranchId;
use mover_lib::element::Eid;
use mover_lib::element::Payload;
use mover_lib::remote::MemoryRemote;
use mover_lib::repos::RevProps;
use mover_lib::repos::Revision;
use mover_lib::txn::BranchTxn;
use mover_lib::working_copy::WorkingCopy;

pub fn b0() -> BranchId {
    BranchId::top(0)
}

/// An ephemeral in-process repository containing only revision 0.
pub fn empty_remote() -> MemoryRemote {
    MemoryRemote::open("mem://test")
}

/// A working copy checked out at the head of `remote`, on `B0`.
pub fn checked_out(remote: MemoryRemote) -> WorkingCopy<MemoryRemote> {
    WorkingCopy::open(remote, None, None).unwrap()
}

fn split_parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}

/// Adds a directory element at `path`, returning its fresh eid.
pub fn add_dir(txn: &mut BranchTxn, bid: &BranchId, path: &str) -> Eid {
    let (parent_path, name) = split_parent(path);
    let parent = txn.branch(bid).unwrap().eid_at_path(parent_path).unwrap();
    let eid = txn.new_eid();
    txn.branch_mut(bid)
        .unwrap()
        .alter(eid, Some(parent), name, Payload::dir())
        .unwrap();
    eid
}

/// Adds a file element at `path`, returning its fresh eid.
pub fn add_file(txn: &mut BranchTxn, bid: &BranchId, path: &str, text: impl Into<BString>) -> Eid {
    let (parent_path, name) = split_parent(path);
    let parent = txn.branch(bid).unwrap().eid_at_path(parent_path).unwrap();
    let eid = txn.new_eid();
    txn.branch_mut(bid)
        .unwrap()
        .alter(eid, Some(parent), name, Payload::file(text))
        .unwrap();
    eid
}

/// Replaces the text of the existing file element at `path`.
pub fn write_file(txn: &mut BranchTxn, bid: &BranchId, path: &str, text: impl Into<BString>) {
    let branch = txn.branch_mut(bid).unwrap();
    let eid = branch.eid_at_path(path).unwrap();
    let content = branch.tree().get(eid).unwrap().clone();
    branch
        .alter(
            eid,
            content.parent,
            &content.name,
            Payload::file(text),
        )
        .unwrap();
}

pub fn log_props(message: &str) -> RevProps {
    let mut props = RevProps::new();
    props.insert("log".to_owned(), message.to_owned());
    props
}

/// Commits with a log message, asserting a revision was produced.
pub fn commit(wc: &mut WorkingCopy<MemoryRemote>, message: &str) -> Revision {
    wc.commit(log_props(message)).unwrap().expect("commit produced no revision")
}
