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

use std::io::Write as _;

use mover_cli::cli_util::WcSession;
use mover_cli::command_error::CommandResult;
use mover_cli::commands::run_words;
use mover_cli::ui::SharedBuf;
use mover_cli::ui::Ui;
use mover_lib::branch::BranchId;
use mover_lib::remote::MemoryRemote;
use mover_lib::repos::Revision;
use mover_lib::working_copy::WorkingCopy;
use testutils::b0;

fn new_session() -> WcSession {
    let remote = MemoryRemote::open("mem://test");
    WcSession::new(WorkingCopy::open(remote, None, None).unwrap())
}

fn run(session: &mut WcSession, ui: &mut Ui, line: &str) -> CommandResult<()> {
    let words: Vec<String> = line.split_whitespace().map(str::to_owned).collect();
    run_words(session, ui, &words)
}

fn run_ok(session: &mut WcSession, ui: &mut Ui, line: &str) {
    run(session, ui, line).unwrap_or_else(|err| panic!("action {line:?} failed: {err}"));
}

fn captured() -> (Ui, SharedBuf) {
    Ui::captured(&[])
}

#[test]
fn mkdir_and_commit_lists_both_dirs() {
    let (mut ui, out) = captured();
    let mut session = new_session();

    run_ok(&mut session, &mut ui, "mkdir A mkdir A/B commit");
    assert!(out.contents().contains("Committed r1."));
    assert_eq!(session.wc.head(), Revision::new(1));

    run_ok(&mut session, &mut ui, "ls .");
    let listing = out.contents();
    assert!(listing.contains("A dir"));
    assert!(listing.contains("A/B dir"));

    // Two distinct fresh non-negative eids.
    let tree = session.wc.working_branch().unwrap().tree();
    let a = tree.eid_at_path("A").unwrap();
    let b = tree.eid_at_path("A/B").unwrap();
    assert_ne!(a, b);
    assert!(a.is_persistent() && b.is_persistent());
}

#[test]
fn mv_reports_one_renamed_line_with_origin() {
    let (mut ui, out) = captured();
    let mut session = new_session();

    run_ok(&mut session, &mut ui, "mkdir A commit");
    let before = session.wc.working_branch().unwrap().tree().eid_at_path("A");
    run_ok(&mut session, &mut ui, "mv A X commit");
    let after = session.wc.working_branch().unwrap().tree().eid_at_path("X");
    assert_eq!(before, after);

    run_ok(&mut session, &mut ui, "diff .@1 .@2");
    let contents = out.contents();
    let diff_lines: Vec<&str> = contents
        .lines()
        .filter(|line| line.starts_with("Vr"))
        .collect();
    assert_eq!(diff_lines, ["Vr X (from A)"]);
}

#[test]
fn mkbranch_and_tbranch_list_both_branches() {
    let (mut ui, out) = captured();
    let mut session = new_session();

    run_ok(&mut session, &mut ui, "mkbranch P");
    let host = session
        .wc
        .working_branch()
        .unwrap()
        .eid_at_path("P")
        .unwrap();
    let inner_root = session
        .wc
        .edit_txn()
        .subbranch_at(&b0(), host)
        .unwrap()
        .root_eid();

    run_ok(&mut session, &mut ui, "tbranch ^B0/P");
    // The new top-level branch's root is the inner element of P.
    let b1 = BranchId::top(1);
    assert_eq!(session.wc.working_bid(), &b1);
    assert_eq!(
        session.wc.edit_txn().branch(&b1).unwrap().root_eid(),
        inner_root
    );

    run_ok(&mut session, &mut ui, "branches .");
    let listing = out.contents();
    assert!(listing.contains("B0 (root"));
    assert!(listing.contains("B1 (root"));
}

#[test]
fn copy_from_history_preserves_eids() {
    let (mut ui, _out) = captured();
    let mut session = new_session();

    run_ok(&mut session, &mut ui, "mkdir A commit");
    let a = session
        .wc
        .working_branch()
        .unwrap()
        .eid_at_path("A")
        .unwrap();
    // The element is renamed away; restoring it from r1 brings the same
    // eid back at the new path.
    run_ok(&mut session, &mut ui, "mv A B commit");
    run_ok(&mut session, &mut ui, "cp 1 A C");
    let tree = session.wc.working_branch().unwrap().tree();
    assert_eq!(tree.eid_at_path("C"), Some(a));
    assert_eq!(tree.eid_at_path("B"), None);
}

#[test]
fn put_and_cat_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("content.txt");
    let mut file = std::fs::File::create(&local).unwrap();
    writeln!(file, "hello element").unwrap();
    drop(file);

    let (mut ui, out) = captured();
    let mut session = new_session();
    run_ok(
        &mut session,
        &mut ui,
        &format!("mkdir docs put {} docs/readme", local.display()),
    );
    run_ok(&mut session, &mut ui, "cat docs/readme");
    assert!(out.contents().contains("hello element"));
}

#[test]
fn cross_branch_mv_is_refused_in_batch_mode() {
    let (mut ui, _out) = captured();
    let mut session = new_session();
    run_ok(&mut session, &mut ui, "mkdir A mkdir A/X commit");
    run_ok(&mut session, &mut ui, "tbranch . commit");

    let err = run(&mut session, &mut ui, "mv ^B0/A/X ^B1/moved").unwrap_err();
    assert_eq!(err.taxonomy(), "BRANCHING");
    assert!(err.to_string().contains("copy-and-delete"));
}

#[test]
fn cross_branch_mv_prompts_and_keeps_the_eid() {
    let (mut ui, _out) = Ui::captured(&["c"]);
    let mut session = new_session();
    run_ok(&mut session, &mut ui, "mkdir A mkdir A/X commit");
    let x = session
        .wc
        .working_branch()
        .unwrap()
        .eid_at_path("A/X")
        .unwrap();
    run_ok(&mut session, &mut ui, "tbranch . commit");

    run_ok(&mut session, &mut ui, "mv ^B0/A/X ^B1/moved");
    let b1_tree = session
        .wc
        .edit_txn()
        .branch(&BranchId::top(1))
        .unwrap()
        .tree();
    assert_eq!(b1_tree.eid_at_path("moved"), Some(x));
    let b0_tree = session.wc.edit_txn().branch(&b0()).unwrap().tree();
    assert_eq!(b0_tree.eid_at_path("A/X"), None);
}

#[test]
fn log_follows_predecessors_across_branch_creation() {
    let (mut ui, out) = captured();
    let mut session = new_session();
    run_ok(&mut session, &mut ui, "mkdir P commit");
    run_ok(&mut session, &mut ui, "mkdir P/inner commit");
    // r3 creates ^B1 from P with predecessor (r2, B0); r4 commits on B1.
    run_ok(&mut session, &mut ui, "tbranch ^B0/P commit");
    run_ok(&mut session, &mut ui, "mkdir extra commit");

    run_ok(&mut session, &mut ui, "log .@1 ^B1@4");
    let contents = out.contents();
    let headers: Vec<&str> = contents
        .lines()
        .filter(|line| line.starts_with("---- "))
        .collect();
    // B1's own history first, then across the creation point into B0.
    assert_eq!(
        headers,
        [
            "---- r4 B1 ----",
            "---- r3 B1 ----",
            "---- r2 B0 ----",
            "---- r1 B0 ----",
        ]
    );
}

#[test]
fn trivial_merge_succeeds() {
    let (mut ui, out) = captured();
    let mut session = new_session();
    run_ok(&mut session, &mut ui, "mkdir A commit");
    run_ok(&mut session, &mut ui, "merge .@1 . .@1");
    assert!(out.contents().contains("Merged"));
}

#[test]
fn unknown_actions_and_selectors_are_parse_errors() {
    let (mut ui, _out) = captured();
    let mut session = new_session();
    let err = run(&mut session, &mut ui, "frobnicate X").unwrap_err();
    assert_eq!(err.taxonomy(), "CL_ARG_PARSING_ERROR");
    let err = run(&mut session, &mut ui, "ls .@SOMETIME").unwrap_err();
    assert_eq!(err.taxonomy(), "CL_ARG_PARSING_ERROR");
}

#[test]
fn status_shows_pending_changes() {
    let (mut ui, out) = captured();
    let mut session = new_session();
    run_ok(&mut session, &mut ui, "mkdir A status");
    let output = out.contents();
    assert!(output.contains("dirty"));
    assert!(output.contains("A A"));
    run_ok(&mut session, &mut ui, "revert status");
    assert!(out.contents().contains("clean"));
}
