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

//! Read-only actions: listings, diffs, history, file contents.

use itertools::Itertools as _;
use mover_lib::diff::DiffDisplayItem;
use mover_lib::diff::DiffStatus;
use mover_lib::diff::display_order;
use mover_lib::diff::element_differences;
use mover_lib::element::ElementTree;
use mover_lib::remote::RemoteAccess as _;
use mover_lib::working_copy::WcState;

use crate::cli_util::WcSession;
use crate::cli_util::parse_target;
use crate::command_error::CommandResult;
use crate::command_error::arg_error;
use crate::ui::Ui;

fn state_name(state: WcState) -> &'static str {
    match state {
        WcState::Clean => "clean",
        WcState::Dirty => "dirty",
        WcState::Committing => "committing",
        WcState::Conflicted => "conflicted",
    }
}

/// Renders one diff line: status letter, `v`/`r` move flags, major path,
/// and the origin of a move. Subsumed deletions are indented.
pub(crate) fn diff_line(item: &DiffDisplayItem) -> String {
    let status = match item.diff.status() {
        DiffStatus::Added => "A",
        DiffStatus::Deleted => "D",
        DiffStatus::Moved => "V",
        DiffStatus::Modified => "M",
    };
    let mut flags = String::new();
    if item.diff.reparented() {
        flags.push('v');
    }
    if item.diff.renamed() {
        flags.push('r');
    }
    let indent = if item.subsumed { "  " } else { "" };
    let from = item
        .from_path
        .as_deref()
        .map(|path| format!(" (from {path})"))
        .unwrap_or_default();
    format!("{status}{flags} {indent}{}{from}", item.major_path)
}

fn print_tree_diff(
    ui: &mut Ui,
    left: Option<&ElementTree>,
    right: Option<&ElementTree>,
    scope: &str,
) {
    let diffs = element_differences(left, right);
    let items = display_order(&diffs, left, right);
    for item in items {
        let in_scope = scope.is_empty()
            || item.major_path == scope
            || item.major_path.starts_with(&format!("{scope}/"));
        if in_scope {
            ui.out_line(diff_line(&item));
        }
    }
}

pub(crate) fn cmd_info_wc(session: &mut WcSession, ui: &mut Ui) -> CommandResult<()> {
    let wc = &session.wc;
    let (base_rev, base_bid) = wc.base();
    ui.out_line(format!("Repository Root: {}", wc.remote().repos_root()));
    ui.out_line(format!("Head Revision: {}", wc.head()));
    ui.out_line(format!("Base: {base_rev} {base_bid}"));
    ui.out_line(format!("Working Branch: {}", wc.working_bid()));
    ui.out_line(format!("State: {}", state_name(wc.state())));
    Ok(())
}

pub(crate) fn cmd_ls(session: &mut WcSession, ui: &mut Ui, target: &str) -> CommandResult<()> {
    let resolved = session.parse_and_resolve(target)?;
    let eid = resolved.eid()?;
    let tree = resolved.txn.branch(&resolved.bid)?.tree();
    let listed = tree
        .closed_subtree(eid)
        .expect("eid was just resolved")
        .into_keys()
        .filter(|&listed| listed != eid)
        .filter_map(|listed| {
            let path = tree.path_of_eid(listed)?;
            let content = tree.get(listed)?;
            Some((path, content.payload.kind_name(), listed))
        })
        .sorted();
    for (path, kind, listed) in listed {
        ui.out_line(format!("{path} {kind} {listed}"));
    }
    Ok(())
}

pub(crate) fn cmd_branches(session: &mut WcSession, ui: &mut Ui, target: &str) -> CommandResult<()> {
    let resolved = session.parse_and_resolve(target)?;
    for branch in resolved.txn.branches() {
        let marker = if resolved.rev.is_none() && branch.bid() == session.wc.working_bid() {
            "* "
        } else {
            "  "
        };
        ui.out_line(format!(
            "{marker}{} (root {})",
            branch.bid(),
            branch.root_eid()
        ));
    }
    Ok(())
}

pub(crate) fn cmd_ls_br_r(session: &mut WcSession, ui: &mut Ui) -> CommandResult<()> {
    for branch in session.wc.edit_txn().branches() {
        let indent = "  ".repeat(branch.bid().nesting_level());
        let predecessor = branch
            .predecessor()
            .map(|(rev, bid)| format!(" (from {bid}@{rev})"))
            .unwrap_or_default();
        ui.out_line(format!(
            "{indent}{} root {}{predecessor}",
            branch.bid(),
            branch.root_eid()
        ));
    }
    Ok(())
}

pub(crate) fn cmd_log(
    session: &mut WcSession,
    ui: &mut Ui,
    from: &str,
    to: &str,
) -> CommandResult<()> {
    let from_target = parse_target(from)?;
    let to_target = parse_target(to)?;
    let (Some(from_spec), Some(to_spec)) = (from_target.rev, to_target.rev) else {
        return Err(arg_error("log needs explicit revisions on both ends"));
    };
    let from_rev = session.resolve_rev(from_spec);
    let to_rev = session.resolve_rev(to_spec);
    if from_rev > to_rev {
        return Err(arg_error(format!("log range {from_rev}:{to_rev} is reversed")));
    }
    let bid = to_target
        .bid
        .unwrap_or_else(|| session.wc.base().1.clone());

    // Predecessor pointers hop along the revisions that changed the branch
    // and cross into the branch it was created from, so history traversal
    // survives whole-branch renames and `tbranch`/`branch` creation.
    let mut cursor = Some((to_rev, bid));
    while let Some((rev, bid)) = cursor {
        if rev < from_rev {
            break;
        }
        let txn = session.wc.remote().load_txn(rev)?;
        let Ok(branch) = txn.branch(&bid) else {
            break;
        };
        let props = session.wc.remote().revprops(rev)?;
        let message = props.get("log").map(String::as_str).unwrap_or("");
        ui.out_line(format!("---- {rev} {bid} ----"));
        ui.out_line(message);

        let predecessor = branch.predecessor().cloned();
        let pred_txn = predecessor
            .as_ref()
            .map(|(pred_rev, _)| session.wc.remote().load_txn(*pred_rev))
            .transpose()?;
        let left = match (&predecessor, &pred_txn) {
            (Some((_, pred_bid)), Some(pred_txn)) => {
                pred_txn.branch(pred_bid).ok().map(|pred| pred.tree())
            }
            _ => None,
        };
        print_tree_diff(ui, left, Some(branch.tree()), "");

        // A predecessor is always strictly older; stop on anything else.
        cursor = match predecessor {
            Some((pred_rev, pred_bid)) if pred_rev < rev => Some((pred_rev, pred_bid)),
            _ => None,
        };
    }
    Ok(())
}

pub(crate) fn cmd_diff(
    session: &mut WcSession,
    ui: &mut Ui,
    left: &str,
    right: &str,
) -> CommandResult<()> {
    let left_resolved = session.parse_and_resolve(left)?;
    let right_resolved = session.parse_and_resolve(right)?;
    let left_tree = left_resolved.txn.branch(&left_resolved.bid)?.tree();
    let right_tree = right_resolved.txn.branch(&right_resolved.bid)?.tree();
    print_tree_diff(
        ui,
        Some(left_tree),
        Some(right_tree),
        &right_resolved.relpath,
    );
    Ok(())
}

pub(crate) fn cmd_status(session: &mut WcSession, ui: &mut Ui) -> CommandResult<()> {
    let wc = &session.wc;
    ui.out_line(format!(
        "On branch {} (base {} {}), {}.",
        wc.working_bid(),
        wc.base().0,
        wc.base().1,
        state_name(wc.state())
    ));
    let working = wc.working_branch()?;
    let base_tree = wc.base_branch_of_working().map(|branch| branch.tree());
    print_tree_diff(ui, base_tree, Some(working.tree()), "");
    Ok(())
}

pub(crate) fn cmd_cat(session: &mut WcSession, ui: &mut Ui, target: &str) -> CommandResult<()> {
    let resolved = session.parse_and_resolve(target)?;
    let eid = resolved.eid()?;
    let tree = resolved.txn.branch(&resolved.bid)?.tree();
    let content = tree.get(eid).expect("eid was just resolved");
    match content.payload.text() {
        Some(text) => {
            ui.out_bytes(text.as_ref());
            Ok(())
        }
        None => Err(arg_error(format!(
            "{target:?} is a {}, not a file",
            content.payload.kind_name()
        ))),
    }
}
