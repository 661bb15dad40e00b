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

//! Branching actions: mkbranch, tbranch, branch, branch-into, and their
//! -and-delete renderings of cross-branch moves.

use mover_lib::branch::BranchId;
use mover_lib::branch::Subtree;
use mover_lib::element::Eid;
use mover_lib::element::Payload;
use mover_lib::error::MoverError;

use crate::cli_util::ResolvedTarget;
use crate::cli_util::WcSession;
use crate::command_error::CommandResult;
use crate::command_error::arg_error;
use crate::commands::edit::delete_subtree_with_branches;
use crate::ui::Ui;

/// What a branching action takes as its source: the subtree at the element,
/// or, when the element hosts a nested branch, that branch's whole tree.
fn branch_source(resolved: &ResolvedTarget, eid: Eid) -> CommandResult<Subtree> {
    let content = resolved
        .txn
        .branch(&resolved.bid)?
        .tree()
        .get(eid)
        .expect("eid was resolved in this txn");
    if content.payload.is_subbranch_root() {
        let sub = resolved
            .txn
            .subbranch_at(&resolved.bid, eid)
            .ok_or_else(|| {
                MoverError::Branching(format!("no branch is hosted at element {eid}"))
            })?;
        let bid = sub.bid().clone();
        let root = sub.root_eid();
        Ok(resolved.txn.subtree(&bid, root)?)
    } else {
        Ok(resolved.txn.subtree(&resolved.bid, eid)?)
    }
}

pub(crate) fn cmd_mkbranch(session: &mut WcSession, ui: &mut Ui, target: &str) -> CommandResult<()> {
    let new = session.resolve_new_path(target)?;
    let host = session.wc.edit_txn_mut().new_eid();
    session
        .wc
        .edit_txn_mut()
        .branch_mut(&new.bid)?
        .alter(host, Some(new.parent), &new.name, Payload::SubbranchRoot)?;
    let inner_root = session.wc.edit_txn_mut().new_eid();
    let index = session.wc.edit_txn().next_subbranch_index(&new.bid, host);
    let nested = new.bid.nested(host, index);
    session
        .wc
        .edit_txn_mut()
        .open_branch(None, nested.clone(), inner_root);
    ui.note(format!("A  {} (branch {nested})", new.relpath));
    Ok(())
}

/// Creates a new top-level branch from the source subtree and switches the
/// working branch to it.
pub(crate) fn cmd_tbranch(session: &mut WcSession, ui: &mut Ui, src: &str) -> CommandResult<()> {
    let (resolved, eid) = session.resolve_existing(src)?;
    let subtree = branch_source(&resolved, eid)?;
    let new_bid = BranchId::top(session.wc.edit_txn().next_top_level_index());
    let predecessor = Some((resolved.rev.unwrap_or(session.wc.base().0), resolved.bid.clone()));
    session
        .wc
        .edit_txn_mut()
        .instantiate_branch(new_bid.clone(), &subtree, predecessor)?;
    session.wc.set_working_bid(new_bid.clone())?;
    ui.note(format!("A+ ^{new_bid} (root {})", subtree.root_eid));
    Ok(())
}

/// Creates a nested branch of the source subtree, hosted at a new element
/// at DST.
pub(crate) fn cmd_branch(
    session: &mut WcSession,
    ui: &mut Ui,
    src: &str,
    dst: &str,
) -> CommandResult<()> {
    let (resolved, eid) = session.resolve_existing(src)?;
    let subtree = branch_source(&resolved, eid)?;
    let new = session.resolve_new_path(dst)?;
    let host = session.wc.edit_txn_mut().new_eid();
    session
        .wc
        .edit_txn_mut()
        .branch_mut(&new.bid)?
        .alter(host, Some(new.parent), &new.name, Payload::SubbranchRoot)?;
    let index = session.wc.edit_txn().next_subbranch_index(&new.bid, host);
    let nested = new.bid.nested(host, index);
    let predecessor = Some((resolved.rev.unwrap_or(session.wc.base().0), resolved.bid.clone()));
    session
        .wc
        .edit_txn_mut()
        .instantiate_branch(nested.clone(), &subtree, predecessor)?;
    ui.note(format!("A+ {} (branch {nested})", new.relpath));
    Ok(())
}

/// Instantiates the source subtree as plain elements inside an existing
/// directory of the target branch. Pre-existing eids are overwritten, with
/// a notification per element.
pub(crate) fn cmd_branch_into(
    session: &mut WcSession,
    ui: &mut Ui,
    src: &str,
    dst: &str,
) -> CommandResult<()> {
    let (resolved_src, src_eid) = session.resolve_existing(src)?;
    let name = match resolved_src.relpath.rsplit_once('/') {
        Some((_, name)) => name.to_owned(),
        None if !resolved_src.relpath.is_empty() => resolved_src.relpath.clone(),
        None => return Err(arg_error("branch-into needs a named source element")),
    };
    let subtree = branch_source(&resolved_src, src_eid)?;

    let (resolved_dst, dst_eid) = session.resolve_existing(dst)?;
    if resolved_dst.rev.is_some() {
        return Err(arg_error("branch-into targets the working copy"));
    }
    let dst_tree = session.wc.edit_txn().branch(&resolved_dst.bid)?.tree();
    for &eid in subtree.elements.keys() {
        if dst_tree.contains(eid) {
            ui.warn(format!("branch-into replaces element {eid} in {}", resolved_dst.bid));
        }
    }
    session
        .wc
        .edit_txn_mut()
        .copy_tree(&resolved_dst.bid, &subtree, dst_eid, &name)?;
    let dst_display = if resolved_dst.relpath.is_empty() {
        name.clone()
    } else {
        format!("{}/{name}", resolved_dst.relpath)
    };
    ui.note(format!("A+ {dst_display}"));
    Ok(())
}

pub(crate) fn cmd_branch_and_delete(
    session: &mut WcSession,
    ui: &mut Ui,
    src: &str,
    dst: &str,
) -> CommandResult<()> {
    let (resolved_src, _) = session.resolve_existing(src)?;
    let new = session.resolve_new_path(dst)?;
    if new.bid == resolved_src.bid
        && !resolved_src.relpath.is_empty()
        && new
            .relpath
            .strip_prefix(resolved_src.relpath.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    {
        return Err(arg_error(format!(
            "cannot branch {src:?} to a target nested inside it and delete it"
        )));
    }
    cmd_branch(session, ui, src, dst)?;
    let (resolved_src, eid) = session.resolve_existing(src)?;
    delete_subtree_with_branches(session, &resolved_src.bid.clone(), eid)?;
    ui.note(format!("D  {}", resolved_src.relpath));
    Ok(())
}

pub(crate) fn cmd_branch_into_and_delete(
    session: &mut WcSession,
    ui: &mut Ui,
    src: &str,
    dst: &str,
) -> CommandResult<()> {
    let (resolved_src, eid) = session.resolve_existing(src)?;
    let src_bid = resolved_src.bid.clone();
    cmd_branch_into(session, ui, src, dst)?;
    // The eid-preserving copy may have re-addressed the elements already
    // when source and destination share a branch.
    if session.wc.edit_txn().branch(&src_bid)?.path_of_eid(eid).as_deref()
        == Some(resolved_src.relpath.as_str())
    {
        delete_subtree_with_branches(session, &src_bid, eid)?;
        ui.note(format!("D  {}", resolved_src.relpath));
    }
    Ok(())
}
