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

//! Element-editing actions: mkdir, put, cp, mv, rm, and the copy-and-delete
//! rendering of a cross-branch move.

use std::fs;

use mover_lib::branch::BranchId;
use mover_lib::element::Eid;
use mover_lib::element::Payload;
use mover_lib::error::MoverError;
use mover_lib::remote::RemoteAccess as _;

use crate::cli_util::WcSession;
use crate::cli_util::parse_target;
use crate::command_error::CommandResult;
use crate::command_error::arg_error;
use crate::commands::branch;
use crate::ui::Ui;

/// Deletes the subtree at `eid` plus any nested branches hosted inside it.
pub(crate) fn delete_subtree_with_branches(
    session: &mut WcSession,
    bid: &BranchId,
    eid: Eid,
) -> CommandResult<Vec<Eid>> {
    let deleted = session
        .wc
        .edit_txn_mut()
        .branch_mut(bid)?
        .delete_subtree(eid)?;
    let nested: Vec<BranchId> = session
        .wc
        .edit_txn()
        .branches()
        .filter(|branch| {
            branch
                .bid()
                .outer()
                .is_some_and(|(outer, host)| outer == *bid && deleted.contains(&host))
        })
        .map(|branch| branch.bid().clone())
        .collect();
    for nested_bid in nested {
        session.wc.edit_txn_mut().remove_branch_recursive(&nested_bid);
    }
    Ok(deleted)
}

pub(crate) fn cmd_mkdir(session: &mut WcSession, ui: &mut Ui, target: &str) -> CommandResult<()> {
    let new = session.resolve_new_path(target)?;
    let eid = session.wc.edit_txn_mut().new_eid();
    session
        .wc
        .edit_txn_mut()
        .branch_mut(&new.bid)?
        .alter(eid, Some(new.parent), &new.name, Payload::dir())?;
    ui.note(format!("A  {}", new.relpath));
    Ok(())
}

pub(crate) fn cmd_put(
    session: &mut WcSession,
    ui: &mut Ui,
    local: &str,
    target: &str,
) -> CommandResult<()> {
    let text =
        fs::read(local).map_err(|err| arg_error(format!("cannot read {local:?}: {err}")))?;
    let parsed = parse_target(target)?;
    if parsed.rev.is_some() {
        return Err(arg_error("put writes into the working copy, not a revision"));
    }

    let resolved = session.resolve(&parsed)?;
    let existing = resolved
        .txn
        .branch(&resolved.bid)?
        .tree()
        .eid_at_path(&resolved.relpath);
    match existing {
        Some(eid) => {
            let branch = session.wc.edit_txn_mut().branch_mut(&resolved.bid)?;
            let content = branch.tree().get(eid).expect("eid was just resolved");
            if !content.payload.is_file() {
                return Err(arg_error(format!(
                    "{target:?} is a {}, not a file",
                    content.payload.kind_name()
                )));
            }
            let props = content.payload.props().cloned().unwrap_or_default();
            let parent = content.parent;
            let name = content.name.clone();
            branch.alter(
                eid,
                parent,
                &name,
                Payload::File {
                    props,
                    text: text.into(),
                },
            )?;
            ui.note(format!("M  {}", resolved.relpath));
        }
        None => {
            let new = session.resolve_new_path(target)?;
            let eid = session.wc.edit_txn_mut().new_eid();
            session
                .wc
                .edit_txn_mut()
                .branch_mut(&new.bid)?
                .alter(eid, Some(new.parent), &new.name, Payload::file(text))?;
            ui.note(format!("A  {}", new.relpath));
        }
    }
    Ok(())
}

pub(crate) fn cmd_cp(
    session: &mut WcSession,
    ui: &mut Ui,
    rev_arg: &str,
    src: &str,
    dst: &str,
) -> CommandResult<()> {
    let spec = crate::cli_util::RevisionSpec::parse(rev_arg)?;
    let rev = session.resolve_rev(spec);
    let src_target = parse_target(src)?;
    if src_target.rev.is_some() {
        return Err(arg_error("cp takes its source revision as the first argument"));
    }
    let src_bid = src_target
        .bid
        .clone()
        .unwrap_or_else(|| session.wc.base().1.clone());
    let src_txn = session.wc.remote().load_txn(rev)?;
    let src_eid = src_txn.branch(&src_bid)?.eid_at_path(&src_target.relpath)?;
    let subtree = src_txn.subtree(&src_bid, src_eid)?;

    let new = session.resolve_new_path(dst)?;
    session
        .wc
        .edit_txn_mut()
        .copy_tree(&new.bid, &subtree, new.parent, &new.name)?;
    ui.note(format!("A+ {}", new.relpath));
    Ok(())
}

pub(crate) fn cmd_mv(
    session: &mut WcSession,
    ui: &mut Ui,
    src: &str,
    dst: &str,
) -> CommandResult<()> {
    let src_target = parse_target(src)?;
    let dst_target = parse_target(dst)?;
    if src_target.rev.is_some() || dst_target.rev.is_some() {
        return Err(arg_error("mv operates on the working copy only"));
    }
    let working_bid = session.wc.working_bid().clone();
    let src_bid = src_target.bid.clone().unwrap_or_else(|| working_bid.clone());
    let dst_bid = dst_target.bid.clone().unwrap_or_else(|| working_bid.clone());

    if src_bid != dst_bid {
        if !ui.interactive() {
            return Err(MoverError::Branching(format!(
                "cannot move {src:?} between branches {src_bid} and {dst_bid}; use \
                 copy-and-delete, branch-and-delete, or branch-into-and-delete"
            ))
            .into());
        }
        let choice = ui.prompt(
            "cross-branch move: [c]opy-and-delete, [b]ranch-and-delete, \
             branch-[i]nto-and-delete? ",
        )?;
        return match choice.trim() {
            "c" => cmd_copy_and_delete(session, ui, src, dst),
            "b" => branch::cmd_branch_and_delete(session, ui, src, dst),
            "i" => branch::cmd_branch_into_and_delete(session, ui, src, dst),
            other => Err(arg_error(format!("unknown choice {other:?}"))),
        };
    }

    let (resolved_src, eid) = session.resolve_existing(src)?;
    let branch = session.wc.edit_txn().branch(&src_bid)?;
    if eid == branch.root_eid() {
        return Err(arg_error("cannot move the branch root"));
    }
    let new = session.resolve_new_path(dst)?;
    // The destination must not sit inside the moved subtree.
    let mut cursor = Some(new.parent);
    while let Some(ancestor) = cursor {
        if ancestor == eid {
            return Err(arg_error(format!(
                "cannot move {src:?} into its own subtree"
            )));
        }
        cursor = branch.tree().get(ancestor).and_then(|content| content.parent);
    }

    let payload = branch
        .tree()
        .get(eid)
        .expect("eid was just resolved")
        .payload
        .clone();
    session
        .wc
        .edit_txn_mut()
        .branch_mut(&new.bid)?
        .alter(eid, Some(new.parent), &new.name, payload)?;
    ui.note(format!("V  {} (from {})", new.relpath, resolved_src.relpath));
    Ok(())
}

pub(crate) fn cmd_rm(session: &mut WcSession, ui: &mut Ui, target: &str) -> CommandResult<()> {
    let parsed = parse_target(target)?;
    if parsed.rev.is_some() {
        return Err(arg_error("rm operates on the working copy only"));
    }
    let (resolved, eid) = session.resolve_existing(target)?;
    delete_subtree_with_branches(session, &resolved.bid.clone(), eid)?;
    ui.note(format!("D  {}", resolved.relpath));
    Ok(())
}

/// A cross-branch move rendered as an element copy plus a delete: the eids
/// stay stable, so the move remains tracked. Within one branch the
/// eid-preserving copy already re-addresses the elements, so there is
/// nothing left to delete.
pub(crate) fn cmd_copy_and_delete(
    session: &mut WcSession,
    ui: &mut Ui,
    src: &str,
    dst: &str,
) -> CommandResult<()> {
    let (resolved_src, eid) = session.resolve_existing(src)?;
    if resolved_src.rev.is_some() {
        return Err(arg_error("copy-and-delete operates on the working copy only"));
    }
    let new = session.resolve_new_path(dst)?;
    if new.bid == resolved_src.bid {
        // The destination must not sit inside the copied subtree.
        let branch = session.wc.edit_txn().branch(&new.bid)?;
        let mut cursor = Some(new.parent);
        while let Some(ancestor) = cursor {
            if ancestor == eid {
                return Err(arg_error(format!(
                    "cannot copy {src:?} into its own subtree and delete it"
                )));
            }
            cursor = branch.tree().get(ancestor).and_then(|content| content.parent);
        }
    }
    let subtree = session.wc.edit_txn().subtree(&resolved_src.bid, eid)?;
    session
        .wc
        .edit_txn_mut()
        .copy_tree(&new.bid, &subtree, new.parent, &new.name)?;
    ui.note(format!("A+ {}", new.relpath));
    if new.bid != resolved_src.bid {
        delete_subtree_with_branches(session, &resolved_src.bid.clone(), eid)?;
    }
    ui.note(format!("D  {}", resolved_src.relpath));
    Ok(())
}
