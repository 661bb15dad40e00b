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

//! Actions that move state between the working copy and the repository:
//! commit, update, switch, revert, merge, migrate.

use mover_lib::error::MoverError;
use mover_lib::merge::ConflictReport;
use mover_lib::merge::merge_branches;
use mover_lib::repos::RevProps;
use mover_lib::repos::Revision;
use tracing::instrument;

use crate::cli_util::WcSession;
use crate::cli_util::parse_target;
use crate::command_error::CommandResult;
use crate::command_error::arg_error;
use crate::ui::Ui;

fn print_conflicts(ui: &mut Ui, report: &ConflictReport) {
    for (eid, conflict) in &report.single_element {
        let kind = if conflict.is_delete_vs_modify() {
            "delete-vs-modify"
        } else {
            "incompatible edits"
        };
        ui.out_line(format!("conflict: element {eid}: {kind}"));
    }
    for clash in report.name_clash.values() {
        ui.out_line(format!(
            "conflict: name {:?} under element {} claimed by {}",
            clash.name,
            clash.parent,
            clash
                .eids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    for (eid, orphan) in &report.orphan {
        ui.out_line(format!(
            "conflict: element {eid} orphaned (parent {} is gone)",
            orphan.missing_parent
        ));
    }
}

#[instrument(skip_all)]
pub(crate) fn cmd_merge(
    session: &mut WcSession,
    ui: &mut Ui,
    from: &str,
    to: &str,
    yca: &str,
) -> CommandResult<()> {
    let from_resolved = session.parse_and_resolve(from)?;
    let yca_resolved = session.parse_and_resolve(yca)?;
    let to_target = parse_target(to)?;
    if to_target.rev.is_some() {
        return Err(arg_error("merge target must be in the working copy"));
    }
    let to_bid = to_target
        .bid
        .unwrap_or_else(|| session.wc.working_bid().clone());

    let report = merge_branches(
        session.wc.edit_txn_mut(),
        &to_bid,
        (&from_resolved.txn, &from_resolved.bid),
        (&yca_resolved.txn, &yca_resolved.bid),
    )?;
    if report.is_empty() {
        ui.note(format!("Merged {from} into {to_bid}."));
        Ok(())
    } else {
        print_conflicts(ui, &report);
        Err(MoverError::Branching(format!("merge failed: {}", report.summary())).into())
    }
}

#[instrument(skip_all)]
pub(crate) fn cmd_commit(session: &mut WcSession, ui: &mut Ui) -> CommandResult<()> {
    let mut props = RevProps::new();
    props.insert("log".to_owned(), session.log_message());
    match session.wc.commit(props)? {
        Some(rev) => ui.note(format!("Committed {rev}.")),
        None => ui.note("Nothing changed; no revision committed."),
    }
    Ok(())
}

pub(crate) fn cmd_update(session: &mut WcSession, ui: &mut Ui, target: &str) -> CommandResult<()> {
    let parsed = parse_target(target)?;
    if !parsed.relpath.is_empty() || parsed.bid.is_some() {
        return Err(arg_error("update takes .@REV"));
    }
    let Some(spec) = parsed.rev else {
        return Err(arg_error("update needs a revision"));
    };
    let rev = session.resolve_rev(spec);
    let report = session.wc.update(rev)?;
    if report.different_root_warning {
        ui.warn("updating a differently-rooted branch with local changes");
    }
    if report.carried_changes {
        ui.note("Local changes carried over.");
    }
    ui.note(format!("Updated to {rev} {}.", session.wc.working_bid()));
    Ok(())
}

#[instrument(skip_all)]
pub(crate) fn cmd_switch(session: &mut WcSession, ui: &mut Ui, target: &str) -> CommandResult<()> {
    let parsed = parse_target(target)?;
    if !parsed.relpath.is_empty() {
        return Err(arg_error("switch takes a branch target like ^B1[@REV]"));
    }
    let bid = parsed
        .bid
        .unwrap_or_else(|| session.wc.base().1.clone());
    let rev = match parsed.rev {
        Some(spec) => session.resolve_rev(spec),
        None => session.wc.head(),
    };
    match session.wc.switch(rev, bid.clone()) {
        Ok(report) => {
            if report.different_root_warning {
                ui.warn("switching to a differently-rooted branch with local changes");
            }
            if report.carried_changes {
                ui.note("Local changes carried over.");
            }
            ui.note(format!("Switched to {bid} at {rev}."));
            Ok(())
        }
        Err(err) => {
            if let Some(report) = session.wc.conflicts() {
                print_conflicts(ui, report);
            }
            Err(err.into())
        }
    }
}

pub(crate) fn cmd_revert(session: &mut WcSession, ui: &mut Ui) -> CommandResult<()> {
    session.wc.revert()?;
    ui.note("Reverted all local changes.");
    Ok(())
}

#[instrument(skip_all)]
pub(crate) fn cmd_migrate(session: &mut WcSession, ui: &mut Ui, target: &str) -> CommandResult<()> {
    let parsed = parse_target(target)?;
    if !parsed.relpath.is_empty() || parsed.bid.is_some() {
        return Err(arg_error("migrate takes .@REV"));
    }
    let Some(spec) = parsed.rev else {
        return Err(arg_error("migrate needs the last legacy revision to migrate"));
    };
    let last = session.resolve_rev(spec);
    let created = session.wc.migrate(Revision::new(1), last)?;
    for rev in &created {
        ui.note(format!("Migrated into {rev}."));
    }
    ui.note(format!("Migration done: {} revisions.", created.len()));
    Ok(())
}
