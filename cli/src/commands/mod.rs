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

//! The action vocabulary: fixed-arity verbs shared by one-shot and
//! interactive mode. Precondition failures abort the single action; in
//! interactive mode they are printed and the next action is read.

mod branch;
mod edit;
mod info;
mod sync;

use mover_lib::error::MoverError;

use crate::cli_util::WcSession;
use crate::command_error::CommandError;
use crate::command_error::CommandResult;
use crate::command_error::arg_error;
use crate::ui::Ui;

/// Number of arguments each verb consumes, or `None` for an unknown verb.
fn action_arity(verb: &str) -> Option<usize> {
    match verb {
        "info-wc" | "ls-br-r" | "status" | "commit" | "revert" => Some(0),
        "ls" | "branches" | "tbranch" | "mkbranch" | "rm" | "mkdir" | "cat" | "update"
        | "switch" | "migrate" => Some(1),
        "log" | "diff" | "branch" | "branch-into" | "mv" | "copy-and-delete"
        | "branch-and-delete" | "branch-into-and-delete" | "put" => Some(2),
        "merge" | "cp" => Some(3),
        _ => None,
    }
}

/// Verbs that edit the txn; these feed the audit trail that becomes the
/// default commit message.
fn is_edit_verb(verb: &str) -> bool {
    matches!(
        verb,
        "tbranch"
            | "branch"
            | "branch-into"
            | "mkbranch"
            | "merge"
            | "cp"
            | "mv"
            | "rm"
            | "copy-and-delete"
            | "branch-and-delete"
            | "branch-into-and-delete"
            | "mkdir"
            | "put"
    )
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedAction {
    pub verb: String,
    pub args: Vec<String>,
}

/// Splits a flat word list into actions, each verb consuming its fixed
/// number of arguments.
pub fn parse_actions(words: &[String]) -> CommandResult<Vec<ParsedAction>> {
    let mut actions = Vec::new();
    let mut iter = words.iter();
    while let Some(word) = iter.next() {
        let arity = action_arity(word)
            .ok_or_else(|| arg_error(format!("unknown action {word:?}")))?;
        let mut args = Vec::with_capacity(arity);
        for _ in 0..arity {
            let arg = iter
                .next()
                .ok_or_else(|| arg_error(format!("{word}: missing argument")))?;
            args.push(arg.clone());
        }
        actions.push(ParsedAction {
            verb: word.clone(),
            args,
        });
    }
    Ok(actions)
}

pub fn run_action(
    session: &mut WcSession,
    ui: &mut Ui,
    action: &ParsedAction,
) -> CommandResult<()> {
    let args: Vec<&str> = action.args.iter().map(String::as_str).collect();
    match action.verb.as_str() {
        "info-wc" => info::cmd_info_wc(session, ui),
        "ls" => info::cmd_ls(session, ui, args[0]),
        "branches" => info::cmd_branches(session, ui, args[0]),
        "ls-br-r" => info::cmd_ls_br_r(session, ui),
        "log" => info::cmd_log(session, ui, args[0], args[1]),
        "diff" => info::cmd_diff(session, ui, args[0], args[1]),
        "status" => info::cmd_status(session, ui),
        "cat" => info::cmd_cat(session, ui, args[0]),
        "mkdir" => edit::cmd_mkdir(session, ui, args[0]),
        "put" => edit::cmd_put(session, ui, args[0], args[1]),
        "cp" => edit::cmd_cp(session, ui, args[0], args[1], args[2]),
        "mv" => edit::cmd_mv(session, ui, args[0], args[1]),
        "rm" => edit::cmd_rm(session, ui, args[0]),
        "copy-and-delete" => edit::cmd_copy_and_delete(session, ui, args[0], args[1]),
        "tbranch" => branch::cmd_tbranch(session, ui, args[0]),
        "branch" => branch::cmd_branch(session, ui, args[0], args[1]),
        "branch-into" => branch::cmd_branch_into(session, ui, args[0], args[1]),
        "branch-and-delete" => branch::cmd_branch_and_delete(session, ui, args[0], args[1]),
        "branch-into-and-delete" => {
            branch::cmd_branch_into_and_delete(session, ui, args[0], args[1])
        }
        "mkbranch" => branch::cmd_mkbranch(session, ui, args[0]),
        "merge" => sync::cmd_merge(session, ui, args[0], args[1], args[2]),
        "commit" => sync::cmd_commit(session, ui),
        "update" => sync::cmd_update(session, ui, args[0]),
        "switch" => sync::cmd_switch(session, ui, args[0]),
        "revert" => sync::cmd_revert(session, ui),
        "migrate" => sync::cmd_migrate(session, ui, args[0]),
        other => Err(arg_error(format!("unknown action {other:?}"))),
    }?;
    if is_edit_verb(&action.verb) {
        let mut line = action.verb.clone();
        for arg in &action.args {
            line.push(' ');
            line.push_str(arg);
        }
        session.wc.record_command(line);
    }
    Ok(())
}

/// Runs a word list as a one-shot action sequence; the first failure
/// aborts the remainder.
pub fn run_words(session: &mut WcSession, ui: &mut Ui, words: &[String]) -> CommandResult<()> {
    for action in parse_actions(words)? {
        run_action(session, ui, &action)?;
    }
    Ok(())
}

/// The interactive shell: one line of actions per prompt; errors are
/// printed and the next line is read.
pub fn interactive_loop(session: &mut WcSession, ui: &mut Ui) -> CommandResult<()> {
    loop {
        let line = match ui.prompt("mover> ") {
            Ok(line) => line,
            Err(MoverError::Cancelled) => return Ok(()),
            Err(err) => return Err(CommandError::Mover(err)),
        };
        let words: Vec<String> = line.split_whitespace().map(str::to_owned).collect();
        match words.first().map(String::as_str) {
            None => continue,
            Some("exit" | "quit") => return Ok(()),
            Some(_) => {}
        }
        if let Err(err) = run_words(session, ui, &words) {
            ui.error_line(format!("{err} ({})", err.taxonomy()));
        }
    }
}
