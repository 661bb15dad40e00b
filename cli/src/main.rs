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

use std::process::ExitCode;

use clap::Parser as _;
use mover_cli::cli_util::WcSession;
use mover_cli::cli_util::open_remote;
use mover_cli::command_error::CommandResult;
use mover_cli::commands::interactive_loop;
use mover_cli::commands::run_words;
use mover_cli::ui::Ui;
use mover_lib::branch::BranchId;
use mover_lib::repos::Revision;
use mover_lib::working_copy::WorkingCopy;
use tracing_subscriber::EnvFilter;

/// Experimental move-tracking version control client.
#[derive(clap::Parser, Debug)]
#[command(name = "mover", version)]
struct MoverArgs {
    /// Repository location: `mem:` (ephemeral) or a directory / file:// URL
    /// holding per-revision branching state.
    #[arg(short = 'U', long = "url", default_value = "mem:", value_name = "URL")]
    url: String,

    /// Suppress notification output.
    #[arg(short, long)]
    quiet: bool,

    /// Log message used by `commit` instead of the action audit trail.
    #[arg(short, long, value_name = "MESSAGE")]
    message: Option<String>,

    /// Revision to check out (default: the latest).
    #[arg(short, long, value_name = "REV")]
    revision: Option<u64>,

    /// Branch to check out (default: B0).
    #[arg(short, long, value_name = "BID")]
    branch: Option<String>,

    /// Actions to perform; with none given, an interactive shell starts.
    #[arg(value_name = "ACTION", trailing_var_arg = true)]
    actions: Vec<String>,
}

fn run(args: &MoverArgs) -> CommandResult<()> {
    let remote = open_remote(&args.url)?;
    let rev = args.revision.map(Revision::new);
    let bid = args
        .branch
        .as_deref()
        .map(BranchId::parse)
        .transpose()?;
    let mut wc = WorkingCopy::open(remote, rev, bid)?;
    wc.set_quiet(args.quiet);
    let mut session = WcSession::new(wc);
    session.message = args.message.clone();

    let interactive = args.actions.is_empty();
    let mut ui = Ui::terminal(args.quiet, interactive);
    if interactive {
        interactive_loop(&mut session, &mut ui)
    } else {
        run_words(&mut session, &mut ui, &args.actions)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = MoverArgs::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("mover: error: {err} ({})", err.taxonomy());
            ExitCode::FAILURE
        }
    }
}
