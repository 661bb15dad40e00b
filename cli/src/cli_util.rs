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

//! Element-target syntax and its resolution against the working copy.
//!
//! Targets look like `[^B<bid>/]relpath[@rev]`. Without `^B…` the default
//! branch is the working branch when no revision is given, else the base
//! branch. Paths are repository relpaths; `.` selects the branch root.

use mover_lib::branch::BranchId;
use mover_lib::element::Eid;
use mover_lib::remote::MemoryRemote;
use mover_lib::remote::RemoteAccess as _;
use mover_lib::repos::Revision;
use mover_lib::store::FileBranchingStore;
use mover_lib::txn::BranchTxn;
use mover_lib::working_copy::WorkingCopy;

use crate::command_error::CommandError;
use crate::command_error::CommandResult;
use crate::command_error::arg_error;

/// A revision selector in user input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevisionSpec {
    Head,
    Base,
    Committed,
    Number(u64),
}

impl RevisionSpec {
    pub fn parse(input: &str) -> CommandResult<Self> {
        match input {
            "HEAD" => Ok(Self::Head),
            "BASE" => Ok(Self::Base),
            "COMMITTED" => Ok(Self::Committed),
            _ => input
                .parse::<u64>()
                .map(Self::Number)
                .map_err(|_| arg_error(format!("unknown revision selector {input:?}"))),
        }
    }
}

/// A parsed, unresolved element target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementTarget {
    pub bid: Option<BranchId>,
    pub relpath: String,
    pub rev: Option<RevisionSpec>,
}

fn normalize_relpath(input: &str) -> CommandResult<String> {
    if input.starts_with('/') || input.contains("//") || input.contains("://") {
        return Err(arg_error(format!(
            "{input:?} is not a repository relpath"
        )));
    }
    let cleaned: Vec<&str> = input
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    if cleaned.iter().any(|segment| *segment == "..") {
        return Err(arg_error(format!("{input:?} must be canonical")));
    }
    Ok(cleaned.join("/"))
}

/// Parses `[^B<bid>/]relpath[@rev]`.
pub fn parse_target(input: &str) -> CommandResult<ElementTarget> {
    let (body, rev) = match input.rsplit_once('@') {
        Some((body, rev)) if !rev.is_empty() => (body, Some(RevisionSpec::parse(rev)?)),
        _ => (input, None),
    };
    let (bid, relpath) = match body.strip_prefix('^') {
        Some(rest) => {
            let (bid_part, relpath) = rest.split_once('/').unwrap_or((rest, ""));
            (Some(BranchId::parse(bid_part).map_err(CommandError::Mover)?), relpath)
        }
        None => (None, body),
    };
    Ok(ElementTarget {
        bid,
        relpath: normalize_relpath(relpath)?,
        rev,
    })
}

/// A target resolved to a concrete txn snapshot and branch.
pub struct ResolvedTarget {
    /// `None` when the target addresses the working txn.
    pub rev: Option<Revision>,
    pub txn: BranchTxn,
    pub bid: BranchId,
    pub relpath: String,
}

impl ResolvedTarget {
    pub fn eid(&self) -> CommandResult<Eid> {
        Ok(self.txn.branch(&self.bid)?.eid_at_path(&self.relpath)?)
    }
}

/// A mutation target: parent resolved, leaf name still unoccupied.
pub struct NewPathTarget {
    pub bid: BranchId,
    pub parent: Eid,
    pub name: String,
    pub relpath: String,
}

/// Opens the repository a URL names. `mem:` is an ephemeral in-process
/// repository; anything else selects the per-revision-file branching store
/// under that directory.
pub fn open_remote(url: &str) -> CommandResult<MemoryRemote> {
    if url == "mem:" || url.starts_with("mem://") {
        return Ok(MemoryRemote::open(url));
    }
    let dir = url.strip_prefix("file://").unwrap_or(url);
    let store = FileBranchingStore::open(dir)?;
    Ok(MemoryRemote::with_store(
        format!("file://{dir}"),
        Box::new(store),
    )?)
}

/// One live working-copy session of the action interpreter.
pub struct WcSession {
    pub wc: WorkingCopy<MemoryRemote>,
    /// `-m` override for commit messages; the audit trail otherwise.
    pub message: Option<String>,
}

impl WcSession {
    pub fn new(wc: WorkingCopy<MemoryRemote>) -> Self {
        Self { wc, message: None }
    }

    pub fn log_message(&self) -> String {
        match &self.message {
            Some(message) => message.clone(),
            None => self.wc.default_message(),
        }
    }

    pub fn resolve_rev(&self, spec: RevisionSpec) -> Revision {
        match spec {
            RevisionSpec::Head => self.wc.head(),
            RevisionSpec::Base | RevisionSpec::Committed => self.wc.base().0,
            RevisionSpec::Number(number) => Revision::new(number),
        }
    }

    /// The branch a target defaults to when it names none.
    fn default_bid(&self, has_rev: bool) -> BranchId {
        if has_rev {
            self.wc.base().1.clone()
        } else {
            self.wc.working_bid().clone()
        }
    }

    /// Resolves a parsed target to an owned txn snapshot.
    pub fn resolve(&self, target: &ElementTarget) -> CommandResult<ResolvedTarget> {
        let rev = target.rev.map(|spec| self.resolve_rev(spec));
        let txn = match rev {
            Some(rev) => self.wc.remote().load_txn(rev)?,
            None => self.wc.edit_txn().clone(),
        };
        let bid = target
            .bid
            .clone()
            .unwrap_or_else(|| self.default_bid(rev.is_some()));
        txn.branch(&bid)?;
        Ok(ResolvedTarget {
            rev,
            txn,
            bid,
            relpath: target.relpath.clone(),
        })
    }

    pub fn parse_and_resolve(&self, input: &str) -> CommandResult<ResolvedTarget> {
        self.resolve(&parse_target(input)?)
    }

    /// Resolves a target that must name an existing element.
    pub fn resolve_existing(&self, input: &str) -> CommandResult<(ResolvedTarget, Eid)> {
        let resolved = self.parse_and_resolve(input)?;
        let eid = resolved.eid()?;
        Ok((resolved, eid))
    }

    /// Resolves a mutation target: no revision allowed, the element must
    /// not exist yet, and its parent must.
    pub fn resolve_new_path(&self, input: &str) -> CommandResult<NewPathTarget> {
        let target = parse_target(input)?;
        if target.rev.is_some() {
            return Err(arg_error(format!(
                "{input:?}: a new path must not carry a revision"
            )));
        }
        if target.relpath.is_empty() {
            return Err(arg_error(format!("{input:?}: the branch root already exists")));
        }
        let bid = target.bid.clone().unwrap_or_else(|| self.default_bid(false));
        let branch = self.wc.edit_txn().branch(&bid)?;
        let (parent_path, name) = match target.relpath.rsplit_once('/') {
            Some((parent, name)) => (parent, name),
            None => ("", target.relpath.as_str()),
        };
        let parent = branch.eid_at_path(parent_path)?;
        if branch.tree().child_by_name(parent, name).is_some() {
            return Err(arg_error(format!("{:?} already exists", target.relpath)));
        }
        Ok(NewPathTarget {
            bid,
            parent,
            name: name.to_owned(),
            relpath: target.relpath,
        })
    }
}
