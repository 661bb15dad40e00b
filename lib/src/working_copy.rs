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

//! The working-copy driver: one live edit txn plus its base identity,
//! orchestrating checkout, switch, update, commit, revert, and migrate.

use tracing::instrument;

use crate::branch::BranchId;
use crate::branch::BranchState;
use crate::error::MoverError;
use crate::error::MoverResult;
use crate::merge::ConflictReport;
use crate::merge::merge_branches;
use crate::migrate::MigrationEditor;
use crate::remote::RemoteAccess;
use crate::replay::replay;
use crate::repos::RevProps;
use crate::repos::Revision;
use crate::txn::BranchTxn;

/// Lifecycle state of a working copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WcState {
    Clean,
    Dirty,
    /// Between entering the remote commit protocol and its completion.
    Committing,
    /// A switch merged with conflicts; terminal for this session.
    Conflicted,
}

/// What a `switch` did besides re-checking out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchReport {
    /// Local changes existed and were merged into the new working branch.
    pub carried_changes: bool,
    /// The target branch has a different root element than the previous
    /// working branch; carried changes may be surprising.
    pub different_root_warning: bool,
}

/// A live working copy: `base` and `working` branch identities within one
/// edit transaction, plus the session context (audit trail, quiet flag)
/// that earlier incarnations of this design kept in globals.
pub struct WorkingCopy<R: RemoteAccess> {
    remote: R,
    head: Revision,
    base_rev: Revision,
    base_bid: BranchId,
    base_txn: BranchTxn,
    edit_txn: BranchTxn,
    working_bid: BranchId,
    committing: bool,
    conflicts: Option<ConflictReport>,
    commands: Vec<String>,
    quiet: bool,
}

impl<R: RemoteAccess> WorkingCopy<R> {
    /// Opens a working copy on `remote`, checked out at `rev` (default: the
    /// latest revision) and `bid` (default: `B0`).
    pub fn open(remote: R, rev: Option<Revision>, bid: Option<BranchId>) -> MoverResult<Self> {
        let head = remote.latest_revision()?;
        let rev = rev.unwrap_or(head);
        let bid = bid.unwrap_or_else(|| BranchId::top(0));
        let base_txn = remote.load_txn(rev)?;
        base_txn.branch(&bid)?;
        let mut edit_txn = base_txn.clone();
        edit_txn.set_base_rev(None);
        Ok(Self {
            remote,
            head,
            base_rev: rev,
            base_bid: bid.clone(),
            base_txn,
            edit_txn,
            working_bid: bid,
            committing: false,
            conflicts: None,
            commands: Vec::new(),
            quiet: false,
        })
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn head(&self) -> Revision {
        self.head
    }

    pub fn base(&self) -> (Revision, &BranchId) {
        (self.base_rev, &self.base_bid)
    }

    pub fn working_bid(&self) -> &BranchId {
        &self.working_bid
    }

    /// Redirects the working identity to another branch of the edit txn
    /// (used when an action creates a branch and continues editing there).
    pub fn set_working_bid(&mut self, bid: BranchId) -> MoverResult<()> {
        self.edit_txn.branch(&bid)?;
        self.working_bid = bid;
        Ok(())
    }

    pub fn edit_txn(&self) -> &BranchTxn {
        &self.edit_txn
    }

    pub fn edit_txn_mut(&mut self) -> &mut BranchTxn {
        &mut self.edit_txn
    }

    pub fn base_txn(&self) -> &BranchTxn {
        &self.base_txn
    }

    pub fn working_branch(&self) -> MoverResult<&BranchState> {
        self.edit_txn.branch(&self.working_bid)
    }

    pub fn working_branch_mut(&mut self) -> MoverResult<&mut BranchState> {
        self.edit_txn.branch_mut(&self.working_bid)
    }

    /// The base-side counterpart of the working branch; `None` when the
    /// working branch was created in this edit txn.
    pub fn base_branch_of_working(&self) -> Option<&BranchState> {
        self.base_txn.branch(&self.working_bid).ok()
    }

    pub fn state(&self) -> WcState {
        if self.conflicts.is_some() {
            WcState::Conflicted
        } else if self.committing {
            WcState::Committing
        } else if self.txn_is_changed() {
            WcState::Dirty
        } else {
            WcState::Clean
        }
    }

    pub fn conflicts(&self) -> Option<&ConflictReport> {
        self.conflicts.as_ref()
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }

    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    /// Appends one performed action to the audit trail.
    pub fn record_command(&mut self, line: impl Into<String>) {
        self.commands.push(line.into());
    }

    /// The audit trail, doubling as the default commit message.
    pub fn default_message(&self) -> String {
        self.commands.join("; ")
    }

    /// Whether the edit txn differs from the base txn at all.
    pub fn txn_is_changed(&self) -> bool {
        self.edit_txn.is_changed(&self.base_txn)
    }

    fn refuse_if_conflicted(&self) -> MoverResult<()> {
        match &self.conflicts {
            Some(report) => Err(MoverError::Branching(format!(
                "working copy has unresolved conflicts ({})",
                report.summary()
            ))),
            None => Ok(()),
        }
    }

    /// Makes the txn's accumulated edits observable for diff/replay.
    /// Edits apply eagerly here, so this reduces to validating that the
    /// working branch could be committed (no orphans, no name clashes).
    pub fn sequence_point(&self) -> MoverResult<()> {
        self.edit_txn.validate_branch(&self.working_bid)
    }

    /// Loads the immutable base txn at `(rev, bid)` and installs it as both
    /// base and working state. Any accumulated edits are discarded; the
    /// caller must have saved or merged them first.
    #[instrument(skip(self), fields(rev = %rev, bid = %bid))]
    pub fn checkout(&mut self, rev: Revision, bid: BranchId) -> MoverResult<()> {
        let base_txn = self.remote.load_txn(rev)?;
        base_txn.branch(&bid)?;
        let mut edit_txn = base_txn.clone();
        edit_txn.set_base_rev(None);
        self.base_txn = base_txn;
        self.edit_txn = edit_txn;
        self.base_rev = rev;
        self.base_bid = bid.clone();
        self.working_bid = bid;
        self.conflicts = None;
        Ok(())
    }

    /// Commits the delta of the working branch against its base.
    ///
    /// Returns `None` without producing a revision when the commit txn
    /// turns out unchanged; the head is untouched in that case. On success
    /// the working copy is re-checked-out at the new revision.
    #[instrument(skip_all)]
    pub fn commit(&mut self, props: RevProps) -> MoverResult<Option<Revision>> {
        self.refuse_if_conflicted()?;
        self.sequence_point()?;
        if !self.txn_is_changed() {
            return Ok(None);
        }

        let head = self.remote.latest_revision()?;
        let head_txn = self.remote.load_txn(head)?;
        let mut commit_txn = head_txn.clone();
        let working_bid = self.working_bid.clone();

        let existed = commit_txn.has_branch(&working_bid);
        if !existed {
            // Top-level new branch: create it remotely first.
            let working = self.edit_txn.branch(&working_bid)?;
            commit_txn.open_branch(
                working.predecessor().cloned(),
                working_bid.clone(),
                working.root_eid(),
            );
        }

        // Allocate as many fresh eids as the edit txn did, so replayed
        // elements keep their ids.
        commit_txn.catch_up_eids(self.edit_txn.eids());

        let left = self
            .base_txn
            .has_branch(&working_bid)
            .then_some((&self.base_txn, &working_bid));
        replay(
            &mut commit_txn,
            &working_bid,
            left,
            Some((&self.edit_txn, &working_bid)),
        )?;
        if existed {
            commit_txn
                .branch_mut(&working_bid)?
                .set_predecessor(Some((head, working_bid.clone())));
        }

        if !commit_txn.is_changed(&head_txn) {
            tracing::debug!("commit txn unchanged, aborting");
            return Ok(None);
        }

        self.committing = true;
        let result = self.remote.commit(head, commit_txn, props);
        self.committing = false;
        let new_rev = result?;

        self.head = new_rev;
        self.commands.clear();
        self.checkout(new_rev, working_bid)?;
        tracing::info!(rev = %new_rev, "committed");
        Ok(Some(new_rev))
    }

    /// Re-checks-out at `(rev, bid)`, carrying local changes over by
    /// three-way merge (YCA = previous base, SRC = previous working,
    /// TGT = new working). On conflicts the partial merge is left in place
    /// and the working copy becomes [`WcState::Conflicted`].
    #[instrument(skip(self), fields(rev = %rev, bid = %bid))]
    pub fn switch(&mut self, rev: Revision, bid: BranchId) -> MoverResult<SwitchReport> {
        self.refuse_if_conflicted()?;
        self.sequence_point()?;
        let carried_changes = self.txn_is_changed();

        let target_txn = self.remote.load_txn(rev)?;
        let target_root = target_txn.branch(&bid)?.root_eid();
        let working_root = self.working_branch()?.root_eid();
        let different_root_warning = carried_changes && target_root != working_root;

        let prev_base_txn = std::mem::replace(&mut self.base_txn, target_txn);
        let prev_base_bid = self.base_bid.clone();
        let prev_edit_txn = self.edit_txn.clone();
        let prev_working_bid = self.working_bid.clone();

        self.checkout(rev, bid.clone())?;

        if carried_changes {
            let report = merge_branches(
                &mut self.edit_txn,
                &bid,
                (&prev_edit_txn, &prev_working_bid),
                (&prev_base_txn, &prev_base_bid),
            )?;
            if !report.is_empty() {
                let summary = report.summary();
                self.conflicts = Some(report);
                return Err(MoverError::Branching(format!(
                    "switch carried local changes with conflicts: {summary}"
                )));
            }
        }

        Ok(SwitchReport {
            carried_changes,
            different_root_warning,
        })
    }

    /// Switches to `(rev, current base bid)`.
    pub fn update(&mut self, rev: Revision) -> MoverResult<SwitchReport> {
        let bid = self.base_bid.clone();
        let target_txn = self.remote.load_txn(rev)?;
        if !target_txn.has_branch(&bid) {
            return Err(MoverError::Branching(format!(
                "branch {bid} does not exist at {rev}"
            )));
        }
        self.switch(rev, bid)
    }

    /// Replays the inverse delta (working → base) into the working branch,
    /// leaving an empty diff against the base.
    #[instrument(skip_all)]
    pub fn revert(&mut self) -> MoverResult<()> {
        self.refuse_if_conflicted()?;
        let working_bid = self.working_bid.clone();
        if self.base_txn.has_branch(&working_bid) {
            let snapshot = self.edit_txn.clone();
            replay(
                &mut self.edit_txn,
                &working_bid,
                Some((&snapshot, &working_bid)),
                Some((&self.base_txn, &working_bid)),
            )?;
        } else {
            // The working branch never existed in the base; reverting it
            // drops the branch and returns to the base branch.
            self.edit_txn.remove_branch_recursive(&working_bid);
            self.working_bid = self.base_bid.clone();
        }
        Ok(())
    }

    /// Migrates legacy revisions `r1..=r2` into element-based history, one
    /// commit per source revision. Returns the revisions created.
    #[instrument(skip(self), fields(r1 = %r1, r2 = %r2))]
    pub fn migrate(&mut self, r1: Revision, r2: Revision) -> MoverResult<Vec<Revision>> {
        self.refuse_if_conflicted()?;
        let index = self.remote.moves(r1, r2)?;
        let mut created = Vec::new();
        for number in r1.number()..=r2.number() {
            let rev = Revision::new(number);
            let moves = index.get(&rev).cloned().unwrap_or_default();
            let working_bid = self.working_bid.clone();
            let mut editor = MigrationEditor::new(&mut self.edit_txn, working_bid, &moves);
            self.remote.replay_paths(rev, rev, &mut editor)?;

            let mut props = RevProps::new();
            props.insert("log".to_owned(), format!("migrate {rev}"));
            props.insert("migrated-from".to_owned(), rev.number().to_string());
            if let Some(new_rev) = self.commit(props)? {
                created.push(new_rev);
            }
        }
        Ok(created)
    }
}
