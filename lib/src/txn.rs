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

//! The unit of atomic editing: a set of branches sharing one eid allocator
//! and one base-revision anchor.

use std::collections::BTreeMap;

use itertools::Itertools as _;

use crate::branch::BranchId;
use crate::branch::BranchState;
use crate::branch::Subtree;
use crate::branch::SubtreeBranch;
use crate::element::Eid;
use crate::element::EidAllocator;
use crate::element::ElementContent;
use crate::element::ElementTree;
use crate::error::MoverError;
use crate::error::MoverResult;
use crate::repos::Revision;

/// A set of [`BranchState`]s keyed by bid, sharing one eid allocator.
///
/// Branches form an arena: nesting is encoded in the bid strings, so there
/// are no owning pointers between branches and no cycles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchTxn {
    base_rev: Option<Revision>,
    eids: EidAllocator,
    branches: BTreeMap<BranchId, BranchState>,
}

impl BranchTxn {
    pub fn new(base_rev: Option<Revision>, eids: EidAllocator) -> Self {
        Self {
            base_rev,
            eids,
            branches: BTreeMap::new(),
        }
    }

    /// The txn of revision zero: a single branch `B0` holding an empty root
    /// directory at eid 0.
    pub fn initial() -> Self {
        let mut eids = EidAllocator::starting_at(0);
        let root_eid = eids.allocate();
        let mut txn = Self::new(None, eids);
        txn.insert_branch(BranchState::new(BranchId::top(0), root_eid));
        txn
    }

    /// The revision this txn is editing against; `None` for the working txn.
    pub fn base_rev(&self) -> Option<Revision> {
        self.base_rev
    }

    pub fn set_base_rev(&mut self, base_rev: Option<Revision>) {
        self.base_rev = base_rev;
    }

    pub fn eids(&self) -> &EidAllocator {
        &self.eids
    }

    /// Allocates a fresh, txn-wide-unique eid.
    pub fn new_eid(&mut self) -> Eid {
        self.eids.allocate()
    }

    pub fn catch_up_eids(&mut self, other: &EidAllocator) {
        self.eids.catch_up_with(other);
    }

    pub fn has_branch(&self, bid: &BranchId) -> bool {
        self.branches.contains_key(bid)
    }

    pub fn branch(&self, bid: &BranchId) -> MoverResult<&BranchState> {
        self.branches
            .get(bid)
            .ok_or_else(|| MoverError::BranchNotFound { bid: bid.clone() })
    }

    pub fn branch_mut(&mut self, bid: &BranchId) -> MoverResult<&mut BranchState> {
        self.branches
            .get_mut(bid)
            .ok_or_else(|| MoverError::BranchNotFound { bid: bid.clone() })
    }

    pub fn branches(&self) -> impl Iterator<Item = &BranchState> + '_ {
        self.branches.values()
    }

    pub fn branch_ids(&self) -> impl Iterator<Item = &BranchId> + '_ {
        self.branches.keys()
    }

    pub fn insert_branch(&mut self, branch: BranchState) {
        self.branches.insert(branch.bid().clone(), branch);
    }

    /// Removes `bid` and every branch nested inside it.
    pub fn remove_branch_recursive(&mut self, bid: &BranchId) {
        let doomed: Vec<BranchId> = self
            .branches
            .keys()
            .filter(|candidate| *candidate == bid || bid.encloses(candidate))
            .cloned()
            .collect();
        for gone in doomed {
            self.branches.remove(&gone);
        }
    }

    /// Creates or looks up a branch. Idempotent on `bid`; an existing branch
    /// is returned untouched (in particular its predecessor is kept).
    pub fn open_branch(
        &mut self,
        predecessor: Option<(Revision, BranchId)>,
        bid: BranchId,
        root_eid: Eid,
    ) -> &mut BranchState {
        self.branches.entry(bid.clone()).or_insert_with(|| {
            let mut branch = BranchState::new(bid, root_eid);
            branch.set_predecessor(predecessor);
            branch
        })
    }

    /// Direct sub-branches of `bid` (one nesting level below it).
    pub fn subbranches(&self, bid: &BranchId) -> Vec<&BranchState> {
        self.branches
            .values()
            .filter(|branch| {
                branch
                    .bid()
                    .outer()
                    .is_some_and(|(outer, _)| outer == *bid)
            })
            .collect()
    }

    /// The direct sub-branch of `bid` hosted at `host`, if any. When several
    /// exist the one with the lowest trailing counter wins.
    pub fn subbranch_at(&self, bid: &BranchId, host: Eid) -> Option<&BranchState> {
        self.subbranches(bid)
            .into_iter()
            .filter(|branch| branch.bid().outer().is_some_and(|(_, h)| h == host))
            .sorted_by_key(|branch| branch.bid().last_index())
            .next()
    }

    pub fn next_subbranch_index(&self, bid: &BranchId, host: Eid) -> u64 {
        self.subbranches(bid)
            .into_iter()
            .filter(|branch| branch.bid().outer().is_some_and(|(_, h)| h == host))
            .map(|branch| branch.bid().last_index() + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn next_top_level_index(&self) -> u64 {
        self.branches
            .keys()
            .filter(|bid| !bid.is_nested())
            .map(|bid| bid.top_index() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Extracts the subtree of `bid` rooted at `eid`, capturing the nested
    /// branches hosted inside it recursively.
    pub fn subtree(&self, bid: &BranchId, eid: Eid) -> MoverResult<Subtree> {
        let branch = self.branch(bid)?;
        let elements = branch
            .tree()
            .closed_subtree(eid)
            .ok_or(MoverError::ElementNotFound {
                bid: bid.clone(),
                eid,
            })?;
        let mut subbranches = Vec::new();
        for sub in self.subbranches(bid) {
            let (_, host) = sub.bid().outer().expect("nested bid splits");
            if elements.contains_key(&host) {
                let inner = self.subtree(sub.bid(), sub.root_eid())?;
                subbranches.push(SubtreeBranch {
                    host,
                    index: sub.bid().last_index(),
                    branch: inner,
                });
            }
        }
        Ok(Subtree {
            root_eid: eid,
            elements,
            subbranches,
        })
    }

    /// Creates branch `new_bid` as a deep, eid-preserving copy of `subtree`,
    /// recursing into the nested branches the subtree captured.
    pub fn instantiate_branch(
        &mut self,
        new_bid: BranchId,
        subtree: &Subtree,
        predecessor: Option<(Revision, BranchId)>,
    ) -> MoverResult<()> {
        let mut elements = BTreeMap::new();
        for (&eid, content) in &subtree.elements {
            if eid == subtree.root_eid {
                elements.insert(eid, ElementContent::root(content.payload.clone()));
            } else {
                elements.insert(eid, content.clone());
            }
        }
        let tree = ElementTree::from_elements(subtree.root_eid, elements);
        self.insert_branch(BranchState::from_tree(new_bid.clone(), tree, predecessor));
        for sub in &subtree.subbranches {
            let nested_bid = new_bid.nested(sub.host, sub.index);
            self.instantiate_branch(nested_bid, &sub.branch, None)?;
        }
        Ok(())
    }

    /// Instantiates `subtree` as ordinary elements of the branch `dst_bid`,
    /// at `(dst_parent, name)`. Copied elements retain their eids; eids
    /// already present in the target are replaced. Nested branches captured
    /// by the subtree are re-hosted under `dst_bid`.
    pub fn copy_tree(
        &mut self,
        dst_bid: &BranchId,
        subtree: &Subtree,
        dst_parent: Eid,
        name: &str,
    ) -> MoverResult<()> {
        self.branch_mut(dst_bid)?
            .instantiate_subtree(subtree, dst_parent, name)?;
        for sub in &subtree.subbranches {
            let index = match self.subbranch_at(dst_bid, sub.host) {
                Some(existing) => existing.bid().last_index(),
                None => self.next_subbranch_index(dst_bid, sub.host),
            };
            let nested_bid = dst_bid.nested(sub.host, index);
            self.instantiate_branch(nested_bid, &sub.branch, None)?;
        }
        Ok(())
    }

    /// Whether this txn's branches differ from `base`'s: a branch added or
    /// dropped, or any element tree changed.
    pub fn is_changed(&self, base: &Self) -> bool {
        if !self.branches.keys().eq(base.branches.keys()) {
            return true;
        }
        self.branches
            .iter()
            .any(|(bid, branch)| base.branches[bid].tree() != branch.tree())
    }

    /// Rejects committing a branch (or any branch nested in it) whose tree
    /// still carries orphans, sibling-name clashes, or parent cycles.
    pub fn validate_branch(&self, bid: &BranchId) -> MoverResult<()> {
        let mut ids = vec![bid.clone()];
        ids.extend(
            self.branches
                .keys()
                .filter(|candidate| bid.encloses(candidate))
                .cloned(),
        );
        for checked in ids {
            let defects = self.branch(&checked)?.tree().defects();
            if !defects.is_clean() {
                return Err(MoverError::Branching(format!(
                    "branch {checked} is not committable: {} orphaned, {} name-clashed, {} cyclic",
                    defects.orphans.len(),
                    defects.name_clashes.len(),
                    defects.cycles.len(),
                )));
            }
        }
        Ok(())
    }
}
