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

//! Rewrites a destination branch to reflect the delta between two source
//! branches, recursing into sub-branches.

use std::collections::BTreeMap;

use tracing::instrument;

use crate::branch::BranchId;
use crate::diff::element_differences;
use crate::element::Eid;
use crate::error::MoverResult;
use crate::repos::Revision;
use crate::txn::BranchTxn;

/// A source side of a replay: a branch within some txn. The txn is needed to
/// enumerate the branch's sub-branches.
pub type ReplaySide<'a> = (&'a BranchTxn, &'a BranchId);

#[derive(Clone, Debug)]
struct SubbranchPlan {
    left: Option<BranchId>,
    right: Option<(BranchId, Eid, Option<(Revision, BranchId)>)>,
    dst_bid: BranchId,
}

/// Makes `dst_bid` in `dst_txn` reflect the delta `left → right`. A `None`
/// side stands for an empty (absent) branch.
///
/// Element updates are applied in two passes, all alters before all deletes,
/// so acyclicity is never transiently violated. Sub-branches present on the
/// right are opened (re-nested under `dst_bid` and the hosting eid) and
/// replayed recursively; sub-branches present only on the left are dropped
/// together with their hosting elements.
///
/// Replay is idempotent, and `replay(L → R)` followed by `replay(R → L)`
/// restores the original tree.
#[instrument(skip_all, fields(dst = %dst_bid))]
pub fn replay(
    dst_txn: &mut BranchTxn,
    dst_bid: &BranchId,
    left: Option<ReplaySide<'_>>,
    right: Option<ReplaySide<'_>>,
) -> MoverResult<()> {
    let left_branch = left.map(|(txn, bid)| txn.branch(bid)).transpose()?;
    let right_branch = right.map(|(txn, bid)| txn.branch(bid)).transpose()?;

    let diffs = element_differences(
        left_branch.map(|branch| branch.tree()),
        right_branch.map(|branch| branch.tree()),
    );
    tracing::debug!(changes = diffs.len(), "applying element delta");

    {
        let dst = dst_txn.branch_mut(dst_bid)?;
        for diff in diffs.values() {
            if let Some(content) = &diff.right {
                dst.tree_mut().set(diff.eid, content.clone());
            }
        }
        for diff in diffs.values() {
            if diff.right.is_none() {
                dst.tree_mut().remove(diff.eid);
            }
        }
    }

    // Plan the sub-branch recursion first; the actual work mutates dst_txn.
    let mut plans: BTreeMap<Eid, SubbranchPlan> = BTreeMap::new();
    if let Some((txn, bid)) = left {
        for sub in txn.subbranches(bid) {
            let (_, host) = sub.bid().outer().expect("nested bid splits");
            plans.insert(
                host,
                SubbranchPlan {
                    left: Some(sub.bid().clone()),
                    right: None,
                    dst_bid: dst_bid.nested(host, sub.bid().last_index()),
                },
            );
        }
    }
    if let Some((txn, bid)) = right {
        for sub in txn.subbranches(bid) {
            let (_, host) = sub.bid().outer().expect("nested bid splits");
            let entry = plans.entry(host).or_insert(SubbranchPlan {
                left: None,
                right: None,
                dst_bid: dst_bid.nested(host, sub.bid().last_index()),
            });
            entry.right = Some((
                sub.bid().clone(),
                sub.root_eid(),
                sub.predecessor().cloned(),
            ));
            entry.dst_bid = dst_bid.nested(host, sub.bid().last_index());
        }
    }

    for plan in plans.values() {
        match &plan.right {
            Some((right_sub_bid, root_eid, predecessor)) => {
                dst_txn.open_branch(predecessor.clone(), plan.dst_bid.clone(), *root_eid);
                let left_side = match (&plan.left, left) {
                    (Some(left_sub_bid), Some((left_txn, _))) => Some((left_txn, left_sub_bid)),
                    _ => None,
                };
                let right_side = right.map(|(right_txn, _)| (right_txn, right_sub_bid));
                replay(dst_txn, &plan.dst_bid, left_side, right_side)?;
            }
            None => {
                // Hosting element was removed above; drop the branch too.
                dst_txn.remove_branch_recursive(&plan.dst_bid);
            }
        }
    }

    Ok(())
}
