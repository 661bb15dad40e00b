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

//! Three-way merge over element trees.
//!
//! For every element the merge works attribute-wise over `(parent, name,
//! payload)`: a side that left an attribute at its ancestor value yields to
//! the side that changed it. Residual disagreements are classified into a
//! typed [`ConflictReport`] instead of being smeared into the target.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use tracing::instrument;

use crate::branch::BranchId;
use crate::element::Eid;
use crate::element::ElementContent;
use crate::element::ElementTree;
use crate::error::MoverResult;
use crate::txn::BranchTxn;

/// A side of a merge: a branch within some txn.
pub type MergeSide<'a> = (&'a BranchTxn, &'a BranchId);

/// The same element was changed incompatibly on both sides (including
/// deleted on one side and modified on the other).
#[derive(Clone, Debug)]
pub struct SingleElementConflict {
    pub yca: Option<ElementContent>,
    pub src: Option<ElementContent>,
    pub tgt: Option<ElementContent>,
}

impl SingleElementConflict {
    pub fn is_delete_vs_modify(&self) -> bool {
        self.src.is_none() != self.tgt.is_none()
    }
}

/// Two distinct elements ended up as same-named children of one parent.
#[derive(Clone, Debug)]
pub struct NameClashConflict {
    pub parent: Eid,
    pub name: String,
    pub eids: Vec<Eid>,
}

/// An element whose parent is missing from the merged tree.
#[derive(Clone, Debug)]
pub struct OrphanConflict {
    pub missing_parent: Eid,
}

/// Structured outcome of a merge. Empty means the merge was committed to the
/// target; otherwise the conflicted branch was left unchanged.
#[derive(Clone, Debug, Default)]
pub struct ConflictReport {
    pub single_element: BTreeMap<Eid, SingleElementConflict>,
    pub name_clash: BTreeMap<(Eid, String), NameClashConflict>,
    pub orphan: BTreeMap<Eid, OrphanConflict>,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.single_element.is_empty() && self.name_clash.is_empty() && self.orphan.is_empty()
    }

    pub fn absorb(&mut self, other: Self) {
        self.single_element.extend(other.single_element);
        self.name_clash.extend(other.name_clash);
        self.orphan.extend(other.orphan);
    }

    /// One-line summary of the conflict counts.
    pub fn summary(&self) -> String {
        format!(
            "{} single-element, {} name-clash, {} orphan conflicts",
            self.single_element.len(),
            self.name_clash.len(),
            self.orphan.len(),
        )
    }
}

/// Merges one attribute: a side still at the ancestor value yields to the
/// other side; with no ancestor the sides must agree.
fn merge_attribute<T: Clone + Eq>(src: &T, tgt: &T, yca: Option<&T>) -> Option<T> {
    match yca {
        Some(ancestor) => {
            if src == ancestor {
                Some(tgt.clone())
            } else if tgt == ancestor || src == tgt {
                Some(src.clone())
            } else {
                None
            }
        }
        None => (src == tgt).then(|| src.clone()),
    }
}

fn merge_contents(
    src: &ElementContent,
    tgt: &ElementContent,
    yca: Option<&ElementContent>,
) -> Option<ElementContent> {
    let parent = merge_attribute(&src.parent, &tgt.parent, yca.map(|content| &content.parent))?;
    let name = merge_attribute(&src.name, &tgt.name, yca.map(|content| &content.name))?;
    let payload = merge_attribute(
        &src.payload,
        &tgt.payload,
        yca.map(|content| &content.payload),
    )?;
    Some(ElementContent {
        parent,
        name,
        payload,
    })
}

fn whole_tree_checks(candidate: &ElementTree, report: &mut ConflictReport) {
    let mut by_parent_name: BTreeMap<(Eid, String), Vec<Eid>> = BTreeMap::new();
    for (eid, content) in candidate.iter() {
        if let Some(parent) = content.parent {
            by_parent_name
                .entry((parent, content.name.clone()))
                .or_default()
                .push(eid);
            if !candidate.contains(parent) {
                report.orphan.insert(
                    eid,
                    OrphanConflict {
                        missing_parent: parent,
                    },
                );
            }
        }
    }
    for ((parent, name), eids) in by_parent_name {
        if eids.len() > 1 {
            report.name_clash.insert(
                (parent, name.clone()),
                NameClashConflict { parent, name, eids },
            );
        }
    }
}

/// Merges `src` into the target branch `tgt_bid` of `dst_txn`, with `yca` as
/// the common ancestor, then recurses into sub-branches matched by hosting
/// eid. Each branch is committed or left unchanged atomically on its own;
/// the returned report aggregates all of them.
#[instrument(skip_all, fields(tgt = %tgt_bid))]
pub fn merge_branches(
    dst_txn: &mut BranchTxn,
    tgt_bid: &BranchId,
    src: MergeSide<'_>,
    yca: MergeSide<'_>,
) -> MoverResult<ConflictReport> {
    let src_tree = src.0.branch(src.1)?.tree();
    let yca_tree = yca.0.branch(yca.1)?.tree();
    let tgt_tree = dst_txn.branch(tgt_bid)?.tree();

    let mut report = ConflictReport::default();
    let mut candidate = tgt_tree.clone();

    let mut eids = BTreeSet::new();
    eids.extend(yca_tree.iter().map(|(eid, _)| eid));
    eids.extend(src_tree.iter().map(|(eid, _)| eid));
    eids.extend(tgt_tree.iter().map(|(eid, _)| eid));

    for eid in eids {
        let e_yca = yca_tree.get(eid);
        let e_src = src_tree.get(eid);
        let e_tgt = tgt_tree.get(eid);

        if e_src == e_yca || e_src == e_tgt {
            // Source unchanged, or both sides made the identical change:
            // the target already has the answer.
            continue;
        }
        if e_tgt == e_yca {
            // Target unchanged: take the source side.
            match e_src {
                Some(content) => candidate.set(eid, content.clone()),
                None => {
                    candidate.remove(eid);
                }
            }
            continue;
        }

        let merged = match (e_src, e_tgt) {
            (Some(src_content), Some(tgt_content)) => {
                merge_contents(src_content, tgt_content, e_yca)
            }
            // Deleted on one side, modified on the other.
            _ => None,
        };
        match merged {
            Some(content) => candidate.set(eid, content),
            None => {
                report.single_element.insert(
                    eid,
                    SingleElementConflict {
                        yca: e_yca.cloned(),
                        src: e_src.cloned(),
                        tgt: e_tgt.cloned(),
                    },
                );
            }
        }
    }

    whole_tree_checks(&candidate, &mut report);

    let installed = report.is_empty();
    if installed {
        dst_txn.branch_mut(tgt_bid)?.replace_tree(candidate.clone());
    } else {
        tracing::debug!(summary = %report.summary(), "leaving target branch unchanged");
    }

    // Recurse into sub-branches, matched across the sides by hosting eid.
    let effective = if installed {
        candidate
    } else {
        dst_txn.branch(tgt_bid)?.tree().clone()
    };
    let hosts: Vec<Eid> = effective
        .iter()
        .filter(|(_, content)| content.payload.is_subbranch_root())
        .map(|(eid, _)| eid)
        .collect();

    for host in hosts {
        let tgt_sub = dst_txn
            .subbranch_at(tgt_bid, host)
            .map(|branch| branch.bid().clone());
        let src_sub = src
            .0
            .subbranch_at(src.1, host)
            .map(|branch| branch.bid().clone());
        let yca_sub = yca
            .0
            .subbranch_at(yca.1, host)
            .map(|branch| branch.bid().clone());

        match (tgt_sub, src_sub, yca_sub) {
            (Some(tgt_sub), Some(src_sub), Some(yca_sub)) => {
                let inner =
                    merge_branches(dst_txn, &tgt_sub, (src.0, &src_sub), (yca.0, &yca_sub))?;
                report.absorb(inner);
            }
            (None, Some(src_sub), None) => {
                // The source introduced the sub-branch along with its
                // hosting element; bring the whole branch over.
                let src_branch = src.0.branch(&src_sub)?;
                let subtree = src.0.subtree(&src_sub, src_branch.root_eid())?;
                let nested_bid = tgt_bid.nested(host, src_sub.last_index());
                dst_txn.instantiate_branch(nested_bid, &subtree, None)?;
            }
            // Sub-branch only on the target (or dropped by the source):
            // the element-level merge already decided the hosting element,
            // keep the target's branch as-is.
            _ => {}
        }
    }

    Ok(report)
}
