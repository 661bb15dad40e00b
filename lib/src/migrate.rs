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

//! Migration of legacy path-based history into element-based history.
//!
//! The editor consumes path-keyed deltas for one source revision and applies
//! them as element operations. The externally provided move index is what
//! turns a delete/add pair into a single element keeping its eid.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use bstr::BStr;
use bstr::BString;
use tracing::instrument;

use crate::branch::BranchId;
use crate::element::Eid;
use crate::element::ElementContent;
use crate::element::ElementTree;
use crate::element::Payload;
use crate::error::MoverError;
use crate::error::MoverResult;
use crate::repos::Revision;
use crate::txn::BranchTxn;

/// One recorded move in the legacy history: `source` was deleted and
/// `target` added in the same revision, denoting one logical object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveInfo {
    pub source: String,
    pub target: String,
    /// Revision the target was copied from, when the legacy history
    /// expressed the move as copy-and-delete.
    pub copyfrom_rev: Option<Revision>,
}

/// Move records per legacy revision, as served by the remote layer.
pub type MoveIndex = BTreeMap<Revision, Vec<MoveInfo>>;

/// The behavioral contract of the migration editor: path-keyed operations
/// driven by the remote layer's replay of one or more legacy revisions.
pub trait PathEditor {
    fn add_dir(&mut self, path: &str) -> MoverResult<()>;
    fn add_file(&mut self, path: &str, text: &BStr) -> MoverResult<()>;
    fn modify_file(&mut self, path: &str, text: &BStr) -> MoverResult<()>;
    fn delete(&mut self, path: &str) -> MoverResult<()>;
    /// Applies everything buffered for the current revision.
    fn close_revision(&mut self) -> MoverResult<()>;
}

#[derive(Clone, Debug)]
enum PathOp {
    AddDir(String),
    AddFile(String, BString),
    ModifyFile(String, BString),
    Delete(String),
}

fn split_parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}

/// Adapts path-based deltas onto one branch of an element txn.
///
/// Operations are buffered and applied at `close_revision` in a fixed order
/// (adds parents-first, then content modifications, then deletes), so the
/// editor does not depend on the order the driver discovers paths in.
pub struct MigrationEditor<'a> {
    txn: &'a mut BranchTxn,
    bid: BranchId,
    moves: Vec<MoveInfo>,
    pending: Vec<PathOp>,
}

impl<'a> MigrationEditor<'a> {
    pub fn new(txn: &'a mut BranchTxn, bid: BranchId, moves: &[MoveInfo]) -> Self {
        Self {
            txn,
            bid,
            moves: moves.to_vec(),
            pending: Vec::new(),
        }
    }

    /// Resolves the pre-state eid a path inherits through the move index:
    /// either the path is itself a move target, or it sits inside a moved
    /// directory and inherits by relative path under the source.
    fn move_source_eid(&self, pre: &ElementTree, path: &str) -> Option<Eid> {
        for mv in &self.moves {
            if path == mv.target {
                return pre.eid_at_path(&mv.source);
            }
            if let Some(rest) = path.strip_prefix(mv.target.as_str()) {
                if let Some(rest) = rest.strip_prefix('/') {
                    let source_path = format!("{}/{rest}", mv.source);
                    if let Some(eid) = pre.eid_at_path(&source_path) {
                        return Some(eid);
                    }
                }
            }
        }
        None
    }

    #[instrument(skip_all, fields(bid = %self.bid, ops = self.pending.len()))]
    fn apply(&mut self) -> MoverResult<()> {
        let pending = std::mem::take(&mut self.pending);
        let pre = self.txn.branch(&self.bid)?.tree().clone();
        let mut moved_eids: BTreeSet<Eid> = BTreeSet::new();

        // Adds, parents before children.
        let mut adds: Vec<&PathOp> = pending
            .iter()
            .filter(|op| matches!(op, PathOp::AddDir(_) | PathOp::AddFile(..)))
            .collect();
        adds.sort_by_key(|op| match op {
            PathOp::AddDir(path) | PathOp::AddFile(path, _) => {
                (path.matches('/').count(), path.clone())
            }
            _ => unreachable!(),
        });
        for op in adds {
            let (path, payload) = match op {
                PathOp::AddDir(path) => (path, Payload::dir()),
                PathOp::AddFile(path, text) => (path, Payload::file(text.clone())),
                _ => unreachable!(),
            };
            let (parent_path, name) = split_parent(path);
            let parent = self.txn.branch(&self.bid)?.eid_at_path(parent_path)?;
            let eid = match self.move_source_eid(&pre, path) {
                Some(eid) => {
                    moved_eids.insert(eid);
                    eid
                }
                None => self.txn.new_eid(),
            };
            // Raw set: a replaced path clashes with the old element until
            // the delete half of the delta lands below.
            self.txn
                .branch_mut(&self.bid)?
                .tree_mut()
                .set(eid, ElementContent::new(parent, name, payload));
        }

        // Content modifications against the post-add tree.
        for op in &pending {
            if let PathOp::ModifyFile(path, text) = op {
                let branch = self.txn.branch_mut(&self.bid)?;
                let eid = branch.eid_at_path(path)?;
                let content = branch.tree().get(eid).expect("eid just resolved");
                let props = content
                    .payload
                    .props()
                    .cloned()
                    .unwrap_or_default();
                let parent = content.parent.ok_or_else(|| {
                    MoverError::Branching(format!("cannot modify the branch root at {path:?}"))
                })?;
                let name = content.name.clone();
                let payload = Payload::File {
                    props,
                    text: text.clone(),
                };
                branch
                    .tree_mut()
                    .set(eid, ElementContent::new(parent, name, payload));
            }
        }

        // Deletes, resolved against the pre-state; elements that moved away
        // under a recorded move are left alone.
        for op in &pending {
            if let PathOp::Delete(path) = op {
                let Some(eid) = pre.eid_at_path(path) else {
                    return Err(MoverError::PathNotFound {
                        bid: self.bid.clone(),
                        path: path.clone(),
                    });
                };
                let doomed = pre.closed_subtree(eid).expect("eid resolved in pre-state");
                let branch = self.txn.branch_mut(&self.bid)?;
                for gone in doomed.keys() {
                    if !moved_eids.contains(gone) {
                        branch.tree_mut().remove(*gone);
                    }
                }
            }
        }

        Ok(())
    }
}

impl PathEditor for MigrationEditor<'_> {
    fn add_dir(&mut self, path: &str) -> MoverResult<()> {
        self.pending.push(PathOp::AddDir(path.to_owned()));
        Ok(())
    }

    fn add_file(&mut self, path: &str, text: &BStr) -> MoverResult<()> {
        self.pending
            .push(PathOp::AddFile(path.to_owned(), text.to_owned()));
        Ok(())
    }

    fn modify_file(&mut self, path: &str, text: &BStr) -> MoverResult<()> {
        self.pending
            .push(PathOp::ModifyFile(path.to_owned(), text.to_owned()));
        Ok(())
    }

    fn delete(&mut self, path: &str) -> MoverResult<()> {
        self.pending.push(PathOp::Delete(path.to_owned()));
        Ok(())
    }

    fn close_revision(&mut self) -> MoverResult<()> {
        self.apply()
    }
}
