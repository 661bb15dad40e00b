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

//! Branch identity and the per-branch mutable element tree.
//!
//! Branch nesting is encoded in the branch id string itself
//! (`B<n>.<eid>.<n'>…`), so the branch graph needs no owning back-pointers;
//! the outer branch and the hosting element are recovered by string split.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::str::FromStr;

use crate::element::Eid;
use crate::element::ElementContent;
use crate::element::ElementTree;
use crate::element::Payload;
use crate::error::MoverError;
use crate::error::MoverResult;
use crate::repos::Revision;

/// Textual identifier of a branch.
///
/// A top-level branch is `B<n>`. A branch hosted at element `<eid>` of an
/// enclosing branch appends `.<eid>.<n'>` to the outer id, recursively.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BranchId(String);

impl BranchId {
    pub fn top(index: u64) -> Self {
        Self(format!("B{index}"))
    }

    /// The id of the `index`-th branch hosted at element `host` of `self`.
    pub fn nested(&self, host: Eid, index: u64) -> Self {
        Self(format!("{}.{}.{index}", self.0, host.raw()))
    }

    /// Parses user input. The leading `B` is optional and inserted if
    /// omitted; the nested form must match `B<n>(.<eid>.<n'>)*`.
    pub fn parse(input: &str) -> MoverResult<Self> {
        let bad = || MoverError::IncorrectParams(format!("invalid branch id {input:?}"));
        let text = input.strip_prefix('B').unwrap_or(input);
        let segments: Vec<&str> = text.split('.').collect();
        if segments.is_empty() || segments.len() % 2 == 0 {
            return Err(bad());
        }
        for segment in &segments {
            if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(bad());
            }
        }
        Ok(Self(format!("B{text}")))
    }

    /// Recovers `(outer branch id, hosting eid)` for a nested branch id.
    pub fn outer(&self) -> Option<(Self, Eid)> {
        let (rest, _index) = self.0.rsplit_once('.')?;
        let (outer, host) = rest.rsplit_once('.')?;
        let host = Eid::from_str(host).ok()?;
        Some((Self(outer.to_owned()), host))
    }

    /// Index of the top-level ancestor, i.e. the `n` in `B<n>`.
    pub fn top_index(&self) -> u64 {
        let end = self.0.find('.').unwrap_or(self.0.len());
        self.0[1..end].parse().unwrap_or(0)
    }

    /// Trailing counter of this id (`n` for `B<n>`, `n'` for `….<eid>.<n'>`).
    pub fn last_index(&self) -> u64 {
        let start = self.0.rfind('.').map_or(1, |pos| pos + 1);
        self.0[start..].parse().unwrap_or(0)
    }

    pub fn nesting_level(&self) -> usize {
        self.0.matches('.').count() / 2
    }

    pub fn is_nested(&self) -> bool {
        self.0.contains('.')
    }

    /// Whether `self` encloses `other` (at any nesting depth).
    pub fn encloses(&self, other: &Self) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0) && other.0.as_bytes()[self.0.len()] == b'.'
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for BranchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// A deep, eid-preserving extraction of an element subtree, together with the
/// nested branches hosted inside it. Used by `branch` and `copy_tree`.
#[derive(Clone, Debug)]
pub struct Subtree {
    pub root_eid: Eid,
    pub elements: BTreeMap<Eid, ElementContent>,
    pub subbranches: Vec<SubtreeBranch>,
}

/// One nested branch captured inside a [`Subtree`].
#[derive(Clone, Debug)]
pub struct SubtreeBranch {
    /// The element of the outer tree hosting the nested branch.
    pub host: Eid,
    /// The trailing counter of the nested branch id.
    pub index: u64,
    /// The nested branch's whole tree, itself a subtree at its root.
    pub branch: Subtree,
}

/// One branch's mutable element tree within a txn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchState {
    bid: BranchId,
    predecessor: Option<(Revision, BranchId)>,
    tree: ElementTree,
}

impl BranchState {
    /// Creates a branch whose tree holds a single empty root directory.
    pub fn new(bid: BranchId, root_eid: Eid) -> Self {
        Self {
            bid,
            predecessor: None,
            tree: ElementTree::with_root(root_eid),
        }
    }

    pub fn from_tree(
        bid: BranchId,
        tree: ElementTree,
        predecessor: Option<(Revision, BranchId)>,
    ) -> Self {
        Self {
            bid,
            predecessor,
            tree,
        }
    }

    pub fn bid(&self) -> &BranchId {
        &self.bid
    }

    pub fn root_eid(&self) -> Eid {
        self.tree.root_eid()
    }

    pub fn predecessor(&self) -> Option<&(Revision, BranchId)> {
        self.predecessor.as_ref()
    }

    pub fn set_predecessor(&mut self, predecessor: Option<(Revision, BranchId)>) {
        self.predecessor = predecessor;
    }

    pub fn tree(&self) -> &ElementTree {
        &self.tree
    }

    /// Raw tree access for batch rewrites (replay, merge install, migration).
    /// Checked editing goes through [`alter`](Self::alter) and
    /// [`delete`](Self::delete).
    pub fn tree_mut(&mut self) -> &mut ElementTree {
        &mut self.tree
    }

    pub fn replace_tree(&mut self, tree: ElementTree) {
        self.tree = tree;
    }

    /// Sets or replaces the element at `eid`.
    ///
    /// Allowed for an existing eid (edit) or a fresh one (instantiate). The
    /// parent must be mapped, the root shape must be preserved, and the name
    /// must not clash with a different sibling still present in the tree.
    pub fn alter(
        &mut self,
        eid: Eid,
        parent: Option<Eid>,
        name: &str,
        payload: Payload,
    ) -> MoverResult<()> {
        let is_root = eid == self.tree.root_eid();
        if parent.is_none() != is_root || name.is_empty() != is_root {
            return Err(MoverError::IncorrectParams(format!(
                "element {eid} must {}be the branch root",
                if is_root { "" } else { "not " }
            )));
        }
        if name.contains('/') {
            return Err(MoverError::IncorrectParams(format!(
                "element name {name:?} must be a single path component"
            )));
        }
        if let Some(parent) = parent {
            if !self.tree.contains(parent) {
                return Err(MoverError::BadParent { parent });
            }
            if let Some(existing) = self.tree.child_by_name(parent, name) {
                if existing != eid {
                    return Err(MoverError::NameClash {
                        parent,
                        name: name.to_owned(),
                    });
                }
            }
        }
        let content = match parent {
            Some(parent) => ElementContent::new(parent, name, payload),
            None => ElementContent::root(payload),
        };
        self.tree.set(eid, content);
        Ok(())
    }

    /// Removes the element at `eid`. Children become orphans; deleting them
    /// in the same txn is legal. The branch root cannot be deleted.
    pub fn delete(&mut self, eid: Eid) -> MoverResult<ElementContent> {
        if eid == self.tree.root_eid() {
            return Err(MoverError::DeleteRoot { eid });
        }
        self.tree.remove(eid).ok_or(MoverError::ElementNotFound {
            bid: self.bid.clone(),
            eid,
        })
    }

    /// Removes the element at `eid` and every descendant reachable from it.
    pub fn delete_subtree(&mut self, eid: Eid) -> MoverResult<Vec<Eid>> {
        let collected = self
            .tree
            .closed_subtree(eid)
            .ok_or(MoverError::ElementNotFound {
                bid: self.bid.clone(),
                eid,
            })?;
        if collected.contains_key(&self.tree.root_eid()) {
            return Err(MoverError::DeleteRoot { eid });
        }
        let mut deleted: Vec<Eid> = collected.into_keys().collect();
        deleted.sort();
        for &gone in &deleted {
            self.tree.remove(gone);
        }
        Ok(deleted)
    }

    /// Instantiates `subtree`'s elements into this branch, preserving eids.
    /// If an eid already exists here, the copy replaces it. The subtree root
    /// is re-addressed to `(parent, name)`.
    pub fn instantiate_subtree(
        &mut self,
        subtree: &Subtree,
        parent: Eid,
        name: &str,
    ) -> MoverResult<()> {
        if !self.tree.contains(parent) {
            return Err(MoverError::BadParent { parent });
        }
        for (&eid, content) in &subtree.elements {
            if eid == subtree.root_eid {
                let content = ElementContent::new(parent, name, content.payload.clone());
                self.tree.set(eid, content);
            } else {
                self.tree.set(eid, content.clone());
            }
        }
        Ok(())
    }

    pub fn eid_at_path(&self, relpath: &str) -> MoverResult<Eid> {
        self.tree
            .eid_at_path(relpath)
            .ok_or_else(|| MoverError::PathNotFound {
                bid: self.bid.clone(),
                path: relpath.to_owned(),
            })
    }

    pub fn path_of_eid(&self, eid: Eid) -> Option<String> {
        self.tree.path_of_eid(eid)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use test_case::test_case;

    use super::*;

    #[test]
    fn bid_nesting_round_trips() {
        let outer = BranchId::top(0);
        let nested = outer.nested(Eid::new(3), 1);
        assert_eq!(nested.as_str(), "B0.3.1");
        assert_eq!(nested.outer(), Some((outer.clone(), Eid::new(3))));
        assert_eq!(nested.top_index(), 0);
        assert_eq!(nested.last_index(), 1);
        assert_eq!(nested.nesting_level(), 1);
        assert!(outer.outer().is_none());
        assert!(outer.encloses(&nested));
        assert!(!nested.encloses(&outer));
    }

    #[test_case("B0", "B0"; "plain")]
    #[test_case("0", "B0"; "leading b optional")]
    #[test_case("2.7.1", "B2.7.1"; "nested without prefix")]
    #[test_case("B1.5.0.9.2", "B1.5.0.9.2"; "doubly nested")]
    fn bid_parse_accepts(input: &str, expected: &str) {
        assert_eq!(BranchId::parse(input).unwrap().as_str(), expected);
    }

    #[test_case("B2.7"; "dangling host")]
    #[test_case("Bx"; "non numeric")]
    #[test_case(""; "empty")]
    #[test_case("B1..2"; "empty segment")]
    fn bid_parse_rejects(input: &str) {
        assert_matches!(
            BranchId::parse(input),
            Err(MoverError::IncorrectParams(_))
        );
    }

    #[test]
    fn encloses_requires_a_dot_boundary() {
        // B1 does not enclose B10.
        assert!(!BranchId::top(1).encloses(&BranchId::top(10)));
    }

    #[test]
    fn alter_checks_parent_and_name() {
        let mut branch = BranchState::new(BranchId::top(0), Eid::new(0));
        branch
            .alter(Eid::new(1), Some(Eid::new(0)), "A", Payload::dir())
            .unwrap();
        assert_matches!(
            branch.alter(Eid::new(2), Some(Eid::new(9)), "x", Payload::dir()),
            Err(MoverError::BadParent { .. })
        );
        assert_matches!(
            branch.alter(Eid::new(2), Some(Eid::new(0)), "A", Payload::dir()),
            Err(MoverError::NameClash { .. })
        );
        // Renaming the existing element onto its own name is an edit.
        branch
            .alter(Eid::new(1), Some(Eid::new(0)), "A", Payload::file("x"))
            .unwrap();
    }

    #[test]
    fn delete_root_is_refused() {
        let mut branch = BranchState::new(BranchId::top(0), Eid::new(0));
        assert_matches!(
            branch.delete(Eid::new(0)),
            Err(MoverError::DeleteRoot { .. })
        );
    }
}
