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

//! Pairwise element comparison producing per-eid change records.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use itertools::Itertools as _;

use crate::element::Eid;
use crate::element::ElementContent;
use crate::element::ElementTree;

/// Coarse classification of an [`ElementDiff`] for notification output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiffStatus {
    Added,
    Deleted,
    /// Present on both sides with a changed parent or name.
    Moved,
    /// Present on both sides with only the payload changed.
    Modified,
}

/// One eid on which two trees disagree. Either side may be absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementDiff {
    pub eid: Eid,
    pub left: Option<ElementContent>,
    pub right: Option<ElementContent>,
}

impl ElementDiff {
    pub fn is_add(&self) -> bool {
        self.left.is_none() && self.right.is_some()
    }

    pub fn is_delete(&self) -> bool {
        self.left.is_some() && self.right.is_none()
    }

    fn both(&self) -> Option<(&ElementContent, &ElementContent)> {
        Some((self.left.as_ref()?, self.right.as_ref()?))
    }

    /// The element's parent changed.
    pub fn reparented(&self) -> bool {
        self.both().is_some_and(|(l, r)| l.parent != r.parent)
    }

    /// The element's name changed.
    pub fn renamed(&self) -> bool {
        self.both().is_some_and(|(l, r)| l.name != r.name)
    }

    /// The element's payload changed.
    pub fn modified(&self) -> bool {
        self.both().is_some_and(|(l, r)| l.payload != r.payload)
    }

    pub fn status(&self) -> DiffStatus {
        if self.is_add() {
            DiffStatus::Added
        } else if self.is_delete() {
            DiffStatus::Deleted
        } else if self.reparented() || self.renamed() {
            DiffStatus::Moved
        } else {
            DiffStatus::Modified
        }
    }
}

/// Yields a record for every eid where `left` and `right` disagree. A `None`
/// tree is treated as empty, so the result against `None` lists every
/// element of the other side.
///
/// Equality is structural over `(parent, name, payload)`, byte-exact on
/// props and text. Two invocations over the same unchanged pair yield
/// identical results.
pub fn element_differences(
    left: Option<&ElementTree>,
    right: Option<&ElementTree>,
) -> BTreeMap<Eid, ElementDiff> {
    let mut eids = BTreeSet::new();
    if let Some(tree) = left {
        eids.extend(tree.iter().map(|(eid, _)| eid));
    }
    if let Some(tree) = right {
        eids.extend(tree.iter().map(|(eid, _)| eid));
    }

    let mut diffs = BTreeMap::new();
    for eid in eids {
        let l = left.and_then(|tree| tree.get(eid));
        let r = right.and_then(|tree| tree.get(eid));
        if l != r {
            diffs.insert(
                eid,
                ElementDiff {
                    eid,
                    left: l.cloned(),
                    right: r.cloned(),
                },
            );
        }
    }
    diffs
}

/// An [`ElementDiff`] prepared for display: addressed by its major path,
/// with the origin path of a move and the subsumed-deletion marker resolved.
#[derive(Clone, Debug)]
pub struct DiffDisplayItem {
    pub diff: ElementDiff,
    /// Right-side path when present, else the left-side path.
    pub major_path: String,
    /// Left-side path of a moved element, for `(from …)` annotations.
    pub from_path: Option<String>,
    /// Deletion whose parent is deleted too; rendered less salient.
    pub subsumed: bool,
}

fn path_or_placeholder(tree: Option<&ElementTree>, eid: Eid) -> String {
    tree.and_then(|tree| tree.path_of_eid(eid))
        .unwrap_or_else(|| format!("<{eid}>"))
}

/// Orders diffs for display: all deletions first, then modifications and
/// additions, each group sorted by major path.
pub fn display_order(
    diffs: &BTreeMap<Eid, ElementDiff>,
    left: Option<&ElementTree>,
    right: Option<&ElementTree>,
) -> Vec<DiffDisplayItem> {
    let deleted: BTreeSet<Eid> = diffs
        .values()
        .filter(|diff| diff.is_delete())
        .map(|diff| diff.eid)
        .collect();

    let items = diffs.values().map(|diff| {
        let major_path = if diff.right.is_some() {
            path_or_placeholder(right, diff.eid)
        } else {
            path_or_placeholder(left, diff.eid)
        };
        let from_path = (diff.reparented() || diff.renamed())
            .then(|| path_or_placeholder(left, diff.eid));
        let subsumed = diff.is_delete()
            && diff
                .left
                .as_ref()
                .and_then(|content| content.parent)
                .is_some_and(|parent| deleted.contains(&parent));
        DiffDisplayItem {
            diff: diff.clone(),
            major_path,
            from_path,
            subsumed,
        }
    });

    items
        .sorted_by_key(|item| (!item.diff.is_delete(), item.major_path.clone()))
        .collect()
}
