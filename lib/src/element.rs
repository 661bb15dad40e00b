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

//! The element-tree data model: stable element ids, element contents, and the
//! per-branch mapping from id to content.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::num::ParseIntError;
use std::str::FromStr;

use bstr::BStr;
use bstr::BString;

/// Stable identifier of a logical object across branches and revisions.
///
/// Unlike a path, an eid follows the element through renames and moves.
/// Non-negative ids are persistent; negative ids are reserved for transient
/// use inside an uncommitted transaction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Eid(i64);

impl Eid {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Whether this id is persistent across branches and revisions.
    pub const fn is_persistent(self) -> bool {
        self.0 >= 0
    }
}

impl Debug for Eid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Eid").field(&self.0).finish()
    }
}

impl fmt::Display for Eid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl FromStr for Eid {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('e').unwrap_or(s);
        digits.parse::<i64>().map(Self)
    }
}

/// Monotonic allocator producing fresh, txn-wide-unique element ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EidAllocator {
    next: i64,
}

impl EidAllocator {
    pub fn starting_at(next: i64) -> Self {
        Self { next }
    }

    pub fn allocate(&mut self) -> Eid {
        let eid = Eid(self.next);
        self.next += 1;
        eid
    }

    /// The raw value the next call to [`allocate`](Self::allocate) returns.
    pub fn next_raw(&self) -> i64 {
        self.next
    }

    /// Advances this allocator so that every id `other` has handed out is
    /// also considered taken here. A commit txn calls this with the edit
    /// txn's allocator so replayed elements keep their ids.
    pub fn catch_up_with(&mut self, other: &Self) {
        self.next = self.next.max(other.next);
    }
}

/// Property map of a dir or file element. Values are raw byte strings.
pub type Props = BTreeMap<String, BString>;

/// The contents of an element, excluding its tree position.
#[derive(Clone, PartialEq, Eq)]
pub enum Payload {
    Dir { props: Props },
    File { props: Props, text: BString },
    /// Marker payload of an element hosting a nested branch. The inner
    /// branch's own tree is kept on the corresponding [`BranchState`].
    ///
    /// [`BranchState`]: crate::branch::BranchState
    SubbranchRoot,
}

impl Payload {
    pub fn dir() -> Self {
        Self::Dir {
            props: Props::new(),
        }
    }

    pub fn file(text: impl Into<BString>) -> Self {
        Self::File {
            props: Props::new(),
            text: text.into(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Dir { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::File { .. })
    }

    pub fn is_subbranch_root(&self) -> bool {
        matches!(self, Self::SubbranchRoot)
    }

    pub fn props(&self) -> Option<&Props> {
        match self {
            Self::Dir { props } | Self::File { props, .. } => Some(props),
            Self::SubbranchRoot => None,
        }
    }

    pub fn props_mut(&mut self) -> Option<&mut Props> {
        match self {
            Self::Dir { props } | Self::File { props, .. } => Some(props),
            Self::SubbranchRoot => None,
        }
    }

    pub fn text(&self) -> Option<&BStr> {
        match self {
            Self::File { text, .. } => Some(text.as_ref()),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Dir { .. } => "dir",
            Self::File { .. } => "file",
            Self::SubbranchRoot => "subbranch-root",
        }
    }
}

impl Debug for Payload {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dir { props } => f.debug_struct("Dir").field("props", &props.len()).finish(),
            Self::File { props, text } => f
                .debug_struct("File")
                .field("props", &props.len())
                .field("text", &text.len())
                .finish(),
            Self::SubbranchRoot => write!(f, "SubbranchRoot"),
        }
    }
}

/// Immutable triple describing an element's tree position and contents.
///
/// `parent == None` iff `name` is empty iff the element is a branch root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementContent {
    pub parent: Option<Eid>,
    pub name: String,
    pub payload: Payload,
}

impl ElementContent {
    pub fn new(parent: Eid, name: impl Into<String>, payload: Payload) -> Self {
        Self {
            parent: Some(parent),
            name: name.into(),
            payload,
        }
    }

    pub fn root(payload: Payload) -> Self {
        Self {
            parent: None,
            name: String::new(),
            payload,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether the root-shape invariant holds: parentless iff unnamed.
    pub fn has_valid_shape(&self) -> bool {
        self.parent.is_none() == self.name.is_empty()
    }
}

/// Defects found by [`ElementTree::defects`]. A tree carrying defects may
/// exist during editing but may not be committed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeDefects {
    /// Elements whose parent eid is not mapped.
    pub orphans: Vec<Eid>,
    /// `(parent, name, eids)` groups where two or more siblings share a name.
    pub name_clashes: Vec<(Eid, String, Vec<Eid>)>,
    /// Elements whose parent chain never reaches the root.
    pub cycles: Vec<Eid>,
}

impl TreeDefects {
    pub fn is_clean(&self) -> bool {
        self.orphans.is_empty() && self.name_clashes.is_empty() && self.cycles.is_empty()
    }
}

/// Mapping from eid to [`ElementContent`] with a designated root.
///
/// The raw `set`/`remove` accessors deliberately allow transient orphans and
/// sibling-name clashes; batch rewrites (replay, migration) rely on that.
/// The checked editing operations live on
/// [`BranchState`](crate::branch::BranchState).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementTree {
    root_eid: Eid,
    elements: BTreeMap<Eid, ElementContent>,
}

impl ElementTree {
    /// Creates a tree containing only a root directory element.
    pub fn with_root(root_eid: Eid) -> Self {
        let mut elements = BTreeMap::new();
        elements.insert(root_eid, ElementContent::root(Payload::dir()));
        Self { root_eid, elements }
    }

    pub fn from_elements(root_eid: Eid, elements: BTreeMap<Eid, ElementContent>) -> Self {
        Self { root_eid, elements }
    }

    pub fn root_eid(&self) -> Eid {
        self.root_eid
    }

    pub fn get(&self, eid: Eid) -> Option<&ElementContent> {
        self.elements.get(&eid)
    }

    pub fn contains(&self, eid: Eid) -> bool {
        self.elements.contains_key(&eid)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Sets or replaces the element at `eid`. The previous content, if any,
    /// is dropped wholesale.
    pub fn set(&mut self, eid: Eid, content: ElementContent) {
        self.elements.insert(eid, content);
    }

    pub fn remove(&mut self, eid: Eid) -> Option<ElementContent> {
        self.elements.remove(&eid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Eid, &ElementContent)> + '_ {
        self.elements.iter().map(|(&eid, content)| (eid, content))
    }

    pub fn children_of(&self, parent: Eid) -> impl Iterator<Item = (Eid, &ElementContent)> + '_ {
        self.iter()
            .filter(move |(_, content)| content.parent == Some(parent))
    }

    pub fn child_by_name(&self, parent: Eid, name: &str) -> Option<Eid> {
        self.children_of(parent)
            .find(|(_, content)| content.name == name)
            .map(|(eid, _)| eid)
    }

    /// Resolves a repository relpath (no leading slash, `""` is the root)
    /// to an eid.
    pub fn eid_at_path(&self, relpath: &str) -> Option<Eid> {
        let mut eid = self.root_eid;
        for name in relpath.split('/').filter(|name| !name.is_empty()) {
            eid = self.child_by_name(eid, name)?;
        }
        Some(eid)
    }

    /// Returns the relpath of `eid`, or `None` if the element is missing or
    /// not path-reachable. The root maps to `""`.
    pub fn path_of_eid(&self, eid: Eid) -> Option<String> {
        let mut names = Vec::new();
        let mut cursor = eid;
        // Bounded by the element count so a corrupt parent cycle terminates.
        for _ in 0..=self.elements.len() {
            let content = self.get(cursor)?;
            match content.parent {
                None => {
                    names.reverse();
                    return Some(names.join("/"));
                }
                Some(parent) => {
                    names.push(content.name.clone());
                    cursor = parent;
                }
            }
        }
        None
    }

    pub fn is_reachable(&self, eid: Eid) -> bool {
        self.path_of_eid(eid).is_some()
    }

    /// Collects the element at `eid` together with all its descendants,
    /// preserving eids.
    pub fn closed_subtree(&self, eid: Eid) -> Option<BTreeMap<Eid, ElementContent>> {
        self.get(eid)?;
        let mut collected = BTreeMap::new();
        let mut queue = vec![eid];
        while let Some(cursor) = queue.pop() {
            if let Some(content) = self.get(cursor) {
                collected.insert(cursor, content.clone());
                queue.extend(self.children_of(cursor).map(|(child, _)| child));
            }
        }
        Some(collected)
    }

    /// Scans for orphans, sibling-name clashes, and parent cycles.
    pub fn defects(&self) -> TreeDefects {
        let mut defects = TreeDefects::default();

        for (eid, content) in self.iter() {
            if let Some(parent) = content.parent {
                if !self.contains(parent) {
                    defects.orphans.push(eid);
                } else if !self.is_reachable(eid) && self.contains(parent) {
                    // Parent chain exists locally but never reaches the root.
                    let chain_is_cyclic = {
                        let mut seen = BTreeSet::new();
                        let mut cursor = eid;
                        loop {
                            if !seen.insert(cursor) {
                                break true;
                            }
                            match self.get(cursor).and_then(|c| c.parent) {
                                Some(next) if self.contains(next) => cursor = next,
                                _ => break false,
                            }
                        }
                    };
                    if chain_is_cyclic {
                        defects.cycles.push(eid);
                    }
                }
            }
        }

        let mut by_parent_name: BTreeMap<(Eid, &str), Vec<Eid>> = BTreeMap::new();
        for (eid, content) in self.iter() {
            if let Some(parent) = content.parent {
                by_parent_name
                    .entry((parent, content.name.as_str()))
                    .or_default()
                    .push(eid);
            }
        }
        for ((parent, name), eids) in by_parent_name {
            if eids.len() > 1 {
                defects.name_clashes.push((parent, name.to_owned(), eids));
            }
        }

        defects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_children() -> ElementTree {
        let mut tree = ElementTree::with_root(Eid::new(0));
        tree.set(
            Eid::new(1),
            ElementContent::new(Eid::new(0), "A", Payload::dir()),
        );
        tree.set(
            Eid::new(2),
            ElementContent::new(Eid::new(1), "f", Payload::file("text\n")),
        );
        tree
    }

    #[test]
    fn path_resolution_round_trips() {
        let tree = tree_with_children();
        assert_eq!(tree.eid_at_path(""), Some(Eid::new(0)));
        assert_eq!(tree.eid_at_path("A"), Some(Eid::new(1)));
        assert_eq!(tree.eid_at_path("A/f"), Some(Eid::new(2)));
        assert_eq!(tree.eid_at_path("A/missing"), None);
        assert_eq!(tree.path_of_eid(Eid::new(2)).as_deref(), Some("A/f"));
        assert_eq!(tree.path_of_eid(Eid::new(0)).as_deref(), Some(""));
    }

    #[test]
    fn orphans_are_detected_but_tolerated() {
        let mut tree = tree_with_children();
        tree.remove(Eid::new(1));
        // The file's parent is gone; the tree still answers queries.
        assert!(!tree.is_reachable(Eid::new(2)));
        let defects = tree.defects();
        assert_eq!(defects.orphans, vec![Eid::new(2)]);
        assert!(defects.name_clashes.is_empty());
    }

    #[test]
    fn sibling_name_clash_is_reported() {
        let mut tree = tree_with_children();
        tree.set(
            Eid::new(3),
            ElementContent::new(Eid::new(0), "A", Payload::dir()),
        );
        let defects = tree.defects();
        assert_eq!(defects.name_clashes.len(), 1);
        let (parent, name, eids) = &defects.name_clashes[0];
        assert_eq!((*parent, name.as_str()), (Eid::new(0), "A"));
        assert_eq!(eids, &[Eid::new(1), Eid::new(3)]);
    }

    #[test]
    fn allocator_catch_up_is_idempotent() {
        let mut a = EidAllocator::starting_at(5);
        let mut b = a.clone();
        let x = b.allocate();
        let y = b.allocate();
        assert_eq!((x, y), (Eid::new(5), Eid::new(6)));
        a.catch_up_with(&b);
        a.catch_up_with(&b);
        assert_eq!(a.allocate(), Eid::new(7));
    }
}
