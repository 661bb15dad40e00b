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

//! The remote-access provider interface, and an in-process provider.
//!
//! The core only ever talks to [`RemoteAccess`]; network waits would be
//! blocking calls behind it. [`MemoryRemote`] is the provider used by the
//! cli and the test suites: a shared in-memory repository, optionally
//! persisted through a [`BranchingStore`].

use std::collections::BTreeMap;

use bstr::BString;
use itertools::Itertools as _;

use crate::error::MoverError;
use crate::error::MoverResult;
use crate::migrate::MoveIndex;
use crate::migrate::PathEditor;
use crate::repos::RevProps;
use crate::repos::Repos;
use crate::repos::Revision;
use crate::store::BranchingStore;
use crate::store::decode_txn;
use crate::store::encode_txn;
use crate::txn::BranchTxn;

/// The capabilities the core requires of a remote repository session.
/// Provider errors surface unchanged to the caller.
pub trait RemoteAccess {
    /// Repository root URL, for display.
    fn repos_root(&self) -> String;

    fn latest_revision(&self) -> MoverResult<Revision>;

    /// The immutable base txn at `rev`, cloned for the caller to own.
    fn load_txn(&self, rev: Revision) -> MoverResult<BranchTxn>;

    fn revprops(&self, rev: Revision) -> MoverResult<RevProps>;

    /// Commits `txn` on top of `base_rev`, returning the new revision.
    /// Not cancellable once entered.
    fn commit(
        &mut self,
        base_rev: Revision,
        txn: BranchTxn,
        props: RevProps,
    ) -> MoverResult<Revision>;

    /// Drives `editor` with the legacy path-based deltas of revisions
    /// `r1..=r2`, closing the editor once per revision.
    fn replay_paths(
        &self,
        r1: Revision,
        r2: Revision,
        editor: &mut dyn PathEditor,
    ) -> MoverResult<()>;

    /// The move records of legacy revisions `r1..=r2`.
    fn moves(&self, r1: Revision, r2: Revision) -> MoverResult<MoveIndex>;
}

/// One path's content in a legacy (path-based) snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathEntry {
    Dir,
    File(BString),
}

/// Full path-keyed state of one legacy revision.
pub type PathSnapshot = BTreeMap<String, PathEntry>;

/// Legacy path-based history used as a migration source: snapshot per
/// revision (index = revision number) plus the recorded moves.
#[derive(Clone, Debug, Default)]
pub struct LegacyHistory {
    pub snapshots: Vec<PathSnapshot>,
    pub moves: MoveIndex,
}

/// In-process [`RemoteAccess`] provider.
pub struct MemoryRemote {
    url: String,
    repos: Repos,
    store: Option<Box<dyn BranchingStore>>,
    legacy: Option<LegacyHistory>,
}

impl MemoryRemote {
    /// Opens an ephemeral repository containing only revision 0.
    pub fn open(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            repos: Repos::new(),
            store: None,
            legacy: None,
        }
    }

    /// Opens a repository persisted through `store`: any revisions the
    /// store already holds are loaded back before the session starts.
    pub fn with_store(url: impl Into<String>, store: Box<dyn BranchingStore>) -> MoverResult<Self> {
        let mut remote = Self::open(url);
        let mut rev = Revision::new(1);
        while let Some(data) = store.load(rev)? {
            let (txn, props) = decode_txn(&data)?;
            remote.repos.append(txn, props);
            rev = rev.next();
        }
        remote.store = Some(store);
        Ok(remote)
    }

    /// Attaches a legacy path-based history to migrate from.
    pub fn with_legacy(mut self, legacy: LegacyHistory) -> Self {
        self.legacy = Some(legacy);
        self
    }

    pub fn repos(&self) -> &Repos {
        &self.repos
    }

    fn legacy(&self) -> MoverResult<&LegacyHistory> {
        self.legacy
            .as_ref()
            .ok_or_else(|| MoverError::Branching("repository has no legacy history".to_owned()))
    }

    fn legacy_snapshot(history: &LegacyHistory, rev: Revision) -> MoverResult<&PathSnapshot> {
        history
            .snapshots
            .get(rev.number() as usize)
            .ok_or(MoverError::NoSuchRevision(rev))
    }
}

impl RemoteAccess for MemoryRemote {
    fn repos_root(&self) -> String {
        self.url.clone()
    }

    fn latest_revision(&self) -> MoverResult<Revision> {
        Ok(self.repos.head())
    }

    fn load_txn(&self, rev: Revision) -> MoverResult<BranchTxn> {
        self.repos.txn(rev).cloned()
    }

    fn revprops(&self, rev: Revision) -> MoverResult<RevProps> {
        self.repos.revprops(rev).cloned()
    }

    fn commit(
        &mut self,
        base_rev: Revision,
        txn: BranchTxn,
        props: RevProps,
    ) -> MoverResult<Revision> {
        if base_rev != self.repos.head() {
            return Err(MoverError::Branching(format!(
                "commit is out of date: based on {base_rev}, head is {}",
                self.repos.head()
            )));
        }
        let rev = self.repos.append(txn, props.clone());
        if let Some(store) = &mut self.store {
            let data = encode_txn(self.repos.txn(rev)?, &props)?;
            store.save(rev, &data)?;
        }
        Ok(rev)
    }

    fn replay_paths(
        &self,
        r1: Revision,
        r2: Revision,
        editor: &mut dyn PathEditor,
    ) -> MoverResult<()> {
        let history = self.legacy()?;
        for number in r1.number()..=r2.number() {
            let rev = Revision::new(number);
            let previous = match rev.previous() {
                Some(prev) => Self::legacy_snapshot(history, prev)?.clone(),
                None => PathSnapshot::new(),
            };
            let current = Self::legacy_snapshot(history, rev)?;

            // Replaced paths (kind changed) are a delete plus an add.
            let mut deleted: Vec<&String> = previous
                .iter()
                .filter(|(path, entry)| {
                    current.get(*path).is_none_or(|now| {
                        matches!(
                            (entry, now),
                            (PathEntry::Dir, PathEntry::File(_)) | (PathEntry::File(_), PathEntry::Dir)
                        )
                    })
                })
                .map(|(path, _)| path)
                .collect();
            // Report only the topmost path of each deleted subtree.
            let roots: Vec<&String> = deleted
                .iter()
                .filter(|path| {
                    !deleted
                        .iter()
                        .any(|other| path.starts_with(&format!("{other}/")))
                })
                .copied()
                .collect();
            deleted = roots;

            for (path, entry) in current {
                match previous.get(path) {
                    None => match entry {
                        PathEntry::Dir => editor.add_dir(path)?,
                        PathEntry::File(text) => editor.add_file(path, text.as_ref())?,
                    },
                    Some(old) if old != entry => match (old, entry) {
                        (PathEntry::File(_), PathEntry::File(text)) => {
                            editor.modify_file(path, text.as_ref())?;
                        }
                        _ => match entry {
                            PathEntry::Dir => editor.add_dir(path)?,
                            PathEntry::File(text) => editor.add_file(path, text.as_ref())?,
                        },
                    },
                    Some(_) => {}
                }
            }
            for path in deleted {
                editor.delete(path)?;
            }
            editor.close_revision()?;
        }
        Ok(())
    }

    fn moves(&self, r1: Revision, r2: Revision) -> MoverResult<MoveIndex> {
        let history = self.legacy()?;
        Ok(history
            .moves
            .iter()
            .filter(|(rev, _)| (r1..=r2).contains(rev))
            .map(|(rev, moves)| (*rev, moves.clone()))
            .sorted_by_key(|(rev, _)| *rev)
            .collect())
    }
}
