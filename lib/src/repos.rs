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

//! The read-only catalog of committed transactions, by revision.

use std::fmt;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::branch::BranchId;
use crate::branch::BranchState;
use crate::element::Eid;
use crate::error::MoverError;
use crate::error::MoverResult;
use crate::txn::BranchTxn;

/// A committed revision number. Revision 0 is the implicit empty revision
/// every repository starts with.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u64);

impl Revision {
    pub const fn new(number: u64) -> Self {
        Self(number)
    }

    pub const fn number(self) -> u64 {
        self.0
    }

    pub fn previous(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Debug for Revision {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Revision").field(&self.0).finish()
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl FromStr for Revision {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('r').unwrap_or(s);
        digits.parse::<u64>().map(Self)
    }
}

/// Revision properties. Insertion order is preserved for display.
pub type RevProps = IndexMap<String, String>;

/// Append-only mapping from revision to an immutable [`BranchTxn`].
#[derive(Clone, Debug)]
pub struct Repos {
    txns: Vec<BranchTxn>,
    revprops: Vec<RevProps>,
}

impl Repos {
    /// A repository containing only revision 0.
    pub fn new() -> Self {
        Self {
            txns: vec![BranchTxn::initial()],
            revprops: vec![RevProps::new()],
        }
    }

    pub fn head(&self) -> Revision {
        Revision::new((self.txns.len() - 1) as u64)
    }

    pub fn txn(&self, rev: Revision) -> MoverResult<&BranchTxn> {
        self.txns
            .get(rev.number() as usize)
            .ok_or(MoverError::NoSuchRevision(rev))
    }

    pub fn revprops(&self, rev: Revision) -> MoverResult<&RevProps> {
        self.revprops
            .get(rev.number() as usize)
            .ok_or(MoverError::NoSuchRevision(rev))
    }

    pub fn get_branch_by_id(&self, rev: Revision, bid: &BranchId) -> MoverResult<&BranchState> {
        self.txn(rev)?.branch(bid)
    }

    /// Resolves `(rev, bid, relpath)` to the eid at that path, if present.
    pub fn find_el_rev_by_path_rev(
        &self,
        rev: Revision,
        bid: &BranchId,
        relpath: &str,
    ) -> MoverResult<Option<Eid>> {
        let branch = self.get_branch_by_id(rev, bid)?;
        Ok(branch.tree().eid_at_path(relpath))
    }

    /// Appends a committed txn, returning the new revision number.
    pub fn append(&mut self, mut txn: BranchTxn, props: RevProps) -> Revision {
        txn.set_base_rev(Some(self.head()));
        self.txns.push(txn);
        self.revprops.push(props);
        self.head()
    }
}

impl Default for Repos {
    fn default() -> Self {
        Self::new()
    }
}
