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

//! Branching-state persistence.
//!
//! The core treats storage as an opaque `(revision → bytes)` key-value
//! store with two interchangeable backends: a directory of per-revision
//! files, and per-revision unversioned properties held by the remote side.
//! The encoding (JSON) is this provider's choice, not part of the contract.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;

use bstr::BString;
use serde::Deserialize;
use serde::Serialize;

use crate::branch::BranchId;
use crate::branch::BranchState;
use crate::element::Eid;
use crate::element::EidAllocator;
use crate::element::ElementContent;
use crate::element::ElementTree;
use crate::element::Payload;
use crate::element::Props;
use crate::error::MoverError;
use crate::error::MoverResult;
use crate::repos::RevProps;
use crate::repos::Revision;
use crate::txn::BranchTxn;

/// Opaque per-revision byte store for branching state.
pub trait BranchingStore {
    fn load(&self, rev: Revision) -> MoverResult<Option<Vec<u8>>>;
    fn save(&mut self, rev: Revision, data: &[u8]) -> MoverResult<()>;
}

/// Backend (a): a directory holding one file per revision.
#[derive(Debug)]
pub struct FileBranchingStore {
    dir: PathBuf,
}

impl FileBranchingStore {
    pub fn open(dir: impl Into<PathBuf>) -> MoverResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| MoverError::Store { source })?;
        Ok(Self { dir })
    }

    fn file_for(&self, rev: Revision) -> PathBuf {
        self.dir.join(format!("r{}.json", rev.number()))
    }
}

impl BranchingStore for FileBranchingStore {
    fn load(&self, rev: Revision) -> MoverResult<Option<Vec<u8>>> {
        match fs::read(self.file_for(rev)) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(MoverError::Store { source }),
        }
    }

    fn save(&mut self, rev: Revision, data: &[u8]) -> MoverResult<()> {
        fs::write(self.file_for(rev), data).map_err(|source| MoverError::Store { source })
    }
}

/// Backend (b): per-revision unversioned properties on the target,
/// represented as a shared property table the remote session also sees.
#[derive(Clone, Debug, Default)]
pub struct RevpropBranchingStore {
    table: Arc<Mutex<BTreeMap<u64, Vec<u8>>>>,
}

impl RevpropBranchingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A second handle onto the same property table.
    pub fn handle(&self) -> Self {
        self.clone()
    }
}

impl BranchingStore for RevpropBranchingStore {
    fn load(&self, rev: Revision) -> MoverResult<Option<Vec<u8>>> {
        let table = self.table.lock().expect("revprop table poisoned");
        Ok(table.get(&rev.number()).cloned())
    }

    fn save(&mut self, rev: Revision, data: &[u8]) -> MoverResult<()> {
        let mut table = self.table.lock().expect("revprop table poisoned");
        table.insert(rev.number(), data.to_vec());
        Ok(())
    }
}

// Eids are stored in their textual form; a stored id that does not parse is
// surfaced as a distinct error so corruption is tellable from absence.

#[derive(Serialize, Deserialize)]
struct StoredTxn {
    base_rev: Option<u64>,
    next_eid: i64,
    branches: Vec<StoredBranch>,
    revprops: Vec<(String, String)>,
}

#[derive(Serialize, Deserialize)]
struct StoredBranch {
    bid: String,
    predecessor: Option<(u64, String)>,
    root_eid: String,
    elements: Vec<StoredElement>,
}

#[derive(Serialize, Deserialize)]
struct StoredElement {
    eid: String,
    parent: Option<String>,
    name: String,
    payload: StoredPayload,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum StoredPayload {
    Dir { props: Vec<(String, BString)> },
    File { props: Vec<(String, BString)>, text: BString },
    SubbranchRoot,
}

fn parse_stored_eid(text: &str) -> MoverResult<Eid> {
    Eid::from_str(text).map_err(|_| MoverError::StoredEidInvalid {
        text: text.to_owned(),
    })
}

fn store_payload(payload: &Payload) -> StoredPayload {
    let props_vec = |props: &Props| {
        props
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    };
    match payload {
        Payload::Dir { props } => StoredPayload::Dir {
            props: props_vec(props),
        },
        Payload::File { props, text } => StoredPayload::File {
            props: props_vec(props),
            text: text.clone(),
        },
        Payload::SubbranchRoot => StoredPayload::SubbranchRoot,
    }
}

fn load_payload(payload: StoredPayload) -> Payload {
    match payload {
        StoredPayload::Dir { props } => Payload::Dir {
            props: props.into_iter().collect(),
        },
        StoredPayload::File { props, text } => Payload::File {
            props: props.into_iter().collect(),
            text,
        },
        StoredPayload::SubbranchRoot => Payload::SubbranchRoot,
    }
}

/// Encodes a committed txn and its revision properties.
pub fn encode_txn(txn: &BranchTxn, props: &RevProps) -> MoverResult<Vec<u8>> {
    let branches = txn
        .branches()
        .map(|branch| StoredBranch {
            bid: branch.bid().to_string(),
            predecessor: branch
                .predecessor()
                .map(|(rev, bid)| (rev.number(), bid.to_string())),
            root_eid: branch.root_eid().raw().to_string(),
            elements: branch
                .tree()
                .iter()
                .map(|(eid, content)| StoredElement {
                    eid: eid.raw().to_string(),
                    parent: content.parent.map(|parent| parent.raw().to_string()),
                    name: content.name.clone(),
                    payload: store_payload(&content.payload),
                })
                .collect(),
        })
        .collect();
    let stored = StoredTxn {
        base_rev: txn.base_rev().map(Revision::number),
        next_eid: txn.eids().next_raw(),
        branches,
        revprops: props
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    };
    serde_json::to_vec_pretty(&stored).map_err(|source| MoverError::StoreDecode { source })
}

/// Decodes bytes produced by [`encode_txn`].
pub fn decode_txn(data: &[u8]) -> MoverResult<(BranchTxn, RevProps)> {
    let stored: StoredTxn =
        serde_json::from_slice(data).map_err(|source| MoverError::StoreDecode { source })?;
    let mut txn = BranchTxn::new(
        stored.base_rev.map(Revision::new),
        EidAllocator::starting_at(stored.next_eid),
    );
    for branch in stored.branches {
        let bid = BranchId::parse(&branch.bid)?;
        let root_eid = parse_stored_eid(&branch.root_eid)?;
        let mut elements = BTreeMap::new();
        for element in branch.elements {
            let eid = parse_stored_eid(&element.eid)?;
            let parent = element
                .parent
                .as_deref()
                .map(parse_stored_eid)
                .transpose()?;
            let content = ElementContent {
                parent,
                name: element.name,
                payload: load_payload(element.payload),
            };
            elements.insert(eid, content);
        }
        let tree = ElementTree::from_elements(root_eid, elements);
        let predecessor = branch
            .predecessor
            .map(|(rev, bid)| MoverResult::Ok((Revision::new(rev), BranchId::parse(&bid)?)))
            .transpose()?;
        txn.insert_branch(BranchState::from_tree(bid, tree, predecessor));
    }
    let revprops: RevProps = stored.revprops.into_iter().collect();
    Ok((txn, revprops))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let mut txn = BranchTxn::initial();
        let root = txn.branch(&BranchId::top(0)).unwrap().root_eid();
        let eid = txn.new_eid();
        txn.branch_mut(&BranchId::top(0))
            .unwrap()
            .alter(eid, Some(root), "A", Payload::file("hello\n"))
            .unwrap();
        let mut props = RevProps::new();
        props.insert("log".to_owned(), "add A".to_owned());

        let data = encode_txn(&txn, &props).unwrap();
        let (decoded, decoded_props) = decode_txn(&data).unwrap();
        assert_eq!(decoded, txn);
        assert_eq!(decoded_props, props);
    }

    #[test]
    fn corrupt_stored_eid_is_a_distinct_error() {
        let txn = BranchTxn::initial();
        let data = encode_txn(&txn, &RevProps::new()).unwrap();
        let text = String::from_utf8(data).unwrap();
        let corrupted = text.replace("\"root_eid\": \"0\"", "\"root_eid\": \"zero\"");
        let err = decode_txn(corrupted.as_bytes()).unwrap_err();
        assert_eq!(err.taxonomy(), "FS_NOT_ID");
    }

    #[test]
    fn file_store_round_trips_and_reports_absence() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileBranchingStore::open(dir.path().join("branching")).unwrap();
        let rev = Revision::new(1);
        assert_eq!(store.load(rev).unwrap(), None);
        store.save(rev, b"{}").unwrap();
        assert_eq!(store.load(rev).unwrap().as_deref(), Some(&b"{}"[..]));
    }
}
