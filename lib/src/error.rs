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

//! The error taxonomy shared by the core and its providers.

use thiserror::Error;

use crate::branch::BranchId;
use crate::element::Eid;
use crate::repos::Revision;

/// Result alias used throughout the core.
pub type MoverResult<T> = Result<T, MoverError>;

/// Error raised by core operations and by the remote-access providers.
///
/// Provider errors surface unchanged to the caller. Merge conflicts are not
/// errors of this type; they travel as a structured
/// [`ConflictReport`](crate::merge::ConflictReport) and only the summary is
/// reported as [`MoverError::Branching`].
#[derive(Debug, Error)]
pub enum MoverError {
    #[error("no such revision: {0}")]
    NoSuchRevision(Revision),
    #[error("branch {bid} does not exist")]
    BranchNotFound { bid: BranchId },
    #[error("element {eid} not found in branch {bid}")]
    ElementNotFound { bid: BranchId, eid: Eid },
    #[error("path {path:?} not found in branch {bid}")]
    PathNotFound { bid: BranchId, path: String },
    #[error("parent element {parent} is not present")]
    BadParent { parent: Eid },
    #[error("name {name:?} already in use under element {parent}")]
    NameClash { parent: Eid, name: String },
    #[error("cannot delete the branch root element {eid}")]
    DeleteRoot { eid: Eid },
    #[error("branching: {0}")]
    Branching(String),
    #[error("stored element id {text:?} is not a valid id")]
    StoredEidInvalid { text: String },
    #[error("incorrect parameters: {0}")]
    IncorrectParams(String),
    #[error("authentication failed")]
    AuthnFailed,
    #[error("cancelled")]
    Cancelled,
    #[error("failed to access the branching-state store")]
    Store {
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode stored branching state")]
    StoreDecode {
        #[source]
        source: serde_json::Error,
    },
}

impl MoverError {
    /// Short taxonomy name printed when a command terminates with an error.
    pub fn taxonomy(&self) -> &'static str {
        match self {
            Self::NoSuchRevision(_) => "NO_SUCH_REVISION",
            Self::BranchNotFound { .. }
            | Self::ElementNotFound { .. }
            | Self::PathNotFound { .. }
            | Self::BadParent { .. }
            | Self::NameClash { .. }
            | Self::DeleteRoot { .. }
            | Self::Branching(_)
            | Self::Store { .. }
            | Self::StoreDecode { .. } => "BRANCHING",
            Self::StoredEidInvalid { .. } => "FS_NOT_ID",
            Self::IncorrectParams(_) => "INCORRECT_PARAMS",
            Self::AuthnFailed => "AUTHN_FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}
