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

//! Core engine of mover, an experimental version-control client built on
//! stable element identity rather than path identity.
//!
//! The model is a tree of *elements*, each carrying a repository-wide id
//! that follows the element through renames and moves. Branches are element
//! trees sharing those ids; a [`txn::BranchTxn`] is the unit of atomic
//! editing; [`diff`], [`replay`], and [`merge`] operate on element identity
//! so that a move is one tracked change rather than a delete/add pair.

#![forbid(unsafe_code)]
#![deny(unused_must_use)]

pub mod branch;
pub mod diff;
pub mod element;
pub mod error;
pub mod merge;
pub mod migrate;
pub mod remote;
pub mod replay;
pub mod repos;
pub mod store;
pub mod txn;
pub mod working_copy;
