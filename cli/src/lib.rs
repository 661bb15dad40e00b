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

//! Command-line client for mover: the action interpreter over a
//! [`mover_lib::working_copy::WorkingCopy`].

#![forbid(unsafe_code)]
#![deny(unused_must_use)]

pub mod cli_util;
pub mod command_error;
pub mod commands;
pub mod ui;
