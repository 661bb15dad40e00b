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

use mover_lib::error::MoverError;
use thiserror::Error;

pub type CommandResult<T> = Result<T, CommandError>;

/// Failure of one action or of the command line as a whole.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Mover(#[from] MoverError),
    #[error("{0}")]
    ArgParse(String),
}

impl CommandError {
    /// The taxonomy name printed when the process terminates on this error.
    pub fn taxonomy(&self) -> &'static str {
        match self {
            Self::Mover(err) => err.taxonomy(),
            Self::ArgParse(_) => "CL_ARG_PARSING_ERROR",
        }
    }
}

/// Shorthand for precondition failures on action arguments.
pub fn arg_error(message: impl Into<String>) -> CommandError {
    CommandError::ArgParse(message.into())
}
