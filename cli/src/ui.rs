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

//! Terminal output and the injectable prompt.
//!
//! Tests script the prompt and capture the streams instead of reading a
//! terminal; the interactive shell and the one-shot mode share this type.

use std::io;
use std::io::BufRead as _;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;

use mover_lib::error::MoverError;
use mover_lib::error::MoverResult;

/// Source of interactive input.
pub trait UserInput {
    /// Reads one line, after showing `prompt`. `None` means end of input.
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

/// Reads from the process stdin, prompting on stderr.
pub struct StdinInput;

impl UserInput for StdinInput {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let mut stderr = io::stderr();
        write!(stderr, "{prompt}")?;
        stderr.flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_owned()))
    }
}

/// Scripted input for tests; yields its lines in order, then end-of-input.
#[derive(Default)]
pub struct ScriptedInput {
    lines: Vec<String>,
}

impl ScriptedInput {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().rev().map(|line| (*line).to_owned()).collect(),
        }
    }
}

impl UserInput for ScriptedInput {
    fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        Ok(self.lines.pop())
    }
}

/// A clonable in-memory stream for capturing output in tests.
#[derive(Clone, Default)]
pub struct SharedBuf {
    data: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.data.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The session's terminal. Write failures (e.g. a closed pager pipe) are
/// swallowed; output is best-effort.
pub struct Ui {
    quiet: bool,
    interactive: bool,
    out: Box<dyn Write>,
    err: Box<dyn Write>,
    input: Box<dyn UserInput>,
}

impl Ui {
    pub fn terminal(quiet: bool, interactive: bool) -> Self {
        Self {
            quiet,
            interactive,
            out: Box::new(io::stdout()),
            err: Box::new(io::stderr()),
            input: Box::new(StdinInput),
        }
    }

    /// A fully captured Ui for tests. The returned buffer sees both
    /// streams; `lines` script the prompt.
    pub fn captured(lines: &[&str]) -> (Self, SharedBuf) {
        let buf = SharedBuf::default();
        let ui = Self {
            quiet: false,
            interactive: !lines.is_empty(),
            out: Box::new(buf.clone()),
            err: Box::new(buf.clone()),
            input: Box::new(ScriptedInput::new(lines)),
        };
        (ui, buf)
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }

    pub fn interactive(&self) -> bool {
        self.interactive
    }

    /// Primary output (listings, diffs, file contents).
    pub fn out_line(&mut self, line: impl AsRef<str>) {
        let _ = writeln!(self.out, "{}", line.as_ref());
    }

    pub fn out_bytes(&mut self, data: &[u8]) {
        let _ = self.out.write_all(data);
    }

    /// Notification output (status-prefix lines); suppressed by `--quiet`.
    pub fn note(&mut self, line: impl AsRef<str>) {
        if !self.quiet {
            let _ = writeln!(self.out, "{}", line.as_ref());
        }
    }

    pub fn warn(&mut self, line: impl AsRef<str>) {
        let _ = writeln!(self.err, "warning: {}", line.as_ref());
    }

    pub fn error_line(&mut self, line: impl AsRef<str>) {
        let _ = writeln!(self.err, "mover: {}", line.as_ref());
    }

    /// Reads one line of interactive input. End of input is reported as a
    /// cancellation and leaves the current edit txn untouched.
    pub fn prompt(&mut self, prompt: &str) -> MoverResult<String> {
        let _ = self.err.flush();
        let _ = self.out.flush();
        match self.input.read_line(prompt) {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(MoverError::Cancelled),
            Err(_) => Err(MoverError::Cancelled),
        }
    }
}
