// Terminal module - Host terminal handles and line discipline control
pub mod line_discipline;

pub use line_discipline::{enter_raw_mode, restore_mode, SavedMode, TerminalGuard};

use std::fs::File;
use std::io;
use std::os::fd::{AsFd, OwnedFd};

/// Unbuffered handles on the user's terminal.
///
/// The descriptors are duplicates of stdin and stdout so that reads and
/// writes bypass the standard library's buffering.
pub struct Terminal {
    input: File,
    output: File,
}

impl Terminal {
    pub fn from_stdio() -> io::Result<Self> {
        let input = io::stdin().as_fd().try_clone_to_owned()?;
        let output = io::stdout().as_fd().try_clone_to_owned()?;
        Ok(Self {
            input: File::from(input),
            output: File::from(output),
        })
    }

    /// Keyboard side
    pub fn input(&self) -> io::Result<File> {
        self.input.try_clone()
    }

    /// Screen side
    pub fn output(&self) -> io::Result<File> {
        self.output.try_clone()
    }

    /// Descriptor the line discipline is applied to
    pub fn control_fd(&self) -> io::Result<OwnedFd> {
        self.input.as_fd().try_clone_to_owned()
    }
}
