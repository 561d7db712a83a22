use crate::domain::error::{SerTermError, SerTermResult};
use nix::sys::termios::{
    tcgetattr, tcsetattr, InputFlags, LocalFlags, OutputFlags, SetArg, SpecialCharacterIndices,
    Termios,
};
use std::os::fd::{AsFd, OwnedFd};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Terminal settings captured before raw mode was installed
#[derive(Debug, Clone)]
pub struct SavedMode(Termios);

/// Capture the terminal's current mode and switch it to byte-at-a-time raw I/O.
pub fn enter_raw_mode<Fd: AsFd>(terminal: Fd) -> SerTermResult<SavedMode> {
    let fd = terminal.as_fd();
    let saved = tcgetattr(fd).map_err(SerTermError::Terminal)?;

    let mut raw = saved.clone();
    raw.local_flags
        .remove(LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::ISIG);
    raw.output_flags.remove(OutputFlags::OPOST);
    raw.input_flags = InputFlags::empty();
    raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    tcsetattr(fd, SetArg::TCSAFLUSH, &raw).map_err(SerTermError::Terminal)?;

    debug!("terminal switched to raw mode");
    Ok(SavedMode(saved))
}

/// Reapply saved settings. Pending output drains, pending input is discarded.
pub fn restore_mode<Fd: AsFd>(terminal: Fd, saved: &SavedMode) -> SerTermResult<()> {
    tcsetattr(terminal.as_fd(), SetArg::TCSAFLUSH, &saved.0).map_err(SerTermError::Terminal)
}

/// Owns the saved terminal mode and puts it back exactly once.
///
/// Shared between the session and the signal watcher; whichever exit path
/// runs first restores, later calls are no-ops. Dropping the guard restores
/// as a last resort.
pub struct TerminalGuard {
    terminal: OwnedFd,
    saved: Mutex<Option<SavedMode>>,
}

impl TerminalGuard {
    /// Switch `terminal` to raw mode, keeping the previous mode for restoration.
    pub fn enter(terminal: OwnedFd) -> SerTermResult<Self> {
        let saved = enter_raw_mode(&terminal)?;
        Ok(Self {
            terminal,
            saved: Mutex::new(Some(saved)),
        })
    }

    /// Returns `true` if this call restored the terminal, `false` if an
    /// earlier call already did.
    pub fn restore(&self) -> SerTermResult<bool> {
        let saved = self
            .saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match saved {
            Some(saved) => {
                restore_mode(&self.terminal, &saved)?;
                debug!("terminal mode restored");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_restored(&self) -> bool {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!("Failed to restore terminal mode: {}", e);
        }
    }
}
