use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Downlink lifecycle as seen by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownlinkState {
    /// Reading from the serial device
    Running,
    /// Parked between reads, waiting to be resumed
    Suspended,
    /// Stopped for good
    Terminated,
}

impl std::fmt::Display for DownlinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownlinkState::Running => write!(f, "Running"),
            DownlinkState::Suspended => write!(f, "Suspended"),
            DownlinkState::Terminated => write!(f, "Terminated"),
        }
    }
}

/// What the downlink should do at a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Continue,
    Stop,
}

#[derive(Debug)]
struct Signals {
    suspend_requested: bool,
    terminate_requested: bool,
    state: DownlinkState,
}

/// Pause/resume channel between the two duplex paths.
///
/// Suspension is cooperative: the downlink only looks at the signals between
/// reads, so a suspend takes effect after the read in flight completes or
/// times out. `suspend_downlink` does not return until the downlink is
/// parked (or gone), so nothing it writes can interleave with the caller's
/// own screen output.
#[derive(Debug)]
pub struct RelayCoordinator {
    signals: Mutex<Signals>,
    changed: Condvar,
}

impl RelayCoordinator {
    pub fn new() -> Self {
        Self {
            signals: Mutex::new(Signals {
                suspend_requested: false,
                terminate_requested: false,
                state: DownlinkState::Running,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Signals> {
        self.signals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Signals>) -> MutexGuard<'a, Signals> {
        self.changed.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> DownlinkState {
        self.lock().state
    }

    /// Ask the downlink to park and wait until it has. No-op once terminated.
    pub fn suspend_downlink(&self) {
        let mut signals = self.lock();
        if signals.state == DownlinkState::Terminated {
            return;
        }

        signals.suspend_requested = true;
        self.changed.notify_all();
        while signals.state == DownlinkState::Running {
            signals = self.wait(signals);
        }
        debug!("downlink {}", signals.state);
    }

    /// Wake a parked downlink. No-op once terminated.
    pub fn resume_downlink(&self) {
        let mut signals = self.lock();
        if signals.state == DownlinkState::Terminated {
            return;
        }

        signals.suspend_requested = false;
        self.changed.notify_all();
    }

    /// Ask the downlink to stop at its next checkpoint.
    pub fn terminate_downlink(&self) {
        let mut signals = self.lock();
        signals.terminate_requested = true;
        self.changed.notify_all();
    }

    /// Called by the downlink between reads. Parks while a suspension is
    /// pending and tells the caller whether to keep going.
    pub fn checkpoint(&self) -> Checkpoint {
        let mut signals = self.lock();
        loop {
            if signals.terminate_requested {
                signals.state = DownlinkState::Terminated;
                self.changed.notify_all();
                return Checkpoint::Stop;
            }

            if !signals.suspend_requested {
                signals.state = DownlinkState::Running;
                return Checkpoint::Continue;
            }

            if signals.state != DownlinkState::Suspended {
                signals.state = DownlinkState::Suspended;
                self.changed.notify_all();
            }
            signals = self.wait(signals);
        }
    }

    /// Called by the downlink when it exits for any reason, so a pending
    /// `suspend_downlink` never waits on a downlink that is gone.
    pub fn mark_terminated(&self) {
        let mut signals = self.lock();
        signals.state = DownlinkState::Terminated;
        self.changed.notify_all();
    }
}

impl Default for RelayCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
