use crate::core::coordinator::{Checkpoint, RelayCoordinator};
use crate::core::relay::mask_high_bit;
use crate::domain::config::DOWNLINK_CHUNK;
use crate::domain::error::{SerTermError, SerTermResult};
use std::io::{self, ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

pub const READY_BANNER: &[u8] = b"Term ready.\r\n";

/// Capture of everything received from the serial device.
///
/// Clones share one writer, so the session can flush it on any exit path
/// even while the downlink is still parked in a read.
#[derive(Clone)]
pub struct CaptureLog {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl CaptureLog {
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    pub fn append(&self, bytes: &[u8]) -> io::Result<()> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_all(bytes)
    }

    pub fn flush(&self) -> io::Result<()> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
    }
}

/// Serial to screen path.
///
/// Reads at most [`DOWNLINK_CHUNK`] bytes at a time, strips the high bit and
/// copies the result to the screen and the log. Timeouts and interrupted
/// reads are retried; any other read failure ends the relay.
pub struct Downlink<R, W> {
    serial: R,
    screen: W,
    log: Option<CaptureLog>,
    coordinator: Arc<RelayCoordinator>,
}

impl<R: Read, W: Write> Downlink<R, W> {
    pub fn new(serial: R, screen: W, log: Option<CaptureLog>, coordinator: Arc<RelayCoordinator>) -> Self {
        Self {
            serial,
            screen,
            log,
            coordinator,
        }
    }

    /// Relay until terminated or a fatal error. The log is flushed on the
    /// way out, whatever the outcome.
    pub fn run(mut self) -> SerTermResult<()> {
        let result = self.relay();
        self.coordinator.mark_terminated();

        if let Some(log) = self.log.take() {
            if let Err(e) = log.flush() {
                debug!("failed to flush log: {}", e);
            }
        }

        // The session reports the error to the user
        match &result {
            Ok(()) => debug!("downlink stopped"),
            Err(e) => debug!("downlink failed: {}", e),
        }
        result
    }

    fn relay(&mut self) -> SerTermResult<()> {
        self.screen.write_all(READY_BANNER)?;
        self.screen.flush()?;

        let mut buf = [0u8; DOWNLINK_CHUNK];
        while self.coordinator.checkpoint() == Checkpoint::Continue {
            let count = match self.serial.read(&mut buf) {
                Ok(0) => {
                    return Err(SerTermError::DownlinkRead(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "serial device closed",
                    )))
                }
                Ok(count) => count,
                Err(e) if is_retryable(&e) => continue,
                Err(e) => return Err(SerTermError::DownlinkRead(e)),
            };

            let chunk = &mut buf[..count];
            for byte in chunk.iter_mut() {
                *byte = mask_high_bit(*byte);
            }
            trace!("downlink {}", hex::encode(&*chunk));

            self.screen.write_all(chunk)?;
            self.screen.flush()?;
            if let Some(log) = &self.log {
                log.append(chunk)?;
            }
        }
        Ok(())
    }
}

fn is_retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
    )
}
