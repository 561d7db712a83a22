use crate::core::coordinator::RelayCoordinator;
use crate::core::escape::{EscapeDispatcher, EscapeOutcome, TransferHost};
use crate::core::relay::{mask_high_bit, read_byte, translate_keystroke};
use crate::domain::error::{SerTermError, SerTermResult};
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::debug;

/// Why the uplink stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkExit {
    /// Quit requested through the escape sequence
    Quit,
    /// The keyboard reached end of input
    EndOfInput,
}

/// Keyboard to serial path.
///
/// Reads one keystroke at a time. The escape byte hands control to the
/// dispatcher with the downlink parked for the duration.
pub struct Uplink<K, S, T, H> {
    keyboard: K,
    serial: S,
    dispatcher: EscapeDispatcher<T, H>,
    coordinator: Arc<RelayCoordinator>,
    escape: u8,
    raw_keyboard: bool,
}

impl<K, S, T, H> Uplink<K, S, T, H>
where
    K: Read,
    S: Write,
    T: Write,
    H: TransferHost,
{
    pub fn new(
        keyboard: K,
        serial: S,
        dispatcher: EscapeDispatcher<T, H>,
        coordinator: Arc<RelayCoordinator>,
        escape: u8,
        raw_keyboard: bool,
    ) -> Self {
        Self {
            keyboard,
            serial,
            dispatcher,
            coordinator,
            escape,
            raw_keyboard,
        }
    }

    pub fn run(&mut self) -> SerTermResult<UplinkExit> {
        loop {
            let byte = match read_byte(&mut self.keyboard).map_err(SerTermError::UplinkRead)? {
                Some(byte) => mask_high_bit(byte),
                None => {
                    debug!("keyboard closed");
                    return Ok(UplinkExit::EndOfInput);
                }
            };

            if byte == self.escape {
                self.coordinator.suspend_downlink();
                let outcome = self.dispatcher.dispatch(&mut self.keyboard, &mut self.serial);

                // Leaving the downlink parked on the way out keeps serial
                // output off the screen once the user has quit
                match outcome {
                    Ok(EscapeOutcome::Continue) => {
                        self.coordinator.resume_downlink();
                        continue;
                    }
                    Ok(EscapeOutcome::Quit) => return Ok(UplinkExit::Quit),
                    Ok(EscapeOutcome::EndOfInput) => return Ok(UplinkExit::EndOfInput),
                    Err(e) => return Err(e),
                }
            }

            self.serial
                .write_all(&[translate_keystroke(byte, self.raw_keyboard)])?;
            self.serial.flush()?;
        }
    }

    /// Hand back the serial writer and dispatcher.
    pub fn into_parts(self) -> (S, EscapeDispatcher<T, H>) {
        (self.serial, self.dispatcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coordinator::{Checkpoint, DownlinkState};
    use crate::core::escape::{TransferDirection, TransferRequest};
    use crate::domain::config::{Protocol, DEFAULT_ESCAPE};
    use std::io::{self, Cursor, ErrorKind};
    use std::thread;
    use std::time::Duration;

    struct NoTransfers;

    impl TransferHost for NoTransfers {
        fn supports(&self, _: Protocol, _: TransferDirection) -> bool {
            false
        }

        fn run_helper(&mut self, _: &TransferRequest) -> SerTermResult<()> {
            panic!("no helper expected");
        }

        fn reapply_line_settings(&mut self) -> SerTermResult<()> {
            Ok(())
        }
    }

    fn uplink(input: &[u8], raw_keyboard: bool) -> Uplink<Cursor<Vec<u8>>, Vec<u8>, Vec<u8>, NoTransfers> {
        let coordinator = Arc::new(RelayCoordinator::new());
        // No downlink thread in these tests
        coordinator.mark_terminated();
        uplink_with(input, raw_keyboard, coordinator)
    }

    fn uplink_with(
        input: &[u8],
        raw_keyboard: bool,
        coordinator: Arc<RelayCoordinator>,
    ) -> Uplink<Cursor<Vec<u8>>, Vec<u8>, Vec<u8>, NoTransfers> {
        let dispatcher = EscapeDispatcher::new(Vec::new(), NoTransfers, DEFAULT_ESCAPE, Protocol::Zmodem);
        Uplink::new(
            Cursor::new(input.to_vec()),
            Vec::new(),
            dispatcher,
            coordinator,
            DEFAULT_ESCAPE,
            raw_keyboard,
        )
    }

    #[test]
    fn test_newline_translated() {
        let mut uplink = uplink(b"hello\n", false);
        assert_eq!(uplink.run().unwrap(), UplinkExit::EndOfInput);
        let (serial, _) = uplink.into_parts();
        assert_eq!(serial, b"hello\r");
    }

    #[test]
    fn test_raw_keyboard_keeps_newline() {
        let mut uplink = uplink(b"hi\n", true);
        uplink.run().unwrap();
        let (serial, _) = uplink.into_parts();
        assert_eq!(serial, b"hi\n");
    }

    #[test]
    fn test_high_bit_masked() {
        let mut uplink = uplink(&[b'a' | 0x80, 0xFF], false);
        uplink.run().unwrap();
        let (serial, _) = uplink.into_parts();
        assert_eq!(serial, vec![b'a', 0x7F]);
    }

    #[test]
    fn test_escape_quit_stops_reading() {
        let mut uplink = uplink(&[b'a', DEFAULT_ESCAPE, b'q', b'b'], false);
        assert_eq!(uplink.run().unwrap(), UplinkExit::Quit);
        let (serial, _) = uplink.into_parts();
        assert_eq!(serial, b"a");
    }

    #[test]
    fn test_escape_escape_sends_literal() {
        let mut uplink = uplink(&[DEFAULT_ESCAPE, DEFAULT_ESCAPE, b'x'], false);
        uplink.run().unwrap();
        let (serial, _) = uplink.into_parts();
        assert_eq!(serial, vec![DEFAULT_ESCAPE, b'x']);
    }

    #[test]
    fn test_unknown_escape_continues() {
        let mut uplink = uplink(&[DEFAULT_ESCAPE, b'x', b'o', b'k'], false);
        assert_eq!(uplink.run().unwrap(), UplinkExit::EndOfInput);
        let (serial, _) = uplink.into_parts();
        assert_eq!(serial, b"ok");
    }

    /// Stand-in downlink: hits its checkpoint until told to stop
    fn spawn_checkpoint_loop(coordinator: &Arc<RelayCoordinator>) -> thread::JoinHandle<()> {
        let coordinator = Arc::clone(coordinator);
        thread::spawn(move || {
            while coordinator.checkpoint() == Checkpoint::Continue {
                thread::sleep(Duration::from_millis(1));
            }
        })
    }

    #[test]
    fn test_downlink_stays_parked_after_quit() {
        for keys in [&[DEFAULT_ESCAPE, b'q'][..], &[DEFAULT_ESCAPE][..]] {
            let coordinator = Arc::new(RelayCoordinator::new());
            let downlink = spawn_checkpoint_loop(&coordinator);

            let mut uplink = uplink_with(keys, false, Arc::clone(&coordinator));
            uplink.run().unwrap();

            thread::sleep(Duration::from_millis(20));
            assert_eq!(coordinator.state(), DownlinkState::Suspended);

            coordinator.terminate_downlink();
            downlink.join().unwrap();
            assert_eq!(coordinator.state(), DownlinkState::Terminated);
        }
    }

    #[test]
    fn test_downlink_resumes_after_help() {
        let coordinator = Arc::new(RelayCoordinator::new());
        let downlink = spawn_checkpoint_loop(&coordinator);

        let mut uplink = uplink_with(&[DEFAULT_ESCAPE, b'x'], false, Arc::clone(&coordinator));
        assert_eq!(uplink.run().unwrap(), UplinkExit::EndOfInput);

        let mut state = coordinator.state();
        for _ in 0..500 {
            if state == DownlinkState::Running {
                break;
            }
            thread::sleep(Duration::from_millis(2));
            state = coordinator.state();
        }
        assert_eq!(state, DownlinkState::Running);

        coordinator.terminate_downlink();
        downlink.join().unwrap();
    }

    #[test]
    fn test_keyboard_error_is_fatal() {
        struct Broken;

        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::from(ErrorKind::BrokenPipe))
            }
        }

        let coordinator = Arc::new(RelayCoordinator::new());
        coordinator.mark_terminated();
        let dispatcher = EscapeDispatcher::new(Vec::new(), NoTransfers, DEFAULT_ESCAPE, Protocol::Zmodem);
        let mut uplink = Uplink::new(Broken, Vec::new(), dispatcher, Arc::clone(&coordinator), DEFAULT_ESCAPE, false);

        assert!(matches!(uplink.run(), Err(SerTermError::UplinkRead(_))));
        assert_eq!(coordinator.state(), DownlinkState::Terminated);
    }
}
