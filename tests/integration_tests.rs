use nix::pty::openpty;
use nix::sys::termios::{tcgetattr, LocalFlags};
use serterm::core::relay::downlink::READY_BANNER;
use serterm::core::escape::HELP_MESSAGE;
use serterm::domain::config::{LineSettings, Protocol, DEFAULT_ESCAPE};
use serterm::infrastructure::serial::configure;
use serterm::infrastructure::terminal::TerminalGuard;
use serterm::{
    Downlink, DownlinkState, EscapeDispatcher, RelayCoordinator, SerTermResult, TransferDirection,
    TransferHost, TransferRequest, Uplink, UplinkExit,
};
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::os::fd::OwnedFd;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Integration tests driving both duplex paths over a pseudo-terminal
#[cfg(test)]
mod integration_tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Screen(Arc<Mutex<Vec<u8>>>);

    impl Screen {
        fn contents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }

        fn wait_until(&self, done: impl Fn(&[u8]) -> bool) {
            for _ in 0..1000 {
                if done(&self.contents()) {
                    return;
                }
                thread::sleep(Duration::from_millis(2));
            }
            panic!("screen never showed what was expected: {:?}", self.contents());
        }
    }

    impl Write for Screen {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct NoTransfers;

    impl TransferHost for NoTransfers {
        fn supports(&self, _: Protocol, _: TransferDirection) -> bool {
            true
        }

        fn run_helper(&mut self, _: &TransferRequest) -> SerTermResult<()> {
            Ok(())
        }

        fn reapply_line_settings(&mut self) -> SerTermResult<()> {
            Ok(())
        }
    }

    /// A serial line: the device end configured like a real port, and the
    /// far end the test talks through.
    struct Line {
        device: OwnedFd,
        far_end: File,
    }

    fn serial_line() -> Line {
        let pty = openpty(None, None).unwrap();
        configure(&pty.slave, &LineSettings::default()).unwrap();
        Line {
            device: pty.slave,
            far_end: File::from(pty.master),
        }
    }

    fn device_file(line: &Line) -> File {
        File::from(line.device.try_clone().unwrap())
    }

    fn read_wire(far_end: &mut File, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        far_end.read_exact(&mut bytes).unwrap();
        bytes
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    fn wait_for_state(coordinator: &RelayCoordinator, state: DownlinkState) {
        for _ in 0..1000 {
            if coordinator.state() == state {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("downlink never reached {}", state);
    }

    fn uplink(
        keys: &[u8],
        serial: File,
        coordinator: Arc<RelayCoordinator>,
        screen: Screen,
    ) -> Uplink<Cursor<Vec<u8>>, File, Screen, NoTransfers> {
        let dispatcher = EscapeDispatcher::new(screen, NoTransfers, DEFAULT_ESCAPE, Protocol::Zmodem);
        Uplink::new(Cursor::new(keys.to_vec()), serial, dispatcher, coordinator, DEFAULT_ESCAPE, false)
    }

    #[test]
    fn test_typed_line_reaches_wire_with_carriage_return() {
        let mut line = serial_line();
        let coordinator = Arc::new(RelayCoordinator::new());
        coordinator.mark_terminated();

        let mut uplink = uplink(b"hello\n", device_file(&line), coordinator, Screen::default());
        assert_eq!(uplink.run().unwrap(), UplinkExit::EndOfInput);

        assert_eq!(read_wire(&mut line.far_end, 6), b"hello\r");
    }

    #[test]
    fn test_received_bytes_reach_screen_masked() {
        let mut line = serial_line();
        let coordinator = Arc::new(RelayCoordinator::new());
        let screen = Screen::default();

        let downlink = Downlink::new(device_file(&line), screen.clone(), None, Arc::clone(&coordinator));
        let handle = thread::spawn(move || downlink.run());

        line.far_end.write_all(&[b'h' | 0x80, b'i', b'!' | 0x80]).unwrap();
        screen.wait_until(|shown| shown.len() >= READY_BANNER.len() + 3);
        assert_eq!(screen.contents(), [READY_BANNER, b"hi!"].concat());

        // The device read is blocking; one more byte lets it see the stop request
        coordinator.terminate_downlink();
        line.far_end.write_all(b".").unwrap();
        handle.join().unwrap().unwrap();
        assert_eq!(coordinator.state(), DownlinkState::Terminated);
    }

    #[test]
    fn test_unknown_escape_shows_help_and_relay_continues() {
        let mut line = serial_line();
        let coordinator = Arc::new(RelayCoordinator::new());
        let screen = Screen::default();

        let downlink = Downlink::new(device_file(&line), screen.clone(), None, Arc::clone(&coordinator));
        let handle = thread::spawn(move || downlink.run());
        line.far_end.write_all(b"a").unwrap();
        screen.wait_until(|shown| shown.ends_with(b"a"));

        // The downlink sits in a blocking read; keep the line busy until it
        // reaches its checkpoint and parks
        let feeder = {
            let mut far_end = line.far_end.try_clone().unwrap();
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                far_end.write_all(b"b").unwrap();
                for _ in 0..10 {
                    thread::sleep(Duration::from_millis(150));
                    if coordinator.state() != DownlinkState::Running {
                        break;
                    }
                    far_end.write_all(b".").unwrap();
                }
            })
        };

        let mut uplink = uplink(
            &[DEFAULT_ESCAPE, b'x', b'o', b'k'],
            device_file(&line),
            Arc::clone(&coordinator),
            screen.clone(),
        );
        assert_eq!(uplink.run().unwrap(), UplinkExit::EndOfInput);
        feeder.join().unwrap();

        assert_eq!(read_wire(&mut line.far_end, 2), b"ok");
        screen.wait_until(|shown| contains(shown, HELP_MESSAGE));
        wait_for_state(&coordinator, DownlinkState::Running);

        line.far_end.write_all(b"c").unwrap();
        screen.wait_until(|shown| shown.ends_with(b"c"));

        coordinator.terminate_downlink();
        line.far_end.write_all(b".").unwrap();
        handle.join().unwrap().unwrap();

        // Nothing received around the suspension is lost or reordered
        let shown = screen.contents();
        let help_at = shown
            .windows(HELP_MESSAGE.len())
            .position(|w| w == HELP_MESSAGE)
            .unwrap();
        let received: Vec<u8> = shown[READY_BANNER.len()..help_at]
            .iter()
            .chain(&shown[help_at + HELP_MESSAGE.len()..])
            .copied()
            .filter(|&b| b != b'.')
            .collect();
        assert_eq!(received, b"abc");
    }

    #[test]
    fn test_quit_restores_terminal_once() {
        let terminal = openpty(None, None).unwrap();
        let before = tcgetattr(&terminal.slave).unwrap();
        let guard = TerminalGuard::enter(terminal.slave.try_clone().unwrap()).unwrap();

        let line = serial_line();
        let coordinator = Arc::new(RelayCoordinator::new());
        coordinator.mark_terminated();
        let mut uplink = uplink(&[DEFAULT_ESCAPE, b'q'], device_file(&line), coordinator, Screen::default());

        assert_eq!(uplink.run().unwrap(), UplinkExit::Quit);
        assert!(guard.restore().unwrap());
        assert!(!guard.restore().unwrap());
        drop(guard);

        let after = tcgetattr(&terminal.slave).unwrap();
        assert_eq!(before.local_flags, after.local_flags);
        assert_eq!(
            after.local_flags.contains(LocalFlags::ICANON),
            before.local_flags.contains(LocalFlags::ICANON)
        );
    }
}
