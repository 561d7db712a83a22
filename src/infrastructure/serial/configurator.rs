use crate::domain::config::{BaudRate, DataBits, LineSettings, Parity};
use crate::domain::error::{SerTermError, SerTermResult};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::termios::{
    self, cfsetispeed, cfsetospeed, tcgetattr, tcsetattr, ControlFlags, InputFlags, LocalFlags,
    OutputFlags, SetArg, SpecialCharacterIndices,
};
use std::os::fd::{AsFd, AsRawFd};
use tracing::debug;

/// Apply `settings` to the serial device.
///
/// Safe to call any number of times; the resulting device state depends only
/// on `settings`. Called at startup and again after every transfer helper,
/// since helpers leave the line in their own preferred state.
pub fn configure<Fd: AsFd>(device: Fd, settings: &LineSettings) -> SerTermResult<()> {
    let fd = device.as_fd();
    let mut attrs = tcgetattr(fd).map_err(SerTermError::SerialSetup)?;

    attrs
        .local_flags
        .remove(LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::ISIG);

    // Ignore modem status lines so reads never wait on carrier detect
    attrs.control_flags.insert(ControlFlags::CLOCAL);

    attrs.control_flags.remove(ControlFlags::CSIZE);
    attrs.control_flags.insert(match settings.data_bits {
        DataBits::Seven => ControlFlags::CS7,
        DataBits::Eight => ControlFlags::CS8,
    });
    attrs.control_flags.remove(ControlFlags::CSTOPB);

    match settings.parity {
        Parity::None => attrs
            .control_flags
            .remove(ControlFlags::PARENB | ControlFlags::PARODD),
        Parity::Odd => attrs
            .control_flags
            .insert(ControlFlags::PARENB | ControlFlags::PARODD),
        Parity::Even => {
            attrs.control_flags.insert(ControlFlags::PARENB);
            attrs.control_flags.remove(ControlFlags::PARODD);
        }
    }

    attrs.output_flags.remove(OutputFlags::OPOST);
    attrs.input_flags = InputFlags::empty();
    attrs.control_chars[SpecialCharacterIndices::VMIN as usize] = settings.min_bytes;
    attrs.control_chars[SpecialCharacterIndices::VTIME as usize] = settings.inter_byte_timeout;

    let speed = termios_speed(settings.baud_rate);
    cfsetispeed(&mut attrs, speed).map_err(SerTermError::SerialSetup)?;
    cfsetospeed(&mut attrs, speed).map_err(SerTermError::SerialSetup)?;
    tcsetattr(fd, SetArg::TCSAFLUSH, &attrs).map_err(SerTermError::SerialSetup)?;

    // CLOCAL is set, so blocking reads are safe now
    let raw_fd = fd.as_raw_fd();
    let flags = fcntl(raw_fd, FcntlArg::F_GETFL).map_err(SerTermError::SerialSetup)?;
    let flags = OFlag::from_bits_truncate(flags) - OFlag::O_NONBLOCK;
    fcntl(raw_fd, FcntlArg::F_SETFL(flags)).map_err(SerTermError::SerialSetup)?;

    debug!(
        "serial line configured: {} baud, {:?} parity, {:?} data bits",
        settings.baud_rate, settings.parity, settings.data_bits
    );
    Ok(())
}

fn termios_speed(baud_rate: BaudRate) -> termios::BaudRate {
    match baud_rate {
        BaudRate::B300 => termios::BaudRate::B300,
        BaudRate::B1200 => termios::BaudRate::B1200,
        BaudRate::B2400 => termios::BaudRate::B2400,
        BaudRate::B9600 => termios::BaudRate::B9600,
        BaudRate::B19200 => termios::BaudRate::B19200,
        BaudRate::B38400 => termios::BaudRate::B38400,
        BaudRate::B115200 => termios::BaudRate::B115200,
    }
}
