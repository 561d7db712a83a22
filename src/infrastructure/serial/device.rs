use crate::domain::config::{DataBits, LineSettings, Parity};
use crate::domain::error::{SerTermError, SerTermResult};
use serialport::TTYPort;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::time::Duration;
use tracing::info;

/// Exclusively opened serial device.
///
/// Reads wait at most the poll interval for data before failing with
/// `TimedOut`, which lets the downlink check for suspension between reads.
pub struct SerialDevice {
    port: TTYPort,
    path: String,
}

impl SerialDevice {
    pub fn open(path: &str, settings: &LineSettings, poll_interval: Duration) -> SerTermResult<Self> {
        let builder = serialport::new(path, settings.baud_rate.as_u32())
            .data_bits(match settings.data_bits {
                DataBits::Seven => serialport::DataBits::Seven,
                DataBits::Eight => serialport::DataBits::Eight,
            })
            .parity(match settings.parity {
                Parity::None => serialport::Parity::None,
                Parity::Odd => serialport::Parity::Odd,
                Parity::Even => serialport::Parity::Even,
            })
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(poll_interval);

        let mut port = builder.open_native().map_err(|source| SerTermError::DeviceOpen {
            path: path.to_string(),
            source,
        })?;
        port.set_exclusive(true)
            .map_err(|source| SerTermError::DeviceOpen {
                path: path.to_string(),
                source,
            })?;

        info!("Serial device {} opened", path);

        Ok(Self {
            port,
            path: path.to_string(),
        })
    }

    /// Second handle on the same open device, for the other duplex path.
    pub fn try_clone(&self) -> SerTermResult<Self> {
        let port = self
            .port
            .try_clone_native()
            .map_err(|source| SerTermError::DeviceOpen {
                path: self.path.clone(),
                source,
            })?;
        Ok(Self {
            port,
            path: self.path.clone(),
        })
    }
}

impl AsFd for SerialDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        // SAFETY: the descriptor is owned by `self.port` and stays open for
        // as long as `self` is borrowed.
        unsafe { BorrowedFd::borrow_raw(self.port.as_raw_fd()) }
    }
}

impl Read for SerialDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}
