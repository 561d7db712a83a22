// Relay module - The two duplex paths
pub mod downlink;
pub mod uplink;

pub use downlink::Downlink;
pub use uplink::{Uplink, UplinkExit};

use std::io::{self, ErrorKind, Read};

pub const LINE_FEED: u8 = b'\n';
pub const CARRIAGE_RETURN: u8 = b'\r';

/// Clear the high bit; the relay only carries 7-bit characters.
pub fn mask_high_bit(byte: u8) -> u8 {
    byte & 0x7F
}

/// Byte actually sent for a keystroke. Unless the keyboard is raw, newline
/// goes out as carriage return.
pub fn translate_keystroke(byte: u8, raw_keyboard: bool) -> u8 {
    if !raw_keyboard && byte == LINE_FEED {
        CARRIAGE_RETURN
    } else {
        byte
    }
}

/// Read exactly one byte, retrying interrupted reads. `None` means end of input.
pub fn read_byte<R: Read + ?Sized>(reader: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
