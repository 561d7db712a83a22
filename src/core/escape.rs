use crate::core::relay::{mask_high_bit, read_byte, CARRIAGE_RETURN, LINE_FEED};
use crate::domain::config::Protocol;
use crate::domain::error::{SerTermError, SerTermResult};
use std::io::{Read, Write};
use tracing::{debug, info};

pub const HELP_MESSAGE: &[u8] = b"Options are: <r>eceive, <s>end, <q>uit\r\n";

/// Longest file name kept from the prompt
pub const MAX_FILENAME: usize = 59;

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7F;

/// Direction of a file transfer, from this side's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Receive,
    Send,
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferDirection::Receive => write!(f, "Receive"),
            TransferDirection::Send => write!(f, "Transmit"),
        }
    }
}

/// One file transfer, built for a single escape and dropped afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub protocol: Protocol,
    pub direction: TransferDirection,
    pub filename: Option<String>,
}

/// Where transfers actually happen
pub trait TransferHost {
    /// Whether the protocol family can move files in `direction`.
    fn supports(&self, protocol: Protocol, direction: TransferDirection) -> bool;

    /// Run the helper program to completion.
    fn run_helper(&mut self, request: &TransferRequest) -> SerTermResult<()>;

    /// Put the serial line back the way the session wants it.
    fn reapply_line_settings(&mut self) -> SerTermResult<()>;
}

/// Result of handling one escape sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeOutcome {
    /// Keep relaying
    Continue,
    /// The user asked to quit
    Quit,
    /// The keyboard closed while a command was being read
    EndOfInput,
}

/// Interprets the byte after the escape byte
pub struct EscapeDispatcher<T, H> {
    screen: T,
    host: H,
    escape: u8,
    protocol: Protocol,
}

impl<T: Write, H: TransferHost> EscapeDispatcher<T, H> {
    pub fn new(screen: T, host: H, escape: u8, protocol: Protocol) -> Self {
        Self {
            screen,
            host,
            escape,
            protocol,
        }
    }

    /// Read the sub-command from `keyboard` and act on it. Literal escapes go
    /// to `serial`.
    pub fn dispatch<K, S>(&mut self, keyboard: &mut K, serial: &mut S) -> SerTermResult<EscapeOutcome>
    where
        K: Read + ?Sized,
        S: Write + ?Sized,
    {
        let command = match read_byte(keyboard).map_err(SerTermError::UplinkRead)? {
            Some(byte) => mask_high_bit(byte),
            None => return Ok(EscapeOutcome::EndOfInput),
        };
        debug!("escape command {:#04x}", command);

        if command == self.escape {
            serial.write_all(&[command])?;
            serial.flush()?;
            return Ok(EscapeOutcome::Continue);
        }

        match command {
            b'q' | b'Q' => Ok(EscapeOutcome::Quit),
            b'r' | b'R' => self.transfer(TransferDirection::Receive, keyboard),
            b's' | b'S' | b't' | b'T' => self.transfer(TransferDirection::Send, keyboard),
            _ => {
                self.screen.write_all(HELP_MESSAGE)?;
                self.screen.flush()?;
                Ok(EscapeOutcome::Continue)
            }
        }
    }

    fn transfer<K: Read + ?Sized>(
        &mut self,
        direction: TransferDirection,
        keyboard: &mut K,
    ) -> SerTermResult<EscapeOutcome> {
        let needs_filename = match direction {
            TransferDirection::Receive => self.protocol.receive_needs_filename(),
            TransferDirection::Send => true,
        };

        // Sends ask for the file first, whatever the protocol
        let filename = if needs_filename {
            let prompt: &[u8] = match direction {
                TransferDirection::Receive => b"Receive file: ",
                TransferDirection::Send => b"Send file: ",
            };
            match self.prompt_filename(prompt, keyboard)? {
                Some(name) if !name.is_empty() => Some(name),
                Some(_) => {
                    self.report("No file name given.")?;
                    return Ok(EscapeOutcome::Continue);
                }
                None => return Ok(EscapeOutcome::EndOfInput),
            }
        } else {
            None
        };

        if !self.host.supports(self.protocol, direction) {
            let unsupported = SerTermError::UnsupportedDirection {
                direction: match direction {
                    TransferDirection::Receive => "Receive",
                    TransferDirection::Send => "Transmit",
                },
            };
            debug!("{}", unsupported);
            self.report(&unsupported.to_string())?;
            return Ok(EscapeOutcome::Continue);
        }

        let request = TransferRequest {
            protocol: self.protocol,
            direction,
            filename,
        };
        info!("starting {} transfer ({})", direction, self.protocol);

        if let Err(e) = self.host.run_helper(&request) {
            debug!("transfer helper failed: {}", e);
            self.report(&e.to_string())?;
        }
        self.host.reapply_line_settings()?;
        Ok(EscapeOutcome::Continue)
    }

    /// Prompt and collect a line, echoing as the user types. Returns `None`
    /// if the keyboard closes first.
    fn prompt_filename<K: Read + ?Sized>(
        &mut self,
        prompt: &[u8],
        keyboard: &mut K,
    ) -> SerTermResult<Option<String>> {
        self.screen.write_all(prompt)?;
        self.screen.flush()?;

        let mut name = Vec::with_capacity(MAX_FILENAME);
        loop {
            let byte = match read_byte(keyboard).map_err(SerTermError::UplinkRead)? {
                Some(byte) => mask_high_bit(byte),
                None => return Ok(None),
            };

            match byte {
                CARRIAGE_RETURN | LINE_FEED => {
                    self.screen.write_all(b"\r\n")?;
                    self.screen.flush()?;
                    return Ok(Some(String::from_utf8_lossy(&name).into_owned()));
                }
                BACKSPACE | DELETE => {
                    if name.pop().is_some() {
                        self.screen.write_all(b"\x08 \x08")?;
                    }
                }
                _ => {
                    self.screen.write_all(&[byte])?;
                    if name.len() < MAX_FILENAME {
                        name.push(byte);
                    }
                }
            }
            self.screen.flush()?;
        }
    }

    fn report(&mut self, message: &str) -> SerTermResult<()> {
        self.screen.write_all(message.as_bytes())?;
        self.screen.write_all(b"\r\n")?;
        self.screen.flush()?;
        Ok(())
    }
}
