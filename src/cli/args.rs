use crate::domain::config::{
    BaudRate, DataBits, LineSettings, Parity, Protocol, SerTermConfig, SessionConfig,
};
use crate::domain::error::{SerTermError, SerTermResult};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const USAGE_HINT: &str =
    "Usage is: serterm [-eo7r] [-s <speed>] [-p <protocol>] [-l <log>] [<tty>]";

/// Command line arguments for SerTerm
#[derive(Parser, Debug)]
#[command(
    name = "serterm",
    version = env!("CARGO_PKG_VERSION"),
    about = "Duplex serial terminal with external file transfer helpers",
    long_about = "Connects the keyboard and screen to a serial device. Press the escape key (Ctrl-Z by default) followed by r, s or q to receive a file, send a file or quit."
)]
pub struct Args {
    /// Line speed (300, 1200, 2400, 9600, 19200, 38400, 115200)
    #[arg(short = 's', long = "speed", default_value = "9600")]
    pub speed: String,

    /// Transfer protocol family (x, y, z, txt)
    #[arg(short = 'p', long = "protocol", default_value = "z")]
    pub protocol: String,

    /// Append everything received to this file
    #[arg(short = 'l', long = "log")]
    pub log: Option<PathBuf>,

    /// Odd parity
    #[arg(short = 'o')]
    pub odd: bool,

    /// Even parity
    #[arg(short = 'e')]
    pub even: bool,

    /// Seven data bits (default is eight)
    #[arg(short = '7')]
    pub seven_bits: bool,

    /// Send newline as typed instead of translating it to carriage return
    #[arg(short = 'r', long = "raw")]
    pub raw_keyboard: bool,

    /// Configuration file path
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Write diagnostics to this file instead of stderr
    #[arg(long = "trace-file")]
    pub trace_file: Option<PathBuf>,

    /// Serial device
    pub tty: Option<String>,
}

impl Args {
    /// Validate the flags and merge them over the configuration file.
    pub fn into_session_config(self, file: SerTermConfig) -> SerTermResult<SessionConfig> {
        let parity = Parity::from_flags(self.odd, self.even)?;
        let baud_rate: BaudRate = self.speed.parse()?;
        let protocol: Protocol = self.protocol.parse()?;

        // Keystrokes are masked to seven bits before the escape check
        let escape = file.terminal.escape;
        if escape >= 0x80 {
            return Err(SerTermError::config(format!(
                "Illegal escape character: {:#04x}",
                escape
            )));
        }
        if file.terminal.read_timeout_ms == 0 {
            return Err(SerTermError::config("read_timeout_ms must be at least 1"));
        }

        let line = LineSettings {
            baud_rate,
            parity,
            data_bits: if self.seven_bits {
                DataBits::Seven
            } else {
                DataBits::Eight
            },
            ..LineSettings::default()
        };

        Ok(SessionConfig {
            device: self.tty.unwrap_or(file.terminal.default_device),
            line,
            protocol,
            log_path: self.log,
            raw_keyboard: self.raw_keyboard,
            escape,
            read_timeout: Duration::from_millis(file.terminal.read_timeout_ms),
            helpers: file.helpers,
        })
    }
}
