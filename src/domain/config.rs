use crate::domain::error::{SerTermError, SerTermResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Largest chunk the downlink reads from the serial device at once.
pub const DOWNLINK_CHUNK: usize = 30;

/// Control-Z
pub const DEFAULT_ESCAPE: u8 = 0x1A;

pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";

/// Supported line speeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BaudRate {
    B300,
    B1200,
    B2400,
    #[default]
    B9600,
    B19200,
    B38400,
    B115200,
}

impl BaudRate {
    pub fn as_u32(self) -> u32 {
        match self {
            BaudRate::B300 => 300,
            BaudRate::B1200 => 1200,
            BaudRate::B2400 => 2400,
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B115200 => 115200,
        }
    }
}

impl FromStr for BaudRate {
    type Err = SerTermError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "300" => Ok(BaudRate::B300),
            "1200" => Ok(BaudRate::B1200),
            "2400" => Ok(BaudRate::B2400),
            "9600" => Ok(BaudRate::B9600),
            "19200" => Ok(BaudRate::B19200),
            "38400" => Ok(BaudRate::B38400),
            "115200" => Ok(BaudRate::B115200),
            _ => Err(SerTermError::config(format!("Illegal speed: {}", s))),
        }
    }
}

impl std::fmt::Display for BaudRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Parity configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    /// Resolve the `-o` / `-e` command line flags. Both together is an error.
    pub fn from_flags(odd: bool, even: bool) -> SerTermResult<Self> {
        match (odd, even) {
            (true, true) => Err(SerTermError::config(
                "Can't select both even and odd parity.",
            )),
            (true, false) => Ok(Parity::Odd),
            (false, true) => Ok(Parity::Even),
            (false, false) => Ok(Parity::None),
        }
    }
}

/// Character width on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DataBits {
    Seven,
    #[default]
    Eight,
}

/// File transfer protocol family handed to the external helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Protocol {
    Xmodem,
    Ymodem,
    #[default]
    Zmodem,
    Text,
}

impl Protocol {
    /// XMODEM carries no file name, so the user is asked for one on receive.
    pub fn receive_needs_filename(self) -> bool {
        matches!(self, Protocol::Xmodem)
    }
}

impl FromStr for Protocol {
    type Err = SerTermError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x" => Ok(Protocol::Xmodem),
            "y" => Ok(Protocol::Ymodem),
            "z" => Ok(Protocol::Zmodem),
            "txt" => Ok(Protocol::Text),
            _ => Err(SerTermError::config(format!("Illegal protocol: {}", s))),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Xmodem => write!(f, "x"),
            Protocol::Ymodem => write!(f, "y"),
            Protocol::Zmodem => write!(f, "z"),
            Protocol::Text => write!(f, "txt"),
        }
    }
}

/// Serial line parameters applied by the configurator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    pub baud_rate: BaudRate,
    pub parity: Parity,
    pub data_bits: DataBits,
    /// VMIN
    pub min_bytes: u8,
    /// VTIME, in tenths of a second
    pub inter_byte_timeout: u8,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            baud_rate: BaudRate::default(),
            parity: Parity::default(),
            data_bits: DataBits::default(),
            min_bytes: DOWNLINK_CHUNK as u8,
            inter_byte_timeout: 1,
        }
    }
}

/// Helper command lines for one protocol. The file name, when there is
/// one, is appended as the final argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HelperCommands {
    #[serde(default)]
    pub receive: Option<Vec<String>>,
    #[serde(default)]
    pub send: Option<Vec<String>>,
}

impl HelperCommands {
    fn new(receive: Option<&str>, send: &str) -> Self {
        Self {
            receive: receive.map(|program| vec![program.to_string()]),
            send: Some(vec![send.to_string()]),
        }
    }
}

/// Helper programs per protocol family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpersConfig {
    #[serde(default = "default_xmodem_helpers")]
    pub x: HelperCommands,
    #[serde(default = "default_ymodem_helpers")]
    pub y: HelperCommands,
    #[serde(default = "default_zmodem_helpers")]
    pub z: HelperCommands,
    #[serde(default = "default_text_helpers")]
    pub txt: HelperCommands,
}

impl HelpersConfig {
    pub fn for_protocol(&self, protocol: Protocol) -> &HelperCommands {
        match protocol {
            Protocol::Xmodem => &self.x,
            Protocol::Ymodem => &self.y,
            Protocol::Zmodem => &self.z,
            Protocol::Text => &self.txt,
        }
    }
}

impl Default for HelpersConfig {
    fn default() -> Self {
        Self {
            x: default_xmodem_helpers(),
            y: default_ymodem_helpers(),
            z: default_zmodem_helpers(),
            txt: default_text_helpers(),
        }
    }
}

/// Terminal section of the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Escape byte that introduces a command
    #[serde(default = "default_escape")]
    pub escape: u8,
    /// Serial device used when none is given on the command line
    #[serde(default = "default_device")]
    pub default_device: String,
    /// Downlink poll interval in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            escape: default_escape(),
            default_device: default_device(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

/// SerTerm configuration file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SerTermConfig {
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub helpers: HelpersConfig,
}

/// Everything one session needs, resolved once at startup
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub device: String,
    pub line: LineSettings,
    pub protocol: Protocol,
    pub log_path: Option<PathBuf>,
    /// Send newline as typed instead of translating it to carriage return
    pub raw_keyboard: bool,
    pub escape: u8,
    pub read_timeout: Duration,
    pub helpers: HelpersConfig,
}

impl SessionConfig {
    pub fn new(device: impl Into<String>) -> Self {
        let terminal = TerminalConfig::default();
        Self {
            device: device.into(),
            line: LineSettings::default(),
            protocol: Protocol::default(),
            log_path: None,
            raw_keyboard: false,
            escape: terminal.escape,
            read_timeout: Duration::from_millis(terminal.read_timeout_ms),
            helpers: HelpersConfig::default(),
        }
    }
}

/// Human name for the escape byte, e.g. `^Z`.
pub fn escape_name(escape: u8) -> String {
    if escape < 0x20 {
        format!("^{}", (escape + b'@') as char)
    } else if escape == 0x7F {
        "^?".to_string()
    } else {
        (escape as char).to_string()
    }
}

// Default value functions
fn default_escape() -> u8 {
    DEFAULT_ESCAPE
}

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

fn default_read_timeout() -> u64 {
    100
}

fn default_xmodem_helpers() -> HelperCommands {
    HelperCommands::new(Some("lrx"), "lsx")
}

fn default_ymodem_helpers() -> HelperCommands {
    HelperCommands::new(Some("lry"), "lsy")
}

fn default_zmodem_helpers() -> HelperCommands {
    HelperCommands::new(Some("lrz"), "lsz")
}

fn default_text_helpers() -> HelperCommands {
    HelperCommands::new(None, "cat")
}
