use std::path::PathBuf;
use thiserror::Error;

/// SerTerm unified error type
#[derive(Error, Debug)]
pub enum SerTermError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{path}: {source}")]
    DeviceOpen {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("{}: {source}", path.display())]
    LogOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Terminal mode error: {0}")]
    Terminal(#[source] nix::Error),

    #[error("Serial setup error: {0}")]
    SerialSetup(#[source] nix::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial read failed: {0}")]
    DownlinkRead(#[source] std::io::Error),

    #[error("Keyboard read failed: {0}")]
    UplinkRead(#[source] std::io::Error),

    #[error("{program}: {source}")]
    Helper {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{direction} not supported with this protocol.")]
    UnsupportedDirection { direction: &'static str },

    #[error("Terminated by {signal}")]
    Signal { signal: &'static str },

    #[error("Relay task failed: {0}")]
    Task(String),
}

impl SerTermError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Process exit status for this error. Every failure maps to 1.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

pub type SerTermResult<T> = Result<T, SerTermError>;
