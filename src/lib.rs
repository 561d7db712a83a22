//! SerTerm Library
//!
//! Duplex serial terminal: relays keystrokes to a serial device and device
//! output to the screen on two concurrent paths, and hands the line to
//! external file transfer programs on request.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use crate::core::coordinator::{DownlinkState, RelayCoordinator};
pub use crate::core::escape::{EscapeDispatcher, EscapeOutcome, TransferDirection, TransferHost, TransferRequest};
pub use crate::core::relay::{Downlink, Uplink, UplinkExit};
pub use crate::core::session::{Session, SessionEnd};
pub use crate::domain::config::{SerTermConfig, SessionConfig};
pub use crate::domain::error::{SerTermError, SerTermResult};
