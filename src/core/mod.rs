// Core module - Duplex relay, escape handling and session lifecycle
pub mod coordinator;
pub mod escape;
pub mod relay;
pub mod session;

pub use coordinator::{DownlinkState, RelayCoordinator};
pub use escape::{EscapeDispatcher, EscapeOutcome, TransferDirection, TransferHost, TransferRequest};
pub use session::{Session, SessionEnd};
