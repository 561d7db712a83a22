use crate::core::coordinator::RelayCoordinator;
use crate::core::escape::EscapeDispatcher;
use crate::core::relay::downlink::CaptureLog;
use crate::core::relay::{Downlink, Uplink, UplinkExit};
use crate::domain::config::{escape_name, SessionConfig};
use crate::domain::error::{SerTermError, SerTermResult};
use crate::infrastructure::helper::ExternalHelpers;
use crate::infrastructure::serial::{configure, SerialDevice};
use crate::infrastructure::terminal::{Terminal, TerminalGuard};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info};

pub const FAREWELL: &[u8] = b"Exiting\n";

/// How a session that ended cleanly was ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Escape byte followed by `q`
    Quit,
    /// The keyboard closed
    EndOfInput,
}

impl From<UplinkExit> for SessionEnd {
    fn from(exit: UplinkExit) -> Self {
        match exit {
            UplinkExit::Quit => SessionEnd::Quit,
            UplinkExit::EndOfInput => SessionEnd::EndOfInput,
        }
    }
}

/// The one terminal to serial connection of this process
pub struct Session {
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Lines printed before the terminal goes raw
    pub fn startup_banner(&self) -> String {
        let key = escape_name(self.config.escape);
        format!(
            "Terminal starting up...\nUse {0}-q ({0}, followed by q) to quit.\n",
            key
        )
    }

    /// Run the relay until the user quits, the keyboard closes, a fatal read
    /// error occurs or a termination signal arrives. The host terminal is
    /// back in its original mode whenever this returns.
    pub async fn run(self) -> SerTermResult<SessionEnd> {
        let banner = self.startup_banner();
        let config = self.config;
        let mut signals = TerminationSignals::new()?;

        let log = match &config.log_path {
            Some(path) => Some(open_log(path)?),
            None => None,
        };

        let terminal = Terminal::from_stdio()?;
        let mut screen = terminal.output()?;
        screen.write_all(banner.as_bytes())?;

        let device = SerialDevice::open(&config.device, &config.line, config.read_timeout)?;
        configure(&device, &config.line)?;

        // From here on every return path goes through the guard
        let guard = TerminalGuard::enter(terminal.control_fd()?)?;
        let coordinator = Arc::new(RelayCoordinator::new());

        let downlink = Downlink::new(
            device.try_clone()?,
            terminal.output()?,
            log.clone(),
            Arc::clone(&coordinator),
        );
        let helpers = ExternalHelpers::new(device.try_clone()?, config.helpers.clone(), config.line);
        let dispatcher = EscapeDispatcher::new(terminal.output()?, helpers, config.escape, config.protocol);
        let mut uplink = Uplink::new(
            terminal.input()?,
            device,
            dispatcher,
            Arc::clone(&coordinator),
            config.escape,
            config.raw_keyboard,
        );

        info!("session started on {}", config.device);
        let mut downlink_task = tokio::task::spawn_blocking(move || downlink.run());
        let uplink_task = tokio::task::spawn_blocking(move || uplink.run());

        let ended = tokio::select! {
            result = uplink_task => Ended::Uplink(joined(result)),
            result = &mut downlink_task => Ended::Downlink(joined(result)),
            name = signals.recv() => Ended::Signal(name),
        };

        let grace = config.read_timeout + Duration::from_secs(1);
        let result = match ended {
            Ended::Uplink(result) => {
                stop_downlink(&coordinator, &mut downlink_task, grace).await;
                result.map(SessionEnd::from)
            }
            Ended::Downlink(result) => Err(match result {
                Err(e) => e,
                Ok(()) => SerTermError::Task("serial relay stopped".to_string()),
            }),
            Ended::Signal(name) => {
                info!("terminated by {}", name);
                stop_downlink(&coordinator, &mut downlink_task, grace).await;
                Err(SerTermError::Signal { signal: name })
            }
        };

        // The downlink may still hold the log if it missed the grace period
        let flushed = match &log {
            Some(log) => log.flush(),
            None => Ok(()),
        };

        guard.restore()?;
        let end = result?;
        flushed?;
        screen.write_all(FAREWELL)?;
        info!("session ended: {:?}", end);
        Ok(end)
    }
}

async fn stop_downlink(
    coordinator: &RelayCoordinator,
    task: &mut JoinHandle<SerTermResult<()>>,
    grace: Duration,
) {
    coordinator.terminate_downlink();
    match tokio::time::timeout(grace, task).await {
        Ok(stopped) => {
            if let Err(e) = joined(stopped) {
                debug!("downlink ended with error during teardown: {}", e);
            }
        }
        Err(_) => debug!("downlink did not stop within {:?}", grace),
    }
}

enum Ended {
    Uplink(SerTermResult<UplinkExit>),
    Downlink(SerTermResult<()>),
    Signal(&'static str),
}

fn joined<T>(result: Result<SerTermResult<T>, JoinError>) -> SerTermResult<T> {
    result.map_err(|e| SerTermError::Task(e.to_string()))?
}

/// Open the capture file for received bytes, appending to what is there.
pub fn open_log(path: &Path) -> SerTermResult<CaptureLog> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SerTermError::LogOpen {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(CaptureLog::new(BufWriter::new(file)))
}

/// Signals that end the session from outside. The keyboard cannot raise
/// them while the terminal is raw.
struct TerminationSignals {
    terminate: Signal,
    interrupt: Signal,
    hangup: Signal,
}

impl TerminationSignals {
    fn new() -> SerTermResult<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.hangup.recv() => "SIGHUP",
        }
    }
}
