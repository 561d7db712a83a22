use crate::core::escape::{TransferDirection, TransferHost, TransferRequest};
use crate::domain::config::{HelpersConfig, LineSettings, Protocol};
use crate::domain::error::{SerTermError, SerTermResult};
use crate::infrastructure::serial::configure;
use std::os::fd::{AsFd, OwnedFd};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Runs external transfer programs against the serial line.
///
/// The helper's stdin and stdout are the serial device; stderr stays on the
/// user's terminal so progress output is visible. Its exit status is logged
/// and otherwise ignored.
pub struct ExternalHelpers<D> {
    device: D,
    helpers: HelpersConfig,
    line: LineSettings,
}

impl<D: AsFd> ExternalHelpers<D> {
    pub fn new(device: D, helpers: HelpersConfig, line: LineSettings) -> Self {
        Self { device, helpers, line }
    }

    fn command_line(&self, protocol: Protocol, direction: TransferDirection) -> Option<&[String]> {
        let commands = self.helpers.for_protocol(protocol);
        let command = match direction {
            TransferDirection::Receive => commands.receive.as_deref(),
            TransferDirection::Send => commands.send.as_deref(),
        };
        command.filter(|argv| !argv.is_empty())
    }

    /// Full argument vector for `request`, file name last.
    pub fn argv(&self, request: &TransferRequest) -> Option<Vec<String>> {
        let mut argv = self.command_line(request.protocol, request.direction)?.to_vec();
        if let Some(filename) = &request.filename {
            argv.push(filename.clone());
        }
        Some(argv)
    }

    fn line_fd(&self) -> std::io::Result<OwnedFd> {
        self.device.as_fd().try_clone_to_owned()
    }
}

impl<D: AsFd> TransferHost for ExternalHelpers<D> {
    fn supports(&self, protocol: Protocol, direction: TransferDirection) -> bool {
        self.command_line(protocol, direction).is_some()
    }

    fn run_helper(&mut self, request: &TransferRequest) -> SerTermResult<()> {
        let unsupported = || SerTermError::UnsupportedDirection {
            direction: match request.direction {
                TransferDirection::Receive => "Receive",
                TransferDirection::Send => "Transmit",
            },
        };
        let argv = self.argv(request).ok_or_else(unsupported)?;
        let (program, args) = argv.split_first().ok_or_else(unsupported)?;

        let stdin = self.line_fd()?;
        let stdout = self.line_fd()?;
        info!("running helper: {}", argv.join(" "));

        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| SerTermError::Helper {
                program: program.clone(),
                source,
            })?;

        debug!("helper {} returned: {}", program, status);
        Ok(())
    }

    fn reapply_line_settings(&mut self) -> SerTermResult<()> {
        configure(&self.device, &self.line)
    }
}
