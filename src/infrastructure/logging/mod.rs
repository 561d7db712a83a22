// Logging module - Logging infrastructure
use crate::domain::error::{SerTermError, SerTermResult};
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter. The terminal runs in raw mode, so only problems are shown
/// unless RUST_LOG asks for more.
pub const DEFAULT_FILTER: &str = "serterm=warn";

/// Initialize logging system
///
/// Diagnostics go to `trace_file` when given, otherwise to stderr.
pub fn init_logging(trace_file: Option<&Path>) -> SerTermResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = match trace_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| SerTermError::LogOpen {
                    path: path.to_path_buf(),
                    source,
                })?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true),
            )
        }
        None => None,
    };

    let stderr_layer = match trace_file {
        Some(_) => None,
        None => Some(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_level(true),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| SerTermError::config(format!("Failed to initialize logging: {}", e)))?;

    tracing::debug!("SerTerm logging system initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coordinator::RelayCoordinator;
    use crate::core::escape::{EscapeDispatcher, TransferDirection, TransferHost, TransferRequest};
    use crate::core::relay::Downlink;
    use crate::domain::config::{Protocol, DEFAULT_ESCAPE};
    use std::io::{Cursor, ErrorKind, Read, Write};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct MissingHelper;

    impl TransferHost for MissingHelper {
        fn supports(&self, _: Protocol, direction: TransferDirection) -> bool {
            direction == TransferDirection::Send
        }

        fn run_helper(&mut self, _: &TransferRequest) -> SerTermResult<()> {
            Err(SerTermError::Helper {
                program: "lsz".to_string(),
                source: io::Error::from(ErrorKind::NotFound),
            })
        }

        fn reapply_line_settings(&mut self) -> SerTermResult<()> {
            Ok(())
        }
    }

    struct HungUp;

    impl Read for HungUp {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from(ErrorKind::BrokenPipe))
        }
    }

    /// Failures the user already sees on screen must not also reach stderr,
    /// which is the raw terminal during a session.
    #[test]
    fn test_reported_failures_stay_off_stderr() {
        let diagnostics = Captured::default();
        let writer = diagnostics.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(DEFAULT_FILTER))
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            for (protocol, keys) in [(Protocol::Zmodem, &b"sfw.bin\r"[..]), (Protocol::Text, &b"r"[..])] {
                let mut dispatcher = EscapeDispatcher::new(Vec::<u8>::new(), MissingHelper, DEFAULT_ESCAPE, protocol);
                dispatcher
                    .dispatch(&mut Cursor::new(keys.to_vec()), &mut Vec::<u8>::new())
                    .unwrap();
            }

            let coordinator = Arc::new(RelayCoordinator::new());
            let downlink = Downlink::new(HungUp, Vec::<u8>::new(), None, coordinator);
            assert!(downlink.run().is_err());
        });

        let diagnostics = diagnostics.0.lock().unwrap();
        assert!(
            diagnostics.is_empty(),
            "unexpected diagnostics: {}",
            String::from_utf8_lossy(&diagnostics)
        );
    }

    #[test]
    fn test_logging_init_to_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("trace.log");

        // Only one global subscriber per process; a second init reports an error
        let first = init_logging(Some(&path));
        assert!(first.is_ok());
        assert!(path.exists());
        assert!(init_logging(None).is_err());
    }

    #[test]
    fn test_unwritable_trace_file() {
        let result = init_logging(Some(Path::new("/nonexistent-dir/trace.log")));
        assert!(matches!(result, Err(SerTermError::LogOpen { .. })));
    }
}
