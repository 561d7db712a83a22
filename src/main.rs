// SerTerm - Duplex serial terminal
use clap::Parser;
use serterm::cli::{Args, USAGE_HINT};
use serterm::infrastructure::config::ConfigManager;
use serterm::infrastructure::logging::init_logging;
use serterm::{SerTermError, Session};
use std::process;

#[tokio::main]
async fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    if let Err(e) = init_logging(args.trace_file.as_deref()) {
        eprintln!("{}", e);
        process::exit(e.exit_code());
    }

    let manager = match &args.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    };
    let config = match manager
        .load_config()
        .and_then(|file| args.into_session_config(file))
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            if matches!(e, SerTermError::Config { .. }) {
                eprintln!("{}", USAGE_HINT);
            }
            process::exit(e.exit_code());
        }
    };

    // Blocking relay threads may still be parked in reads; exit explicitly
    let code = match Session::new(config).run().await {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    };
    process::exit(code);
}
