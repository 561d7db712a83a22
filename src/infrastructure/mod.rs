// Infrastructure module - External dependencies and adapters
pub mod config;
pub mod helper;
pub mod logging;
pub mod serial;
pub mod terminal;
