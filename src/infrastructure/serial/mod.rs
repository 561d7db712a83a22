// Serial module - Device access and line configuration
pub mod configurator;
pub mod device;

pub use configurator::configure;
pub use device::SerialDevice;
