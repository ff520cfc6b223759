//! Compute device discovery and selection.
//!
//! Discovery runs an external helper that prints the device list as JSON.
//! Selection ranks the devices by architecture priority and is memoized for
//! the lifetime of the process.

pub mod arch;
pub mod selector;

pub use arch::{ArchEntry, ArchTable, Architecture};
pub use selector::{
    discover_devices, parse_discovery_output, select_best, DeviceDescriptor, DeviceIndex,
    DeviceSelector, SelectedDevice,
};

/// Environment variable read by the oneAPI runtime to pick devices.
pub const DEVICE_SELECTOR_VAR: &str = "ONEAPI_DEVICE_SELECTOR";

/// Selector value that exposes every level-zero device, in driver order.
pub const ALL_DEVICES_SELECTOR: &str = "level_zero:*";
