use super::arch::{ArchTable, Architecture};
use super::{ALL_DEVICES_SELECTOR, DEVICE_SELECTOR_VAR};
use crate::error::{Result, SupervisorError};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::process::Command;
use tokio::sync::OnceCell;

/// One device as reported by the discovery helper.
///
/// `id` is the ordinal within a single discovery call and doubles as the
/// device selector argument.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub id: u32,
    pub name: String,
    pub device_id: u32,
}

/// Position inside the (never re-sorted) discovery result.
pub type DeviceIndex = usize;

/// Validates the helper's stdout: a JSON array with at least one device.
pub fn parse_discovery_output(stdout: &str) -> Result<Vec<DeviceDescriptor>> {
    let devices: Vec<DeviceDescriptor> = serde_json::from_str(stdout.trim())
        .map_err(|e| SupervisorError::discovery(format!("malformed helper output: {}", e)))?;
    if devices.is_empty() {
        return Err(SupervisorError::discovery("helper reported no devices"));
    }
    Ok(devices)
}

/// Picks the device with the strictly highest architecture priority.
///
/// Devices with an unknown architecture are skipped; on equal priority the
/// earliest device wins.
pub fn select_best(
    devices: &[DeviceDescriptor],
    table: &ArchTable,
) -> Result<(DeviceIndex, Architecture)> {
    let mut best: Option<(DeviceIndex, &Architecture)> = None;
    for (index, device) in devices.iter().enumerate() {
        let Some(arch) = table.resolve(device.device_id) else {
            continue;
        };
        match best {
            Some((_, current)) if arch.priority <= current.priority => {}
            _ => best = Some((index, arch)),
        }
    }
    best.map(|(index, arch)| (index, arch.clone()))
        .ok_or(SupervisorError::NoSupportedDevice(devices.len()))
}

/// Runs the discovery helper with every device exposed and parses its output.
pub async fn discover_devices(helper: &Path) -> Result<Vec<DeviceDescriptor>> {
    let output = Command::new(helper)
        .env(DEVICE_SELECTOR_VAR, ALL_DEVICES_SELECTOR)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| SupervisorError::discovery(format!("failed to run {:?}: {}", helper, e)))?;

    if !output.status.success() {
        return Err(SupervisorError::discovery(format!(
            "helper {:?} exited with {}: {}",
            helper,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    info!("Devices: helper output: {}", stdout.trim());
    parse_discovery_output(&stdout)
}

/// Result of a successful selection.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedDevice {
    pub index: DeviceIndex,
    pub device: DeviceDescriptor,
    pub arch: Architecture,
    pub devices: Vec<DeviceDescriptor>,
}

impl SelectedDevice {
    /// Environment override that pins a worker to this device.
    pub fn selector_env(&self) -> (String, String) {
        (
            DEVICE_SELECTOR_VAR.to_string(),
            format!("level_zero:{}", self.device.id),
        )
    }
}

/// Memoizes the selected device for the lifetime of the process.
pub struct DeviceSelector {
    table: ArchTable,
    selected: OnceCell<SelectedDevice>,
}

impl DeviceSelector {
    pub fn new(table: ArchTable) -> Self {
        Self {
            table,
            selected: OnceCell::new(),
        }
    }

    /// `None` until a discovery has succeeded.
    pub fn selected(&self) -> Option<&SelectedDevice> {
        self.selected.get()
    }

    /// Returns the memoized selection, running discovery with `helper` first if needed.
    ///
    /// A failed discovery is not memoized; the next call retries.
    pub async fn ensure_selected(&self, helper: &Path) -> Result<&SelectedDevice> {
        self.selected
            .get_or_try_init(|| async {
                let devices = discover_devices(helper).await?;
                let (index, arch) = select_best(&devices, &self.table)?;
                let device = devices[index].clone();
                info!(
                    "Devices: selected device #{}: {} with device_id: 0x{:x}, arch: {}",
                    device.id, device.name, device.device_id, arch.tag
                );
                Ok(SelectedDevice {
                    index,
                    device,
                    arch,
                    devices,
                })
            })
            .await
    }
}
