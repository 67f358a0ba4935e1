//! Snapshot of what the installed adapter libraries can provide
//!
//! A catalog is produced by enumerating the driver libraries once and is then
//! handed to the device graph. It is never refreshed behind the caller's back;
//! rescanning hardware means building and installing a new catalog.

use serde::{Deserialize, Serialize};

use crate::device::Device;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareCatalog {
    /// Every non-serial adapter found
    pub devices: Vec<Device>,
    /// Subset of `devices` that are hubs
    pub hubs: Vec<Device>,
    /// Serial ports, named after their adapter
    pub ports: Vec<Device>,
    /// Libraries that could not be enumerated or were empty
    pub bad_libraries: Vec<String>,
}

impl HardwareCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an enumerated adapter, sorting it into devices, hubs or ports
    pub fn add(&mut self, mut device: Device) {
        if device.is_serial_port() {
            device.name = device.adapter.clone();
            if !self.ports.iter().any(|p| p.name == device.name) {
                self.ports.push(device);
            }
            return;
        }
        if device.is_hub() {
            self.hubs.push(device.clone());
        }
        self.devices.push(device);
    }

    pub fn find(&self, library: &str, adapter: &str) -> Option<&Device> {
        self.devices
            .iter()
            .find(|d| d.library == library && d.adapter == adapter)
    }

    /// Description of an adapter, empty when unknown
    pub fn description(&self, library: &str, adapter: &str) -> String {
        self.find(library, adapter)
            .map(|d| d.description.clone())
            .unwrap_or_default()
    }

    pub fn has_library(&self, library: &str) -> bool {
        self.devices.iter().any(|d| d.library == library)
    }

    pub fn find_port(&self, name: &str) -> Option<&Device> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// Available devices minus those reached through hub discovery
    ///
    /// When a library provides a hub, its non-hub adapters are expected to show
    /// up as hub peripherals and are left out of the list.
    pub fn available_devices_compact(&self) -> Vec<&Device> {
        self.devices
            .iter()
            .filter(|d| d.is_hub() || !self.hubs.iter().any(|h| h.library == d.library))
            .collect()
    }
}
