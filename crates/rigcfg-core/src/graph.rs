//! Device registry with hub/peripheral links and serial-port bookkeeping

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::catalog::HardwareCatalog;
use crate::device::{Device, Role};
use crate::error::{ModelError, Result};

/// A node in the hub tree, for display and API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyNode {
    pub name: String,
    pub role: Role,
    /// Hub this device hangs off, if any
    pub parent: Option<String>,
    /// Devices naming this one as their hub
    pub children: Vec<String>,
    pub initialized: bool,
}

/// Registry of devices plus the serial ports they may use
#[derive(Debug, Clone)]
pub struct DeviceGraph {
    devices: Vec<Device>,
    /// Known serial ports; kept apart from ordinary devices
    ports: Vec<Device>,
    ports_in_use: BTreeSet<String>,
    catalog: HardwareCatalog,
    modified: bool,
}

impl Default for DeviceGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceGraph {
    /// Create a registry holding only the core device
    pub fn new() -> Self {
        Self {
            devices: vec![Device::core()],
            ports: Vec::new(),
            ports_in_use: BTreeSet::new(),
            catalog: HardwareCatalog::default(),
            modified: false,
        }
    }

    /// Install a fresh catalog snapshot; known ports are taken from it
    pub fn set_catalog(&mut self, catalog: HardwareCatalog) {
        self.ports = catalog.ports.clone();
        self.ports_in_use.clear();
        self.catalog = catalog;
    }

    pub fn catalog(&self) -> &HardwareCatalog {
        &self.catalog
    }

    /// Drop every device except a fresh core device; ports go back to the catalog's
    pub fn clear(&mut self) {
        self.devices.clear();
        self.devices.push(Device::core());
        self.ports = self.catalog.ports.clone();
        self.ports_in_use.clear();
        self.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.iter_mut()
    }

    pub fn device_names(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.name.clone()).collect()
    }

    pub fn find_device(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn find_device_mut(&mut self, name: &str) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.name == name)
    }

    pub fn core_device(&self) -> Option<&Device> {
        self.devices.iter().find(|d| d.is_core())
    }

    pub fn core_device_mut(&mut self) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.is_core())
    }

    /// Register a device; names must be non-empty and unused
    pub fn add_device(&mut self, device: Device) -> Result<()> {
        if device.name.is_empty() {
            return Err(ModelError::Duplicate(
                "empty device names are not allowed".to_string(),
            ));
        }
        if self.find_device(&device.name).is_some() {
            return Err(ModelError::Duplicate(device.name));
        }
        debug!(device = %device.name, library = %device.library, "Adding device");
        self.devices.push(device);
        self.modified = true;
        Ok(())
    }

    /// Remove a device, releasing its serial port once nobody else uses it
    ///
    /// Returns the removed device; absent names are not an error.
    pub fn remove_device(&mut self, name: &str) -> Option<Device> {
        let index = self.devices.iter().position(|d| d.name == name)?;
        let removed = self.devices.remove(index);

        if let Some(port) = removed.port() {
            let still_used = self.devices.iter().any(|d| d.port() == Some(port));
            if !still_used {
                self.ports_in_use.remove(port);
            }
        }

        self.modified = true;
        Some(removed)
    }

    /// Remove every device whose parent is `hub`, returning them in registry order
    pub fn detach_peripherals(&mut self, hub: &str) -> Vec<Device> {
        let names: Vec<String> = self
            .child_devices(hub)
            .iter()
            .map(|d| d.name.clone())
            .collect();
        names
            .iter()
            .filter_map(|name| self.remove_device(name))
            .collect()
    }

    pub fn child_devices(&self, hub: &str) -> Vec<&Device> {
        self.devices.iter().filter(|d| d.parent_hub == hub).collect()
    }

    /// Rename a device and repoint peripherals that referenced the old name
    pub fn rename_device(&mut self, old: &str, new: &str) -> Result<()> {
        if self.find_device(old).is_none() {
            return Err(ModelError::Reference(format!("device {old} is not defined")));
        }
        if new.is_empty() || (old != new && self.find_device(new).is_some()) {
            return Err(ModelError::Duplicate(new.to_string()));
        }
        for device in self.devices.iter_mut() {
            if device.name == old {
                device.name = new.to_string();
            } else if device.parent_hub == old {
                device.parent_hub = new.to_string();
            }
        }
        self.modified = true;
        Ok(())
    }

    pub fn has_adapter(&self, library: &str, adapter: &str) -> bool {
        self.devices
            .iter()
            .any(|d| d.library == library && d.adapter == adapter)
    }

    pub fn has_adapter_on_hub(&self, library: &str, hub: &str, adapter: &str) -> bool {
        self.devices
            .iter()
            .any(|d| d.library == library && d.adapter == adapter && d.parent_hub == hub)
    }

    pub fn ports(&self) -> &[Device] {
        &self.ports
    }

    pub fn find_serial_port(&self, name: &str) -> Option<&Device> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn find_serial_port_mut(&mut self, name: &str) -> Option<&mut Device> {
        self.ports.iter_mut().find(|p| p.name == name)
    }

    pub fn ports_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.ports.iter_mut()
    }

    /// Mark a port as used (or free); unknown ports become known when marked
    pub fn use_serial_port(&mut self, port: &Device, in_use: bool) {
        if in_use {
            if self.find_serial_port(&port.name).is_none() {
                self.ports.push(port.clone());
            }
            self.ports_in_use.insert(port.name.clone());
        } else {
            self.ports_in_use.remove(&port.name);
        }
    }

    pub fn is_port_in_use(&self, name: &str) -> bool {
        self.ports_in_use.contains(name)
    }

    pub fn ports_in_use(&self) -> impl Iterator<Item = &Device> {
        self.ports
            .iter()
            .filter(|p| self.ports_in_use.contains(&p.name))
    }

    /// Mark in use every known port that also appears as a registry device
    pub fn recompute_port_usage(&mut self) {
        let used: Vec<Device> = self
            .ports
            .iter()
            .filter_map(|p| self.find_device(&p.name).cloned())
            .collect();
        for device in &used {
            self.use_serial_port(device, true);
        }
    }

    /// Collapse ports that also exist as ordinary registry devices
    ///
    /// A registry device named like a known port replaces that port (keeping
    /// its setup properties) and leaves the device list. Remaining devices with
    /// the serial-port role move to the port list. Returns the affected names.
    pub fn remove_duplicate_com_ports(&mut self) -> Vec<String> {
        let mut moved = Vec::new();

        for i in 0..self.ports.len() {
            let name = self.ports[i].name.clone();
            if let Some(index) = self.devices.iter().position(|d| d.name == name) {
                let mut device = self.devices.remove(index);
                device.set_type(crate::device::DeviceType::Serial);
                self.ports[i] = device;
                moved.push(name);
            }
        }

        let strays: Vec<String> = self
            .devices
            .iter()
            .filter(|d| d.role() == Role::SerialPort)
            .map(|d| d.name.clone())
            .collect();
        for name in strays {
            if let Some(index) = self.devices.iter().position(|d| d.name == name) {
                let device = self.devices.remove(index);
                self.ports.push(device);
                moved.push(name);
            }
        }

        if !moved.is_empty() {
            debug!(ports = ?moved, "Collapsed duplicate serial ports");
            self.modified = true;
        }
        moved
    }

    /// Hub tree of the registry, excluding the core device
    pub fn topology(&self) -> Vec<TopologyNode> {
        self.devices
            .iter()
            .filter(|d| !d.is_core())
            .map(|d| TopologyNode {
                name: d.name.clone(),
                role: d.role(),
                parent: Some(d.parent_hub.clone()).filter(|p| !p.is_empty()),
                children: self
                    .child_devices(&d.name)
                    .iter()
                    .map(|c| c.name.clone())
                    .collect(),
                initialized: d.initialized,
            })
            .collect()
    }
}
