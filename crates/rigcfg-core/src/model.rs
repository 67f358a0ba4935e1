//! The complete rig configuration: devices, presets, calibration, dirty bit

use std::path::{Path, PathBuf};
use tracing::info;

use crate::catalog::HardwareCatalog;
use crate::config::ConfigModel;
use crate::consistency::{self, PruneReport};
use crate::device::{keyword, Device, Label, PropertyItem};
use crate::error::{ModelError, Result};
use crate::graph::DeviceGraph;

/// Configuration of an entire rig, from the hardware setup standpoint
#[derive(Debug, Clone)]
pub struct MicroscopeModel {
    pub graph: DeviceGraph,
    pub config: ConfigModel,
    synchro_devices: Vec<String>,
    file_name: Option<PathBuf>,
    modified: bool,
}

impl Default for MicroscopeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MicroscopeModel {
    /// An empty model: the core device plus the mandatory groups
    pub fn new() -> Self {
        let mut model = Self {
            graph: DeviceGraph::new(),
            config: ConfigModel::new(),
            synchro_devices: Vec::new(),
            file_name: None,
            modified: false,
        };
        model.repair();
        model.set_modified(false);
        model
    }

    pub fn with_catalog(catalog: HardwareCatalog) -> Self {
        let mut model = Self::new();
        model.graph.set_catalog(catalog);
        model
    }

    /// Back to the empty model; the catalog snapshot is kept
    pub fn reset(&mut self) {
        self.graph.clear();
        self.config.clear();
        self.synchro_devices.clear();
        self.repair();
        self.modified = true;
    }

    /// Re-add the core role properties and the mandatory groups if missing
    pub fn repair(&mut self) {
        self.add_missing_properties();
        self.add_system_configs();
    }

    fn add_missing_properties(&mut self) {
        if self.graph.core_device().is_none() {
            // the registry always starts with a core device; recreate it if lost
            let _ = self.graph.add_device(Device::core());
        }
        if let Some(core) = self.graph.core_device_mut() {
            for (name, default) in [
                (keyword::CORE_CAMERA, ""),
                (keyword::CORE_SHUTTER, ""),
                (keyword::CORE_FOCUS, ""),
                (keyword::CORE_AUTO_SHUTTER, "1"),
            ] {
                if core.find_setup_property(name).is_none() {
                    core.setup_properties.push(PropertyItem::new(name, default));
                }
            }
        }
    }

    fn add_system_configs(&mut self) {
        self.config.add_config_group(keyword::SYSTEM_GROUP);
        self.config.add_config_group(keyword::CHANNEL_GROUP);
        if let Some(system) = self.config.find_config_group_mut(keyword::SYSTEM_GROUP) {
            system.preset_entry(keyword::STARTUP_PRESET);
        }
    }

    pub fn is_modified(&self) -> bool {
        self.modified || self.graph.is_modified() || self.config.is_modified()
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
        self.graph.set_modified(modified);
        self.config.set_modified(modified);
    }

    pub fn file_name(&self) -> Option<&Path> {
        self.file_name.as_deref()
    }

    pub fn set_file_name(&mut self, path: impl Into<PathBuf>) {
        self.file_name = Some(path.into());
    }

    pub fn devices(&self) -> &[Device] {
        self.graph.devices()
    }

    pub fn find_device(&self, name: &str) -> Option<&Device> {
        self.graph.find_device(name)
    }

    pub fn add_device(&mut self, device: Device) -> Result<()> {
        self.graph.add_device(device)
    }

    pub fn remove_device(&mut self, name: &str) -> Option<Device> {
        self.graph.remove_device(name)
    }

    /// Rename a device everywhere it is referenced
    pub fn rename_device(&mut self, old: &str, new: &str) -> Result<()> {
        self.graph.rename_device(old, new)?;
        self.config.rename_device_references(old, new);
        for synchro in self.synchro_devices.iter_mut().filter(|s| s.as_str() == old) {
            *synchro = new.to_string();
        }
        self.modified = true;
        Ok(())
    }

    fn device_mut(&mut self, name: &str) -> Result<&mut Device> {
        self.graph
            .find_device_mut(name)
            .ok_or_else(|| ModelError::Reference(format!("device {name} is not defined")))
    }

    /// Add a setup property, overwriting the value if the name is already set
    pub fn add_setup_property(&mut self, device: &str, prop: PropertyItem) -> Result<()> {
        self.device_mut(device)?.add_setup_property(prop);
        self.modified = true;
        Ok(())
    }

    pub fn set_setup_property(&mut self, device: &str, name: &str, value: &str) -> Result<()> {
        self.device_mut(device)?.set_setup_property_value(name, value);
        self.modified = true;
        Ok(())
    }

    /// Value of a setup property; `None` if the device or property is unknown
    pub fn setup_property(&self, device: &str, name: &str) -> Option<&str> {
        self.graph
            .find_device(device)?
            .find_setup_property(name)
            .map(|p| p.value.as_str())
    }

    pub fn add_setup_label(&mut self, device: &str, label: Label) -> Result<()> {
        self.device_mut(device)?.add_setup_label(label);
        self.modified = true;
        Ok(())
    }

    /// Value of one of the core role properties (camera, shutter, ...)
    pub fn core_role(&self, role: &str) -> Option<&str> {
        self.setup_property(keyword::CORE_DEVICE, role)
    }

    pub fn synchro_devices(&self) -> &[String] {
        &self.synchro_devices
    }

    pub fn add_synchro_device(&mut self, name: &str) {
        self.synchro_devices.push(name.to_string());
        self.modified = true;
    }

    pub fn clear_synchro_devices(&mut self) {
        self.synchro_devices.clear();
        self.modified = true;
    }

    pub fn add_config_group(&mut self, name: &str) -> bool {
        self.config.add_config_group(name)
    }

    pub fn remove_group(&mut self, name: &str) {
        self.config.remove_group(name);
    }

    pub fn rename_group(&mut self, old: &str, new: &str) -> Result<()> {
        self.config.rename_group(old, new)
    }

    /// Per-setting pruning of presets against the current devices
    pub fn check_configurations(&mut self) -> PruneReport {
        consistency::check_configurations(&self.graph, &mut self.config)
    }

    /// Whole-group pruning of presets against the current devices
    pub fn remove_invalid_configurations(&mut self) -> PruneReport {
        consistency::remove_invalid_configurations(&self.graph, &mut self.config)
    }

    /// Log the bring-up plan this model describes
    pub fn dump_setup(&self) {
        info!("Step 1: load devices");
        for dev in self.devices().iter().filter(|d| !d.is_core()) {
            info!(device = %dev.name, library = %dev.library, adapter = %dev.adapter, "load");
        }

        info!("Step 2: set pre-initialization properties");
        for dev in self.devices() {
            for prop in dev.setup_properties.iter().filter(|p| p.pre_init) {
                info!(device = %dev.name, property = %prop.name, value = %prop.value, "pre-init");
            }
        }

        info!("Step 3: initialize");

        info!("Step 4: define device labels");
        for dev in self.devices() {
            for label in &dev.setup_labels {
                info!(device = %dev.name, state = label.state, label = %label.label, "label");
            }
        }

        info!("Step 5: set initial properties");
        for dev in self.devices() {
            for prop in dev.setup_properties.iter().filter(|p| !p.pre_init) {
                info!(device = %dev.name, property = %prop.name, value = %prop.value, "post-init");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Setting;

    #[test]
    fn test_new_model_has_mandatory_entries() {
        let model = MicroscopeModel::new();
        assert_eq!(model.devices().len(), 1);
        assert!(model.devices()[0].is_core());
        assert_eq!(model.core_role(keyword::CORE_AUTO_SHUTTER), Some("1"));
        assert_eq!(model.core_role(keyword::CORE_CAMERA), Some(""));

        let system = model.config.find_config_group(keyword::SYSTEM_GROUP).unwrap();
        assert!(system.find_preset(keyword::STARTUP_PRESET).is_some());
        assert!(model.config.find_config_group(keyword::CHANNEL_GROUP).is_some());
        assert!(!model.is_modified());
    }

    #[test]
    fn test_mutations_set_dirty_bit() {
        let mut model = MicroscopeModel::new();
        model.add_device(Device::new("Cam", "DemoCamera", "DCam", "")).unwrap();
        assert!(model.is_modified());

        model.set_modified(false);
        model.add_setup_property("Cam", PropertyItem::pre_init("Mode", "Fast")).unwrap();
        assert!(model.is_modified());

        model.set_modified(false);
        model.add_config_group("Objective");
        assert!(model.is_modified());
    }

    #[test]
    fn test_setup_property_on_unknown_device() {
        let mut model = MicroscopeModel::new();
        let err = model.set_setup_property("Ghost", "Mode", "A").unwrap_err();
        assert!(matches!(err, ModelError::Reference(_)));
        assert!(model.setup_property("Ghost", "Mode").is_none());
    }

    #[test]
    fn test_rename_device_updates_references() {
        let mut model = MicroscopeModel::new();
        model.add_device(Device::new("Wheel", "Demo", "DWheel", "")).unwrap();
        model.config.add_setting("Channel", "DAPI", Setting::new("Wheel", "Label", "UV"));
        model.add_synchro_device("Wheel");

        model.rename_device("Wheel", "Filters").unwrap();

        let dapi = model.config.find_config_group("Channel").unwrap().find_preset("DAPI").unwrap();
        assert_eq!(dapi.settings[0].device, "Filters");
        assert_eq!(model.synchro_devices(), ["Filters".to_string()]);
    }

    #[test]
    fn test_reset_keeps_catalog_and_restores_mandatory_groups() {
        let mut catalog = HardwareCatalog::new();
        catalog.add(Device::new("DCam", "DemoCamera", "DCam", "Demo camera"));
        let mut model = MicroscopeModel::with_catalog(catalog);
        model.add_device(Device::new("Cam", "DemoCamera", "DCam", "")).unwrap();
        model.remove_group(keyword::CHANNEL_GROUP);

        model.reset();
        assert_eq!(model.devices().len(), 1);
        assert!(model.config.find_config_group(keyword::CHANNEL_GROUP).is_some());
        assert_eq!(model.graph.catalog().devices.len(), 1);
    }
}
