//! In-memory rig driven from a TOML description
//!
//! The description lists adapter libraries, their adapters, and the properties
//! each adapter exposes once loaded. Hubs name the adapters they detect after
//! initialization, and any adapter can be told to fail initialization. Every
//! mutating call is appended to a journal so callers can check ordering.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

use rigcfg_core::{
    keyword, ConfigModel, DeviceType, Label, PixelCalibration, PropertyItem, Setting,
};

use crate::hardware::{AdapterInfo, Hardware, HardwareError, Result};

/// A small rig used when no description file is configured
pub const DEMO_RIG: &str = r#"
[[library]]
name = "SerialManager"

[[library.adapter]]
name = "COM1"
type = "serial"
description = "Serial port"

[[library.adapter.property]]
name = "BaudRate"
value = "9600"
pre_init = true
allowed = ["9600", "19200", "115200"]

[[library.adapter]]
name = "COM3"
type = "serial"
description = "Serial port"

[[library.adapter.property]]
name = "BaudRate"
value = "9600"
pre_init = true
allowed = ["9600", "19200", "115200"]

[[library]]
name = "DemoCamera"

[[library.adapter]]
name = "DHub"
type = "hub"
description = "Demo hub"
peripherals = ["DCam", "DWheel", "DStage"]

[[library.adapter]]
name = "DCam"
type = "camera"
description = "Demo camera"

[[library.adapter.property]]
name = "Mode"
value = "Color"
pre_init = true
allowed = ["Color", "Mono"]

[[library.adapter.property]]
name = "Exposure"
value = "10"

[[library.adapter]]
name = "DWheel"
type = "state"
description = "Demo filter wheel"
labels = ["State-0", "State-1", "State-2"]

[[library.adapter.property]]
name = "Label"
value = "State-0"

[[library.adapter]]
name = "DStage"
type = "stage"
description = "Demo focus stage"
focus_direction = 1

[[library.adapter.property]]
name = "Position"
value = "0"

[[library]]
name = "Lumen"

[[library.adapter]]
name = "Lamp"
type = "shutter"
description = "Lamp, serial controlled"

[[library.adapter.property]]
name = "Port"
value = ""
pre_init = true

[[library.adapter.property]]
name = "State"
value = "0"
allowed = ["0", "1"]

[[library]]
name = "Legacy"
fail_enumerate = true
"#;

/// Root of a rig description file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigDescription {
    #[serde(default, rename = "library")]
    pub libraries: Vec<LibrarySpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrarySpec {
    pub name: String,
    /// Enumerating this library reports a driver error
    #[serde(default)]
    pub fail_enumerate: bool,
    #[serde(default, rename = "adapter")]
    pub adapters: Vec<AdapterSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub device_type: DeviceType,
    /// Adapters of the same library detected once this hub is initialized
    #[serde(default)]
    pub peripherals: Vec<String>,
    #[serde(default)]
    pub fail_initialize: bool,
    #[serde(default)]
    pub focus_direction: i32,
    /// State labels, indexed by position
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, rename = "property")]
    pub properties: Vec<PropertyItem>,
}

impl RigDescription {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let rig = Self::from_toml_str(&text)?;
        info!(
            path = %path.display(),
            libraries = rig.libraries.len(),
            "Loaded rig description"
        );
        Ok(rig)
    }

    pub fn demo() -> Result<Self> {
        Self::from_toml_str(DEMO_RIG)
    }

    fn library(&self, name: &str) -> Option<&LibrarySpec> {
        self.libraries.iter().find(|l| l.name == name)
    }
}

/// A hardware call recorded by [`SimulatedHardware`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load(String),
    Unload(String),
    Initialize(String),
    SetParent { device: String, hub: String },
    SetProperty {
        device: String,
        property: String,
        value: String,
    },
    SetDelay { device: String, delay_ms: f64 },
    SetFocusDirection { device: String, direction: i32 },
    DefineLabel { device: String, state: i64, label: String },
    DefineConfig { group: String, preset: String },
    DeleteConfigGroup(String),
    DefinePixelSize { preset: String },
}

#[derive(Debug, Clone)]
struct LoadedDevice {
    spec: AdapterSpec,
    properties: Vec<PropertyItem>,
    labels: Vec<Label>,
    parent: String,
    focus_direction: i32,
    delay_ms: f64,
    initialized: bool,
}

/// Hardware implementation backed by a [`RigDescription`]
#[derive(Debug, Clone)]
pub struct SimulatedHardware {
    rig: RigDescription,
    loaded: BTreeMap<String, LoadedDevice>,
    /// Labels forced to fail initialization regardless of the description
    failing: BTreeSet<String>,
    /// Configuration groups and pixel-size presets defined on the driver side
    config: ConfigModel,
    journal: Vec<Call>,
}

impl SimulatedHardware {
    pub fn new(rig: RigDescription) -> Self {
        Self {
            rig,
            loaded: BTreeMap::new(),
            failing: BTreeSet::new(),
            config: ConfigModel::new(),
            journal: Vec::new(),
        }
    }

    pub fn demo() -> Result<Self> {
        RigDescription::demo().map(Self::new)
    }

    pub fn rig(&self) -> &RigDescription {
        &self.rig
    }

    /// Make initialization of `label` fail from now on
    pub fn fail_initialize(&mut self, label: &str) {
        self.failing.insert(label.to_string());
    }

    pub fn journal(&self) -> &[Call] {
        &self.journal
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    /// Journal position of the first matching call
    pub fn position(&self, call: &Call) -> Option<usize> {
        self.journal.iter().position(|c| c == call)
    }

    pub fn is_loaded(&self, label: &str) -> bool {
        self.loaded.contains_key(label)
    }

    pub fn is_initialized(&self, label: &str) -> bool {
        self.loaded.get(label).is_some_and(|d| d.initialized)
    }

    pub fn loaded_labels(&self) -> Vec<String> {
        self.loaded.keys().cloned().collect()
    }

    fn device(&self, label: &str) -> Result<&LoadedDevice> {
        self.loaded
            .get(label)
            .ok_or_else(|| HardwareError::UnknownDevice(label.to_string()))
    }

    fn device_mut(&mut self, label: &str) -> Result<&mut LoadedDevice> {
        self.loaded
            .get_mut(label)
            .ok_or_else(|| HardwareError::UnknownDevice(label.to_string()))
    }

    fn unknown_preset(group: &str, preset: &str) -> HardwareError {
        HardwareError::UnknownPreset {
            group: group.to_string(),
            preset: preset.to_string(),
        }
    }
}

impl Hardware for SimulatedHardware {
    fn device_adapter_names(&self) -> Vec<String> {
        self.rig.libraries.iter().map(|l| l.name.clone()).collect()
    }

    fn library_contents(&self, library: &str) -> Result<Vec<AdapterInfo>> {
        let lib = self
            .rig
            .library(library)
            .ok_or_else(|| HardwareError::UnknownLibrary(library.to_string()))?;
        if lib.fail_enumerate {
            return Err(HardwareError::Driver(format!(
                "library {library} could not be enumerated"
            )));
        }
        Ok(lib
            .adapters
            .iter()
            .map(|a| AdapterInfo {
                name: a.name.clone(),
                description: a.description.clone(),
                device_type: a.device_type,
            })
            .collect())
    }

    fn load_device(&mut self, label: &str, library: &str, adapter: &str) -> Result<()> {
        if self.loaded.contains_key(label) {
            return Err(HardwareError::AlreadyLoaded(label.to_string()));
        }
        let lib = self
            .rig
            .library(library)
            .ok_or_else(|| HardwareError::UnknownLibrary(library.to_string()))?;
        let spec = lib
            .adapters
            .iter()
            .find(|a| a.name == adapter)
            .cloned()
            .ok_or_else(|| HardwareError::UnknownAdapter {
                library: library.to_string(),
                adapter: adapter.to_string(),
            })?;

        let labels = spec
            .labels
            .iter()
            .enumerate()
            .map(|(state, name)| Label::new(state as i64, name.clone()))
            .collect();
        debug!(label, library, adapter, "Loading device");
        self.loaded.insert(
            label.to_string(),
            LoadedDevice {
                properties: spec.properties.clone(),
                labels,
                parent: String::new(),
                focus_direction: spec.focus_direction,
                delay_ms: 0.0,
                initialized: false,
                spec,
            },
        );
        self.journal.push(Call::Load(label.to_string()));
        Ok(())
    }

    fn unload_device(&mut self, label: &str) -> Result<()> {
        self.loaded
            .remove(label)
            .ok_or_else(|| HardwareError::UnknownDevice(label.to_string()))?;
        self.journal.push(Call::Unload(label.to_string()));
        Ok(())
    }

    fn initialize_device(&mut self, label: &str) -> Result<()> {
        self.journal.push(Call::Initialize(label.to_string()));
        let forced = self.failing.contains(label);
        let dev = self.device(label)?;

        if forced || dev.spec.fail_initialize {
            return Err(HardwareError::InitializationFailed {
                device: label.to_string(),
                reason: "device did not respond".to_string(),
            });
        }
        if !dev.parent.is_empty() && !self.is_initialized(&dev.parent) {
            return Err(HardwareError::InitializationFailed {
                device: label.to_string(),
                reason: format!("parent hub {} is not initialized", dev.parent),
            });
        }

        self.device_mut(label)?.initialized = true;
        Ok(())
    }

    fn device_type(&self, label: &str) -> Result<DeviceType> {
        Ok(self.device(label)?.spec.device_type)
    }

    fn device_description(&self, label: &str) -> Result<String> {
        Ok(self.device(label)?.spec.description.clone())
    }

    fn set_parent_label(&mut self, label: &str, hub: &str) -> Result<()> {
        self.device(hub)?;
        self.device_mut(label)?.parent = hub.to_string();
        self.journal.push(Call::SetParent {
            device: label.to_string(),
            hub: hub.to_string(),
        });
        Ok(())
    }

    fn installed_devices(&self, hub: &str) -> Result<Vec<String>> {
        let dev = self.device(hub)?;
        if !dev.initialized {
            return Err(HardwareError::NotInitialized(hub.to_string()));
        }
        Ok(dev.spec.peripherals.clone())
    }

    fn property_names(&self, label: &str) -> Result<Vec<String>> {
        Ok(self
            .device(label)?
            .properties
            .iter()
            .map(|p| p.name.clone())
            .collect())
    }

    fn property_item(&self, label: &str, name: &str) -> Result<PropertyItem> {
        self.device(label)?
            .properties
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| HardwareError::UnknownProperty {
                device: label.to_string(),
                property: name.to_string(),
            })
    }

    fn set_property(&mut self, label: &str, name: &str, value: &str) -> Result<()> {
        let invalid = || HardwareError::InvalidValue {
            device: label.to_string(),
            property: name.to_string(),
            value: value.to_string(),
        };
        let dev = self.device_mut(label)?;
        // the current label of a state device must name a defined state
        if name == keyword::LABEL && !dev.labels.iter().any(|l| l.label == value) {
            return Err(invalid());
        }
        let prop = dev
            .properties
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| HardwareError::UnknownProperty {
                device: label.to_string(),
                property: name.to_string(),
            })?;
        if prop.read_only || (!prop.allowed.is_empty() && !prop.allowed.iter().any(|a| a == value)) {
            return Err(invalid());
        }
        prop.value = value.to_string();

        self.journal.push(Call::SetProperty {
            device: label.to_string(),
            property: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn set_device_delay_ms(&mut self, label: &str, delay_ms: f64) -> Result<()> {
        self.device_mut(label)?.delay_ms = delay_ms;
        self.journal.push(Call::SetDelay {
            device: label.to_string(),
            delay_ms,
        });
        Ok(())
    }

    fn focus_direction(&self, label: &str) -> Result<i32> {
        Ok(self.device(label)?.focus_direction)
    }

    fn set_focus_direction(&mut self, label: &str, direction: i32) -> Result<()> {
        self.device_mut(label)?.focus_direction = direction;
        self.journal.push(Call::SetFocusDirection {
            device: label.to_string(),
            direction,
        });
        Ok(())
    }

    fn state_labels(&self, label: &str) -> Result<Vec<Label>> {
        Ok(self.device(label)?.labels.clone())
    }

    fn define_state_label(&mut self, label: &str, state: i64, name: &str) -> Result<()> {
        let dev = self.device_mut(label)?;
        match dev.labels.iter_mut().find(|l| l.state == state) {
            Some(existing) => existing.label = name.to_string(),
            None => dev.labels.push(Label::new(state, name)),
        }
        self.journal.push(Call::DefineLabel {
            device: label.to_string(),
            state,
            label: name.to_string(),
        });
        Ok(())
    }

    fn config_groups(&self) -> Vec<String> {
        self.config.group_names()
    }

    fn configs(&self, group: &str) -> Result<Vec<String>> {
        let g = self
            .config
            .find_config_group(group)
            .ok_or_else(|| HardwareError::UnknownGroup(group.to_string()))?;
        Ok(g.presets.iter().map(|p| p.name.clone()).collect())
    }

    fn config_data(&self, group: &str, preset: &str) -> Result<Vec<Setting>> {
        let g = self
            .config
            .find_config_group(group)
            .ok_or_else(|| HardwareError::UnknownGroup(group.to_string()))?;
        g.find_preset(preset)
            .map(|p| p.settings.clone())
            .ok_or_else(|| Self::unknown_preset(group, preset))
    }

    fn define_config_group(&mut self, group: &str) -> Result<()> {
        self.config.add_config_group(group);
        Ok(())
    }

    fn define_config(&mut self, group: &str, preset: &str, setting: &Setting) -> Result<()> {
        self.config.add_setting(group, preset, setting.clone());
        self.journal.push(Call::DefineConfig {
            group: group.to_string(),
            preset: preset.to_string(),
        });
        Ok(())
    }

    fn delete_config_group(&mut self, group: &str) -> Result<()> {
        self.config
            .remove_group(group)
            .ok_or_else(|| HardwareError::UnknownGroup(group.to_string()))?;
        self.journal.push(Call::DeleteConfigGroup(group.to_string()));
        Ok(())
    }

    fn pixel_size_configs(&self) -> Vec<String> {
        self.config
            .pixel_size_group()
            .presets
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    fn pixel_size_config_data(&self, preset: &str) -> Result<Vec<Setting>> {
        self.config
            .find_pixel_size_preset(preset)
            .map(|p| p.settings.clone())
            .ok_or_else(|| Self::unknown_preset(keyword::PIXEL_SIZE_GROUP, preset))
    }

    fn pixel_size_calibration(&self, preset: &str) -> Result<PixelCalibration> {
        self.config
            .find_pixel_size_preset(preset)
            .map(|p| p.calibration.clone())
            .ok_or_else(|| Self::unknown_preset(keyword::PIXEL_SIZE_GROUP, preset))
    }

    fn define_pixel_size_config(&mut self, preset: &str, setting: &Setting) -> Result<()> {
        self.config.add_pixel_size_setting(preset, setting.clone());
        self.journal.push(Call::DefinePixelSize {
            preset: preset.to_string(),
        });
        Ok(())
    }

    fn set_pixel_size_calibration(
        &mut self,
        preset: &str,
        calibration: &PixelCalibration,
    ) -> Result<()> {
        let slot = self
            .config
            .pixel_calibration_mut(preset)
            .ok_or_else(|| Self::unknown_preset(keyword::PIXEL_SIZE_GROUP, preset))?;
        *slot = calibration.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> SimulatedHardware {
        SimulatedHardware::demo().unwrap()
    }

    #[test]
    fn test_demo_rig_parses() {
        let hw = demo();
        assert_eq!(
            hw.device_adapter_names(),
            vec!["SerialManager", "DemoCamera", "Lumen", "Legacy"]
        );
        let contents = hw.library_contents("DemoCamera").unwrap();
        assert_eq!(contents.len(), 4);
        assert_eq!(contents[0].device_type, DeviceType::Hub);
        assert!(matches!(
            hw.library_contents("Legacy"),
            Err(HardwareError::Driver(_))
        ));
    }

    #[test]
    fn test_load_twice_is_rejected() {
        let mut hw = demo();
        hw.load_device("Cam", "DemoCamera", "DCam").unwrap();
        assert!(matches!(
            hw.load_device("Cam", "DemoCamera", "DCam"),
            Err(HardwareError::AlreadyLoaded(_))
        ));
        assert!(matches!(
            hw.load_device("X", "DemoCamera", "Nope"),
            Err(HardwareError::UnknownAdapter { .. })
        ));
        assert!(matches!(
            hw.load_device("X", "Nope", "DCam"),
            Err(HardwareError::UnknownLibrary(_))
        ));
    }

    #[test]
    fn test_set_property_validation() {
        let mut hw = demo();
        hw.load_device("Cam", "DemoCamera", "DCam").unwrap();
        hw.set_property("Cam", "Mode", "Mono").unwrap();
        assert_eq!(hw.property("Cam", "Mode").unwrap(), "Mono");
        assert!(matches!(
            hw.set_property("Cam", "Mode", "Sepia"),
            Err(HardwareError::InvalidValue { .. })
        ));
        assert!(matches!(
            hw.set_property("Cam", "Gain", "2"),
            Err(HardwareError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_peripheral_needs_initialized_hub() {
        let mut hw = demo();
        hw.load_device("Hub", "DemoCamera", "DHub").unwrap();
        hw.load_device("Cam", "DemoCamera", "DCam").unwrap();
        hw.set_parent_label("Cam", "Hub").unwrap();

        assert!(matches!(
            hw.installed_devices("Hub"),
            Err(HardwareError::NotInitialized(_))
        ));
        assert!(hw.initialize_device("Cam").is_err());

        hw.initialize_device("Hub").unwrap();
        assert_eq!(hw.installed_devices("Hub").unwrap().len(), 3);
        hw.initialize_device("Cam").unwrap();
        assert!(hw.is_initialized("Cam"));
    }

    #[test]
    fn test_forced_failure_and_journal() {
        let mut hw = demo();
        hw.load_device("Lamp", "Lumen", "Lamp").unwrap();
        hw.fail_initialize("Lamp");
        assert!(matches!(
            hw.initialize_device("Lamp"),
            Err(HardwareError::InitializationFailed { .. })
        ));
        hw.unload_device("Lamp").unwrap();
        assert_eq!(
            hw.journal(),
            [
                Call::Load("Lamp".into()),
                Call::Initialize("Lamp".into()),
                Call::Unload("Lamp".into()),
            ]
        );
    }

    #[test]
    fn test_driver_side_config_groups() {
        let mut hw = demo();
        let setting = Setting::new("Wheel", "Label", "DAPI");
        hw.define_config_group("Channel").unwrap();
        hw.define_config("Channel", "DAPI", &setting).unwrap();
        assert_eq!(hw.configs("Channel").unwrap(), vec!["DAPI"]);
        assert_eq!(hw.config_data("Channel", "DAPI").unwrap(), vec![setting.clone()]);
        assert!(matches!(
            hw.config_data("Channel", "FITC"),
            Err(HardwareError::UnknownPreset { .. })
        ));

        hw.define_pixel_size_config("Res10x", &setting).unwrap();
        let calibration = PixelCalibration {
            pixel_size_um: 0.65,
            ..Default::default()
        };
        hw.set_pixel_size_calibration("Res10x", &calibration).unwrap();
        assert_eq!(hw.pixel_size_calibration("Res10x").unwrap(), calibration);

        hw.delete_config_group("Channel").unwrap();
        assert!(hw.config_groups().is_empty());
    }
}
