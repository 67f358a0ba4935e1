//! The hardware capability consumed by bring-up and catalog scanning
//!
//! Every call may fail and every call blocks until the driver answers.
//! Devices are addressed by the label they were loaded under.

use rigcfg_core::{DeviceType, Label, PixelCalibration, PropertyItem, Setting};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("Unknown device: {0}")]
    UnknownDevice(String),
    #[error("Unknown adapter library: {0}")]
    UnknownLibrary(String),
    #[error("Library {library} has no adapter {adapter}")]
    UnknownAdapter { library: String, adapter: String },
    #[error("Device {device} has no property {property}")]
    UnknownProperty { device: String, property: String },
    #[error("Device label already in use: {0}")]
    AlreadyLoaded(String),
    #[error("Invalid value '{value}' for {device}.{property}")]
    InvalidValue {
        device: String,
        property: String,
        value: String,
    },
    #[error("Failed to initialize {device}: {reason}")]
    InitializationFailed { device: String, reason: String },
    #[error("Device not initialized: {0}")]
    NotInitialized(String),
    #[error("Unknown configuration group: {0}")]
    UnknownGroup(String),
    #[error("Unknown preset {preset} in group {group}")]
    UnknownPreset { group: String, preset: String },
    #[error("Invalid rig description: {0}")]
    Description(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Driver error: {0}")]
    Driver(String),
}

pub type Result<T> = std::result::Result<T, HardwareError>;

/// One adapter exported by a driver library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterInfo {
    pub name: String,
    pub description: String,
    pub device_type: DeviceType,
}

/// Driver-side operations needed to bring a rig up and mirror it into a model
pub trait Hardware {
    /// Names of the installed adapter libraries
    fn device_adapter_names(&self) -> Vec<String>;

    /// Adapters exported by one library
    fn library_contents(&self, library: &str) -> Result<Vec<AdapterInfo>>;

    fn load_device(&mut self, label: &str, library: &str, adapter: &str) -> Result<()>;

    fn unload_device(&mut self, label: &str) -> Result<()>;

    fn initialize_device(&mut self, label: &str) -> Result<()>;

    fn device_type(&self, label: &str) -> Result<DeviceType>;

    fn device_description(&self, label: &str) -> Result<String>;

    /// Tell the driver which loaded hub a device hangs off
    fn set_parent_label(&mut self, label: &str, hub: &str) -> Result<()>;

    /// Adapter names of the peripherals an initialized hub detected
    fn installed_devices(&self, hub: &str) -> Result<Vec<String>>;

    fn property_names(&self, label: &str) -> Result<Vec<String>>;

    /// Full property record: value, flags and allowed values
    fn property_item(&self, label: &str, name: &str) -> Result<PropertyItem>;

    fn property(&self, label: &str, name: &str) -> Result<String> {
        self.property_item(label, name).map(|p| p.value)
    }

    fn set_property(&mut self, label: &str, name: &str, value: &str) -> Result<()>;

    fn set_device_delay_ms(&mut self, label: &str, delay_ms: f64) -> Result<()>;

    fn focus_direction(&self, label: &str) -> Result<i32>;

    fn set_focus_direction(&mut self, label: &str, direction: i32) -> Result<()>;

    fn state_labels(&self, label: &str) -> Result<Vec<Label>>;

    fn define_state_label(&mut self, label: &str, state: i64, name: &str) -> Result<()>;

    fn config_groups(&self) -> Vec<String>;

    fn configs(&self, group: &str) -> Result<Vec<String>>;

    fn config_data(&self, group: &str, preset: &str) -> Result<Vec<Setting>>;

    fn define_config_group(&mut self, group: &str) -> Result<()>;

    fn define_config(&mut self, group: &str, preset: &str, setting: &Setting) -> Result<()>;

    fn delete_config_group(&mut self, group: &str) -> Result<()>;

    fn pixel_size_configs(&self) -> Vec<String>;

    fn pixel_size_config_data(&self, preset: &str) -> Result<Vec<Setting>>;

    fn pixel_size_calibration(&self, preset: &str) -> Result<PixelCalibration>;

    fn define_pixel_size_config(&mut self, preset: &str, setting: &Setting) -> Result<()>;

    fn set_pixel_size_calibration(
        &mut self,
        preset: &str,
        calibration: &PixelCalibration,
    ) -> Result<()>;
}
