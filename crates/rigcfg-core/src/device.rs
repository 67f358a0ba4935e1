//! Device records: identity, role, setup properties and state labels

use serde::{Deserialize, Serialize};

/// Well-known names shared with the hardware layer and the config file
pub mod keyword {
    /// Label of the reserved control-core device
    pub const CORE_DEVICE: &str = "Core";
    pub const CORE_INITIALIZE: &str = "Initialize";
    pub const CORE_CAMERA: &str = "Camera";
    pub const CORE_SHUTTER: &str = "Shutter";
    pub const CORE_FOCUS: &str = "Focus";
    pub const CORE_AUTO_SHUTTER: &str = "AutoShutter";
    /// Property naming the serial port a device talks through
    pub const PORT: &str = "Port";
    /// Property holding the current label of a state device
    pub const LABEL: &str = "Label";
    pub const SYSTEM_GROUP: &str = "System";
    pub const STARTUP_PRESET: &str = "Startup";
    pub const CHANNEL_GROUP: &str = "Channel";
    pub const PIXEL_SIZE_GROUP: &str = "PixelSizeGroup";
}

/// Driver-reported device type, numbered the way device adapters report it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Unknown,
    Any,
    Camera,
    Shutter,
    State,
    Stage,
    XyStage,
    Serial,
    Generic,
    AutoFocus,
    Core,
    ImageProcessor,
    SignalIo,
    Magnifier,
    Slm,
    Hub,
    Galvo,
}

impl DeviceType {
    const ALL: [DeviceType; 17] = [
        Self::Unknown,
        Self::Any,
        Self::Camera,
        Self::Shutter,
        Self::State,
        Self::Stage,
        Self::XyStage,
        Self::Serial,
        Self::Generic,
        Self::AutoFocus,
        Self::Core,
        Self::ImageProcessor,
        Self::SignalIo,
        Self::Magnifier,
        Self::Slm,
        Self::Hub,
        Self::Galvo,
    ];

    /// Integer code used in device enumeration files
    pub fn as_int(self) -> i32 {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0) as i32
    }

    pub fn from_int(code: i32) -> Self {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or(Self::Unknown)
    }
}

impl Default for DeviceType {
    fn default() -> Self {
        Self::Unknown
    }
}

/// The part a device plays during bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The control core itself; never loaded or persisted as a device
    Core,
    /// Initialized first; may expose peripherals afterwards
    Hub,
    /// Serial port, loaded before everything else
    SerialPort,
    /// Focus-capable stage, receives a focus direction after init
    Stage,
    Generic,
}

impl Role {
    pub fn for_type(device_type: DeviceType) -> Self {
        match device_type {
            DeviceType::Core => Self::Core,
            DeviceType::Hub => Self::Hub,
            DeviceType::Serial => Self::SerialPort,
            DeviceType::Stage => Self::Stage,
            _ => Self::Generic,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::Generic
    }
}

/// A property value, either captured from hardware or held for later application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyItem {
    pub name: String,
    pub value: String,
    /// Must be applied before the device is initialized
    #[serde(default)]
    pub pre_init: bool,
    #[serde(default)]
    pub read_only: bool,
    /// Allowed values; empty means unrestricted
    #[serde(default)]
    pub allowed: Vec<String>,
}

impl PropertyItem {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn pre_init(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            pre_init: true,
            ..Self::new(name, value)
        }
    }
}

/// State label of a state device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub state: i64,
    pub label: String,
}

impl Label {
    pub fn new(state: i64, label: impl Into<String>) -> Self {
        Self {
            state,
            label: label.into(),
        }
    }

    /// Whether this is the name a driver assigns when nobody labelled the state
    pub fn is_default(&self) -> bool {
        self.label == format!("State-{}", self.state)
    }
}

/// A hardware device known to the model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Device {
    /// Unique label within the registry
    pub name: String,
    /// Adapter library the driver lives in
    pub library: String,
    /// Adapter name inside the library
    pub adapter: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    device_type: DeviceType,
    #[serde(default)]
    role: Role,
    /// Response delay pushed to hardware
    #[serde(default)]
    pub delay_ms: f64,
    #[serde(default)]
    pub focus_direction: i32,
    /// Name of the hub this device hangs off; empty for none
    #[serde(default)]
    pub parent_hub: String,
    /// Properties as last read from hardware
    #[serde(default)]
    pub properties: Vec<PropertyItem>,
    /// Properties to apply during bring-up
    #[serde(default)]
    pub setup_properties: Vec<PropertyItem>,
    #[serde(default)]
    pub setup_labels: Vec<Label>,
    /// Peripherals reported by a hub after initialization
    #[serde(default)]
    pub peripherals: Vec<Device>,
    #[serde(skip)]
    pub initialized: bool,
}

impl Device {
    pub fn new(
        name: impl Into<String>,
        library: impl Into<String>,
        adapter: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            library: library.into(),
            adapter: adapter.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    /// The reserved device standing for the control core
    pub fn core() -> Self {
        let mut core = Self::new(keyword::CORE_DEVICE, "Default", "MMCore", "Core controller");
        core.set_type(DeviceType::Core);
        core
    }

    pub fn with_type(mut self, device_type: DeviceType) -> Self {
        self.set_type(device_type);
        self
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Set the driver type; the role follows it
    pub fn set_type(&mut self, device_type: DeviceType) {
        self.device_type = device_type;
        self.role = Role::for_type(device_type);
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_core(&self) -> bool {
        self.role == Role::Core
    }

    pub fn is_hub(&self) -> bool {
        self.role == Role::Hub
    }

    pub fn is_serial_port(&self) -> bool {
        self.role == Role::SerialPort
    }

    pub fn is_stage(&self) -> bool {
        self.role == Role::Stage
    }

    pub fn find_setup_property(&self, name: &str) -> Option<&PropertyItem> {
        self.setup_properties.iter().find(|p| p.name == name)
    }

    pub fn find_setup_property_mut(&mut self, name: &str) -> Option<&mut PropertyItem> {
        self.setup_properties.iter_mut().find(|p| p.name == name)
    }

    pub fn find_property(&self, name: &str) -> Option<&PropertyItem> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Insert a setup property, or overwrite the value of the one with the same name
    pub fn add_setup_property(&mut self, prop: PropertyItem) {
        match self.find_setup_property_mut(&prop.name) {
            Some(existing) => existing.value = prop.value,
            None => self.setup_properties.push(prop),
        }
    }

    /// Set the value of a setup property, creating a post-init one if needed
    pub fn set_setup_property_value(&mut self, name: &str, value: &str) {
        match self.find_setup_property_mut(name) {
            Some(existing) => existing.value = value.to_string(),
            None => self.setup_properties.push(PropertyItem::new(name, value)),
        }
    }

    /// Add a label, replacing any label already defined for the same state
    pub fn add_setup_label(&mut self, label: Label) {
        match self.setup_labels.iter_mut().find(|l| l.state == label.state) {
            Some(existing) => existing.label = label.label,
            None => self.setup_labels.push(label),
        }
    }

    pub fn setup_label(&self, state: i64) -> Option<&Label> {
        self.setup_labels.iter().find(|l| l.state == state)
    }

    /// Serial port this device is wired to, if any
    pub fn port(&self) -> Option<&str> {
        self.find_setup_property(keyword::PORT)
            .or_else(|| self.find_property(keyword::PORT))
            .map(|p| p.value.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Whether any captured or setup property holds this value
    pub fn references_value(&self, value: &str) -> bool {
        self.properties
            .iter()
            .chain(self.setup_properties.iter())
            .any(|p| p.value == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_follows_type() {
        let mut dev = Device::new("Z", "DemoLib", "DStage", "");
        assert_eq!(dev.role(), Role::Generic);
        dev.set_type(DeviceType::Stage);
        assert!(dev.is_stage());
        dev.set_type(DeviceType::Hub);
        assert!(dev.is_hub());
        assert!(Device::core().is_core());
    }

    #[test]
    fn test_type_codes() {
        assert_eq!(DeviceType::Camera.as_int(), 2);
        assert_eq!(DeviceType::Hub.as_int(), 15);
        assert_eq!(DeviceType::from_int(7), DeviceType::Serial);
        assert_eq!(DeviceType::from_int(99), DeviceType::Unknown);
        assert_eq!(DeviceType::from_int(-1), DeviceType::Unknown);
    }

    #[test]
    fn test_setup_property_overwrite() {
        let mut dev = Device::new("Cam", "DemoLib", "DCam", "");
        dev.add_setup_property(PropertyItem::pre_init("Mode", "A"));
        dev.add_setup_property(PropertyItem::new("Mode", "B"));
        assert_eq!(dev.setup_properties.len(), 1);
        assert_eq!(dev.find_setup_property("Mode").unwrap().value, "B");
        // pre-init flag of the original entry is kept
        assert!(dev.find_setup_property("Mode").unwrap().pre_init);
    }

    #[test]
    fn test_port_lookup() {
        let mut dev = Device::new("Lamp", "Arduino", "Shutter", "");
        assert_eq!(dev.port(), None);
        dev.properties.push(PropertyItem::new(keyword::PORT, "COM2"));
        assert_eq!(dev.port(), Some("COM2"));
        dev.add_setup_property(PropertyItem::pre_init(keyword::PORT, "COM3"));
        assert_eq!(dev.port(), Some("COM3"));
    }

    #[test]
    fn test_default_label() {
        assert!(Label::new(3, "State-3").is_default());
        assert!(!Label::new(3, "DAPI").is_default());
    }
}
