//! rigcfg Core - configuration model of a microscope rig
//!
//! This crate provides the hardware-independent half of rigcfg:
//! - Device records with roles, setup properties and state labels
//! - Device graph with hub/peripheral links and serial-port bookkeeping
//! - Configuration groups, presets and pixel-size calibration
//! - Line-oriented config-file codec
//! - Consistency checks that prune presets against the device graph

pub mod catalog;
pub mod codec;
pub mod config;
pub mod consistency;
pub mod device;
pub mod error;
pub mod graph;
pub mod model;

pub use catalog::HardwareCatalog;
pub use codec::{load_file, load_str, save_file, to_config_string, Record};
pub use config::{ConfigGroup, ConfigModel, ConfigPreset, PixelCalibration, Setting};
pub use consistency::{DanglingParent, PruneReport};
pub use device::{keyword, Device, DeviceType, Label, PropertyItem, Role};
pub use error::{ModelError, Result};
pub use graph::{DeviceGraph, TopologyNode};
pub use model::MicroscopeModel;
