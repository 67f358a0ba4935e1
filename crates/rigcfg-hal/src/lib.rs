//! rigcfg HAL - the hardware capability behind bring-up
//!
//! This crate defines the synchronous driver interface the orchestrator talks
//! to, a simulated rig implementing it, and catalog scanning on top of it.

pub mod hardware;
pub mod scan;
pub mod simulated;

pub use hardware::{AdapterInfo, Hardware, HardwareError, Result};
pub use scan::{device_list, scan_catalog, write_device_list, DEVICE_LIST_FILE};
pub use simulated::{Call, RigDescription, SimulatedHardware, DEMO_RIG};
