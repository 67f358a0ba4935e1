//! Catalog scanning and the device enumeration file

use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info, warn};

use rigcfg_core::{Device, HardwareCatalog};

use crate::hardware::{Hardware, Result};

/// Default name of the device enumeration file
pub const DEVICE_LIST_FILE: &str = "MMDeviceList.txt";

/// Enumerate every installed adapter library into a fresh catalog snapshot
///
/// Libraries that fail to enumerate, or export nothing, are recorded in
/// `bad_libraries` and otherwise skipped.
pub fn scan_catalog(hw: &dyn Hardware) -> HardwareCatalog {
    let mut catalog = HardwareCatalog::new();

    for library in hw.device_adapter_names() {
        let adapters = match hw.library_contents(&library) {
            Ok(adapters) if !adapters.is_empty() => adapters,
            Ok(_) => {
                warn!(library = %library, "Library exports no adapters");
                catalog.bad_libraries.push(library);
                continue;
            }
            Err(e) => {
                warn!(library = %library, error = %e, "Unable to enumerate library");
                catalog.bad_libraries.push(library);
                continue;
            }
        };

        debug!(library = %library, adapters = adapters.len(), "Enumerated library");
        for adapter in adapters {
            let device = Device::new(
                adapter.name.clone(),
                library.clone(),
                adapter.name,
                adapter.description,
            )
            .with_type(adapter.device_type);
            catalog.add(device);
        }
    }

    info!(
        devices = catalog.devices.len(),
        hubs = catalog.hubs.len(),
        ports = catalog.ports.len(),
        bad = catalog.bad_libraries.len(),
        "Scanned hardware catalog"
    );
    catalog
}

/// Render `library,adapter,description,type` for every non-serial adapter
pub fn device_list(catalog: &HardwareCatalog) -> String {
    let mut out = String::new();
    for dev in &catalog.devices {
        let _ = writeln!(
            out,
            "{},{},{},{}",
            dev.library,
            dev.adapter,
            dev.description.replace(',', ";"),
            dev.device_type().as_int()
        );
    }
    out
}

/// Scan the hardware and write the device enumeration file; returns the entry count
pub fn write_device_list(hw: &dyn Hardware, path: &Path) -> Result<usize> {
    let catalog = scan_catalog(hw);
    std::fs::write(path, device_list(&catalog))?;
    info!(path = %path.display(), entries = catalog.devices.len(), "Wrote device list");
    Ok(catalog.devices.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{RigDescription, SimulatedHardware};
    use tempfile::TempDir;

    #[test]
    fn test_scan_demo_rig() {
        let hw = SimulatedHardware::demo().unwrap();
        let catalog = scan_catalog(&hw);

        assert_eq!(catalog.ports.len(), 2);
        assert_eq!(catalog.hubs.len(), 1);
        assert_eq!(catalog.devices.len(), 5);
        assert_eq!(catalog.bad_libraries, vec!["Legacy".to_string()]);
        assert!(catalog.find_port("COM3").is_some());
    }

    #[test]
    fn test_empty_library_is_bad() {
        let rig = RigDescription::from_toml_str(
            "[[library]]\nname = \"Empty\"\n",
        )
        .unwrap();
        let catalog = scan_catalog(&SimulatedHardware::new(rig));
        assert_eq!(catalog.bad_libraries, vec!["Empty".to_string()]);
    }

    #[test]
    fn test_device_list_file() {
        let rig = RigDescription::from_toml_str(
            r#"
[[library]]
name = "Lumen"

[[library.adapter]]
name = "Lamp"
type = "shutter"
description = "Lamp, serial controlled"

[[library.adapter]]
name = "COM9"
type = "serial"
"#,
        )
        .unwrap();
        let hw = SimulatedHardware::new(rig);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEVICE_LIST_FILE);
        let count = write_device_list(&hw, &path).unwrap();

        assert_eq!(count, 1);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Lumen,Lamp,Lamp; serial controlled,3\n");
    }
}
