//! Moving state between the model and the hardware
//!
//! Read-through helpers (`refresh_*`, `load_*`, `copy_*`) pull driver state
//! into the model. `apply_*` helpers push model state to the driver. Removal
//! helpers unload best-effort: a failed unload is logged and the model edit
//! still happens.

use tracing::{debug, info, warn};

use rigcfg_core::{
    keyword, ConfigGroup, ConfigPreset, Device, MicroscopeModel, PropertyItem,
};
use rigcfg_hal::{Hardware, HardwareError};

use crate::error::Result;

/// Re-read one device's properties, type and description from hardware
///
/// Focus direction is left alone: the model's value is the one pushed at
/// initialization. Use [`load_focus_directions_from_hardware`] to read it back.
pub fn refresh_device(hw: &dyn Hardware, device: &mut Device) -> std::result::Result<(), HardwareError> {
    let mut properties = Vec::new();
    for name in hw.property_names(&device.name)? {
        properties.push(hw.property_item(&device.name, &name)?);
    }
    device.properties = properties;
    device.set_type(hw.device_type(&device.name)?);
    device.description = hw.device_description(&device.name)?;
    Ok(())
}

/// Refresh every device and port; failures are logged and skipped
pub fn refresh_model(model: &mut MicroscopeModel, hw: &dyn Hardware) {
    let devices = model.graph.devices_mut().filter(|d| !d.is_core());
    for device in devices {
        if let Err(e) = refresh_device(hw, device) {
            warn!(device = %device.name, error = %e, "Unable to refresh device");
        }
    }
    for port in model.graph.ports_mut() {
        if let Err(e) = refresh_device(hw, port) {
            debug!(port = %port.name, error = %e, "Unable to refresh port");
        }
    }
}

/// Copy hardware state labels into devices that have none yet
pub fn load_state_labels_from_hardware(model: &mut MicroscopeModel, hw: &dyn Hardware) {
    for device in model.graph.devices_mut().filter(|d| !d.is_core()) {
        if !device.setup_labels.is_empty() {
            continue;
        }
        match hw.state_labels(&device.name) {
            Ok(labels) => device.setup_labels = labels,
            Err(e) => debug!(device = %device.name, error = %e, "No state labels"),
        }
    }
}

pub fn load_focus_directions_from_hardware(model: &mut MicroscopeModel, hw: &dyn Hardware) {
    for device in model.graph.devices_mut().filter(|d| d.is_stage()) {
        match hw.focus_direction(&device.name) {
            Ok(direction) => device.focus_direction = direction,
            Err(e) => warn!(device = %device.name, error = %e, "Unable to read focus direction"),
        }
    }
}

/// Define every non-default state label on the hardware
pub fn apply_labels_to_hardware(model: &MicroscopeModel, hw: &mut dyn Hardware) -> Result<()> {
    for device in model.devices() {
        for label in device.setup_labels.iter().filter(|l| !l.is_default()) {
            hw.define_state_label(&device.name, label.state, &label.label)?;
        }
    }
    Ok(())
}

pub fn apply_delays_to_hardware(model: &MicroscopeModel, hw: &mut dyn Hardware) -> Result<()> {
    for device in model.devices().iter().filter(|d| d.delay_ms > 0.0) {
        hw.set_device_delay_ms(&device.name, device.delay_ms)?;
    }
    Ok(())
}

/// Replace the hardware's configuration groups and pixel-size presets with the model's
pub fn apply_configs_to_hardware(model: &MicroscopeModel, hw: &mut dyn Hardware) -> Result<()> {
    for group in hw.config_groups() {
        hw.delete_config_group(&group)?;
    }

    for group in model.config.groups() {
        hw.define_config_group(&group.name)?;
        for preset in &group.presets {
            for setting in &preset.settings {
                hw.define_config(&group.name, &preset.name, setting)?;
            }
        }
    }

    for preset in &model.config.pixel_size_group().presets {
        if preset.settings.is_empty() {
            // a calibration needs a preset on the driver side to hang off
            warn!(preset = %preset.name, "Skipping pixel-size preset without settings");
            continue;
        }
        for setting in &preset.settings {
            hw.define_pixel_size_config(&preset.name, setting)?;
        }
        hw.set_pixel_size_calibration(&preset.name, &preset.calibration)?;
    }

    info!(groups = model.config.groups().len(), "Applied configurations to hardware");
    Ok(())
}

/// Replace the model's configuration groups with those defined on the hardware
pub fn copy_configs_from_hardware(model: &mut MicroscopeModel, hw: &dyn Hardware) -> Result<()> {
    let mut groups = Vec::new();
    for name in hw.config_groups() {
        let mut group = ConfigGroup::new(name.as_str());
        for preset_name in hw.configs(&name)? {
            let mut preset = ConfigPreset::new(preset_name.as_str());
            for setting in hw.config_data(&name, &preset_name)? {
                preset.add_setting(setting);
            }
            group.add_preset(preset);
        }
        groups.push(group);
    }

    let pixel_size = model.config.pixel_size_group().clone();
    model.config.clear();
    for group in groups {
        model.config.put_config_group(group);
    }
    model.config.set_pixel_size_group(pixel_size);
    model.repair();
    model.set_modified(true);
    Ok(())
}

/// Replace the model's pixel-size presets with those defined on the hardware
pub fn copy_resolutions_from_hardware(model: &mut MicroscopeModel, hw: &dyn Hardware) -> Result<()> {
    let mut group = ConfigGroup::new(keyword::PIXEL_SIZE_GROUP);
    for name in hw.pixel_size_configs() {
        let mut preset = ConfigPreset::new(name.as_str());
        for setting in hw.pixel_size_config_data(&name)? {
            preset.add_setting(setting);
        }
        preset.calibration = hw.pixel_size_calibration(&name)?;
        group.add_preset(preset);
    }
    model.config.set_pixel_size_group(group);
    model.set_modified(true);
    Ok(())
}

/// Ask an initialized hub which peripherals it detected
///
/// The returned devices are not registered; they are named after their
/// adapter, parented to the hub and described from the catalog.
pub fn discover_peripherals(
    model: &MicroscopeModel,
    hw: &dyn Hardware,
    hub: &str,
) -> std::result::Result<Vec<Device>, HardwareError> {
    let hub_device = model
        .find_device(hub)
        .ok_or_else(|| HardwareError::UnknownDevice(hub.to_string()))?;
    let catalog = model.graph.catalog();

    let peripherals = hw
        .installed_devices(hub)?
        .into_iter()
        .map(|adapter| {
            let known = catalog.find(&hub_device.library, &adapter);
            let mut device = Device::new(
                adapter.as_str(),
                hub_device.library.as_str(),
                adapter.as_str(),
                known.map(|d| d.description.clone()).unwrap_or_default(),
            );
            if let Some(known) = known {
                device.set_type(known.device_type());
            }
            device.parent_hub = hub.to_string();
            device
        })
        .collect::<Vec<_>>();

    debug!(hub, count = peripherals.len(), "Discovered peripherals");
    Ok(peripherals)
}

/// Register and load the selected hub peripherals
///
/// Selected candidates are added to the model under their hub, loaded, and
/// receive their setup properties. The rest are unloaded best-effort in case
/// an earlier probe left them loaded.
pub fn add_selected_peripherals(
    model: &mut MicroscopeModel,
    hw: &mut dyn Hardware,
    candidates: &[Device],
    selected: &[String],
) -> Result<Vec<String>> {
    let mut added = Vec::new();

    for candidate in candidates {
        if !selected.contains(&candidate.name) {
            if let Err(e) = hw.unload_device(&candidate.name) {
                debug!(device = %candidate.name, error = %e, "Unselected peripheral was not loaded");
            }
            continue;
        }

        model.add_device(candidate.clone())?;
        hw.load_device(&candidate.name, &candidate.library, &candidate.adapter)?;
        if !candidate.parent_hub.is_empty() {
            hw.set_parent_label(&candidate.name, &candidate.parent_hub)?;
        }
        for prop in &candidate.setup_properties {
            hw.set_property(&candidate.name, &prop.name, &prop.value)?;
        }
        info!(device = %candidate.name, hub = %candidate.parent_hub, "Added peripheral");
        added.push(candidate.name.clone());
    }

    Ok(added)
}

/// Remove every registered peripheral of `hub`, unloading each best-effort
pub fn remove_peripherals(
    model: &mut MicroscopeModel,
    hw: &mut dyn Hardware,
    hub: &str,
) -> Vec<String> {
    let removed = model.graph.detach_peripherals(hub);
    for device in &removed {
        if let Err(e) = hw.unload_device(&device.name) {
            warn!(device = %device.name, hub, error = %e, "Unable to unload peripheral");
        }
    }
    removed.into_iter().map(|d| d.name).collect()
}

/// Remove a device from the model and unload it best-effort
pub fn remove_and_unload(
    model: &mut MicroscopeModel,
    hw: &mut dyn Hardware,
    name: &str,
) -> Option<Device> {
    let removed = model.remove_device(name)?;
    if let Err(e) = hw.unload_device(name) {
        warn!(device = name, error = %e, "Unable to unload device");
    }
    Some(removed)
}

/// Push the pre-init setup properties of one device or port
pub(crate) fn apply_pre_init(
    hw: &mut dyn Hardware,
    name: &str,
    properties: &[PropertyItem],
) -> std::result::Result<(), HardwareError> {
    for prop in properties.iter().filter(|p| p.pre_init) {
        debug!(device = name, property = %prop.name, value = %prop.value, "Pre-init");
        hw.set_property(name, &prop.name, &prop.value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcfg_core::{Label, PixelCalibration, Setting};
    use rigcfg_hal::{scan_catalog, Call, SimulatedHardware};

    fn demo() -> (MicroscopeModel, SimulatedHardware) {
        let hw = SimulatedHardware::demo().unwrap();
        let model = MicroscopeModel::with_catalog(scan_catalog(&hw));
        (model, hw)
    }

    #[test]
    fn test_refresh_device_reads_hardware() {
        let (mut model, mut hw) = demo();
        let mut z = Device::new("Z", "DemoCamera", "DStage", "");
        z.focus_direction = -1;
        model.add_device(z).unwrap();
        hw.load_device("Z", "DemoCamera", "DStage").unwrap();

        refresh_model(&mut model, &hw);

        let z = model.find_device("Z").unwrap();
        assert!(z.is_stage());
        assert_eq!(z.description, "Demo focus stage");
        assert_eq!(z.find_property("Position").unwrap().value, "0");
        // configured direction survives a refresh
        assert_eq!(z.focus_direction, -1);

        load_focus_directions_from_hardware(&mut model, &hw);
        assert_eq!(model.find_device("Z").unwrap().focus_direction, 1);
    }

    #[test]
    fn test_labels_round_trip_through_hardware() {
        let (mut model, mut hw) = demo();
        model.add_device(Device::new("Wheel", "DemoCamera", "DWheel", "")).unwrap();
        hw.load_device("Wheel", "DemoCamera", "DWheel").unwrap();

        load_state_labels_from_hardware(&mut model, &hw);
        assert_eq!(model.find_device("Wheel").unwrap().setup_labels.len(), 3);

        model.add_setup_label("Wheel", Label::new(1, "FITC")).unwrap();
        hw.clear_journal();
        apply_labels_to_hardware(&model, &mut hw).unwrap();

        // default State-N labels are not pushed
        assert_eq!(
            hw.journal(),
            [Call::DefineLabel {
                device: "Wheel".into(),
                state: 1,
                label: "FITC".into(),
            }]
        );
        assert_eq!(hw.state_labels("Wheel").unwrap()[1].label, "FITC");
    }

    #[test]
    fn test_configs_round_trip_through_hardware() {
        let (mut model, mut hw) = demo();
        model
            .config
            .add_setting("Channel", "DAPI", Setting::new("Wheel", "Label", "DAPI"));
        model
            .config
            .add_pixel_size_setting("Res10x", Setting::new("Objective", "Label", "10x"));
        if let Some(calibration) = model.config.pixel_calibration_mut("Res10x") {
            *calibration = PixelCalibration {
                pixel_size_um: 0.65,
                affine: Some([0.65, 0.0, 0.0, 0.0, 0.65, 0.0]),
                ..Default::default()
            };
        }
        hw.define_config_group("Stale").unwrap();

        apply_configs_to_hardware(&model, &mut hw).unwrap();
        assert!(!hw.config_groups().contains(&"Stale".to_string()));

        let mut copy = MicroscopeModel::new();
        copy_configs_from_hardware(&mut copy, &hw).unwrap();
        copy_resolutions_from_hardware(&mut copy, &hw).unwrap();

        assert_eq!(
            copy.config.find_config_group("Channel"),
            model.config.find_config_group("Channel")
        );
        assert!(copy.config.find_config_group(keyword::SYSTEM_GROUP).is_some());
        assert_eq!(copy.config.pixel_size_group(), model.config.pixel_size_group());
        assert!(copy.is_modified());
    }

    #[test]
    fn test_delays_only_for_positive_values() {
        let (mut model, mut hw) = demo();
        let mut lamp = Device::new("Lamp", "Lumen", "Lamp", "");
        lamp.delay_ms = 12.5;
        model.add_device(lamp).unwrap();
        model.add_device(Device::new("Cam", "DemoCamera", "DCam", "")).unwrap();
        hw.load_device("Lamp", "Lumen", "Lamp").unwrap();
        hw.load_device("Cam", "DemoCamera", "DCam").unwrap();
        hw.clear_journal();

        apply_delays_to_hardware(&model, &mut hw).unwrap();
        assert_eq!(
            hw.journal(),
            [Call::SetDelay {
                device: "Lamp".into(),
                delay_ms: 12.5,
            }]
        );
    }

    #[test]
    fn test_add_selected_peripherals() {
        let (mut model, mut hw) = demo();
        model
            .add_device(Device::new("Hub", "DemoCamera", "DHub", ""))
            .unwrap();
        hw.load_device("Hub", "DemoCamera", "DHub").unwrap();
        hw.initialize_device("Hub").unwrap();

        let mut candidates = discover_peripherals(&model, &hw, "Hub").unwrap();
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].description, "Demo camera");
        candidates[0]
            .setup_properties
            .push(PropertyItem::pre_init("Mode", "Mono"));

        let added = add_selected_peripherals(
            &mut model,
            &mut hw,
            &candidates,
            &["DCam".to_string()],
        )
        .unwrap();

        assert_eq!(added, vec!["DCam".to_string()]);
        assert_eq!(model.find_device("DCam").unwrap().parent_hub, "Hub");
        assert!(model.find_device("DWheel").is_none());
        assert_eq!(hw.property("DCam", "Mode").unwrap(), "Mono");
        assert!(!hw.is_loaded("DWheel"));
    }

    #[test]
    fn test_remove_peripherals_tolerates_unload_failure() {
        let (mut model, mut hw) = demo();
        model.add_device(Device::new("Hub", "DemoCamera", "DHub", "")).unwrap();
        for name in ["Cam", "Wheel"] {
            let mut dev = Device::new(name, "DemoCamera", "DCam", "");
            dev.parent_hub = "Hub".to_string();
            model.add_device(dev).unwrap();
        }
        // only one of the peripherals is loaded on the hardware
        hw.load_device("Cam", "DemoCamera", "DCam").unwrap();

        let removed = remove_peripherals(&mut model, &mut hw, "Hub");
        assert_eq!(removed, vec!["Cam".to_string(), "Wheel".to_string()]);
        assert!(model.find_device("Cam").is_none());
        assert!(model.find_device("Wheel").is_none());
        assert!(!hw.is_loaded("Cam"));

        assert!(remove_and_unload(&mut model, &mut hw, "Hub").is_some());
        assert!(remove_and_unload(&mut model, &mut hw, "Hub").is_none());
    }
}
