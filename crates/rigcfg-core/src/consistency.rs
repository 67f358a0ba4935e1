//! Validation and pruning of configuration entries against the device graph
//!
//! Two pruning strengths are offered and callers pick one:
//! - [`check_configurations`] drops individual settings naming missing
//!   devices, then presets left empty, then groups left empty.
//! - [`remove_invalid_configurations`] drops a whole group as soon as any
//!   of its settings names a missing device.
//!
//! Neither touches hardware; both are safe to run after any structural edit.

use serde::Serialize;
use tracing::info;

use crate::config::ConfigModel;
use crate::graph::DeviceGraph;

/// What a pruning pass removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// (group, preset, device, property) of every dropped setting
    pub settings: Vec<(String, String, String, String)>,
    /// (group, preset) of every dropped preset
    pub presets: Vec<(String, String)>,
    pub groups: Vec<String>,
}

impl PruneReport {
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty() && self.presets.is_empty() && self.groups.is_empty()
    }
}

/// A device whose parent hub is not in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingParent {
    pub device: String,
    pub hub: String,
}

/// Per-setting pruning; empty presets and groups cascade away
pub fn check_configurations(graph: &DeviceGraph, config: &mut ConfigModel) -> PruneReport {
    let mut report = PruneReport::default();

    for group in config.groups_mut() {
        for preset in group.presets.iter_mut() {
            preset.settings.retain(|s| {
                let keep = graph.find_device(&s.device).is_some();
                if !keep {
                    report.settings.push((
                        group.name.clone(),
                        preset.name.clone(),
                        s.device.clone(),
                        s.property.clone(),
                    ));
                }
                keep
            });
        }
        group.presets.retain(|p| {
            if p.settings.is_empty() {
                report.presets.push((group.name.clone(), p.name.clone()));
                false
            } else {
                true
            }
        });
    }

    config.retain_groups(|g| {
        if g.is_empty() {
            report.groups.push(g.name.clone());
            false
        } else {
            true
        }
    });

    if !report.is_empty() {
        config.set_modified(true);
        info!(
            settings = report.settings.len(),
            presets = report.presets.len(),
            groups = report.groups.len(),
            "Pruned configuration entries"
        );
    }
    report
}

/// Whole-group pruning: any setting naming a missing device drops its group
pub fn remove_invalid_configurations(graph: &DeviceGraph, config: &mut ConfigModel) -> PruneReport {
    let mut report = PruneReport::default();

    config.retain_groups(|g| {
        let valid = g
            .presets
            .iter()
            .flat_map(|p| p.settings.iter())
            .all(|s| graph.find_device(&s.device).is_some());
        if !valid {
            report.groups.push(g.name.clone());
        }
        valid
    });

    if !report.is_empty() {
        info!(groups = ?report.groups, "Removed groups referring to missing devices");
    }
    report
}

/// Devices whose `parent_hub` names a device that does not exist
pub fn dangling_parents(graph: &DeviceGraph) -> Vec<DanglingParent> {
    graph
        .devices()
        .iter()
        .filter(|d| !d.parent_hub.is_empty() && graph.find_device(&d.parent_hub).is_none())
        .map(|d| DanglingParent {
            device: d.name.clone(),
            hub: d.parent_hub.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Setting;
    use crate::device::Device;

    fn fixture() -> (DeviceGraph, ConfigModel) {
        let mut graph = DeviceGraph::new();
        graph.add_device(Device::new("Wheel", "Demo", "DWheel", "")).unwrap();
        graph.add_device(Device::new("Shutter", "Demo", "DShutter", "")).unwrap();
        graph.add_device(Device::new("Lamp", "Demo", "DLamp", "")).unwrap();

        let mut config = ConfigModel::new();
        config.add_setting("Channel", "DAPI", Setting::new("Wheel", "Label", "UV"));
        config.add_setting("Channel", "DAPI", Setting::new("Lamp", "Intensity", "5"));
        config.add_setting("Channel", "Dark", Setting::new("Lamp", "Intensity", "0"));
        config.add_setting("Channel", "FITC", Setting::new("Wheel", "Label", "Blue"));
        config.add_setting("Light", "On", Setting::new("Lamp", "State", "1"));
        config.add_setting("Shutters", "Open", Setting::new("Shutter", "State", "1"));
        (graph, config)
    }

    #[test]
    fn test_check_configurations_prunes_per_setting() {
        let (mut graph, mut config) = fixture();
        graph.remove_device("Lamp");

        let report = check_configurations(&graph, &mut config);

        let channel = config.find_config_group("Channel").unwrap();
        let dapi = channel.find_preset("DAPI").unwrap();
        assert_eq!(dapi.settings, vec![Setting::new("Wheel", "Label", "UV")]);
        assert!(channel.find_preset("Dark").is_none());
        assert!(channel.find_preset("FITC").is_some());
        assert!(config.find_config_group("Light").is_none());
        assert!(config.find_config_group("Shutters").is_some());

        assert_eq!(report.settings.len(), 3);
        assert_eq!(report.presets, vec![
            ("Channel".to_string(), "Dark".to_string()),
            ("Light".to_string(), "On".to_string()),
        ]);
        assert_eq!(report.groups, vec!["Light".to_string()]);
    }

    #[test]
    fn test_remove_invalid_configurations_drops_whole_group() {
        let (mut graph, mut config) = fixture();
        graph.remove_device("Lamp");

        let report = remove_invalid_configurations(&graph, &mut config);

        assert!(config.find_config_group("Channel").is_none());
        assert!(config.find_config_group("Light").is_none());
        assert!(config.find_config_group("Shutters").is_some());
        assert_eq!(report.groups, vec!["Channel".to_string(), "Light".to_string()]);
    }

    #[test]
    fn test_clean_model_is_untouched() {
        let (graph, mut config) = fixture();
        config.set_modified(false);
        assert!(check_configurations(&graph, &mut config).is_empty());
        assert!(remove_invalid_configurations(&graph, &mut config).is_empty());
        assert!(!config.is_modified());
    }

    #[test]
    fn test_dangling_parents() {
        let mut graph = DeviceGraph::new();
        let mut child = Device::new("Wheel", "Demo", "DWheel", "");
        child.parent_hub = "GoneHub".to_string();
        graph.add_device(child).unwrap();

        let dangling = dangling_parents(&graph);
        assert_eq!(dangling, vec![DanglingParent {
            device: "Wheel".to_string(),
            hub: "GoneHub".to_string(),
        }]);
    }
}
