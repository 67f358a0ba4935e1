//! Configuration groups, presets and pixel-size calibration

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::keyword;
use crate::error::{ModelError, Result};

/// One (device, property, value) binding inside a preset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub device: String,
    pub property: String,
    pub value: String,
}

impl Setting {
    pub fn new(
        device: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            property: property.into(),
            value: value.into(),
        }
    }

    /// Whether both settings address the same device property
    pub fn matches(&self, other: &Setting) -> bool {
        self.device == other.device && self.property == other.property
    }
}

/// Calibration carried by presets of the pixel-size group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelCalibration {
    pub pixel_size_um: f64,
    /// Row-major 2x3 stage-to-image transform
    #[serde(default)]
    pub affine: Option<[f64; 6]>,
    #[serde(default)]
    pub dxdz: f64,
    #[serde(default)]
    pub dydz: f64,
    #[serde(default)]
    pub optimal_z_um: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigPreset {
    pub name: String,
    pub settings: Vec<Setting>,
    /// Only meaningful inside the pixel-size group
    #[serde(default)]
    pub calibration: PixelCalibration,
}

impl ConfigPreset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Append a setting, or overwrite the value of one for the same property
    pub fn add_setting(&mut self, setting: Setting) {
        match self.settings.iter_mut().find(|s| s.matches(&setting)) {
            Some(existing) => existing.value = setting.value,
            None => self.settings.push(setting),
        }
    }

    pub fn remove_setting(&mut self, device: &str, property: &str) -> bool {
        let before = self.settings.len();
        self.settings
            .retain(|s| !(s.device == device && s.property == property));
        self.settings.len() != before
    }

    pub fn find_setting(&self, device: &str, property: &str) -> Option<&Setting> {
        self.settings
            .iter()
            .find(|s| s.device == device && s.property == property)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigGroup {
    pub name: String,
    pub presets: Vec<ConfigPreset>,
}

impl ConfigGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            presets: Vec::new(),
        }
    }

    pub fn find_preset(&self, name: &str) -> Option<&ConfigPreset> {
        self.presets.iter().find(|p| p.name == name)
    }

    pub fn find_preset_mut(&mut self, name: &str) -> Option<&mut ConfigPreset> {
        self.presets.iter_mut().find(|p| p.name == name)
    }

    /// Add a preset; returns false if one with the same name exists
    pub fn add_preset(&mut self, preset: ConfigPreset) -> bool {
        if self.find_preset(&preset.name).is_some() {
            return false;
        }
        self.presets.push(preset);
        true
    }

    /// Get a preset by name, creating an empty one at the end if missing
    pub fn preset_entry(&mut self, name: &str) -> &mut ConfigPreset {
        let index = match self.presets.iter().position(|p| p.name == name) {
            Some(index) => index,
            None => {
                self.presets.push(ConfigPreset::new(name));
                self.presets.len() - 1
            }
        };
        &mut self.presets[index]
    }

    /// Add a setting to the named preset, creating the preset as needed
    pub fn add_setting(&mut self, preset: &str, setting: Setting) {
        self.preset_entry(preset).add_setting(setting);
    }

    pub fn remove_preset(&mut self, name: &str) -> bool {
        let before = self.presets.len();
        self.presets.retain(|p| p.name != name);
        self.presets.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

/// All configuration groups plus the reserved pixel-size group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigModel {
    groups: Vec<ConfigGroup>,
    pixel_size: ConfigGroup,
    #[serde(skip)]
    modified: bool,
}

impl Default for ConfigModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigModel {
    pub fn new() -> Self {
        Self {
            groups: Vec::new(),
            pixel_size: ConfigGroup::new(keyword::PIXEL_SIZE_GROUP),
            modified: false,
        }
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.pixel_size = ConfigGroup::new(keyword::PIXEL_SIZE_GROUP);
        self.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    pub fn groups(&self) -> &[ConfigGroup] {
        &self.groups
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.name.clone()).collect()
    }

    /// Create an empty group; returns false if it already exists
    pub fn add_config_group(&mut self, name: &str) -> bool {
        if self.find_config_group(name).is_some() {
            return false;
        }
        self.groups.push(ConfigGroup::new(name));
        self.modified = true;
        true
    }

    /// Insert a complete group, replacing any group of the same name
    pub fn put_config_group(&mut self, group: ConfigGroup) {
        match self.groups.iter_mut().find(|g| g.name == group.name) {
            Some(existing) => *existing = group,
            None => self.groups.push(group),
        }
        self.modified = true;
    }

    pub fn find_config_group(&self, name: &str) -> Option<&ConfigGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn find_config_group_mut(&mut self, name: &str) -> Option<&mut ConfigGroup> {
        self.groups.iter_mut().find(|g| g.name == name)
    }

    pub fn remove_group(&mut self, name: &str) -> Option<ConfigGroup> {
        let index = self.groups.iter().position(|g| g.name == name)?;
        self.modified = true;
        Some(self.groups.remove(index))
    }

    pub fn rename_group(&mut self, old: &str, new: &str) -> Result<()> {
        if old == new {
            return Ok(());
        }
        if self.find_config_group(new).is_some() {
            return Err(ModelError::Duplicate(new.to_string()));
        }
        let group = self
            .find_config_group_mut(old)
            .ok_or_else(|| ModelError::Reference(format!("group {old} is not defined")))?;
        group.name = new.to_string();
        self.modified = true;
        Ok(())
    }

    /// Add a setting to group/preset, creating both as needed
    pub fn add_setting(&mut self, group: &str, preset: &str, setting: Setting) {
        self.add_config_group(group);
        if let Some(g) = self.find_config_group_mut(group) {
            g.add_setting(preset, setting);
        }
        self.modified = true;
    }

    pub fn remove_preset(&mut self, group: &str, preset: &str) -> Result<()> {
        let g = self
            .find_config_group_mut(group)
            .ok_or_else(|| ModelError::Reference(format!("group {group} is not defined")))?;
        if !g.remove_preset(preset) {
            return Err(ModelError::Reference(format!(
                "preset {preset} is not defined in group {group}"
            )));
        }
        self.modified = true;
        Ok(())
    }

    /// Rewrite `Label` settings of a device after one of its state labels changed
    pub fn update_labels_in_presets(&mut self, device: &str, old_label: &str, new_label: &str) {
        let mut changed = 0;
        for setting in self
            .groups
            .iter_mut()
            .flat_map(|g| g.presets.iter_mut())
            .flat_map(|p| p.settings.iter_mut())
        {
            if setting.property == keyword::LABEL
                && setting.device == device
                && setting.value == old_label
            {
                setting.value = new_label.to_string();
                changed += 1;
            }
        }
        if changed > 0 {
            debug!(device, old_label, new_label, changed, "Updated labels in presets");
            self.modified = true;
        }
    }

    /// Point every setting that names `old` at `new`
    pub fn rename_device_references(&mut self, old: &str, new: &str) {
        let groups = self.groups.iter_mut().chain(std::iter::once(&mut self.pixel_size));
        for setting in groups
            .flat_map(|g| g.presets.iter_mut())
            .flat_map(|p| p.settings.iter_mut())
        {
            if setting.device == old {
                setting.device = new.to_string();
            }
        }
    }

    pub fn pixel_size_group(&self) -> &ConfigGroup {
        &self.pixel_size
    }

    pub fn pixel_size_group_mut(&mut self) -> &mut ConfigGroup {
        self.modified = true;
        &mut self.pixel_size
    }

    pub fn set_pixel_size_group(&mut self, group: ConfigGroup) {
        self.pixel_size = group;
        self.modified = true;
    }

    pub fn add_pixel_size_setting(&mut self, preset: &str, setting: Setting) {
        self.pixel_size.add_setting(preset, setting);
        self.modified = true;
    }

    pub fn find_pixel_size_preset(&self, preset: &str) -> Option<&ConfigPreset> {
        self.pixel_size.find_preset(preset)
    }

    pub fn pixel_calibration_mut(&mut self, preset: &str) -> Option<&mut PixelCalibration> {
        let found = self.pixel_size.find_preset_mut(preset)?;
        self.modified = true;
        Some(&mut found.calibration)
    }

    /// Keep only groups accepted by the predicate
    pub(crate) fn retain_groups(&mut self, mut keep: impl FnMut(&ConfigGroup) -> bool) {
        let before = self.groups.len();
        self.groups.retain(|g| keep(g));
        if self.groups.len() != before {
            self.modified = true;
        }
    }

    pub(crate) fn groups_mut(&mut self) -> impl Iterator<Item = &mut ConfigGroup> {
        self.groups.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_config_group_never_overwrites() {
        let mut config = ConfigModel::new();
        assert!(config.add_config_group("Objective"));
        config.add_setting("Objective", "10x", Setting::new("Nosepiece", "Label", "10x"));
        assert!(!config.add_config_group("Objective"));
        assert_eq!(config.find_config_group("Objective").unwrap().presets.len(), 1);
    }

    #[test]
    fn test_setting_overwrite_preserves_order() {
        let mut preset = ConfigPreset::new("DAPI");
        preset.add_setting(Setting::new("Wheel", "Label", "Blue"));
        preset.add_setting(Setting::new("Shutter", "State", "1"));
        preset.add_setting(Setting::new("Wheel", "Label", "UV"));

        assert_eq!(preset.settings.len(), 2);
        assert_eq!(preset.settings[0], Setting::new("Wheel", "Label", "UV"));
        assert_eq!(preset.settings[1].device, "Shutter");
    }

    #[test]
    fn test_rename_group() {
        let mut config = ConfigModel::new();
        config.add_config_group("A");
        config.add_config_group("B");
        assert!(matches!(config.rename_group("A", "B"), Err(ModelError::Duplicate(_))));
        assert!(matches!(config.rename_group("X", "Y"), Err(ModelError::Reference(_))));
        config.rename_group("A", "C").unwrap();
        assert_eq!(config.group_names(), vec!["C".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_remove_preset() {
        let mut config = ConfigModel::new();
        config.add_setting("Channel", "DAPI", Setting::new("Wheel", "Label", "UV"));
        config.add_setting("Channel", "FITC", Setting::new("Wheel", "Label", "Blue"));
        config.remove_preset("Channel", "DAPI").unwrap();
        assert!(config.remove_preset("Channel", "DAPI").is_err());
        assert!(config.remove_preset("Nope", "DAPI").is_err());
        assert_eq!(config.find_config_group("Channel").unwrap().presets.len(), 1);
    }

    #[test]
    fn test_update_labels_in_presets() {
        let mut config = ConfigModel::new();
        config.add_setting("Channel", "DAPI", Setting::new("Wheel", "Label", "Filter-1"));
        config.add_setting("Channel", "DAPI", Setting::new("Other", "Label", "Filter-1"));
        config.set_modified(false);

        config.update_labels_in_presets("Wheel", "Filter-1", "UV");
        let preset = config.find_config_group("Channel").unwrap().find_preset("DAPI").unwrap();
        assert_eq!(preset.find_setting("Wheel", "Label").unwrap().value, "UV");
        assert_eq!(preset.find_setting("Other", "Label").unwrap().value, "Filter-1");
        assert!(config.is_modified());
    }

    #[test]
    fn test_pixel_size_group_is_separate() {
        let mut config = ConfigModel::new();
        config.add_pixel_size_setting("Res10x", Setting::new("Nosepiece", "Label", "10x"));
        config.pixel_calibration_mut("Res10x").unwrap().pixel_size_um = 0.65;

        assert!(config.groups().is_empty());
        let preset = config.find_pixel_size_preset("Res10x").unwrap();
        assert_eq!(preset.calibration.pixel_size_um, 0.65);
        assert!(config.pixel_calibration_mut("Missing").is_none());
    }
}
