//! Config-file codec
//!
//! The persisted format is line oriented: each line is a command keyword
//! followed by comma-separated fields. `#` lines are comments. A
//! `Property,Core,Initialize,<0|1>` line switches every following device
//! `Property` line between pre-init and post-init.
//!
//! Loading is all-or-nothing: on any error the model is reset before the
//! error is returned. Either way the mandatory core properties and groups are
//! re-added and serial-port usage is recomputed afterwards.

use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::Setting;
use crate::device::{keyword, Device, DeviceType, Label, PropertyItem};
use crate::error::{ModelError, Result};
use crate::model::MicroscopeModel;

/// Command keywords of the config file
pub mod command {
    pub const DEVICE: &str = "Device";
    pub const PROPERTY: &str = "Property";
    pub const LABEL: &str = "Label";
    pub const CONFIG_GROUP: &str = "ConfigGroup";
    pub const CONFIG_PIXEL_SIZE: &str = "ConfigPixelSize";
    pub const PIXEL_SIZE_UM: &str = "PixelSize_um";
    pub const PIXEL_SIZE_AFFINE: &str = "PixelSizeAffine";
    pub const PIXEL_SIZE_DXDZ: &str = "PixelSizedxdz";
    pub const PIXEL_SIZE_DYDZ: &str = "PixelSizedydz";
    pub const PIXEL_SIZE_OPTIMAL_Z_UM: &str = "PixelSizeOptimalZUm";
    pub const DELAY: &str = "Delay";
    pub const FOCUS_DIRECTION: &str = "FocusDirection";
    pub const PARENT_ID: &str = "ParentID";
    pub const IMAGE_SYNCHRO: &str = "ImageSynchro";
}

/// One command line of the config file
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Device {
        name: String,
        library: String,
        adapter: String,
    },
    Property {
        device: String,
        name: String,
        value: String,
    },
    Label {
        device: String,
        state: i64,
        label: String,
    },
    ConfigGroup {
        group: String,
        preset: String,
        setting: Setting,
    },
    ConfigPixelSize {
        preset: String,
        setting: Setting,
    },
    PixelSizeUm {
        preset: String,
        value: f64,
    },
    PixelSizeAffine {
        preset: String,
        transform: [f64; 6],
    },
    PixelSizeDxdz {
        preset: String,
        value: f64,
    },
    PixelSizeDydz {
        preset: String,
        value: f64,
    },
    PixelSizeOptimalZUm {
        preset: String,
        value: f64,
    },
    Delay {
        device: String,
        value: f64,
    },
    FocusDirection {
        device: String,
        value: i32,
    },
    ParentId {
        device: String,
        hub: String,
    },
    ImageSynchro {
        device: String,
    },
}

/// Split a line into fields; trailing empty fields are dropped
fn split_fields(line: &str) -> Vec<&str> {
    let mut fields: Vec<&str> = line.split(',').collect();
    while fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }
    fields
}

/// Field accessor that reports failures against the offending line
struct Fields<'a> {
    line_no: usize,
    line: &'a str,
    fields: Vec<&'a str>,
}

impl<'a> Fields<'a> {
    fn arity(&self, allowed: &[usize]) -> Result<()> {
        if allowed.contains(&self.fields.len()) {
            return Ok(());
        }
        let expected = allowed
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(" or ");
        Err(ModelError::format(
            self.line_no,
            self.line,
            format!("{} fields required, found {}", expected, self.fields.len()),
        ))
    }

    /// Field text, or empty when an optional trailing value was omitted
    fn text(&self, index: usize) -> String {
        self.fields.get(index).copied().unwrap_or_default().to_string()
    }

    fn float(&self, index: usize) -> Result<f64> {
        let raw = self.fields.get(index).copied().unwrap_or_default();
        raw.trim().parse().map_err(|_| {
            ModelError::format(self.line_no, self.line, format!("'{raw}' is not a number"))
        })
    }

    fn int<T: std::str::FromStr>(&self, index: usize) -> Result<T> {
        let raw = self.fields.get(index).copied().unwrap_or_default();
        raw.trim().parse().map_err(|_| {
            ModelError::format(self.line_no, self.line, format!("'{raw}' is not an integer"))
        })
    }
}

impl Record {
    /// Parse one line; comments, blank lines and unknown commands yield `None`
    pub fn parse(line_no: usize, line: &str) -> Result<Option<Record>> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let fields = Fields {
            line_no,
            line,
            fields: split_fields(line),
        };
        let Some(&keyword) = fields.fields.first() else {
            return Ok(None);
        };

        let record = match keyword {
            command::DEVICE => {
                fields.arity(&[4])?;
                Record::Device {
                    name: fields.text(1),
                    library: fields.text(2),
                    adapter: fields.text(3),
                }
            }
            command::PROPERTY => {
                fields.arity(&[3, 4])?;
                Record::Property {
                    device: fields.text(1),
                    name: fields.text(2),
                    value: fields.text(3),
                }
            }
            command::LABEL => {
                fields.arity(&[3, 4])?;
                Record::Label {
                    device: fields.text(1),
                    state: fields.int(2)?,
                    label: fields.text(3),
                }
            }
            command::CONFIG_GROUP => {
                fields.arity(&[5, 6])?;
                Record::ConfigGroup {
                    group: fields.text(1),
                    preset: fields.text(2),
                    setting: Setting::new(fields.text(3), fields.text(4), fields.text(5)),
                }
            }
            command::CONFIG_PIXEL_SIZE => {
                fields.arity(&[4, 5])?;
                Record::ConfigPixelSize {
                    preset: fields.text(1),
                    setting: Setting::new(fields.text(2), fields.text(3), fields.text(4)),
                }
            }
            command::PIXEL_SIZE_UM => {
                fields.arity(&[3])?;
                Record::PixelSizeUm {
                    preset: fields.text(1),
                    value: fields.float(2)?,
                }
            }
            command::PIXEL_SIZE_AFFINE => {
                fields.arity(&[8])?;
                let mut transform = [0.0; 6];
                for (i, slot) in transform.iter_mut().enumerate() {
                    *slot = fields.float(i + 2)?;
                }
                Record::PixelSizeAffine {
                    preset: fields.text(1),
                    transform,
                }
            }
            command::PIXEL_SIZE_DXDZ => {
                fields.arity(&[3])?;
                Record::PixelSizeDxdz {
                    preset: fields.text(1),
                    value: fields.float(2)?,
                }
            }
            command::PIXEL_SIZE_DYDZ => {
                fields.arity(&[3])?;
                Record::PixelSizeDydz {
                    preset: fields.text(1),
                    value: fields.float(2)?,
                }
            }
            command::PIXEL_SIZE_OPTIMAL_Z_UM => {
                fields.arity(&[3])?;
                Record::PixelSizeOptimalZUm {
                    preset: fields.text(1),
                    value: fields.float(2)?,
                }
            }
            command::DELAY => {
                fields.arity(&[3])?;
                Record::Delay {
                    device: fields.text(1),
                    value: fields.float(2)?,
                }
            }
            command::FOCUS_DIRECTION => {
                fields.arity(&[3])?;
                Record::FocusDirection {
                    device: fields.text(1),
                    value: fields.int(2)?,
                }
            }
            command::PARENT_ID => {
                fields.arity(&[3])?;
                Record::ParentId {
                    device: fields.text(1),
                    hub: fields.text(2),
                }
            }
            command::IMAGE_SYNCHRO => {
                fields.arity(&[2])?;
                Record::ImageSynchro {
                    device: fields.text(1),
                }
            }
            other => {
                debug!(line = line_no, command = other, "Skipping unknown command");
                return Ok(None);
            }
        };
        Ok(Some(record))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Device {
                name,
                library,
                adapter,
            } => write!(f, "{},{},{},{}", command::DEVICE, name, library, adapter),
            Record::Property {
                device,
                name,
                value,
            } => write!(f, "{},{},{},{}", command::PROPERTY, device, name, value),
            Record::Label {
                device,
                state,
                label,
            } => write!(f, "{},{},{},{}", command::LABEL, device, state, label),
            Record::ConfigGroup {
                group,
                preset,
                setting,
            } => write!(
                f,
                "{},{},{},{},{},{}",
                command::CONFIG_GROUP,
                group,
                preset,
                setting.device,
                setting.property,
                setting.value
            ),
            Record::ConfigPixelSize { preset, setting } => write!(
                f,
                "{},{},{},{},{}",
                command::CONFIG_PIXEL_SIZE,
                preset,
                setting.device,
                setting.property,
                setting.value
            ),
            Record::PixelSizeUm { preset, value } => {
                write!(f, "{},{},{}", command::PIXEL_SIZE_UM, preset, value)
            }
            Record::PixelSizeAffine { preset, transform } => {
                write!(f, "{},{}", command::PIXEL_SIZE_AFFINE, preset)?;
                for v in transform {
                    write!(f, ",{v}")?;
                }
                Ok(())
            }
            Record::PixelSizeDxdz { preset, value } => {
                write!(f, "{},{},{}", command::PIXEL_SIZE_DXDZ, preset, value)
            }
            Record::PixelSizeDydz { preset, value } => {
                write!(f, "{},{},{}", command::PIXEL_SIZE_DYDZ, preset, value)
            }
            Record::PixelSizeOptimalZUm { preset, value } => {
                write!(f, "{},{},{}", command::PIXEL_SIZE_OPTIMAL_Z_UM, preset, value)
            }
            Record::Delay { device, value } => {
                write!(f, "{},{},{}", command::DELAY, device, value)
            }
            Record::FocusDirection { device, value } => {
                write!(f, "{},{},{}", command::FOCUS_DIRECTION, device, value)
            }
            Record::ParentId { device, hub } => {
                write!(f, "{},{},{}", command::PARENT_ID, device, hub)
            }
            Record::ImageSynchro { device } => write!(f, "{},{}", command::IMAGE_SYNCHRO, device),
        }
    }
}

/// Whether device `Property` lines are currently pre-init or post-init
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitPhase {
    PreInit,
    PostInit,
}

/// Applies parsed records to a model, threading the init phase through
struct Loader<'m> {
    model: &'m mut MicroscopeModel,
    phase: InitPhase,
}

impl<'m> Loader<'m> {
    fn undefined(line_no: usize, device: &str) -> ModelError {
        ModelError::Reference(format!("device {device} not defined (line {line_no})"))
    }

    fn apply(&mut self, line_no: usize, record: Record) -> Result<()> {
        trace_record(line_no, &record);
        match record {
            Record::Device {
                name,
                library,
                adapter,
            } => {
                let catalog = self.model.graph.catalog();
                let description = catalog.description(&library, &adapter);
                let device_type = match catalog.find(&library, &adapter) {
                    Some(known) => known.device_type(),
                    None if catalog
                        .find_port(&name)
                        .is_some_and(|p| p.library == library && p.adapter == adapter) =>
                    {
                        DeviceType::Serial
                    }
                    None => DeviceType::Unknown,
                };
                let device = Device::new(name, library, adapter, description).with_type(device_type);
                self.model.add_device(device)?;
            }
            Record::Property {
                device,
                name,
                value,
            } if device == keyword::CORE_DEVICE => {
                if name == keyword::CORE_INITIALIZE {
                    self.phase = if value == "0" {
                        InitPhase::PreInit
                    } else {
                        InitPhase::PostInit
                    };
                } else {
                    self.model
                        .add_setup_property(&device, PropertyItem::new(name, value))?;
                }
            }
            Record::Property {
                device,
                name,
                value,
            } => {
                if self.model.find_device(&device).is_none() {
                    return Err(Self::undefined(line_no, &device));
                }
                let prop = PropertyItem {
                    pre_init: self.phase == InitPhase::PreInit,
                    ..PropertyItem::new(name, value)
                };
                self.model.add_setup_property(&device, prop)?;
            }
            Record::Label {
                device,
                state,
                label,
            } => {
                if self.model.find_device(&device).is_none() {
                    return Err(Self::undefined(line_no, &device));
                }
                self.model.add_setup_label(&device, Label::new(state, label))?;
            }
            Record::ConfigGroup {
                group,
                preset,
                setting,
            } => self.model.config.add_setting(&group, &preset, setting),
            Record::ConfigPixelSize { preset, setting } => {
                self.model.config.add_pixel_size_setting(&preset, setting)
            }
            Record::PixelSizeUm { preset, value } => {
                self.calibrate(line_no, &preset, command::PIXEL_SIZE_UM, |c| c.pixel_size_um = value)
            }
            Record::PixelSizeAffine { preset, transform } => {
                self.calibrate(line_no, &preset, command::PIXEL_SIZE_AFFINE, |c| {
                    c.affine = Some(transform)
                })
            }
            Record::PixelSizeDxdz { preset, value } => {
                self.calibrate(line_no, &preset, command::PIXEL_SIZE_DXDZ, |c| c.dxdz = value)
            }
            Record::PixelSizeDydz { preset, value } => {
                self.calibrate(line_no, &preset, command::PIXEL_SIZE_DYDZ, |c| c.dydz = value)
            }
            Record::PixelSizeOptimalZUm { preset, value } => {
                self.calibrate(line_no, &preset, command::PIXEL_SIZE_OPTIMAL_Z_UM, |c| {
                    c.optimal_z_um = value
                })
            }
            Record::Delay { device, value } => {
                self.with_device(line_no, &device, |d| d.delay_ms = value)
            }
            Record::FocusDirection { device, value } => self.with_device(line_no, &device, |d| {
                d.focus_direction = value;
                // the direction is only saved again for stages
                d.set_type(DeviceType::Stage);
            }),
            Record::ParentId { device, hub } => {
                self.with_device(line_no, &device, |d| d.parent_hub = hub)
            }
            Record::ImageSynchro { device } => self.model.add_synchro_device(&device),
        }
        Ok(())
    }

    fn calibrate(
        &mut self,
        line_no: usize,
        preset: &str,
        field: &'static str,
        update: impl FnOnce(&mut crate::config::PixelCalibration),
    ) {
        match self.model.config.pixel_calibration_mut(preset) {
            Some(calibration) => update(calibration),
            None => warn!(
                line = line_no,
                preset,
                field,
                "Calibration for undefined pixel-size preset dropped"
            ),
        }
    }

    fn with_device(&mut self, line_no: usize, device: &str, update: impl FnOnce(&mut Device)) {
        match self.model.graph.find_device_mut(device) {
            Some(found) => update(found),
            None => warn!(line = line_no, device, "Line refers to undefined device, ignored"),
        }
    }
}

fn trace_record(line_no: usize, record: &Record) {
    tracing::trace!(line = line_no, record = %record, "Applying record");
}

/// Parse every command line of a config text without touching any model
pub fn parse_records(text: &str) -> Result<Vec<(usize, Record)>> {
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if let Some(record) = Record::parse(index + 1, line)? {
            records.push((index + 1, record));
        }
    }
    Ok(records)
}

/// Replace the model's content with the configuration in `text`
pub fn load_str(model: &mut MicroscopeModel, text: &str) -> Result<()> {
    model.reset();

    let result = parse_records(text).and_then(|records| {
        let mut loader = Loader {
            model: &mut *model,
            phase: InitPhase::PreInit,
        };
        records
            .into_iter()
            .try_for_each(|(line_no, record)| loader.apply(line_no, record))
    });

    if let Err(e) = &result {
        warn!(error = %e, "Config load failed, model reset");
        model.reset();
    }

    model.repair();
    model.graph.recompute_port_usage();
    model.set_modified(false);
    result
}

/// Load a config file into the model
pub fn load_file(model: &mut MicroscopeModel, path: &Path) -> Result<()> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            model.reset();
            model.set_modified(false);
            return Err(e.into());
        }
    };
    let result = load_str(model, &text);
    if result.is_ok() {
        model.set_file_name(path);
        info!(
            path = %path.display(),
            devices = model.devices().len() - 1,
            groups = model.config.groups().len(),
            "Loaded configuration"
        );
    }
    result
}

/// Accumulates the output text section by section
#[derive(Default)]
struct Writer {
    out: String,
}

impl Writer {
    fn comment(&mut self, text: &str) {
        self.out.push_str("# ");
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn record(&mut self, record: Record) {
        self.out.push_str(&record.to_string());
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn property(&mut self, device: &str, prop: &PropertyItem) {
        self.record(Record::Property {
            device: device.to_string(),
            name: prop.name.clone(),
            value: prop.value.clone(),
        });
    }

    fn init_marker(&mut self, value: &str) {
        self.record(Record::Property {
            device: keyword::CORE_DEVICE.to_string(),
            name: keyword::CORE_INITIALIZE.to_string(),
            value: value.to_string(),
        });
    }
}

/// Render the model in canonical section order
pub fn to_config_string(model: &MicroscopeModel) -> String {
    let mut w = Writer::default();
    let devices: Vec<&Device> = model.devices().iter().filter(|d| !d.is_core()).collect();
    let ports: Vec<&Device> = model.graph.ports_in_use().collect();

    w.comment(&format!(
        "Generated by rigcfg on {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    w.blank();

    w.comment("Reset");
    w.init_marker("0");
    w.blank();

    w.comment("Devices");
    for dev in &ports {
        w.record(Record::Device {
            name: dev.name.clone(),
            library: dev.library.clone(),
            adapter: dev.adapter.clone(),
        });
    }
    for dev in devices.iter().filter(|d| !ports.iter().any(|p| p.name == d.name)) {
        w.record(Record::Device {
            name: dev.name.clone(),
            library: dev.library.clone(),
            adapter: dev.adapter.clone(),
        });
    }
    w.blank();

    w.comment("Pre-init settings for devices");
    for dev in &devices {
        for prop in dev.setup_properties.iter().filter(|p| p.pre_init) {
            w.property(&dev.name, prop);
        }
    }
    w.blank();

    // a port still listed as a device had its properties written with the devices
    let port_only: Vec<&Device> = ports
        .iter()
        .copied()
        .filter(|p| !devices.iter().any(|d| d.name == p.name))
        .collect();

    w.comment("Pre-init settings for COM ports");
    for dev in &port_only {
        for prop in dev.setup_properties.iter().filter(|p| p.pre_init) {
            w.property(&dev.name, prop);
        }
    }
    w.blank();

    w.comment("Hub (parent) references");
    for dev in devices.iter().filter(|d| !d.parent_hub.is_empty()) {
        w.record(Record::ParentId {
            device: dev.name.clone(),
            hub: dev.parent_hub.clone(),
        });
    }
    w.blank();

    w.comment("Initialize");
    w.init_marker("1");
    w.blank();

    w.comment("Post-init settings for devices");
    for dev in devices.iter().chain(&port_only) {
        for prop in dev.setup_properties.iter().filter(|p| !p.pre_init) {
            w.property(&dev.name, prop);
        }
    }
    w.blank();

    w.comment("Delays");
    for dev in devices.iter().filter(|d| d.delay_ms > 0.0) {
        w.record(Record::Delay {
            device: dev.name.clone(),
            value: dev.delay_ms,
        });
    }
    w.blank();

    w.comment("Focus directions");
    for dev in devices.iter().filter(|d| d.is_stage()) {
        w.record(Record::FocusDirection {
            device: dev.name.clone(),
            value: dev.focus_direction,
        });
    }
    w.blank();

    w.comment("Roles");
    if let Some(core) = model.graph.core_device() {
        for prop in core.setup_properties.iter().filter(|p| !p.value.is_empty()) {
            w.property(&core.name, prop);
        }
    }
    w.blank();

    w.comment("Camera-synchronized devices");
    for device in model.synchro_devices() {
        w.record(Record::ImageSynchro {
            device: device.clone(),
        });
    }
    w.blank();

    w.comment("Labels");
    for dev in devices.iter().filter(|d| !d.setup_labels.is_empty()) {
        w.comment(&dev.name);
        for label in &dev.setup_labels {
            w.record(Record::Label {
                device: dev.name.clone(),
                state: label.state,
                label: label.label.clone(),
            });
        }
    }
    w.blank();

    w.comment("Configuration presets");
    for group in model.config.groups() {
        w.comment(&format!("Group: {}", group.name));
        for preset in &group.presets {
            w.comment(&format!("Preset: {}", preset.name));
            for setting in &preset.settings {
                w.record(Record::ConfigGroup {
                    group: group.name.clone(),
                    preset: preset.name.clone(),
                    setting: setting.clone(),
                });
            }
            w.blank();
        }
        w.blank();
    }
    w.blank();

    w.comment("PixelSize settings");
    for preset in &model.config.pixel_size_group().presets {
        if preset.settings.is_empty() {
            // calibration lines need a ConfigPixelSize line to attach to on load
            warn!(preset = %preset.name, "Pixel-size preset has no settings, not saved");
            continue;
        }
        let name = preset.name.clone();
        let calibration = &preset.calibration;
        w.comment(&format!("Resolution preset: {name}"));
        for setting in &preset.settings {
            w.record(Record::ConfigPixelSize {
                preset: name.clone(),
                setting: setting.clone(),
            });
        }
        w.record(Record::PixelSizeUm {
            preset: name.clone(),
            value: calibration.pixel_size_um,
        });
        if let Some(transform) = calibration.affine {
            w.record(Record::PixelSizeAffine {
                preset: name.clone(),
                transform,
            });
        }
        w.record(Record::PixelSizeDxdz {
            preset: name.clone(),
            value: calibration.dxdz,
        });
        w.record(Record::PixelSizeDydz {
            preset: name.clone(),
            value: calibration.dydz,
        });
        w.record(Record::PixelSizeOptimalZUm {
            preset: name,
            value: calibration.optimal_z_um,
        });
    }
    w.blank();

    w.out
}

/// Write the model to `path`; clears the dirty bit on success
pub fn save_file(model: &mut MicroscopeModel, path: &Path) -> Result<()> {
    std::fs::write(path, to_config_string(model))?;
    model.set_file_name(path);
    model.set_modified(false);
    info!(path = %path.display(), "Saved configuration");
    Ok(())
}
