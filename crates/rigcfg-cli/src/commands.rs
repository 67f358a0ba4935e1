//! Subcommand implementations

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

use rigcfg_bringup::{sync, Orchestrator};
use rigcfg_core::consistency::{self, DanglingParent};
use rigcfg_core::{
    codec, ConfigGroup, Device, MicroscopeModel, PruneReport, TopologyNode,
};
use rigcfg_hal::{scan_catalog, write_device_list, RigDescription, SimulatedHardware};

use crate::config::{Config, FailureDecision, PrunePolicy};

/// Build the simulated rig named in the configuration
pub fn hardware(config: &Config) -> Result<SimulatedHardware> {
    let rig = match &config.rig.path {
        Some(path) => RigDescription::from_file(Path::new(path))
            .with_context(|| format!("Failed to read rig description {path}"))?,
        None => RigDescription::demo()?,
    };
    Ok(SimulatedHardware::new(rig))
}

/// Load a config file into a model that knows the rig's catalog
pub fn load_model(hw: &SimulatedHardware, path: &Path) -> Result<MicroscopeModel> {
    let mut model = MicroscopeModel::with_catalog(scan_catalog(hw));
    codec::load_file(&mut model, path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    Ok(model)
}

fn prune(model: &mut MicroscopeModel, policy: PrunePolicy) -> PruneReport {
    match policy {
        PrunePolicy::Prune => model.check_configurations(),
        PrunePolicy::Strict => model.remove_invalid_configurations(),
    }
}

fn print_prune_report(report: &PruneReport) {
    if report.is_empty() {
        println!("Configuration is consistent");
        return;
    }
    for (group, preset, device, property) in &report.settings {
        println!("  dropped setting {group}/{preset}: {device}.{property}");
    }
    for (group, preset) in &report.presets {
        println!("  dropped empty preset {group}/{preset}");
    }
    for group in &report.groups {
        println!("  dropped group {group}");
    }
}

pub fn check(config: &Config, file: &Path, strict: bool, write: bool) -> Result<()> {
    let hw = hardware(config)?;
    let mut model = load_model(&hw, file)?;

    for DanglingParent { device, hub } in consistency::dangling_parents(&model.graph) {
        warn!(device = %device, hub = %hub, "Parent hub is not defined");
        println!("  {device}: parent hub {hub} is not defined");
    }

    let policy = if strict {
        PrunePolicy::Strict
    } else {
        config.check.policy
    };
    let report = prune(&mut model, policy);
    print_prune_report(&report);

    if write && model.is_modified() {
        codec::save_file(&mut model, file)?;
        println!("Wrote {}", file.display());
    }
    Ok(())
}

pub fn normalize(config: &Config, file: &Path, output: Option<&Path>) -> Result<()> {
    let hw = hardware(config)?;
    let mut model = load_model(&hw, file)?;
    let target = output.unwrap_or(file);
    codec::save_file(&mut model, target)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    println!("Wrote {}", target.display());
    Ok(())
}

/// JSON view of a loaded model
#[derive(Serialize)]
struct Summary<'a> {
    file: String,
    devices: Vec<&'a Device>,
    topology: Vec<TopologyNode>,
    ports_in_use: Vec<&'a str>,
    groups: &'a [ConfigGroup],
    pixel_size: &'a ConfigGroup,
    synchro_devices: &'a [String],
    dangling_parents: Vec<DanglingParent>,
}

pub fn show(config: &Config, file: &Path, json: bool) -> Result<()> {
    let hw = hardware(config)?;
    let model = load_model(&hw, file)?;

    if json {
        let summary = Summary {
            file: file.display().to_string(),
            devices: model.devices().iter().filter(|d| !d.is_core()).collect(),
            topology: model.graph.topology(),
            ports_in_use: model.graph.ports_in_use().map(|p| p.name.as_str()).collect(),
            groups: model.config.groups(),
            pixel_size: model.config.pixel_size_group(),
            synchro_devices: model.synchro_devices(),
            dangling_parents: consistency::dangling_parents(&model.graph),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", file.display());
    println!("Devices:");
    for node in model.graph.topology().iter().filter(|n| n.parent.is_none()) {
        print_node(&model, node, 1);
    }

    let ports: Vec<&str> = model.graph.ports_in_use().map(|p| p.name.as_str()).collect();
    if !ports.is_empty() {
        println!("Serial ports in use: {}", ports.join(", "));
    }

    println!("Groups:");
    for group in model.config.groups() {
        println!("  {}", group.name);
        for preset in &group.presets {
            println!("    {} ({} settings)", preset.name, preset.settings.len());
        }
    }

    let pixel_presets = &model.config.pixel_size_group().presets;
    if !pixel_presets.is_empty() {
        println!("Pixel sizes:");
        for preset in pixel_presets {
            println!(
                "  {}: {} um/px",
                preset.name, preset.calibration.pixel_size_um
            );
        }
    }
    Ok(())
}

fn print_node(model: &MicroscopeModel, node: &TopologyNode, depth: usize) {
    let description = model
        .find_device(&node.name)
        .map(|d| d.description.as_str())
        .unwrap_or_default();
    println!(
        "{}{} [{:?}] {}",
        "  ".repeat(depth),
        node.name,
        node.role,
        description
    );
    let topology = model.graph.topology();
    for child in &node.children {
        if let Some(child_node) = topology.iter().find(|n| &n.name == child) {
            print_node(model, child_node, depth + 1);
        }
    }
}

pub fn devlist(config: &Config, output: Option<&Path>) -> Result<()> {
    let hw = hardware(config)?;
    let path = output.unwrap_or_else(|| Path::new(&config.output.device_list));
    let count = write_device_list(&hw, path)?;
    println!("Wrote {count} devices to {}", path.display());
    Ok(())
}

pub fn bringup(
    config: &Config,
    file: &Path,
    on_failure: Option<FailureDecision>,
    output: Option<&Path>,
) -> Result<()> {
    let mut hw = hardware(config)?;
    let mut model = load_model(&hw, file)?;
    model.dump_setup();

    let decision = on_failure.unwrap_or(config.bringup.on_failure);
    let busy = Arc::new(AtomicBool::new(false));
    let mut orchestrator = Orchestrator::new(busy);
    let report = orchestrator.run(&mut model, &mut hw, |failure| {
        println!("{} failed to initialize: {}", failure.device, failure.cause);
        decision == FailureDecision::Remove
    })?;

    sync::load_state_labels_from_hardware(&mut model, &hw);
    sync::apply_labels_to_hardware(&model, &mut hw)?;
    sync::apply_delays_to_hardware(&model, &mut hw)?;
    if !report.removed.is_empty() {
        let pruned = prune(&mut model, config.check.policy);
        print_prune_report(&pruned);
    }
    sync::apply_configs_to_hardware(&model, &mut hw)?;

    println!("Initialized: {}", report.initialized.join(", "));
    if !report.ports_in_use.is_empty() {
        println!("Ports in use: {}", report.ports_in_use.join(", "));
    }
    if !report.removed.is_empty() {
        println!("Removed: {}", report.removed.join(", "));
    }
    if !report.kept.is_empty() {
        println!("Kept after failure: {}", report.kept.join(", "));
    }
    info!(initialized = report.initialized.len(), "Rig is up");

    if let Some(out) = output {
        codec::save_file(&mut model, out)?;
        println!("Wrote {}", out.display());
    }
    Ok(())
}
