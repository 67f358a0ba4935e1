//! Staged hardware bring-up of a rig model
//!
//! Bring-up runs in five steps against a [`Hardware`] implementation:
//! 1. load every known serial port, then every device, then set hub links
//! 2. mark ports named by any device property as in use
//! 3. refresh properties from hardware and collapse duplicate port entries
//! 4. push pre-init properties, in-use ports first (ports are initialized here)
//! 5. initialize hubs, then all remaining devices
//!
//! Steps 1-4 run in [`Orchestrator::load`] and any hardware error there is
//! fatal. Step 5 is resumable: a device that fails to initialize suspends the
//! run until [`Orchestrator::resolve`] says whether to remove it (a hub takes
//! its peripherals along) or keep it and carry on. Devices already marked
//! initialized are skipped, so a completed run can be repeated.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use rigcfg_core::{Device, MicroscopeModel, PropertyItem};
use rigcfg_hal::{Hardware, HardwareError};

use crate::error::{BringupError, Result};
use crate::sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Idle,
    /// Steps 1-4 done, nothing initialized yet
    Loaded,
    Initializing,
    /// A device failed to initialize; waiting for [`Orchestrator::resolve`]
    AwaitingDecision,
    Complete,
}

/// A device that failed to initialize
#[derive(Debug)]
pub struct InitFailure {
    pub device: String,
    pub is_hub: bool,
    pub cause: HardwareError,
}

/// Outcome of one [`Orchestrator::attempt_initialize`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitStep {
    Complete,
    Failed { device: String, is_hub: bool },
}

/// What a bring-up run did
#[derive(Debug, Clone, Default, Serialize)]
pub struct BringupReport {
    pub loaded: Vec<String>,
    pub ports_in_use: Vec<String>,
    pub initialized: Vec<String>,
    /// Adapter names each initialized hub detected
    pub peripherals: BTreeMap<String, Vec<String>>,
    pub removed: Vec<String>,
    /// Devices that failed to initialize and were left in the model
    pub kept: Vec<String>,
}

pub struct Orchestrator {
    stage: Stage,
    /// Raised while bring-up is running; lowered before a failure is reported
    busy: Arc<AtomicBool>,
    kept: BTreeSet<String>,
    pending: Option<InitFailure>,
    report: BringupReport,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(Arc::new(AtomicBool::new(false)))
    }
}

impl Orchestrator {
    pub fn new(busy: Arc<AtomicBool>) -> Self {
        Self {
            stage: Stage::Idle,
            busy,
            kept: BTreeSet::new(),
            pending: None,
            report: BringupReport::default(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn busy_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.busy)
    }

    pub fn pending_failure(&self) -> Option<&InitFailure> {
        self.pending.as_ref()
    }

    pub fn report(&self) -> &BringupReport {
        &self.report
    }

    /// Abandon the current run
    pub fn reset(&mut self) {
        self.stage = Stage::Idle;
        self.pending = None;
        self.kept.clear();
        self.busy.store(false, Ordering::SeqCst);
    }

    /// Steps 1-4: load, scan port usage, refresh, apply pre-init properties
    pub fn load(&mut self, model: &mut MicroscopeModel, hw: &mut dyn Hardware) -> Result<()> {
        match self.stage {
            Stage::Idle | Stage::Complete => {}
            stage => return Err(BringupError::InvalidStage { action: "load", stage }),
        }

        self.busy.store(true, Ordering::SeqCst);
        self.kept.clear();
        self.report = BringupReport::default();

        let result = self.load_steps(model, hw);
        match &result {
            Ok(()) => self.stage = Stage::Loaded,
            Err(e) => {
                warn!(error = %e, "Bring-up aborted while loading");
                self.stage = Stage::Idle;
                self.busy.store(false, Ordering::SeqCst);
            }
        }
        result
    }

    fn load_steps(&mut self, model: &mut MicroscopeModel, hw: &mut dyn Hardware) -> Result<()> {
        self.load_devices(model, hw)?;
        self.scan_port_usage(model, hw);
        self.sync_from_hardware(model, hw);
        self.apply_pre_init(model, hw)
    }

    fn load_devices(&mut self, model: &MicroscopeModel, hw: &mut dyn Hardware) -> Result<()> {
        info!("Step 1: loading devices");

        let ports: Vec<&Device> = model.graph.ports().iter().filter(|p| !p.initialized).collect();
        for port in ports {
            self.load_one(hw, port)?;
        }

        let devices: Vec<&Device> = model
            .devices()
            .iter()
            .filter(|d| !d.is_core() && !d.initialized)
            .filter(|d| model.graph.find_serial_port(&d.name).is_none())
            .collect();
        for device in &devices {
            self.load_one(hw, device)?;
        }
        for device in devices.iter().filter(|d| !d.parent_hub.is_empty()) {
            hw.set_parent_label(&device.name, &device.parent_hub)?;
        }
        Ok(())
    }

    fn load_one(&mut self, hw: &mut dyn Hardware, device: &Device) -> Result<()> {
        match hw.load_device(&device.name, &device.library, &device.adapter) {
            Ok(()) => {
                debug!(device = %device.name, library = %device.library, "Loaded");
                self.report.loaded.push(device.name.clone());
                Ok(())
            }
            Err(HardwareError::AlreadyLoaded(_)) => {
                debug!(device = %device.name, "Already loaded");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn scan_port_usage(&mut self, model: &mut MicroscopeModel, hw: &dyn Hardware) {
        info!("Step 2: scanning serial port usage");

        let mut used: Vec<Device> = Vec::new();
        for port in model.graph.ports() {
            let referenced = model
                .devices()
                .iter()
                .filter(|d| !d.is_core())
                .any(|d| d.references_value(&port.name) || hardware_references(hw, &d.name, &port.name));
            if referenced {
                used.push(port.clone());
            }
        }

        for port in &used {
            debug!(port = %port.name, "Port in use");
            model.graph.use_serial_port(port, true);
            self.report.ports_in_use.push(port.name.clone());
        }
    }

    fn sync_from_hardware(&mut self, model: &mut MicroscopeModel, hw: &dyn Hardware) {
        info!("Step 3: reading properties from hardware");
        sync::refresh_model(model, hw);
        let moved = model.graph.remove_duplicate_com_ports();
        if !moved.is_empty() {
            info!(ports = ?moved, "Reconciled serial ports listed as devices");
        }
    }

    fn apply_pre_init(&mut self, model: &mut MicroscopeModel, hw: &mut dyn Hardware) -> Result<()> {
        info!("Step 4: applying pre-init properties");

        let ports: Vec<(String, Vec<PropertyItem>)> = model
            .graph
            .ports_in_use()
            .filter(|p| !p.initialized)
            .map(|p| (p.name.clone(), p.setup_properties.clone()))
            .collect();
        for (name, properties) in &ports {
            sync::apply_pre_init(hw, name, properties)?;
            hw.initialize_device(name)?;
            if let Some(port) = model.graph.find_serial_port_mut(name) {
                if let Err(e) = sync::refresh_device(hw, port) {
                    warn!(port = %name, error = %e, "Unable to refresh port");
                }
                port.initialized = true;
            }
            info!(port = %name, "Serial port initialized");
        }

        let devices: Vec<(String, Vec<PropertyItem>)> = model
            .devices()
            .iter()
            .filter(|d| !d.is_core() && !d.initialized)
            .map(|d| (d.name.clone(), d.setup_properties.clone()))
            .collect();
        for (name, properties) in &devices {
            sync::apply_pre_init(hw, name, properties)?;
        }
        Ok(())
    }

    /// Step 5: initialize until done or until a device fails
    pub fn attempt_initialize(
        &mut self,
        model: &mut MicroscopeModel,
        hw: &mut dyn Hardware,
    ) -> Result<InitStep> {
        match self.stage {
            Stage::Loaded => info!("Step 5: initializing devices"),
            Stage::Initializing => {}
            Stage::Complete => return Ok(InitStep::Complete),
            Stage::AwaitingDecision => {
                let device = self
                    .pending
                    .as_ref()
                    .map(|f| f.device.clone())
                    .unwrap_or_default();
                return Err(BringupError::PendingDecision(device));
            }
            stage => {
                return Err(BringupError::InvalidStage {
                    action: "initialize",
                    stage,
                })
            }
        }

        self.stage = Stage::Initializing;
        self.busy.store(true, Ordering::SeqCst);

        while let Some((name, is_hub)) = self.next_candidate(model) {
            if let Err(cause) = self.initialize_one(model, hw, &name, is_hub) {
                warn!(device = %name, hub = is_hub, error = %cause, "Device failed to initialize");
                // the caller's progress indicator must be down before it shows a prompt
                self.busy.store(false, Ordering::SeqCst);
                self.stage = Stage::AwaitingDecision;
                self.pending = Some(InitFailure {
                    device: name.clone(),
                    is_hub,
                    cause,
                });
                return Ok(InitStep::Failed { device: name, is_hub });
            }
        }

        self.stage = Stage::Complete;
        self.busy.store(false, Ordering::SeqCst);
        info!(
            initialized = self.report.initialized.len(),
            removed = self.report.removed.len(),
            kept = self.report.kept.len(),
            "Bring-up complete"
        );
        Ok(InitStep::Complete)
    }

    /// Next device to initialize: uninitialized hubs first, then the rest
    fn next_candidate(&self, model: &MicroscopeModel) -> Option<(String, bool)> {
        let waiting = |d: &&Device| !d.is_core() && !d.initialized && !self.kept.contains(&d.name);
        let devices = model.devices();
        devices
            .iter()
            .filter(waiting)
            .find(|d| d.is_hub())
            .or_else(|| devices.iter().find(|d| waiting(d)))
            .map(|d| (d.name.clone(), d.is_hub()))
    }

    fn initialize_one(
        &mut self,
        model: &mut MicroscopeModel,
        hw: &mut dyn Hardware,
        name: &str,
        is_hub: bool,
    ) -> std::result::Result<(), HardwareError> {
        let (parent_hub, stage_direction) = {
            let device = model
                .find_device(name)
                .ok_or_else(|| HardwareError::UnknownDevice(name.to_string()))?;
            (
                device.parent_hub.clone(),
                device.is_stage().then_some(device.focus_direction),
            )
        };

        if !parent_hub.is_empty() {
            hw.set_parent_label(name, &parent_hub)?;
        }
        hw.initialize_device(name)?;
        if let Some(direction) = stage_direction {
            hw.set_focus_direction(name, direction)?;
        }

        let peripherals = if is_hub {
            sync::discover_peripherals(model, hw, name).unwrap_or_else(|e| {
                warn!(hub = name, error = %e, "Peripheral discovery failed");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        if let Some(device) = model.graph.find_device_mut(name) {
            if let Err(e) = sync::refresh_device(hw, device) {
                warn!(device = name, error = %e, "Unable to refresh device");
            }
            device.initialized = true;
            if is_hub {
                self.report.peripherals.insert(
                    name.to_string(),
                    peripherals.iter().map(|p| p.adapter.clone()).collect(),
                );
                device.peripherals = peripherals;
            }
        }

        info!(device = name, "Initialized");
        self.report.initialized.push(name.to_string());
        Ok(())
    }

    /// Settle the pending failure: remove the device (with its peripherals) or keep it
    pub fn resolve(
        &mut self,
        model: &mut MicroscopeModel,
        hw: &mut dyn Hardware,
        remove: bool,
    ) -> Result<()> {
        if self.stage != Stage::AwaitingDecision {
            return Err(BringupError::NothingToResolve);
        }
        let failure = self.pending.take().ok_or(BringupError::NothingToResolve)?;

        if remove {
            if failure.is_hub {
                let peripherals = sync::remove_peripherals(model, hw, &failure.device);
                info!(hub = %failure.device, removed = ?peripherals, "Removed peripherals of failed hub");
                self.report.removed.extend(peripherals);
            }
            sync::remove_and_unload(model, hw, &failure.device);
            info!(device = %failure.device, "Removed failed device");
            self.report.removed.push(failure.device);
        } else {
            info!(device = %failure.device, "Keeping failed device");
            self.kept.insert(failure.device.clone());
            self.report.kept.push(failure.device);
        }

        self.stage = Stage::Initializing;
        Ok(())
    }

    /// Complete bring-up, asking `decide` whether to remove each failed device
    pub fn run(
        &mut self,
        model: &mut MicroscopeModel,
        hw: &mut dyn Hardware,
        mut decide: impl FnMut(&InitFailure) -> bool,
    ) -> Result<BringupReport> {
        self.load(model, hw)?;
        loop {
            match self.attempt_initialize(model, hw)? {
                InitStep::Complete => return Ok(self.report.clone()),
                InitStep::Failed { .. } => {
                    let remove = match &self.pending {
                        Some(failure) => decide(failure),
                        None => false,
                    };
                    self.resolve(model, hw, remove)?;
                }
            }
        }
    }
}

/// Whether any current hardware property of `device` equals `value`
fn hardware_references(hw: &dyn Hardware, device: &str, value: &str) -> bool {
    hw.property_names(device)
        .unwrap_or_default()
        .iter()
        .any(|p| hw.property(device, p).is_ok_and(|v| v == value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcfg_core::{load_str, to_config_string};
    use rigcfg_hal::{scan_catalog, Call, RigDescription, SimulatedHardware, DEMO_RIG};

    const RIG_CFG: &str = "\
Property,Core,Initialize,0
Device,COM3,SerialManager,COM3
Device,Hub,DemoCamera,DHub
Device,Cam,DemoCamera,DCam
Device,Wheel,DemoCamera,DWheel
Device,Z,DemoCamera,DStage
Device,Lamp,Lumen,Lamp
Property,COM3,BaudRate,19200
Property,Cam,Mode,Mono
Property,Lamp,Port,COM3
ParentID,Cam,Hub
ParentID,Wheel,Hub
ParentID,Z,Hub
Property,Core,Initialize,1
Property,Cam,Exposure,20
FocusDirection,Z,-1
ConfigGroup,Channel,Dark,Lamp,State,0
ConfigGroup,Camera,Fast,Cam,Exposure,5
";

    fn setup() -> (MicroscopeModel, SimulatedHardware) {
        let hw = SimulatedHardware::demo().unwrap();
        let mut model = MicroscopeModel::with_catalog(scan_catalog(&hw));
        load_str(&mut model, RIG_CFG).unwrap();
        (model, hw)
    }

    fn initialized_at(hw: &SimulatedHardware, name: &str) -> Option<usize> {
        hw.position(&Call::Initialize(name.to_string()))
    }

    #[test]
    fn test_full_bringup() {
        let (mut model, mut hw) = setup();
        let mut orchestrator = Orchestrator::default();
        let report = orchestrator.run(&mut model, &mut hw, |_| true).unwrap();

        assert_eq!(orchestrator.stage(), Stage::Complete);
        assert_eq!(report.initialized, vec!["Hub", "Cam", "Wheel", "Z", "Lamp"]);
        assert!(report.removed.is_empty());
        assert_eq!(report.peripherals["Hub"], vec!["DCam", "DWheel", "DStage"]);
        assert_eq!(model.find_device("Hub").unwrap().peripherals.len(), 3);
        assert!(model.devices().iter().filter(|d| !d.is_core()).all(|d| d.initialized));

        // pre-init values landed before initialization, post-init ones did not
        assert_eq!(hw.property("Cam", "Mode").unwrap(), "Mono");
        assert_eq!(hw.property("Cam", "Exposure").unwrap(), "10");
        assert_eq!(hw.focus_direction("Z").unwrap(), -1);
        assert_eq!(model.find_device("Z").unwrap().focus_direction, -1);
    }

    #[test]
    fn test_hub_initialized_before_peripherals() {
        let (mut model, mut hw) = setup();
        Orchestrator::default().run(&mut model, &mut hw, |_| true).unwrap();

        let hub = initialized_at(&hw, "Hub").unwrap();
        for peripheral in ["Cam", "Wheel", "Z"] {
            assert!(hub < initialized_at(&hw, peripheral).unwrap());
        }
        // ports are initialized during pre-init, ahead of every device
        assert!(initialized_at(&hw, "COM3").unwrap() < hub);
        let mode = hw
            .position(&Call::SetProperty {
                device: "Cam".into(),
                property: "Mode".into(),
                value: "Mono".into(),
            })
            .unwrap();
        assert!(mode < hub);
    }

    #[test]
    fn test_failed_hub_removal_takes_peripherals() {
        let (mut model, mut hw) = setup();
        hw.fail_initialize("Hub");

        let mut asked = Vec::new();
        let report = Orchestrator::default()
            .run(&mut model, &mut hw, |failure| {
                asked.push((failure.device.clone(), failure.is_hub));
                true
            })
            .unwrap();

        assert_eq!(asked, vec![("Hub".to_string(), true)]);
        assert_eq!(report.removed, vec!["Cam", "Wheel", "Z", "Hub"]);
        assert_eq!(report.initialized, vec!["Lamp"]);
        for name in ["Hub", "Cam", "Wheel", "Z"] {
            assert!(model.find_device(name).is_none());
            assert!(!hw.is_loaded(name));
        }
        assert!(initialized_at(&hw, "Cam").is_none());
        assert!(model.is_modified());
    }

    #[test]
    fn test_keeping_failed_device_continues() {
        let (mut model, mut hw) = setup();
        hw.fail_initialize("Wheel");

        let report = Orchestrator::default()
            .run(&mut model, &mut hw, |_| false)
            .unwrap();

        assert_eq!(report.kept, vec!["Wheel"]);
        assert_eq!(report.initialized, vec!["Hub", "Cam", "Z", "Lamp"]);
        let wheel = model.find_device("Wheel").unwrap();
        assert!(!wheel.initialized);
        assert!(hw.is_loaded("Wheel"));
    }

    #[test]
    fn test_two_call_api_and_busy_flag() {
        let (mut model, mut hw) = setup();
        hw.fail_initialize("Lamp");
        let busy = Arc::new(AtomicBool::new(false));
        let mut orchestrator = Orchestrator::new(Arc::clone(&busy));

        assert!(matches!(
            orchestrator.attempt_initialize(&mut model, &mut hw),
            Err(BringupError::InvalidStage { .. })
        ));

        orchestrator.load(&mut model, &mut hw).unwrap();
        assert_eq!(orchestrator.stage(), Stage::Loaded);
        assert!(busy.load(Ordering::SeqCst));

        let step = orchestrator.attempt_initialize(&mut model, &mut hw).unwrap();
        assert_eq!(
            step,
            InitStep::Failed {
                device: "Lamp".to_string(),
                is_hub: false,
            }
        );
        assert!(!busy.load(Ordering::SeqCst));
        let failure = orchestrator.pending_failure().unwrap();
        assert!(matches!(failure.cause, HardwareError::InitializationFailed { .. }));

        assert!(matches!(
            orchestrator.attempt_initialize(&mut model, &mut hw),
            Err(BringupError::PendingDecision(ref d)) if d == "Lamp"
        ));
        assert!(matches!(
            orchestrator.load(&mut model, &mut hw),
            Err(BringupError::InvalidStage { .. })
        ));

        orchestrator.resolve(&mut model, &mut hw, true).unwrap();
        assert_eq!(
            orchestrator.attempt_initialize(&mut model, &mut hw).unwrap(),
            InitStep::Complete
        );
        assert!(!busy.load(Ordering::SeqCst));
        assert!(model.find_device("Lamp").is_none());
        assert!(matches!(
            orchestrator.resolve(&mut model, &mut hw, false),
            Err(BringupError::NothingToResolve)
        ));
    }

    #[test]
    fn test_port_reconciliation() {
        let (mut model, mut hw) = setup();
        assert!(model.find_device("COM3").is_some());

        Orchestrator::default().run(&mut model, &mut hw, |_| true).unwrap();

        assert!(model.find_device("COM3").is_none());
        let port = model.graph.find_serial_port("COM3").unwrap();
        assert!(port.is_serial_port());
        assert_eq!(port.find_setup_property("BaudRate").unwrap().value, "19200");
        assert_eq!(hw.property("COM3", "BaudRate").unwrap(), "19200");
        assert!(model.graph.is_port_in_use("COM3"));
        assert!(!model.graph.is_port_in_use("COM1"));

        let text = to_config_string(&model);
        assert_eq!(text.matches("Device,COM3,").count(), 1);
        assert!(text.contains("Property,COM3,BaudRate,19200"));
    }

    #[test]
    fn test_configured_focus_direction_wins_over_driver_default() {
        let rig = DEMO_RIG.replace("focus_direction = 1", "focus_direction = -1");
        let mut hw = SimulatedHardware::new(RigDescription::from_toml_str(&rig).unwrap());
        let mut model = MicroscopeModel::with_catalog(scan_catalog(&hw));
        load_str(&mut model, "Device,Z,DemoCamera,DStage\nFocusDirection,Z,1\n").unwrap();

        Orchestrator::default().run(&mut model, &mut hw, |_| true).unwrap();

        assert_eq!(hw.focus_direction("Z").unwrap(), 1);
        assert_eq!(model.find_device("Z").unwrap().focus_direction, 1);
        assert!(to_config_string(&model).contains("FocusDirection,Z,1"));
    }

    #[test]
    fn test_saved_model_after_bringup_reloads() {
        let text = RIG_CFG.replace(
            "Property,Core,Initialize,1\n",
            "Property,Core,Initialize,1\nProperty,COM3,AnswerTimeout,500\n",
        );
        let mut hw = SimulatedHardware::demo().unwrap();
        let mut model = MicroscopeModel::with_catalog(scan_catalog(&hw));
        load_str(&mut model, &text).unwrap();
        Orchestrator::default().run(&mut model, &mut hw, |_| true).unwrap();

        let saved = to_config_string(&model);
        let mut reloaded = MicroscopeModel::with_catalog(scan_catalog(&hw));
        load_str(&mut reloaded, &saved).unwrap();

        assert!(reloaded.graph.is_port_in_use("COM3"));
        let port = reloaded.find_device("COM3").unwrap();
        assert_eq!(port.find_setup_property("BaudRate").unwrap().value, "19200");
        assert!(port.find_setup_property("BaudRate").unwrap().pre_init);
        let timeout = port.find_setup_property("AnswerTimeout").unwrap();
        assert_eq!(timeout.value, "500");
        assert!(!timeout.pre_init);

        for dev in model.devices().iter().filter(|d| !d.is_core()) {
            let other = reloaded.find_device(&dev.name).unwrap();
            assert_eq!(other.parent_hub, dev.parent_hub);
            assert_eq!(other.focus_direction, dev.focus_direction);
            assert_eq!(other.setup_properties.len(), dev.setup_properties.len(), "{}", dev.name);
            for prop in &dev.setup_properties {
                assert_eq!(other.find_setup_property(&prop.name), Some(prop));
            }
        }
        assert_eq!(reloaded.find_device("Z").unwrap().focus_direction, -1);
        assert_eq!(reloaded.config.groups(), model.config.groups());
    }

    #[test]
    fn test_reload_after_bringup_forgets_port_state() {
        let (mut model, mut hw) = setup();
        Orchestrator::default().run(&mut model, &mut hw, |_| true).unwrap();
        assert!(model.graph.find_serial_port("COM3").unwrap().initialized);

        load_str(&mut model, &RIG_CFG.replace("BaudRate,19200", "BaudRate,9600")).unwrap();

        let port = model.graph.find_serial_port("COM3").unwrap();
        assert!(!port.initialized);
        assert!(port.setup_properties.is_empty());
        assert_eq!(model.setup_property("COM3", "BaudRate"), Some("9600"));
        let saved = to_config_string(&model);
        assert!(saved.contains("Property,COM3,BaudRate,9600"));
        assert!(!saved.contains("BaudRate,19200"));
    }

    #[test]
    fn test_repeat_run_is_idempotent() {
        let (mut model, mut hw) = setup();
        let mut orchestrator = Orchestrator::default();
        orchestrator.run(&mut model, &mut hw, |_| true).unwrap();
        hw.clear_journal();

        let report = orchestrator.run(&mut model, &mut hw, |_| true).unwrap();

        assert!(report.initialized.is_empty());
        assert!(report.loaded.is_empty());
        assert!(!hw
            .journal()
            .iter()
            .any(|c| matches!(c, Call::Load(_) | Call::Initialize(_))));
    }

    #[test]
    fn test_load_failure_is_fatal() {
        let (mut model, mut hw) = setup();
        model
            .add_device(Device::new("Ghost", "DemoCamera", "DGhost", ""))
            .unwrap();
        let mut orchestrator = Orchestrator::default();

        let err = orchestrator.load(&mut model, &mut hw).unwrap_err();
        assert!(matches!(
            err,
            BringupError::Hardware(HardwareError::UnknownAdapter { .. })
        ));
        assert_eq!(orchestrator.stage(), Stage::Idle);
        assert!(!orchestrator.busy_flag().load(Ordering::SeqCst));
    }
}
