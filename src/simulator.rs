use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::analog::{self, RcNetwork, RcSolution};
use crate::analyzer::{self, AnalysisReport, Issue};
use crate::circuit::{Circuit, Component};
use crate::digital::{self, BoardState};
use crate::error::{Result, SimError};
use crate::registry::ComponentKind;

/// Lifecycle of one simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for SimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimState::Idle => "idle",
            SimState::Running => "running",
            SimState::Paused => "paused",
            SimState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of step entries kept in the event ring
    pub log_capacity: usize,
    /// Simulated seconds advanced per requested second
    pub speed: f64,
    /// Wall-clock budget for a single step
    pub step_budget_ms: Option<u64>,
    /// Initial sensor readings, clamped into each sensor's bounds
    pub sensor_overrides: BTreeMap<String, f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            log_capacity: 50,
            speed: 1.0,
            step_budget_ms: None,
            sensor_overrides: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub unit: String,
}

/// Per-component output computed by a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputState {
    Led { active: bool, brightness: u8, color: String },
    Buzzer { active: bool, frequency: f64 },
    Motor { active: bool, speed: f64 },
    Board(BoardState),
    Resistor { voltage: f64, current: f64, power: f64, temperature: f64 },
    Capacitor { voltage: f64, current: f64 },
    Source { voltage: f64, current: f64, power: f64 },
}

impl OutputState {
    pub fn is_active(&self) -> bool {
        match self {
            OutputState::Led { active, .. }
            | OutputState::Buzzer { active, .. }
            | OutputState::Motor { active, .. } => *active,
            OutputState::Board(_)
            | OutputState::Resistor { .. }
            | OutputState::Capacitor { .. }
            | OutputState::Source { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub step: u64,
    pub time: f64,
    pub message: String,
}

/// Fixed-capacity ring of recent log entries; the oldest entry is evicted first
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        EventLog {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Result of one step; holds no references into the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStateDelta {
    pub time: f64,
    pub sensor_values: BTreeMap<String, SensorReading>,
    pub output_values: BTreeMap<String, OutputState>,
    pub warnings: Vec<Issue>,
    pub errors: Vec<Issue>,
    pub recommendations: Vec<Issue>,
    pub log_tail: Vec<LogEntry>,
}

/// Simulation engine bound to one circuit snapshot
#[derive(Debug, Clone)]
pub struct Simulator {
    state: SimState,
    config: SimulationConfig,
    circuit: Option<Circuit>,
    networks: Vec<RcNetwork>,
    sensors: BTreeMap<String, SensorReading>,
    elapsed: f64,
    steps: u64,
    log: EventLog,
    report: AnalysisReport,
}

impl Simulator {
    /// Create a new simulator with default configuration
    pub fn new() -> Self {
        Self::with_config(SimulationConfig::default())
    }

    /// Create a new simulator with custom configuration
    pub fn with_config(config: SimulationConfig) -> Self {
        let log = EventLog::new(config.log_capacity);
        Simulator {
            state: SimState::Idle,
            config,
            circuit: None,
            networks: Vec::new(),
            sensors: BTreeMap::new(),
            elapsed: 0.0,
            steps: 0,
            log,
            report: AnalysisReport::default(),
        }
    }

    /// Bind a circuit snapshot and begin running
    pub fn start(&mut self, circuit: Circuit) -> Result<&AnalysisReport> {
        if self.state != SimState::Idle {
            return Err(SimError::InvalidTransition {
                from: self.state,
                action: "start",
            });
        }
        if !self.config.speed.is_finite() || self.config.speed < 0.0 {
            return Err(SimError::InvalidTimeStep(self.config.speed));
        }

        let mut sensors = BTreeMap::new();
        for comp in circuit.components() {
            if let Some(spec) = comp.spec().sensor.as_ref() {
                // Per-component "min"/"max"/"value" properties narrow the registry defaults.
                let min = comp.properties.get("min").copied().unwrap_or(spec.min);
                let max = comp.properties.get("max").copied().unwrap_or(spec.max).max(min);
                let value = comp.properties.get("value").copied().unwrap_or(spec.default);
                sensors.insert(
                    comp.id.clone(),
                    SensorReading {
                        value: if value.is_finite() { value.clamp(min, max) } else { min },
                        min,
                        max,
                        unit: spec.unit.to_string(),
                    },
                );
            }
        }
        for (id, &value) in &self.config.sensor_overrides {
            let reading = sensors
                .get_mut(id)
                .ok_or_else(|| SimError::UnknownComponent(id.clone()))?;
            reading.value = clamp_reading(id, reading, value)?;
        }

        self.report = analyzer::analyze(&circuit);
        self.networks = analog::find_networks(&circuit);
        self.sensors = sensors;
        self.circuit = Some(circuit);
        self.state = SimState::Running;

        info!(
            "Simulation started: {} sensors, {} RC networks, score {}",
            self.sensors.len(),
            self.networks.len(),
            self.report.score
        );
        Ok(&self.report)
    }

    /// Advance simulated time by `dt` seconds and recompute every output
    pub fn step(&mut self, dt: f64) -> Result<SimulationStateDelta> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(SimError::InvalidTimeStep(dt));
        }
        if self.state != SimState::Running {
            return Err(SimError::NotRunning(self.state));
        }
        let circuit = self.circuit.as_ref().ok_or(SimError::NotRunning(self.state))?;

        let started = Instant::now();
        let deadline = self
            .config
            .step_budget_ms
            .map(|ms| (ms, started + Duration::from_millis(ms)));
        let check_budget = || match deadline {
            Some((budget_ms, at)) if Instant::now() >= at => Err(SimError::StepTimeout { budget_ms }),
            _ => Ok(()),
        };

        let time = self.elapsed + dt * self.config.speed;

        let mut analog_outputs: HashMap<&str, OutputState> = HashMap::new();
        for network in &self.networks {
            check_budget()?;
            let solution = network.solve(time);
            for (id, output) in analog_outputs_for(network, &solution) {
                analog_outputs.entry(id).or_insert(output);
            }
        }

        let mut outputs = BTreeMap::new();
        for comp in circuit.components() {
            check_budget()?;
            let output = match comp.kind {
                ComponentKind::Led | ComponentKind::Buzzer | ComponentKind::Motor => {
                    Some(peripheral_output(comp, digital::is_driven(circuit, &comp.id)))
                }
                ComponentKind::Microcontroller => Some(OutputState::Board(digital::board_state(circuit, comp))),
                ComponentKind::Resistor | ComponentKind::Capacitor | ComponentKind::VoltageSource => {
                    analog_outputs.remove(comp.id.as_str())
                }
                ComponentKind::Button
                | ComponentKind::TemperatureSensor
                | ComponentKind::Photoresistor
                | ComponentKind::Potentiometer => None,
            };
            if let Some(output) = output {
                outputs.insert(comp.id.clone(), output);
            }
        }

        // Nothing is committed until the whole pass has finished inside its budget.
        let active = outputs.values().filter(|o| o.is_active()).count();
        self.elapsed = time;
        self.steps += 1;
        self.log.push(LogEntry {
            step: self.steps,
            time,
            message: format!("step {}: t={:.6}s, {} active outputs", self.steps, time, active),
        });
        debug!(
            "Step {} finished in {:?}: t={:.6}s",
            self.steps,
            started.elapsed(),
            time
        );

        Ok(SimulationStateDelta {
            time,
            sensor_values: self.sensors.clone(),
            output_values: outputs,
            warnings: self.report.warnings(),
            errors: self.report.errors(),
            recommendations: self.report.recommendations(),
            log_tail: self.log.to_vec(),
        })
    }

    pub fn pause(&mut self) -> Result<()> {
        self.transition(SimState::Running, SimState::Paused, "pause")
    }

    pub fn resume(&mut self) -> Result<()> {
        self.transition(SimState::Paused, SimState::Running, "resume")
    }

    /// Stop for good and release the circuit snapshot
    pub fn stop(&mut self) -> Result<()> {
        if self.state == SimState::Stopped {
            return Err(SimError::InvalidTransition {
                from: self.state,
                action: "stop",
            });
        }
        self.state = SimState::Stopped;
        self.circuit = None;
        self.networks.clear();
        info!("Simulation stopped after {} steps at t={:.6}s", self.steps, self.elapsed);
        Ok(())
    }

    fn transition(&mut self, from: SimState, to: SimState, action: &'static str) -> Result<()> {
        if self.state != from {
            return Err(SimError::InvalidTransition {
                from: self.state,
                action,
            });
        }
        self.state = to;
        debug!("Simulation {} at t={:.6}s", to, self.elapsed);
        Ok(())
    }

    /// Set one sensor reading, clamped into its bounds; returns the stored value
    pub fn update_sensor(&mut self, component_id: &str, value: f64) -> Result<f64> {
        self.require_bound()?;
        let reading = self
            .sensors
            .get_mut(component_id)
            .ok_or_else(|| SimError::UnknownComponent(component_id.to_string()))?;
        let stored = clamp_reading(component_id, reading, value)?;
        reading.value = stored;
        debug!("Sensor {} set to {}", component_id, stored);
        Ok(stored)
    }

    /// Apply a batch of sensor writes; nothing is applied if any entry is rejected
    pub fn update_sensors(&mut self, updates: &BTreeMap<String, f64>) -> Result<BTreeMap<String, f64>> {
        self.require_bound()?;
        let mut staged = BTreeMap::new();
        for (id, &value) in updates {
            let reading = self
                .sensors
                .get(id)
                .ok_or_else(|| SimError::UnknownComponent(id.clone()))?;
            staged.insert(id.clone(), clamp_reading(id, reading, value)?);
        }
        for (id, &value) in &staged {
            if let Some(reading) = self.sensors.get_mut(id) {
                reading.value = value;
            }
        }
        Ok(staged)
    }

    fn require_bound(&self) -> Result<()> {
        match self.state {
            SimState::Running | SimState::Paused => Ok(()),
            SimState::Idle | SimState::Stopped => Err(SimError::NotRunning(self.state)),
        }
    }

    /// Re-run structural analysis on the bound snapshot
    pub fn reanalyze(&mut self) -> Result<&AnalysisReport> {
        let circuit = self.circuit.as_ref().ok_or(SimError::NotRunning(self.state))?;
        self.report = analyzer::analyze(circuit);
        Ok(&self.report)
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Cumulative simulated time in seconds
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn step_count(&self) -> u64 {
        self.steps
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn report(&self) -> &AnalysisReport {
        &self.report
    }

    pub fn circuit(&self) -> Option<&Circuit> {
        self.circuit.as_ref()
    }

    pub fn sensor(&self, component_id: &str) -> Option<&SensorReading> {
        self.sensors.get(component_id)
    }

    pub fn networks(&self) -> &[RcNetwork] {
        &self.networks
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_reading(component_id: &str, reading: &SensorReading, value: f64) -> Result<f64> {
    if !value.is_finite() {
        return Err(SimError::InvalidValue {
            component: component_id.to_string(),
            value,
        });
    }
    let clamped = value.clamp(reading.min, reading.max);
    if clamped != value {
        warn!(
            "Sensor {} value {} outside [{}, {}], clamped to {}",
            component_id, value, reading.min, reading.max, clamped
        );
    }
    Ok(clamped)
}

fn peripheral_output(comp: &Component, active: bool) -> OutputState {
    match comp.kind {
        ComponentKind::Buzzer => OutputState::Buzzer {
            active,
            frequency: if active { comp.property("frequency") } else { 0.0 },
        },
        ComponentKind::Motor => OutputState::Motor {
            active,
            speed: if active { comp.property("rpm") } else { 0.0 },
        },
        _ => {
            let brightness = digital::led_brightness(active);
            OutputState::Led {
                active,
                brightness,
                color: digital::led_color(brightness).to_string(),
            }
        }
    }
}

fn analog_outputs_for<'a>(network: &'a RcNetwork, solution: &RcSolution) -> Vec<(&'a str, OutputState)> {
    let mut outputs = vec![(
        network.source_id.as_str(),
        OutputState::Source {
            voltage: solution.capacitor_voltage + solution.resistor_voltage,
            current: solution.current,
            power: solution.power,
        },
    )];

    // Series resistors share the current and split the drop by resistance.
    // Each reports its own dissipation; temperature is the network's thermal proxy.
    for (resistor, share) in network.resistors.iter().zip(analog::shares(&network.resistors)) {
        let voltage = solution.resistor_voltage * share;
        let power = voltage * solution.current;
        outputs.push((
            resistor.id.as_str(),
            OutputState::Resistor {
                voltage,
                current: solution.current,
                power,
                temperature: solution.temperature,
            },
        ));
    }
    // Parallel capacitors share the voltage and split the current by capacitance.
    for (capacitor, share) in network.capacitors.iter().zip(analog::shares(&network.capacitors)) {
        outputs.push((
            capacitor.id.as_str(),
            OutputState::Capacitor {
                voltage: solution.capacitor_voltage,
                current: solution.current * share,
            },
        ));
    }
    outputs
}
