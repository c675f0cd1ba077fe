//! Arena of running simulations.
//!
//! Each session sits behind its own mutex, so steps and sensor writes on one
//! session are serialized while different sessions proceed independently.
//! The arena map is only locked long enough to find or insert a handle.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use log::info;
use serde::{Deserialize, Serialize};

use crate::analyzer::{self, AnalysisReport};
use crate::circuit::Circuit;
use crate::error::{Result, SimError};
use crate::parser::CircuitDocument;
use crate::simulator::{SimState, SimulationConfig, SimulationStateDelta, Simulator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub session_id: String,
    pub initial_analysis: AnalysisReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub state: SimState,
    pub elapsed: f64,
    pub steps: u64,
    pub log_len: usize,
    pub analysis: AnalysisReport,
}

type SessionHandle = Arc<Mutex<Simulator>>;

pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    next_id: AtomicU64,
    config: SimulationConfig,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_config(SimulationConfig::default())
    }

    /// Sessions created by this manager start from `config` unless given their own
    pub fn with_config(config: SimulationConfig) -> Self {
        SessionManager {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Validate a boundary document and start a session on it
    pub fn start(&self, document: &CircuitDocument) -> Result<StartResponse> {
        self.create_session(document.to_circuit()?)
    }

    pub fn create_session(&self, circuit: Circuit) -> Result<StartResponse> {
        self.create_session_with(circuit, self.config.clone())
    }

    pub fn create_session_with(&self, circuit: Circuit, config: SimulationConfig) -> Result<StartResponse> {
        let mut simulator = Simulator::with_config(config);
        let initial_analysis = simulator.start(circuit)?.clone();

        let session_id = format!("sim-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.clone(), Arc::new(Mutex::new(simulator)));

        info!("Created session {} (score {})", session_id, initial_analysis.score);
        Ok(StartResponse {
            session_id,
            initial_analysis,
        })
    }

    fn handle(&self, session_id: &str) -> Result<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .ok_or_else(|| SimError::SessionNotFound(session_id.to_string()))
    }

    fn lock(handle: &SessionHandle) -> MutexGuard<'_, Simulator> {
        // A panic mid-step leaves no partial state: steps commit only at the end.
        handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session<T>(&self, session_id: &str, f: impl FnOnce(&mut Simulator) -> Result<T>) -> Result<T> {
        let handle = self.handle(session_id)?;
        let mut simulator = Self::lock(&handle);
        f(&mut simulator)
    }

    pub fn get_session(&self, session_id: &str) -> Result<SessionSummary> {
        self.with_session(session_id, |sim| Ok(summarize(session_id, sim)))
    }

    /// Advance a session by `dt_millis` milliseconds of simulated time
    pub fn step(&self, session_id: &str, dt_millis: f64) -> Result<SimulationStateDelta> {
        self.with_session(session_id, |sim| sim.step(dt_millis / 1000.0))
    }

    /// Write sensor values; returns the values actually stored after clamping
    pub fn update_sensors(&self, session_id: &str, updates: &BTreeMap<String, f64>) -> Result<BTreeMap<String, f64>> {
        self.with_session(session_id, |sim| sim.update_sensors(updates))
    }

    pub fn pause(&self, session_id: &str) -> Result<()> {
        self.with_session(session_id, Simulator::pause)
    }

    pub fn resume(&self, session_id: &str) -> Result<()> {
        self.with_session(session_id, Simulator::resume)
    }

    pub fn reanalyze(&self, session_id: &str) -> Result<AnalysisReport> {
        self.with_session(session_id, |sim| sim.reanalyze().cloned())
    }

    /// Stop a session and drop it from the arena
    pub fn stop(&self, session_id: &str) -> Result<SessionSummary> {
        let handle = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .ok_or_else(|| SimError::SessionNotFound(session_id.to_string()))?;

        // Waits for any in-flight step on this session to finish.
        let mut simulator = Self::lock(&handle);
        simulator.stop()?;
        info!("Destroyed session {}", session_id);
        Ok(summarize(session_id, &simulator))
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Stateless analysis of a boundary document
pub fn analyze(document: Option<&CircuitDocument>) -> Result<AnalysisReport> {
    let document = document.ok_or_else(|| SimError::InvalidGraph("no circuit graph supplied".to_string()))?;
    Ok(analyzer::analyze(&document.to_circuit()?))
}

fn summarize(session_id: &str, sim: &Simulator) -> SessionSummary {
    SessionSummary {
        session_id: session_id.to_string(),
        state: sim.state(),
        elapsed: sim.elapsed(),
        steps: sim.step_count(),
        log_len: sim.log().len(),
        analysis: sim.report().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::PinRef;
    use crate::registry::ComponentKind;

    fn blink() -> Circuit {
        let mut circuit = Circuit::new();
        circuit
            .add_component(ComponentKind::Microcontroller, "uno", BTreeMap::new())
            .unwrap();
        circuit.add_component(ComponentKind::Led, "led1", BTreeMap::new()).unwrap();
        circuit
            .add_component(ComponentKind::TemperatureSensor, "temp", BTreeMap::new())
            .unwrap();
        circuit
            .add_connection(PinRef::new("uno", "D13"), PinRef::new("led1", "anode"))
            .unwrap();
        circuit
            .add_connection(PinRef::new("temp", "signal"), PinRef::new("uno", "A0"))
            .unwrap();
        circuit
    }

    #[test]
    fn test_session_ids_are_unique() {
        let manager = SessionManager::new();
        let a = manager.create_session(blink()).unwrap().session_id;
        let b = manager.create_session(blink()).unwrap().session_id;
        assert_ne!(a, b);
        assert_eq!(manager.session_ids(), vec![a, b]);
    }

    #[test]
    fn test_step_converts_milliseconds() {
        let manager = SessionManager::new();
        let id = manager.create_session(blink()).unwrap().session_id;
        let delta = manager.step(&id, 250.0).unwrap();
        assert_eq!(delta.time, 0.25);
        assert_eq!(manager.get_session(&id).unwrap().steps, 1);
    }

    #[test]
    fn test_unknown_session() {
        let manager = SessionManager::new();
        assert_eq!(
            manager.step("sim-404", 10.0).unwrap_err(),
            SimError::SessionNotFound("sim-404".to_string())
        );
        assert!(manager.stop("sim-404").is_err());
    }

    #[test]
    fn test_stop_destroys_session() {
        let manager = SessionManager::new();
        let id = manager.create_session(blink()).unwrap().session_id;
        manager.step(&id, 100.0).unwrap();

        let summary = manager.stop(&id).unwrap();
        assert_eq!(summary.state, SimState::Stopped);
        assert_eq!(summary.steps, 1);
        assert!(manager.is_empty());
        assert!(matches!(manager.get_session(&id), Err(SimError::SessionNotFound(_))));
    }

    #[test]
    fn test_pause_and_sensor_updates() {
        let manager = SessionManager::new();
        let id = manager.create_session(blink()).unwrap().session_id;
        manager.pause(&id).unwrap();
        assert!(matches!(manager.step(&id, 10.0), Err(SimError::NotRunning(SimState::Paused))));

        let stored = manager
            .update_sensors(&id, &BTreeMap::from([("temp".to_string(), 300.0)]))
            .unwrap();
        assert_eq!(stored["temp"], 125.0);

        manager.resume(&id).unwrap();
        let delta = manager.step(&id, 10.0).unwrap();
        assert_eq!(delta.sensor_values["temp"].value, 125.0);
    }

    #[test]
    fn test_stateless_analyze() {
        assert!(matches!(analyze(None), Err(SimError::InvalidGraph(_))));
        let report = analyze(Some(&blink().to_document())).unwrap();
        assert_eq!(report.score, 100);
    }
}
