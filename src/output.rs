use std::fs::File;
use std::path::Path;

use anyhow::Result;
use csv::Writer;
use log::info;

use crate::simulator::{OutputState, SimulationStateDelta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

/// Export a recorded step trace to file
pub fn export_trace(trace: &[SimulationStateDelta], filename: &Path, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Csv => export_csv(trace, filename),
        OutputFormat::Json => export_json(trace, filename),
    }
}

/// One row per (time, component, quantity)
fn export_csv(trace: &[SimulationStateDelta], filename: &Path) -> Result<()> {
    let file = File::create(filename)?;
    let mut writer = Writer::from_writer(file);
    writer.write_record(["time", "component", "quantity", "value"])?;

    for delta in trace {
        let time = delta.time.to_string();
        for (id, reading) in &delta.sensor_values {
            let value = reading.value.to_string();
            writer.write_record([time.as_str(), id.as_str(), "sensor", value.as_str()])?;
        }
        for (id, output) in &delta.output_values {
            for (quantity, value) in quantities(output) {
                let value = value.to_string();
                writer.write_record([time.as_str(), id.as_str(), quantity, value.as_str()])?;
            }
        }
    }

    writer.flush()?;
    info!("Trace exported to CSV: {}", filename.display());
    Ok(())
}

fn export_json(trace: &[SimulationStateDelta], filename: &Path) -> Result<()> {
    let file = File::create(filename)?;
    serde_json::to_writer_pretty(file, trace)?;

    info!("Trace exported to JSON: {}", filename.display());
    Ok(())
}

/// Flatten an output into named numeric quantities
pub fn quantities(output: &OutputState) -> Vec<(&'static str, f64)> {
    match output {
        OutputState::Led { brightness, .. } => vec![("brightness", f64::from(*brightness))],
        OutputState::Buzzer { frequency, .. } => vec![("frequency", *frequency)],
        OutputState::Motor { speed, .. } => vec![("speed", *speed)],
        OutputState::Board(board) => vec![
            ("output_pins", board.output_pin_count() as f64),
            ("memory_used", f64::from(board.memory_used)),
        ],
        OutputState::Resistor {
            voltage,
            current,
            power,
            temperature,
        } => vec![
            ("voltage", *voltage),
            ("current", *current),
            ("power", *power),
            ("temperature", *temperature),
        ],
        OutputState::Capacitor { voltage, current } => vec![("voltage", *voltage), ("current", *current)],
        OutputState::Source { voltage, current, power } => {
            vec![("voltage", *voltage), ("current", *current), ("power", *power)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Circuit, PinRef};
    use crate::registry::ComponentKind;
    use crate::simulator::Simulator;
    use std::collections::BTreeMap;

    fn trace() -> Vec<SimulationStateDelta> {
        let mut circuit = Circuit::new();
        circuit
            .add_component(ComponentKind::Microcontroller, "uno", BTreeMap::new())
            .unwrap();
        circuit.add_component(ComponentKind::Buzzer, "bz", BTreeMap::new()).unwrap();
        circuit
            .add_connection(PinRef::new("uno", "D8"), PinRef::new("bz", "positive"))
            .unwrap();

        let mut sim = Simulator::new();
        sim.start(circuit).unwrap();
        (0..3).map(|_| sim.step(0.1).unwrap()).collect()
    }

    #[test]
    fn test_export_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        export_trace(&trace(), &path, OutputFormat::Csv).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("time,component,quantity,value"));
        assert!(content.contains("bz,frequency,1000"));
        // 3 steps x (bz frequency + uno output_pins + uno memory_used)
        assert_eq!(content.lines().count(), 1 + 3 * 3);
    }

    #[test]
    fn test_output_pins_exclude_driven_inputs() {
        let mut circuit = Circuit::new();
        circuit
            .add_component(ComponentKind::Microcontroller, "uno", BTreeMap::new())
            .unwrap();
        circuit.add_component(ComponentKind::Button, "btn", BTreeMap::new()).unwrap();
        circuit.add_component(ComponentKind::Led, "led", BTreeMap::new()).unwrap();
        circuit
            .add_connection(PinRef::new("btn", "signal"), PinRef::new("uno", "D2"))
            .unwrap();
        circuit
            .add_connection(PinRef::new("uno", "D13"), PinRef::new("led", "anode"))
            .unwrap();

        let mut sim = Simulator::new();
        sim.start(circuit).unwrap();
        let delta = sim.step(0.1).unwrap();
        let board = quantities(&delta.output_values["uno"]);
        assert_eq!(board[0], ("output_pins", 1.0));
    }

    #[test]
    fn test_export_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        export_trace(&trace(), &path, OutputFormat::Json).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 3);
        assert_eq!(value[2]["logTail"].as_array().unwrap().len(), 3);
    }
}
