//! Continuous RC charging model.
//!
//! For each voltage source the connected subnetwork is searched for resistors
//! and capacitors. Resistors found together are lumped in series and
//! capacitors in parallel; the closed-form step response is then evaluated at
//! the session's cumulative simulated time.

use serde::{Deserialize, Serialize};

use crate::circuit::Circuit;
use crate::registry::ComponentKind;

/// Ambient temperature used as the baseline of the thermal proxy, in °C
pub const BASELINE_TEMPERATURE: f64 = 25.0;
/// Temperature rise per watt dissipated in the resistor, in °C/W
pub const THERMAL_COEFFICIENT: f64 = 10.0;

/// A resistor or capacitor taking part in a network, with its R or C value
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: String,
    pub value: f64,
}

/// A voltage source with the resistors and capacitors wired into it
#[derive(Debug, Clone, PartialEq)]
pub struct RcNetwork {
    pub source_id: String,
    pub voltage: f64,
    pub resistors: Vec<Element>,
    pub capacitors: Vec<Element>,
    pub resistance: f64,
    pub capacitance: f64,
}

/// State of an RC network at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RcSolution {
    pub capacitor_voltage: f64,
    pub resistor_voltage: f64,
    pub current: f64,
    pub power: f64,
    pub temperature: f64,
}

impl RcNetwork {
    pub fn new(source_id: impl Into<String>, voltage: f64, resistors: Vec<Element>, capacitors: Vec<Element>) -> Self {
        let resistance = resistors.iter().map(|e| e.value).sum();
        let capacitance = capacitors.iter().map(|e| e.value).sum();
        RcNetwork {
            source_id: source_id.into(),
            voltage,
            resistors,
            capacitors,
            resistance,
            capacitance,
        }
    }

    /// Time constant, or `None` when R or C is not a positive finite value
    pub fn time_constant(&self) -> Option<f64> {
        let tau = self.resistance * self.capacitance;
        (self.resistance > 0.0 && self.capacitance > 0.0 && tau.is_finite() && tau > 0.0).then_some(tau)
    }

    /// Evaluate the charging transient at simulated time `t` seconds.
    ///
    /// A network without a usable time constant (R <= 0 or C <= 0) is treated
    /// as charging instantly: the capacitor sits at the source voltage and no
    /// current flows. This keeps NaN and infinity out of the reported state.
    pub fn solve(&self, t: f64) -> RcSolution {
        let source = if self.voltage.is_finite() { self.voltage } else { 0.0 };
        let t = t.max(0.0);

        let (capacitor_voltage, current) = match self.time_constant() {
            Some(tau) => {
                let vc = source * (1.0 - (-t / tau).exp());
                let vr = source - vc;
                (vc, vr / self.resistance)
            }
            None => (source, 0.0),
        };
        let resistor_voltage = source - capacitor_voltage;
        let power = source * current;

        RcSolution {
            capacitor_voltage,
            resistor_voltage,
            current,
            power,
            temperature: BASELINE_TEMPERATURE + THERMAL_COEFFICIENT * power,
        }
    }
}

/// Fraction of a lumped quantity carried by each element, proportional to its value.
///
/// Falls back to an even split when the values do not sum to a positive number.
pub fn shares(elements: &[Element]) -> Vec<f64> {
    let total: f64 = elements.iter().map(|e| e.value).sum();
    if total > 0.0 && total.is_finite() {
        elements.iter().map(|e| e.value.max(0.0) / total).collect()
    } else {
        vec![1.0 / elements.len().max(1) as f64; elements.len()]
    }
}

/// Find every source-driven RC subnetwork, in source insertion order
pub fn find_networks(circuit: &Circuit) -> Vec<RcNetwork> {
    let mut networks = Vec::new();

    for source in circuit.components_of_kind(ComponentKind::VoltageSource) {
        let mut resistors = Vec::new();
        let mut capacitors = Vec::new();

        // Only passive parts carry the RC current; boards and peripherals end the search.
        for id in circuit.reachable_through(&source.id, |comp| comp.kind.is_passive()) {
            let Some(comp) = circuit.get_component(&id) else {
                continue;
            };
            match comp.kind {
                ComponentKind::Resistor => resistors.push(Element {
                    value: comp.property("resistance"),
                    id,
                }),
                ComponentKind::Capacitor => capacitors.push(Element {
                    value: comp.property("capacitance"),
                    id,
                }),
                _ => {}
            }
        }

        if resistors.is_empty() || capacitors.is_empty() {
            continue;
        }
        networks.push(RcNetwork::new(
            source.id.clone(),
            source.property("voltage"),
            resistors,
            capacitors,
        ));
    }

    networks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::PinRef;
    use std::collections::BTreeMap;

    fn element(id: &str, value: f64) -> Element {
        Element {
            id: id.to_string(),
            value,
        }
    }

    fn network(voltage: f64, resistance: f64, capacitance: f64) -> RcNetwork {
        RcNetwork::new("v1", voltage, vec![element("r1", resistance)], vec![element("c1", capacitance)])
    }

    #[test]
    fn test_one_time_constant() {
        let solution = network(5.0, 1000.0, 1e-6).solve(0.001);
        let expected = 5.0 * (1.0 - (-1.0f64).exp());
        assert!((solution.capacitor_voltage - expected).abs() < 1e-9);
        assert!((solution.capacitor_voltage - 3.16).abs() < 0.01);
        assert!((solution.resistor_voltage + solution.capacitor_voltage - 5.0).abs() < 1e-12);
        assert!((solution.current - solution.resistor_voltage / 1000.0).abs() < 1e-15);
        assert!((solution.power - 5.0 * solution.current).abs() < 1e-15);
        assert!(solution.temperature > BASELINE_TEMPERATURE);
    }

    #[test]
    fn test_initial_state() {
        let solution = network(5.0, 1000.0, 1e-6).solve(0.0);
        assert_eq!(solution.capacitor_voltage, 0.0);
        assert_eq!(solution.current, 0.005);
    }

    #[test]
    fn test_degenerate_values_are_clamped() {
        for (r, c) in [(0.0, 1e-6), (1000.0, 0.0), (0.0, 0.0), (-5.0, 1e-6)] {
            let solution = network(5.0, r, c).solve(0.0005);
            assert_eq!(solution.capacitor_voltage, 5.0);
            assert_eq!(solution.resistor_voltage, 0.0);
            assert_eq!(solution.current, 0.0);
            assert_eq!(solution.temperature, BASELINE_TEMPERATURE);
        }
    }

    #[test]
    fn test_find_networks() {
        let mut circuit = Circuit::new();
        let none = BTreeMap::new;
        circuit.add_component(ComponentKind::VoltageSource, "v1", none()).unwrap();
        circuit.add_component(ComponentKind::Resistor, "r1", none()).unwrap();
        circuit.add_component(ComponentKind::Resistor, "r2", none()).unwrap();
        circuit.add_component(ComponentKind::Capacitor, "c1", none()).unwrap();
        circuit.add_component(ComponentKind::VoltageSource, "v2", none()).unwrap();
        circuit.add_connection(PinRef::new("v1", "positive"), PinRef::new("r1", "pin1")).unwrap();
        circuit.add_connection(PinRef::new("r1", "pin2"), PinRef::new("r2", "pin1")).unwrap();
        circuit.add_connection(PinRef::new("r2", "pin2"), PinRef::new("c1", "positive")).unwrap();
        circuit.add_connection(PinRef::new("c1", "negative"), PinRef::new("v1", "negative")).unwrap();

        let networks = find_networks(&circuit);
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0].source_id, "v1");
        assert_eq!(networks[0].resistance, 2000.0);
        assert_eq!(networks[0].capacitance, 1e-6);
        let ids: Vec<_> = networks[0].resistors.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
    }

    #[test]
    fn test_find_networks_ignores_resistors_behind_a_board() {
        let mut circuit = Circuit::new();
        let none = BTreeMap::new;
        circuit.add_component(ComponentKind::VoltageSource, "v1", none()).unwrap();
        circuit.add_component(ComponentKind::Resistor, "r1", none()).unwrap();
        circuit.add_component(ComponentKind::Capacitor, "c1", none()).unwrap();
        circuit.add_component(ComponentKind::Microcontroller, "uno", none()).unwrap();
        circuit.add_component(ComponentKind::Resistor, "r_led", none()).unwrap();
        circuit.add_component(ComponentKind::Led, "led", none()).unwrap();
        circuit.add_connection(PinRef::new("v1", "positive"), PinRef::new("r1", "pin1")).unwrap();
        circuit.add_connection(PinRef::new("r1", "pin2"), PinRef::new("c1", "positive")).unwrap();
        circuit.add_connection(PinRef::new("c1", "negative"), PinRef::new("v1", "negative")).unwrap();
        circuit.add_connection(PinRef::new("v1", "negative"), PinRef::new("uno", "GND")).unwrap();
        circuit.add_connection(PinRef::new("uno", "D13"), PinRef::new("r_led", "pin1")).unwrap();
        circuit.add_connection(PinRef::new("r_led", "pin2"), PinRef::new("led", "anode")).unwrap();

        let networks = find_networks(&circuit);
        assert_eq!(networks.len(), 1);
        let ids: Vec<_> = networks[0].resistors.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["r1"]);
        assert_eq!(networks[0].resistance, 1000.0);
        assert!((networks[0].solve(0.001).capacitor_voltage - 3.16).abs() < 0.01);
    }

    #[test]
    fn test_shares() {
        assert_eq!(shares(&[element("a", 1000.0), element("b", 3000.0)]), vec![0.25, 0.75]);
        assert_eq!(shares(&[element("a", 0.0), element("b", 0.0)]), vec![0.5, 0.5]);
        assert!(shares(&[]).is_empty());
    }
}
