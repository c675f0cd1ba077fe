use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::registry::{self, ComponentKind, ComponentSpec, PinRole, PinSpec};

/// Layout position; carried for round-tripping only
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One end of a wire: a named pin on a component
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinRef {
    pub component_id: String,
    pub pin: String,
}

impl PinRef {
    pub fn new(component_id: impl Into<String>, pin: impl Into<String>) -> Self {
        PinRef {
            component_id: component_id.into(),
            pin: pin.into(),
        }
    }
}

impl fmt::Display for PinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component_id, self.pin)
    }
}

/// Circuit component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub kind: ComponentKind,
    pub position: Position,
    /// Registry defaults overlaid with caller-supplied values
    pub properties: BTreeMap<String, f64>,
}

impl Component {
    pub fn spec(&self) -> &'static ComponentSpec {
        registry::spec(self.kind)
    }

    pub fn pin(&self, name: &str) -> Option<&'static PinSpec> {
        self.spec().pin(name)
    }

    pub fn pin_role(&self, name: &str) -> Option<PinRole> {
        self.pin(name).map(|pin| pin.role)
    }

    /// Numeric property, falling back to 0.0 when absent
    pub fn property(&self, key: &str) -> f64 {
        self.properties.get(key).copied().unwrap_or(0.0)
    }
}

/// A wire between two pins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub from: PinRef,
    pub to: PinRef,
}

impl Connection {
    pub fn touches(&self, component_id: &str) -> bool {
        self.from.component_id == component_id || self.to.component_id == component_id
    }

    /// The endpoint opposite the one on `component_id`; `from` is treated as local for self-wires
    pub fn split(&self, component_id: &str) -> Option<(&PinRef, &PinRef)> {
        if self.from.component_id == component_id {
            Some((&self.from, &self.to))
        } else if self.to.component_id == component_id {
            Some((&self.to, &self.from))
        } else {
            None
        }
    }
}

/// Opposite end of a wire, seen from a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor<'a> {
    pub component_id: &'a str,
    pub pin: &'a str,
    pub local_pin: &'a str,
    pub connection_id: &'a str,
}

/// Complete circuit graph
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    components: Vec<Component>,
    component_index: HashMap<String, usize>,
    connections: Vec<Connection>,
    connection_index: HashMap<String, usize>,
    /// component id -> ids of the wires touching it
    adjacency: HashMap<String, Vec<String>>,
    next_wire: u64,
}

impl Circuit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component of `kind`, overlaying `properties` on the registry defaults
    pub fn add_component(
        &mut self,
        kind: ComponentKind,
        id: impl Into<String>,
        properties: BTreeMap<String, f64>,
    ) -> Result<&Component> {
        self.add_component_at(kind, id, properties, Position::default())
    }

    pub fn add_component_at(
        &mut self,
        kind: ComponentKind,
        id: impl Into<String>,
        properties: BTreeMap<String, f64>,
        position: Position,
    ) -> Result<&Component> {
        let id = id.into();
        if self.component_index.contains_key(&id) {
            return Err(SimError::DuplicateId(id));
        }

        let spec = registry::lookup(kind)?;
        let mut merged = spec.defaults.clone();
        merged.extend(properties);

        let index = self.components.len();
        self.component_index.insert(id.clone(), index);
        self.adjacency.insert(id.clone(), Vec::new());
        self.components.push(Component {
            id,
            kind,
            position,
            properties: merged,
        });
        Ok(&self.components[index])
    }

    /// Wire two pins together under a generated id
    pub fn add_connection(&mut self, from: PinRef, to: PinRef) -> Result<&Connection> {
        let id = loop {
            self.next_wire += 1;
            let candidate = format!("w{}", self.next_wire);
            if !self.connection_index.contains_key(&candidate) {
                break candidate;
            }
        };
        self.add_connection_with_id(id, from, to)
    }

    pub fn add_connection_with_id(
        &mut self,
        id: impl Into<String>,
        from: PinRef,
        to: PinRef,
    ) -> Result<&Connection> {
        let id = id.into();
        if self.connection_index.contains_key(&id) {
            return Err(SimError::DuplicateId(id));
        }
        self.resolve(&from)?;
        self.resolve(&to)?;
        if from == to {
            return Err(SimError::SelfConnection {
                component: from.component_id,
                pin: from.pin,
            });
        }

        self.adjacency
            .entry(from.component_id.clone())
            .or_default()
            .push(id.clone());
        if to.component_id != from.component_id {
            self.adjacency
                .entry(to.component_id.clone())
                .or_default()
                .push(id.clone());
        }

        let index = self.connections.len();
        self.connection_index.insert(id.clone(), index);
        self.connections.push(Connection { id, from, to });
        Ok(&self.connections[index])
    }

    /// Remove a component and every wire that references it
    pub fn remove_component(&mut self, id: &str) -> Option<Component> {
        let index = self.component_index.remove(id)?;
        let component = self.components.remove(index);
        self.adjacency.remove(id);

        self.connections.retain(|conn| !conn.touches(id));

        self.reindex();
        Some(component)
    }

    fn reindex(&mut self) {
        self.component_index = self
            .components
            .iter()
            .enumerate()
            .map(|(i, comp)| (comp.id.clone(), i))
            .collect();
        self.connection_index = self
            .connections
            .iter()
            .enumerate()
            .map(|(i, conn)| (conn.id.clone(), i))
            .collect();
        let live = &self.connection_index;
        for wires in self.adjacency.values_mut() {
            wires.retain(|wire| live.contains_key(wire));
        }
    }

    fn resolve(&self, pin_ref: &PinRef) -> Result<&'static PinSpec> {
        self.get_component(&pin_ref.component_id)
            .and_then(|comp| comp.pin(&pin_ref.pin))
            .ok_or_else(|| SimError::UnknownPin {
                component: pin_ref.component_id.clone(),
                pin: pin_ref.pin.clone(),
            })
    }

    /// Wires touching `component_id`, as seen from that component
    pub fn neighbors<'a>(&'a self, component_id: &str) -> impl Iterator<Item = Neighbor<'a>> + 'a {
        let wires = self
            .adjacency
            .get(component_id)
            .map(|wires| wires.as_slice())
            .unwrap_or(&[]);
        let component_id = component_id.to_string();
        wires.iter().filter_map(move |wire| {
            let conn = self.get_connection(wire)?;
            let (local, remote) = conn.split(&component_id)?;
            Some(Neighbor {
                component_id: &remote.component_id,
                pin: &remote.pin,
                local_pin: &local.pin,
                connection_id: &conn.id,
            })
        })
    }

    /// Wires touching `component_id`, in insertion order
    pub fn connections_of<'a>(&'a self, component_id: &str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.adjacency
            .get(component_id)
            .map(|wires| wires.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(move |wire| self.get_connection(wire))
    }

    pub fn degree(&self, component_id: &str) -> usize {
        self.adjacency.get(component_id).map_or(0, Vec::len)
    }

    pub fn get_component(&self, id: &str) -> Option<&Component> {
        self.component_index.get(id).map(|&i| &self.components[i])
    }

    pub fn get_connection(&self, id: &str) -> Option<&Connection> {
        self.connection_index.get(id).map(|&i| &self.connections[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.component_index.contains_key(id)
    }

    /// Components in insertion order
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get components of a specific kind
    pub fn components_of_kind(&self, kind: ComponentKind) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(move |comp| comp.kind == kind)
    }

    pub fn pin_role(&self, pin_ref: &PinRef) -> Option<PinRole> {
        self.get_component(&pin_ref.component_id)?.pin_role(&pin_ref.pin)
    }

    fn drive_rank(&self, pin_ref: &PinRef) -> u8 {
        self.get_component(&pin_ref.component_id)
            .and_then(|comp| comp.pin(&pin_ref.pin))
            .map_or(0, |pin| pin.drive_rank)
    }

    /// The endpoint sourcing a digital level on this wire, if either end can
    pub fn driver<'a>(&self, conn: &'a Connection) -> Option<&'a PinRef> {
        let from_rank = self.drive_rank(&conn.from);
        let to_rank = self.drive_rank(&conn.to);
        if from_rank == 0 && to_rank == 0 {
            None
        } else if to_rank > from_rank {
            Some(&conn.to)
        } else {
            Some(&conn.from)
        }
    }

    /// Ids of every component reachable from `start`, including `start`, in discovery order
    pub fn reachable(&self, start: &str) -> Vec<String> {
        self.reachable_through(start, |_| true)
    }

    /// Like [`Circuit::reachable`], but only enters components accepted by `passable`
    pub fn reachable_through(&self, start: &str, passable: impl Fn(&Component) -> bool) -> Vec<String> {
        let mut seen = vec![false; self.components.len()];
        let mut order = Vec::new();
        let Some(&first) = self.component_index.get(start) else {
            return order;
        };

        // Each component is queued at most once, so loops in the wiring terminate.
        let mut queue = std::collections::VecDeque::from([first]);
        seen[first] = true;
        while let Some(index) = queue.pop_front() {
            let id = &self.components[index].id;
            order.push(id.clone());
            for neighbor in self.neighbors(id) {
                if let Some(&next) = self.component_index.get(neighbor.component_id) {
                    if !seen[next] && passable(&self.components[next]) {
                        seen[next] = true;
                        queue.push_back(next);
                    }
                }
            }
        }
        order
    }

    /// Print circuit summary
    pub fn print_summary(&self) {
        println!("Components: {}", self.components.len());
        println!("Connections: {}", self.connections.len());

        let mut kind_counts: BTreeMap<ComponentKind, usize> = BTreeMap::new();
        for component in &self.components {
            *kind_counts.entry(component.kind).or_insert(0) += 1;
        }
        for (kind, count) in kind_counts {
            println!("  {}: {}", registry::spec(kind).label, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blink_circuit() -> Circuit {
        let mut circuit = Circuit::new();
        circuit
            .add_component(ComponentKind::Microcontroller, "uno", BTreeMap::new())
            .unwrap();
        circuit.add_component(ComponentKind::Led, "led1", BTreeMap::new()).unwrap();
        circuit
            .add_connection(PinRef::new("uno", "D13"), PinRef::new("led1", "anode"))
            .unwrap();
        circuit
            .add_connection(PinRef::new("led1", "cathode"), PinRef::new("uno", "GND"))
            .unwrap();
        circuit
    }

    #[test]
    fn test_component_defaults_are_merged() {
        let mut circuit = Circuit::new();
        let props = BTreeMap::from([("resistance".to_string(), 220.0)]);
        let r = circuit.add_component(ComponentKind::Resistor, "r1", props).unwrap();
        assert_eq!(r.property("resistance"), 220.0);

        let c = circuit.add_component(ComponentKind::Capacitor, "c1", BTreeMap::new()).unwrap();
        assert_eq!(c.property("capacitance"), 1e-6);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut circuit = blink_circuit();
        let err = circuit.add_component(ComponentKind::Led, "led1", BTreeMap::new()).unwrap_err();
        assert_eq!(err, SimError::DuplicateId("led1".to_string()));
    }

    #[test]
    fn test_unknown_pin_rejected() {
        let mut circuit = blink_circuit();
        let err = circuit
            .add_connection(PinRef::new("uno", "D42"), PinRef::new("led1", "anode"))
            .unwrap_err();
        assert!(matches!(err, SimError::UnknownPin { ref pin, .. } if pin == "D42"));

        let err = circuit
            .add_connection(PinRef::new("ghost", "anode"), PinRef::new("led1", "anode"))
            .unwrap_err();
        assert!(matches!(err, SimError::UnknownPin { ref component, .. } if component == "ghost"));
    }

    #[test]
    fn test_self_connection_rejected() {
        let mut circuit = blink_circuit();
        let err = circuit
            .add_connection(PinRef::new("uno", "D2"), PinRef::new("uno", "D2"))
            .unwrap_err();
        assert!(matches!(err, SimError::SelfConnection { .. }));
    }

    #[test]
    fn test_neighbors_are_indexed() {
        let circuit = blink_circuit();
        let neighbors: Vec<_> = circuit.neighbors("led1").collect();
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].component_id, "uno");
        assert_eq!(neighbors[0].pin, "D13");
        assert_eq!(neighbors[0].local_pin, "anode");
        assert_eq!(neighbors[1].pin, "GND");
        assert_eq!(circuit.degree("uno"), 2);
    }

    #[test]
    fn test_remove_component_cascades() {
        let mut circuit = blink_circuit();
        circuit.add_component(ComponentKind::Buzzer, "bz", BTreeMap::new()).unwrap();
        circuit
            .add_connection(PinRef::new("uno", "D8"), PinRef::new("bz", "positive"))
            .unwrap();

        let removed = circuit.remove_component("led1").unwrap();
        assert_eq!(removed.id, "led1");
        assert!(circuit.connections().iter().all(|c| !c.touches("led1")));
        assert_eq!(circuit.connection_count(), 1);
        assert_eq!(circuit.degree("uno"), 1);
        assert_eq!(circuit.neighbors("uno").next().unwrap().component_id, "bz");
        assert!(circuit.get_component("bz").is_some());
        assert!(circuit.remove_component("led1").is_none());
    }

    #[test]
    fn test_driver_inference() {
        let mut circuit = blink_circuit();
        circuit.add_component(ComponentKind::Button, "btn", BTreeMap::new()).unwrap();
        circuit
            .add_connection(PinRef::new("uno", "D2"), PinRef::new("btn", "signal"))
            .unwrap();

        let conns = circuit.connections();
        assert_eq!(circuit.driver(&conns[0]), Some(&PinRef::new("uno", "D13")));
        assert_eq!(circuit.driver(&conns[1]), None);
        assert_eq!(circuit.driver(&conns[2]), Some(&PinRef::new("btn", "signal")));
    }

    #[test]
    fn test_reachable_terminates_on_loops() {
        let mut circuit = Circuit::new();
        for id in ["r1", "r2", "r3"] {
            circuit.add_component(ComponentKind::Resistor, id, BTreeMap::new()).unwrap();
        }
        circuit.add_connection(PinRef::new("r1", "pin2"), PinRef::new("r2", "pin1")).unwrap();
        circuit.add_connection(PinRef::new("r2", "pin2"), PinRef::new("r3", "pin1")).unwrap();
        circuit.add_connection(PinRef::new("r3", "pin2"), PinRef::new("r1", "pin1")).unwrap();

        assert_eq!(circuit.reachable("r1"), vec!["r1", "r2", "r3"]);
        assert!(circuit.reachable("nope").is_empty());
    }

    #[test]
    fn test_reachable_through_stops_at_rejected_components() {
        let mut circuit = Circuit::new();
        circuit.add_component(ComponentKind::Resistor, "r1", BTreeMap::new()).unwrap();
        circuit
            .add_component(ComponentKind::Microcontroller, "uno", BTreeMap::new())
            .unwrap();
        circuit.add_component(ComponentKind::Resistor, "r2", BTreeMap::new()).unwrap();
        circuit.add_connection(PinRef::new("r1", "pin2"), PinRef::new("uno", "GND")).unwrap();
        circuit.add_connection(PinRef::new("uno", "D9"), PinRef::new("r2", "pin1")).unwrap();

        assert_eq!(circuit.reachable("r1"), vec!["r1", "uno", "r2"]);
        assert_eq!(circuit.reachable_through("r1", |comp| comp.kind.is_passive()), vec!["r1"]);
    }
}
