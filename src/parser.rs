//! Boundary form of a circuit graph.
//!
//! External callers hand the engine a JSON document of components and wires.
//! Everything is validated here, so unknown kinds and dangling pin references
//! never reach the analyzer or simulator.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::circuit::{Circuit, PinRef, Position};
use crate::error::{Result, SimError};
use crate::registry::ComponentKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentEntry {
    pub id: String,
    /// Kind name, resolved against the registry when the document is loaded
    pub kind: String,
    #[serde(default)]
    pub properties: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from: PinRef,
    pub to: PinRef,
}

/// Serialized circuit graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitDocument {
    #[serde(default)]
    pub components: Vec<ComponentEntry>,
    #[serde(default)]
    pub connections: Vec<ConnectionEntry>,
}

impl CircuitDocument {
    pub fn from_json(content: &str) -> Result<Self> {
        let document: Option<CircuitDocument> = serde_json::from_str(content)
            .map_err(|e| SimError::InvalidGraph(format!("malformed circuit document: {}", e)))?;
        document.ok_or_else(|| SimError::InvalidGraph("circuit document is null".to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| SimError::InvalidGraph(format!("failed to read '{}': {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> String {
        // Plain strings and f64 maps always serialize.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Validate and build the in-memory graph
    pub fn to_circuit(&self) -> Result<Circuit> {
        let mut circuit = Circuit::new();

        for entry in &self.components {
            let kind: ComponentKind = entry.kind.parse()?;
            circuit.add_component_at(
                kind,
                entry.id.clone(),
                entry.properties.clone(),
                entry.position.unwrap_or_default(),
            )?;
        }

        for entry in &self.connections {
            match &entry.id {
                Some(id) => circuit.add_connection_with_id(id.clone(), entry.from.clone(), entry.to.clone())?,
                None => circuit.add_connection(entry.from.clone(), entry.to.clone())?,
            };
        }

        debug!(
            "Loaded circuit document: {} components, {} connections",
            circuit.component_count(),
            circuit.connection_count()
        );
        Ok(circuit)
    }
}

impl Circuit {
    /// Convert back to the boundary form
    pub fn to_document(&self) -> CircuitDocument {
        CircuitDocument {
            components: self
                .components()
                .iter()
                .map(|comp| ComponentEntry {
                    id: comp.id.clone(),
                    kind: comp.kind.name().to_string(),
                    properties: comp.properties.clone(),
                    position: Some(comp.position),
                })
                .collect(),
            connections: self
                .connections()
                .iter()
                .map(|conn| ConnectionEntry {
                    id: Some(conn.id.clone()),
                    from: conn.from.clone(),
                    to: conn.to.clone(),
                })
                .collect(),
        }
    }
}

/// Parse a JSON document straight into a validated circuit
pub fn parse_circuit(content: &str) -> Result<Circuit> {
    CircuitDocument::from_json(content)?.to_circuit()
}
