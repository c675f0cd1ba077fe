//! Structural checks over a circuit graph.
//!
//! Defects are reported as [`Issue`] records rather than errors: a half-built
//! circuit is a normal state in a design tool.

use serde::{Deserialize, Serialize};

use crate::circuit::Circuit;
use crate::error::{Result, SimError};
use crate::registry::{ComponentKind, PinRole};

/// Component count above which a modularization hint is emitted
pub const LARGE_CIRCUIT_THRESHOLD: usize = 20;
pub const ERROR_PENALTY: u32 = 20;
pub const WARNING_PENALTY: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Recommendation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueCode {
    NoPowerSource,
    NoGroundConnection,
    Unconnected,
    LargeCircuit,
    MissingCurrentLimitResistor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl Issue {
    fn new(severity: Severity, code: IssueCode, message: impl Into<String>) -> Self {
        Issue {
            severity,
            code,
            message: message.into(),
            component: None,
            priority: None,
        }
    }

    fn on(mut self, component: &str) -> Self {
        self.component = Some(component.to_string());
        self
    }

    fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Ordered findings plus an advisory quality score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub issues: Vec<Issue>,
    pub score: u32,
}

impl AnalysisReport {
    fn from_issues(mut issues: Vec<Issue>) -> Self {
        // Stable sort keeps component-insertion order within each severity.
        issues.sort_by_key(|issue| issue.severity);
        let score = score(&issues);
        AnalysisReport { issues, score }
    }

    pub fn of_severity(&self, severity: Severity) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |issue| issue.severity == severity)
    }

    pub fn errors(&self) -> Vec<Issue> {
        self.of_severity(Severity::Error).cloned().collect()
    }

    pub fn warnings(&self) -> Vec<Issue> {
        self.of_severity(Severity::Warning).cloned().collect()
    }

    pub fn recommendations(&self) -> Vec<Issue> {
        self.of_severity(Severity::Recommendation).cloned().collect()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.of_severity(severity).count()
    }

    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    pub fn mentions(&self, component_id: &str) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.component.as_deref() == Some(component_id))
    }
}

/// 100 minus fixed penalties for errors and warnings, clamped to [0, 100]
pub fn score(issues: &[Issue]) -> u32 {
    let penalty: u32 = issues
        .iter()
        .map(|issue| match issue.severity {
            Severity::Error => ERROR_PENALTY,
            Severity::Warning => WARNING_PENALTY,
            Severity::Recommendation => 0,
        })
        .sum();
    100u32.saturating_sub(penalty)
}

/// Run every structural check over `circuit`
pub fn analyze(circuit: &Circuit) -> AnalysisReport {
    let mut issues = Vec::new();

    let has_board = circuit
        .components()
        .iter()
        .any(|comp| comp.kind == ComponentKind::Microcontroller);

    if !circuit.components().iter().any(|comp| comp.kind.is_power_source()) {
        issues.push(Issue::new(
            Severity::Error,
            IssueCode::NoPowerSource,
            "Circuit has no power source; add a voltage source or a microcontroller board",
        ));
    }

    if !has_board && !has_connected_ground(circuit) {
        issues.push(Issue::new(
            Severity::Warning,
            IssueCode::NoGroundConnection,
            "No ground pin is wired; connect at least one component to ground",
        ));
    }

    for comp in circuit.components() {
        if circuit.degree(&comp.id) == 0 {
            issues.push(
                Issue::new(
                    Severity::Warning,
                    IssueCode::Unconnected,
                    format!("{} '{}' has no connections", comp.spec().label, comp.id),
                )
                .on(&comp.id),
            );
        }
    }

    for led in circuit.components_of_kind(ComponentKind::Led) {
        if circuit.degree(&led.id) == 0 {
            continue;
        }
        let limited = circuit.neighbors(&led.id).any(|n| {
            circuit
                .get_component(n.component_id)
                .is_some_and(|comp| comp.kind == ComponentKind::Resistor)
        });
        if !limited {
            issues.push(
                Issue::new(
                    Severity::Recommendation,
                    IssueCode::MissingCurrentLimitResistor,
                    format!("LED '{}' has no series resistor; add one to limit its current", led.id),
                )
                .on(&led.id)
                .with_priority(Priority::Medium),
            );
        }
    }

    if circuit.component_count() > LARGE_CIRCUIT_THRESHOLD {
        issues.push(
            Issue::new(
                Severity::Recommendation,
                IssueCode::LargeCircuit,
                format!(
                    "Circuit has {} components; consider splitting it into smaller modules",
                    circuit.component_count()
                ),
            )
            .with_priority(Priority::Low),
        );
    }

    AnalysisReport::from_issues(issues)
}

/// Analyze a graph that may be absent at the call boundary
pub fn analyze_graph(circuit: Option<&Circuit>) -> Result<AnalysisReport> {
    circuit
        .map(analyze)
        .ok_or_else(|| SimError::InvalidGraph("no circuit graph supplied".to_string()))
}

fn has_connected_ground(circuit: &Circuit) -> bool {
    circuit.connections().iter().any(|conn| {
        circuit.pin_role(&conn.from) == Some(PinRole::Ground) || circuit.pin_role(&conn.to) == Some(PinRole::Ground)
    })
}
