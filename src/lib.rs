pub mod analog;
pub mod analyzer;
pub mod circuit;
pub mod cli;
pub mod digital;
pub mod error;
pub mod output;
pub mod parser;
pub mod registry;
pub mod session;
pub mod simulator;

// Re-export commonly used types
pub use analyzer::{analyze, AnalysisReport, Issue, IssueCode, Priority, Severity};
pub use circuit::{Circuit, Component, Connection, PinRef};
pub use error::{ErrorKind, Result, SimError};
pub use parser::CircuitDocument;
pub use registry::{ComponentKind, PinRole};
pub use session::{SessionManager, SessionSummary, StartResponse};
pub use simulator::{OutputState, SimState, SimulationConfig, SimulationStateDelta, Simulator};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
