use thiserror::Error;

use crate::simulator::SimState;

/// Errors surfaced by the engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("unknown component kind '{0}'")]
    UnknownKind(String),

    #[error("id '{0}' already exists in the circuit")]
    DuplicateId(String),

    #[error("pin '{pin}' does not resolve on component '{component}'")]
    UnknownPin { component: String, pin: String },

    #[error("connection joins pin '{pin}' of '{component}' to itself")]
    SelfConnection { component: String, pin: String },

    #[error("component '{0}' is not a sensor in the bound circuit")]
    UnknownComponent(String),

    #[error("invalid circuit graph: {0}")]
    InvalidGraph(String),

    #[error("simulation is {0}, expected running")]
    NotRunning(SimState),

    #[error("cannot {action} a simulation that is {from}")]
    InvalidTransition { from: SimState, action: &'static str },

    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("step exceeded its wall-clock budget of {budget_ms}ms")]
    StepTimeout { budget_ms: u64 },

    #[error("time step must be finite and non-negative, got {0}")]
    InvalidTimeStep(f64),

    #[error("value for '{component}' must be finite, got {value}")]
    InvalidValue { component: String, value: f64 },
}

/// Broad class of an error, used by callers to decide whether retrying makes sense
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request; retrying the same input fails the same way
    Validation,
    /// Wrong lifecycle state or missing session; may succeed after another call
    State,
}

impl SimError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimError::UnknownKind(_)
            | SimError::DuplicateId(_)
            | SimError::UnknownPin { .. }
            | SimError::SelfConnection { .. }
            | SimError::InvalidGraph(_)
            | SimError::InvalidTimeStep(_)
            | SimError::InvalidValue { .. } => ErrorKind::Validation,
            SimError::UnknownComponent(_)
            | SimError::NotRunning(_)
            | SimError::InvalidTransition { .. }
            | SimError::SessionNotFound(_)
            | SimError::StepTimeout { .. } => ErrorKind::State,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
