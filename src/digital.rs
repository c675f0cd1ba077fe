//! Two-state logic propagation.
//!
//! Levels are not solved from voltages: a peripheral is active exactly when a
//! wire into it originates from a pin that can drive a digital level.

use serde::{Deserialize, Serialize};

use crate::circuit::{Circuit, Component};
use crate::registry::{self, BOARD_DIGITAL_PINS};

pub const FULL_BRIGHTNESS: u8 = 255;
pub const LED_ON_COLOR: &str = "#ff3b30";
pub const LED_OFF_COLOR: &str = "#3a0d0b";

const BASE_MEMORY_BYTES: u32 = 200;
const BYTES_PER_OUTPUT_PIN: u32 = 24;
const BYTES_PER_CONNECTED_PIN: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PinMode {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinState {
    pub pin: usize,
    pub mode: PinMode,
    pub value: u8,
    pub connected: bool,
}

impl PinState {
    fn idle(pin: usize) -> Self {
        PinState {
            pin,
            mode: PinMode::Input,
            value: 0,
            connected: false,
        }
    }
}

/// Simulated pin bank of a microcontroller board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardState {
    pub pins: Vec<PinState>,
    /// Pseudo-metric for display; not a real resource limit
    pub memory_used: u32,
    pub memory_capacity: u32,
}

impl BoardState {
    /// Pins currently in OUTPUT mode; inputs fed high by another driver are not counted
    pub fn output_pin_count(&self) -> usize {
        self.pins.iter().filter(|p| p.mode == PinMode::Output).count()
    }
}

/// True if any wire into `component_id` is driven from its other end
pub fn is_driven(circuit: &Circuit, component_id: &str) -> bool {
    circuit.connections_of(component_id).any(|conn| {
        circuit
            .driver(conn)
            .is_some_and(|driver| driver.component_id != component_id)
    })
}

pub fn led_brightness(active: bool) -> u8 {
    if active {
        FULL_BRIGHTNESS
    } else {
        0
    }
}

pub fn led_color(brightness: u8) -> &'static str {
    if brightness > 0 {
        LED_ON_COLOR
    } else {
        LED_OFF_COLOR
    }
}

/// Pin modes and levels for a board, derived from which end drives each wire
pub fn board_state(circuit: &Circuit, board: &Component) -> BoardState {
    let mut pins: Vec<PinState> = (0..BOARD_DIGITAL_PINS).map(PinState::idle).collect();

    for conn in circuit.connections_of(&board.id) {
        let driver = circuit.driver(conn);
        for end in [&conn.from, &conn.to] {
            if end.component_id != board.id {
                continue;
            }
            let Some(index) = registry::digital_pin_index(&end.pin) else {
                continue;
            };
            let state = &mut pins[index];
            state.connected = true;
            match driver {
                Some(source) if source == end => {
                    state.mode = PinMode::Output;
                    state.value = 1;
                }
                Some(_) => {
                    // Another driver feeds this pin; a pin already sourcing stays an output.
                    if state.mode == PinMode::Input {
                        state.value = 1;
                    }
                }
                None => {}
            }
        }
    }

    let outputs = pins.iter().filter(|p| p.mode == PinMode::Output).count() as u32;
    let connected = pins.iter().filter(|p| p.connected).count() as u32;
    let memory_capacity = board.property("memory_bytes").max(0.0) as u32;
    let memory_used = (BASE_MEMORY_BYTES + BYTES_PER_OUTPUT_PIN * outputs + BYTES_PER_CONNECTED_PIN * connected)
        .min(memory_capacity);

    BoardState {
        pins,
        memory_used,
        memory_capacity,
    }
}
