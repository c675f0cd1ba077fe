use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Number of addressable digital pins on a microcontroller board (D0..D13)
pub const BOARD_DIGITAL_PINS: usize = 14;
/// Number of analog input pins on a microcontroller board (A0..A5)
pub const BOARD_ANALOG_PINS: usize = 6;
/// Digital pins that support PWM output
pub const BOARD_PWM_PINS: [usize; 6] = [3, 5, 6, 9, 10, 11];

lazy_static! {
    static ref REGISTRY: HashMap<ComponentKind, ComponentSpec> = ComponentKind::ALL
        .iter()
        .map(|&kind| (kind, ComponentSpec::build(kind)))
        .collect();

    static ref DIGITAL_PIN_PATTERN: Regex = Regex::new(r"^D(\d{1,2})$").unwrap();
}

/// Closed set of component kinds the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Microcontroller,
    Led,
    Buzzer,
    Motor,
    Button,
    TemperatureSensor,
    Photoresistor,
    Potentiometer,
    Resistor,
    Capacitor,
    VoltageSource,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 11] = [
        ComponentKind::Microcontroller,
        ComponentKind::Led,
        ComponentKind::Buzzer,
        ComponentKind::Motor,
        ComponentKind::Button,
        ComponentKind::TemperatureSensor,
        ComponentKind::Photoresistor,
        ComponentKind::Potentiometer,
        ComponentKind::Resistor,
        ComponentKind::Capacitor,
        ComponentKind::VoltageSource,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ComponentKind::Microcontroller => "microcontroller",
            ComponentKind::Led => "led",
            ComponentKind::Buzzer => "buzzer",
            ComponentKind::Motor => "motor",
            ComponentKind::Button => "button",
            ComponentKind::TemperatureSensor => "temperature_sensor",
            ComponentKind::Photoresistor => "photoresistor",
            ComponentKind::Potentiometer => "potentiometer",
            ComponentKind::Resistor => "resistor",
            ComponentKind::Capacitor => "capacitor",
            ComponentKind::VoltageSource => "voltage_source",
        }
    }

    /// Returns true if this kind can power a circuit on its own
    pub fn is_power_source(&self) -> bool {
        matches!(self, ComponentKind::VoltageSource | ComponentKind::Microcontroller)
    }

    /// Returns true for sensor-like inputs that carry a bounded reading
    pub fn is_sensor(&self) -> bool {
        matches!(
            self,
            ComponentKind::TemperatureSensor | ComponentKind::Photoresistor | ComponentKind::Potentiometer
        )
    }

    /// Returns true for components whose state is driven by digital propagation
    pub fn is_output(&self) -> bool {
        matches!(self, ComponentKind::Led | ComponentKind::Buzzer | ComponentKind::Motor)
    }

    /// Elements of the continuous RC model
    pub fn is_passive(&self) -> bool {
        matches!(
            self,
            ComponentKind::Resistor | ComponentKind::Capacitor | ComponentKind::VoltageSource
        )
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ComponentKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        ComponentKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| SimError::UnknownKind(s.to_string()))
    }
}

/// Electrical function of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinRole {
    Power,
    Ground,
    Digital,
    Analog,
    Pwm,
    Signal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PinSpec {
    pub name: String,
    pub role: PinRole,
    /// Priority when inferring the driving end of a wire; 0 means the pin never drives
    pub drive_rank: u8,
}

impl PinSpec {
    fn new(name: impl Into<String>, role: PinRole) -> Self {
        PinSpec {
            name: name.into(),
            role,
            drive_rank: 0,
        }
    }

    fn driving(mut self, rank: u8) -> Self {
        self.drive_rank = rank;
        self
    }

    pub fn is_driver(&self) -> bool {
        self.drive_rank > 0
    }
}

/// Bounds and default for a sensor reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSpec {
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub unit: &'static str,
}

impl SensorSpec {
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Static description of a component kind
#[derive(Debug, Clone, Serialize)]
pub struct ComponentSpec {
    pub kind: ComponentKind,
    pub label: &'static str,
    pub pins: Vec<PinSpec>,
    pub defaults: BTreeMap<String, f64>,
    pub sensor: Option<SensorSpec>,
}

impl ComponentSpec {
    fn build(kind: ComponentKind) -> Self {
        use PinRole::*;

        let (label, pins, defaults, sensor): (_, Vec<PinSpec>, Vec<(&str, f64)>, _) = match kind {
            ComponentKind::Microcontroller => {
                let mut pins: Vec<PinSpec> = (0..BOARD_DIGITAL_PINS)
                    .map(|n| {
                        let role = if BOARD_PWM_PINS.contains(&n) { Pwm } else { Digital };
                        PinSpec::new(format!("D{}", n), role).driving(1)
                    })
                    .collect();
                pins.extend((0..BOARD_ANALOG_PINS).map(|n| PinSpec::new(format!("A{}", n), Analog)));
                pins.push(PinSpec::new("5V", Power));
                pins.push(PinSpec::new("3V3", Power));
                pins.push(PinSpec::new("VIN", Power));
                pins.push(PinSpec::new("GND", Ground));
                ("Microcontroller board", pins, vec![("memory_bytes", 2048.0)], None)
            }
            ComponentKind::Led => (
                "LED",
                vec![PinSpec::new("anode", Signal), PinSpec::new("cathode", Ground)],
                vec![("forward_voltage", 2.0)],
                None,
            ),
            ComponentKind::Buzzer => (
                "Buzzer",
                vec![PinSpec::new("positive", Signal), PinSpec::new("negative", Ground)],
                vec![("frequency", 1000.0)],
                None,
            ),
            ComponentKind::Motor => (
                "DC motor",
                vec![PinSpec::new("positive", Signal), PinSpec::new("negative", Ground)],
                vec![("rpm", 3000.0)],
                None,
            ),
            ComponentKind::Button => (
                "Push button",
                vec![
                    PinSpec::new("signal", Digital).driving(2),
                    PinSpec::new("vcc", Power),
                    PinSpec::new("gnd", Ground),
                ],
                vec![],
                None,
            ),
            ComponentKind::TemperatureSensor => (
                "Temperature sensor",
                sensor_pins("signal"),
                vec![],
                Some(SensorSpec { min: -40.0, max: 125.0, default: 25.0, unit: "°C" }),
            ),
            ComponentKind::Photoresistor => (
                "Photoresistor",
                sensor_pins("signal"),
                vec![],
                Some(SensorSpec { min: 0.0, max: 1000.0, default: 500.0, unit: "lux" }),
            ),
            ComponentKind::Potentiometer => (
                "Potentiometer",
                sensor_pins("wiper"),
                vec![("resistance", 10_000.0)],
                Some(SensorSpec { min: 0.0, max: 1023.0, default: 512.0, unit: "raw" }),
            ),
            ComponentKind::Resistor => (
                "Resistor",
                vec![PinSpec::new("pin1", Signal), PinSpec::new("pin2", Signal)],
                vec![("resistance", 1000.0)],
                None,
            ),
            ComponentKind::Capacitor => (
                "Capacitor",
                vec![PinSpec::new("positive", Signal), PinSpec::new("negative", Ground)],
                vec![("capacitance", 1e-6)],
                None,
            ),
            ComponentKind::VoltageSource => (
                "Voltage source",
                vec![PinSpec::new("positive", Power), PinSpec::new("negative", Ground)],
                vec![("voltage", 5.0)],
                None,
            ),
        };

        ComponentSpec {
            kind,
            label,
            pins,
            defaults: defaults.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            sensor,
        }
    }

    pub fn pin(&self, name: &str) -> Option<&PinSpec> {
        self.pins.iter().find(|pin| pin.name == name)
    }

    pub fn has_pin(&self, name: &str) -> bool {
        self.pin(name).is_some()
    }
}

fn sensor_pins(output: &str) -> Vec<PinSpec> {
    vec![
        PinSpec::new("vcc", PinRole::Power),
        PinSpec::new(output, PinRole::Analog),
        PinSpec::new("gnd", PinRole::Ground),
    ]
}

/// Look up the static spec for a kind
pub fn lookup(kind: ComponentKind) -> Result<&'static ComponentSpec> {
    REGISTRY
        .get(&kind)
        .ok_or_else(|| SimError::UnknownKind(kind.name().to_string()))
}

/// Infallible variant of [`lookup`]; every `ComponentKind` is registered
pub fn spec(kind: ComponentKind) -> &'static ComponentSpec {
    &REGISTRY[&kind]
}

/// Look up a kind by its external name, e.g. `"voltage_source"`
pub fn lookup_name(name: &str) -> Result<&'static ComponentSpec> {
    lookup(name.parse()?)
}

/// Index of a board digital pin name, e.g. `"D13"` -> 13
pub fn digital_pin_index(name: &str) -> Option<usize> {
    DIGITAL_PIN_PATTERN
        .captures(name)
        .and_then(|caps| caps[1].parse::<usize>().ok())
        .filter(|&n| n < BOARD_DIGITAL_PINS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_is_registered() {
        for kind in ComponentKind::ALL {
            let spec = lookup(kind).unwrap();
            assert_eq!(spec.kind, kind);
            assert!(!spec.pins.is_empty());
        }
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(lookup_name("voltage_source").unwrap().kind, ComponentKind::VoltageSource);
        assert_eq!(lookup_name("Temperature-Sensor").unwrap().kind, ComponentKind::TemperatureSensor);
        assert_eq!(
            lookup_name("flux_capacitor").unwrap_err(),
            SimError::UnknownKind("flux_capacitor".to_string())
        );
    }

    #[test]
    fn test_board_pins() {
        let board = lookup(ComponentKind::Microcontroller).unwrap();
        assert_eq!(board.pin("D13").unwrap().role, PinRole::Digital);
        assert_eq!(board.pin("D9").unwrap().role, PinRole::Pwm);
        assert!(board.pin("D9").unwrap().is_driver());
        assert!(!board.pin("A0").unwrap().is_driver());
        assert!(board.has_pin("GND"));
        assert!(!board.has_pin("D14"));
    }

    #[test]
    fn test_sensor_defaults() {
        let temp = lookup(ComponentKind::TemperatureSensor).unwrap();
        let sensor = temp.sensor.as_ref().unwrap();
        assert_eq!(sensor.default, 25.0);
        assert_eq!(sensor.clamp(500.0), 125.0);
        assert!(lookup(ComponentKind::Led).unwrap().sensor.is_none());
    }

    #[test]
    fn test_digital_pin_index() {
        assert_eq!(digital_pin_index("D0"), Some(0));
        assert_eq!(digital_pin_index("D13"), Some(13));
        assert_eq!(digital_pin_index("D14"), None);
        assert_eq!(digital_pin_index("A3"), None);
    }

    #[test]
    fn test_kind_classification() {
        assert!(ComponentKind::Microcontroller.is_power_source());
        assert!(!ComponentKind::Resistor.is_power_source());
        assert!(ComponentKind::Photoresistor.is_sensor());
        assert!(ComponentKind::Motor.is_output());
        assert!(ComponentKind::Capacitor.is_passive());
        assert!(!ComponentKind::Microcontroller.is_passive());
    }
}
