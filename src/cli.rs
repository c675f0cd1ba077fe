use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use lazy_static::lazy_static;
use regex::Regex;

use crate::output::OutputFormat;
use crate::simulator::SimulationConfig;

lazy_static! {
    static ref SENSOR_ASSIGNMENT: Regex =
        Regex::new(r"^\s*([A-Za-z0-9_\-]+)\s*=\s*(-?[0-9]+(?:\.[0-9]+)?(?:[eE][-+]?[0-9]+)?)\s*$").unwrap();
}

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub input_file: PathBuf,
    pub output_file: Option<PathBuf>,
    pub output_format: OutputFormat,
    pub analyze_only: bool,
    pub steps: usize,
    pub dt_millis: f64,
    pub sensors: BTreeMap<String, f64>,
    pub config: SimulationConfig,
    pub verbose_level: u8,
}

impl CliArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let input_file = matches
            .get_one::<String>("input")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("Input circuit file is required"))?;

        let output_file = matches.get_one::<String>("output").map(PathBuf::from);

        let verbose_level = matches.get_count("verbose");

        let output_format = match matches.get_one::<String>("format").map(String::as_str) {
            Some("csv") | None => OutputFormat::Csv,
            Some("json") => OutputFormat::Json,
            Some(other) => return Err(anyhow!("Invalid output format '{}'", other)),
        };

        let mut config = match matches.get_one::<String>("config") {
            Some(path) => load_config(path)?,
            None => SimulationConfig::default(),
        };
        if let Some(speed) = matches.get_one::<String>("speed") {
            config.speed = speed.parse::<f64>().with_context(|| format!("Invalid speed '{}'", speed))?;
        }
        if let Some(budget) = matches.get_one::<String>("budget") {
            config.step_budget_ms = Some(budget.parse::<u64>().with_context(|| format!("Invalid step budget '{}'", budget))?);
        }

        let steps = match matches.get_one::<String>("steps") {
            Some(value) => value.parse::<usize>().with_context(|| format!("Invalid step count '{}'", value))?,
            None => 10,
        };

        let dt_millis = match matches.get_one::<String>("dt") {
            Some(value) => parse_time_millis(value)?,
            None => 100.0,
        };
        if dt_millis < 0.0 {
            return Err(anyhow!("Time step must not be negative"));
        }

        let mut sensors = BTreeMap::new();
        if let Some(values) = matches.get_many::<String>("sensor") {
            for value in values {
                let (id, reading) = parse_sensor_assignment(value)?;
                sensors.insert(id, reading);
            }
        }

        Ok(CliArgs {
            input_file,
            output_file,
            output_format,
            analyze_only: matches.get_flag("analyze-only"),
            steps,
            dt_millis,
            sensors,
            config,
            verbose_level,
        })
    }
}

fn load_config(path: &str) -> Result<SimulationConfig> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read config '{}'", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid config '{}'", path))
}

/// Parse a sensor assignment of the form `id=value`, e.g. `temp1=31.5`
fn parse_sensor_assignment(value: &str) -> Result<(String, f64)> {
    let caps = SENSOR_ASSIGNMENT
        .captures(value)
        .ok_or_else(|| anyhow!("Sensor assignment '{}' must look like id=value", value))?;
    Ok((caps[1].to_string(), caps[2].parse::<f64>()?))
}

/// Parse a step length with unit into milliseconds (e.g. "1s", "250ms", "500us")
fn parse_time_millis(value: &str) -> Result<f64> {
    let value = value.trim().to_lowercase();

    if let Some(num_str) = value.strip_suffix("us") {
        Ok(num_str.parse::<f64>()? / 1e3)
    } else if let Some(num_str) = value.strip_suffix("ms") {
        Ok(num_str.parse::<f64>()?)
    } else if let Some(num_str) = value.strip_suffix('s') {
        Ok(num_str.parse::<f64>()? * 1e3)
    } else {
        // Assume milliseconds if no unit specified
        Ok(value.parse::<f64>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_millis() {
        assert_eq!(parse_time_millis("1s").unwrap(), 1000.0);
        assert_eq!(parse_time_millis("250ms").unwrap(), 250.0);
        assert_eq!(parse_time_millis("500us").unwrap(), 0.5);
        assert_eq!(parse_time_millis("20").unwrap(), 20.0);
        assert!(parse_time_millis("fast").is_err());
    }

    #[test]
    fn test_parse_sensor_assignment() {
        assert_eq!(parse_sensor_assignment("temp1=31.5").unwrap(), ("temp1".to_string(), 31.5));
        assert_eq!(parse_sensor_assignment(" ldr = -2e1 ").unwrap(), ("ldr".to_string(), -20.0));
        assert!(parse_sensor_assignment("temp1").is_err());
        assert!(parse_sensor_assignment("=3").is_err());
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.json");
        std::fs::write(&path, r#"{"log_capacity": 5, "speed": 2.0}"#).unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.log_capacity, 5);
        assert_eq!(config.speed, 2.0);
        assert_eq!(config.step_budget_ms, None);
    }
}
