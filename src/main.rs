use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use log::{error, info, LevelFilter};

use circuit_sim::analyzer::{AnalysisReport, Severity};
use circuit_sim::cli::CliArgs;
use circuit_sim::output::{self, OutputFormat};
use circuit_sim::simulator::{OutputState, SimulationStateDelta};
use circuit_sim::{CircuitDocument, SessionManager};

fn main() {
    let matches = create_cli().get_matches();

    let level = match matches.get_count("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env().filter_level(level).init();

    if let Err(e) = run_application(&matches) {
        error!("{}", format!("Error: {:#}", e).red());
        std::process::exit(1);
    }
}

fn create_cli() -> Command {
    Command::new("circuit-sim")
        .version(circuit_sim::VERSION)
        .about(circuit_sim::DESCRIPTION)
        .arg(
            Arg::new("input")
                .help("Input circuit graph (.json)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output file for the step trace"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .default_value("csv")
                .value_parser(["csv", "json"])
                .help("Output format"),
        )
        .arg(
            Arg::new("steps")
                .short('n')
                .long("steps")
                .value_name("N")
                .help("Number of simulation steps to run (default 10)"),
        )
        .arg(
            Arg::new("dt")
                .long("dt")
                .value_name("TIME")
                .help("Simulated time per step, e.g. 100ms or 1s (default 100ms)"),
        )
        .arg(
            Arg::new("sensor")
                .short('s')
                .long("sensor")
                .value_name("ID=VALUE")
                .action(ArgAction::Append)
                .help("Set a sensor reading before stepping"),
        )
        .arg(
            Arg::new("speed")
                .long("speed")
                .value_name("FACTOR")
                .help("Simulated-time multiplier"),
        )
        .arg(
            Arg::new("budget")
                .long("budget")
                .value_name("MS")
                .help("Wall-clock budget per step in milliseconds"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Simulation config file (.json)"),
        )
        .arg(
            Arg::new("analyze-only")
                .long("analyze-only")
                .action(ArgAction::SetTrue)
                .help("Only run structural analysis"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase verbosity level"),
        )
}

fn run_application(matches: &ArgMatches) -> anyhow::Result<()> {
    let args = CliArgs::from_matches(matches)?;

    info!("{}", "Starting circuit-sim".green().bold());
    info!("Input file: {}", args.input_file.display().to_string().bright_blue());

    let document = CircuitDocument::from_file(&args.input_file)?;
    let circuit = document.to_circuit()?;
    circuit.print_summary();

    if args.analyze_only {
        print_report(&circuit_sim::analyze(&circuit));
        return Ok(());
    }

    let manager = SessionManager::with_config(args.config.clone());
    let started = manager.create_session(circuit)?;
    print_report(&started.initial_analysis);

    let session_id = started.session_id;
    if !args.sensors.is_empty() {
        let stored = manager.update_sensors(&session_id, &args.sensors)?;
        for (id, value) in stored {
            info!("Sensor {} = {}", id, value);
        }
    }

    let mut trace = Vec::with_capacity(args.steps);
    for _ in 0..args.steps {
        trace.push(manager.step(&session_id, args.dt_millis)?);
    }
    manager.stop(&session_id)?;

    if let Some(output_file) = &args.output_file {
        output::export_trace(&trace, output_file, args.output_format)?;
        info!("Results exported to: {}", output_file.display().to_string().bright_green());
    } else if let Some(last) = trace.last() {
        match args.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(last)?),
            OutputFormat::Csv => print_state(last),
        }
    }

    info!("{}", "Simulation completed successfully!".green().bold());
    Ok(())
}

fn print_report(report: &AnalysisReport) {
    println!("\n=== Structural Analysis ===");
    let score = format!("{}/100", report.score);
    let score = if report.has_errors() {
        score.red()
    } else if report.count(Severity::Warning) > 0 {
        score.yellow()
    } else {
        score.green()
    };
    println!("Score: {}", score);

    for issue in &report.issues {
        let tag = match issue.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
            Severity::Recommendation => "hint".cyan(),
        };
        println!("  [{}] {:?}: {}", tag, issue.code, issue.message);
    }
}

fn print_state(delta: &SimulationStateDelta) {
    println!("\n=== Simulation State at t={:.6}s ===", delta.time);

    if !delta.sensor_values.is_empty() {
        println!("Sensors:");
        for (id, reading) in &delta.sensor_values {
            println!("  {}: {} {}", id, reading.value, reading.unit);
        }
    }

    println!("Outputs:");
    for (id, output) in &delta.output_values {
        let line = match output {
            OutputState::Led { brightness, color, .. } => format!("brightness {} ({})", brightness, color),
            OutputState::Buzzer { frequency, .. } => format!("{:.0} Hz", frequency),
            OutputState::Motor { speed, .. } => format!("{:.0} rpm", speed),
            OutputState::Board(board) => format!(
                "{} output pins, memory {}/{} bytes",
                board.output_pin_count(),
                board.memory_used,
                board.memory_capacity
            ),
            OutputState::Resistor { voltage, current, .. } => format!("{:.4}V, {:.6}A", voltage, current),
            OutputState::Capacitor { voltage, .. } => format!("{:.4}V", voltage),
            OutputState::Source { current, power, .. } => format!("{:.6}A, {:.6}W", current, power),
        };
        let line = if output.is_active() { line.green() } else { line.normal() };
        println!("  {}: {}", id, line);
    }

    if let Some(entry) = delta.log_tail.last() {
        println!("Last log entry: {}", entry.message);
    }
}
