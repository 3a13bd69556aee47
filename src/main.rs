//! Signal generator command-line interface
//!
//! Connects to the configured generator, runs the handshake, performs one
//! command and closes the session:
//!
//! ```text
//! rf_siggen info
//! rf_siggen --address 19 get frequency
//! rf_siggen set power -- -10
//! rf_siggen --mock set output on
//! ```
//!
//! Talking to real hardware requires the `instrument_visa` feature.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rf_siggen::adapters::{MockInstrument, ResourceManager, VisaManager};
use rf_siggen::config::{SigGenConfig, DEFAULT_CONFIG_PATH};
use rf_siggen::instrument::{InstrumentAddress, InstrumentSession, SwitchSetting};
use rf_siggen::logging;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "rf_siggen")]
#[command(author, version, about = "Remote control for SCPI signal generators", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Instrument address (IPv4 literal or GPIB primary address); overrides the config file
    #[arg(short, long)]
    address: Option<InstrumentAddress>,

    /// Drive an in-memory simulated generator instead of VISA hardware
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print identity, boards, options and usage counters
    Info,

    /// Read one parameter
    Get {
        /// Parameter to read
        #[arg(value_enum)]
        parameter: Parameter,
    },

    /// Write one parameter and wait for the instrument to confirm it
    Set {
        /// Parameter to write
        #[arg(value_enum)]
        parameter: Parameter,

        /// New value: a number for frequency (Hz), power (dBm) and phase
        /// adjustment (degrees); 0/1/on/off for switches
        value: String,
    },

    /// Set the current output phase as the zero reference
    ZeroPhase,
}

#[derive(Clone, Copy, ValueEnum)]
enum Parameter {
    Frequency,
    Power,
    Output,
    Modulation,
    PhaseContinuous,
    PhaseAdjustment,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        SigGenConfig::load_from(&cli.config)
            .with_context(|| format!("Failed to load {}", cli.config.display()))?
    } else {
        let address = cli
            .address
            .clone()
            .with_context(|| {
                format!(
                    "No configuration at {} and no --address given",
                    cli.config.display()
                )
            })?;
        SigGenConfig::for_address(address)
    };
    if let Some(address) = cli.address.clone() {
        config.instrument.address = address;
    }
    config.validate()?;

    let sink = logging::session_sink(
        &config.instrument.name,
        &config.application.log_level,
        config.application.log_dir.as_deref(),
    )
    .context("Failed to set up logging")?;
    // Events from main share the session's destinations.
    let _guard = tracing::dispatcher::set_default(&sink.dispatch);
    if let Some(file) = &sink.file {
        info!(file = %file.display(), "Logging to file");
    }

    if cli.mock {
        info!("Using simulated signal generator");
        run(&MockInstrument::new(), &config, sink.dispatch, &cli.command)
    } else {
        run(&VisaManager::new(), &config, sink.dispatch, &cli.command)
    }
}

fn run<R: ResourceManager>(
    manager: &R,
    config: &SigGenConfig,
    dispatch: tracing::Dispatch,
    command: &Commands,
) -> Result<()> {
    let mut session = InstrumentSession::connect(
        manager,
        config.instrument.address.clone(),
        config.instrument.session_options(Some(dispatch)),
    )
    .context("Failed to open instrument session")?;

    execute(&mut session, command)?;

    session.close().context("Failed to close instrument session")?;
    Ok(())
}

fn execute<T: rf_siggen::adapters::Transport>(
    session: &mut InstrumentSession<T>,
    command: &Commands,
) -> Result<()> {
    match command {
        Commands::Info => {
            println!("{}", session.details());
            for board in session.boards() {
                println!(
                    "Board {}: part {}, serial {}, version {}, status {}",
                    board.name,
                    board.part_number,
                    board.serial_number,
                    board.version_number,
                    board.status
                );
            }
            for option in session.options() {
                println!(
                    "Option {}: revision {}, DSP {}",
                    option.name, option.revision, option.dsp_version
                );
            }
            if let Some(counters) = session.diagnostics() {
                println!("Firmware date: {}", counters.firmware_date);
                println!("Power-on hours: {}", counters.power_on_hours);
                println!("Power-on cycles: {}", counters.power_on_cycles);
                if let Some(switches) = &counters.attenuator_switches {
                    println!("Attenuator switches: {switches}");
                }
            }
        }
        Commands::Get { parameter } => match parameter {
            Parameter::Frequency => println!("{}", session.frequency()?),
            Parameter::Power => println!("{}", session.power()?),
            Parameter::Output => println!("{}", session.output_enabled()?),
            Parameter::Modulation => println!("{}", session.modulation_enabled()?),
            Parameter::PhaseContinuous => println!("{}", session.phase_continuous()?),
            Parameter::PhaseAdjustment => println!("{}", session.phase_adjustment()?),
        },
        Commands::Set { parameter, value } => {
            match parameter {
                Parameter::Frequency => session.set_frequency(parse_number(value)?)?,
                Parameter::Power => session.set_power(parse_number(value)?)?,
                Parameter::PhaseAdjustment => session.set_phase_adjustment(parse_number(value)?)?,
                Parameter::Output => session.set_output(SwitchSetting::from(value.as_str()))?,
                Parameter::Modulation => {
                    session.set_modulation(SwitchSetting::from(value.as_str()))?
                }
                Parameter::PhaseContinuous => {
                    session.set_phase_continuous(SwitchSetting::from(value.as_str()))?
                }
            }
            println!("OK");
        }
        Commands::ZeroPhase => {
            session.zero_phase_reference()?;
            println!("OK");
        }
    }
    Ok(())
}

fn parse_number(value: &str) -> Result<f64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("'{value}' is not a number"))
}
