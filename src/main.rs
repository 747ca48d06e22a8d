//! CLI entry point for daq-param
//!
//! Talks to one instrument through a session opened from configuration and
//! command-line overrides.
//!
//! # Usage
//!
//! Identify an instrument on a LAN socket:
//! ```bash
//! daq-param --resource TCPIP0::192.168.1.20::5025::SOCKET idn
//! ```
//!
//! Query a simulated instrument:
//! ```bash
//! daq-param --resource ASRL1::INSTR --backend @sim query "RFCONFIG? CHAN"
//! ```
//!
//! Run the multi-channel attenuator walkthrough against the built-in simulation:
//! ```bash
//! daq-param demo
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daq_param::config::AppConfig;
use daq_param::logging;
use daq_param::validation::NumberRange;
use daq_param::{Backend, ChannelGroup, Identification, Parameter, Session};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "daq-param")]
#[command(about = "Typed instrument parameters over VISA-style sessions", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Resource identifier, e.g. ASRL1::INSTR or TCPIP0::host::5025::SOCKET
    #[arg(long, global = true)]
    resource: Option<String>,

    /// Backend selector: "" for hardware, "@sim", or "path.yaml@sim"
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Read timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query and decode the instrument identification (*IDN?)
    Idn,

    /// Send a command and print the response
    Query {
        /// Command text, without termination
        command: String,
    },

    /// Send a command without reading a response
    Write {
        /// Command text, without termination
        command: String,
    },

    /// Drive every channel of the simulated attenuator and read it back
    Demo,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AppConfig::load()?,
    };
    if let Some(resource) = &cli.resource {
        config.session.resource = resource.clone();
    }
    if let Some(backend) = &cli.backend {
        config.session.backend = backend.clone();
    }
    if cli.timeout_ms.is_some() {
        config.session.timeout_ms = cli.timeout_ms;
    }
    if let Some(level) = &cli.log_level {
        config.application.log_level = level.clone();
    }
    if matches!(cli.command, Commands::Demo) && cli.backend.is_none() {
        config.session.backend = "@sim".to_string();
    }
    config.validate().map_err(anyhow::Error::msg)?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let backend = config.session.backend()?;
    let session = Arc::new(
        Session::open(
            &config.session.resource,
            backend,
            config.session.to_session_config(),
        )
        .with_context(|| format!("opening {}", config.session.resource))?,
    );

    let outcome = match cli.command {
        Commands::Idn => identify(&session),
        Commands::Query { command } => {
            println!("{}", session.query(&command)?);
            Ok(())
        }
        Commands::Write { command } => Ok(session.write(&command)?),
        Commands::Demo => run_demo(&session),
    };

    session.close()?;
    outcome
}

fn identify(session: &Arc<Session>) -> Result<()> {
    let idn = Parameter::<Identification>::identification(Arc::clone(session))?;
    let info = idn.get()?;
    println!("Vendor:   {}", info.vendor);
    println!("Model:    {}", info.model.as_deref().unwrap_or("-"));
    println!("Serial:   {}", info.serial.as_deref().unwrap_or("-"));
    println!("Revision: {}", info.revision.as_deref().unwrap_or("-"));
    if let Some(others) = &info.others {
        println!("Other:    {others}");
    }
    Ok(())
}

fn run_demo(session: &Arc<Session>) -> Result<()> {
    if !session.backend().is_simulated() {
        info!(resource = session.resource(), "demo running against real hardware");
    }

    let count = Parameter::<i64>::builder("channel_count", Arc::clone(session))
        .get_cmd("RFCONFIG? CHAN")
        .read_only()
        .build()?;

    let template = Parameter::<f64>::builder("attenuation{index}", Arc::clone(session))
        .get_cmd("ATTN? {index}")
        .set_cmd("ATTN {index} {value}")
        .validator(NumberRange::between(0.0, 31.75)?)
        .unit("dB")
        .query_delay(Duration::from_millis(1));
    let channels = ChannelGroup::build(&count, &template)?;
    println!("{} channels: {}", channels.len(), channels.names().join(", "));

    for (i, channel) in channels.iter().enumerate() {
        let target = i as f64 * 0.27 + 0.1;
        channel.set(target)?;
        let readback = channel.get()?;
        println!("{:<14} set {target:>6.2} dB  read {readback:>6.2} dB", channel.name());
    }

    println!("{}", serde_json::to_string_pretty(&channels.snapshot())?);
    Ok(())
}
