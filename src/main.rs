use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use traccar_enrich::config::{AppConfig, DeviceConfig};
use traccar_enrich::device::DeviceEnricher;
use traccar_enrich::server::{self, AppState};
use traccar_enrich::telemetry::{self, Record};

/// Traccar telemetry enrichment: reverse geocoding and stable beacon slots.
///
/// Examples:
///   traccar-enrich serve
///   traccar-enrich serve --port 8095
///   traccar-enrich process --device 12 positions.ndjson
///   cat positions.ndjson | traccar-enrich process --device 12
#[derive(Parser)]
#[command(name = "traccar-enrich", version, about, long_about = None)]
struct Cli {
    /// Configuration file. Defaults to ~/.traccar-enrich/config.json.
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for Traccar event and position forwarding.
    Serve {
        /// Bind address override.
        #[arg(long)]
        host: Option<String>,

        /// Port override.
        #[arg(long, short = 'p')]
        port: Option<u16>,
    },

    /// Enrich newline-delimited JSON records, one result per output line.
    Process {
        /// Device whose configuration and beacon state to use.
        #[arg(long, short = 'd')]
        device: i64,

        /// Input file. Reads stdin when omitted.
        input: Option<PathBuf>,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref()).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let result = match cli.command {
        Command::Serve { host, port } => serve(config, host, port),
        Command::Process { device, input } => process(&config, device, input),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().compact().with_writer(io::stderr))
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(p) => AppConfig::load_from(p)?,
        None => AppConfig::load()?,
    };
    Ok(config)
}

fn serve(config: AppConfig, host: Option<String>, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let host = host.unwrap_or_else(|| config.webhook_host.clone());
    let port = port.unwrap_or(config.webhook_port);

    if config.devices.is_empty() {
        tracing::warn!("No devices configured; every webhook will be rejected");
    }
    let state = AppState::from_config(&config);
    tracing::info!("Serving {} configured device(s)", state.devices.len());

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server::start(state, &host, port))?;
    Ok(())
}

fn process(config: &AppConfig, device_id: i64, input: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let device = match config.device(device_id) {
        Some(d) => d.clone(),
        None => {
            tracing::warn!("Device {} is not configured, using defaults", device_id);
            DeviceConfig::new(device_id)
        }
    };
    let mut enricher = DeviceEnricher::from_config(config, &device);

    let reader: Box<dyn BufRead> = match &input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(io::stdin().lock()),
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut processed = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let record: Record = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping line {}: {}", index + 1, e);
                continue;
            }
        };

        // Accept either a bare position or a forwarded webhook payload.
        let position = telemetry::object(&record, "position").unwrap_or(&record);
        let enriched = enricher.enrich(position);
        writeln!(out, "{}", serde_json::to_string(&enriched)?)?;
        processed += 1;
    }

    out.flush()?;
    tracing::info!("Processed {} record(s) for device {}", processed, device_id);
    if let Some(stats) = enricher.cache_stats() {
        tracing::info!("{}", stats);
    }
    Ok(())
}
