//! Tracegraph - service dependency analysis from distributed traces
//!
//! Replays a JSONL span file through the graph engine and answers queries
//! about the resulting service mesh.

mod output;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracegraph_core::{
    ConfigLoader, EngineConfig, GraphEngine, IngestService, JsonlTraceSource, SharedEngine,
};
use tracegraph_export::{ExportFormat, GraphExport};
use tracing::{info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "tracegraph")]
#[command(author = "Oximy")]
#[command(version)]
#[command(about = "Service dependency graph analysis from distributed traces", long_about = None)]
struct Cli {
    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "TRACEGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Span file to replay (JSONL, one span per line)
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Overview of every service and the mesh totals
    Summary,

    /// Dependencies and dependents of one service
    Deps {
        /// Service name
        service: String,
    },

    /// Most-travelled call path between two services
    Path {
        /// Starting service
        from: String,

        /// Destination service
        to: String,
    },

    /// Circular dependencies
    Cycles,

    /// Services with high latency, high error rate or high fan-in
    Bottlenecks {
        /// Latency threshold in milliseconds (defaults to the configured value)
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Services affected if one service fails
    BlastRadius {
        /// Failing service
        service: String,
    },

    /// Full topology document
    Topology,

    /// Render the graph (dot, cytoscape, mermaid)
    Export {
        /// Export format
        #[arg(value_name = "FORMAT")]
        kind: String,
    },

    /// Services not seen within the retention window
    Stale {
        /// Retention window in seconds (defaults to the configured value)
        #[arg(short, long)]
        retention: Option<u64>,

        /// Reference time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Ingestion counters for the replay
    Metrics,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration file
    let mut config = load_config(cli.config.clone());

    // Setup logging - CLI verbose flag takes precedence, then config, then default
    let log_level = if cli.verbose > 0 {
        match cli.verbose {
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    } else {
        match config.engine.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        }
    };

    // RUST_LOG directives refine the chosen default level
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(log_level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Stale {
        retention: Some(secs),
        ..
    } = &cli.command
    {
        config.ingest.retention_secs = *secs;
        ConfigLoader::new().validate(&config)?;
    }

    let input = cli
        .input
        .as_deref()
        .ok_or_else(|| anyhow!("--input <FILE> is required"))?;
    let engine = replay(input, config).await?;
    let format = cli.format;

    match cli.command {
        Commands::Summary => output::summary(&engine, format),
        Commands::Deps { service } => {
            let report = engine
                .service_dependencies(&service)
                .ok_or_else(|| anyhow!("Unknown service: {}", service))?;
            output::dependencies(&report, format)
        }
        Commands::Path { from, to } => {
            let hops = engine.critical_path(&from, &to);
            output::path(&from, &to, &hops, format)
        }
        Commands::Cycles => output::cycles(&engine.circular_dependencies(), format),
        Commands::Bottlenecks { threshold } => {
            output::bottlenecks(&engine.bottlenecks(threshold), format)
        }
        Commands::BlastRadius { service } => {
            output::blast_radius(&engine.blast_radius(&service), format)
        }
        Commands::Topology => {
            println!("{}", GraphExport::export_topology_json(engine.as_ref())?);
            Ok(())
        }
        Commands::Export { kind } => {
            let export_format: ExportFormat = kind.parse()?;
            print!("{}", engine.export(export_format)?);
            Ok(())
        }
        Commands::Stale { at, .. } => {
            let now = at.unwrap_or_else(Utc::now);
            output::stale(&engine.stale_services(now), format)
        }
        Commands::Metrics => output::metrics(&engine, format),
    }
}

/// Load configuration from file/env, with fallback to defaults
fn load_config(cli_path: Option<PathBuf>) -> EngineConfig {
    let loader = ConfigLoader::new().with_cli_path(cli_path);
    match loader.load() {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            warn!("Failed to load configuration: {}, using defaults", e);
            EngineConfig::default()
        }
    }
}

/// Feed every trace in `input` through the ingestion service
async fn replay(input: &Path, config: EngineConfig) -> anyhow::Result<SharedEngine> {
    let engine = GraphEngine::shared(config);
    let service = IngestService::start(engine.clone());

    let mut source = JsonlTraceSource::new(input);
    let submitted = service
        .drain_source(&mut source)
        .await
        .with_context(|| format!("Failed to replay {}", input.display()))?;
    let applied = service.join().await?;

    info!(
        "Replayed {} traces ({} applied) from {}",
        submitted,
        applied,
        input.display()
    );
    Ok(engine)
}
