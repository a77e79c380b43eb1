//! enigma CLI entry point.
//!
//! Loads a guest module, stages a message in its memory, records the result
//! the guest computes, and hands the guest's vertex buffer to the renderer.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use enigma_common::ConfigFile;
use enigma_core::{GuestExports, RuntimeHost};
use enigma_host::{ResultJournal, VertexBuffer, VertexSink};

/// Embedded WebAssembly host.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Guest module to load, overriding the configuration file
    #[arg(short, long, env = "ENIGMA_MODULE")]
    module: Option<PathBuf>,

    /// Message staged in guest memory
    #[arg(long, default_value = "WebAssembly is excellent!")]
    message: String,

    /// Journal file, overriding the configuration file
    #[arg(short, long)]
    journal: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,enigma=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigFile::default(),
    };
    if let Some(module) = args.module {
        config.module.path = module;
    }
    if let Some(journal) = args.journal {
        config.journal.enabled = true;
        config.journal.path = journal;
    }

    info!(module = %config.module.path.display(), "Starting enigma");

    let mut host = RuntimeHost::new(&config.runtime).context("Failed to create runtime host")?;
    let module = host
        .load_file(&config.module.path)
        .with_context(|| format!("Failed to load {}", config.module.path.display()))?;
    host.instantiate(&module)
        .context("Failed to instantiate guest module")?;

    let exports = GuestExports::resolve(&mut host, &config.contract)
        .context("Guest module does not satisfy the export contract")?;

    // The guest reads the message as a NUL-terminated string
    let mut input = args.message.clone().into_bytes();
    input.push(0);

    let result = exports
        .process_input(&mut host, &input)
        .context("Guest failed to process the message")?;
    info!(message = %args.message, result, "Message processed");

    let mut journal =
        ResultJournal::from_config(&config.journal).context("Failed to open result journal")?;
    journal
        .record(&args.message, result)
        .context("Failed to record result")?;

    if let Some(span) = exports
        .vertex_span(&mut host, config.contract.vertex_count)
        .context("Failed to locate vertex buffer")?
    {
        let mut buffer = VertexBuffer::new();
        host.with_span(&span, |bytes| buffer.upload(bytes))
            .context("Failed to read vertex buffer")?
            .context("Failed to upload vertex buffer")?;

        for (index, vertex) in buffer.vertices().iter().enumerate() {
            info!(
                index,
                position = ?vertex.position,
                color = ?vertex.color,
                "Vertex uploaded"
            );
        }
    }

    let metrics = host.metrics().cloned().ok();
    host.shutdown().context("Failed to shut down runtime host")?;

    if let Some(metrics) = metrics {
        info!(
            calls = metrics.calls,
            traps = metrics.traps,
            fuel_consumed = metrics.total_fuel_consumed,
            "Runtime host shut down"
        );
    }

    Ok(())
}
