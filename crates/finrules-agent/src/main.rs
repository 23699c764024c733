//! Finrules - Main entry point

use anyhow::Context;
use clap::Parser;
use finrules_agent::backend::{select_embedder, Backend};
use finrules_agent::{Cli, Pipeline};
use finrules_store::{SqliteVectorStore, StoreConfig};
use tracing_subscriber::EnvFilter;

fn main() {
    // Log to stderr; stdout carries the report
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = cli
        .resolve_config(|key| std::env::var(key).ok())
        .context("Invalid configuration")?;
    let catalog = cli.catalog()?;
    let descriptors = cli.descriptors()?;

    // Blocking HTTP clients must be created and dropped outside the runtime
    let backend = Backend::select(&cli.ollama_host, cli.model.as_deref(), config.extraction.llm_timeout())?;
    let embedder = select_embedder(&cli.ollama_host, cli.embed_model.as_deref(), cli.embed_dim)?;
    let store = SqliteVectorStore::open(StoreConfig::at(&cli.db).with_dimension(cli.embed_dim), Some(embedder))
        .with_context(|| format!("Failed to open chunk store at {}", cli.db.display()))?;

    let pipeline = Pipeline::new(backend, store, catalog, config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let batch = runtime.block_on(pipeline.process_batch(&descriptors));
    let report = pipeline.generate_comprehensive_report(&batch.results);

    let mut output = serde_json::json!({
        "report": report,
        "failures": batch.failures,
    });
    if cli.detailed {
        output["results"] = serde_json::to_value(&batch.results)?;
    }
    let json = serde_json::to_string_pretty(&output)?;

    match &cli.output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    if batch.results.is_empty() {
        anyhow::bail!("all {} document(s) failed", batch.failures.len());
    }
    Ok(())
}
