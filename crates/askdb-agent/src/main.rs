//! # askdb-agent
//!
//! askdb CLI binary — wires together settings, the language engine, the
//! capability registry, and the workflow controller.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use askdb_capabilities::{
    seed_from_json, CapabilityRegistry, EmbeddingsClient, ExecuteSql, FetchMetadata,
    RestWarehouse, RestWarehouseConfig, RunPython, SimilarQueries, SimilarityStore,
};
use askdb_llm::{Engine, GeminiConfig, GeminiEngine, RecordingEngine, SamplingOptions};
use askdb_runtime::{Controller, ControllerConfig};
use askdb_settings::{load_settings_from_path, settings_path, AskdbSettings};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Bearer token for the warehouse endpoint, if it requires one.
const WAREHOUSE_TOKEN_ENV: &str = "ASKDB_WAREHOUSE_TOKEN";

/// Natural-language analytics over a data warehouse.
#[derive(Parser, Debug)]
#[command(name = askdb_core::constants::NAME, version = askdb_core::constants::VERSION)]
struct Cli {
    /// Path to the settings file (defaults to `~/.askdb/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a question against the warehouse.
    Ask {
        /// The question, in natural language.
        question: String,
    },
    /// Seed the similarity cache from a JSON file of
    /// `{question, query}` pairs.
    SeedCache {
        /// Path to the seed file.
        file: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_settings(override_path: Option<&Path>) -> Result<AskdbSettings> {
    let path = override_path.map_or_else(settings_path, Path::to_path_buf);
    load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))
}

/// Build the engine from settings, optionally wrapped for call recording.
fn build_engine(settings: &AskdbSettings) -> Result<Arc<dyn Engine>> {
    let api_key = std::env::var(&settings.engine.api_key_env).with_context(|| {
        format!(
            "engine API key not found in ${}",
            settings.engine.api_key_env
        )
    })?;
    let gemini = GeminiEngine::new(GeminiConfig {
        model: settings.engine.model.clone(),
        api_base: settings.engine.api_base.clone(),
        api_key,
        temperature: settings.engine.temperature,
        timeout: Duration::from_millis(settings.engine.timeout_ms),
    })
    .context("failed to build the language engine")?;

    let engine: Arc<dyn Engine> = Arc::new(gemini);
    if settings.engine.record_calls {
        tracing::info!(dir = %settings.engine.recording_dir, "engine call recording enabled");
        return Ok(Arc::new(RecordingEngine::new(
            engine,
            &settings.engine.recording_dir,
        )));
    }
    Ok(engine)
}

fn build_embeddings(settings: &AskdbSettings) -> Result<Arc<EmbeddingsClient>> {
    let client = EmbeddingsClient::new(
        settings.similarity.api_base.clone(),
        settings.similarity.model.clone(),
        Duration::from_millis(settings.similarity.timeout_ms),
    )
    .context("failed to build the embeddings client")?;
    Ok(Arc::new(client))
}

/// Register the four capabilities over their shared collaborators.
fn build_registry(
    settings: &AskdbSettings,
    engine: &Arc<dyn Engine>,
    embeddings: &Arc<EmbeddingsClient>,
    store: Arc<SimilarityStore>,
) -> Result<CapabilityRegistry> {
    let warehouse = RestWarehouse::new(RestWarehouseConfig {
        api_base: settings.warehouse.api_base.clone(),
        project: settings.warehouse.project.clone(),
        location: settings.warehouse.location.clone(),
        timeout: Duration::from_millis(settings.warehouse.timeout_ms),
        max_result_rows: settings.warehouse.max_result_rows,
        auth_token: std::env::var(WAREHOUSE_TOKEN_ENV).ok(),
    })
    .context("failed to build the warehouse client")?;

    let mut registry = CapabilityRegistry::new();
    registry.register(Arc::new(ExecuteSql::new(
        Arc::new(warehouse),
        &settings.warehouse.results_dir,
        settings.warehouse.timeout_ms,
    )));
    registry.register(Arc::new(FetchMetadata::new(
        &settings.metadata.path,
        settings.metadata.summarize_over_chars,
        engine.clone(),
        settings.engine.timeout_ms,
    )));
    registry.register(Arc::new(RunPython::new(
        settings.interpreter.python_bin.clone(),
        settings.interpreter.timeout_ms,
    )));
    registry.register(Arc::new(SimilarQueries::new(
        embeddings.clone(),
        store,
        settings.similarity.top_k,
        settings.similarity.min_score,
        settings.similarity.timeout_ms,
    )));
    tracing::debug!(capabilities = ?registry.names(), "capability registry created");
    Ok(registry)
}

async fn ask(settings: &AskdbSettings, question: &str) -> Result<()> {
    let engine = build_engine(settings)?;
    let embeddings = build_embeddings(settings)?;
    let store = Arc::new(
        SimilarityStore::open(Path::new(&settings.similarity.cache_path))
            .context("failed to open the similarity cache")?,
    );
    let registry = Arc::new(build_registry(settings, &engine, &embeddings, store)?);

    let controller = Controller::new(
        engine,
        registry,
        settings.language,
        ControllerConfig {
            max_retries: settings.controller.max_retries,
            max_passes: settings.controller.max_passes,
            options: SamplingOptions {
                temperature: Some(settings.engine.temperature),
                max_tokens: None,
            },
        },
    );

    // Ctrl-C cancels between steps; a step mid-flight runs to completion.
    let cancellation = CancellationToken::new();
    let shutdown = cancellation.clone();
    let _ = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            shutdown.cancel();
        }
    });

    let report = controller.run(question, &cancellation).await?;
    println!("{}", report.answer);
    Ok(())
}

async fn seed_cache(settings: &AskdbSettings, file: &Path) -> Result<()> {
    let embeddings = build_embeddings(settings)?;
    let store = SimilarityStore::open(Path::new(&settings.similarity.cache_path))
        .context("failed to open the similarity cache")?;
    let inserted = seed_from_json(&store, &embeddings, file)
        .await
        .with_context(|| format!("failed to seed from {}", file.display()))?;
    println!("seeded {inserted} cached queries");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Cli::parse();
    let settings = load_settings(args.settings.as_deref())?;

    match args.command {
        Command::Ask { question } => ask(&settings, &question).await,
        Command::SeedCache { file } => seed_cache(&settings, &file).await,
    }
}
