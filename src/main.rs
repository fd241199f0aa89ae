//! annbench binary

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use annbench::api::{create_router, AppState};
use annbench::bench::{Benchmark, IngestReport, QueryReport};
use annbench::codec::peek_dimension;
use annbench::config::{AppConfig, LogFormat};
use annbench::dataset::{self, DatasetSpec};
use annbench::store::{close_store, create_store, VectorStore};
use annbench::Error;

#[derive(Debug, Parser)]
#[command(name = "annbench", version, about = "Recall benchmark for vector stores")]
struct Cli {
    /// Configuration file (defaults to $ANNBENCH_CONFIG, then annbench.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest the base vectors, replay the queries and report recall
    Run {
        /// Query an already populated collection
        #[arg(long)]
        skip_ingest: bool,
        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Serve the reference vector API
    Serve,
    /// Write a synthetic dataset with exact ground truth
    Generate {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 10_000)]
        base: usize,
        #[arg(long, default_value_t = 100)]
        queries: usize,
        #[arg(long, default_value_t = 128)]
        dimension: usize,
        #[arg(long, default_value_t = 100)]
        k: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

#[derive(Debug, Serialize)]
struct RunReport {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    namespace: String,
    max_in_flight: usize,
    ingest: Option<IngestReport>,
    query: QueryReport,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    init_tracing(&config)?;

    match cli.command {
        Command::Run {
            skip_ingest,
            report,
        } => run(&config, skip_ingest, report.as_deref()).await,
        Command::Serve => serve(&config).await,
        Command::Generate {
            out,
            base,
            queries,
            dimension,
            k,
            seed,
        } => {
            let spec = DatasetSpec {
                base,
                queries,
                dimension,
                k,
                seed,
                metric: config.benchmark.metric,
            };
            let generated = dataset::generate(&out, &spec)
                .await
                .with_context(|| format!("failed to generate dataset in {}", out.display()))?;
            println!("{}", serde_json::to_string_pretty(&generated)?);
            Ok(())
        }
    }
}

async fn run(config: &AppConfig, skip_ingest: bool, report_path: Option<&Path>) -> anyhow::Result<()> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    tracing::info!(%run_id, namespace = %config.benchmark.namespace, "Starting benchmark run");

    let store_config = config.store_runtime().context("invalid store configuration")?;
    let store: Arc<dyn VectorStore> = Arc::from(create_store(store_config).await?);

    let outcome = run_phases(config, store.clone(), skip_ingest).await;
    if let Err(err) = &outcome {
        tracing::error!(error = %err, fatal = err.is_fatal(), "Benchmark aborted");
    }
    let (ingest, query) = close_store(store.as_ref(), outcome).await?;

    let recall = query.recall.recall;
    println!("{}", recall);

    if let Some(path) = report_path {
        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            namespace: config.benchmark.namespace.clone(),
            max_in_flight: config.dispatch.max_in_flight,
            ingest,
            query,
        };
        tokio::fs::write(path, serde_json::to_vec_pretty(&report)?)
            .await
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Wrote run report");
    }

    if recall < config.benchmark.min_recall {
        bail!(
            "recall {:.4} is below the required {:.4}",
            recall,
            config.benchmark.min_recall
        );
    }
    Ok(())
}

async fn run_phases(
    config: &AppConfig,
    store: Arc<dyn VectorStore>,
    skip_ingest: bool,
) -> annbench::Result<(Option<IngestReport>, QueryReport)> {
    let bench = Benchmark::new(store.clone(), config.dispatch_config())?.with_limits(config.limits());

    let ingest = if skip_ingest {
        tracing::info!("Skipping ingest");
        None
    } else {
        let dimension = peek_dimension(&config.dataset.base_path)
            .await?
            .ok_or_else(|| {
                Error::InvalidRequest(format!(
                    "base file {} contains no vectors",
                    config.dataset.base_path.display()
                ))
            })?;
        store.provision(&config.collection_spec(dimension)).await?;
        Some(bench.ingest(&config.dataset.base_path).await?)
    };

    let query = bench
        .run_queries(
            &config.dataset.query_path,
            &config.dataset.ground_truth_path,
            config.benchmark.top_k,
        )
        .await?;

    Ok((ingest, query))
}

async fn serve(config: &AppConfig) -> anyhow::Result<()> {
    let router = create_router(AppState::new());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    tracing::info!(%addr, "Listening for HTTP traffic");

    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.logging.level.clone()))
        .unwrap_or_else(|_| EnvFilter::new("annbench=info"));

    // Logs go to stderr; stdout carries the recall figure.
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format {
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
