use clap::{Parser, Subcommand};
use jobq_client::{ResilientConnector, TcpConnector};
use jobq_worker::config::StageConfig;
use jobq_worker::{HandlerRegistry, PipelinedWorker, SimpleRunner, WorkerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "jobq-worker")]
#[command(about = "Pull work items from a jobq queue and process them", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,

    /// Queue address (tcp://host:port)
    #[arg(short, long)]
    uri: Option<String>,

    /// Fail handler invocations running longer than this
    #[arg(long)]
    handler_timeout_secs: Option<u64>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Process one item at a time over a single connection
    Simple {
        /// Registered handler name
        #[arg(long)]
        handler: Option<String>,
    },
    /// Stream items through a chain of concurrent stages
    Pipeline {
        /// Stage as NAME or NAME=CONCURRENCY, in order; repeatable
        #[arg(short, long = "stage")]
        stages: Vec<String>,

        /// Concurrent reporters at the end of the pipeline
        #[arg(long)]
        report_concurrency: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => WorkerConfig::from_file(path)?,
        None => WorkerConfig::default(),
    };

    // Override with CLI args
    if let Some(uri) = args.uri {
        config.uri = uri;
    }
    if args.handler_timeout_secs.is_some() {
        config.handler_timeout_secs = args.handler_timeout_secs;
    }

    let registry = HandlerRegistry::with_builtins();
    tracing::info!("Registered handlers: {:?}", registry.names());

    let connector = ResilientConnector::new(TcpConnector::from_uri(&config.uri)?, config.retry_policy());

    let run = async {
        match args.mode {
            Mode::Simple { handler } => {
                let name = handler.unwrap_or_else(|| config.handler.clone());
                tracing::info!("Running handler '{}' against {}", name, config.uri);

                let runner = SimpleRunner::new(connector, registry.resolve(&name)?)
                    .with_timeout(config.handler_timeout());
                let summary = runner.run().await?;
                tracing::info!(
                    "Done: {} completed, {} failed",
                    summary.completed,
                    summary.failed
                );
            }
            Mode::Pipeline {
                stages,
                report_concurrency,
            } => {
                if !stages.is_empty() {
                    config.stages = stages
                        .iter()
                        .map(|s| StageConfig::parse(s))
                        .collect::<jobq_worker::Result<_>>()?;
                }
                if let Some(n) = report_concurrency {
                    config.report_concurrency = n;
                }

                let mut worker = PipelinedWorker::new(connector)
                    .source_policy(config.source_policy())
                    .report_concurrency(config.report_concurrency)
                    .handler_timeout(config.handler_timeout());
                for stage in &config.stages {
                    worker = worker.stage(
                        stage.handler.clone(),
                        stage.concurrency,
                        registry.resolve(&stage.handler)?,
                    );
                }

                tracing::info!(
                    "Running {} stages against {}",
                    config.stages.len(),
                    config.uri
                );
                let summary = worker.run().await?;
                tracing::info!(
                    "Done: {} completed, {} failed",
                    summary.completed,
                    summary.failed
                );
            }
        }
        Ok::<(), anyhow::Error>(())
    };

    // Handle shutdown signals
    tokio::select! {
        result = run => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    Ok(())
}
