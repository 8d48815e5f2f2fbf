use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use jobq_client::{Connector, QueueService, ResilientConnector, RetryPolicy, TcpConnector};
use jobq_core::{QueueStats, WorkItem};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "jobq-admin")]
#[command(about = "jobq queue admin CLI", long_about = None)]
struct Args {
    /// Queue address (tcp://host:port)
    #[arg(short, long, default_value = "tcp://127.0.0.1:9105")]
    uri: String,

    /// Output format (json, table, yaml)
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add items to the queue
    Submit {
        /// Items as JSON values
        items: Vec<String>,

        /// File with one JSON value per line
        #[arg(long)]
        file: Option<String>,
    },

    /// Show queue statistics
    Stats,
}

#[derive(Serialize)]
struct SubmitReport {
    submitted: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let connector = ResilientConnector::new(TcpConnector::from_uri(&args.uri)?, RetryPolicy::resilient());

    match args.command {
        Commands::Submit { items, file } => {
            let mut lines = items;
            if let Some(path) = &file {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {path}"))?;
                lines.extend(
                    contents
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(String::from),
                );
            }

            let items = lines
                .iter()
                .map(|l| WorkItem::parse(l).with_context(|| format!("invalid item {l}")))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let mut conn = connector.connect().await?;
            for item in &items {
                conn.put(item).await?;
            }
            conn.close().await?;

            let report = SubmitReport {
                submitted: items.len(),
            };
            match args.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&report)?),
                "yaml" => print!("{}", serde_yaml::to_string(&report)?),
                _ => println!("Submitted {} items", report.submitted),
            }
        }

        Commands::Stats => {
            let mut conn = connector.connect().await?;
            let stats = conn.stat().await?;
            conn.close().await?;

            match args.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&stats)?),
                "yaml" => print!("{}", serde_yaml::to_string(&stats)?),
                _ => println!("{}", stats_table(&stats)),
            }
        }
    }

    Ok(())
}

fn stats_table(stats: &QueueStats) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Remaining", &stats.remain.to_string()]);
    table.add_row(vec!["Ongoing", &stats.ongoing.to_string()]);
    table.add_row(vec!["Succeeded", &stats.success.to_string()]);
    table.add_row(vec!["Succeeded After Retry", &stats.backoff_success.to_string()]);
    table.add_row(vec!["Dropped", &stats.backoff_failure.to_string()]);
    table.add_row(vec!["Throughput (items/s)", &format!("{:.2}", stats.throughput)]);
    if stats.eta_secs > 0.0 {
        table.add_row(vec!["ETA (s)", &format!("{:.0}", stats.eta_secs)]);
    }
    table
}
