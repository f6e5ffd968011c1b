//! Isolation-forest anomaly service CLI
//!
//! A command-line tool for listing span-metric anomalies and checking the
//! health of the isolation-forest service.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{anomalies, health};

/// Isolation-forest anomaly service CLI
#[derive(Parser)]
#[command(name = "ifctl")]
#[command(author, version, about = "CLI for the isolation-forest anomaly service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via IFCTL_API_URL env var)
    #[arg(long, env = "IFCTL_API_URL", default_value = "http://localhost:9030")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the top anomalous points of every series
    Anomalies {
        /// Metric to analyse
        #[arg(long, short, default_value = "rps")]
        metric: anomalies::MetricArg,

        /// Only show series of this service
        #[arg(long, short)]
        service: Option<String>,

        /// Only show points scoring at least this much
        #[arg(long)]
        min_score: Option<f64>,
    },

    /// Show service health and component statuses
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::new(&cli.api_url)?;

    // Execute command
    match cli.command {
        Commands::Anomalies {
            metric,
            service,
            min_score,
        } => {
            let filter = anomalies::Filter { service, min_score };
            anomalies::show_anomalies(&client, metric, &filter, cli.format).await?;
        }
        Commands::Health => {
            health::show_health(&client, cli.format).await?;
        }
    }

    Ok(())
}
