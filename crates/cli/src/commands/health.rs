//! Service health CLI commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, format_unix, print_json, OutputFormat};

/// Row for component health table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Last Check")]
    last_check: String,
}

/// Show service health and per-component status
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("{}", "Service Health".bold());
            println!("{}", "=".repeat(60));
            println!("Status: {}", color_status(&report.status));
            println!();

            let mut names: Vec<&String> = report.components.keys().collect();
            names.sort();

            let rows: Vec<ComponentRow> = names
                .into_iter()
                .map(|name| {
                    let component = &report.components[name];
                    ComponentRow {
                        name: name.clone(),
                        status: color_status(&component.status),
                        message: component.message.clone().unwrap_or_else(|| "-".to_string()),
                        last_check: format_unix(component.last_check_timestamp),
                    }
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
