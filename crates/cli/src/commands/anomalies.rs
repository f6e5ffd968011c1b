//! Anomaly listing CLI commands

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{AnomalyReport, ApiClient, SeriesReport};
use crate::output::{color_score, format_timestamp, print_info, print_json, print_warning, OutputFormat};

/// Metric whose series are analysed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum MetricArg {
    /// Request rate per server span
    #[default]
    Rps,
    /// Error rate per server span
    ErrorRate,
}

impl MetricArg {
    /// Service endpoint serving this metric
    pub fn path(&self) -> &'static str {
        match self {
            MetricArg::Rps => "anomalies/all",
            MetricArg::ErrorRate => "anomalies/all_error",
        }
    }
}

/// Client-side filters applied to a report
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub service: Option<String>,
    pub min_score: Option<f64>,
}

impl Filter {
    /// Keep matching series and, within them, points scoring at least `min_score`
    pub fn apply(&self, report: &mut AnomalyReport) {
        if let Some(service) = &self.service {
            report
                .results
                .retain(|s| &s.labels.service_name == service);
        }
        if let Some(min_score) = self.min_score {
            for series in &mut report.results {
                series.top.retain(|p| p.score >= min_score);
            }
            report.results.retain(|s| !s.top.is_empty());
        }
        report.series = report.results.len();
    }
}

/// Row for anomalies table
#[derive(Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Span")]
    span: String,
    #[tabled(rename = "Peer")]
    peer: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Score")]
    score: String,
}

fn rows(series: &SeriesReport) -> impl Iterator<Item = AnomalyRow> + '_ {
    series.top.iter().map(move |p| AnomalyRow {
        service: series.labels.service_name.clone(),
        span: series.labels.span_name.clone(),
        peer: series.labels.peer_service.clone(),
        time: format_timestamp(&p.time),
        value: format!("{:.4}", p.value),
        score: color_score(p.score),
    })
}

/// Fetch and print the top anomalies of every series
pub async fn show_anomalies(
    client: &ApiClient,
    metric: MetricArg,
    filter: &Filter,
    format: OutputFormat,
) -> Result<()> {
    let mut report: AnomalyReport = client.get(metric.path()).await?;
    filter.apply(&mut report);

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("{}", "Anomalies".bold());
            println!("{}", "=".repeat(60));
            println!("Metric: {}", report.metric.cyan());
            println!("Window: {} minutes", report.window_minutes);
            println!();

            if report.results.is_empty() {
                print_warning("No series matched");
                return Ok(());
            }

            let table_rows: Vec<AnomalyRow> = report.results.iter().flat_map(rows).collect();
            let table = tabled::Table::new(table_rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            print_info(&format!("{} series", report.series));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AnomalyPoint, SeriesLabels};

    fn series(service: &str, scores: &[f64]) -> SeriesReport {
        SeriesReport {
            labels: SeriesLabels {
                service_name: service.to_string(),
                ..Default::default()
            },
            points: 30,
            top: scores
                .iter()
                .map(|&score| AnomalyPoint {
                    time: "2023-11-14T22:13:20Z".to_string(),
                    value: 1.0,
                    score,
                })
                .collect(),
        }
    }

    fn report() -> AnomalyReport {
        AnomalyReport {
            window_minutes: 30,
            series: 2,
            results: vec![series("checkout", &[0.9, 0.4]), series("cart", &[0.5])],
            metric: "rps".to_string(),
        }
    }

    #[test]
    fn test_metric_paths() {
        assert_eq!(MetricArg::Rps.path(), "anomalies/all");
        assert_eq!(MetricArg::ErrorRate.path(), "anomalies/all_error");
    }

    #[test]
    fn test_filter_by_service() {
        let mut report = report();
        Filter {
            service: Some("cart".to_string()),
            min_score: None,
        }
        .apply(&mut report);

        assert_eq!(report.series, 1);
        assert_eq!(report.results[0].labels.service_name, "cart");
    }

    #[test]
    fn test_filter_by_min_score_drops_empty_series() {
        let mut report = report();
        Filter {
            service: None,
            min_score: Some(0.6),
        }
        .apply(&mut report);

        assert_eq!(report.series, 1);
        assert_eq!(report.results[0].top.len(), 1);
        assert_eq!(report.results[0].top[0].score, 0.9);
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let mut report = report();
        Filter::default().apply(&mut report);

        assert_eq!(report.series, 2);
        assert_eq!(report.results[0].top.len(), 2);
    }
}
