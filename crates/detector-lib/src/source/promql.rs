//! PromQL for span-metrics and service-graph metrics
//!
//! Anomaly queries group per server endpoint and caller so each label
//! combination becomes one series to analyse. Edge queries (one server,
//! optionally one caller) back the MCP tools.

use crate::models::MetricKind;

/// Call counter names across span-metrics connector versions
pub const CALLS_METRIC_REGEX: &str =
    "traces_spanmetrics_calls_total|traces_span_metrics_calls_total|calls_total";

/// Labels each series is grouped by
pub const GROUP_BY: &str = "service_name, span_name, peer_service";

/// Range used inside `rate()`
pub const RATE_RANGE: &str = "5m";

fn server_calls_rate(extra_matcher: Option<&str>) -> String {
    let extra = extra_matcher
        .map(|m| format!(", {m}"))
        .unwrap_or_default();
    format!(
        r#"sum by ({GROUP_BY}) (rate(({{__name__=~"{CALLS_METRIC_REGEX}", span_kind="SPAN_KIND_SERVER"{extra}}}[{RATE_RANGE}])))"#
    )
}

/// Requests per second for every server span
pub fn rps_query() -> String {
    server_calls_rate(None)
}

/// Error calls divided by total calls for every server span
pub fn error_rate_query() -> String {
    format!(
        "{} / {}",
        server_calls_rate(Some(r#"status_code="STATUS_CODE_ERROR""#)),
        server_calls_rate(None)
    )
}

/// Query for a metric kind
pub fn query_for(kind: MetricKind) -> String {
    match kind {
        MetricKind::Rps => rps_query(),
        MetricKind::ErrorRate => error_rate_query(),
    }
}

/// Latency histogram bucket names across span-metrics connector versions
pub const DURATION_BUCKET_REGEX: &str = "traces_span_metrics_duration_milliseconds_bucket|duration_milliseconds_bucket|rpc_server_duration_milliseconds_bucket";

/// Request counter of the service-graph connector
pub const SERVICE_GRAPH_REQUESTS: &str = "traces_service_graph_request_total";

/// Escape a label value for use inside double quotes
pub fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn server_matcher(metric_regex: &str, server: &str, client: Option<&str>) -> String {
    let peer = client
        .map(|c| format!(r#", peer_service="{}""#, escape_label_value(c)))
        .unwrap_or_default();
    format!(
        r#"{{__name__=~"{metric_regex}", service_name="{}", span_kind="SPAN_KIND_SERVER"{peer}}}"#,
        escape_label_value(server)
    )
}

/// Client to server edge weights from the service graph
pub fn topology_query() -> String {
    format!("sum by (client, server) (increase({SERVICE_GRAPH_REQUESTS}[{RATE_RANGE}]))")
}

/// Latency quantile of the calls `client` makes to `server`
pub fn latency_quantile_query(quantile: f64, server: &str, client: &str) -> String {
    format!(
        "histogram_quantile({quantile}, sum by (le) (rate(({}[{RATE_RANGE}]))))",
        server_matcher(DURATION_BUCKET_REGEX, server, Some(client))
    )
}

/// Total request rate into `server`, optionally only from `client`
pub fn edge_rps_query(server: &str, client: Option<&str>) -> String {
    format!(
        "sum(rate(({}[{RATE_RANGE}])))",
        server_matcher(CALLS_METRIC_REGEX, server, client)
    )
}

/// Top `limit` callers of `server` by request rate
pub fn top_callers_query(server: &str, limit: u32) -> String {
    format!(
        "topk({limit}, sum by (peer_service) (rate(({}[{RATE_RANGE}]))))",
        server_matcher(CALLS_METRIC_REGEX, server, None)
    )
}

/// Top `limit` span names of `server` by request rate
pub fn top_endpoints_query(server: &str, limit: u32) -> String {
    format!(
        "topk({limit}, sum by (span_name) (rate(({}[{RATE_RANGE}]))))",
        server_matcher(CALLS_METRIC_REGEX, server, None)
    )
}

/// Series matcher used to list services
pub fn services_matcher() -> String {
    format!(r#"{{__name__=~"{CALLS_METRIC_REGEX}"}}"#)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rps_query() {
        assert_eq!(
            rps_query(),
            r#"sum by (service_name, span_name, peer_service) (rate(({__name__=~"traces_spanmetrics_calls_total|traces_span_metrics_calls_total|calls_total", span_kind="SPAN_KIND_SERVER"}[5m])))"#
        );
    }

    #[test]
    fn test_error_rate_query_divides_errors_by_total() {
        let q = error_rate_query();
        let (numerator, denominator) = q.split_once(" / ").unwrap();

        assert!(numerator.contains(r#"status_code="STATUS_CODE_ERROR""#));
        assert!(!denominator.contains("status_code"));
        assert_eq!(denominator, rps_query());
    }

    #[test]
    fn test_services_matcher() {
        assert_eq!(
            services_matcher(),
            r#"{__name__=~"traces_spanmetrics_calls_total|traces_span_metrics_calls_total|calls_total"}"#
        );
    }

    #[test]
    fn test_topology_query() {
        assert_eq!(
            topology_query(),
            "sum by (client, server) (increase(traces_service_graph_request_total[5m]))"
        );
    }

    #[test]
    fn test_latency_quantile_query() {
        let q = latency_quantile_query(0.95, "checkout", "frontend");

        assert!(q.starts_with("histogram_quantile(0.95, sum by (le) (rate(({__name__=~\"traces_span_metrics_duration_milliseconds_bucket|"));
        assert!(q.contains(r#"service_name="checkout", span_kind="SPAN_KIND_SERVER", peer_service="frontend"}[5m]"#));
    }

    #[test]
    fn test_edge_rps_query_with_and_without_client() {
        let all = edge_rps_query("cart", None);
        assert_eq!(
            all,
            r#"sum(rate(({__name__=~"traces_spanmetrics_calls_total|traces_span_metrics_calls_total|calls_total", service_name="cart", span_kind="SPAN_KIND_SERVER"}[5m])))"#
        );
        assert!(!all.contains("peer_service"));

        let edge = edge_rps_query("cart", Some("web"));
        assert!(edge.contains(r#"span_kind="SPAN_KIND_SERVER", peer_service="web"}"#));
    }

    #[test]
    fn test_top_queries_group_by_caller_and_endpoint() {
        let callers = top_callers_query("cart", 5);
        assert!(callers.starts_with("topk(5, sum by (peer_service) (rate(("));

        let endpoints = top_endpoints_query("cart", 3);
        assert!(endpoints.starts_with("topk(3, sum by (span_name) (rate(("));
        assert!(endpoints.contains(r#"service_name="cart""#));
    }

    #[test]
    fn test_label_values_are_escaped() {
        assert_eq!(escape_label_value(r#"a"b\c"#), r#"a\"b\\c"#);
        let q = edge_rps_query(r#"x", foo="y"#, None);
        assert!(q.contains(r#"service_name="x\", foo=\"y""#));
    }

    #[test]
    fn test_query_for_kind() {
        assert_eq!(query_for(MetricKind::Rps), rps_query());
        assert_eq!(query_for(MetricKind::ErrorRate), error_rate_query());
    }
}
