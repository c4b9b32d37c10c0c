use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
#[cfg(feature = "victoria")]
use std::sync::Arc;
#[cfg(feature = "victoria")]
use tokio::time::{interval, Duration};
#[cfg(feature = "victoria")]
use tracing::{debug, error, info};

/// Metrics collector for the gateway (spec.md §4.8's "metrics interceptor
/// that records upstream host, status, duration, and a success/error
/// outcome").
///
/// Collects request metrics, latency histograms, and system gauges.
/// Supports both Prometheus pull (text exposition) and VictoriaMetrics push.
pub struct MetricsCollector {
    registry: Registry,

    /// Total HTTP requests by matched rule, method, status
    pub http_requests_total: IntCounterVec,

    /// Request latency histogram by matched rule
    pub http_request_duration: HistogramVec,

    /// Active connections gauge
    pub active_connections: IntGauge,

    /// Upstream round-trip time histogram, by upstream host and
    /// success/error outcome (errors and 5xx classify as error).
    pub upstream_latency: HistogramVec,

    /// Bandwidth counters
    pub ingress_bytes: IntCounterVec,
    pub egress_bytes: IntCounterVec,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("yapi_http_requests_total", "Total HTTP requests")
                .namespace("yapi"),
            &["rule_id", "method", "status"],
        )?;

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new("yapi_http_request_duration_seconds", "Request latency")
                .namespace("yapi")
                .buckets(vec![
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ]),
            &["rule_id"],
        )?;

        let active_connections = IntGauge::new(
            "yapi_active_connections",
            "Number of active connections",
        )?;

        let upstream_latency = HistogramVec::new(
            HistogramOpts::new("yapi_upstream_latency_seconds", "Upstream round-trip time")
                .namespace("yapi")
                .buckets(vec![
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
                ]),
            &["upstream_host", "outcome"],
        )?;

        let ingress_bytes = IntCounterVec::new(
            Opts::new("yapi_ingress_bytes_total", "Total ingress bandwidth")
                .namespace("yapi"),
            &["rule_id"],
        )?;

        let egress_bytes = IntCounterVec::new(
            Opts::new("yapi_egress_bytes_total", "Total egress bandwidth")
                .namespace("yapi"),
            &["rule_id"],
        )?;

        // Register all metrics
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(active_connections.clone()))?;
        registry.register(Box::new(upstream_latency.clone()))?;
        registry.register(Box::new(ingress_bytes.clone()))?;
        registry.register(Box::new(egress_bytes.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration,
            active_connections,
            upstream_latency,
            ingress_bytes,
            egress_bytes,
        })
    }

    /// Record one completed upstream round-trip (spec.md §4.8). 5xx and
    /// transport errors both classify as the `"error"` outcome.
    pub fn record_upstream(&self, upstream_host: &str, status: Option<u16>, duration_secs: f64) {
        let outcome = match status {
            Some(s) if s < 500 => "success",
            _ => "error",
        };
        self.upstream_latency
            .with_label_values(&[upstream_host, outcome])
            .observe(duration_secs);
    }

    /// Record a completed HTTP request.
    pub fn record_request(
        &self,
        route: &str,
        method: &str,
        status: u16,
        duration_secs: f64,
    ) {
        self.http_requests_total
            .with_label_values(&[route, method, &status.to_string()])
            .inc();
        self.http_request_duration
            .with_label_values(&[route])
            .observe(duration_secs);
    }

    /// Get Prometheus text exposition.
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let metrics = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metrics, &mut buffer).unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Start the VictoriaMetrics push loop.
    #[cfg(feature = "victoria")]
    pub fn start_push_loop(
        self: Arc<Self>,
        config: yapi_core::config::VictoriaMetricsConfig,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if !config.enabled {
                return;
            }

            info!(
                endpoint = %config.endpoint,
                interval = config.push_interval_secs,
                "Starting VictoriaMetrics push loop"
            );

            let client = reqwest::Client::new();
            let mut tick = interval(Duration::from_secs(config.push_interval_secs));

            loop {
                tick.tick().await;

                let metrics_text = self.gather_text();

                match client
                    .post(&config.endpoint)
                    .header("Content-Type", "text/plain")
                    .body(metrics_text)
                    .send()
                    .await
                {
                    Ok(resp) => {
                        if !resp.status().is_success() {
                            error!(
                                status = %resp.status(),
                                "VictoriaMetrics push failed"
                            );
                        } else {
                            debug!("VictoriaMetrics push successful");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "VictoriaMetrics push error");
                    }
                }
            }
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics collector")
    }
}
