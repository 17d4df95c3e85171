//! Metrics collection
//!
//! Prometheus counters and histograms for the bundle pipeline. There is no
//! HTTP exporter; the CLI renders the registry in text format on request.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::time::Instant;

/// Pipeline metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub envelopes_built: IntCounter,
    pub bundles_submitted: IntCounter,
    pub bundles_accepted: IntCounter,
    pub bundles_dropped: IntCounter,
    pub bundles_transport_errors: IntCounter,
    pub guardrail_rejections: IntCounter,
    pub size_rejections: IntCounter,
    pub table_poll_attempts: IntCounter,
    pub wallets_skipped: IntCounter,

    // Histograms
    pub envelope_size: Histogram,
    pub build_latency: Histogram,
    pub submit_latency: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let c = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

fn histogram(registry: &Registry, name: &str, help: &str, buckets: Vec<f64>) -> prometheus::Result<Histogram> {
    let h = Histogram::with_opts(HistogramOpts::new(name, help).buckets(buckets))?;
    registry.register(Box::new(h.clone()))?;
    Ok(h)
}

impl Metrics {
    /// Create a new, independent registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        Ok(Self {
            envelopes_built: counter(&registry, "envelopes_built_total", "Envelopes compiled, measured and signed")?,
            bundles_submitted: counter(&registry, "bundles_submitted_total", "Bundles handed to the relay")?,
            bundles_accepted: counter(&registry, "bundles_accepted_total", "Bundles accepted by the relay")?,
            bundles_dropped: counter(&registry, "bundles_dropped_total", "Bundles dropped for lack of a leader")?,
            bundles_transport_errors: counter(
                &registry,
                "bundles_transport_errors_total",
                "Bundles rejected or lost in transport",
            )?,
            guardrail_rejections: counter(&registry, "guardrail_rejections_total", "Sell requests rejected by the price impact cap")?,
            size_rejections: counter(&registry, "size_rejections_total", "Envelopes rejected for exceeding the packet size")?,
            table_poll_attempts: counter(&registry, "table_poll_attempts_total", "Address table read-back attempts")?,
            wallets_skipped: counter(&registry, "wallets_skipped_total", "Wallets skipped for missing or zero allocation")?,
            envelope_size: histogram(
                &registry,
                "envelope_size_bytes",
                "Serialized envelope size",
                vec![256.0, 512.0, 768.0, 1024.0, 1128.0, 1200.0, 1232.0],
            )?,
            build_latency: histogram(
                &registry,
                "bundle_build_latency_seconds",
                "Pure bundle build latency",
                vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5],
            )?,
            submit_latency: histogram(
                &registry,
                "bundle_submit_latency_seconds",
                "Relay submission latency",
                vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0],
            )?,
            registry,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Global metrics instance, `None` if registration failed
pub fn metrics() -> Option<&'static Metrics> {
    static METRICS: once_cell::sync::Lazy<Option<Metrics>> = once_cell::sync::Lazy::new(|| {
        Metrics::new()
            .map_err(|e| tracing::error!(error = %e, "Failed to initialize metrics"))
            .ok()
    });
    METRICS.as_ref()
}

/// Apply `f` to the global metrics when available
pub fn with_metrics(f: impl FnOnce(&Metrics)) {
    if let Some(m) = metrics() {
        f(m);
    }
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn observe(self, select: impl FnOnce(&Metrics) -> &Histogram) {
        let secs = self.elapsed_secs();
        with_metrics(|m| select(m).observe(secs));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_pipeline_metrics() {
        let m = Metrics::new().unwrap();
        m.envelopes_built.inc();
        m.envelope_size.observe(1100.0);
        let text = m.render();
        assert!(text.contains("envelopes_built_total 1"));
        assert!(text.contains("envelope_size_bytes_bucket"));
        assert!(text.contains("guardrail_rejections_total 0"));
    }

    #[test]
    fn test_global_metrics_available() {
        assert!(metrics().is_some());
        let before = metrics().unwrap().table_poll_attempts.get();
        with_metrics(|m| m.table_poll_attempts.inc());
        assert!(metrics().unwrap().table_poll_attempts.get() > before);
    }

    #[test]
    fn test_timer_observes_histogram() {
        let timer = Timer::start();
        let count_before = metrics().unwrap().build_latency.get_sample_count();
        timer.observe(|m| &m.build_latency);
        assert!(metrics().unwrap().build_latency.get_sample_count() > count_before);
    }
}
