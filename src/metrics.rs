//! Processing telemetry
//!
//! ## Table of Contents
//! - **ProcessorMetrics**: Prometheus registry fed by the source processor
//! - **Timer**: Wall-clock timer for the filter and split phases

use crate::error::Result;
use prometheus::{Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

use crate::types::SourceKind;

/// Metrics recorded while filtering and splitting sources
pub struct ProcessorMetrics {
    registry: Registry,

    // Source metrics
    pub sources_processed: CounterVec,
    pub sources_discarded: Counter,
    pub split_sources: Counter,
    pub empty_groups: Counter,

    // Timing metrics
    pub filter_seconds: Histogram,
    pub split_seconds: Histogram,
}

impl ProcessorMetrics {
    /// Create and register all metrics
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let sources_processed = CounterVec::new(
            Opts::new("quake_sources_processed_total", "Sources filtered and split"),
            &["kind", "mode"],
        )?;
        let sources_discarded = Counter::new(
            "quake_sources_discarded_total",
            "Sources with no site within the maximum distance",
        )?;
        let split_sources = Counter::new(
            "quake_split_sources_total",
            "Sub-sources produced by splitting",
        )?;
        let empty_groups = Counter::new(
            "quake_empty_groups_total",
            "Groups left without sources after processing",
        )?;

        let filter_seconds = Histogram::with_opts(
            HistogramOpts::new("quake_filter_seconds", "Time spent filtering a source")
                .buckets(vec![0.0001, 0.001, 0.01, 0.1, 1.0, 10.0]),
        )?;
        let split_seconds = Histogram::with_opts(
            HistogramOpts::new("quake_split_seconds", "Time spent splitting a source")
                .buckets(vec![0.0001, 0.001, 0.01, 0.1, 1.0, 10.0]),
        )?;

        registry.register(Box::new(sources_processed.clone()))?;
        registry.register(Box::new(sources_discarded.clone()))?;
        registry.register(Box::new(split_sources.clone()))?;
        registry.register(Box::new(empty_groups.clone()))?;
        registry.register(Box::new(filter_seconds.clone()))?;
        registry.register(Box::new(split_seconds.clone()))?;

        Ok(Self {
            registry,
            sources_processed,
            sources_discarded,
            split_sources,
            empty_groups,
            filter_seconds,
            split_seconds,
        })
    }

    /// Get the underlying registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record one processed source
    pub fn record_source(&self, kind: SourceKind, parallel: bool, num_split: usize, filter_time: f64, split_time: f64) {
        let mode = if parallel { "parallel" } else { "sequential" };
        self.sources_processed
            .with_label_values(&[kind.as_str(), mode])
            .inc();
        if num_split == 0 {
            self.sources_discarded.inc();
        }
        self.split_sources.inc_by(num_split as f64);
        self.filter_seconds.observe(filter_time);
        self.split_seconds.observe(split_time);
    }

    /// Record a group left without sources
    pub fn record_empty_group(&self) {
        self.empty_groups.inc();
    }

    /// Gather all metrics as Prometheus text format
    pub fn gather_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::error::CompositeError::metrics(e.to_string()))
    }
}

impl std::fmt::Debug for ProcessorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorMetrics").finish_non_exhaustive()
    }
}

/// Timer for measuring operation duration
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Get elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Stop and return elapsed seconds
    pub fn stop(self) -> f64 {
        self.elapsed_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = ProcessorMetrics::new().unwrap();
        assert!(metrics.gather_text().is_ok());
    }

    #[test]
    fn test_source_metrics() {
        let metrics = ProcessorMetrics::new().unwrap();

        metrics.record_source(SourceKind::Point, false, 1, 0.001, 0.002);
        metrics.record_source(SourceKind::SimpleFault, true, 4, 0.01, 0.02);
        metrics.record_source(SourceKind::SimpleFault, true, 0, 0.01, 0.0);
        metrics.record_empty_group();

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("quake_sources_discarded_total 1"));
        assert!(text.contains("quake_split_sources_total 5"));
        assert!(text.contains("quake_empty_groups_total 1"));
        assert!(text.contains(r#"quake_sources_processed_total{kind="SimpleFaultSource",mode="parallel"} 2"#));
        assert!(text.contains("quake_filter_seconds_count 3"));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = timer.stop();
        assert!(elapsed >= 0.01);
    }
}
