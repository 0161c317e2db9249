use std::sync::{Arc, OnceLock};

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, IntCounter,
    Opts, Registry, TextEncoder,
};

#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    chunks_processed: Counter,
    rows_processed: Counter,
    chunk_time_seconds: Histogram,
    spill_bytes: CounterVec,
    spill_segments: CounterVec,
    spill_time_seconds: HistogramVec,
    segments_merged: Counter,
    probe_usage_mb: Gauge,
    probe_failures: IntCounter,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    pub fn record_chunk(&self, rows: u64, secs: f64) {
        self.inner.chunks_processed.inc();
        self.inner.rows_processed.inc_by(rows as f64);
        self.inner.chunk_time_seconds.observe(secs.max(0.0));
    }

    pub fn record_spill(&self, reason: &str, bytes: u64, secs: f64) {
        let labels = [reason];
        self.inner
            .spill_bytes
            .with_label_values(&labels)
            .inc_by(bytes as f64);
        self.inner.spill_segments.with_label_values(&labels).inc();
        self.inner
            .spill_time_seconds
            .with_label_values(&labels)
            .observe(secs.max(0.0));
    }

    pub fn record_segments_merged(&self, count: u64) {
        self.inner.segments_merged.inc_by(count as f64);
    }

    pub fn set_probe_usage_mb(&self, mb: f64) {
        self.inner.probe_usage_mb.set(mb);
    }

    pub fn inc_probe_failures(&self) {
        self.inner.probe_failures.inc();
    }

    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let chunks_processed = counter(
            &registry,
            "chunkflow_chunks_processed_total",
            "Chunks transformed",
        );
        let rows_processed = counter(
            &registry,
            "chunkflow_rows_processed_total",
            "Input rows/elements transformed",
        );
        let chunk_time_seconds = histogram(
            &registry,
            "chunkflow_chunk_time_seconds",
            "Time spent transforming one chunk",
        );

        let spill_bytes = counter_vec(
            &registry,
            "chunkflow_spill_bytes_total",
            "Segment bytes written",
            &["reason"],
        );
        let spill_segments = counter_vec(
            &registry,
            "chunkflow_spill_segments_total",
            "Segments written",
            &["reason"],
        );
        let spill_time_seconds = histogram_vec(
            &registry,
            "chunkflow_spill_time_seconds",
            "Segment write time",
            &["reason"],
        );
        let segments_merged = counter(
            &registry,
            "chunkflow_segments_merged_total",
            "Segments read back during merge",
        );

        let probe_usage_mb = Gauge::with_opts(Opts::new(
            "chunkflow_probe_usage_mb",
            "Last process memory reading in MB",
        ))
        .expect("gauge");
        registry
            .register(Box::new(probe_usage_mb.clone()))
            .expect("register gauge");
        let probe_failures = IntCounter::with_opts(Opts::new(
            "chunkflow_probe_failures_total",
            "Memory probe readings that fell back to 0.0",
        ))
        .expect("counter");
        registry
            .register(Box::new(probe_failures.clone()))
            .expect("register counter");

        Self {
            registry,
            chunks_processed,
            rows_processed,
            chunk_time_seconds,
            spill_bytes,
            spill_segments,
            spill_time_seconds,
            segments_merged,
            probe_usage_mb,
            probe_failures,
        }
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> Counter {
    let c = Counter::with_opts(Opts::new(name, help)).expect("counter");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn histogram(registry: &Registry, name: &str, help: &str) -> Histogram {
    let h = Histogram::with_opts(HistogramOpts::new(name, help)).expect("histogram");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let h = HistogramVec::new(HistogramOpts::new(name, help), labels).expect("histogram vec");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

static GLOBAL_METRICS: OnceLock<MetricsRegistry> = OnceLock::new();

pub fn global_metrics() -> &'static MetricsRegistry {
    GLOBAL_METRICS.get_or_init(MetricsRegistry::new)
}
