use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, UpDownCounter};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;

pub mod labels {
    pub const ERROR_TYPE: &str = "error_type";
    pub const PATH: &str = "path";
    pub const RESULT: &str = "result";
    pub const STATUS_CODE: &str = "status_code";
    pub const METHOD: &str = "method";
    pub const VERSION: &str = "version";
    pub const RUST_VERSION: &str = "rust_version";
}

pub mod values {
    /// Admitted because the window count was within the limit
    pub const PATH_WINDOW: &str = "window";
    /// Admitted because the gate yielded a token
    pub const PATH_GATE: &str = "gate";

    pub const NOTIFY_DELIVERED: &str = "delivered";
    pub const NOTIFY_FAILED: &str = "failed";
    pub const NOTIFY_SKIPPED: &str = "skipped";
}

#[derive(Clone)]
pub struct Metrics {
    pub connections_total: Counter<u64>,
    pub connections_active: UpDownCounter<i64>,

    pub requests_total: Counter<u64>,
    pub requests_duration_seconds: Histogram<f64>,

    pub backend_errors_total: Counter<u64>,
    pub backend_duration_seconds: Histogram<f64>,

    // Rate limiting metrics
    pub rate_limit_allowed_total: Counter<u64>,
    pub rate_limit_rejected_total: Counter<u64>,
    pub notifications_total: Counter<u64>,

    // Client registry metrics
    pub clients_evicted_total: Counter<u64>,
    pub tracked_clients: Gauge<u64>,

    // Build info
    pub build_info: Gauge<u64>,
}

impl Metrics {
    fn new(meter: Meter) -> Self {
        Self {
            connections_total: meter
                .u64_counter("throttle_connections_total")
                .with_description("Total number of connections accepted")
                .build(),
            connections_active: meter
                .i64_up_down_counter("throttle_connections_active")
                .with_description("Number of active connections")
                .build(),

            requests_total: meter
                .u64_counter("throttle_requests_total")
                .with_description("Total number of requests processed")
                .build(),
            requests_duration_seconds: meter
                .f64_histogram("throttle_request_duration_seconds")
                .with_description("Request duration in seconds")
                .build(),

            backend_errors_total: meter
                .u64_counter("throttle_backend_errors_total")
                .with_description("Total number of failed backend requests")
                .build(),
            backend_duration_seconds: meter
                .f64_histogram("throttle_backend_duration_seconds")
                .with_description("Backend response head latency in seconds")
                .build(),

            rate_limit_allowed_total: meter
                .u64_counter("throttle_rate_limit_allowed_total")
                .with_description("Total number of requests admitted by the rate limiter")
                .build(),
            rate_limit_rejected_total: meter
                .u64_counter("throttle_rate_limit_rejected_total")
                .with_description("Total number of requests rejected by the rate limiter")
                .build(),
            notifications_total: meter
                .u64_counter("throttle_notifications_total")
                .with_description("Total number of rate limit notifications attempted")
                .build(),

            clients_evicted_total: meter
                .u64_counter("throttle_clients_evicted_total")
                .with_description("Total number of idle clients evicted from the registry")
                .build(),
            tracked_clients: meter
                .u64_gauge("throttle_tracked_clients")
                .with_description("Number of clients tracked after the last eviction sweep")
                .build(),

            build_info: meter
                .u64_gauge("throttle_build_info")
                .with_description("Build information")
                .build(),
        }
    }

    /// Set build info metric with version labels
    pub fn set_build_info(&self) {
        let version = env!("CARGO_PKG_VERSION");
        let rust_version = env!("CARGO_PKG_RUST_VERSION");

        self.build_info.record(
            1,
            &[
                KeyValue::new(labels::VERSION, version),
                KeyValue::new(labels::RUST_VERSION, rust_version),
            ],
        );
    }

    pub fn record_rate_limit_allowed(&self, gate_consulted: bool) {
        let path = if gate_consulted { values::PATH_GATE } else { values::PATH_WINDOW };
        self.rate_limit_allowed_total
            .add(1, &[KeyValue::new(labels::PATH, path)]);
    }

    pub fn record_rate_limit_rejection(&self) {
        self.rate_limit_rejected_total.add(1, &[]);
    }

    pub fn record_notification(&self, result: &'static str) {
        self.notifications_total
            .add(1, &[KeyValue::new(labels::RESULT, result)]);
    }

    pub fn record_backend_error(&self, error_type: &str) {
        self.backend_errors_total
            .add(1, &[KeyValue::new(labels::ERROR_TYPE, error_type.to_string())]);
    }

    pub fn record_backend_duration(&self, duration: f64, status_code: u16) {
        self.backend_duration_seconds.record(
            duration,
            &[KeyValue::new(labels::STATUS_CODE, status_code.to_string())],
        );
    }

    pub fn record_request(&self, method: &str, status_code: u16) {
        self.requests_total.add(
            1,
            &[
                KeyValue::new(labels::METHOD, method.to_string()),
                KeyValue::new(labels::STATUS_CODE, status_code.to_string()),
            ],
        );
    }

    pub fn record_request_duration(&self, duration: f64, method: &str, status_code: u16) {
        self.requests_duration_seconds.record(
            duration,
            &[
                KeyValue::new(labels::METHOD, method.to_string()),
                KeyValue::new(labels::STATUS_CODE, status_code.to_string()),
            ],
        );
    }

    pub fn record_clients_evicted(&self, count: u64) {
        if count > 0 {
            self.clients_evicted_total.add(count, &[]);
        }
    }

    pub fn set_tracked_clients(&self, count: u64) {
        self.tracked_clients.record(count, &[]);
    }
}

pub fn init_metrics() -> Result<(Arc<Metrics>, Registry), Box<dyn std::error::Error + Send + Sync>>
{
    let registry = Registry::default();

    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;

    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

    global::set_meter_provider(meter_provider);

    let meter = global::meter("throttle-proxy");
    let metrics = Arc::new(Metrics::new(meter));

    metrics.set_build_info();

    Ok((metrics, registry))
}
