use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry, register_histogram_with_registry,
    Counter, CounterVec, Histogram, Registry,
};
use std::sync::Arc;

pub struct ProxyMetrics {
    pub adapter_operations: CounterVec,
    pub handshakes: Counter,
    pub handshake_failures: Counter,
    pub gate_rejections: Counter,
    pub request_latency: Histogram,
    pub registry: Arc<Registry>,
}

impl ProxyMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Arc::new(Registry::new());

        let adapter_operations = register_counter_vec_with_registry!(
            "recorder_proxy_adapter_operations_total",
            "Adapter operations by name and outcome",
            &["operation", "outcome"],
            registry
        )?;

        let handshakes = register_counter_with_registry!(
            "recorder_proxy_vendor_handshakes_total",
            "Login handshakes attempted against the vendor",
            registry
        )?;

        let handshake_failures = register_counter_with_registry!(
            "recorder_proxy_vendor_handshake_failures_total",
            "Login handshakes that failed",
            registry
        )?;

        let gate_rejections = register_counter_with_registry!(
            "recorder_proxy_gate_rejections_total",
            "Requests rejected by the credential gate",
            registry
        )?;

        let request_latency = register_histogram_with_registry!(
            "recorder_proxy_request_latency_seconds",
            "Route latency in seconds",
            registry
        )?;

        Ok(Self {
            adapter_operations,
            handshakes,
            handshake_failures,
            gate_rejections,
            request_latency,
            registry,
        })
    }

    pub fn record_operation(&self, operation: &str, outcome: &str) {
        self.adapter_operations
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
