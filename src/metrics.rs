use crate::breaker::CircuitState;
use crate::discovery::CycleStats;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics exporter for this service's own
/// telemetry.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();

    let handle = builder
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    init_metric_descriptions();

    handle
}

fn init_metric_descriptions() {
    describe_counter!(
        "promsage_backend_requests_total",
        "Backend requests by operation and outcome"
    );
    describe_gauge!(
        "promsage_circuit_state",
        "Circuit breaker state (0=closed, 1=half-open, 2=open)"
    );
    describe_counter!(
        "promsage_discovery_cycles_total",
        "Completed discovery cycles"
    );
    describe_counter!(
        "promsage_discovery_services_synced_total",
        "Catalog writes performed by discovery cycles"
    );
    describe_counter!(
        "promsage_discovery_write_failures_total",
        "Catalog writes that failed during discovery cycles"
    );
    describe_counter!(
        "promsage_query_rejections_total",
        "Queries rejected by the safety validator, by violation kind"
    );

    gauge!("promsage_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record a breaker-wrapped backend request outcome
pub fn record_backend_request(operation: &str, outcome: &str) {
    counter!(
        "promsage_backend_requests_total",
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string(),
    )
    .increment(1);
}

/// Record a circuit breaker state transition
pub fn update_circuit_state(name: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("promsage_circuit_state", "breaker" => name.to_string()).set(value);
}

/// Record the outcome of one discovery cycle
pub fn record_discovery_cycle(stats: &CycleStats) {
    counter!("promsage_discovery_cycles_total").increment(1);
    counter!("promsage_discovery_services_synced_total").increment(stats.services_synced as u64);
    counter!("promsage_discovery_write_failures_total").increment(stats.write_failures as u64);
}

/// Record a query rejected by the safety validator
pub fn record_query_rejection(kind: &str) {
    counter!(
        "promsage_query_rejections_total",
        "kind" => kind.to_string(),
    )
    .increment(1);
}
