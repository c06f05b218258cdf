use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::metrics::counter::Counter;

/// Metrics for the [`Cache`](super::Cache)
#[derive(Default, Debug)]
pub struct Metrics {
    /// Number of roster refreshes started
    pub refreshes: Counter,
    /// Number of roster refreshes whose listing call failed
    pub refresh_failures: Counter,
    /// Number of listed records dropped because their lookup failed
    pub dropped: Counter,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Metrics::default();
        context.register(
            "refreshes",
            "Number of roster refreshes started",
            metrics.refreshes.clone(),
        );
        context.register(
            "refresh_failures",
            "Number of roster refreshes whose listing call failed",
            metrics.refresh_failures.clone(),
        );
        context.register(
            "dropped",
            "Number of listed records dropped because their lookup failed",
            metrics.dropped.clone(),
        );
        metrics
    }
}
