use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::metrics::counter::Counter;

/// Metrics for the [`Gateway`](super::Gateway)
#[derive(Default, Debug)]
pub struct Metrics {
    /// Number of contract reads issued
    pub reads: Counter,
    /// Number of contract reads that failed
    pub read_failures: Counter,
    /// Number of transactions submitted
    pub writes: Counter,
    /// Number of transactions that were rejected, reverted or not confirmed
    pub write_failures: Counter,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Metrics::default();
        context.register("reads", "Number of contract reads issued", metrics.reads.clone());
        context.register(
            "read_failures",
            "Number of contract reads that failed",
            metrics.read_failures.clone(),
        );
        context.register(
            "writes",
            "Number of transactions submitted",
            metrics.writes.clone(),
        );
        context.register(
            "write_failures",
            "Number of transactions that were rejected, reverted or not confirmed",
            metrics.write_failures.clone(),
        );
        metrics
    }
}
