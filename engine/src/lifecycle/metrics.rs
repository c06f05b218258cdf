use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::metrics::counter::Counter;

/// Metrics for the [`Controller`](super::Controller)
#[derive(Default, Debug)]
pub struct Metrics {
    /// Number of winner declarations submitted
    pub declarations: Counter,
    /// Number of declare triggers suppressed by the latch
    pub suppressed: Counter,
    /// Number of countdowns armed
    pub countdowns: Counter,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Metrics::default();
        context.register(
            "declarations",
            "Number of winner declarations submitted",
            metrics.declarations.clone(),
        );
        context.register(
            "suppressed",
            "Number of declare triggers suppressed by the latch",
            metrics.suppressed.clone(),
        );
        context.register(
            "countdowns",
            "Number of countdowns armed",
            metrics.countdowns.clone(),
        );
        metrics
    }
}
