use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

/// Routing counters, registered on a caller-owned registry.
#[derive(Clone)]
pub struct RouterMetrics {
    pub routes_total: IntCounterVec,
    pub registry_failures_total: IntCounter,
    pub probe_failures_total: IntCounter,
    pub dispatch_failures_total: IntCounterVec,
    pub dispatch_latency_seconds: Histogram,
}

impl RouterMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let routes_total = IntCounterVec::new(
            Opts::new("hostroute_routes_total", "Routing attempts by dispatch mode"),
            &["mode"],
        )?;
        let registry_failures_total = IntCounter::new(
            "hostroute_registry_failures_total",
            "Routing attempts aborted by a registry failure",
        )?;
        let probe_failures_total = IntCounter::new(
            "hostroute_probe_failures_total",
            "Candidates excluded as misconfigured or unreachable",
        )?;
        let dispatch_failures_total = IntCounterVec::new(
            Opts::new(
                "hostroute_dispatch_failures_total",
                "Failed dispatches by failure kind",
            ),
            &["kind"],
        )?;
        let dispatch_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "hostroute_dispatch_latency_seconds",
            "Per-candidate dispatch latency",
        ))?;

        registry.register(Box::new(routes_total.clone()))?;
        registry.register(Box::new(registry_failures_total.clone()))?;
        registry.register(Box::new(probe_failures_total.clone()))?;
        registry.register(Box::new(dispatch_failures_total.clone()))?;
        registry.register(Box::new(dispatch_latency_seconds.clone()))?;

        Ok(Self {
            routes_total,
            registry_failures_total,
            probe_failures_total,
            dispatch_failures_total,
            dispatch_latency_seconds,
        })
    }
}
