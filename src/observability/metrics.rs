use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub optimization_runs_total: IntCounterVec,
    pub optimization_latency_seconds: HistogramVec,
    pub optimization_polls_total: IntCounterVec,
    pub import_rows_total: IntCounterVec,
    pub notifications_total: IntCounterVec,
    pub store_deliveries: IntGaugeVec,
    pub store_drivers: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let optimization_runs_total = IntCounterVec::new(
            Opts::new("optimization_runs_total", "Optimization runs by outcome"),
            &["outcome"],
        )
        .expect("valid optimization_runs_total metric");

        let optimization_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "optimization_latency_seconds",
                "Wall time from submission to applied solution in seconds",
            )
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
            &["variant"],
        )
        .expect("valid optimization_latency_seconds metric");

        let optimization_polls_total = IntCounterVec::new(
            Opts::new("optimization_polls_total", "Job status polls by reported state"),
            &["state"],
        )
        .expect("valid optimization_polls_total metric");

        let import_rows_total = IntCounterVec::new(
            Opts::new("import_rows_total", "CSV import rows by outcome"),
            &["outcome"],
        )
        .expect("valid import_rows_total metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Customer notifications by outcome"),
            &["outcome"],
        )
        .expect("valid notifications_total metric");

        let store_deliveries = IntGaugeVec::new(
            Opts::new("store_deliveries", "Deliveries currently held, by pool"),
            &["pool"],
        )
        .expect("valid store_deliveries metric");

        let store_drivers = IntGauge::new("store_drivers", "Drivers currently held")
            .expect("valid store_drivers metric");

        registry
            .register(Box::new(optimization_runs_total.clone()))
            .expect("register optimization_runs_total");
        registry
            .register(Box::new(optimization_latency_seconds.clone()))
            .expect("register optimization_latency_seconds");
        registry
            .register(Box::new(optimization_polls_total.clone()))
            .expect("register optimization_polls_total");
        registry
            .register(Box::new(import_rows_total.clone()))
            .expect("register import_rows_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(store_deliveries.clone()))
            .expect("register store_deliveries");
        registry
            .register(Box::new(store_drivers.clone()))
            .expect("register store_drivers");

        Self {
            registry,
            optimization_runs_total,
            optimization_latency_seconds,
            optimization_polls_total,
            import_rows_total,
            notifications_total,
            store_deliveries,
            store_drivers,
        }
    }

    pub fn record_store_size(&self, assigned: usize, unassigned: usize, drivers: usize) {
        self.store_deliveries
            .with_label_values(&["assigned"])
            .set(assigned as i64);
        self.store_deliveries
            .with_label_values(&["unassigned"])
            .set(unassigned as i64);
        self.store_drivers.set(drivers as i64);
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
