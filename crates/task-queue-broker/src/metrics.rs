use prometheus::{CounterVec, Histogram, HistogramOpts, IntGauge, Opts, Registry};

/// Prometheus metrics for the broker.
pub struct BrokerMetrics {
    pub registry: Registry,

    pub submissions_total: CounterVec,
    pub queries_total: CounterVec,
    pub reschedules_total: CounterVec,

    pub pending_tasks: IntGauge,
    pub timing_wheel_depth: IntGauge,

    pub publish_duration: Histogram,
}

impl BrokerMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let submissions_total = CounterVec::new(
            Opts::new("tq_submissions_total", "Total submitted tasks by task_type"),
            &["task_type"],
        )?;
        registry.register(Box::new(submissions_total.clone()))?;

        let queries_total = CounterVec::new(
            Opts::new("tq_queries_total", "Total result queries by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(queries_total.clone()))?;

        let reschedules_total = CounterVec::new(
            Opts::new("tq_reschedules_total", "Total reschedule decisions by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(reschedules_total.clone()))?;

        let pending_tasks = IntGauge::new("tq_pending_tasks", "Size of the pending request set")?;
        registry.register(Box::new(pending_tasks.clone()))?;

        let timing_wheel_depth =
            IntGauge::new("tq_timing_wheel_depth", "Entries staged on the timing wheel")?;
        registry.register(Box::new(timing_wheel_depth.clone()))?;

        let publish_duration = Histogram::with_opts(HistogramOpts::new(
            "tq_publish_duration_seconds",
            "Time spent writing a task into the store",
        ))?;
        registry.register(Box::new(publish_duration.clone()))?;

        Ok(BrokerMetrics {
            registry,
            submissions_total,
            queries_total,
            reschedules_total,
            pending_tasks,
            timing_wheel_depth,
            publish_duration,
        })
    }

    pub fn inc_submission(&self, task_type: &str) {
        self.submissions_total.with_label_values(&[task_type]).inc();
    }

    pub fn inc_query(&self, outcome: &str) {
        self.queries_total.with_label_values(&[outcome]).inc();
    }

    pub fn inc_reschedule(&self, outcome: &str) {
        self.reschedules_total.with_label_values(&[outcome]).inc();
    }

    pub fn observe_publish_duration(&self, duration_secs: f64) {
        self.publish_duration.observe(duration_secs);
    }
}

impl Default for BrokerMetrics {
    fn default() -> Self {
        Self::new().expect("failed to create broker metrics")
    }
}
