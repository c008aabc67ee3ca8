//! Metrics registry for swappable collectors.
//!
//! Collectors are looked up by name and can be registered, replaced or removed
//! while the exporter runs. A scrape snapshots the current set, releases the
//! lock and only then runs the collectors, so a concurrent swap never waits on
//! network I/O and an in-flight scrape keeps the generation it started with.

use prometheus::{
    proto::MetricFamily, Encoder, GaugeVec, Histogram, HistogramOpts, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::collector::{Collector, MetricDesc, Sample};
use crate::types::{MetricError, MetricResult};

/// Capacity of the per-scrape sample channel
const SAMPLE_BUFFER: usize = 64;

/// Registry of named collectors plus the exporter's own metrics
pub struct MetricsRegistry {
    collectors: RwLock<BTreeMap<&'static str, Arc<dyn Collector>>>,
    scrape_timeout: Duration,
    /// Self-metrics, encoded alongside collector output
    internal: Registry,
    scrape_duration: Histogram,
    refresh_total: IntCounterVec,
    config_generation: IntGauge,
}

impl MetricsRegistry {
    /// Create an empty registry whose scrapes are bounded by `scrape_timeout`
    pub fn new(scrape_timeout: Duration) -> MetricResult<Self> {
        let internal = Registry::new();

        let scrape_duration = Histogram::with_opts(HistogramOpts::new(
            "ibcwatch_scrape_duration_seconds",
            "Time spent running collectors for one scrape",
        ))?;
        let refresh_total = IntCounterVec::new(
            Opts::new("ibcwatch_refresh_total", "Collector refresh attempts"),
            &["result"],
        )?;
        let config_generation = IntGauge::new(
            "ibcwatch_config_generation",
            "Generation number of the active path configuration",
        )?;

        internal.register(Box::new(scrape_duration.clone()))?;
        internal.register(Box::new(refresh_total.clone()))?;
        internal.register(Box::new(config_generation.clone()))?;

        Ok(Self {
            collectors: RwLock::new(BTreeMap::new()),
            scrape_timeout,
            internal,
            scrape_duration,
            refresh_total,
            config_generation,
        })
    }

    /// Add a collector; fails if the name is taken
    pub async fn register(&self, collector: Arc<dyn Collector>) -> MetricResult<()> {
        let mut collectors = self.collectors.write().await;
        let name = collector.name();
        if collectors.contains_key(name) {
            return Err(MetricError::RegistrationFailed(format!(
                "collector {name} already registered"
            )));
        }
        collectors.insert(name, collector);
        debug!(collector = name, "Registered collector");
        Ok(())
    }

    /// Install `replacements` under one write lock, replacing collectors with
    /// the same names. Returns the collectors that were replaced.
    pub async fn swap<I>(&self, replacements: I) -> Vec<Arc<dyn Collector>>
    where
        I: IntoIterator<Item = Arc<dyn Collector>>,
    {
        let mut collectors = self.collectors.write().await;
        let mut replaced = Vec::new();
        for collector in replacements {
            let name = collector.name();
            if let Some(old) = collectors.insert(name, collector) {
                replaced.push(old);
            }
            debug!(collector = name, "Swapped collector");
        }
        replaced
    }

    pub async fn unregister(&self, name: &str) -> Option<Arc<dyn Collector>> {
        self.collectors.write().await.remove(name)
    }

    /// Names of registered collectors, sorted
    pub async fn collector_names(&self) -> Vec<&'static str> {
        self.collectors.read().await.keys().copied().collect()
    }

    pub fn record_refresh(&self, success: bool) {
        let result = if success { "success" } else { "error" };
        self.refresh_total.with_label_values(&[result]).inc();
    }

    pub fn set_config_generation(&self, generation: u64) {
        self.config_generation
            .set(i64::try_from(generation).unwrap_or(i64::MAX));
    }

    /// Run every registered collector and gather what they send.
    pub async fn collect(&self, cancel: &CancellationToken) -> Vec<Sample> {
        let snapshot = self.snapshot().await;
        self.run(snapshot, cancel).await
    }

    /// Run one scrape and encode the result in Prometheus text format
    pub async fn scrape(&self, cancel: &CancellationToken) -> MetricResult<String> {
        let timer = self.scrape_duration.start_timer();
        let snapshot = self.snapshot().await;
        let descs: Vec<&'static MetricDesc> =
            snapshot.iter().flat_map(|c| c.describe()).collect();
        let samples = self.run(snapshot, cancel).await;
        timer.observe_duration();

        let mut families = self.internal.gather();
        families.extend(build_families(&descs, &samples)?);
        encode(&families)
    }

    /// Current collectors; the read lock is released on return
    async fn snapshot(&self) -> Vec<Arc<dyn Collector>> {
        self.collectors.read().await.values().cloned().collect()
    }

    /// Collectors run concurrently under a child of `cancel`. When the scrape
    /// timeout passes the child is cancelled and whatever was already sent is
    /// kept.
    async fn run(&self, snapshot: Vec<Arc<dyn Collector>>, cancel: &CancellationToken) -> Vec<Sample> {
        let scrape = cancel.child_token();
        let (tx, mut rx) = mpsc::channel(SAMPLE_BUFFER);
        let mut tasks = JoinSet::new();

        for collector in snapshot {
            let sink = tx.clone();
            let token = scrape.clone();
            tasks.spawn(async move { collector.collect(token, sink).await });
        }
        drop(tx);

        let deadline = tokio::time::sleep(self.scrape_timeout);
        tokio::pin!(deadline);

        let mut samples = Vec::new();
        loop {
            tokio::select! {
                batch = rx.recv() => match batch {
                    Some(batch) => samples.extend(batch),
                    None => break,
                },
                _ = &mut deadline, if !scrape.is_cancelled() => {
                    warn!(timeout = ?self.scrape_timeout, "Scrape deadline reached, cancelling collectors");
                    scrape.cancel();
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Collector task failed");
            }
        }

        samples
    }
}

/// Build a scrape-local registry from descriptors and fill it with samples
fn build_families(
    descs: &[&'static MetricDesc],
    samples: &[Sample],
) -> MetricResult<Vec<MetricFamily>> {
    let registry = Registry::new();
    let mut gauges: HashMap<&'static str, (&'static MetricDesc, GaugeVec)> = HashMap::new();

    for desc in descs {
        if let Some((known, _)) = gauges.get(desc.name) {
            if known.labels != desc.labels {
                warn!(metric = desc.name, "Conflicting descriptors, keeping the first");
            }
            continue;
        }
        let gauge = GaugeVec::new(Opts::new(desc.name, desc.help), desc.labels)?;
        registry.register(Box::new(gauge.clone()))?;
        gauges.insert(desc.name, (desc, gauge));
    }

    for sample in samples {
        if let Err(e) = set_sample(&gauges, sample) {
            warn!(error = %e, "Dropping sample");
        }
    }

    Ok(registry.gather())
}

fn set_sample(
    gauges: &HashMap<&'static str, (&'static MetricDesc, GaugeVec)>,
    sample: &Sample,
) -> MetricResult<()> {
    let (_, gauge) = gauges
        .get(sample.desc.name)
        .ok_or_else(|| MetricError::InvalidSample {
            metric: sample.desc.name.to_string(),
            reason: "family not described by any registered collector".to_string(),
        })?;

    let values: Vec<&str> = sample.labels.iter().map(String::as_str).collect();
    gauge
        .get_metric_with_label_values(&values)
        .map_err(|e| MetricError::InvalidSample {
            metric: sample.desc.name.to_string(),
            reason: e.to_string(),
        })?
        .set(sample.value);
    Ok(())
}

fn encode(families: &[MetricFamily]) -> MetricResult<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(families, &mut buffer)
        .map_err(|e| MetricError::EncodingFailed(e.to_string()))?;

    String::from_utf8(buffer).map_err(|e| MetricError::EncodingFailed(e.to_string()))
}
