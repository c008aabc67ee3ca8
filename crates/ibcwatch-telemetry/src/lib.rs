//! Metrics plumbing for ibcwatch.
//!
//! Collectors implement [`Collector`] and are held by a [`MetricsRegistry`]
//! that can swap them at runtime. Each HTTP scrape runs the registered
//! collectors, turns their samples into Prometheus gauges and encodes them in
//! the text exposition format.

pub mod collector;
pub mod http;
pub mod registry;
pub mod types;

pub use collector::{Collector, MetricDesc, Sample, SampleSink};
pub use http::{MetricsServer, MetricsServerConfig};
pub use registry::MetricsRegistry;
pub use types::{MetricError, MetricResult};
