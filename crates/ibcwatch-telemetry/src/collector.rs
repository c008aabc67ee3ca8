//! The collector contract.
//!
//! A collector declares the gauge families it can produce and, on each scrape,
//! pushes its samples into a bounded sink. Collectors hold their own
//! configuration; nothing is read from process-wide state.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Static description of one gauge family
#[derive(Debug, PartialEq, Eq)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
    /// Label names, in the order samples supply their values
    pub labels: &'static [&'static str],
}

/// One gauge value with its label values
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub desc: &'static MetricDesc,
    pub value: f64,
    pub labels: Vec<String>,
}

impl Sample {
    pub fn new(desc: &'static MetricDesc, value: f64, labels: Vec<String>) -> Self {
        Self {
            desc,
            value,
            labels,
        }
    }

    /// Value of the named label, if the descriptor declares it
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .labels
            .iter()
            .position(|l| *l == name)
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
    }
}

/// Where collectors deliver samples. Each send is one unit of work (a path,
/// an account) and is either delivered whole or not at all.
pub type SampleSink = mpsc::Sender<Vec<Sample>>;

/// A source of samples driven by scrapes
#[async_trait]
pub trait Collector: Send + Sync {
    /// Registry key; one collector per name
    fn name(&self) -> &'static str;

    /// Every family this collector may emit
    fn describe(&self) -> Vec<&'static MetricDesc>;

    /// Produce samples into `sink`. Work still running when `cancel` fires must
    /// stop without sending.
    async fn collect(&self, cancel: CancellationToken, sink: SampleSink);
}

#[cfg(test)]
mod tests {
    use super::*;

    static DESC: MetricDesc = MetricDesc {
        name: "test_gauge",
        help: "Test gauge",
        labels: &["chain_id", "status"],
    };

    #[test]
    fn test_sample_label_lookup() {
        let sample = Sample::new(&DESC, 1.0, vec!["archway-1".into(), "success".into()]);
        assert_eq!(sample.label("chain_id"), Some("archway-1"));
        assert_eq!(sample.label("status"), Some("success"));
        assert_eq!(sample.label("denom"), None);
    }
}
