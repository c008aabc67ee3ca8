//! IBC path health collector.

use async_trait::async_trait;
use ibcwatch_chain::{ChainError, ChainSession, SessionBuilder};
use ibcwatch_telemetry::{Collector, MetricDesc, Sample, SampleSink};
use ibcwatch_types::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::expiry::{track_client_expiry, ClientExpiryResult};
use crate::reconcile::{reconcile_path, ChannelReport};
use crate::refresh::ConfigGeneration;
use crate::retry::RetryPolicy;
use crate::open_session;

pub static CLIENT_EXPIRY: MetricDesc = MetricDesc {
    name: "cosmos_ibc_client_expiry",
    help: "Unix time at which the IBC light client expires",
    labels: &[
        "host_chain_id",
        "client_id",
        "target_chain_id",
        "discord_ids",
        "status",
    ],
};

pub static STUCK_PACKETS: MetricDesc = MetricDesc {
    name: "cosmos_ibc_stuck_packets",
    help: "Packets committed on the source chain and not yet received on the destination",
    labels: &[
        "src_channel_id",
        "dst_channel_id",
        "src_chain_id",
        "dst_chain_id",
        "src_chain_height",
        "dst_chain_height",
        "src_chain_name",
        "dst_chain_name",
        "discord_ids",
        "status",
    ],
};

/// Collects client expiry and stuck packets for every path of one
/// configuration generation
#[derive(Clone)]
pub struct IbcCollector {
    generation: Arc<ConfigGeneration>,
    builder: Arc<dyn SessionBuilder>,
    policy: RetryPolicy,
}

/// Label context for one path
struct PathLabels {
    chain_a_id: String,
    chain_b_id: String,
    discord_ids: String,
}

impl IbcCollector {
    pub const NAME: &'static str = "ibc";

    pub fn new(
        generation: Arc<ConfigGeneration>,
        builder: Arc<dyn SessionBuilder>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            generation,
            builder,
            policy,
        }
    }

    pub fn generation(&self) -> &ConfigGeneration {
        &self.generation
    }

    /// Samples for one path, or `None` if the path was cancelled
    pub async fn collect_path(&self, path: &Path, cancel: &CancellationToken) -> Option<Vec<Sample>> {
        let rpcs = &self.generation.rpcs;
        let rpc_a = rpcs.get(&path.chain_1.chain_name);
        let rpc_b = rpcs.get(&path.chain_2.chain_name);

        let (a, b) = tokio::join!(
            open_session(
                &*self.builder,
                &path.chain_1.chain_name,
                rpc_a,
                Some(path.chain_1.client_id.as_str()),
                &self.policy,
                cancel,
            ),
            open_session(
                &*self.builder,
                &path.chain_2.chain_name,
                rpc_b,
                Some(path.chain_2.client_id.as_str()),
                &self.policy,
                cancel,
            ),
        );
        let a = opened(path, &path.chain_1.chain_name, a)?;
        let b = opened(path, &path.chain_2.chain_name, b)?;

        let reconcile = async {
            match (a.as_deref(), b.as_deref()) {
                (Some(a), Some(b)) => {
                    reconcile_path(a, b, &path.channels, &self.policy, cancel).await
                }
                _ => Ok(path.concrete_channels().map(ChannelReport::failed).collect()),
            }
        };
        let (expiry, reports) = tokio::join!(
            track_client_expiry(a.as_deref(), b.as_deref(), &self.policy, cancel),
            reconcile,
        );

        let (expiry, reports) = match (expiry, reports) {
            (Ok(expiry), Ok(reports)) => (expiry, reports),
            _ => {
                debug!(path = %path.name(), "Path collection cancelled");
                return None;
            }
        };

        let labels = PathLabels {
            chain_a_id: rpc_a
                .map(|r| r.chain_id.clone())
                .unwrap_or_else(|| path.chain_1.chain_name.clone()),
            chain_b_id: rpc_b
                .map(|r| r.chain_id.clone())
                .unwrap_or_else(|| path.chain_2.chain_name.clone()),
            discord_ids: path.discord_ids(),
        };

        let mut samples = expiry_samples(path, &labels, &expiry);
        for report in &reports {
            samples.extend(stuck_samples(path, &labels, report));
        }
        Some(samples)
    }
}

/// A failed open becomes a missing session; cancellation ends the path
fn opened(
    path: &Path,
    chain_name: &str,
    result: ibcwatch_chain::Result<Arc<dyn ChainSession>>,
) -> Option<Option<Arc<dyn ChainSession>>> {
    match result {
        Ok(session) => Some(Some(session)),
        Err(ChainError::Cancelled) => None,
        Err(e) => {
            warn!(path = %path.name(), chain_name, error = %e, "Failed to open chain session");
            Some(None)
        }
    }
}

fn expiry_samples(path: &Path, labels: &PathLabels, expiry: &ClientExpiryResult) -> Vec<Sample> {
    let status = expiry.status.as_str().to_string();
    vec![
        Sample::new(
            &CLIENT_EXPIRY,
            expiry.chain_a_expiration.timestamp() as f64,
            vec![
                labels.chain_a_id.clone(),
                path.chain_1.client_id.clone(),
                labels.chain_b_id.clone(),
                labels.discord_ids.clone(),
                status.clone(),
            ],
        ),
        Sample::new(
            &CLIENT_EXPIRY,
            expiry.chain_b_expiration.timestamp() as f64,
            vec![
                labels.chain_b_id.clone(),
                path.chain_2.client_id.clone(),
                labels.chain_a_id.clone(),
                labels.discord_ids.clone(),
                status,
            ],
        ),
    ]
}

/// One sample per direction; `src_*` labels always describe the sender
fn stuck_samples(path: &Path, labels: &PathLabels, report: &ChannelReport) -> [Sample; 2] {
    let channel = &report.channel;
    let forward = Sample::new(
        &STUCK_PACKETS,
        report.sequences.src.len() as f64,
        vec![
            channel.chain_1.channel_id.clone(),
            channel.chain_2.channel_id.clone(),
            labels.chain_a_id.clone(),
            labels.chain_b_id.clone(),
            report.src_height.to_string(),
            report.dst_height.to_string(),
            path.chain_1.chain_name.clone(),
            path.chain_2.chain_name.clone(),
            labels.discord_ids.clone(),
            report.src_status.as_str().to_string(),
        ],
    );
    let backward = Sample::new(
        &STUCK_PACKETS,
        report.sequences.dst.len() as f64,
        vec![
            channel.chain_2.channel_id.clone(),
            channel.chain_1.channel_id.clone(),
            labels.chain_b_id.clone(),
            labels.chain_a_id.clone(),
            report.dst_height.to_string(),
            report.src_height.to_string(),
            path.chain_2.chain_name.clone(),
            path.chain_1.chain_name.clone(),
            labels.discord_ids.clone(),
            report.dst_status.as_str().to_string(),
        ],
    );
    [forward, backward]
}

#[async_trait]
impl Collector for IbcCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&'static MetricDesc> {
        vec![&CLIENT_EXPIRY, &STUCK_PACKETS]
    }

    async fn collect(&self, cancel: CancellationToken, sink: SampleSink) {
        let mut tasks = JoinSet::new();

        for index in 0..self.generation.paths.len() {
            let this = self.clone();
            let cancel = cancel.clone();
            let sink = sink.clone();
            tasks.spawn(async move {
                let Some(path) = this.generation.paths.get(index) else {
                    return;
                };
                if let Some(samples) = this.collect_path(path, &cancel).await {
                    if sink.send(samples).await.is_err() {
                        debug!(path = %path.name(), "Sample sink closed");
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Path task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use crate::Status;
    use chrono::TimeDelta;
    use ibcwatch_types::Ordering;
    use tokio::sync::mpsc;

    const CLIENT_A: &str = "07-tendermint-11";
    const CLIENT_B: &str = "07-tendermint-113";

    fn healthy_chains() -> (MockChain, MockChain) {
        let mut a = MockChain::new("archway-1", 100);
        a.clients.insert(CLIENT_A.into(), client(14, 90));
        a.commitments.insert("channel-13".into(), vec![5, 6, 7]);
        let mut b = MockChain::new("axelar-dojo-1", 200);
        b.clients.insert(CLIENT_B.into(), client(14, 80));
        b.unreceived.insert("channel-64".into(), vec![5, 7]);
        (a, b)
    }

    fn generation(paths: Vec<Path>) -> Arc<ConfigGeneration> {
        Arc::new(ConfigGeneration {
            id: 1,
            paths,
            rpcs: rpc_map(&[
                ("archway", "archway-1"),
                ("axelar", "axelar-dojo-1"),
                ("osmosis", "osmosis-1"),
                ("noble", "noble-1"),
            ]),
            accounts: vec![],
        })
    }

    fn archway_axelar(ordering: Ordering) -> Path {
        path(
            "archway",
            CLIENT_A,
            "axelar",
            CLIENT_B,
            vec![channel("channel-13", "channel-64", ordering)],
        )
    }

    async fn run(collector: &IbcCollector, cancel: CancellationToken) -> Vec<Sample> {
        let (tx, mut rx) = mpsc::channel(16);
        collector.collect(cancel, tx).await;
        let mut samples = Vec::new();
        while let Some(batch) = rx.recv().await {
            samples.extend(batch);
        }
        samples
    }

    fn find<'a>(samples: &'a [Sample], desc: &MetricDesc, pairs: &[(&str, &str)]) -> Vec<&'a Sample> {
        samples
            .iter()
            .filter(|s| s.desc.name == desc.name)
            .filter(|s| pairs.iter().all(|(k, v)| s.label(k) == Some(*v)))
            .collect()
    }

    #[tokio::test]
    async fn test_healthy_path() {
        let (a, b) = healthy_chains();
        let builder = Arc::new(MockBuilder::with(vec![Arc::new(a), Arc::new(b)]));
        let collector = IbcCollector::new(
            generation(vec![archway_axelar(Ordering::Unordered)]),
            builder,
            fast_retry(),
        );

        let samples = run(&collector, CancellationToken::new()).await;
        assert_eq!(samples.len(), 4);

        let expiry = find(&samples, &CLIENT_EXPIRY, &[("host_chain_id", "archway-1")]);
        assert_eq!(expiry.len(), 1);
        assert_eq!(expiry[0].label("client_id"), Some(CLIENT_A));
        assert_eq!(expiry[0].label("target_chain_id"), Some("axelar-dojo-1"));
        assert_eq!(expiry[0].label("discord_ids"), Some("400123"));
        assert_eq!(expiry[0].label("status"), Some("success"));
        let expected = genesis() + TimeDelta::seconds(90) + TimeDelta::days(14);
        assert_eq!(expiry[0].value, expected.timestamp() as f64);

        let forward = find(&samples, &STUCK_PACKETS, &[("src_chain_id", "archway-1")]);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].value, 2.0);
        assert_eq!(forward[0].label("src_channel_id"), Some("channel-13"));
        assert_eq!(forward[0].label("dst_channel_id"), Some("channel-64"));
        assert_eq!(forward[0].label("src_chain_height"), Some("100"));
        assert_eq!(forward[0].label("dst_chain_height"), Some("200"));
        assert_eq!(forward[0].label("src_chain_name"), Some("archway"));

        let backward = find(&samples, &STUCK_PACKETS, &[("src_chain_id", "axelar-dojo-1")]);
        assert_eq!(backward[0].value, 0.0);
        assert_eq!(backward[0].label("src_channel_id"), Some("channel-64"));
        assert_eq!(backward[0].label("src_chain_height"), Some("200"));
        assert_eq!(backward[0].label("dst_chain_name"), Some("archway"));
        assert_eq!(backward[0].label("status"), Some("success"));
    }

    #[tokio::test]
    async fn test_ordered_channel_scenario() {
        let (a, mut b) = healthy_chains();
        b.unreceived.insert("channel-64".into(), vec![6, 7]);
        b.next_recv.insert("channel-64".into(), 6);
        let builder = Arc::new(MockBuilder::with(vec![Arc::new(a), Arc::new(b)]));
        let collector = IbcCollector::new(
            generation(vec![archway_axelar(Ordering::Ordered)]),
            builder,
            fast_retry(),
        );

        let samples = run(&collector, CancellationToken::new()).await;
        let forward = find(&samples, &STUCK_PACKETS, &[("src_chain_id", "archway-1")]);
        assert_eq!(forward[0].value, 1.0);
    }

    #[tokio::test]
    async fn test_broken_path_is_isolated() {
        let (a, b) = healthy_chains();
        let osmosis = MockChain::new("osmosis-1", 10);
        let builder = Arc::new(MockBuilder::with(vec![
            Arc::new(a),
            Arc::new(b),
            Arc::new(osmosis),
        ]));
        builder.unreachable("noble-1");

        let broken = path(
            "osmosis",
            "07-tendermint-1",
            "noble",
            "07-tendermint-2",
            vec![channel("channel-750", "channel-1", Ordering::Unordered)],
        );
        let collector = IbcCollector::new(
            generation(vec![archway_axelar(Ordering::Unordered), broken]),
            builder.clone(),
            fast_retry(),
        );

        let samples = run(&collector, CancellationToken::new()).await;
        assert_eq!(samples.len(), 8);

        let healthy = find(&samples, &STUCK_PACKETS, &[("src_chain_id", "archway-1")]);
        assert_eq!(healthy[0].label("status"), Some("success"));
        assert_eq!(healthy[0].value, 2.0);

        let failed_expiry = find(&samples, &CLIENT_EXPIRY, &[("host_chain_id", "osmosis-1")]);
        assert_eq!(failed_expiry[0].label("status"), Some("error"));
        assert_eq!(failed_expiry[0].value, 0.0);

        let failed_stuck = find(&samples, &STUCK_PACKETS, &[("src_chain_id", "noble-1")]);
        assert_eq!(failed_stuck.len(), 1);
        assert_eq!(failed_stuck[0].label("status"), Some("error"));
        assert_eq!(failed_stuck[0].label("src_chain_height"), Some("0"));
        assert_eq!(failed_stuck[0].value, 0.0);

        assert_eq!(builder.opens("noble-1"), 3);
    }

    #[tokio::test]
    async fn test_cancelled_path_emits_nothing() {
        let (a, b) = healthy_chains();
        a.hang("latest_height");
        let builder = Arc::new(MockBuilder::with(vec![Arc::new(a), Arc::new(b)]));
        let collector = IbcCollector::new(
            generation(vec![archway_axelar(Ordering::Unordered)]),
            builder,
            fast_retry(),
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let samples = run(&collector, cancel).await;
        assert!(samples.is_empty());
    }

    #[test]
    fn test_status_labels_are_last() {
        assert_eq!(CLIENT_EXPIRY.labels.last(), Some(&"status"));
        assert_eq!(STUCK_PACKETS.labels.last(), Some(&"status"));
        assert_eq!(Status::Error.as_str(), "error");
    }
}
