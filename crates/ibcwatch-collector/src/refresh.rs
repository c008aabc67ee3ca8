//! Periodic collector refresh.
//!
//! Each refresh reloads path records, validates them against the RPC map and,
//! on success, swaps freshly built collectors into the metrics registry in one
//! step. A failed refresh leaves the running collectors untouched; before the
//! first success it still installs the wallet collector.

use ibcwatch_chain::SessionBuilder;
use ibcwatch_telemetry::{Collector, MetricsRegistry};
use ibcwatch_types::{Account, Path, RpcMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::ibc::IbcCollector;
use crate::retry::RetryPolicy;
use crate::source::PathSource;
use crate::wallet::{DenomLabels, WalletCollector};

/// One immutable snapshot of what the collectors work on
#[derive(Debug, Clone, Default)]
pub struct ConfigGeneration {
    pub id: u64,
    pub paths: Vec<Path>,
    pub rpcs: RpcMap,
    pub accounts: Vec<Account>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// No collector generation installed yet
    Idle,
    Refreshing,
    /// A generation is installed
    Active,
}

impl fmt::Display for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefreshState::Idle => "idle",
            RefreshState::Refreshing => "refreshing",
            RefreshState::Active => "active",
        };
        f.write_str(name)
    }
}

/// What a single refresh did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Both collectors replaced with generation `id`
    Swapped { id: u64, paths: usize },
    /// Only the wallet collector was replaced; the path source had nothing usable
    WalletOnly { id: u64 },
    /// Nothing changed; the previous generation keeps running
    Retained,
}

/// Rebuilds and swaps collectors on an interval
pub struct Refresher {
    source: Option<Arc<dyn PathSource>>,
    rpcs: RpcMap,
    accounts: Vec<Account>,
    builder: Arc<dyn SessionBuilder>,
    policy: RetryPolicy,
    registry: Arc<MetricsRegistry>,
    interval: Duration,
    generation: AtomicU64,
    denom_labels: DenomLabels,
    state: watch::Sender<RefreshState>,
    /// Serializes refreshes
    running: Mutex<()>,
}

impl Refresher {
    pub fn new(
        source: Option<Arc<dyn PathSource>>,
        rpcs: RpcMap,
        accounts: Vec<Account>,
        builder: Arc<dyn SessionBuilder>,
        policy: RetryPolicy,
        registry: Arc<MetricsRegistry>,
        interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(RefreshState::Idle);
        Self {
            source,
            rpcs,
            accounts,
            builder,
            policy,
            registry,
            interval,
            generation: AtomicU64::new(0),
            denom_labels: DenomLabels::default(),
            state,
            running: Mutex::new(()),
        }
    }

    pub fn state(&self) -> RefreshState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RefreshState> {
        self.state.subscribe()
    }

    /// Id of the last installed generation, 0 before the first
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Reload paths and swap collectors if anything usable came back
    pub async fn refresh_once(&self) -> RefreshOutcome {
        let _guard = self.running.lock().await;
        let previous = self.state();
        self.state.send_replace(RefreshState::Refreshing);

        let paths = match &self.source {
            Some(source) => match source.load().await {
                Ok(paths) => Some(self.validate(paths)),
                Err(e) => {
                    error!(source = %source.location(), error = %e, "Failed to load paths, keeping previous collectors");
                    if self.wallets_installed().await {
                        self.registry.record_refresh(false);
                        self.state.send_replace(previous);
                        return RefreshOutcome::Retained;
                    }
                    // Wallets do not depend on paths
                    None
                }
            },
            None => None,
        };

        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = match paths {
            Some(paths) if !paths.is_empty() => {
                let count = paths.len();
                let generation = Arc::new(self.generation_with(id, paths));
                self.registry.swap(self.collectors(generation, true)).await;
                info!(generation = id, paths = count, "Installed collector generation");
                RefreshOutcome::Swapped { id, paths: count }
            }
            paths => {
                if paths.is_some() {
                    warn!(generation = id, "No valid paths loaded, keeping previous path collector");
                }
                let generation = Arc::new(self.generation_with(id, Vec::new()));
                self.registry.swap(self.collectors(generation, false)).await;
                info!(generation = id, "Installed wallet collector generation");
                RefreshOutcome::WalletOnly { id }
            }
        };

        // A failed or empty listing from a configured source counts as a failed refresh
        let success = self.source.is_none() || matches!(outcome, RefreshOutcome::Swapped { .. });
        self.registry.record_refresh(success);
        self.registry.set_config_generation(id);
        self.state.send_replace(RefreshState::Active);
        outcome
    }

    /// Refresh now and then every interval until `shutdown` fires
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Refresh loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.refresh_once().await;
                }
            }
        }
    }

    async fn wallets_installed(&self) -> bool {
        self.registry
            .collector_names()
            .await
            .contains(&WalletCollector::NAME)
    }

    fn generation_with(&self, id: u64, paths: Vec<Path>) -> ConfigGeneration {
        ConfigGeneration {
            id,
            paths,
            rpcs: self.rpcs.clone(),
            accounts: self.accounts.clone(),
        }
    }

    fn collectors(&self, generation: Arc<ConfigGeneration>, with_paths: bool) -> Vec<Arc<dyn Collector>> {
        let wallet = WalletCollector::new(generation.clone(), self.builder.clone(), self.policy)
            .with_denom_labels(self.denom_labels.clone());
        let mut collectors: Vec<Arc<dyn Collector>> = vec![Arc::new(wallet)];
        if with_paths {
            collectors.push(Arc::new(IbcCollector::new(
                generation,
                self.builder.clone(),
                self.policy,
            )));
        }
        collectors
    }

    /// Drop paths that cannot be collected
    fn validate(&self, paths: Vec<Path>) -> Vec<Path> {
        paths
            .into_iter()
            .filter(|path| match path.validate(&self.rpcs) {
                Ok(()) => true,
                Err(e) => {
                    error!(path = %path.name(), error = %e, "Dropping invalid path");
                    false
                }
            })
            .collect()
    }
}
