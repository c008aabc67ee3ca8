//! Wallet balance collector.

use async_trait::async_trait;
use ibcwatch_chain::{ChainError, ChainSession, Coin, SessionBuilder};
use ibcwatch_telemetry::{Collector, MetricDesc, Sample, SampleSink};
use ibcwatch_types::Account;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::refresh::ConfigGeneration;
use crate::retry::RetryPolicy;
use crate::{open_session, Status};

pub static WALLET_BALANCE: MetricDesc = MetricDesc {
    name: "cosmos_wallet_balance",
    help: "Balance of a watched wallet in one denom",
    labels: &["account", "chain_id", "denom", "status", "tags"],
};

/// Base denoms resolved so far, keyed by (chain name, `ibc/<hash>` denom).
///
/// Shared across collector generations so an account keeps its resolved
/// label while its chain is unreachable.
pub type DenomLabels = Arc<RwLock<HashMap<(String, String), String>>>;

/// Collects balances for every configured account
#[derive(Clone)]
pub struct WalletCollector {
    generation: Arc<ConfigGeneration>,
    builder: Arc<dyn SessionBuilder>,
    policy: RetryPolicy,
    labels: DenomLabels,
}

impl WalletCollector {
    pub const NAME: &'static str = "wallet";

    pub fn new(
        generation: Arc<ConfigGeneration>,
        builder: Arc<dyn SessionBuilder>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            generation,
            builder,
            policy,
            labels: DenomLabels::default(),
        }
    }

    /// Reuse labels resolved by an earlier collector
    pub fn with_denom_labels(mut self, labels: DenomLabels) -> Self {
        self.labels = labels;
        self
    }

    /// One sample per configured denom, or `None` if cancelled
    pub async fn collect_account(
        &self,
        account: &Account,
        cancel: &CancellationToken,
    ) -> Option<Vec<Sample>> {
        let rpc = self.generation.rpcs.get(&account.chain_name);
        let chain_id = rpc
            .map(|r| r.chain_id.clone())
            .unwrap_or_else(|| account.chain_name.clone());
        let tags = account.tags.join(",");
        let sample = |denom: String, amount: f64, status: Status| {
            Sample::new(
                &WALLET_BALANCE,
                amount,
                vec![
                    account.address.clone(),
                    chain_id.clone(),
                    denom,
                    status.as_str().to_string(),
                    tags.clone(),
                ],
            )
        };

        let session = match open_session(
            &*self.builder,
            &account.chain_name,
            rpc,
            None,
            &self.policy,
            cancel,
        )
        .await
        {
            Ok(session) => Some(session),
            Err(ChainError::Cancelled) => return None,
            Err(e) => {
                warn!(account = %account.address, chain_name = %account.chain_name, error = %e, "Failed to open chain session");
                None
            }
        };

        let coins = match &session {
            Some(session) => match self
                .policy
                .run("balances", cancel, || session.balances(&account.address))
                .await
            {
                Ok(coins) => Some(coins),
                Err(ChainError::Cancelled) => return None,
                Err(e) => {
                    warn!(account = %account.address, chain_name = %account.chain_name, error = %e, "Failed to query balances");
                    None
                }
            },
            None => None,
        };

        let mut samples = Vec::with_capacity(account.denom.len());
        for denom in &account.denom {
            let (amount, status) = match coins.as_deref().map(|coins| amount_of(coins, denom)) {
                Some(Ok(amount)) => (amount, Status::Success),
                Some(Err(reason)) => {
                    warn!(account = %account.address, denom = %denom, reason = %reason, "Unreadable balance");
                    (0.0, Status::Error)
                }
                None => (0.0, Status::Error),
            };
            let label = self
                .resolve_denom(session.as_deref(), &account.chain_name, denom, cancel)
                .await?;
            samples.push(sample(label, amount, status));
        }
        Some(samples)
    }

    /// `ibc/<hash>` denoms are labelled with their base denom when the trace
    /// resolves, or was resolved before; anything else keeps the configured
    /// name.
    async fn resolve_denom(
        &self,
        session: Option<&dyn ChainSession>,
        chain_name: &str,
        denom: &str,
        cancel: &CancellationToken,
    ) -> Option<String> {
        if !denom.starts_with("ibc/") {
            return Some(denom.to_string());
        }
        let key = (chain_name.to_string(), denom.to_string());

        if let Some(session) = session {
            match self
                .policy
                .run("denom_trace", cancel, || session.denom_trace(denom))
                .await
            {
                Ok(trace) if !trace.base_denom.is_empty() => {
                    self.labels
                        .write()
                        .await
                        .insert(key, trace.base_denom.clone());
                    return Some(trace.base_denom);
                }
                Ok(_) => {}
                Err(ChainError::Cancelled) => return None,
                Err(e) => {
                    warn!(denom, chain_id = session.chain_id(), error = %e, "Failed to resolve denom trace");
                }
            }
        }

        let known = self.labels.read().await.get(&key).cloned();
        Some(known.unwrap_or_else(|| denom.to_string()))
    }
}

/// Amount of `denom` in `coins`; absent means zero
fn amount_of(coins: &[Coin], denom: &str) -> Result<f64, String> {
    match coins.iter().find(|c| c.denom == denom) {
        Some(coin) => coin
            .amount
            .parse::<f64>()
            .map_err(|e| format!("amount {}: {e}", coin.amount)),
        None => Ok(0.0),
    }
}

#[async_trait]
impl Collector for WalletCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&'static MetricDesc> {
        vec![&WALLET_BALANCE]
    }

    async fn collect(&self, cancel: CancellationToken, sink: SampleSink) {
        let mut tasks = JoinSet::new();

        for index in 0..self.generation.accounts.len() {
            let this = self.clone();
            let cancel = cancel.clone();
            let sink = sink.clone();
            tasks.spawn(async move {
                let Some(account) = this.generation.accounts.get(index) else {
                    return;
                };
                if let Some(samples) = this.collect_account(account, &cancel).await {
                    if sink.send(samples).await.is_err() {
                        debug!(account = %account.address, "Sample sink closed");
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Account task failed");
            }
        }
    }
}
