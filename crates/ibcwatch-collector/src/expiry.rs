//! Light client expiry for both sides of a path.

use chrono::{DateTime, Utc};
use ibcwatch_chain::{ChainError, ChainSession, Result};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::retry::RetryPolicy;
use crate::Status;

/// Expiry of the client hosted on each side of a path.
///
/// `chain_a_expiration` belongs to the client on chain A that tracks chain B,
/// and the reverse for `chain_b_expiration`. A value that could not be
/// determined is the unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientExpiryResult {
    pub chain_a_expiration: DateTime<Utc>,
    pub chain_b_expiration: DateTime<Utc>,
    pub status: Status,
}

impl ClientExpiryResult {
    pub const SENTINEL: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

    /// Both sides unknown
    pub fn failed() -> Self {
        Self {
            chain_a_expiration: Self::SENTINEL,
            chain_b_expiration: Self::SENTINEL,
            status: Status::Error,
        }
    }
}

/// Query both directional expirations concurrently.
///
/// A missing session or a failed query marks the result as an error but keeps
/// the side that did resolve. The only error returned is
/// [`ChainError::Cancelled`].
pub async fn track_client_expiry(
    a: Option<&dyn ChainSession>,
    b: Option<&dyn ChainSession>,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<ClientExpiryResult> {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(ClientExpiryResult::failed()),
    };

    let (chain_a, chain_b) = tokio::join!(
        policy.run("client_expiration", cancel, || a.client_expiration(b)),
        policy.run("client_expiration", cancel, || b.client_expiration(a)),
    );

    let mut status = Status::Success;
    let mut resolve = |host: &dyn ChainSession, result: Result<DateTime<Utc>>| match result {
        Ok(expiry) => Ok(expiry),
        Err(ChainError::Cancelled) => Err(ChainError::Cancelled),
        Err(e) => {
            warn!(
                host_chain_id = host.chain_id(),
                client_id = host.client_id().unwrap_or_default(),
                error = %e,
                "Failed to query client expiration"
            );
            status = Status::Error;
            Ok(ClientExpiryResult::SENTINEL)
        }
    };

    let chain_a_expiration = resolve(a, chain_a)?;
    let chain_b_expiration = resolve(b, chain_b)?;

    Ok(ClientExpiryResult {
        chain_a_expiration,
        chain_b_expiration,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use chrono::TimeDelta;
    use ibcwatch_chain::{ChainInfo, SessionBuilder};
    use std::sync::Arc;
    use std::time::Duration;

    fn chains() -> (Arc<MockChain>, Arc<MockChain>) {
        let mut a = MockChain::new("archway-1", 5000);
        a.clients.insert("07-tendermint-11".into(), client(14, 900));
        let mut b = MockChain::new("axelar-dojo-1", 8000);
        b.clients.insert("07-tendermint-113".into(), client(7, 4000));
        (Arc::new(a), Arc::new(b))
    }

    async fn open(
        builder: &MockBuilder,
        chain_id: &str,
        client_id: &str,
    ) -> Arc<dyn ibcwatch_chain::ChainSession> {
        let info = ChainInfo {
            chain_id: chain_id.into(),
            rpc_addr: "http://mock:26657".into(),
            timeout: Duration::from_secs(1),
            client_id: Some(client_id.into()),
        };
        builder.open(&info).await.unwrap()
    }

    #[tokio::test]
    async fn test_both_sides_resolve() {
        let (a, b) = chains();
        let builder = MockBuilder::with(vec![a, b]);
        let sa = open(&builder, "archway-1", "07-tendermint-11").await;
        let sb = open(&builder, "axelar-dojo-1", "07-tendermint-113").await;

        let result = track_client_expiry(Some(&*sa), Some(&*sb), &fast_retry(), &CancellationToken::new())
            .await
            .unwrap();

        // Client on A trusts B at height 900; client on B trusts A at height 4000.
        assert_eq!(
            result.chain_a_expiration,
            genesis() + TimeDelta::seconds(900) + TimeDelta::days(14)
        );
        assert_eq!(
            result.chain_b_expiration,
            genesis() + TimeDelta::seconds(4000) + TimeDelta::days(7)
        );
        assert_eq!(result.status, Status::Success);
    }

    #[tokio::test]
    async fn test_one_side_exhausted() {
        let (a, b) = chains();
        b.fail("client_state");
        let builder = MockBuilder::with(vec![a, b.clone()]);
        let sa = open(&builder, "archway-1", "07-tendermint-11").await;
        let sb = open(&builder, "axelar-dojo-1", "07-tendermint-113").await;

        let result = track_client_expiry(Some(&*sa), Some(&*sb), &fast_retry(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            result.chain_a_expiration,
            genesis() + TimeDelta::seconds(900) + TimeDelta::days(14)
        );
        assert_eq!(result.chain_b_expiration, ClientExpiryResult::SENTINEL);
        assert_eq!(result.chain_b_expiration.timestamp(), 0);
        assert_eq!(result.status, Status::Error);
        assert_eq!(b.calls("client_state"), 3);
    }

    #[tokio::test]
    async fn test_missing_session_is_error_with_sentinels() {
        let (a, _) = chains();
        let builder = MockBuilder::with(vec![a]);
        let sa = open(&builder, "archway-1", "07-tendermint-11").await;

        let result = track_client_expiry(Some(&*sa), None, &fast_retry(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result, ClientExpiryResult::failed());
    }

    #[tokio::test]
    async fn test_cancelled() {
        let (a, b) = chains();
        a.hang("client_state");
        let builder = MockBuilder::with(vec![a, b]);
        let sa = open(&builder, "archway-1", "07-tendermint-11").await;
        let sb = open(&builder, "axelar-dojo-1", "07-tendermint-113").await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = track_client_expiry(Some(&*sa), Some(&*sb), &fast_retry(), &cancel).await;
        assert!(matches!(result, Err(ChainError::Cancelled)));
    }
}
