//! Stuck packet reconciliation.
//!
//! For each channel the sending chain's commitments are compared against what
//! the receiving chain reports as unreceived, both pinned to the heights read
//! at the start of that channel's pass. Ordered channels can only be blocked
//! on the receiver's next expected sequence, so the candidates are narrowed to
//! that one sequence.

use ibcwatch_chain::{query_latest_heights, ChainError, ChainSession, Result};
use ibcwatch_types::{Channel, ChannelEnd, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::retry::RetryPolicy;
use crate::Status;

/// Unrelayed sequences on one channel. `src` were sent by the channel's
/// `chain_1` side, `dst` by its `chain_2` side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnrelayedSequences {
    pub src: Vec<u64>,
    pub dst: Vec<u64>,
}

/// Reconciliation outcome for one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub channel: Channel,
    /// Height of chain A the queries were pinned to, 0 if unknown
    pub src_height: u64,
    /// Height of chain B the queries were pinned to, 0 if unknown
    pub dst_height: u64,
    pub sequences: UnrelayedSequences,
    pub src_status: Status,
    pub dst_status: Status,
}

impl ChannelReport {
    /// Report for a channel whose path-level preconditions failed
    pub fn failed(channel: &Channel) -> Self {
        Self {
            channel: channel.clone(),
            src_height: 0,
            dst_height: 0,
            sequences: UnrelayedSequences::default(),
            src_status: Status::Error,
            dst_status: Status::Error,
        }
    }
}

/// One direction of a channel: packets sent on `sender` awaiting `receiver`
struct Direction<'a> {
    sender: &'a dyn ChainSession,
    sender_end: &'a ChannelEnd,
    sender_height: u64,
    receiver: &'a dyn ChainSession,
    receiver_end: &'a ChannelEnd,
    receiver_height: u64,
}

/// Reconcile `channels` between chain A (each channel's `chain_1` side) and
/// chain B, one channel at a time.
///
/// A failed height query marks that channel and every later one as failed.
/// The only error returned is [`ChainError::Cancelled`], in which case nothing
/// from this path should be reported.
pub async fn reconcile_path<'c, I>(
    a: &dyn ChainSession,
    b: &dyn ChainSession,
    channels: I,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<ChannelReport>>
where
    I: IntoIterator<Item = &'c Channel>,
{
    let mut reports = Vec::new();
    let mut heights_failed = false;

    for channel in channels {
        if channel.is_wildcard() {
            continue;
        }
        if heights_failed {
            reports.push(ChannelReport::failed(channel));
            continue;
        }

        let heights = policy
            .run("latest_heights", cancel, || query_latest_heights(a, b))
            .await;
        let (src_height, dst_height) = match heights {
            Ok(heights) => heights,
            Err(ChainError::Cancelled) => return Err(ChainError::Cancelled),
            Err(e) => {
                warn!(
                    src_chain_id = a.chain_id(),
                    dst_chain_id = b.chain_id(),
                    channel_id = %channel.source().channel_id,
                    error = %e,
                    "Failed to query latest heights, skipping remaining channels"
                );
                heights_failed = true;
                reports.push(ChannelReport::failed(channel));
                continue;
            }
        };

        let forward = Direction {
            sender: a,
            sender_end: channel.source(),
            sender_height: src_height,
            receiver: b,
            receiver_end: channel.destination(),
            receiver_height: dst_height,
        };
        let backward = Direction {
            sender: b,
            sender_end: channel.destination(),
            sender_height: dst_height,
            receiver: a,
            receiver_end: channel.source(),
            receiver_height: src_height,
        };

        let (src, dst) = tokio::join!(
            unrelayed(&forward, channel.ordering, policy, cancel),
            unrelayed(&backward, channel.ordering, policy, cancel),
        );
        let (src, src_status) = settle(&forward, src)?;
        let (dst, dst_status) = settle(&backward, dst)?;

        debug!(
            src_chain_id = a.chain_id(),
            dst_chain_id = b.chain_id(),
            channel_id = %channel.source().channel_id,
            src_height,
            dst_height,
            src = src.len(),
            dst = dst.len(),
            "Reconciled channel"
        );

        reports.push(ChannelReport {
            channel: channel.clone(),
            src_height,
            dst_height,
            sequences: UnrelayedSequences { src, dst },
            src_status,
            dst_status,
        });
    }

    Ok(reports)
}

/// Commitments on the sender, then unreceived on the receiver, then the
/// ordering filter.
async fn unrelayed(
    dir: &Direction<'_>,
    ordering: Ordering,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<u64>> {
    let committed = policy
        .run("packet_commitments", cancel, || {
            dir.sender.packet_commitments(dir.sender_height, dir.sender_end)
        })
        .await?;
    if committed.is_empty() {
        return Ok(Vec::new());
    }

    let candidates = policy
        .run("unreceived_packets", cancel, || {
            dir.receiver
                .unreceived_packets(dir.receiver_height, dir.receiver_end, &committed)
        })
        .await?;

    if ordering != Ordering::Ordered || candidates.is_empty() {
        return Ok(apply_ordering(ordering, candidates, None));
    }

    let next = policy
        .run("next_sequence_receive", cancel, || {
            dir.receiver
                .next_sequence_receive(dir.receiver_height, dir.receiver_end)
        })
        .await?;
    Ok(apply_ordering(ordering, candidates, Some(next)))
}

/// Ordered channels keep only the receiver's next expected sequence; other
/// orderings pass candidates through unchanged.
pub fn apply_ordering(ordering: Ordering, candidates: Vec<u64>, next: Option<u64>) -> Vec<u64> {
    match (ordering, next) {
        (Ordering::Ordered, Some(next)) => candidates
            .into_iter()
            .find(|seq| *seq == next)
            .into_iter()
            .collect(),
        (Ordering::Ordered, None) => Vec::new(),
        _ => candidates,
    }
}

/// Failed directions report nothing with an error status; cancellation
/// propagates.
fn settle(dir: &Direction<'_>, result: Result<Vec<u64>>) -> Result<(Vec<u64>, Status)> {
    match result {
        Ok(sequences) => Ok((sequences, Status::Success)),
        Err(ChainError::Cancelled) => Err(ChainError::Cancelled),
        Err(e) => {
            warn!(
                sender_chain_id = dir.sender.chain_id(),
                receiver_chain_id = dir.receiver.chain_id(),
                channel_id = %dir.sender_end.channel_id,
                error = %e,
                "Failed to reconcile packets"
            );
            Ok((Vec::new(), Status::Error))
        }
    }
}
