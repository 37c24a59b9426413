use std::time::{Instant, SystemTime};

use tracing::{debug, error, info, warn};

use crate::{
    error::{VoteError, VoteErrorKind},
    state::{
        SharedState,
        identity::VoterIdentity,
        poll::{TallySnapshot, VoteChange},
        vote_flow::{VoteFlow, VoteStage},
    },
};

/// A vote as received from a client.
#[derive(Debug, Clone)]
pub struct VoteRequest {
    pub poll_id: String,
    pub option_id: String,
    /// Display name as typed.
    pub name: String,
}

/// What an accepted vote produced.
#[derive(Debug, Clone)]
pub struct VoteReceipt {
    /// Counts published to the room.
    pub snapshot: TallySnapshot,
    /// Effect on the voter's record.
    pub change: VoteChange,
    /// Room members the update was queued for.
    pub delivered: usize,
}

/// Validate, rate-limit, apply, persist and broadcast a single vote.
///
/// Errors are meant for the sender only; nothing is published to the room
/// unless the vote was applied (or was already in place).
pub async fn cast_vote(
    state: &SharedState,
    request: VoteRequest,
    origin: &str,
) -> Result<VoteReceipt, VoteError> {
    let poll_id = request.poll_id.clone();
    let (result, flow) = execute(state, request, origin).await;

    match &result {
        Ok(receipt) => info!(
            poll_id = %poll_id,
            %origin,
            revision = receipt.snapshot.revision,
            change = ?receipt.change,
            delivered = receipt.delivered,
            "vote applied"
        ),
        Err(err) => match err.kind() {
            VoteErrorKind::StorageFailure => {
                error!(poll_id = %poll_id, %origin, stages = ?flow.history(), "vote could not be recorded")
            }
            VoteErrorKind::RateLimited => {
                debug!(poll_id = %poll_id, %origin, error = %err, "vote rate limited")
            }
            _ => warn!(poll_id = %poll_id, %origin, error = %err, "vote rejected"),
        },
    }

    result
}

/// Run the vote and close its flow, in `Done` or in `Errored`.
async fn execute(
    state: &SharedState,
    request: VoteRequest,
    origin: &str,
) -> (Result<VoteReceipt, VoteError>, VoteFlow) {
    let mut flow = VoteFlow::new();
    let result = run_vote(state, request, origin, &mut flow).await;
    if let Err(err) = &result {
        if let Err(transition) = flow.fail(err.kind()) {
            error!(error = %transition, "vote flow out of order");
        }
    }
    (result, flow)
}

/// Walk one vote through its stages, recording each in `flow`.
///
/// The per-poll lock is held from the ledger read until the room has been
/// notified, so members receive snapshots in revision order.
async fn run_vote(
    state: &SharedState,
    request: VoteRequest,
    origin: &str,
    flow: &mut VoteFlow,
) -> Result<VoteReceipt, VoteError> {
    let VoteRequest {
        poll_id,
        option_id,
        name,
    } = request;
    if poll_id.trim().is_empty() || option_id.trim().is_empty() {
        return Err(VoteError::MalformedEvent(
            "pollId and optionId are required".into(),
        ));
    }

    advance(flow, VoteStage::Validating);
    let identity =
        VoterIdentity::parse(&name).map_err(|reason| VoteError::InvalidIdentity { reason })?;

    advance(flow, VoteStage::RateChecking);
    let reservation = state
        .rate_limiter()
        .check_and_reserve(&poll_id, identity.key(), origin, Instant::now())
        .map_err(|denied| VoteError::RateLimited {
            retry_after_secs: denied.retry_after_secs,
        })?;

    advance(flow, VoteStage::Ledgering);
    let store = state.require_poll_store().await.map_err(|err| {
        error!(poll_id = %poll_id, error = %err, "no poll store available for vote");
        VoteError::StorageFailure
    })?;
    let lock = state.ledger().lock(&poll_id).await;
    let outcome = state
        .ledger()
        .apply_vote(
            &lock,
            store.as_ref(),
            &identity,
            &option_id,
            SystemTime::now(),
            || advance(flow, VoteStage::Persisting),
        )
        .await
        .inspect_err(|err| debug!(poll_id = %poll_id, error = %err, "ledger refused vote"))?;

    advance(flow, VoteStage::Broadcasting);
    reservation.commit(Instant::now());
    let delivered = state.rooms().publish(&poll_id, &outcome.snapshot);
    drop(lock);

    advance(flow, VoteStage::Done);
    Ok(VoteReceipt {
        snapshot: outcome.snapshot,
        change: outcome.change,
        delivered,
    })
}

fn advance(flow: &mut VoteFlow, next: VoteStage) {
    if let Err(err) = flow.advance(next) {
        error!(error = %err, "vote flow out of order");
    }
}
