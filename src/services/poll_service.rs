use std::future::Future;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    dao::storage::{StorageError, StorageResult},
    dto::poll::{CreatePollRequest, CreatePollResponse, PollView},
    error::ServiceError,
    state::{SharedState, poll::Poll},
};

/// Attempts at finding an unused poll identifier.
const MAX_ID_ATTEMPTS: usize = 3;

/// Persist a new poll built from an already validated request.
pub async fn create_poll(
    state: &SharedState,
    request: CreatePollRequest,
) -> Result<CreatePollResponse, ServiceError> {
    let store = state.require_poll_store().await?;
    let question = request.question.trim().to_owned();
    let options: Vec<String> = request
        .options
        .iter()
        .map(|text| text.trim().to_owned())
        .collect();

    let mut attempt = 0;
    loop {
        attempt += 1;
        let poll = Poll::new(question.clone(), options.clone());
        let id = poll.id.clone();
        match bounded(state, store.create_poll(poll.into())).await? {
            Ok(()) => {
                info!(poll_id = %id, options = options.len(), "poll created");
                return Ok(CreatePollResponse { id });
            }
            Err(StorageError::Duplicate { .. }) if attempt < MAX_ID_ATTEMPTS => {
                warn!(poll_id = %id, attempt, "poll id already taken; generating another");
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Fetch a poll with counts recomputed from its voter records.
pub async fn get_poll(state: &SharedState, id: &str) -> Result<PollView, ServiceError> {
    let store = state.require_poll_store().await?;
    let entity = bounded(state, store.find_poll(id.to_owned()))
        .await??
        .ok_or_else(|| ServiceError::NotFound(format!("poll `{id}`")))?;
    let poll = Poll::from(entity);
    Ok(PollView::from(&poll))
}

async fn bounded<T>(
    state: &SharedState,
    operation: impl Future<Output = StorageResult<T>>,
) -> Result<StorageResult<T>, ServiceError> {
    timeout(state.config().storage_timeout(), operation)
        .await
        .map_err(|_| ServiceError::Timeout)
}
