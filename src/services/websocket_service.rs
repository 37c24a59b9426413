use std::net::SocketAddr;

use axum::{
    extract::ws::{Message, WebSocket},
    http::HeaderMap,
};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, PollUpdate, ServerMessage},
    error::{MissingTarget, VoteError},
    services::vote_service::{self, VoteRequest},
    state::{
        SharedState,
        ledger::LedgerError,
        rooms::{ConnectionId, Outbound},
    },
};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Failure while handling a frame that should end the connection.
#[derive(Debug, Error)]
enum SocketError {
    /// Writer channel closed; the peer is gone.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Network origin of a client, used as the second rate-limit key.
///
/// With `trust_forwarded_for` the first `X-Forwarded-For` entry wins, which is
/// what a reverse proxy in front of the server reports as the real client.
pub fn client_origin(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(first) = forwarded {
            return first.to_owned();
        }
    }
    peer.ip().to_string()
}

/// Handle the full lifecycle of a poll WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket, origin: String) {
    let connection: ConnectionId = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    info!(%connection, %origin, "poll client connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(%connection, payload = text.as_str(), "received client message");
                if let Err(err) =
                    handle_text(&state, connection, &origin, &outbound_tx, text.as_str()).await
                {
                    info!(%connection, error = %err, "terminating connection");
                    break;
                }
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            // Pings are answered by the protocol layer.
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_)) => {}
            Err(err) => {
                warn!(%connection, error = %err, "websocket error");
                break;
            }
        }
    }

    let rooms = state.rooms().leave_all(connection);
    info!(%connection, rooms, "poll client disconnected");

    finalize(writer_task, outbound_tx).await;
}

async fn handle_text(
    state: &SharedState,
    connection: ConnectionId,
    origin: &str,
    tx: &Outbound,
    text: &str,
) -> Result<(), SocketError> {
    let message = match ClientMessage::from_json_str(text) {
        Ok(message) => message,
        Err(err) => {
            debug!(%connection, error = %err, "rejecting malformed client message");
            return send_error(tx, &VoteError::from(err));
        }
    };

    match message {
        ClientMessage::JoinPoll { poll_id } => join_poll(state, connection, tx, &poll_id).await,
        ClientMessage::LeavePoll { poll_id } => {
            state.rooms().leave(&poll_id, connection);
            debug!(%connection, poll_id = %poll_id, "left room");
            Ok(())
        }
        ClientMessage::Vote {
            poll_id,
            option_id,
            name,
        } => {
            let request = VoteRequest {
                poll_id,
                option_id,
                name,
            };
            spawn_vote(state.clone(), request, origin.to_owned(), tx.clone());
            Ok(())
        }
    }
}

/// Register the connection in the room, then send it the current counts.
async fn join_poll(
    state: &SharedState,
    connection: ConnectionId,
    tx: &Outbound,
    poll_id: &str,
) -> Result<(), SocketError> {
    state.rooms().join(poll_id, connection, tx.clone());

    let Ok(store) = state.require_poll_store().await else {
        warn!(poll_id, "cannot load poll for new member (degraded mode)");
        return send_error(tx, &VoteError::StorageFailure);
    };

    match state.ledger().current_tally(store.as_ref(), poll_id).await {
        Ok(snapshot) => send_message_to_websocket(
            tx,
            &ServerMessage::PollUpdated(PollUpdate::from(&snapshot)),
        ),
        Err(LedgerError::UnknownPoll(_)) => {
            state.rooms().leave(poll_id, connection);
            send_error(
                tx,
                &VoteError::NotFound {
                    target: MissingTarget::Poll(poll_id.to_owned()),
                },
            )
        }
        Err(err) => {
            warn!(poll_id, error = %err, "failed to load poll for new member");
            send_error(tx, &VoteError::StorageFailure)
        }
    }
}

/// Run the vote on its own task so it completes even if the socket goes away.
fn spawn_vote(state: SharedState, request: VoteRequest, origin: String, tx: Outbound) {
    tokio::spawn(async move {
        if let Err(err) = vote_service::cast_vote(&state, request, &origin).await {
            // The sender may be gone by now.
            let _ = send_error(&tx, &err);
        }
    });
}

fn send_error(tx: &Outbound, err: &VoteError) -> Result<(), SocketError> {
    send_message_to_websocket(tx, &ServerMessage::from(err))
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed; a closed writer is reported.
fn send_message_to_websocket<T>(tx: &Outbound, value: &T) -> Result<(), SocketError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| SocketError::ConnectionClosed)
}

async fn finalize(writer_task: JoinHandle<()>, outbound_tx: Outbound) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
