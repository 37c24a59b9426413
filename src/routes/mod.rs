use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod polls;
pub mod websocket;

/// Compose the health, poll, WebSocket and documentation routes over shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(websocket::router())
        .merge(polls::router())
        .merge(docs::router())
        .with_state(state)
}
