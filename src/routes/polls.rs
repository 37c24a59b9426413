use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::poll::{CreatePollRequest, CreatePollResponse, PollView},
    error::AppError,
    services::poll_service,
    state::SharedState,
};

/// Routes handling poll creation and lookup.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/polls", post(create_poll))
        .route("/api/polls/{id}", get(get_poll))
}

/// Create a poll and return its shareable identifier.
#[utoipa::path(
    post,
    path = "/api/polls",
    tag = "polls",
    request_body = CreatePollRequest,
    responses(
        (status = 201, description = "Poll created", body = CreatePollResponse),
        (status = 400, description = "Blank question or fewer than two options")
    )
)]
pub async fn create_poll(
    State(state): State<SharedState>,
    Json(payload): Json<CreatePollRequest>,
) -> Result<(StatusCode, Json<CreatePollResponse>), AppError> {
    payload.validate()?;
    let created = poll_service::create_poll(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Fetch a poll with its current counts.
#[utoipa::path(
    get,
    path = "/api/polls/{id}",
    tag = "polls",
    params(("id" = String, Path, description = "Identifier of the poll")),
    responses(
        (status = 200, description = "Poll found", body = PollView),
        (status = 404, description = "Unknown poll")
    )
)]
pub async fn get_poll(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<PollView>, AppError> {
    let view = poll_service::get_poll(&state, &id).await?;
    Ok(Json(view))
}
