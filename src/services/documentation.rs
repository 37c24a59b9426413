use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Poll Rooms Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::polls::create_poll,
        crate::routes::polls::get_poll,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::poll::CreatePollRequest,
            crate::dto::poll::CreatePollResponse,
            crate::dto::poll::PollView,
            crate::dto::poll::PollOptionView,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::PollUpdate,
            crate::dto::ws::OptionCount,
            crate::dto::ws::ErrorMessage,
            crate::error::VoteErrorKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "polls", description = "Poll creation and lookup"),
        (name = "voting", description = "WebSocket rooms and live vote counts"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in ["/healthcheck", "/api/polls", "/api/polls/{id}", "/ws"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
