/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Poll creation and lookup.
pub mod poll_service;
/// Background reclamation of cooldowns and poll locks.
pub mod sweeper;
/// Poll store connection supervision with exponential backoff.
pub mod storage_supervisor;
/// Vote coordination: validation, rate limiting, ledger update and fan-out.
pub mod vote_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
